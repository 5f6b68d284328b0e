//! Command implementations for the recall binary.
//!
//! Every administrative command renders its output as a string so the
//! binary prints it and tests can inspect it; only `run` blocks.

use std::path::Path;

use anyhow::{bail, Context, Result};
use serde_json::Value;
use tokio::signal;
use tracing::{info, warn};

use recall_scheduler::{register_maintenance_jobs, SchedulerConfig, SchedulerService};
use recall_service::MemoryContext;
use recall_types::{CachedDecision, ConversationEntry, SeedData, Settings, Turn, META_DECISION};

use crate::cli::{CacheCommands, Cli, Commands, PrefsCommands, ThreadCommands, ToolsCommands};

/// Load layered settings and apply CLI overrides (highest precedence).
pub fn load_settings(cli: &Cli) -> Result<Settings> {
    let mut settings =
        Settings::load(cli.config.as_deref()).context("Failed to load configuration")?;
    if let Some(db_path) = &cli.db_path {
        settings.db_path = db_path.clone();
    }
    if let Some(log_level) = &cli.log_level {
        settings.log_level = log_level.clone();
    }
    Ok(settings)
}

/// Install the global subscriber. `RUST_LOG` wins over the configured level.
pub fn init_logging(log_level: &str) -> Result<()> {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;
    Ok(())
}

/// Open the memory context, creating the database directory if needed.
pub fn open_context(settings: Settings) -> Result<MemoryContext> {
    let db_path = settings.expanded_db_path();
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent).context("Failed to create database directory")?;
    }
    MemoryContext::open(settings).context("Failed to open memory context")
}

/// Execute one administrative command and return its printable output.
pub async fn execute(ctx: &MemoryContext, command: Commands) -> Result<String> {
    let output = match command {
        Commands::Seed { file, force } => seed(ctx, &file, force).await?,
        Commands::Prefs(cmd) => prefs(ctx, cmd).await?,
        Commands::Thread(cmd) => thread(ctx, cmd).await?,
        Commands::Cache(cmd) => cache(ctx, cmd).await?,
        Commands::Tools(cmd) => tools(ctx, cmd).await?,
        Commands::Stats => {
            let stats = ctx.stats().await.context("Failed to collect statistics")?;
            serde_json::to_string_pretty(&stats)?
        }
        Commands::Run => bail!("`run` is a long-running command; use run_maintenance"),
    };
    ctx.flush().await.context("Failed to flush storage")?;
    Ok(output)
}

/// Reseed preferences from `file`.
///
/// Refuses when users already hold learned preferences unless `force`.
pub async fn seed(ctx: &MemoryContext, file: &Path, force: bool) -> Result<String> {
    let seed = SeedData::from_file(file)
        .with_context(|| format!("Failed to read seed file {}", file.display()))?;
    if seed.is_empty() {
        return Ok(format!("Seed file {} holds no users", file.display()));
    }

    if !force && ctx.preferences().has_learned().await? {
        bail!("Learned preferences exist and would be discarded; rerun with --force");
    }

    let report = ctx.preferences().reseed(&seed).await?;
    Ok(format!(
        "Seeded {} users: {} preferences inserted, {} removed",
        report.users, report.inserted, report.deleted
    ))
}

async fn prefs(ctx: &MemoryContext, command: PrefsCommands) -> Result<String> {
    let memory = ctx.preferences();
    let output = match command {
        PrefsCommands::Users => {
            let mut users = memory.users().await?;
            users.sort();
            if users.is_empty() {
                "No users with stored preferences".to_string()
            } else {
                users.join("\n")
            }
        }
        PrefsCommands::List { user } => {
            let preferences = memory.retrieve_all(&user).await;
            recall_service::format_user_preferences(&user, &preferences)
        }
        PrefsCommands::Search { user, query, k } => {
            let k = k.unwrap_or(memory.settings().default_k);
            let found = memory.retrieve_relevant(&user, &query, k).await?;
            if found.is_empty() {
                format!("No preferences of {user} match \"{query}\"")
            } else {
                bullet_list(&found)
            }
        }
        PrefsCommands::Learn { user, text } => {
            let id = memory
                .learn(&user, &text, recall_types::RecordSource::Learned)
                .await?;
            format!("Stored preference {id} for {user}")
        }
        PrefsCommands::Clear { user } => {
            let removed = memory.clear(&user).await?;
            format!("Removed {removed} preferences of {user}")
        }
    };
    Ok(output)
}

async fn thread(ctx: &MemoryContext, command: ThreadCommands) -> Result<String> {
    let log = ctx.conversations();
    let output = match command {
        ThreadCommands::List => {
            let mut threads = log.threads().await?;
            threads.sort();
            if threads.is_empty() {
                "No conversation threads".to_string()
            } else {
                threads.join("\n")
            }
        }
        ThreadCommands::Show { thread_id, limit } => {
            let entries = log.read(&thread_id, limit).await?;
            if entries.is_empty() {
                format!("Thread {thread_id} is empty")
            } else {
                entries.iter().map(format_entry).collect::<Vec<_>>().join("\n")
            }
        }
        ThreadCommands::Append {
            thread_id,
            text,
            role,
        } => {
            let entry = log.append(&thread_id, Turn::new(role, text)).await?;
            format_entry(&entry)
        }
        ThreadCommands::Trim { thread_id, max } => {
            let removed = log.trim(&thread_id, max).await?;
            format!("Removed {removed} entries from {thread_id}")
        }
    };
    Ok(output)
}

async fn cache(ctx: &MemoryContext, command: CacheCommands) -> Result<String> {
    let cache = ctx.intent_cache();
    let output = match command {
        CacheCommands::Sweep => {
            let stats = cache.sweep_expired().await?;
            for error in &stats.errors {
                warn!(error = %error, "Sweep error");
            }
            format!(
                "Scanned {} namespaces, removed {} expired entries",
                stats.namespaces_scanned, stats.records_removed
            )
        }
        CacheCommands::Invalidate { user } => {
            let removed = cache.invalidate_user(&user).await?;
            format!("Removed {removed} cached decisions of {user}")
        }
        CacheCommands::List { user } => {
            let entries = cache.entries(&user).await?;
            if entries.is_empty() {
                format!("No cached decisions for {user}")
            } else {
                entries
                    .iter()
                    .map(|record| {
                        let decision = record
                            .metadata
                            .get(META_DECISION)
                            .and_then(CachedDecision::from_metadata)
                            .and_then(|d| serde_json::to_string(&d).ok())
                            .unwrap_or_else(|| "<unreadable>".to_string());
                        let expires = record
                            .expires_at()
                            .map(|t| t.to_rfc3339())
                            .unwrap_or_else(|| "never".to_string());
                        format!("{} | {} | expires {}", record.text, decision, expires)
                    })
                    .collect::<Vec<_>>()
                    .join("\n")
            }
        }
    };
    Ok(output)
}

async fn tools(ctx: &MemoryContext, command: ToolsCommands) -> Result<String> {
    let registry = ctx.tools();
    let output = match command {
        ToolsCommands::List => {
            let specs: Vec<Value> = registry
                .specs()
                .into_iter()
                .map(|spec| {
                    serde_json::json!({
                        "name": spec.name,
                        "description": spec.description,
                        "args_schema": spec.args_schema,
                    })
                })
                .collect();
            serde_json::to_string_pretty(&specs)?
        }
        ToolsCommands::Call { name, args } => {
            let args: Value = serde_json::from_str(&args).context("Tool arguments must be JSON")?;
            match registry.call(&name, args).await? {
                Value::String(text) => text,
                other => serde_json::to_string_pretty(&other)?,
            }
        }
    };
    Ok(output)
}

fn bullet_list(items: &[String]) -> String {
    items
        .iter()
        .map(|item| format!("- {item}"))
        .collect::<Vec<_>>()
        .join("\n")
}

fn format_entry(entry: &ConversationEntry) -> String {
    format!(
        "[{}] {} {}: {}",
        entry.sequence_index,
        entry.timestamp.format("%Y-%m-%d %H:%M:%S"),
        entry.role,
        entry.text()
    )
}

/// Run maintenance jobs until Ctrl+C or SIGTERM.
pub async fn run_maintenance(ctx: &MemoryContext) -> Result<()> {
    let settings = &ctx.settings().scheduler;
    let mut scheduler = SchedulerService::new(SchedulerConfig::from(settings))
        .await
        .context("Failed to create scheduler")?;
    let jobs = register_maintenance_jobs(&scheduler, ctx, settings)
        .await
        .context("Failed to register maintenance jobs")?;
    scheduler.start().await.context("Failed to start scheduler")?;
    info!(jobs, timezone = %settings.timezone, "Recall maintenance running");

    shutdown_signal().await?;

    scheduler.shutdown().await.context("Failed to stop scheduler")?;
    ctx.flush().await.context("Failed to flush storage")?;
    info!("Recall maintenance stopped");
    Ok(())
}

async fn shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        let mut terminate = signal::unix::signal(signal::unix::SignalKind::terminate())
            .context("Failed to install SIGTERM handler")?;
        tokio::select! {
            result = signal::ctrl_c() => {
                result.context("Failed to listen for Ctrl+C")?;
                info!("Received Ctrl+C, shutting down...");
            }
            _ = terminate.recv() => {
                info!("Received SIGTERM, shutting down...");
            }
        }
    }

    #[cfg(not(unix))]
    {
        signal::ctrl_c()
            .await
            .context("Failed to listen for Ctrl+C")?;
        info!("Received Ctrl+C, shutting down...");
    }

    Ok(())
}
