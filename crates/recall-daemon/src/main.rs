//! recall: semantic memory for the travel agent.
//!
//! # Usage
//!
//! ```bash
//! recall seed --file memories.json [--force]
//! recall prefs list Mark
//! recall thread show trip-42 -n 10
//! recall cache sweep
//! recall stats
//! recall run
//! ```
//!
//! # Configuration
//!
//! Configuration is loaded in order (later sources override earlier):
//! 1. Built-in defaults
//! 2. Config file (~/.config/recall/config.toml)
//! 3. `--config` file
//! 4. Environment variables (RECALL_*)
//! 5. CLI flags

use anyhow::Result;
use clap::Parser;

use recall_daemon::{execute, init_logging, load_settings, open_context, run_maintenance, Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = load_settings(&cli)?;
    init_logging(&settings.log_level)?;

    let ctx = open_context(settings)?;
    match cli.command {
        Commands::Run => run_maintenance(&ctx).await?,
        command => println!("{}", execute(&ctx, command).await?),
    }
    Ok(())
}
