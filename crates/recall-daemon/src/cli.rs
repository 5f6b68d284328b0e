//! CLI argument parsing for the recall binary.
//!
//! Flags given here override every other configuration source.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use recall_types::Role;

/// Semantic memory for the travel agent
///
/// Administers stored preferences, conversation threads and the intent
/// cache, and runs background maintenance.
#[derive(Parser, Debug)]
#[command(name = "recall")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to config file (overrides default ~/.config/recall/config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Set log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true)]
    pub log_level: Option<String>,

    /// Override database path
    #[arg(long, global = true)]
    pub db_path: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Load preferences from a seed file, replacing those of seeded users
    Seed {
        /// JSON seed file ({"user_memories": {...}})
        #[arg(short, long)]
        file: PathBuf,

        /// Reseed even when users have learned preferences
        #[arg(long)]
        force: bool,
    },

    /// Stored user preferences
    #[command(subcommand)]
    Prefs(PrefsCommands),

    /// Conversation threads
    #[command(subcommand)]
    Thread(ThreadCommands),

    /// Semantic intent cache
    #[command(subcommand)]
    Cache(CacheCommands),

    /// Agent memory tools
    #[command(subcommand)]
    Tools(ToolsCommands),

    /// Show storage and cache statistics as JSON
    Stats,

    /// Run background maintenance until interrupted
    Run,
}

#[derive(Subcommand, Debug, Clone)]
pub enum PrefsCommands {
    /// List users with stored preferences
    Users,

    /// List every preference of a user
    List { user: String },

    /// Preferences of a user relevant to a query
    Search {
        user: String,
        query: String,

        /// Maximum results (default from config)
        #[arg(short, long)]
        k: Option<usize>,
    },

    /// Store a new preference
    Learn { user: String, text: String },

    /// Delete every preference of a user
    Clear { user: String },
}

#[derive(Subcommand, Debug, Clone)]
pub enum ThreadCommands {
    /// List known threads
    List,

    /// Show the entries of a thread
    Show {
        thread_id: String,

        /// Most recent entries only
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },

    /// Append a turn to a thread
    Append {
        thread_id: String,
        text: String,

        #[arg(short, long, default_value = "user")]
        role: Role,
    },

    /// Evict the oldest entries, keeping at most `max`
    Trim {
        thread_id: String,

        #[arg(long)]
        max: usize,
    },
}

#[derive(Subcommand, Debug, Clone)]
pub enum CacheCommands {
    /// Delete expired entries now
    Sweep,

    /// Delete every cached decision of a user
    Invalidate { user: String },

    /// List cached decisions of a user
    List { user: String },
}

#[derive(Subcommand, Debug, Clone)]
pub enum ToolsCommands {
    /// List tools with their argument schemas
    List,

    /// Invoke a tool
    Call {
        name: String,

        /// Arguments as a JSON object
        #[arg(short, long, default_value = "{}")]
        args: String,
    },
}
