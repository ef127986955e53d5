//! CLI definitions using clap.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

pub mod commands;

/// ordersync - incremental two-way order sync with WooCommerce
#[derive(Parser, Debug)]
#[command(name = "ordersync", author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Database path (default: ~/.ordersync/data/ordersync.db)
    #[arg(long, global = true, env = "ORDERSYNC_DB")]
    pub db: Option<PathBuf>,

    /// Config file path (default: ~/.ordersync/config.json)
    #[arg(long, global = true, env = "ORDERSYNC_CONFIG")]
    pub config: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Increase logging verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (no output except errors)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create the database and a default config file
    Init {
        /// Overwrite existing database and config
        #[arg(long)]
        force: bool,
    },

    /// Print version information
    Version,

    /// Run one sync pass
    Run(RunArgs),

    /// Inspect or reset scan cursors
    Cursor {
        #[command(subcommand)]
        command: CursorCommands,
    },

    /// Show the persisted sync log
    Log {
        /// Maximum entries to show
        #[arg(long, short = 'n', default_value = "50")]
        limit: u32,

        /// Only show failed events
        #[arg(long)]
        errors: bool,

        /// Only show events of one run
        #[arg(long)]
        run: Option<String>,
    },

    /// Show cursor and correlation summary per entity
    Status,

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Supported shells for completions.
#[derive(clap::ValueEnum, Clone, Debug)]
pub enum Shell {
    Bash,
    Zsh,
    Fish,
    PowerShell,
    Elvish,
}

// ============================================================================
// Run
// ============================================================================

#[derive(Args, Debug, Default)]
pub struct RunArgs {
    /// Sync only this entity (default: every supported entity)
    #[arg(long, short = 'e')]
    pub entity: Option<String>,

    /// Override the configured direction (import, export, two-way)
    #[arg(long, short = 'd')]
    pub direction: Option<String>,

    /// Override the configured page size
    #[arg(long, short = 'l')]
    pub limit: Option<u32>,

    /// Log audit events to stderr instead of the sync log table
    #[arg(long)]
    pub no_log: bool,
}

// ============================================================================
// Cursor Commands
// ============================================================================

#[derive(Subcommand, Debug)]
pub enum CursorCommands {
    /// Show stored cursors
    Show {
        /// Cursor key, e.g. `import_orders` (default: all)
        key: Option<String>,
    },

    /// Open a new window ending now, discarding resume state
    Reset {
        /// Cursor key, e.g. `export_orders`
        key: String,
    },
}
