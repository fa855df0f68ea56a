/// CLI argument parsing

use clap::{Parser, Subcommand};
use std::path::PathBuf;

// Build timestamp injected at compile time
pub const VERSION_WITH_BUILD: &str = concat!(env!("CARGO_PKG_VERSION"), " (built: ", env!("BUILD_TIMESTAMP"), ")");

#[derive(Parser)]
#[command(name = "store-admin")]
#[command(author, version = VERSION_WITH_BUILD, about, long_about = None)]
pub struct Cli {
    /// Path to the .env configuration file
    #[arg(long, global = true)]
    pub env_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Database backup operations
    Backup {
        #[command(subcommand)]
        command: BackupCommands,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },

    /// Allow-listed maintenance scripts
    Script {
        #[command(subcommand)]
        command: ScriptCommands,
    },

    /// Run HTTP API server mode
    #[cfg(feature = "server")]
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "3000")]
        port: u16,

        /// Host to bind to
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Enable CORS for cross-origin requests
        #[arg(long)]
        cors: bool,
    },
}

#[derive(Subcommand)]
pub enum BackupCommands {
    /// Dump the database into a new backup file
    Create,

    /// List backups, newest first
    List,

    /// Load a backup into the database, replacing its contents
    Restore {
        /// Backup file name as shown by `backup list`
        file: String,

        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },

    /// Delete a backup file
    Delete { file: String },

    /// Copy a backup file out of the backup directory
    Download {
        file: String,

        /// Destination path (default: the file name in the current directory)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// View configuration
    View,

    /// Validate configuration
    Validate,

    /// Set a configuration value in the .env file
    Set { key: String, value: String },
}

#[derive(Subcommand)]
pub enum ScriptCommands {
    /// List configured scripts
    List,

    /// Run a configured script by name
    Run { name: String },
}
