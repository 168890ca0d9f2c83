use clap::{Parser, Subcommand};
use std::path::PathBuf;
use uuid::Uuid;

#[derive(Parser, Debug)]
#[command(name = "error-logs", version, about = "Error log ingestion service")]
pub struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "config.toml", global = true)]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Start the server (default)
    Start,

    /// Validate configuration and check database and queue connectivity
    Check,

    /// API key management
    Keys {
        #[command(subcommand)]
        action: KeyCommands,
    },

    /// Show version information
    Version,
}

#[derive(Subcommand, Debug, Clone)]
pub enum KeyCommands {
    /// Create a new API key and print it once
    Create {
        /// Human-readable name for the key
        #[arg(short, long)]
        name: String,

        /// Optional project the key belongs to
        #[arg(short, long)]
        project_id: Option<Uuid>,
    },
}

impl Cli {
    /// Get the command to execute, defaulting to Start if none provided
    pub fn get_command(&self) -> Commands {
        self.command.clone().unwrap_or(Commands::Start)
    }
}
