use anyhow::Result;
use clap::Parser;

mod cli;
mod commands;

use error_logs::{config, init_tracing};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let args = cli::Cli::parse();

    match args.get_command() {
        // Version needs neither config nor logging
        cli::Commands::Version => {
            println!("error-logs v{}", env!("CARGO_PKG_VERSION"));
        }
        command => {
            // Load configuration first so logging honours server.log_level/log_format
            let cfg = config::load_config(&args.config)?;
            init_tracing(&cfg.server.log_level, &cfg.server.log_format);
            run(command, &args, cfg).await?;
        }
    }

    Ok(())
}

/// Dispatch to appropriate command handler
async fn run(command: cli::Commands, args: &cli::Cli, cfg: config::Config) -> Result<()> {
    match command {
        cli::Commands::Start => commands::start::execute(cfg).await,
        cli::Commands::Check => commands::check::execute(&args.config, cfg).await,
        cli::Commands::Keys { action } => match action {
            cli::KeyCommands::Create { name, project_id } => {
                commands::keys::create(&cfg, &name, project_id).await
            }
        },
        cli::Commands::Version => Ok(()),
    }
}
