use anyhow::Result;
use colored::Colorize;
use error_logs::{config::Config, server};
use tracing::info;

/// Execute the start command
///
/// Blocks until the server shuts down.
pub async fn execute(cfg: Config) -> Result<()> {
    println!("{}", "Starting error-logs server...".green());
    info!(
        host = %cfg.server.host,
        port = cfg.server.port,
        "Starting error-logs"
    );

    server::start_server(cfg).await
}
