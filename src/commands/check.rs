use anyhow::{Context, Result};
use colored::Colorize;
use error_logs::{
    backend::QueueBackend,
    config::{Config, QueueConfig},
    server,
    store::SqliteStore,
};
use std::path::Path;
use tracing::info;

/// Execute the check command
///
/// Validates the configuration (already done while loading), then opens
/// the database and connects the queue backend without starting the server.
pub async fn execute(path: &Path, cfg: Config) -> Result<()> {
    println!("{}", "Checking configuration...".yellow());
    info!(path = %path.display(), "Configuration loaded and validated");

    println!("{}", "✓ Configuration valid".green());
    println!();

    println!("{}", "Configuration Summary:".bold());
    println!("  {}: {}:{}", "Server".cyan(), cfg.server.host, cfg.server.port);
    println!("  {}: {}", "Log Level".cyan(), cfg.server.log_level);
    println!("  {}: {}", "Log Format".cyan(), cfg.server.log_format);
    println!("  {}: {}", "Database".cyan(), cfg.database.url);
    let queue = match &cfg.queue {
        QueueConfig::Redis { url, pool_size } => format!("redis ({}, pool {})", url, pool_size),
        QueueConfig::Memory => "memory".to_string(),
    };
    println!("  {}: {}", "Queue Backend".cyan(), queue);
    println!(
        "  {}: list {}s, stats {}s",
        "Cache TTL".cyan(),
        cfg.cache.list_ttl_seconds,
        cfg.cache.stats_ttl_seconds
    );
    println!(
        "  {}: {}",
        "API Key Auth".cyan(),
        if cfg.auth.enabled {
            "enabled".green()
        } else {
            "disabled".red()
        }
    );
    println!();

    server::ensure_database_dir(&cfg.database.url)?;
    SqliteStore::new(&cfg.database.url, 1)
        .await
        .with_context(|| format!("Database check failed for {}", cfg.database.url))?;
    println!("{}", "✓ Database reachable, migrations applied".green());

    let backend = server::connect_backend(&cfg.queue).await?;
    backend.ping().await.context("Queue backend ping failed")?;
    println!("{}", "✓ Queue backend reachable".green());

    Ok(())
}
