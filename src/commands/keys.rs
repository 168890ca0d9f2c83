use anyhow::{Context, Result};
use colored::Colorize;
use error_logs::{
    auth::{generate_api_key, hash_api_key},
    config::Config,
    server,
    store::{ApiKeyStore, SqliteStore},
};
use tracing::info;
use uuid::Uuid;

/// Create an API key and print the raw value
///
/// Only the hash is stored, so the key cannot be shown again.
pub async fn create(cfg: &Config, name: &str, project_id: Option<Uuid>) -> Result<()> {
    if name.trim().is_empty() {
        anyhow::bail!("API key name cannot be empty");
    }

    server::ensure_database_dir(&cfg.database.url)?;
    let store = SqliteStore::new(&cfg.database.url, 1)
        .await
        .with_context(|| format!("Failed to open database {}", cfg.database.url))?;

    let raw_key = generate_api_key();
    let api_key = store
        .create_api_key(name, &hash_api_key(&raw_key), project_id)
        .await
        .context("Failed to store API key")?;

    info!(api_key_id = %api_key.id, name = %api_key.name, "API key created");

    println!("{}", "✓ API key created".green());
    println!("  {}: {}", "Name".cyan(), api_key.name);
    println!("  {}: {}", "ID".cyan(), api_key.id);
    println!("  {}: {}", "Key".cyan(), raw_key.bold());
    println!();
    println!("{}", "Store this key now; it will not be shown again.".yellow());

    Ok(())
}
