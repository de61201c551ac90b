//! `bcx apps`, `bcx remove` and `bcx prune`: app lifecycle commands.

use anyhow::Result;

use bundle_corpus_core::store::CorpusStore;
use bundle_corpus_core::AppId;

use crate::analyze::truncate;
use crate::config::Config;
use crate::sqlite_store::SqliteStore;
use crate::stats::format_ts_iso;

pub async fn run_list(config: &Config, json: bool) -> Result<()> {
    let store = SqliteStore::open(config).await?;
    let apps = store.list_apps().await;
    store.close().await;
    let apps = apps?;

    if json {
        println!("{}", serde_json::to_string_pretty(&apps)?);
        return Ok(());
    }
    if apps.is_empty() {
        println!("No apps ingested.");
        return Ok(());
    }
    println!(
        "  {:<18} {:<24} {:<28} {:<10} {}",
        "HASH", "NAME", "BUNDLE ID", "VERSION", "INGESTED"
    );
    println!("  {}", "-".repeat(100));
    for app in &apps {
        println!(
            "  {:<18} {:<24} {:<28} {:<10} {}",
            truncate(app.id.as_str(), 16),
            app.name,
            app.bundle_id,
            app.version,
            format_ts_iso(app.ingested_at)
        );
    }
    Ok(())
}

pub async fn run_remove(config: &Config, app: &str, prune: bool) -> Result<()> {
    let id = AppId::new(app.trim().to_ascii_lowercase());
    let store = SqliteStore::open(config).await?;
    let result = async {
        let removed = store.remove_app(&id).await?;
        let pruned = if removed && prune {
            Some(store.prune().await?)
        } else {
            None
        };
        Ok::<_, bundle_corpus_core::CorpusError>((removed, pruned))
    }
    .await;
    store.close().await;
    let (removed, pruned) = result?;

    if !removed {
        anyhow::bail!("unknown app: {}", id);
    }
    println!("removed {}", id);
    if let Some(stats) = pruned {
        println!(
            "pruned {} words, {} resources",
            stats.words, stats.resources
        );
    }
    Ok(())
}

pub async fn run_prune(config: &Config) -> Result<()> {
    let store = SqliteStore::open(config).await?;
    let stats = store.prune().await;
    store.close().await;
    let stats = stats?;
    println!(
        "pruned {} words, {} resources",
        stats.words, stats.resources
    );
    Ok(())
}
