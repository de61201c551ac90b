//! `bcx search`: case-insensitive substring search over canonical words.

use anyhow::Result;

use bundle_corpus_core::store::CorpusStore;

use crate::analyze::truncate;
use crate::config::Config;
use crate::sqlite_store::SqliteStore;

pub async fn run_search(
    config: &Config,
    pattern: &str,
    category: Option<&str>,
    limit: usize,
    json: bool,
) -> Result<()> {
    if pattern.trim().is_empty() {
        println!("No results.");
        return Ok(());
    }

    let store = SqliteStore::open(config).await?;
    let result = store.search_words(pattern, category, limit).await;
    store.close().await;
    let hits = result?;

    if json {
        let rows: Vec<_> = hits
            .iter()
            .map(|h| {
                serde_json::json!({
                    "word": h.label,
                    "digest": h.digest,
                    "category": h.category,
                    "apps_count": h.apps_count,
                    "total_occurrences": h.total_occurrences,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    if hits.is_empty() {
        println!("No results.");
        return Ok(());
    }
    println!("  {:>5} {:>8}  {:<16} {}", "APPS", "TOTAL", "CATEGORY", "WORD");
    println!("  {}", "-".repeat(70));
    for h in &hits {
        println!(
            "  {:>5} {:>8}  {:<16} {}",
            h.apps_count,
            h.total_occurrences,
            h.category,
            truncate(&h.label, 48)
        );
    }
    Ok(())
}
