//! Database statistics and health overview.
//!
//! Provides a quick summary of what's in the corpus: app, word and
//! resource counts, association counts, database size and a per-app
//! breakdown. Used by `bcx stats` to confirm that ingestion landed.

use anyhow::Result;

use bundle_corpus_core::report::format_bytes;
use bundle_corpus_core::store::CorpusStore;

use crate::analyze::truncate;
use crate::config::Config;
use crate::sqlite_store::SqliteStore;

/// Run the stats command: query the database and print a summary.
pub async fn run_stats(config: &Config) -> Result<()> {
    let store = SqliteStore::open(config).await?;
    let result = async {
        let totals = store.totals().await?;
        let counts = store.app_counts().await?;
        Ok::<_, bundle_corpus_core::CorpusError>((totals, counts))
    }
    .await;
    store.close().await;
    let (totals, counts) = result?;

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("Bundle Corpus: Database Stats");
    println!("=============================");
    println!();
    println!("  Database:    {}", config.db.path.display());
    println!("  Size:        {}", format_bytes(db_size));
    println!();
    println!("  Apps:        {}", totals.apps);
    println!(
        "  Words:       {} ({} associations)",
        totals.words, totals.word_associations
    );
    println!(
        "  Resources:   {} ({} associations)",
        totals.resources, totals.resource_associations
    );

    if !counts.is_empty() {
        println!();
        println!("  By app:");
        println!(
            "  {:<24} {:>8} {:>9} {:>10} {:>10}   {}",
            "APP", "WORDS", "EXCLUSIVE", "RESOURCES", "BYTES", "INGESTED"
        );
        println!("  {}", "-".repeat(84));

        for c in &counts {
            let label = if c.app.name.is_empty() {
                c.app.id.to_string()
            } else {
                c.app.name.clone()
            };
            println!(
                "  {:<24} {:>8} {:>9} {:>10} {:>10}   {}",
                truncate(&label, 24),
                c.word_distinct,
                c.word_exclusive,
                c.resource_distinct,
                format_bytes(c.resource_bytes),
                format_ts_relative(c.app.ingested_at)
            );
        }
    }

    println!();
    Ok(())
}

/// Format a Unix timestamp as a relative time string (e.g. "3 hours ago").
pub fn format_ts_relative(ts: i64) -> String {
    let now = chrono::Utc::now().timestamp();
    let delta = now - ts;

    if delta < 0 {
        return format_ts_iso(ts);
    }

    if delta < 60 {
        "just now".to_string()
    } else if delta < 3600 {
        let mins = delta / 60;
        format!("{} min{} ago", mins, if mins == 1 { "" } else { "s" })
    } else if delta < 86400 {
        let hours = delta / 3600;
        format!("{} hour{} ago", hours, if hours == 1 { "" } else { "s" })
    } else if delta < 86400 * 30 {
        let days = delta / 86400;
        format!("{} day{} ago", days, if days == 1 { "" } else { "s" })
    } else {
        format_ts_iso(ts)
    }
}

pub fn format_ts_iso(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| ts.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_timestamps() {
        let now = chrono::Utc::now().timestamp();
        assert_eq!(format_ts_relative(now), "just now");
        assert_eq!(format_ts_relative(now - 7200), "2 hours ago");
        assert_eq!(format_ts_relative(now - 86400), "1 day ago");
        assert_eq!(format_ts_iso(0), "1970-01-01 00:00");
    }
}
