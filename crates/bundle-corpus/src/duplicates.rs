//! `bcx duplicates`: ranked duplicates for one content kind.

use anyhow::Result;

use bundle_corpus_core::analyzer::{duplication_stats, top_duplicates};
use bundle_corpus_core::report::format_bytes;
use bundle_corpus_core::ContentKind;

use crate::analyze::truncate;
use crate::config::Config;
use crate::sqlite_store::SqliteStore;

pub async fn run_duplicates(
    config: &Config,
    kind: ContentKind,
    top: Option<usize>,
    min_apps: Option<usize>,
    category: Option<&str>,
    json: bool,
) -> Result<()> {
    let n = top.unwrap_or(config.analysis.top_n);
    let min_apps = min_apps.unwrap_or(config.analysis.min_apps);
    if min_apps < 2 {
        anyhow::bail!("--min-apps must be >= 2");
    }

    let store = SqliteStore::open(config).await?;
    let result = async {
        let entries = top_duplicates(&store, kind, n, min_apps, category).await?;
        let stats = duplication_stats(&store, kind).await?;
        Ok::<_, bundle_corpus_core::CorpusError>((entries, stats))
    }
    .await;
    store.close().await;
    let (entries, stats) = result?;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({
                "kind": kind,
                "min_apps": min_apps,
                "category": category,
                "stats": stats,
                "top": entries,
            }))?
        );
        return Ok(());
    }

    if entries.is_empty() {
        match category {
            Some(c) => println!(
                "No {} {} shared by {} or more apps.",
                c,
                plural(kind),
                min_apps
            ),
            None => println!("No {} shared by {} or more apps.", plural(kind), min_apps),
        }
        return Ok(());
    }

    for (i, e) in entries.iter().enumerate() {
        let label = match kind {
            ContentKind::Word => truncate(&e.label, 60),
            ContentKind::Resource => format!(
                "{} ({}, {})",
                e.example_name.as_deref().unwrap_or(&e.label),
                format_bytes(e.size.unwrap_or(0)),
                truncate(&e.digest, 16)
            ),
        };
        println!(
            "{}. [{}] {}  apps: {}  occurrences: {}",
            i + 1,
            e.category,
            label,
            e.apps_count,
            e.total_occurrences
        );
        let apps: Vec<&str> = e.apps.iter().map(|a| a.as_str()).collect();
        println!("    {}", apps.join(", "));
    }
    println!();
    println!(
        "{} distinct {}, {} duplicated, rate {:.1}%",
        stats.distinct_items,
        plural(kind),
        stats.duplicated_items,
        stats.duplication_rate_pct
    );
    Ok(())
}

fn plural(kind: ContentKind) -> &'static str {
    match kind {
        ContentKind::Word => "words",
        ContentKind::Resource => "resources",
    }
}
