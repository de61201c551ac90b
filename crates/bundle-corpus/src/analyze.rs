//! `bcx analyze`: build the full analysis report.
//!
//! The report is a JSON document (written to `--output`, or to stdout with
//! `--json`). Unless `--json` is given, a short human summary is printed
//! on stdout: corpus totals, the top duplicated words and resources,
//! duplication rates, the most similar pairs and the optimization hints.

use anyhow::{Context, Result};
use std::path::Path;

use bundle_corpus_core::report::{build_report, format_bytes, AnalysisReport, HintLevel};
use bundle_corpus_core::{AppId, CancelFlag};

use crate::config::Config;
use crate::sqlite_store::SqliteStore;

/// How many rows of each ranking the summary shows.
const SUMMARY_ROWS: usize = 10;

pub async fn run_analyze(
    config: &Config,
    top: Option<usize>,
    min_apps: Option<usize>,
    apps: &[String],
    output: Option<&Path>,
    json: bool,
    cancel: CancelFlag,
) -> Result<()> {
    let mut opts = config.report_options();
    if let Some(top) = top {
        opts.top_n = top;
    }
    if let Some(min_apps) = min_apps {
        if min_apps < 2 {
            anyhow::bail!("--min-apps must be >= 2");
        }
        opts.min_apps = min_apps;
    }
    if !apps.is_empty() {
        opts.apps = Some(
            apps.iter()
                .map(|a| AppId::new(a.trim().to_ascii_lowercase()))
                .collect(),
        );
    }

    let store = SqliteStore::open(config).await?;
    let result = build_report(&store, &opts, &cancel).await;
    store.close().await;
    let report = result?;

    let rendered = serde_json::to_string_pretty(&report)?;
    if let Some(path) = output {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        std::fs::write(path, &rendered)
            .with_context(|| format!("Failed to write report to {}", path.display()))?;
        eprintln!("Wrote analysis report to {}", path.display());
    }

    if json {
        println!("{}", rendered);
    } else {
        print_summary(&report);
    }
    Ok(())
}

fn print_summary(report: &AnalysisReport) {
    println!("Bundle Corpus: Analysis");
    println!("=======================");
    println!();
    println!("  Apps:        {}", report.totals.apps);
    println!("  Words:       {}", report.totals.words);
    println!("  Resources:   {}", report.totals.resources);
    println!(
        "  Word dup rate:      {:.1}%",
        report.words.stats.duplication_rate_pct
    );
    println!(
        "  Resource dup rate:  {:.1}%",
        report.resources.stats.duplication_rate_pct
    );
    println!(
        "  Potential savings:  {}",
        format_bytes(report.resource_savings_bytes)
    );

    if !report.words.top.is_empty() {
        println!();
        println!("  Top shared words (min {} apps):", report.min_apps);
        println!("  {:>5} {:>8}  {:<16} {}", "APPS", "TOTAL", "CATEGORY", "WORD");
        println!("  {}", "-".repeat(70));
        for e in report.words.top.iter().take(SUMMARY_ROWS) {
            println!(
                "  {:>5} {:>8}  {:<16} {}",
                e.apps_count,
                e.total_occurrences,
                e.category,
                truncate(&e.label, 48)
            );
        }
    }

    if !report.resources.top.is_empty() {
        println!();
        println!("  Top shared resources:");
        println!("  {:>5} {:>10}  {:<12} {}", "APPS", "SIZE", "CATEGORY", "EXAMPLE");
        println!("  {}", "-".repeat(70));
        for e in report.resources.top.iter().take(SUMMARY_ROWS) {
            println!(
                "  {:>5} {:>10}  {:<12} {}",
                e.apps_count,
                format_bytes(e.size.unwrap_or(0)),
                e.category,
                e.example_name.as_deref().unwrap_or(&e.label)
            );
        }
    }

    println!();
    match &report.similarity.most_similar_pair {
        Some(p) => println!("  Most similar (words):    {} / {}  {:.3}", p.a, p.b, p.score),
        None => println!("  Most similar (words):    n/a"),
    }
    match &report.similarity.most_similar_combined {
        Some(p) => println!("  Most similar (combined): {} / {}  {:.3}", p.a, p.b, p.score),
        None => println!("  Most similar (combined): n/a"),
    }

    if !report.hints.is_empty() {
        println!();
        println!("  Hints:");
        for hint in &report.hints {
            let tag = match hint.level {
                HintLevel::Info => "info",
                HintLevel::Warning => "warn",
                HintLevel::High => "HIGH",
            };
            println!("  [{}] {}", tag, hint.message);
        }
    }
    println!();
}

/// Truncate to `max` characters, marking the cut with an ellipsis.
pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max.saturating_sub(1)).collect();
    out.push('…');
    out
}
