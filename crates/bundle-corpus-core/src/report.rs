//! Report assembly: one immutable [`AnalysisReport`] per analysis run.
//!
//! [`assemble`] is pure aggregation over already-computed parts. It keeps
//! the analyzer's ranking and the matrix row order as given and only adds
//! optimization hints derived from [`HintThresholds`]. [`build_report`]
//! gathers the parts from a store and then calls [`assemble`].

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

use crate::analyzer::{self, DuplicateEntry, DuplicationStats};
use crate::cancel::CancelFlag;
use crate::error::Result;
use crate::models::{AppCounts, AppId, ContentKind, CorpusTotals};
use crate::similarity::{self, SimilarPair, SimilarityMatrix, SimilarityWeights};
use crate::store::CorpusStore;

/// Thresholds that turn numbers into hints.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct HintThresholds {
    pub duplicate_rate_warn_pct: f64,
    pub duplicate_rate_high_pct: f64,
    pub savings_bytes: u64,
    pub high_similarity: f64,
}

impl Default for HintThresholds {
    fn default() -> Self {
        Self {
            duplicate_rate_warn_pct: 30.0,
            duplicate_rate_high_pct: 50.0,
            savings_bytes: 1024 * 1024,
            high_similarity: 0.8,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ReportOptions {
    pub top_n: usize,
    pub min_apps: usize,
    pub weights: SimilarityWeights,
    pub thresholds: HintThresholds,
    /// Restrict the per-app summaries and similarity matrices to these
    /// apps. Duplicate rankings and statistics stay corpus-wide.
    pub apps: Option<Vec<AppId>>,
}

impl Default for ReportOptions {
    fn default() -> Self {
        Self {
            top_n: 20,
            min_apps: 2,
            weights: SimilarityWeights::default(),
            thresholds: HintThresholds::default(),
            apps: None,
        }
    }
}

/// Per-app summary line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppSummary {
    pub id: AppId,
    pub name: String,
    pub bundle_id: String,
    pub version: String,
    /// Sum of in-app word counts.
    pub total_words: u64,
    pub unique_words: usize,
    /// Words found in no other app.
    pub exclusive_words: usize,
    pub total_resources: u64,
    pub unique_resources: usize,
    pub resource_bytes: u64,
}

impl From<AppCounts> for AppSummary {
    fn from(c: AppCounts) -> Self {
        Self {
            id: c.app.id,
            name: c.app.name,
            bundle_id: c.app.bundle_id,
            version: c.app.version,
            total_words: c.word_total,
            unique_words: c.word_distinct,
            exclusive_words: c.word_exclusive,
            total_resources: c.resource_total,
            unique_resources: c.resource_distinct,
            resource_bytes: c.resource_bytes,
        }
    }
}

/// Analyzer output for one content kind.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DuplicateSection {
    pub top: Vec<DuplicateEntry>,
    pub category_breakdown: BTreeMap<String, usize>,
    pub stats: DuplicationStats,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimilaritySection {
    pub weights: SimilarityWeights,
    pub words: SimilarityMatrix,
    pub resources: SimilarityMatrix,
    pub combined: SimilarityMatrix,
    /// Best pair by word-set Jaccard.
    pub most_similar_pair: Option<SimilarPair>,
    /// Best pair by combined score.
    pub most_similar_combined: Option<SimilarPair>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HintLevel {
    Info,
    Warning,
    High,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Hint {
    pub level: HintLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisReport {
    /// RFC 3339 timestamp of assembly.
    pub generated_at: String,
    pub min_apps: usize,
    pub totals: CorpusTotals,
    pub apps: Vec<AppSummary>,
    pub words: DuplicateSection,
    pub resources: DuplicateSection,
    /// `Σ size × (apps_count − 1)` over shared resources.
    pub resource_savings_bytes: u64,
    pub similarity: SimilaritySection,
    pub thresholds: HintThresholds,
    pub hints: Vec<Hint>,
}

/// Everything [`assemble`] needs, computed elsewhere.
#[derive(Debug, Clone)]
pub struct ReportParts {
    pub min_apps: usize,
    pub totals: CorpusTotals,
    pub app_counts: Vec<AppCounts>,
    pub words: DuplicateSection,
    pub resources: DuplicateSection,
    pub resource_savings_bytes: u64,
    pub similarity: SimilaritySection,
}

pub fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

fn rate_hint(label: &str, rate: f64, t: &HintThresholds) -> Option<Hint> {
    let level = if rate >= t.duplicate_rate_high_pct {
        HintLevel::High
    } else if rate >= t.duplicate_rate_warn_pct {
        HintLevel::Warning
    } else {
        return None;
    };
    let limit = match level {
        HintLevel::High => t.duplicate_rate_high_pct,
        _ => t.duplicate_rate_warn_pct,
    };
    Some(Hint {
        level,
        message: format!(
            "{} duplicate rate {:.1}% is above {:.1}%; consider a shared module",
            label, rate, limit
        ),
    })
}

/// Derive hints from the report numbers. Order: word rate, resource rate,
/// savings, then highly similar pairs best first.
pub fn derive_hints(parts: &ReportParts, t: &HintThresholds) -> Vec<Hint> {
    let mut hints = Vec::new();
    hints.extend(rate_hint("Word", parts.words.stats.duplication_rate_pct, t));
    hints.extend(rate_hint(
        "Resource",
        parts.resources.stats.duplication_rate_pct,
        t,
    ));

    if parts.resource_savings_bytes > 0 && parts.resource_savings_bytes >= t.savings_bytes {
        hints.push(Hint {
            level: HintLevel::Warning,
            message: format!(
                "Potential space savings of {} by sharing duplicated resources",
                format_bytes(parts.resource_savings_bytes)
            ),
        });
    }

    for pair in parts
        .similarity
        .combined
        .pairs_at_least(t.high_similarity)
    {
        if pair.score <= 0.0 {
            continue;
        }
        hints.push(Hint {
            level: HintLevel::Info,
            message: format!(
                "Apps {} and {} are {:.0}% similar; candidates for a common codebase",
                pair.a,
                pair.b,
                pair.score * 100.0
            ),
        });
    }
    hints
}

/// Combine precomputed parts into the final report.
pub fn assemble(parts: ReportParts, thresholds: HintThresholds) -> AnalysisReport {
    let hints = derive_hints(&parts, &thresholds);
    AnalysisReport {
        generated_at: chrono::Utc::now().to_rfc3339(),
        min_apps: parts.min_apps,
        totals: parts.totals,
        apps: parts.app_counts.into_iter().map(AppSummary::from).collect(),
        words: parts.words,
        resources: parts.resources,
        resource_savings_bytes: parts.resource_savings_bytes,
        similarity: parts.similarity,
        thresholds,
        hints,
    }
}

async fn duplicate_section<S: CorpusStore + ?Sized>(
    store: &S,
    kind: ContentKind,
    opts: &ReportOptions,
) -> Result<DuplicateSection> {
    Ok(DuplicateSection {
        top: analyzer::top_duplicates(store, kind, opts.top_n, opts.min_apps, None).await?,
        category_breakdown: analyzer::category_breakdown(store, kind, opts.min_apps).await?,
        stats: analyzer::duplication_stats(store, kind).await?,
    })
}

/// Run the analyzer and similarity engine and assemble.
///
/// Covers every app unless `opts.apps` names a subset; naming an app that
/// was never ingested fails with [`CorpusError::UnknownApp`](crate::CorpusError::UnknownApp).
pub async fn build_report<S: CorpusStore + ?Sized>(
    store: &S,
    opts: &ReportOptions,
    cancel: &CancelFlag,
) -> Result<AnalysisReport> {
    opts.weights.validate()?;
    let records = match &opts.apps {
        None => store.list_apps().await?,
        Some(wanted) => {
            let mut seen = BTreeSet::new();
            let mut records = Vec::with_capacity(wanted.len());
            for id in wanted {
                if seen.insert(id.clone()) {
                    records.push(store.require_app(id).await?);
                }
            }
            records
        }
    };
    let ids: Vec<AppId> = records.iter().map(|r| r.id.clone()).collect();
    let selected: BTreeSet<&AppId> = ids.iter().collect();
    tracing::debug!(apps = ids.len(), top_n = opts.top_n, "building analysis report");

    let words = duplicate_section(store, ContentKind::Word, opts).await?;
    cancel.check()?;
    let resources = duplicate_section(store, ContentKind::Resource, opts).await?;
    cancel.check()?;

    let word_matrix = similarity::similarity_matrix(store, ContentKind::Word, &ids, cancel).await?;
    let resource_matrix =
        similarity::similarity_matrix(store, ContentKind::Resource, &ids, cancel).await?;
    let combined =
        similarity::combined_matrix(&word_matrix, &resource_matrix, &records, &opts.weights)?;

    let parts = ReportParts {
        min_apps: opts.min_apps,
        totals: store.totals().await?,
        app_counts: store
            .app_counts()
            .await?
            .into_iter()
            .filter(|c| selected.contains(&c.app.id))
            .collect(),
        words,
        resources,
        resource_savings_bytes: analyzer::resource_savings(store).await?,
        similarity: SimilaritySection {
            weights: opts.weights,
            most_similar_pair: word_matrix.most_similar_pair(),
            most_similar_combined: combined.most_similar_pair(),
            words: word_matrix,
            resources: resource_matrix,
            combined,
        },
    };
    Ok(assemble(parts, opts.thresholds))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NewApp, ResourceEntry, WordEntry};
    use crate::store::memory::InMemoryStore;

    fn app(id: &str, bundle: &str) -> NewApp {
        NewApp {
            id: AppId::new(id),
            name: id.to_uppercase(),
            bundle_id: bundle.to_string(),
            version: "1".to_string(),
        }
    }

    fn w(text: &str, count: u64) -> WordEntry {
        WordEntry {
            text: text.to_string(),
            category: "ui_text".to_string(),
            count,
        }
    }

    fn r(digest: &str, size: u64) -> ResourceEntry {
        ResourceEntry {
            digest: digest.to_string(),
            size,
            category: "image".to_string(),
            example_name: "icon.png".to_string(),
            count: 1,
        }
    }

    #[test]
    fn format_bytes_units() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(3 * 1024 * 1024), "3.0 MB");
    }

    #[tokio::test]
    async fn report_covers_all_apps_and_hints() {
        let store = InMemoryStore::new();
        store
            .replace_app(
                &app("x", "com.acme.mail"),
                &[w("login", 2), w("error:timeout", 1)],
                &[r("aa", 2 * 1024 * 1024)],
            )
            .await
            .unwrap();
        store
            .replace_app(
                &app("y", "com.acme.chat"),
                &[w("login", 1), w("submit", 1)],
                &[r("aa", 2 * 1024 * 1024)],
            )
            .await
            .unwrap();
        store
            .replace_app(&app("z", ""), &[], &[])
            .await
            .unwrap();

        let opts = ReportOptions {
            top_n: 10,
            min_apps: 2,
            ..ReportOptions::default()
        };
        let report = build_report(&store, &opts, &CancelFlag::new()).await.unwrap();

        assert_eq!(report.apps.len(), 3);
        let z = report.apps.iter().find(|a| a.id.as_str() == "z").unwrap();
        assert_eq!(z.total_words, 0);

        assert_eq!(report.words.top.len(), 1);
        assert_eq!(report.words.top[0].label, "login");
        assert_eq!(report.words.top[0].total_occurrences, 3);
        assert_eq!(report.words.category_breakdown["ui_text"], 1);
        assert_eq!(report.resource_savings_bytes, 2 * 1024 * 1024);

        let best = report.similarity.most_similar_pair.clone().unwrap();
        assert_eq!((best.a.as_str(), best.b.as_str()), ("x", "y"));
        assert!((best.score - 1.0 / 3.0).abs() < 1e-12);
        assert_eq!(report.similarity.words.scores[2][2], 0.0);

        assert!(report.hints.iter().any(|h| h.message.contains("space savings")));
        assert!(report
            .hints
            .iter()
            .any(|h| h.level == HintLevel::High && h.message.starts_with("Resource")));
    }

    #[tokio::test]
    async fn report_restricted_to_app_subset() {
        let store = InMemoryStore::new();
        for (id, words) in [
            ("a", vec![w("login", 1), w("alpha", 1)]),
            ("b", vec![w("login", 1)]),
            ("c", vec![w("login", 1), w("alpha", 1)]),
        ] {
            store.replace_app(&app(id, ""), &words, &[]).await.unwrap();
        }

        let opts = ReportOptions {
            apps: Some(vec![AppId::new("b"), AppId::new("a"), AppId::new("b")]),
            ..ReportOptions::default()
        };
        let report = build_report(&store, &opts, &CancelFlag::new()).await.unwrap();
        assert_eq!(report.apps.len(), 2);
        assert_eq!(
            report.similarity.words.apps,
            vec![AppId::new("b"), AppId::new("a")]
        );
        // Rankings stay corpus-wide.
        assert_eq!(report.words.top[0].apps_count, 3);

        let unknown = ReportOptions {
            apps: Some(vec![AppId::new("ghost")]),
            ..ReportOptions::default()
        };
        assert!(matches!(
            build_report(&store, &unknown, &CancelFlag::new()).await,
            Err(crate::CorpusError::UnknownApp(_))
        ));
    }

    #[tokio::test]
    async fn cancelled_report_fails() {
        let store = InMemoryStore::new();
        store.replace_app(&app("x", ""), &[w("login", 1)], &[]).await.unwrap();
        let cancel = CancelFlag::new();
        cancel.cancel();
        let err = build_report(&store, &ReportOptions::default(), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, crate::CorpusError::Cancelled));
    }
}
