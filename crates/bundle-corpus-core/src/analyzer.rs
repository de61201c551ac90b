//! Duplicate analysis: rank words and resources by cross-app breadth.
//!
//! # Ranking
//!
//! 1. Keep items referenced by at least `min_apps` apps.
//! 2. Order by `apps_count` (desc), `total_occurrences` (desc), label (asc).
//! 3. Keep the best `n` with a bounded min-heap, so a large duplicate set
//!    with a small `n` is never fully sorted.
//!
//! Candidates arrive with their app lists from the same store read, so an
//! entry's `apps` always has `apps_count` members.

use serde::Serialize;
use std::cmp::{Ordering, Reverse};
use std::collections::{BTreeMap, BinaryHeap};

use crate::error::Result;
use crate::models::{AppId, ContentKind, DuplicateCandidate};
use crate::store::CorpusStore;

/// One ranked duplicate, ready for reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DuplicateEntry {
    pub digest: String,
    /// Canonical text for words, digest for resources.
    pub label: String,
    pub category: String,
    pub apps_count: usize,
    pub total_occurrences: u64,
    pub apps: Vec<AppId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub example_name: Option<String>,
}

/// Corpus-wide duplication figures for one content kind.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DuplicationStats {
    /// Sum over apps of their distinct items (association count).
    pub total_occurrences: usize,
    /// Distinct items referenced by any app.
    pub distinct_items: usize,
    /// Items referenced by two or more apps.
    pub duplicated_items: usize,
    /// Sum of `apps_count - 1` over duplicated items.
    pub duplicate_occurrences: usize,
    /// `duplicate_occurrences / total_occurrences × 100`, 0 when empty.
    pub duplication_rate_pct: f64,
    /// `apps_count → number of items`.
    pub distribution: BTreeMap<usize, usize>,
}

/// Candidate wrapper whose `Ord` puts better-ranked items higher.
struct Ranked(DuplicateCandidate);

impl Ord for Ranked {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0
            .apps_count
            .cmp(&other.0.apps_count)
            .then_with(|| self.0.total_occurrences.cmp(&other.0.total_occurrences))
            .then_with(|| other.0.label.cmp(&self.0.label))
            .then_with(|| other.0.digest.cmp(&self.0.digest))
    }
}

impl PartialOrd for Ranked {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Ranked {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Ranked {}

/// Select the best `n` candidates in ranking order.
///
/// Runs in `O(m log n)` for `m` candidates.
pub fn select_top(candidates: Vec<DuplicateCandidate>, n: usize) -> Vec<DuplicateCandidate> {
    if n == 0 {
        return Vec::new();
    }
    let mut heap: BinaryHeap<Reverse<Ranked>> = BinaryHeap::with_capacity(n + 1);
    for c in candidates {
        heap.push(Reverse(Ranked(c)));
        if heap.len() > n {
            heap.pop();
        }
    }
    heap.into_sorted_vec()
        .into_iter()
        .map(|Reverse(Ranked(c))| c)
        .collect()
}

impl From<DuplicateCandidate> for DuplicateEntry {
    fn from(c: DuplicateCandidate) -> Self {
        Self {
            digest: c.digest,
            label: c.label,
            category: c.category,
            apps_count: c.apps_count,
            total_occurrences: c.total_occurrences,
            apps: c.apps,
            size: c.size,
            example_name: c.example_name,
        }
    }
}

/// Top `n` items of `kind` shared by at least `min_apps` apps, optionally
/// restricted to one category tag.
pub async fn top_duplicates<S: CorpusStore + ?Sized>(
    store: &S,
    kind: ContentKind,
    n: usize,
    min_apps: usize,
    category: Option<&str>,
) -> Result<Vec<DuplicateEntry>> {
    let candidates = store
        .duplicate_candidates(kind, min_apps.max(1), category)
        .await?;
    Ok(select_top(candidates, n)
        .into_iter()
        .map(DuplicateEntry::from)
        .collect())
}

/// Number of distinct items meeting `min_apps`, grouped by category.
pub async fn category_breakdown<S: CorpusStore + ?Sized>(
    store: &S,
    kind: ContentKind,
    min_apps: usize,
) -> Result<BTreeMap<String, usize>> {
    let mut breakdown = BTreeMap::new();
    for c in store.duplicate_candidates(kind, min_apps.max(1), None).await? {
        *breakdown.entry(c.category).or_insert(0) += 1;
    }
    Ok(breakdown)
}

/// Duplication statistics derived from the occurrence histogram.
pub async fn duplication_stats<S: CorpusStore + ?Sized>(
    store: &S,
    kind: ContentKind,
) -> Result<DuplicationStats> {
    let distribution = store.occurrence_histogram(kind).await?;
    Ok(stats_from_histogram(distribution))
}

pub fn stats_from_histogram(distribution: BTreeMap<usize, usize>) -> DuplicationStats {
    let mut stats = DuplicationStats::default();
    for (&apps, &items) in &distribution {
        stats.total_occurrences += apps * items;
        stats.distinct_items += items;
        if apps >= 2 {
            stats.duplicated_items += items;
            stats.duplicate_occurrences += (apps - 1) * items;
        }
    }
    stats.duplication_rate_pct = if stats.total_occurrences > 0 {
        stats.duplicate_occurrences as f64 / stats.total_occurrences as f64 * 100.0
    } else {
        0.0
    };
    stats.distribution = distribution;
    stats
}

/// Bytes reclaimable by keeping one copy of every shared resource:
/// `Σ size × (apps_count − 1)`.
pub async fn resource_savings<S: CorpusStore + ?Sized>(store: &S) -> Result<u64> {
    let shared = store
        .duplicate_candidates(ContentKind::Resource, 2, None)
        .await?;
    Ok(shared.iter().fold(0u64, |acc, c| {
        let extra = (c.apps_count as u64).saturating_sub(1);
        acc.saturating_add(c.size.unwrap_or(0).saturating_mul(extra))
    }))
}
