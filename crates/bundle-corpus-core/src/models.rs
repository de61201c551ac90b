//! Core data models used throughout Bundle Corpus.
//!
//! These types describe the apps, words, resources, and associations that
//! flow from extraction output into a [`CorpusStore`](crate::store::CorpusStore)
//! and back out to the analyzer and similarity engine.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Stable identity of an analyzed bundle: the content hash of the bundle.
///
/// Names and versions change across releases; the hash does not, so
/// re-analysis of the same bytes always lands on the same app.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AppId(String);

impl AppId {
    pub fn new(hash: impl Into<String>) -> Self {
        Self(hash.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AppId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AppId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// The two content dimensions tracked per app.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    Word,
    Resource,
}

impl ContentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentKind::Word => "word",
            ContentKind::Resource => "resource",
        }
    }
}

/// App identity as supplied by the bundle unpacker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewApp {
    pub id: AppId,
    pub name: String,
    pub bundle_id: String,
    pub version: String,
}

/// An app row as stored in the corpus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppRecord {
    pub id: AppId,
    pub name: String,
    pub bundle_id: String,
    pub version: String,
    /// Unix timestamp of the ingestion that created this row.
    pub ingested_at: i64,
}

/// One canonical word of an app, already deduplicated within that app.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WordEntry {
    pub text: String,
    pub category: String,
    /// Occurrences inside this single app.
    pub count: u64,
}

/// One content-addressed resource of an app, deduplicated by digest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceEntry {
    pub digest: String,
    pub size: u64,
    pub category: String,
    pub example_name: String,
    pub count: u64,
}

/// A word row. Created on first sight of its digest, never rewritten
/// except for `last_seen`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WordRow {
    pub digest: String,
    pub text: String,
    pub category: String,
    pub first_seen: i64,
    pub last_seen: i64,
}

/// A resource row, keyed by the digest computed upstream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResourceRow {
    pub digest: String,
    pub size: u64,
    pub category: String,
    pub example_name: String,
    pub first_seen: i64,
    pub last_seen: i64,
}

/// An item referenced by at least `min_apps` apps, before ranking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateCandidate {
    pub digest: String,
    /// Canonical text for words, digest for resources.
    pub label: String,
    pub category: String,
    pub apps_count: usize,
    pub total_occurrences: u64,
    /// Declared size, resources only.
    pub size: Option<u64>,
    /// Example file name, resources only.
    pub example_name: Option<String>,
    /// Referencing apps, sorted. Read in the same snapshot as `apps_count`.
    pub apps: Vec<AppId>,
}

/// Everything pairwise similarity needs for one content kind, read from a
/// single snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Overlap {
    /// Distinct digests held by each requested app.
    pub sizes: HashMap<AppId, usize>,
    /// For every digest held by two or more requested apps, those apps
    /// in sorted order.
    pub postings: Vec<Vec<AppId>>,
}

/// Per-app association counts used for summaries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppCounts {
    pub app: AppRecord,
    /// Sum of in-app word counts.
    pub word_total: u64,
    /// Distinct words in this app.
    pub word_distinct: usize,
    /// Distinct words found in no other app.
    pub word_exclusive: usize,
    pub resource_total: u64,
    pub resource_distinct: usize,
    /// Sum of declared sizes of this app's distinct resources.
    pub resource_bytes: u64,
}

/// Row and association counts for the whole corpus.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CorpusTotals {
    pub apps: usize,
    pub words: usize,
    pub resources: usize,
    pub word_associations: usize,
    pub resource_associations: usize,
}

/// Rows removed by [`CorpusStore::prune`](crate::store::CorpusStore::prune).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PruneStats {
    pub words: usize,
    pub resources: usize,
}

/// What to do when an app with the same hash is already in the corpus.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OnExisting {
    /// Replace the app's associations atomically.
    #[default]
    Replace,
    /// Leave the stored app untouched.
    Skip,
    /// Strict insertion: fail with `DuplicateApp`.
    Fail,
}

/// Outcome of ingesting one app.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IngestOutcome {
    Inserted,
    Replaced,
    Skipped,
}
