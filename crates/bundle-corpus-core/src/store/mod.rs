//! Storage abstraction for the corpus.
//!
//! The [`CorpusStore`] trait defines every operation the ingestion
//! pipeline, duplicate analyzer, and similarity engine need, so backends
//! (SQLite in the app crate, [`memory::InMemoryStore`] here) are
//! interchangeable.
//!
//! # Contract
//!
//! - Write batches (`register_words`, `register_resources`, `install_app`,
//!   `remove_app`) are atomic: readers see all of a batch or none of it.
//! - `install_app` decides what to do with an existing app inside the same
//!   write step that installs it, so two installs of one hash never both
//!   observe it as absent.
//! - `overlap` and `duplicate_candidates` read from one snapshot: sizes
//!   agree with postings and `apps_count` agrees with `apps`.
//! - Both directions of every association are indexed, so `members` and
//!   `apps_for` cost time proportional to their result, not the corpus.
//! - Queries naming an app that was never ingested fail with
//!   [`CorpusError::UnknownApp`]; an ingested app with no content yields an
//!   empty result.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};

use crate::error::{CorpusError, Result};
use crate::models::{
    AppCounts, AppId, AppRecord, ContentKind, CorpusTotals, DuplicateCandidate, IngestOutcome,
    NewApp, OnExisting, Overlap, PruneStats, ResourceEntry, ResourceRow, WordEntry, WordRow,
};

/// Abstract storage backend for the corpus.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`upsert_app`](CorpusStore::upsert_app) | Insert an app by content hash |
/// | [`register_words`](CorpusStore::register_words) | Upsert word rows and (word, app) associations |
/// | [`register_resources`](CorpusStore::register_resources) | Upsert resource rows and associations |
/// | [`install_app`](CorpusStore::install_app) | Install an app's full association set in one step |
/// | [`members`](CorpusStore::members) | Digests associated with one app |
/// | [`apps_for`](CorpusStore::apps_for) | Apps associated with one digest |
/// | [`overlap`](CorpusStore::overlap) | Set sizes and shared-digest groups for pairwise counting |
/// | [`duplicate_candidates`](CorpusStore::duplicate_candidates) | Items in at least `min_apps` apps |
#[async_trait]
pub trait CorpusStore: Send + Sync {
    /// Insert an app keyed by its content hash.
    ///
    /// With `strict` set, an existing hash fails with
    /// [`CorpusError::DuplicateApp`]. Otherwise an existing app is left
    /// untouched and its id returned.
    async fn upsert_app(&self, app: &NewApp, strict: bool) -> Result<AppId>;

    async fn get_app(&self, id: &AppId) -> Result<Option<AppRecord>>;

    /// All apps, ordered by id.
    async fn list_apps(&self) -> Result<Vec<AppRecord>>;

    /// Create missing word rows and set the in-app count of each
    /// (word, app) association. All-or-nothing per call.
    async fn register_words(&self, app_id: &AppId, words: &[WordEntry]) -> Result<()>;

    /// Same contract as [`register_words`](CorpusStore::register_words),
    /// keyed on the upstream resource digest.
    async fn register_resources(&self, app_id: &AppId, resources: &[ResourceEntry])
        -> Result<()>;

    /// Install an app with its full word and resource sets as one atomic
    /// step, applying `on_existing` if the hash is already stored:
    ///
    /// - `Replace`: rewrite the app row and swap its associations.
    /// - `Skip`: write nothing and report [`IngestOutcome::Skipped`].
    /// - `Fail`: write nothing and fail with [`CorpusError::DuplicateApp`].
    ///
    /// The existence check and the write happen under the same write lock.
    async fn install_app(
        &self,
        app: &NewApp,
        words: &[WordEntry],
        resources: &[ResourceEntry],
        on_existing: OnExisting,
    ) -> Result<IngestOutcome>;

    /// Delete an app and its associations. Returns false if it was absent.
    async fn remove_app(&self, id: &AppId) -> Result<bool>;

    /// Delete words and resources no app references any more.
    async fn prune(&self) -> Result<PruneStats>;

    /// Digests of one kind associated with `app_id`.
    async fn members(&self, kind: ContentKind, app_id: &AppId) -> Result<BTreeSet<String>>;

    /// Apps associated with `digest`. Unknown digests yield an empty set.
    async fn apps_for(&self, kind: ContentKind, digest: &str) -> Result<BTreeSet<AppId>>;

    /// Per-app distinct digest counts plus, for every digest shared by two
    /// or more of `app_ids`, the sorted list of those apps. Fails with
    /// [`CorpusError::UnknownApp`] if any requested app is missing.
    async fn overlap(&self, kind: ContentKind, app_ids: &[AppId]) -> Result<Overlap>;

    /// Items referenced by at least `min_apps` apps, unordered, optionally
    /// restricted to one category tag.
    async fn duplicate_candidates(
        &self,
        kind: ContentKind,
        min_apps: usize,
        category: Option<&str>,
    ) -> Result<Vec<DuplicateCandidate>>;

    /// `apps_count → number of items` over every referenced item.
    async fn occurrence_histogram(&self, kind: ContentKind) -> Result<BTreeMap<usize, usize>>;

    /// Per-app counts for every app, ordered by app id.
    async fn app_counts(&self) -> Result<Vec<AppCounts>>;

    async fn totals(&self) -> Result<CorpusTotals>;

    async fn word(&self, digest: &str) -> Result<Option<WordRow>>;

    async fn resource(&self, digest: &str) -> Result<Option<ResourceRow>>;

    /// Case-insensitive substring search over canonical word text, ordered
    /// by apps count (desc) then text, optionally restricted to one category.
    async fn search_words(
        &self,
        pattern: &str,
        category: Option<&str>,
        limit: usize,
    ) -> Result<Vec<DuplicateCandidate>>;

    /// [`install_app`](CorpusStore::install_app) with `OnExisting::Replace`.
    async fn replace_app(
        &self,
        app: &NewApp,
        words: &[WordEntry],
        resources: &[ResourceEntry],
    ) -> Result<AppId> {
        self.install_app(app, words, resources, OnExisting::Replace)
            .await?;
        Ok(app.id.clone())
    }

    /// Fetch an app or fail with [`CorpusError::UnknownApp`].
    async fn require_app(&self, id: &AppId) -> Result<AppRecord> {
        self.get_app(id)
            .await?
            .ok_or_else(|| CorpusError::UnknownApp(id.clone()))
    }

    async fn words_for_app(&self, app_id: &AppId) -> Result<BTreeSet<String>> {
        self.members(ContentKind::Word, app_id).await
    }

    async fn apps_for_word(&self, digest: &str) -> Result<BTreeSet<AppId>> {
        self.apps_for(ContentKind::Word, digest).await
    }

    async fn resources_for_app(&self, app_id: &AppId) -> Result<BTreeSet<String>> {
        self.members(ContentKind::Resource, app_id).await
    }

    async fn apps_for_resource(&self, digest: &str) -> Result<BTreeSet<AppId>> {
        self.apps_for(ContentKind::Resource, digest).await
    }
}
