//! In-memory [`CorpusStore`] implementation for testing and embedding.
//!
//! The whole corpus lives in one `State` behind a single `std::sync::RwLock`.
//! Every write batch validates its input first and then mutates under one
//! write guard, so readers never observe half a batch.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;

use crate::digest::text_digest;
use crate::error::{CorpusError, Result};
use crate::models::{
    AppCounts, AppId, AppRecord, ContentKind, CorpusTotals, DuplicateCandidate, IngestOutcome,
    NewApp, OnExisting, Overlap, PruneStats, ResourceEntry, ResourceRow, WordEntry, WordRow,
};

use super::CorpusStore;

/// Two-way association index: app → (digest → in-app count) and
/// digest → apps.
#[derive(Default)]
struct Associations {
    by_app: HashMap<AppId, HashMap<String, u64>>,
    by_item: HashMap<String, BTreeSet<AppId>>,
}

impl Associations {
    fn set(&mut self, app: &AppId, digest: &str, count: u64) {
        self.by_app
            .entry(app.clone())
            .or_default()
            .insert(digest.to_string(), count);
        self.by_item
            .entry(digest.to_string())
            .or_default()
            .insert(app.clone());
    }

    fn clear_app(&mut self, app: &AppId) {
        if let Some(items) = self.by_app.remove(app) {
            for digest in items.keys() {
                if let Some(apps) = self.by_item.get_mut(digest) {
                    apps.remove(app);
                    if apps.is_empty() {
                        self.by_item.remove(digest);
                    }
                }
            }
        }
    }

    fn count(&self, app: &AppId, digest: &str) -> u64 {
        self.by_app
            .get(app)
            .and_then(|items| items.get(digest))
            .copied()
            .unwrap_or(0)
    }

    fn total_occurrences(&self, digest: &str, apps: &BTreeSet<AppId>) -> u64 {
        apps.iter().map(|a| self.count(a, digest)).sum()
    }

    fn len(&self) -> usize {
        self.by_app.values().map(|items| items.len()).sum()
    }
}

#[derive(Default)]
struct State {
    apps: BTreeMap<AppId, AppRecord>,
    words: HashMap<String, WordRow>,
    resources: HashMap<String, ResourceRow>,
    word_assoc: Associations,
    resource_assoc: Associations,
}

impl State {
    fn assoc(&self, kind: ContentKind) -> &Associations {
        match kind {
            ContentKind::Word => &self.word_assoc,
            ContentKind::Resource => &self.resource_assoc,
        }
    }

    fn require_app(&self, id: &AppId) -> Result<()> {
        if self.apps.contains_key(id) {
            Ok(())
        } else {
            Err(CorpusError::UnknownApp(id.clone()))
        }
    }

    /// Digest every word and reject collisions before anything is written.
    fn check_words(&self, words: &[WordEntry]) -> Result<Vec<String>> {
        let mut digests = Vec::with_capacity(words.len());
        let mut batch: HashMap<String, &str> = HashMap::new();
        for w in words {
            let digest = text_digest(&w.text);
            if let Some(existing) = self.words.get(&digest) {
                if existing.text != w.text {
                    return Err(CorpusError::invariant(format!(
                        "digest {} maps to both {:?} and {:?}",
                        digest, existing.text, w.text
                    )));
                }
            }
            if let Some(prev) = batch.insert(digest.clone(), w.text.as_str()) {
                if prev != w.text {
                    return Err(CorpusError::invariant(format!(
                        "digest {} maps to both {:?} and {:?}",
                        digest, prev, w.text
                    )));
                }
            }
            digests.push(digest);
        }
        Ok(digests)
    }

    fn check_resources(&self, resources: &[ResourceEntry]) -> Result<()> {
        for r in resources {
            if let Some(existing) = self.resources.get(&r.digest) {
                if existing.size != r.size {
                    return Err(CorpusError::input(format!(
                        "resource {} declared with size {}, corpus has {}",
                        r.digest, r.size, existing.size
                    )));
                }
            }
        }
        Ok(())
    }

    fn apply_words(&mut self, app: &AppId, words: &[WordEntry], digests: &[String], now: i64) {
        for (w, digest) in words.iter().zip(digests) {
            self.words
                .entry(digest.clone())
                .and_modify(|row| row.last_seen = now)
                .or_insert_with(|| WordRow {
                    digest: digest.clone(),
                    text: w.text.clone(),
                    category: w.category.clone(),
                    first_seen: now,
                    last_seen: now,
                });
            self.word_assoc.set(app, digest, w.count);
        }
    }

    fn apply_resources(&mut self, app: &AppId, resources: &[ResourceEntry], now: i64) {
        for r in resources {
            self.resources
                .entry(r.digest.clone())
                .and_modify(|row| row.last_seen = now)
                .or_insert_with(|| ResourceRow {
                    digest: r.digest.clone(),
                    size: r.size,
                    category: r.category.clone(),
                    example_name: r.example_name.clone(),
                    first_seen: now,
                    last_seen: now,
                });
            self.resource_assoc.set(app, &r.digest, r.count);
        }
    }

    fn category_of(&self, kind: ContentKind, digest: &str) -> Option<&str> {
        match kind {
            ContentKind::Word => self.words.get(digest).map(|r| r.category.as_str()),
            ContentKind::Resource => self.resources.get(digest).map(|r| r.category.as_str()),
        }
    }

    fn candidate(&self, kind: ContentKind, digest: &str, apps: &BTreeSet<AppId>) -> Result<DuplicateCandidate> {
        let total_occurrences = self.assoc(kind).total_occurrences(digest, apps);
        match kind {
            ContentKind::Word => {
                let row = self.words.get(digest).ok_or_else(|| {
                    CorpusError::invariant(format!("association references missing word {}", digest))
                })?;
                Ok(DuplicateCandidate {
                    digest: digest.to_string(),
                    label: row.text.clone(),
                    category: row.category.clone(),
                    apps_count: apps.len(),
                    total_occurrences,
                    size: None,
                    example_name: None,
                    apps: apps.iter().cloned().collect(),
                })
            }
            ContentKind::Resource => {
                let row = self.resources.get(digest).ok_or_else(|| {
                    CorpusError::invariant(format!(
                        "association references missing resource {}",
                        digest
                    ))
                })?;
                Ok(DuplicateCandidate {
                    digest: digest.to_string(),
                    label: digest.to_string(),
                    category: row.category.clone(),
                    apps_count: apps.len(),
                    total_occurrences,
                    size: Some(row.size),
                    example_name: Some(row.example_name.clone()),
                    apps: apps.iter().cloned().collect(),
                })
            }
        }
    }
}

/// In-memory corpus for tests and short-lived analyses.
pub struct InMemoryStore {
    state: RwLock<State>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(State::default()),
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, State>> {
        self.state
            .read()
            .map_err(|_| CorpusError::StorageUnavailable("in-memory store lock poisoned".into()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, State>> {
        self.state
            .write()
            .map_err(|_| CorpusError::StorageUnavailable("in-memory store lock poisoned".into()))
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn now_ts() -> i64 {
    chrono::Utc::now().timestamp()
}

fn app_record(app: &NewApp, now: i64) -> AppRecord {
    AppRecord {
        id: app.id.clone(),
        name: app.name.clone(),
        bundle_id: app.bundle_id.clone(),
        version: app.version.clone(),
        ingested_at: now,
    }
}

#[async_trait]
impl CorpusStore for InMemoryStore {
    async fn upsert_app(&self, app: &NewApp, strict: bool) -> Result<AppId> {
        let mut state = self.write()?;
        if state.apps.contains_key(&app.id) {
            if strict {
                return Err(CorpusError::DuplicateApp(app.id.clone()));
            }
            return Ok(app.id.clone());
        }
        state.apps.insert(app.id.clone(), app_record(app, now_ts()));
        Ok(app.id.clone())
    }

    async fn get_app(&self, id: &AppId) -> Result<Option<AppRecord>> {
        Ok(self.read()?.apps.get(id).cloned())
    }

    async fn list_apps(&self) -> Result<Vec<AppRecord>> {
        Ok(self.read()?.apps.values().cloned().collect())
    }

    async fn register_words(&self, app_id: &AppId, words: &[WordEntry]) -> Result<()> {
        let mut state = self.write()?;
        state.require_app(app_id)?;
        let digests = state.check_words(words)?;
        state.apply_words(app_id, words, &digests, now_ts());
        Ok(())
    }

    async fn register_resources(
        &self,
        app_id: &AppId,
        resources: &[ResourceEntry],
    ) -> Result<()> {
        let mut state = self.write()?;
        state.require_app(app_id)?;
        state.check_resources(resources)?;
        state.apply_resources(app_id, resources, now_ts());
        Ok(())
    }

    async fn install_app(
        &self,
        app: &NewApp,
        words: &[WordEntry],
        resources: &[ResourceEntry],
        on_existing: OnExisting,
    ) -> Result<IngestOutcome> {
        let mut state = self.write()?;
        let outcome = if state.apps.contains_key(&app.id) {
            match on_existing {
                OnExisting::Skip => return Ok(IngestOutcome::Skipped),
                OnExisting::Fail => return Err(CorpusError::DuplicateApp(app.id.clone())),
                OnExisting::Replace => IngestOutcome::Replaced,
            }
        } else {
            IngestOutcome::Inserted
        };
        let digests = state.check_words(words)?;
        state.check_resources(resources)?;

        let now = now_ts();
        state.apps.insert(app.id.clone(), app_record(app, now));
        state.word_assoc.clear_app(&app.id);
        state.resource_assoc.clear_app(&app.id);
        state.apply_words(&app.id, words, &digests, now);
        state.apply_resources(&app.id, resources, now);
        Ok(outcome)
    }

    async fn remove_app(&self, id: &AppId) -> Result<bool> {
        let mut state = self.write()?;
        if state.apps.remove(id).is_none() {
            return Ok(false);
        }
        state.word_assoc.clear_app(id);
        state.resource_assoc.clear_app(id);
        Ok(true)
    }

    async fn prune(&self) -> Result<PruneStats> {
        let mut state = self.write()?;
        let State {
            words,
            resources,
            word_assoc,
            resource_assoc,
            ..
        } = &mut *state;
        let before = (words.len(), resources.len());
        words.retain(|digest, _| word_assoc.by_item.contains_key(digest));
        resources.retain(|digest, _| resource_assoc.by_item.contains_key(digest));
        Ok(PruneStats {
            words: before.0 - words.len(),
            resources: before.1 - resources.len(),
        })
    }

    async fn members(&self, kind: ContentKind, app_id: &AppId) -> Result<BTreeSet<String>> {
        let state = self.read()?;
        state.require_app(app_id)?;
        Ok(state
            .assoc(kind)
            .by_app
            .get(app_id)
            .map(|items| items.keys().cloned().collect())
            .unwrap_or_default())
    }

    async fn apps_for(&self, kind: ContentKind, digest: &str) -> Result<BTreeSet<AppId>> {
        let state = self.read()?;
        Ok(state
            .assoc(kind)
            .by_item
            .get(digest)
            .cloned()
            .unwrap_or_default())
    }

    async fn overlap(&self, kind: ContentKind, app_ids: &[AppId]) -> Result<Overlap> {
        let state = self.read()?;
        let assoc = state.assoc(kind);
        let mut sizes = HashMap::with_capacity(app_ids.len());
        for id in app_ids {
            state.require_app(id)?;
            sizes.insert(id.clone(), assoc.by_app.get(id).map_or(0, |items| items.len()));
        }
        let postings = assoc
            .by_item
            .values()
            .filter_map(|apps| {
                let group: Vec<AppId> = apps
                    .iter()
                    .filter(|a| sizes.contains_key(*a))
                    .cloned()
                    .collect();
                (group.len() >= 2).then_some(group)
            })
            .collect();
        Ok(Overlap { sizes, postings })
    }

    async fn duplicate_candidates(
        &self,
        kind: ContentKind,
        min_apps: usize,
        category: Option<&str>,
    ) -> Result<Vec<DuplicateCandidate>> {
        let state = self.read()?;
        state
            .assoc(kind)
            .by_item
            .iter()
            .filter(|(_, apps)| apps.len() >= min_apps)
            .filter(|(digest, _)| {
                category.map_or(true, |c| state.category_of(kind, digest) == Some(c))
            })
            .map(|(digest, apps)| state.candidate(kind, digest, apps))
            .collect()
    }

    async fn occurrence_histogram(&self, kind: ContentKind) -> Result<BTreeMap<usize, usize>> {
        let state = self.read()?;
        let mut histogram = BTreeMap::new();
        for apps in state.assoc(kind).by_item.values() {
            *histogram.entry(apps.len()).or_insert(0) += 1;
        }
        Ok(histogram)
    }

    async fn app_counts(&self) -> Result<Vec<AppCounts>> {
        let state = self.read()?;
        let empty = HashMap::new();
        let mut out = Vec::with_capacity(state.apps.len());
        for app in state.apps.values() {
            let words = state.word_assoc.by_app.get(&app.id).unwrap_or(&empty);
            let resources = state.resource_assoc.by_app.get(&app.id).unwrap_or(&empty);
            let word_exclusive = words
                .keys()
                .filter(|d| state.word_assoc.by_item.get(*d).map_or(0, |a| a.len()) == 1)
                .count();
            let mut resource_bytes = 0u64;
            for digest in resources.keys() {
                let row = state.resources.get(digest).ok_or_else(|| {
                    CorpusError::invariant(format!(
                        "association references missing resource {}",
                        digest
                    ))
                })?;
                resource_bytes += row.size;
            }
            out.push(AppCounts {
                app: app.clone(),
                word_total: words.values().sum(),
                word_distinct: words.len(),
                word_exclusive,
                resource_total: resources.values().sum(),
                resource_distinct: resources.len(),
                resource_bytes,
            });
        }
        Ok(out)
    }

    async fn totals(&self) -> Result<CorpusTotals> {
        let state = self.read()?;
        Ok(CorpusTotals {
            apps: state.apps.len(),
            words: state.words.len(),
            resources: state.resources.len(),
            word_associations: state.word_assoc.len(),
            resource_associations: state.resource_assoc.len(),
        })
    }

    async fn word(&self, digest: &str) -> Result<Option<WordRow>> {
        Ok(self.read()?.words.get(digest).cloned())
    }

    async fn resource(&self, digest: &str) -> Result<Option<ResourceRow>> {
        Ok(self.read()?.resources.get(digest).cloned())
    }

    async fn search_words(
        &self,
        pattern: &str,
        category: Option<&str>,
        limit: usize,
    ) -> Result<Vec<DuplicateCandidate>> {
        let state = self.read()?;
        let needle = pattern.to_lowercase();
        let empty = BTreeSet::new();
        let mut hits = Vec::new();
        for row in state.words.values() {
            if !row.text.to_lowercase().contains(&needle) {
                continue;
            }
            if category.is_some_and(|c| c != row.category) {
                continue;
            }
            let apps = state.word_assoc.by_item.get(&row.digest).unwrap_or(&empty);
            hits.push(state.candidate(ContentKind::Word, &row.digest, apps)?);
        }
        hits.sort_by(|a, b| {
            b.apps_count
                .cmp(&a.apps_count)
                .then_with(|| a.label.cmp(&b.label))
        });
        hits.truncate(limit);
        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn app(id: &str) -> NewApp {
        NewApp {
            id: AppId::new(id),
            name: format!("App {}", id),
            bundle_id: format!("com.example.{}", id),
            version: "1.0".to_string(),
        }
    }

    fn word(text: &str, count: u64) -> WordEntry {
        WordEntry {
            text: text.to_string(),
            category: "uncategorized".to_string(),
            count,
        }
    }

    fn resource(digest: &str, size: u64) -> ResourceEntry {
        ResourceEntry {
            digest: digest.to_string(),
            size,
            category: "image".to_string(),
            example_name: format!("{}.png", digest),
            count: 1,
        }
    }

    #[tokio::test]
    async fn upsert_app_is_idempotent_unless_strict() {
        let store = InMemoryStore::new();
        let id = store.upsert_app(&app("x"), false).await.unwrap();
        assert_eq!(store.upsert_app(&app("x"), false).await.unwrap(), id);
        assert!(matches!(
            store.upsert_app(&app("x"), true).await,
            Err(CorpusError::DuplicateApp(_))
        ));
        assert_eq!(store.list_apps().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn register_words_indexes_both_directions() {
        let store = InMemoryStore::new();
        let x = store.upsert_app(&app("x"), false).await.unwrap();
        let y = store.upsert_app(&app("y"), false).await.unwrap();
        store
            .register_words(&x, &[word("login", 2), word("error:timeout", 1)])
            .await
            .unwrap();
        store.register_words(&y, &[word("login", 1)]).await.unwrap();

        let login = text_digest("login");
        assert_eq!(store.words_for_app(&x).await.unwrap().len(), 2);
        let apps = store.apps_for_word(&login).await.unwrap();
        assert_eq!(apps.into_iter().collect::<Vec<_>>(), vec![x.clone(), y.clone()]);
        assert_eq!(store.totals().await.unwrap().words, 2);
    }

    #[tokio::test]
    async fn register_for_unknown_app_fails() {
        let store = InMemoryStore::new();
        let err = store
            .register_words(&AppId::new("ghost"), &[word("login", 1)])
            .await
            .unwrap_err();
        assert!(matches!(err, CorpusError::UnknownApp(_)));
        assert!(matches!(
            store.members(ContentKind::Word, &AppId::new("ghost")).await,
            Err(CorpusError::UnknownApp(_))
        ));
    }

    #[tokio::test]
    async fn failed_resource_batch_leaves_no_partial_state() {
        let store = InMemoryStore::new();
        let x = store.upsert_app(&app("x"), false).await.unwrap();
        let y = store.upsert_app(&app("y"), false).await.unwrap();
        store.register_resources(&x, &[resource("aa", 10)]).await.unwrap();

        let err = store
            .register_resources(&y, &[resource("bb", 5), resource("aa", 11)])
            .await
            .unwrap_err();
        assert!(matches!(err, CorpusError::Input(_)));
        assert!(store.resources_for_app(&y).await.unwrap().is_empty());
        assert!(store.resource("bb").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn replace_app_drops_stale_associations() {
        let store = InMemoryStore::new();
        store
            .replace_app(&app("x"), &[word("login", 2), word("legacy", 1)], &[])
            .await
            .unwrap();
        store
            .replace_app(&app("x"), &[word("login", 1), word("fresh", 1)], &[])
            .await
            .unwrap();

        assert!(store
            .apps_for_word(&text_digest("legacy"))
            .await
            .unwrap()
            .is_empty());
        assert_eq!(store.words_for_app(&AppId::new("x")).await.unwrap().len(), 2);
        let counts = store.app_counts().await.unwrap();
        assert_eq!(counts[0].word_total, 2);
    }

    #[tokio::test]
    async fn remove_and_prune() {
        let store = InMemoryStore::new();
        store
            .replace_app(&app("x"), &[word("only-x", 1), word("shared", 1)], &[resource("aa", 3)])
            .await
            .unwrap();
        store
            .replace_app(&app("y"), &[word("shared", 1)], &[])
            .await
            .unwrap();

        assert!(store.remove_app(&AppId::new("x")).await.unwrap());
        assert!(!store.remove_app(&AppId::new("x")).await.unwrap());
        let pruned = store.prune().await.unwrap();
        assert_eq!(pruned, PruneStats { words: 1, resources: 1 });
        assert!(store.word(&text_digest("shared")).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn install_app_applies_existing_policy_atomically() {
        let store = InMemoryStore::new();
        let first = store
            .install_app(&app("x"), &[word("login", 1)], &[], OnExisting::Fail)
            .await
            .unwrap();
        assert_eq!(first, IngestOutcome::Inserted);

        let err = store
            .install_app(&app("x"), &[word("other", 1)], &[], OnExisting::Fail)
            .await
            .unwrap_err();
        assert!(matches!(err, CorpusError::DuplicateApp(_)));

        let skipped = store
            .install_app(&app("x"), &[word("other", 1)], &[], OnExisting::Skip)
            .await
            .unwrap();
        assert_eq!(skipped, IngestOutcome::Skipped);
        assert!(store.word(&text_digest("other")).await.unwrap().is_none());

        let replaced = store
            .install_app(&app("x"), &[word("other", 1)], &[], OnExisting::Replace)
            .await
            .unwrap();
        assert_eq!(replaced, IngestOutcome::Replaced);
        assert_eq!(store.words_for_app(&AppId::new("x")).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn concurrent_strict_installs_admit_one() {
        let store = std::sync::Arc::new(InMemoryStore::new());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .install_app(&app("dup"), &[word("login", 1)], &[], OnExisting::Fail)
                    .await
            }));
        }
        let mut inserted = 0;
        for h in handles {
            match h.await.unwrap() {
                Ok(IngestOutcome::Inserted) => inserted += 1,
                Err(CorpusError::DuplicateApp(_)) => {}
                other => panic!("unexpected outcome: {:?}", other),
            }
        }
        assert_eq!(inserted, 1);
    }

    #[tokio::test]
    async fn duplicate_candidates_carry_apps_and_filter_by_category() {
        let store = InMemoryStore::new();
        let mut err_word = word("error:timeout", 1);
        err_word.category = "error".to_string();
        store
            .replace_app(&app("a"), &[word("login", 1), err_word.clone()], &[])
            .await
            .unwrap();
        store
            .replace_app(&app("b"), &[word("login", 2), err_word], &[])
            .await
            .unwrap();

        let all = store
            .duplicate_candidates(ContentKind::Word, 2, None)
            .await
            .unwrap();
        assert_eq!(all.len(), 2);
        assert!(all
            .iter()
            .all(|c| c.apps == vec![AppId::new("a"), AppId::new("b")]));

        let errors = store
            .duplicate_candidates(ContentKind::Word, 2, Some("error"))
            .await
            .unwrap();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].label, "error:timeout");

        let hits = store.search_words("o", Some("error"), 10).await.unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[tokio::test]
    async fn postings_only_report_shared_items() {
        let store = InMemoryStore::new();
        store
            .replace_app(&app("a"), &[word("alpha", 1), word("common", 1)], &[])
            .await
            .unwrap();
        store
            .replace_app(&app("b"), &[word("common", 1)], &[])
            .await
            .unwrap();
        store
            .replace_app(&app("c"), &[word("common", 1), word("alpha", 1)], &[])
            .await
            .unwrap();

        let ids = vec![AppId::new("a"), AppId::new("b")];
        let overlap = store.overlap(ContentKind::Word, &ids).await.unwrap();
        assert_eq!(overlap.postings, vec![ids.clone()]);
        assert_eq!(overlap.sizes[&AppId::new("a")], 2);
        assert_eq!(overlap.sizes[&AppId::new("b")], 1);

        assert!(matches!(
            store
                .overlap(ContentKind::Word, &[AppId::new("ghost")])
                .await,
            Err(CorpusError::UnknownApp(_))
        ));
    }

    #[tokio::test]
    async fn search_is_case_insensitive() {
        let store = InMemoryStore::new();
        store
            .replace_app(&app("a"), &[word("LoginButton", 1), word("logout", 1)], &[])
            .await
            .unwrap();
        store
            .replace_app(&app("b"), &[word("logout", 1)], &[])
            .await
            .unwrap();
        let hits = store.search_words("LOG", None, 10).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].label, "logout");
        assert_eq!(hits[0].apps_count, 2);
        assert_eq!(store.search_words("log", None, 1).await.unwrap().len(), 1);
    }
}
