//! Ingestion pipeline orchestration.
//!
//! Coordinates the flow for every extraction file: load → normalize →
//! categorize → store. Files are processed by up to `workers` concurrent
//! tasks. Parsing and normalization run on blocking threads; each app is
//! then written to the store in one atomic batch.
//!
//! # Failure policy
//!
//! - Input problems (malformed JSON, missing hash, conflicting resource
//!   sizes, a duplicate app under `on_existing = "fail"`) reject that one
//!   app; the batch continues.
//! - Fatal errors (storage unavailable, invariant violation) stop the run:
//!   the failing worker raises the cancel flag before it frees its slot, so
//!   no new app is started, and the error is returned once in-flight apps
//!   have settled. Completed apps stay committed.
//! - Cancellation is checked before each app and before its store write.
//! - The `on_existing` decision is made by the store inside the write, so
//!   two files carrying the same hash in one batch resolve like two runs.

use anyhow::Result;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use bundle_corpus_core::category::Classifier;
use bundle_corpus_core::error::CorpusError;
use bundle_corpus_core::models::{
    AppId, IngestOutcome, NewApp, OnExisting, ResourceEntry, WordEntry,
};
use bundle_corpus_core::normalize::{prepare_resources, prepare_words, NormalizeOptions};
use bundle_corpus_core::store::CorpusStore;
use bundle_corpus_core::CancelFlag;

use crate::classify::PatternClassifier;
use crate::config::Config;
use crate::extraction::{self, ExtractionFile};
use crate::progress::{IngestProgressEvent, IngestProgressReporter, ProgressMode};
use crate::sqlite_store::SqliteStore;

/// Shared, read-only settings for every ingest worker.
pub struct IngestContext {
    pub normalize: NormalizeOptions,
    pub classifier: Arc<dyn Classifier>,
    pub on_existing: OnExisting,
    pub dry_run: bool,
}

/// One app's normalized batch, ready for the store.
#[derive(Debug, Clone)]
pub struct PreparedApp {
    pub app: NewApp,
    pub words: Vec<WordEntry>,
    pub resources: Vec<ResourceEntry>,
}

impl PreparedApp {
    pub fn label(&self) -> String {
        if self.app.name.is_empty() {
            self.app.id.to_string()
        } else {
            self.app.name.clone()
        }
    }
}

/// Result of one successfully processed app.
#[derive(Debug, Clone, Serialize)]
pub struct AppIngest {
    pub app: AppId,
    pub label: String,
    pub outcome: IngestOutcome,
    pub words: usize,
    pub resources: usize,
}

#[derive(Debug, Default)]
pub struct IngestSummary {
    pub files: usize,
    pub inserted: usize,
    pub replaced: usize,
    pub skipped: usize,
    /// Files rejected for input problems, with the reason.
    pub rejected: Vec<(PathBuf, String)>,
    pub words: usize,
    pub resources: usize,
    pub cancelled: bool,
}

impl IngestSummary {
    fn record(&mut self, done: &AppIngest) {
        match done.outcome {
            IngestOutcome::Inserted => self.inserted += 1,
            IngestOutcome::Replaced => self.replaced += 1,
            IngestOutcome::Skipped => {
                self.skipped += 1;
                return;
            }
        }
        self.words += done.words;
        self.resources += done.resources;
    }
}

/// Normalize, collapse and categorize one extraction file.
pub fn prepare_app(
    file: ExtractionFile,
    normalize: &NormalizeOptions,
    classifier: &dyn Classifier,
) -> Result<PreparedApp, CorpusError> {
    let (app, strings, raw_resources) = file.into_parts();
    let words = prepare_words(strings, normalize, classifier)?;
    let resources = prepare_resources(&raw_resources)?;
    Ok(PreparedApp {
        app,
        words,
        resources,
    })
}

/// Write one prepared app under the `on_existing` policy.
///
/// With `dry_run` nothing is written; the returned outcome is what would
/// have happened against the corpus as it stands.
pub async fn store_app<S: CorpusStore + ?Sized>(
    store: &S,
    prepared: &PreparedApp,
    on_existing: OnExisting,
    dry_run: bool,
) -> Result<IngestOutcome, CorpusError> {
    if dry_run {
        let exists = store.get_app(&prepared.app.id).await?.is_some();
        return match (exists, on_existing) {
            (true, OnExisting::Skip) => Ok(IngestOutcome::Skipped),
            (true, OnExisting::Fail) => Err(CorpusError::DuplicateApp(prepared.app.id.clone())),
            (true, OnExisting::Replace) => Ok(IngestOutcome::Replaced),
            (false, _) => Ok(IngestOutcome::Inserted),
        };
    }
    store
        .install_app(
            &prepared.app,
            &prepared.words,
            &prepared.resources,
            on_existing,
        )
        .await
}

async fn process_file(
    store: Arc<dyn CorpusStore>,
    ctx: Arc<IngestContext>,
    permits: Arc<Semaphore>,
    path: PathBuf,
    cancel: CancelFlag,
) -> Result<AppIngest, CorpusError> {
    let _permit = permits
        .acquire_owned()
        .await
        .map_err(|_| CorpusError::Cancelled)?;
    let result = ingest_one(store, ctx, path, &cancel).await;
    if let Err(e) = &result {
        if e.is_fatal() {
            cancel.cancel();
        }
    }
    result
}

async fn ingest_one(
    store: Arc<dyn CorpusStore>,
    ctx: Arc<IngestContext>,
    path: PathBuf,
    cancel: &CancelFlag,
) -> Result<AppIngest, CorpusError> {
    cancel.check()?;

    let worker_ctx = ctx.clone();
    let prepared = tokio::task::spawn_blocking(move || {
        let file = ExtractionFile::load(&path)?;
        prepare_app(file, &worker_ctx.normalize, worker_ctx.classifier.as_ref())
    })
    .await
    .map_err(|e| CorpusError::invariant(format!("ingest worker panicked: {}", e)))??;

    cancel.check()?;
    let outcome = store_app(store.as_ref(), &prepared, ctx.on_existing, ctx.dry_run).await?;
    Ok(AppIngest {
        label: prepared.label(),
        app: prepared.app.id,
        outcome,
        words: prepared.words.len(),
        resources: prepared.resources.len(),
    })
}

/// Ingest `files` with at most `workers` apps in flight.
pub async fn ingest_files(
    store: Arc<dyn CorpusStore>,
    files: Vec<PathBuf>,
    ctx: Arc<IngestContext>,
    workers: usize,
    progress: &dyn IngestProgressReporter,
    cancel: &CancelFlag,
) -> Result<IngestSummary, CorpusError> {
    let total = files.len() as u64;
    let mut summary = IngestSummary {
        files: files.len(),
        ..IngestSummary::default()
    };
    progress.report(IngestProgressEvent::Discovered { files: total });

    let permits = Arc::new(Semaphore::new(workers.max(1)));
    let mut set = JoinSet::new();
    for path in files {
        let task = process_file(
            store.clone(),
            ctx.clone(),
            permits.clone(),
            path.clone(),
            cancel.clone(),
        );
        set.spawn(async move { (path, task.await) });
    }

    let mut n = 0u64;
    let mut fatal: Option<CorpusError> = None;
    while let Some(joined) = set.join_next().await {
        let (path, result) = joined
            .map_err(|e| CorpusError::invariant(format!("ingest task failed: {}", e)))?;
        n += 1;
        match result {
            Ok(done) => {
                summary.record(&done);
                progress.report(IngestProgressEvent::App {
                    n,
                    total,
                    label: done.label,
                    status: outcome_label(done.outcome).to_string(),
                });
            }
            Err(CorpusError::Cancelled) => summary.cancelled = true,
            Err(e) if e.is_fatal() => {
                tracing::error!(path = %path.display(), error = %e, "aborting ingestion");
                cancel.cancel();
                fatal.get_or_insert(e);
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "skipping app");
                progress.report(IngestProgressEvent::App {
                    n,
                    total,
                    label: display_name(&path),
                    status: "rejected".to_string(),
                });
                summary.rejected.push((path, e.to_string()));
            }
        }
    }

    match fatal {
        Some(e) => Err(e),
        None => {
            summary.rejected.sort();
            Ok(summary)
        }
    }
}

fn outcome_label(outcome: IngestOutcome) -> &'static str {
    match outcome {
        IngestOutcome::Inserted => "inserted",
        IngestOutcome::Replaced => "replaced",
        IngestOutcome::Skipped => "skipped",
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

/// Run the ingest command: discover files, ingest them, print a summary.
pub async fn run_ingest(
    config: &Config,
    paths: &[PathBuf],
    workers: Option<usize>,
    on_existing: Option<OnExisting>,
    dry_run: bool,
    progress: ProgressMode,
    cancel: CancelFlag,
) -> Result<()> {
    let files = extraction::discover(paths, &config.ingest.include_globs)?;
    let store = Arc::new(SqliteStore::open(config).await?);
    let ctx = Arc::new(IngestContext {
        normalize: config.normalize_options()?,
        classifier: Arc::new(PatternClassifier::new()?),
        on_existing: on_existing.unwrap_or(config.ingest.on_existing),
        dry_run,
    });
    let workers = workers.unwrap_or(config.ingest.workers);
    if workers == 0 {
        anyhow::bail!("--workers must be >= 1");
    }

    let reporter = progress.reporter();
    let result = ingest_files(
        store.clone(),
        files,
        ctx,
        workers,
        reporter.as_ref(),
        &cancel,
    )
    .await;
    store.close().await;
    let summary = result?;

    if dry_run {
        println!("ingest (dry-run)");
    } else {
        println!("ingest");
    }
    println!("  files: {}", summary.files);
    println!("  inserted: {}", summary.inserted);
    println!("  replaced: {}", summary.replaced);
    println!("  skipped: {}", summary.skipped);
    println!("  rejected: {}", summary.rejected.len());
    for (path, reason) in &summary.rejected {
        println!("    {}: {}", path.display(), reason);
    }
    println!("  words: {}", summary.words);
    println!("  resources: {}", summary.resources);

    if summary.cancelled {
        anyhow::bail!("ingestion cancelled; completed apps were kept");
    }
    println!("ok");
    Ok(())
}
