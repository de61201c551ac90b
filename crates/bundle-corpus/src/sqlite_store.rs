//! SQLite-backed [`CorpusStore`] implementation.
//!
//! Maps each [`CorpusStore`] operation onto the schema created by
//! [`crate::migrate`]. Writes are serialized by an in-process writer lock
//! and each batch runs in one transaction, so a failed batch rolls back
//! and readers only ever see complete apps. `install_app` checks for an
//! existing app inside the same transaction and under the same lock as its
//! write. Multi-statement reads run inside a read transaction for a
//! consistent WAL snapshot.

use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection, SqlitePool};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fmt::Display;
use tokio::sync::Mutex;

use bundle_corpus_core::digest::text_digest;
use bundle_corpus_core::error::{CorpusError, Result};
use bundle_corpus_core::models::{
    AppCounts, AppId, AppRecord, ContentKind, CorpusTotals, DuplicateCandidate, IngestOutcome,
    NewApp, OnExisting, Overlap, PruneStats, ResourceEntry, ResourceRow, WordEntry, WordRow,
};
use bundle_corpus_core::store::CorpusStore;

use crate::config::Config;
use crate::{db, migrate};

/// SQLite implementation of the [`CorpusStore`] trait.
pub struct SqliteStore {
    pool: SqlitePool,
    write_lock: Mutex<()>,
}

/// Association table and its digest column for one content kind.
fn assoc_table(kind: ContentKind) -> (&'static str, &'static str) {
    match kind {
        ContentKind::Word => ("word_apps", "word_digest"),
        ContentKind::Resource => ("resource_apps", "resource_digest"),
    }
}

/// Map a driver error onto the corpus taxonomy. A foreign-key failure means
/// an association pointed at a missing row.
fn db_err(e: sqlx::Error) -> CorpusError {
    if let Some(db) = e.as_database_error() {
        if matches!(db.kind(), sqlx::error::ErrorKind::ForeignKeyViolation) {
            return CorpusError::invariant(format!("dangling association: {}", db.message()));
        }
    }
    CorpusError::StorageUnavailable(e.to_string())
}

fn now_ts() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Convert an unsigned quantity for an INTEGER column.
fn to_sql_int(value: u64, what: impl Display) -> Result<i64> {
    i64::try_from(value)
        .map_err(|_| CorpusError::input(format!("{} {} does not fit in the database", what, value)))
}

fn row_to_app(row: &SqliteRow) -> AppRecord {
    AppRecord {
        id: AppId::new(row.get::<String, _>("id")),
        name: row.get("name"),
        bundle_id: row.get("bundle_id"),
        version: row.get("version"),
        ingested_at: row.get("ingested_at"),
    }
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            write_lock: Mutex::new(()),
        }
    }

    /// Connect to the configured database and ensure the schema exists.
    pub async fn open(config: &Config) -> anyhow::Result<Self> {
        let pool = db::connect(config).await?;
        migrate::apply(&pool).await?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

async fn app_exists(conn: &mut SqliteConnection, id: &AppId) -> Result<bool> {
    let found: Option<i64> = sqlx::query_scalar("SELECT 1 FROM apps WHERE id = ?")
        .bind(id.as_str())
        .fetch_optional(&mut *conn)
        .await
        .map_err(db_err)?;
    Ok(found.is_some())
}

async fn require_app(conn: &mut SqliteConnection, id: &AppId) -> Result<()> {
    if app_exists(conn, id).await? {
        Ok(())
    } else {
        Err(CorpusError::UnknownApp(id.clone()))
    }
}

async fn write_app(conn: &mut SqliteConnection, app: &NewApp, now: i64) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO apps (id, name, bundle_id, version, ingested_at)
        VALUES (?, ?, ?, ?, ?)
        ON CONFLICT(id) DO UPDATE SET
            name = excluded.name,
            bundle_id = excluded.bundle_id,
            version = excluded.version,
            ingested_at = excluded.ingested_at
        "#,
    )
    .bind(app.id.as_str())
    .bind(&app.name)
    .bind(&app.bundle_id)
    .bind(&app.version)
    .bind(now)
    .execute(&mut *conn)
    .await
    .map_err(db_err)?;
    Ok(())
}

/// Upsert word rows and (word, app) counts. A digest already bound to a
/// different text aborts the batch.
async fn write_words(
    conn: &mut SqliteConnection,
    app: &AppId,
    words: &[WordEntry],
    now: i64,
) -> Result<()> {
    for w in words {
        let digest = text_digest(&w.text);
        let stored: String = sqlx::query_scalar(
            r#"
            INSERT INTO words (digest, text, category, first_seen, last_seen)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(digest) DO UPDATE SET last_seen = excluded.last_seen
            RETURNING text
            "#,
        )
        .bind(&digest)
        .bind(&w.text)
        .bind(&w.category)
        .bind(now)
        .bind(now)
        .fetch_one(&mut *conn)
        .await
        .map_err(db_err)?;

        if stored != w.text {
            return Err(CorpusError::invariant(format!(
                "digest {} maps to both {:?} and {:?}",
                digest, stored, w.text
            )));
        }

        let count = to_sql_int(w.count, format_args!("count of {:?}", w.text))?;
        sqlx::query(
            r#"
            INSERT INTO word_apps (word_digest, app_id, count)
            VALUES (?, ?, ?)
            ON CONFLICT(word_digest, app_id) DO UPDATE SET count = excluded.count
            "#,
        )
        .bind(&digest)
        .bind(app.as_str())
        .bind(count)
        .execute(&mut *conn)
        .await
        .map_err(db_err)?;
    }
    Ok(())
}

async fn write_resources(
    conn: &mut SqliteConnection,
    app: &AppId,
    resources: &[ResourceEntry],
    now: i64,
) -> Result<()> {
    for r in resources {
        let size = to_sql_int(r.size, format_args!("size of resource {}", r.digest))?;
        let count = to_sql_int(r.count, format_args!("count of resource {}", r.digest))?;
        let stored_size: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO resources (digest, size, category, example_name, first_seen, last_seen)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(digest) DO UPDATE SET last_seen = excluded.last_seen
            RETURNING size
            "#,
        )
        .bind(&r.digest)
        .bind(size)
        .bind(&r.category)
        .bind(&r.example_name)
        .bind(now)
        .bind(now)
        .fetch_one(&mut *conn)
        .await
        .map_err(db_err)?;

        if stored_size != size {
            return Err(CorpusError::input(format!(
                "resource {} declared with size {}, corpus has {}",
                r.digest, r.size, stored_size
            )));
        }

        sqlx::query(
            r#"
            INSERT INTO resource_apps (resource_digest, app_id, count)
            VALUES (?, ?, ?)
            ON CONFLICT(resource_digest, app_id) DO UPDATE SET count = excluded.count
            "#,
        )
        .bind(&r.digest)
        .bind(app.as_str())
        .bind(count)
        .execute(&mut *conn)
        .await
        .map_err(db_err)?;
    }
    Ok(())
}

async fn clear_associations(conn: &mut SqliteConnection, app: &AppId) -> Result<()> {
    for table in ["word_apps", "resource_apps"] {
        sqlx::query(&format!("DELETE FROM {} WHERE app_id = ?", table))
            .bind(app.as_str())
            .execute(&mut *conn)
            .await
            .map_err(db_err)?;
    }
    Ok(())
}

/// Decode a `json_group_array(app_id)` column. NULLs from an outer join
/// are dropped; the result is sorted.
fn decode_apps(raw: &str) -> Result<Vec<AppId>> {
    let ids: Vec<Option<String>> = serde_json::from_str(raw)
        .map_err(|e| CorpusError::invariant(format!("malformed app list {:?}: {}", raw, e)))?;
    let mut apps: Vec<AppId> = ids.into_iter().flatten().map(AppId::new).collect();
    apps.sort();
    Ok(apps)
}

fn row_to_candidate(kind: ContentKind, row: &SqliteRow) -> Result<DuplicateCandidate> {
    let digest: String = row.get("digest");
    let total: i64 = row.get("total");
    let apps = decode_apps(&row.get::<String, _>("apps"))?;
    Ok(match kind {
        ContentKind::Word => DuplicateCandidate {
            label: row.get("text"),
            digest,
            category: row.get("category"),
            apps_count: apps.len(),
            total_occurrences: total as u64,
            size: None,
            example_name: None,
            apps,
        },
        ContentKind::Resource => DuplicateCandidate {
            label: digest.clone(),
            digest,
            category: row.get("category"),
            apps_count: apps.len(),
            total_occurrences: total as u64,
            size: Some(row.get::<i64, _>("size") as u64),
            example_name: Some(row.get("example_name")),
            apps,
        },
    })
}

#[async_trait]
impl CorpusStore for SqliteStore {
    async fn upsert_app(&self, app: &NewApp, strict: bool) -> Result<AppId> {
        let _guard = self.write_lock.lock().await;
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        if app_exists(&mut tx, &app.id).await? {
            if strict {
                return Err(CorpusError::DuplicateApp(app.id.clone()));
            }
            return Ok(app.id.clone());
        }
        write_app(&mut tx, app, now_ts()).await?;
        tx.commit().await.map_err(db_err)?;
        Ok(app.id.clone())
    }

    async fn get_app(&self, id: &AppId) -> Result<Option<AppRecord>> {
        let row = sqlx::query(
            "SELECT id, name, bundle_id, version, ingested_at FROM apps WHERE id = ?",
        )
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(row.as_ref().map(row_to_app))
    }

    async fn list_apps(&self) -> Result<Vec<AppRecord>> {
        let rows = sqlx::query(
            "SELECT id, name, bundle_id, version, ingested_at FROM apps ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(rows.iter().map(row_to_app).collect())
    }

    async fn register_words(&self, app_id: &AppId, words: &[WordEntry]) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        require_app(&mut tx, app_id).await?;
        write_words(&mut tx, app_id, words, now_ts()).await?;
        tx.commit().await.map_err(db_err)?;
        tracing::debug!(app = %app_id, words = words.len(), "registered words");
        Ok(())
    }

    async fn register_resources(
        &self,
        app_id: &AppId,
        resources: &[ResourceEntry],
    ) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        require_app(&mut tx, app_id).await?;
        write_resources(&mut tx, app_id, resources, now_ts()).await?;
        tx.commit().await.map_err(db_err)?;
        tracing::debug!(app = %app_id, resources = resources.len(), "registered resources");
        Ok(())
    }

    async fn install_app(
        &self,
        app: &NewApp,
        words: &[WordEntry],
        resources: &[ResourceEntry],
        on_existing: OnExisting,
    ) -> Result<IngestOutcome> {
        let _guard = self.write_lock.lock().await;
        let now = now_ts();
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        let outcome = if app_exists(&mut tx, &app.id).await? {
            match on_existing {
                OnExisting::Skip => return Ok(IngestOutcome::Skipped),
                OnExisting::Fail => return Err(CorpusError::DuplicateApp(app.id.clone())),
                OnExisting::Replace => IngestOutcome::Replaced,
            }
        } else {
            IngestOutcome::Inserted
        };
        write_app(&mut tx, app, now).await?;
        clear_associations(&mut tx, &app.id).await?;
        write_words(&mut tx, &app.id, words, now).await?;
        write_resources(&mut tx, &app.id, resources, now).await?;
        tx.commit().await.map_err(db_err)?;
        tracing::debug!(
            app = %app.id,
            ?outcome,
            words = words.len(),
            resources = resources.len(),
            "installed app"
        );
        Ok(outcome)
    }

    async fn remove_app(&self, id: &AppId) -> Result<bool> {
        let _guard = self.write_lock.lock().await;
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        clear_associations(&mut tx, id).await?;
        let removed = sqlx::query("DELETE FROM apps WHERE id = ?")
            .bind(id.as_str())
            .execute(&mut *tx)
            .await
            .map_err(db_err)?
            .rows_affected();
        tx.commit().await.map_err(db_err)?;
        Ok(removed > 0)
    }

    async fn prune(&self) -> Result<PruneStats> {
        let _guard = self.write_lock.lock().await;
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        let words = sqlx::query(
            "DELETE FROM words WHERE NOT EXISTS \
             (SELECT 1 FROM word_apps wa WHERE wa.word_digest = words.digest)",
        )
        .execute(&mut *tx)
        .await
        .map_err(db_err)?
        .rows_affected();
        let resources = sqlx::query(
            "DELETE FROM resources WHERE NOT EXISTS \
             (SELECT 1 FROM resource_apps ra WHERE ra.resource_digest = resources.digest)",
        )
        .execute(&mut *tx)
        .await
        .map_err(db_err)?
        .rows_affected();
        tx.commit().await.map_err(db_err)?;
        Ok(PruneStats {
            words: words as usize,
            resources: resources as usize,
        })
    }

    async fn members(&self, kind: ContentKind, app_id: &AppId) -> Result<BTreeSet<String>> {
        let (table, col) = assoc_table(kind);
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        require_app(&mut tx, app_id).await?;
        let digests: Vec<String> =
            sqlx::query_scalar(&format!("SELECT {} FROM {} WHERE app_id = ?", col, table))
                .bind(app_id.as_str())
                .fetch_all(&mut *tx)
                .await
                .map_err(db_err)?;
        Ok(digests.into_iter().collect())
    }

    async fn apps_for(&self, kind: ContentKind, digest: &str) -> Result<BTreeSet<AppId>> {
        let (table, col) = assoc_table(kind);
        let ids: Vec<String> =
            sqlx::query_scalar(&format!("SELECT app_id FROM {} WHERE {} = ?", table, col))
                .bind(digest)
                .fetch_all(&self.pool)
                .await
                .map_err(db_err)?;
        Ok(ids.into_iter().map(AppId::new).collect())
    }

    async fn overlap(&self, kind: ContentKind, app_ids: &[AppId]) -> Result<Overlap> {
        let (table, col) = assoc_table(kind);
        let count_sql = format!("SELECT COUNT(*) FROM {} WHERE app_id = ?", table);
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        let mut sizes = HashMap::with_capacity(app_ids.len());
        for id in app_ids {
            require_app(&mut tx, id).await?;
            let n: i64 = sqlx::query_scalar(&count_sql)
                .bind(id.as_str())
                .fetch_one(&mut *tx)
                .await
                .map_err(db_err)?;
            sizes.insert(id.clone(), n as usize);
        }

        // Only digests held by two or more apps can contribute a pair.
        let rows = sqlx::query(&format!(
            "SELECT {col} AS digest, app_id FROM {table} \
             WHERE {col} IN (SELECT {col} FROM {table} GROUP BY {col} HAVING COUNT(*) >= 2) \
             ORDER BY {col}, app_id",
            col = col,
            table = table
        ))
        .fetch_all(&mut *tx)
        .await
        .map_err(db_err)?;

        let wanted: HashSet<&str> = app_ids.iter().map(|a| a.as_str()).collect();
        let mut postings = Vec::new();
        let mut current: Option<String> = None;
        let mut group: Vec<AppId> = Vec::new();
        for row in &rows {
            let digest: String = row.get("digest");
            let app: String = row.get("app_id");
            if current.as_deref() != Some(digest.as_str()) {
                if group.len() >= 2 {
                    postings.push(std::mem::take(&mut group));
                }
                group.clear();
                current = Some(digest);
            }
            if wanted.contains(app.as_str()) {
                group.push(AppId::new(app));
            }
        }
        if group.len() >= 2 {
            postings.push(group);
        }
        Ok(Overlap { sizes, postings })
    }

    async fn duplicate_candidates(
        &self,
        kind: ContentKind,
        min_apps: usize,
        category: Option<&str>,
    ) -> Result<Vec<DuplicateCandidate>> {
        // One statement, so counts and app lists come from one snapshot.
        let sql = match kind {
            ContentKind::Word => {
                r#"
                SELECT w.digest, w.text, w.category,
                       SUM(wa.count) AS total, json_group_array(wa.app_id) AS apps
                FROM word_apps wa
                JOIN words w ON w.digest = wa.word_digest
                WHERE (? IS NULL OR w.category = ?)
                GROUP BY w.digest
                HAVING COUNT(*) >= ?
                "#
            }
            ContentKind::Resource => {
                r#"
                SELECT r.digest, r.category, r.size, r.example_name,
                       SUM(ra.count) AS total, json_group_array(ra.app_id) AS apps
                FROM resource_apps ra
                JOIN resources r ON r.digest = ra.resource_digest
                WHERE (? IS NULL OR r.category = ?)
                GROUP BY r.digest
                HAVING COUNT(*) >= ?
                "#
            }
        };
        let rows = sqlx::query(sql)
            .bind(category)
            .bind(category)
            .bind(to_sql_int(min_apps as u64, "min_apps")?)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
        rows.iter().map(|r| row_to_candidate(kind, r)).collect()
    }

    async fn occurrence_histogram(&self, kind: ContentKind) -> Result<BTreeMap<usize, usize>> {
        let (table, col) = assoc_table(kind);
        let rows = sqlx::query(&format!(
            "SELECT n, COUNT(*) AS items FROM \
             (SELECT COUNT(*) AS n FROM {} GROUP BY {}) GROUP BY n",
            table, col
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(rows
            .iter()
            .map(|r| {
                (
                    r.get::<i64, _>("n") as usize,
                    r.get::<i64, _>("items") as usize,
                )
            })
            .collect())
    }

    async fn app_counts(&self) -> Result<Vec<AppCounts>> {
        let rows = sqlx::query(
            r#"
            SELECT a.id, a.name, a.bundle_id, a.version, a.ingested_at,
                COALESCE((SELECT SUM(count) FROM word_apps WHERE app_id = a.id), 0) AS word_total,
                (SELECT COUNT(*) FROM word_apps WHERE app_id = a.id) AS word_distinct,
                (SELECT COUNT(*) FROM word_apps wa
                    WHERE wa.app_id = a.id
                    AND NOT EXISTS (SELECT 1 FROM word_apps o
                        WHERE o.word_digest = wa.word_digest AND o.app_id <> a.id)
                ) AS word_exclusive,
                COALESCE((SELECT SUM(count) FROM resource_apps WHERE app_id = a.id), 0) AS resource_total,
                (SELECT COUNT(*) FROM resource_apps WHERE app_id = a.id) AS resource_distinct,
                COALESCE((SELECT SUM(r.size) FROM resource_apps ra
                    JOIN resources r ON r.digest = ra.resource_digest
                    WHERE ra.app_id = a.id), 0) AS resource_bytes
            FROM apps a
            ORDER BY a.id
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(rows
            .iter()
            .map(|row| AppCounts {
                app: row_to_app(row),
                word_total: row.get::<i64, _>("word_total") as u64,
                word_distinct: row.get::<i64, _>("word_distinct") as usize,
                word_exclusive: row.get::<i64, _>("word_exclusive") as usize,
                resource_total: row.get::<i64, _>("resource_total") as u64,
                resource_distinct: row.get::<i64, _>("resource_distinct") as usize,
                resource_bytes: row.get::<i64, _>("resource_bytes") as u64,
            })
            .collect())
    }

    async fn totals(&self) -> Result<CorpusTotals> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        let mut counts = [0usize; 5];
        for (slot, table) in counts
            .iter_mut()
            .zip(["apps", "words", "resources", "word_apps", "resource_apps"])
        {
            let n: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", table))
                .fetch_one(&mut *tx)
                .await
                .map_err(db_err)?;
            *slot = n as usize;
        }
        Ok(CorpusTotals {
            apps: counts[0],
            words: counts[1],
            resources: counts[2],
            word_associations: counts[3],
            resource_associations: counts[4],
        })
    }

    async fn word(&self, digest: &str) -> Result<Option<WordRow>> {
        let row = sqlx::query(
            "SELECT digest, text, category, first_seen, last_seen FROM words WHERE digest = ?",
        )
        .bind(digest)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(row.map(|r| WordRow {
            digest: r.get("digest"),
            text: r.get("text"),
            category: r.get("category"),
            first_seen: r.get("first_seen"),
            last_seen: r.get("last_seen"),
        }))
    }

    async fn resource(&self, digest: &str) -> Result<Option<ResourceRow>> {
        let row = sqlx::query(
            "SELECT digest, size, category, example_name, first_seen, last_seen \
             FROM resources WHERE digest = ?",
        )
        .bind(digest)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(row.map(|r| ResourceRow {
            digest: r.get("digest"),
            size: r.get::<i64, _>("size") as u64,
            category: r.get("category"),
            example_name: r.get("example_name"),
            first_seen: r.get("first_seen"),
            last_seen: r.get("last_seen"),
        }))
    }

    async fn search_words(
        &self,
        pattern: &str,
        category: Option<&str>,
        limit: usize,
    ) -> Result<Vec<DuplicateCandidate>> {
        let rows = sqlx::query(
            r#"
            SELECT w.digest, w.text, w.category,
                   COUNT(wa.app_id) AS apps_count,
                   COALESCE(SUM(wa.count), 0) AS total,
                   json_group_array(wa.app_id) AS apps
            FROM words w
            LEFT JOIN word_apps wa ON wa.word_digest = w.digest
            WHERE instr(LOWER(w.text), ?) > 0
              AND (? IS NULL OR w.category = ?)
            GROUP BY w.digest
            ORDER BY apps_count DESC, w.text ASC
            LIMIT ?
            "#,
        )
        .bind(pattern.to_lowercase())
        .bind(category)
        .bind(category)
        .bind(to_sql_int(limit as u64, "limit")?)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        rows.iter()
            .map(|r| row_to_candidate(ContentKind::Word, r))
            .collect()
    }
}
