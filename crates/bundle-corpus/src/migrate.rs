//! Database schema migrations. Idempotent: every statement is
//! `IF NOT EXISTS`, so `bcx init` may run any number of times.

use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    apply(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Create every table and index on an open pool.
pub async fn apply(pool: &SqlitePool) -> Result<()> {
    // Apps, keyed by bundle content hash
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS apps (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL DEFAULT '',
            bundle_id TEXT NOT NULL DEFAULT '',
            version TEXT NOT NULL DEFAULT '',
            ingested_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Canonical words, keyed by text digest
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS words (
            digest TEXT PRIMARY KEY,
            text TEXT NOT NULL UNIQUE,
            category TEXT NOT NULL,
            first_seen INTEGER NOT NULL,
            last_seen INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Resources, keyed by the upstream content digest
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS resources (
            digest TEXT PRIMARY KEY,
            size INTEGER NOT NULL,
            category TEXT NOT NULL,
            example_name TEXT NOT NULL DEFAULT '',
            first_seen INTEGER NOT NULL,
            last_seen INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS word_apps (
            word_digest TEXT NOT NULL,
            app_id TEXT NOT NULL,
            count INTEGER NOT NULL,
            PRIMARY KEY (word_digest, app_id),
            FOREIGN KEY (word_digest) REFERENCES words(digest),
            FOREIGN KEY (app_id) REFERENCES apps(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS resource_apps (
            resource_digest TEXT NOT NULL,
            app_id TEXT NOT NULL,
            count INTEGER NOT NULL,
            PRIMARY KEY (resource_digest, app_id),
            FOREIGN KEY (resource_digest) REFERENCES resources(digest),
            FOREIGN KEY (app_id) REFERENCES apps(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Reverse direction of both association indexes
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_word_apps_app_id ON word_apps(app_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_resource_apps_app_id ON resource_apps(app_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_words_category ON words(category)")
        .execute(pool)
        .await?;

    Ok(())
}
