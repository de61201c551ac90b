//! Legacy flat export of the word corpus as JSON.
//!
//! Produces one record per canonical word with the apps that contain it:
//! `[{word, category, apps_count, total_occurrences, apps}]`. The view is
//! derived from the corpus and can be regenerated at any time; nothing
//! reads it back.

use anyhow::{Context, Result};
use serde::Serialize;
use sqlx::Row;
use std::path::Path;

use crate::config::Config;
use crate::sqlite_store::SqliteStore;

#[derive(Debug, Serialize)]
pub struct ExportWord {
    pub word: String,
    pub category: String,
    pub apps_count: i64,
    pub total_occurrences: i64,
    pub apps: Vec<String>,
}

/// Load the flat word view, ordered by apps count (desc) then text.
pub async fn export_words(store: &SqliteStore) -> Result<Vec<ExportWord>> {
    let rows = sqlx::query(
        r#"
        SELECT w.text, w.category,
               COUNT(wa.app_id) AS apps_count,
               SUM(wa.count) AS total_occurrences,
               json_group_array(wa.app_id) AS apps
        FROM words w
        JOIN word_apps wa ON wa.word_digest = w.digest
        GROUP BY w.digest
        ORDER BY apps_count DESC, w.text ASC
        "#,
    )
    .fetch_all(store.pool())
    .await?;

    rows.iter()
        .map(|row| -> Result<ExportWord> {
            let raw: String = row.get("apps");
            let mut apps: Vec<String> = serde_json::from_str(&raw)
                .with_context(|| format!("Malformed app list in export row: {}", raw))?;
            apps.sort();
            Ok(ExportWord {
                word: row.get("text"),
                category: row.get("category"),
                apps_count: row.get("apps_count"),
                total_occurrences: row.get("total_occurrences"),
                apps,
            })
        })
        .collect()
}

/// Export the flat view.
///
/// If `output` is `Some`, writes to that file path. Otherwise writes
/// to stdout for piping.
pub async fn run_export(config: &Config, output: Option<&Path>) -> Result<()> {
    let store = SqliteStore::open(config).await?;
    let words = export_words(&store).await;
    store.close().await;
    let words = words?;

    let json = serde_json::to_string_pretty(&words)?;
    match output {
        Some(path) => {
            std::fs::write(path, &json)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            eprintln!(
                "Exported {} words to {}",
                words.len(),
                path.display()
            );
        }
        None => println!("{}", json),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bundle_corpus_core::models::{NewApp, WordEntry};
    use bundle_corpus_core::store::CorpusStore;
    use bundle_corpus_core::AppId;
    use tempfile::TempDir;

    #[tokio::test]
    async fn flat_view_lists_apps_per_word() {
        let tmp = TempDir::new().unwrap();
        let mut config = Config::minimal();
        config.db.path = tmp.path().join("corpus.sqlite");
        let store = SqliteStore::open(&config).await.unwrap();

        for (id, words) in [("x", vec!["login", "logout"]), ("y", vec!["login"])] {
            let app = NewApp {
                id: AppId::new(id),
                name: id.to_string(),
                bundle_id: String::new(),
                version: String::new(),
            };
            let entries: Vec<WordEntry> = words
                .iter()
                .map(|w| WordEntry {
                    text: w.to_string(),
                    category: "uncategorized".to_string(),
                    count: 2,
                })
                .collect();
            store.replace_app(&app, &entries, &[]).await.unwrap();
        }

        let words = export_words(&store).await.unwrap();
        assert_eq!(words.len(), 2);
        assert_eq!(words[0].word, "login");
        assert_eq!(words[0].apps_count, 2);
        assert_eq!(words[0].total_occurrences, 4);
        assert_eq!(words[0].apps, vec!["x".to_string(), "y".to_string()]);
        assert_eq!(words[1].apps, vec!["x".to_string()]);
        store.close().await;
    }

    #[tokio::test]
    async fn app_ids_with_separator_characters_survive() {
        let tmp = TempDir::new().unwrap();
        let mut config = Config::minimal();
        config.db.path = tmp.path().join("corpus.sqlite");
        let store = SqliteStore::open(&config).await.unwrap();

        let odd = ["a,b", "c\u{1f}d", "e\"f"];
        for id in odd {
            let app = NewApp {
                id: AppId::new(id),
                name: id.to_string(),
                bundle_id: String::new(),
                version: String::new(),
            };
            let entry = WordEntry {
                text: "login".to_string(),
                category: "uncategorized".to_string(),
                count: 1,
            };
            store.replace_app(&app, &[entry], &[]).await.unwrap();
        }

        let words = export_words(&store).await.unwrap();
        assert_eq!(words.len(), 1);
        assert_eq!(words[0].apps_count, 3);
        let mut expected: Vec<String> = odd.iter().map(|s| s.to_string()).collect();
        expected.sort();
        assert_eq!(words[0].apps, expected);
        store.close().await;
    }
}
