//! Extraction files: discovery and parsing.
//!
//! Each app arrives as one JSON document written by the external
//! unpacker and resource hasher:
//!
//! ```json
//! {
//!   "app": {"hash": "…", "name": "Demo", "bundle_id": "com.acme.demo", "version": "1.2"},
//!   "strings": ["login", {"text": "error:timeout", "count": 2}],
//!   "resources": [{"digest": "…", "size": 1024, "path": "Assets/logo.png"}]
//! }
//! ```
//!
//! Parsing failures are [`CorpusError::Input`]: the caller skips that app
//! and keeps going.

use anyhow::{bail, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use bundle_corpus_core::error::CorpusError;
use bundle_corpus_core::models::{AppId, NewApp};
use bundle_corpus_core::normalize::RawResource;

#[derive(Debug, Deserialize)]
pub struct ExtractionFile {
    pub app: AppHeader,
    #[serde(default)]
    pub strings: Vec<RawString>,
    #[serde(default)]
    pub resources: Vec<ResourceRecord>,
}

#[derive(Debug, Deserialize)]
pub struct AppHeader {
    pub hash: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub bundle_id: String,
    #[serde(default)]
    pub version: String,
}

/// A string as emitted by the extractor: bare text or text with a count.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum RawString {
    Text(String),
    Counted {
        text: String,
        #[serde(default = "default_count")]
        count: u64,
    },
}

fn default_count() -> u64 {
    1
}

impl RawString {
    pub fn into_pair(self) -> (String, u64) {
        match self {
            RawString::Text(text) => (text, 1),
            RawString::Counted { text, count } => (text, count),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ResourceRecord {
    pub digest: String,
    pub size: u64,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub category: Option<String>,
}

impl ExtractionFile {
    pub fn parse(json: &str) -> Result<Self, CorpusError> {
        let file: ExtractionFile = serde_json::from_str(json)
            .map_err(|e| CorpusError::input(format!("malformed extraction file: {}", e)))?;
        if file.app.hash.trim().is_empty() {
            return Err(CorpusError::input("app.hash is missing or empty"));
        }
        Ok(file)
    }

    pub fn load(path: &Path) -> Result<Self, CorpusError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            CorpusError::input(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::parse(&content)
            .map_err(|e| CorpusError::input(format!("{}: {}", path.display(), e)))
    }

    pub fn new_app(&self) -> NewApp {
        NewApp {
            id: AppId::new(self.app.hash.trim().to_ascii_lowercase()),
            name: self.app.name.clone(),
            bundle_id: self.app.bundle_id.clone(),
            version: self.app.version.clone(),
        }
    }

    /// Split into the app header, raw `(text, count)` pairs and raw resources.
    pub fn into_parts(self) -> (NewApp, Vec<(String, u64)>, Vec<RawResource>) {
        let app = self.new_app();
        let strings = self.strings.into_iter().map(RawString::into_pair).collect();
        let resources = self
            .resources
            .into_iter()
            .map(|r| RawResource {
                digest: r.digest,
                size: r.size,
                category: r.category,
                path: r.path,
            })
            .collect();
        (app, strings, resources)
    }
}

/// Expand files and directories into the extraction files to ingest.
///
/// Directories are walked recursively and filtered by `include_globs`
/// (matched against the path relative to that directory); explicit file
/// arguments are always taken. The result is sorted and deduplicated.
pub fn discover(paths: &[PathBuf], include_globs: &[String]) -> Result<Vec<PathBuf>> {
    let include_set = build_globset(include_globs)?;
    let mut files = Vec::new();

    for root in paths {
        if root.is_file() {
            files.push(root.clone());
            continue;
        }
        if !root.is_dir() {
            bail!("Input path does not exist: {}", root.display());
        }
        for entry in WalkDir::new(root).follow_links(false) {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            let relative = path.strip_prefix(root).unwrap_or(path);
            if include_set.is_match(relative) {
                files.push(path.to_path_buf());
            }
        }
    }

    // Sort for deterministic ordering
    files.sort();
    files.dedup();
    Ok(files)
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn parses_mixed_strings_and_defaults() {
        let file = ExtractionFile::parse(
            r#"{
                "app": {"hash": "ABC123", "name": "Demo"},
                "strings": ["login", {"text": "error:timeout", "count": 2}, {"text": "bare"}],
                "resources": [{"digest": "ff", "size": 3, "path": "a/b.png"}]
            }"#,
        )
        .unwrap();
        let (app, strings, resources) = file.into_parts();
        assert_eq!(app.id.as_str(), "abc123");
        assert_eq!(app.bundle_id, "");
        assert_eq!(
            strings,
            vec![
                ("login".to_string(), 1),
                ("error:timeout".to_string(), 2),
                ("bare".to_string(), 1)
            ]
        );
        assert_eq!(resources.len(), 1);
        assert_eq!(resources[0].category, None);
    }

    #[test]
    fn missing_hash_or_bad_json_is_input_error() {
        assert!(matches!(
            ExtractionFile::parse(r#"{"app": {"hash": "  "}}"#),
            Err(CorpusError::Input(_))
        ));
        assert!(matches!(
            ExtractionFile::parse(r#"{"app": {"name": "x"}}"#),
            Err(CorpusError::Input(_))
        ));
        assert!(matches!(
            ExtractionFile::parse("not json"),
            Err(CorpusError::Input(_))
        ));
    }

    #[test]
    fn discover_filters_directories_only() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("out");
        fs::create_dir_all(dir.join("nested")).unwrap();
        fs::write(dir.join("a.json"), "{}").unwrap();
        fs::write(dir.join("nested/b.json"), "{}").unwrap();
        fs::write(dir.join("notes.txt"), "").unwrap();
        let explicit = tmp.path().join("c.data");
        fs::write(&explicit, "{}").unwrap();

        let files = discover(
            &[dir.clone(), explicit.clone(), dir.clone()],
            &["**/*.json".to_string()],
        )
        .unwrap();
        assert_eq!(files.len(), 3);
        assert!(files.contains(&dir.join("nested/b.json")));
        assert!(files.contains(&explicit));

        assert!(discover(&[tmp.path().join("missing")], &["**/*.json".to_string()]).is_err());
    }
}
