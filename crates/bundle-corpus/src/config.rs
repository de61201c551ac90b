//! TOML configuration parsing and validation.
//!
//! Every section except `[db]` is optional; missing knobs fall back to the
//! defaults below. [`load_config`] rejects values the engine cannot honour
//! before any command touches the database.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use bundle_corpus_core::models::OnExisting;
use bundle_corpus_core::normalize::NormalizeOptions;
use bundle_corpus_core::report::{HintThresholds, ReportOptions};
use bundle_corpus_core::similarity::SimilarityWeights;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub analysis: AnalysisConfig,
    #[serde(default)]
    pub similarity: SimilarityConfig,
    #[serde(default)]
    pub hints: HintsConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct IngestConfig {
    #[serde(default = "default_min_length")]
    pub min_length: usize,
    #[serde(default = "default_true")]
    pub skip_numeric: bool,
    #[serde(default)]
    pub stopwords: Vec<String>,
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub on_existing: OnExisting,
    /// Drop hex digests, UUIDs, Swift symbols, Objective-C type encodings
    /// and punctuation-only strings.
    #[serde(default)]
    pub filter_technical: bool,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            min_length: default_min_length(),
            skip_numeric: true,
            stopwords: Vec::new(),
            workers: default_workers(),
            include_globs: default_include_globs(),
            on_existing: OnExisting::default(),
            filter_technical: false,
        }
    }
}

fn default_min_length() -> usize {
    4
}
fn default_true() -> bool {
    true
}
fn default_workers() -> usize {
    4
}
fn default_include_globs() -> Vec<String> {
    vec!["**/*.json".to_string()]
}

#[derive(Debug, Deserialize, Clone)]
pub struct AnalysisConfig {
    #[serde(default = "default_top_n")]
    pub top_n: usize,
    #[serde(default = "default_min_apps")]
    pub min_apps: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            top_n: default_top_n(),
            min_apps: default_min_apps(),
        }
    }
}

fn default_top_n() -> usize {
    20
}
fn default_min_apps() -> usize {
    2
}

#[derive(Debug, Deserialize, Clone)]
pub struct SimilarityConfig {
    #[serde(default = "default_word_weight")]
    pub word_weight: f64,
    #[serde(default = "default_resource_weight")]
    pub resource_weight: f64,
    #[serde(default = "default_bundle_weight")]
    pub bundle_weight: f64,
}

impl Default for SimilarityConfig {
    fn default() -> Self {
        Self {
            word_weight: default_word_weight(),
            resource_weight: default_resource_weight(),
            bundle_weight: default_bundle_weight(),
        }
    }
}

fn default_word_weight() -> f64 {
    0.7
}
fn default_resource_weight() -> f64 {
    0.2
}
fn default_bundle_weight() -> f64 {
    0.1
}

#[derive(Debug, Deserialize, Clone)]
pub struct HintsConfig {
    #[serde(default = "default_rate_warn")]
    pub duplicate_rate_warn_pct: f64,
    #[serde(default = "default_rate_high")]
    pub duplicate_rate_high_pct: f64,
    #[serde(default = "default_savings_bytes")]
    pub savings_bytes: u64,
    #[serde(default = "default_high_similarity")]
    pub high_similarity: f64,
}

impl Default for HintsConfig {
    fn default() -> Self {
        Self {
            duplicate_rate_warn_pct: default_rate_warn(),
            duplicate_rate_high_pct: default_rate_high(),
            savings_bytes: default_savings_bytes(),
            high_similarity: default_high_similarity(),
        }
    }
}

fn default_rate_warn() -> f64 {
    30.0
}
fn default_rate_high() -> f64 {
    50.0
}
fn default_savings_bytes() -> u64 {
    1024 * 1024
}
fn default_high_similarity() -> f64 {
    0.8
}

impl Config {
    /// All-defaults config with the database under `./data`.
    pub fn minimal() -> Self {
        Self {
            db: DbConfig {
                path: PathBuf::from("./data/corpus.sqlite"),
            },
            ingest: IngestConfig::default(),
            analysis: AnalysisConfig::default(),
            similarity: SimilarityConfig::default(),
            hints: HintsConfig::default(),
        }
    }

    pub fn normalize_options(&self) -> Result<NormalizeOptions> {
        let opts = NormalizeOptions {
            min_length: self.ingest.min_length,
            skip_numeric: self.ingest.skip_numeric,
            ..NormalizeOptions::default()
        }
        .with_stopwords(&self.ingest.stopwords);
        if self.ingest.filter_technical {
            return Ok(opts.with_technical_filter()?);
        }
        Ok(opts)
    }

    pub fn weights(&self) -> SimilarityWeights {
        SimilarityWeights {
            word: self.similarity.word_weight,
            resource: self.similarity.resource_weight,
            bundle: self.similarity.bundle_weight,
        }
    }

    pub fn thresholds(&self) -> HintThresholds {
        HintThresholds {
            duplicate_rate_warn_pct: self.hints.duplicate_rate_warn_pct,
            duplicate_rate_high_pct: self.hints.duplicate_rate_high_pct,
            savings_bytes: self.hints.savings_bytes,
            high_similarity: self.hints.high_similarity,
        }
    }

    pub fn report_options(&self) -> ReportOptions {
        ReportOptions {
            top_n: self.analysis.top_n,
            min_apps: self.analysis.min_apps,
            weights: self.weights(),
            thresholds: self.thresholds(),
            apps: None,
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

pub fn validate(config: &Config) -> Result<()> {
    // Validate ingest
    if config.ingest.min_length == 0 {
        anyhow::bail!("ingest.min_length must be >= 1");
    }
    if config.ingest.workers == 0 {
        anyhow::bail!("ingest.workers must be >= 1");
    }
    if config.ingest.include_globs.is_empty() {
        anyhow::bail!("ingest.include_globs must not be empty");
    }

    // Validate analysis
    if config.analysis.top_n == 0 {
        anyhow::bail!("analysis.top_n must be >= 1");
    }
    if config.analysis.min_apps < 2 {
        anyhow::bail!("analysis.min_apps must be >= 2");
    }

    // Validate similarity
    config
        .weights()
        .validate()
        .map_err(|e| anyhow::anyhow!("similarity: {}", e))?;

    // Validate hints
    let h = &config.hints;
    if !(0.0..=100.0).contains(&h.duplicate_rate_warn_pct)
        || !(0.0..=100.0).contains(&h.duplicate_rate_high_pct)
    {
        anyhow::bail!("hints duplicate rates must be in [0, 100]");
    }
    if h.duplicate_rate_warn_pct > h.duplicate_rate_high_pct {
        anyhow::bail!("hints.duplicate_rate_warn_pct must be <= hints.duplicate_rate_high_pct");
    }
    if !(0.0..=1.0).contains(&h.high_similarity) {
        anyhow::bail!("hints.high_similarity must be in [0.0, 1.0]");
    }

    Ok(())
}
