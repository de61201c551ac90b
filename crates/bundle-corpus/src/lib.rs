//! # Bundle Corpus
//!
//! Cross-corpus deduplication of strings and resources extracted from
//! application bundles.
//!
//! Each analyzed bundle arrives as an extraction file (strings plus hashed
//! resources). The ingestion pipeline normalizes and categorizes every
//! string, stores one canonical row per distinct word and resource, and
//! records which apps reference it. The analyzer then ranks cross-app
//! duplicates, and the similarity engine scores every pair of apps.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌──────────────┐   ┌──────────┐
//! │ Extraction  │──▶│  Ingestion   │──▶│  SQLite  │
//! │ JSON files  │   │ norm+classify│   │  corpus  │
//! └─────────────┘   └──────────────┘   └────┬─────┘
//!                                           │
//!                      ┌────────────────────┤
//!                      ▼                    ▼
//!                ┌───────────┐       ┌────────────┐
//!                │ Analyzer  │       │ Similarity │
//!                └─────┬─────┘       └─────┬──────┘
//!                      └──────┬────────────┘
//!                             ▼
//!                      AnalysisReport
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! bcx init                          # create database
//! bcx ingest ./extracted            # ingest extraction files
//! bcx analyze --output report.json  # full report
//! bcx similar <HASH_A> <HASH_B>     # compare two apps
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`sqlite_store`] | SQLite `CorpusStore` |
//! | [`classify`] | Regex string classifier |
//! | [`extraction`] | Extraction file discovery and parsing |
//! | [`ingest`] | Concurrent ingestion pipeline |
//! | [`progress`] | Ingestion progress reporting |
//! | [`analyze`] | Analysis report command |
//! | [`duplicates`] | Ranked duplicates command |
//! | [`similar`] | Pair similarity command |
//! | [`search`] | Word search command |
//! | [`apps`] | App listing, removal, pruning |
//! | [`stats`] | Database statistics |
//! | [`export`] | Legacy flat JSON export |

pub mod analyze;
pub mod apps;
pub mod classify;
pub mod config;
pub mod db;
pub mod duplicates;
pub mod export;
pub mod extraction;
pub mod ingest;
pub mod migrate;
pub mod progress;
pub mod search;
pub mod similar;
pub mod sqlite_store;
pub mod stats;
