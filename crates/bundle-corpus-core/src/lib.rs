//! # Bundle Corpus Core
//!
//! Shared logic for Bundle Corpus: the data model, content digests,
//! normalization, category tags, the [`store::CorpusStore`] abstraction,
//! duplicate ranking, pairwise similarity, and report assembly.
//!
//! This crate contains no tokio, sqlx, filesystem I/O, or other
//! native-only dependencies. Storage backends live in the application
//! crate (SQLite) or in [`store::memory`] (tests and embedding).
//!
//! ## Data Flow
//!
//! ```text
//! extraction ──▶ normalize ──▶ CorpusStore ◀── analyzer
//!                                   ▲
//!                                   └──────── similarity ──▶ report
//! ```

pub mod analyzer;
pub mod cancel;
pub mod category;
pub mod digest;
pub mod error;
pub mod models;
pub mod normalize;
pub mod report;
pub mod similarity;
pub mod store;

pub use cancel::CancelFlag;
pub use error::{CorpusError, Result};
pub use models::{AppId, ContentKind};
