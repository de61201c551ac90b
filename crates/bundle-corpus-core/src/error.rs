//! Error taxonomy for corpus operations.
//!
//! Errors fall into three classes. Input problems ([`CorpusError::Input`],
//! [`CorpusError::UnknownApp`], [`CorpusError::DuplicateApp`]) affect one app
//! and let a batch continue. [`CorpusError::StorageUnavailable`] and
//! [`CorpusError::InvariantViolation`] are fatal for the whole run.

use thiserror::Error;

use crate::models::AppId;

#[derive(Error, Debug)]
pub enum CorpusError {
    #[error("invalid input: {0}")]
    Input(String),
    #[error("unknown app: {0}")]
    UnknownApp(AppId),
    #[error("app already ingested: {0}")]
    DuplicateApp(AppId),
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),
    #[error("invariant violation: {0}")]
    InvariantViolation(String),
    #[error("operation cancelled")]
    Cancelled,
}

impl CorpusError {
    /// Whether the error must abort the whole run rather than one app.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            CorpusError::StorageUnavailable(_) | CorpusError::InvariantViolation(_)
        )
    }

    pub fn input(msg: impl Into<String>) -> Self {
        CorpusError::Input(msg.into())
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        CorpusError::InvariantViolation(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, CorpusError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fatal_classes() {
        assert!(CorpusError::StorageUnavailable("down".into()).is_fatal());
        assert!(CorpusError::invariant("collision").is_fatal());
        assert!(!CorpusError::input("bad json").is_fatal());
        assert!(!CorpusError::UnknownApp(AppId::new("x")).is_fatal());
        assert!(!CorpusError::DuplicateApp(AppId::new("x")).is_fatal());
        assert!(!CorpusError::Cancelled.is_fatal());
    }
}
