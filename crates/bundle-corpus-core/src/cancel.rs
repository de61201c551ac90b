//! Cooperative cancellation between app-level units of work.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{CorpusError, Result};

/// A cloneable flag checked between apps (ingestion) and between matrix
/// rows (similarity). Setting it never interrupts a store batch midway.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Returns `Err(Cancelled)` once the flag has been set.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(CorpusError::Cancelled)
        } else {
            Ok(())
        }
    }
}
