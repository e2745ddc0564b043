//! Cancellation tokens for cooperative interruption
//!
//! A long-running operation (page-by-page export) checks its token at every
//! safe boundary and stops there. The host keeps a clone and cancels it when
//! the user navigates away or closes the document.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

/// Cancellation token for cooperative interruption
///
/// Clones share the same underlying flag, so cancelling any clone is
/// observed by all of them.
///
/// # Example
///
/// ```
/// use pdf_annotator_scheduler::CancellationToken;
///
/// let token = CancellationToken::new();
/// let exporter_token = token.clone();
///
/// token.cancel();
/// assert!(exporter_token.is_cancelled());
/// ```
#[derive(Debug, Clone)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    /// Create a new token in the non-cancelled state
    pub fn new() -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Cancel this token and every clone of it. Idempotent.
    pub fn cancel(&self) {
        if !self.cancelled.swap(true, Ordering::AcqRel) {
            log::debug!("cancellation requested");
        }
    }

    /// Returns `true` once `cancel()` has been called on this token or a clone
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Reset to the non-cancelled state so the token can drive another run
    pub fn reset(&self) {
        self.cancelled.store(false, Ordering::Release);
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}
