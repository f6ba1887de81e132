use crate::error::{MarginaliaError, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cooperative cancellation token shared between a caller and a running query.
///
/// Clones observe the same flag. Evaluation polls it between posting-list
/// merges, so a cancelled query stops at the next merge boundary.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag {
    cancelled: Arc<AtomicBool>,
}

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// `Err(Cancelled)` once the flag has been raised
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(MarginaliaError::Cancelled)
        } else {
            Ok(())
        }
    }
}
