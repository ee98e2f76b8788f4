//! Cooperative cancellation for running submissions.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Handle for cooperative cancellation of a submission.
///
/// Clones share one flag: any clone can trigger the abort and every other
/// clone observes it. The controller checks the flag at each suspension
/// point (output polling and input waiting).
///
/// # Example
///
/// ```
/// use ceres_core::AbortHandle;
///
/// let handle = AbortHandle::new();
/// let remote = handle.clone();
///
/// assert!(!handle.is_aborted());
/// remote.abort();
/// assert!(handle.is_aborted());
/// ```
#[derive(Clone, Default, Debug)]
pub struct AbortHandle {
    aborted: Arc<AtomicBool>,
}

impl AbortHandle {
    /// Create a new abort handle.
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if abort has been requested.
    pub fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::SeqCst)
    }

    /// Request abort of the current submission.
    pub fn abort(&self) {
        self.aborted.store(true, Ordering::SeqCst);
    }

    /// Reset the flag before starting a new submission.
    pub fn reset(&self) {
        self.aborted.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reset_clears_abort() {
        let handle = AbortHandle::new();
        handle.abort();
        assert!(handle.is_aborted());

        handle.reset();
        assert!(!handle.is_aborted());
    }
}
