//! Cooperative cancellation for long-running store operations.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared cancellation flag checked between work chunks.
///
/// Clones share the underlying flag, so a UI thread can cancel an export
/// or wipe running on another thread. Operations observe the flag only at
/// chunk boundaries and roll back on cancellation, so no partial state is
/// ever left behind.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag {
    cancelled: Arc<AtomicBool>,
}

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation of the operation watching this flag.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Re-arm the flag before starting a new operation.
    pub fn reset(&self) {
        self.cancelled.store(false, Ordering::SeqCst);
    }
}
