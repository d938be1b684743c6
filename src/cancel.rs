//! Cooperative cancellation.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::{OpError, OpResult, Uri};

/// Shared cancellation flag.
///
/// Clones observe the same flag. Long-running work (streaming copy,
/// recursive delete) checks it between units of work; a single blocking
/// read or write is never preempted.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    /// A token that is not cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Returns `true` once [`cancel`](Self::cancel) was called on any clone.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Fail with [`OpError::Interrupted`] for `uri` if cancelled.
    pub fn check(&self, uri: &Uri) -> OpResult<()> {
        if self.is_cancelled() {
            return Err(OpError::Interrupted { uri: uri.clone() });
        }
        Ok(())
    }
}
