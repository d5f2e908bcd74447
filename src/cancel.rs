use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Cooperative stop signal shared by the orchestrator and its workers.
///
/// Workers poll it between batch flushes, so an in-flight batch always
/// completes before a worker exits.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}
