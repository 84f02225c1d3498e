use std::sync::Arc;

use crate::core::clock::{Clock, SystemClock};
use crate::core::retry::RetryPolicy;
use crate::core::window::default_window;
use crate::services::{LikeStore, MemoryStore, StatusStore};

/// Process-wide collaborators of the quota and match core.
///
/// Built once at startup and handed to `QuotaTracker::new` and
/// `MatchDetector::new`; nothing in the core reaches for globals.
#[derive(Clone)]
pub struct CoreContext {
    pub statuses: Arc<dyn StatusStore>,
    pub likes: Arc<dyn LikeStore>,
    pub clock: Arc<dyn Clock>,
    pub retry: RetryPolicy,
    pub window: chrono::Duration,
}

impl CoreContext {
    pub fn new(statuses: Arc<dyn StatusStore>, likes: Arc<dyn LikeStore>) -> Self {
        Self {
            statuses,
            likes,
            clock: Arc::new(SystemClock),
            retry: RetryPolicy::default(),
            window: default_window(),
        }
    }

    /// Context over a single store that serves both ports
    pub fn single<S>(store: Arc<S>) -> Self
    where
        S: StatusStore + LikeStore + 'static,
    {
        Self::new(store.clone(), store)
    }

    /// Context backed by a fresh in-memory store
    pub fn in_memory() -> Self {
        Self::single(Arc::new(MemoryStore::new()))
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_window(mut self, window: chrono::Duration) -> Self {
        self.window = window;
        self
    }
}
