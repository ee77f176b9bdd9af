//! Application state shared by all request handlers.

use sauti_core::TranscriptionEngine;
use std::sync::Arc;
use tokio::sync::Semaphore;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Engine reference - using Arc for cheap clones
    pub engine: Arc<TranscriptionEngine>,
    /// Concurrency limiter to prevent resource exhaustion
    pub request_semaphore: Arc<Semaphore>,
}

impl AppState {
    pub fn new(engine: TranscriptionEngine, max_concurrent: usize) -> Self {
        Self {
            engine: Arc::new(engine),
            request_semaphore: Arc::new(Semaphore::new(max_concurrent)),
        }
    }

    /// Acquire a permit for concurrent request processing
    pub async fn acquire_permit(&self) -> tokio::sync::SemaphorePermit<'_> {
        self.request_semaphore
            .acquire()
            .await
            .expect("Semaphore should never be closed")
    }
}
