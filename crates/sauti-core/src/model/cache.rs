//! Process-wide cache of loaded model handles.

use std::collections::HashMap;
use std::future::Future;
use tokio::sync::RwLock;
use tracing::info;

use crate::error::Result;
use crate::inference::ModelHandle;
use crate::model::info::{ModelKey, WhisperModel};

/// Keyed cache of loaded model handles. Entries are created on first use
/// and live for the process lifetime; there is no eviction, reload, or
/// invalidation path.
#[derive(Default)]
pub struct ModelCache {
    entries: RwLock<HashMap<ModelKey, ModelHandle>>,
}

impl ModelCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached handle for `key`, running `load` on a miss.
    ///
    /// A failed load caches nothing, so the next request retries it. Two
    /// requests racing on the same missing key may both run the loader;
    /// the first successful insert wins and the other result is dropped,
    /// so at most one entry ever exists per key.
    pub async fn get_or_load<F, Fut>(&self, key: ModelKey, load: F) -> Result<ModelHandle>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<ModelHandle>>,
    {
        if let Some(handle) = self.entries.read().await.get(&key) {
            return Ok(handle.clone());
        }

        info!("Loading model {}", key);
        let loaded = load().await?;

        let mut entries = self.entries.write().await;
        Ok(entries.entry(key).or_insert(loaded).clone())
    }

    pub async fn contains(&self, key: &ModelKey) -> bool {
        self.entries.read().await.contains_key(key)
    }

    /// Transcription models currently resident, in allow-list order.
    pub async fn loaded_transcribers(&self) -> Vec<WhisperModel> {
        let entries = self.entries.read().await;
        WhisperModel::all()
            .iter()
            .copied()
            .filter(|model| entries.contains_key(&ModelKey::Transcriber(*model)))
            .collect()
    }
}
