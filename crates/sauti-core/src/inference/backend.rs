//! The interface every inference backend implements.
//!
//! All heavy calls here are blocking; the pipeline runs them under
//! `tokio::task::spawn_blocking`.

use std::path::Path;

use crate::device::DeviceProfile;
use crate::error::Result;
use crate::model::{ModelKey, WhisperModel};
use crate::runtime::types::{RawTranscript, Segment, SpeakerTurn, Transcript, Word};

/// Opaque reference to a model resident in the backend, keyed by the cache
/// key it was loaded for. Shared freely across requests and never mutated
/// after load.
#[derive(Debug, Clone)]
pub struct ModelHandle {
    worker_id: String,
    key: ModelKey,
}

impl ModelHandle {
    pub fn new(worker_id: impl Into<String>, key: ModelKey) -> Self {
        Self {
            worker_id: worker_id.into(),
            key,
        }
    }

    /// Identifier the backend assigned to the loaded model.
    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    pub fn key(&self) -> &ModelKey {
        &self.key
    }
}

/// Device report returned by a backend probe.
#[derive(Debug, Clone)]
pub struct WorkerStatus {
    pub device: String,
    pub cuda_available: bool,
    pub gpu_count: u32,
}

/// Blocking interface to the wrapped speech toolkit.
pub trait SpeechBackend: Send + Sync {
    /// Report the compute device the backend runs on.
    fn probe(&self) -> Result<WorkerStatus>;

    /// Load a transcription model. Slow; the caller caches the handle.
    fn load_transcriber(&self, model: WhisperModel, device: &DeviceProfile) -> Result<ModelHandle>;

    /// Run transcription over an audio file.
    fn transcribe(
        &self,
        handle: &ModelHandle,
        audio: &Path,
        batch_size: u32,
        language: Option<&str>,
    ) -> Result<RawTranscript>;

    /// Load an alignment model (model plus its metadata) for one language.
    fn load_aligner(&self, language: &str, device: &DeviceProfile) -> Result<ModelHandle>;

    /// Refine segment timing and word boundaries against the audio.
    fn align(&self, handle: &ModelHandle, segments: &[Segment], audio: &Path)
        -> Result<Transcript>;

    /// Load the diarization pipeline.
    fn load_diarizer(&self, device: &DeviceProfile) -> Result<ModelHandle>;

    /// Run diarization over an audio file with optional speaker bounds.
    fn diarize(
        &self,
        handle: &ModelHandle,
        audio: &Path,
        min_speakers: Option<u32>,
        max_speakers: Option<u32>,
    ) -> Result<Vec<SpeakerTurn>>;

    /// Merge speaker turns into a transcript's segments and words.
    fn assign_speakers(
        &self,
        turns: &[SpeakerTurn],
        segments: Vec<Segment>,
        word_segments: Vec<Word>,
    ) -> Result<Transcript>;

    /// Release backend resources on shutdown. Best effort.
    fn shutdown(&self) {}
}
