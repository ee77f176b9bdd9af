//! Sauti Core - transcription service engine
//!
//! Wraps an external speech toolkit (speech-to-text, forced alignment,
//! speaker diarization) behind a process-local model cache and a staged
//! per-request pipeline. Inference itself runs in a Python worker process;
//! this crate owns the worker bridge, the cache, and the request plumbing.
//!
//! # Example
//!
//! ```ignore
//! use sauti_core::{EngineConfig, TranscribeOptions, TranscriptionEngine};
//!
//! let engine = TranscriptionEngine::new(EngineConfig::default())?;
//! let report = engine
//!     .transcribe_upload(&audio_bytes, &TranscribeOptions::default())
//!     .await?;
//! println!("{} segments", report.segments.len());
//! ```

pub mod config;
pub mod device;
pub mod error;
pub mod inference;
pub mod model;
pub mod runtime;

pub use config::{EngineConfig, ServerConfig};
pub use device::{ComputeType, DeviceKind, DeviceProfile};
pub use error::{Error, Result};
pub use inference::{ModelHandle, PythonBridge, SpeechBackend, WorkerStatus};
pub use model::{parse_whisper_model, ModelCache, ModelKey, ParseModelError, WhisperModel};
pub use runtime::{
    RawTranscript, ScratchFile, Segment, SpeakerTurn, TranscribeOptions, Transcript,
    TranscriptionEngine, TranscriptionReport, Word,
};
