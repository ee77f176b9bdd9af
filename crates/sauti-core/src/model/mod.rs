//! Model catalog and the process-wide handle cache.

mod cache;
mod info;

pub use cache::ModelCache;
pub use info::{parse_whisper_model, ModelKey, ParseModelError, WhisperModel};
