//! Engine error types.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced by the transcription engine and the worker bridge.
#[derive(Debug, Error)]
pub enum Error {
    /// The requested model identifier is not on the allow-list. Rejected
    /// before any loading or inference happens.
    #[error("{0}")]
    UnsupportedModel(String),

    /// Loading a model into the worker failed. Nothing is cached, so a
    /// later request retries the load.
    #[error("model load failed: {0}")]
    ModelLoadError(String),

    /// An inference call (transcribe, align, diarize) failed inside the
    /// worker or the bridge to it.
    #[error("inference failed: {0}")]
    InferenceError(String),

    /// The uploaded payload could not be persisted to a scratch file.
    #[error("failed to persist upload: {0}")]
    ScratchWrite(#[source] std::io::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
}

impl From<crate::model::ParseModelError> for Error {
    fn from(err: crate::model::ParseModelError) -> Self {
        Error::UnsupportedModel(err.to_string())
    }
}
