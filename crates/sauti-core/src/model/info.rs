//! Model identifiers and cache keys.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The fixed allow-list of supported transcription models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WhisperModel {
    #[serde(rename = "large-v3")]
    LargeV3,
    #[serde(rename = "large-v2")]
    LargeV2,
    #[serde(rename = "large")]
    Large,
    #[serde(rename = "medium")]
    Medium,
    #[serde(rename = "small")]
    Small,
    #[serde(rename = "base")]
    Base,
    #[serde(rename = "tiny")]
    Tiny,
}

impl WhisperModel {
    /// Wire identifier, as accepted in requests and listed by `/models`.
    pub fn id(&self) -> &'static str {
        match self {
            Self::LargeV3 => "large-v3",
            Self::LargeV2 => "large-v2",
            Self::Large => "large",
            Self::Medium => "medium",
            Self::Small => "small",
            Self::Base => "base",
            Self::Tiny => "tiny",
        }
    }

    /// All supported models, largest first.
    pub fn all() -> &'static [WhisperModel] {
        &[
            Self::LargeV3,
            Self::LargeV2,
            Self::Large,
            Self::Medium,
            Self::Small,
            Self::Base,
            Self::Tiny,
        ]
    }
}

impl fmt::Display for WhisperModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id())
    }
}

/// Error returned for identifiers outside the allow-list.
#[derive(Debug, Clone)]
pub struct ParseModelError {
    input: String,
}

impl ParseModelError {
    fn new(input: impl Into<String>) -> Self {
        Self {
            input: input.into(),
        }
    }
}

impl fmt::Display for ParseModelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let shown = if self.input.trim().is_empty() {
            "<empty>"
        } else {
            self.input.trim()
        };
        write!(
            f,
            "Model '{}' not supported. Available: {}",
            shown,
            WhisperModel::all()
                .iter()
                .map(|m| m.id())
                .collect::<Vec<_>>()
                .join(", ")
        )
    }
}

impl std::error::Error for ParseModelError {}

/// Parse a model identifier against the allow-list.
pub fn parse_whisper_model(input: &str) -> Result<WhisperModel, ParseModelError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(ParseModelError::new(input));
    }

    WhisperModel::all()
        .iter()
        .copied()
        .find(|model| model.id().eq_ignore_ascii_case(trimmed))
        .ok_or_else(|| ParseModelError::new(input))
}

/// Cache key covering every loadable model kind. Diarization shares the
/// same keyed namespace as the other kinds rather than living in its own
/// slot.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ModelKey {
    /// A transcription model from the allow-list.
    Transcriber(WhisperModel),
    /// An alignment model for one language code.
    Aligner(String),
    /// The diarization pipeline.
    Diarizer,
}

impl fmt::Display for ModelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelKey::Transcriber(model) => write!(f, "transcriber/{}", model),
            ModelKey::Aligner(language) => write!(f, "aligner/{}", language),
            ModelKey::Diarizer => write!(f, "diarizer"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_every_listed_identifier() {
        for model in WhisperModel::all() {
            assert_eq!(parse_whisper_model(model.id()).unwrap(), *model);
        }
    }

    #[test]
    fn parse_trims_and_ignores_case() {
        assert_eq!(
            parse_whisper_model("  Large-V3 ").unwrap(),
            WhisperModel::LargeV3
        );
    }

    #[test]
    fn rejects_unknown_identifier() {
        let err = parse_whisper_model("turbo-xxl").unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("turbo-xxl"), "unexpected message: {msg}");
        assert!(msg.contains("large-v3"), "unexpected message: {msg}");
    }

    #[test]
    fn rejects_empty_identifier() {
        assert!(parse_whisper_model("   ").is_err());
    }

    #[test]
    fn key_display_names_kind_and_identifier() {
        assert_eq!(
            ModelKey::Transcriber(WhisperModel::Tiny).to_string(),
            "transcriber/tiny"
        );
        assert_eq!(ModelKey::Aligner("en".into()).to_string(), "aligner/en");
        assert_eq!(ModelKey::Diarizer.to_string(), "diarizer");
    }
}
