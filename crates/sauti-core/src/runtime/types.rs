//! Transcript data model and per-request options.

use serde::{Deserialize, Serialize};

use crate::model::WhisperModel;

/// One time-stamped span of transcribed text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Segment {
    pub start: f64,
    pub end: f64,
    pub text: String,
    /// Speaker label assigned by diarization, when available.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speaker: Option<String>,
    /// Word-level detail produced by alignment, when available.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub words: Option<Vec<Word>>,
}

/// Word-level timing produced by the aligner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Word {
    pub word: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speaker: Option<String>,
}

/// One speaker turn produced by the diarizer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeakerTurn {
    pub start: f64,
    pub end: f64,
    pub speaker: String,
}

/// Initial transcription output: detected language plus ordered segments.
#[derive(Debug, Clone, Deserialize)]
pub struct RawTranscript {
    pub language: Option<String>,
    pub segments: Vec<Segment>,
}

/// Working transcript state carried between pipeline stages.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Transcript {
    pub segments: Vec<Segment>,
    #[serde(default)]
    pub word_segments: Vec<Word>,
}

/// Per-request options for the transcription pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscribeOptions {
    #[serde(default = "default_model")]
    pub model: WhisperModel,

    /// Language hint passed to transcription; also the fallback language
    /// reported when detection yields none.
    #[serde(default = "default_language")]
    pub language: Option<String>,

    #[serde(default = "default_enabled")]
    pub diarize: bool,

    #[serde(default = "default_enabled")]
    pub align: bool,

    #[serde(default = "default_batch_size")]
    pub batch_size: u32,

    #[serde(default = "default_min_speakers")]
    pub min_speakers: Option<u32>,

    #[serde(default = "default_max_speakers")]
    pub max_speakers: Option<u32>,
}

fn default_model() -> WhisperModel {
    WhisperModel::LargeV3
}

fn default_language() -> Option<String> {
    Some("en".to_string())
}

fn default_enabled() -> bool {
    true
}

fn default_batch_size() -> u32 {
    16
}

fn default_min_speakers() -> Option<u32> {
    Some(1)
}

fn default_max_speakers() -> Option<u32> {
    Some(10)
}

impl Default for TranscribeOptions {
    fn default() -> Self {
        Self {
            model: default_model(),
            language: default_language(),
            diarize: default_enabled(),
            align: default_enabled(),
            batch_size: default_batch_size(),
            min_speakers: default_min_speakers(),
            max_speakers: default_max_speakers(),
        }
    }
}

/// Outcome of one pipeline run. Optional stages record their failure here
/// instead of failing the request.
#[derive(Debug, Clone)]
pub struct TranscriptionReport {
    pub segments: Vec<Segment>,
    pub word_segments: Vec<Word>,
    /// Detected language, or the request hint when detection yielded none.
    pub language: Option<String>,
    pub alignment_error: Option<String>,
    pub diarization_error: Option<String>,
}
