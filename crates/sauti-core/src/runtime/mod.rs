//! Request pipeline, scratch-file handling, and transcript types.

mod pipeline;
mod scratch;
pub(crate) mod types;

pub use pipeline::TranscriptionEngine;
pub use scratch::ScratchFile;
pub use types::{
    RawTranscript, Segment, SpeakerTurn, TranscribeOptions, Transcript, TranscriptionReport, Word,
};
