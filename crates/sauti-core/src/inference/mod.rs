//! Backend seam and the Python worker bridge.

mod backend;
mod bridge;

pub use backend::{ModelHandle, SpeechBackend, WorkerStatus};
pub use bridge::PythonBridge;
