//! Request-scoped scratch copies of uploaded audio.

use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;
use uuid::Uuid;

use crate::error::{Error, Result};

/// A scratch file holding one request's upload. The file is removed when
/// the guard drops, which covers every exit path of the request. Removal
/// failures are logged and never surfaced.
#[derive(Debug)]
pub struct ScratchFile {
    path: PathBuf,
}

impl ScratchFile {
    /// Persist `bytes` under `dir` with a unique name.
    pub fn write(dir: &Path, bytes: &[u8]) -> Result<Self> {
        fs::create_dir_all(dir).map_err(Error::ScratchWrite)?;
        let path = dir.join(format!("upload-{}.wav", Uuid::new_v4()));
        fs::write(&path, bytes).map_err(Error::ScratchWrite)?;
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ScratchFile {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            warn!("Failed to clean up scratch file {:?}: {}", self.path, e);
        }
    }
}
