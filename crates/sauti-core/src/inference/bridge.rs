//! Python bridge to the transcription toolkit.
//! Connects to a persistent worker daemon for fast repeated inference.

use serde::{Deserialize, Serialize};
use std::io::{Read, Write};
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::device::DeviceProfile;
use crate::error::{Error, Result};
use crate::inference::backend::{ModelHandle, SpeechBackend, WorkerStatus};
use crate::model::{ModelKey, WhisperModel};
use crate::runtime::types::{RawTranscript, Segment, SpeakerTurn, Transcript, Word};

/// Request to the Python worker.
#[derive(Debug, Default, Serialize)]
struct WorkerRequest {
    command: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    handle: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    device: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    compute_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    language: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    audio_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    batch_size: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    min_speakers: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_speakers: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    segments: Option<Vec<Segment>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    word_segments: Option<Vec<Word>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    speaker_turns: Option<Vec<SpeakerTurn>>,
}

impl WorkerRequest {
    fn command(name: &str) -> Self {
        Self {
            command: name.to_string(),
            ..Default::default()
        }
    }
}

/// Response from the Python worker.
#[derive(Debug, Deserialize)]
struct WorkerResponse {
    error: Option<String>,
    status: Option<String>,
    handle: Option<String>,
    device: Option<String>,
    cuda_available: Option<bool>,
    gpu_count: Option<u32>,
    language: Option<String>,
    segments: Option<Vec<Segment>>,
    word_segments: Option<Vec<Word>>,
    speaker_turns: Option<Vec<SpeakerTurn>>,
}

/// Bridge to the transcription worker. Prefers a persistent daemon over a
/// unix socket and falls back to one-shot Python invocations when the
/// daemon cannot be reached.
pub struct PythonBridge {
    socket_path: PathBuf,
    daemon_script_path: PathBuf,
    fallback_script_path: PathBuf,
    python_cmd: String,
    daemon_process: Mutex<Option<Child>>,
}

impl PythonBridge {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            socket_path: config.daemon_socket.clone(),
            daemon_script_path: config.worker_script.clone(),
            fallback_script_path: config.fallback_script.clone(),
            python_cmd: config.python_cmd.clone(),
            daemon_process: Mutex::new(None),
        }
    }

    /// Check if the daemon is running
    fn is_daemon_running(&self) -> bool {
        self.socket_path.exists() && self.connect_to_daemon().is_ok()
    }

    /// Start the daemon if not running
    pub fn ensure_daemon_running(&self) -> Result<()> {
        if self.is_daemon_running() {
            debug!("Transcription worker already running");
            return Ok(());
        }

        info!("Starting transcription worker...");

        let child = Command::new(&self.python_cmd)
            .arg(&self.daemon_script_path)
            .arg("--socket")
            .arg(&self.socket_path)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| Error::InferenceError(format!("Failed to start worker: {}", e)))?;

        {
            let mut guard = self.daemon_process.lock().unwrap();
            *guard = Some(child);
        }

        // Wait for the worker to come up (up to 10 seconds)
        for i in 0..100 {
            std::thread::sleep(Duration::from_millis(100));
            if self.socket_path.exists() {
                if let Ok(mut stream) = self.connect_to_daemon() {
                    let request = WorkerRequest::command("check");
                    if self.send_request(&mut stream, &request).is_ok() {
                        info!("Transcription worker started successfully");
                        return Ok(());
                    }
                }
            }
            if i % 20 == 0 {
                debug!("Waiting for worker to start... ({}/10s)", i / 10);
            }
        }

        Err(Error::InferenceError(
            "Worker failed to start within 10 seconds".to_string(),
        ))
    }

    /// Stop the daemon
    pub fn stop_daemon(&self) -> Result<()> {
        if !self.is_daemon_running() {
            return Ok(());
        }

        info!("Stopping transcription worker...");

        // Send shutdown command
        if let Ok(mut stream) = self.connect_to_daemon() {
            let request = WorkerRequest::command("shutdown");
            let _ = self.send_request(&mut stream, &request);
        }

        // Kill the process if we started it
        {
            let mut guard = self.daemon_process.lock().unwrap();
            if let Some(mut child) = guard.take() {
                let _ = child.kill();
                let _ = child.wait();
            }
        }

        // Clean up socket file
        if self.socket_path.exists() {
            let _ = std::fs::remove_file(&self.socket_path);
        }

        Ok(())
    }

    /// Connect to the daemon socket
    fn connect_to_daemon(&self) -> Result<UnixStream> {
        let stream = UnixStream::connect(&self.socket_path)
            .map_err(|e| Error::InferenceError(format!("Failed to connect to worker: {}", e)))?;

        stream.set_read_timeout(Some(Duration::from_secs(600))).ok();
        stream.set_write_timeout(Some(Duration::from_secs(30))).ok();

        Ok(stream)
    }

    /// Send request to daemon and receive response
    fn send_request(
        &self,
        stream: &mut UnixStream,
        request: &WorkerRequest,
    ) -> Result<WorkerResponse> {
        let request_json = serde_json::to_string(request)
            .map_err(|e| Error::InferenceError(format!("Failed to serialize request: {}", e)))?;

        // Length-prefixed message framing
        let data = request_json.as_bytes();
        let length = (data.len() as u32).to_be_bytes();

        stream
            .write_all(&length)
            .map_err(|e| Error::InferenceError(format!("Failed to write length: {}", e)))?;
        stream
            .write_all(data)
            .map_err(|e| Error::InferenceError(format!("Failed to write request: {}", e)))?;
        stream
            .flush()
            .map_err(|e| Error::InferenceError(format!("Failed to flush: {}", e)))?;

        let mut length_buf = [0u8; 4];
        stream
            .read_exact(&mut length_buf)
            .map_err(|e| Error::InferenceError(format!("Failed to read response length: {}", e)))?;
        let response_len = u32::from_be_bytes(length_buf) as usize;

        let mut response_buf = vec![0u8; response_len];
        stream
            .read_exact(&mut response_buf)
            .map_err(|e| Error::InferenceError(format!("Failed to read response body: {}", e)))?;

        let response: WorkerResponse = serde_json::from_slice(&response_buf).map_err(|e| {
            Error::InferenceError(format!(
                "Failed to parse response: {} - {}",
                e,
                String::from_utf8_lossy(&response_buf)
            ))
        })?;

        Ok(response)
    }

    /// Call the daemon, falling back to a one-shot Python invocation
    fn call_worker(&self, request: &WorkerRequest) -> Result<WorkerResponse> {
        if let Err(e) = self.ensure_daemon_running() {
            warn!("Failed to start worker, falling back to direct call: {}", e);
            return self.call_python_direct(request);
        }

        match self.connect_to_daemon() {
            Ok(mut stream) => match self.send_request(&mut stream, request) {
                Ok(response) => Ok(response),
                Err(e) => {
                    warn!("Worker request failed, falling back to direct call: {}", e);
                    self.call_python_direct(request)
                }
            },
            Err(e) => {
                warn!(
                    "Failed to connect to worker, falling back to direct call: {}",
                    e
                );
                self.call_python_direct(request)
            }
        }
    }

    /// Fallback: run the one-shot script with the request on stdin
    fn call_python_direct(&self, request: &WorkerRequest) -> Result<WorkerResponse> {
        let request_json = serde_json::to_string(request)
            .map_err(|e| Error::InferenceError(format!("Failed to serialize request: {}", e)))?;

        let mut child = Command::new(&self.python_cmd)
            .arg(&self.fallback_script_path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| Error::InferenceError(format!("Failed to start Python: {}", e)))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(request_json.as_bytes())
                .map_err(|e| Error::InferenceError(format!("Failed to write to Python: {}", e)))?;
        }

        let output = child
            .wait_with_output()
            .map_err(|e| Error::InferenceError(format!("Python process failed: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::InferenceError(format!("Python error: {}", stderr)));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let json_str = stdout
            .lines()
            .find(|line| line.trim().starts_with('{'))
            .unwrap_or(&stdout);

        serde_json::from_str(json_str).map_err(|e| {
            Error::InferenceError(format!(
                "Failed to parse Python response: {} - {}",
                e, json_str
            ))
        })
    }

    /// Run a load command and turn the response into a cacheable handle.
    fn load_handle(&self, request: WorkerRequest, key: ModelKey) -> Result<ModelHandle> {
        let response = self
            .call_worker(&request)
            .map_err(|e| Error::ModelLoadError(e.to_string()))?;

        if let Some(err) = response.error {
            return Err(Error::ModelLoadError(err));
        }

        let worker_id = response
            .handle
            .ok_or_else(|| Error::ModelLoadError("worker returned no model handle".to_string()))?;

        debug!("Loaded {} as worker handle {}", key, worker_id);
        Ok(ModelHandle::new(worker_id, key))
    }

    fn expect_ok(response: WorkerResponse) -> Result<WorkerResponse> {
        if let Some(err) = response.error {
            return Err(Error::InferenceError(err));
        }
        Ok(response)
    }
}

impl SpeechBackend for PythonBridge {
    fn probe(&self) -> Result<WorkerStatus> {
        let request = WorkerRequest::command("check");
        let response = Self::expect_ok(self.call_worker(&request)?)?;

        if let Some(status) = response.status.as_deref() {
            debug!("Worker status: {}", status);
        }

        Ok(WorkerStatus {
            device: response.device.unwrap_or_else(|| "cpu".to_string()),
            cuda_available: response.cuda_available.unwrap_or(false),
            gpu_count: response.gpu_count.unwrap_or(0),
        })
    }

    fn load_transcriber(&self, model: WhisperModel, device: &DeviceProfile) -> Result<ModelHandle> {
        let request = WorkerRequest {
            model: Some(model.id().to_string()),
            device: Some(device.kind.as_str().to_string()),
            compute_type: Some(device.compute_type.as_str().to_string()),
            ..WorkerRequest::command("load_model")
        };
        self.load_handle(request, ModelKey::Transcriber(model))
    }

    fn transcribe(
        &self,
        handle: &ModelHandle,
        audio: &Path,
        batch_size: u32,
        language: Option<&str>,
    ) -> Result<RawTranscript> {
        let request = WorkerRequest {
            handle: Some(handle.worker_id().to_string()),
            audio_path: Some(audio.to_string_lossy().to_string()),
            batch_size: Some(batch_size),
            language: language.map(|s| s.to_string()),
            ..WorkerRequest::command("transcribe")
        };
        let response = Self::expect_ok(self.call_worker(&request)?)?;

        Ok(RawTranscript {
            language: response.language,
            segments: response.segments.unwrap_or_default(),
        })
    }

    fn load_aligner(&self, language: &str, device: &DeviceProfile) -> Result<ModelHandle> {
        let request = WorkerRequest {
            language: Some(language.to_string()),
            device: Some(device.kind.as_str().to_string()),
            ..WorkerRequest::command("load_align")
        };
        self.load_handle(request, ModelKey::Aligner(language.to_string()))
    }

    fn align(
        &self,
        handle: &ModelHandle,
        segments: &[Segment],
        audio: &Path,
    ) -> Result<Transcript> {
        let request = WorkerRequest {
            handle: Some(handle.worker_id().to_string()),
            segments: Some(segments.to_vec()),
            audio_path: Some(audio.to_string_lossy().to_string()),
            ..WorkerRequest::command("align")
        };
        let response = Self::expect_ok(self.call_worker(&request)?)?;

        Ok(Transcript {
            segments: response.segments.unwrap_or_default(),
            word_segments: response.word_segments.unwrap_or_default(),
        })
    }

    fn load_diarizer(&self, device: &DeviceProfile) -> Result<ModelHandle> {
        let request = WorkerRequest {
            device: Some(device.kind.as_str().to_string()),
            ..WorkerRequest::command("load_diarize")
        };
        self.load_handle(request, ModelKey::Diarizer)
    }

    fn diarize(
        &self,
        handle: &ModelHandle,
        audio: &Path,
        min_speakers: Option<u32>,
        max_speakers: Option<u32>,
    ) -> Result<Vec<SpeakerTurn>> {
        let request = WorkerRequest {
            handle: Some(handle.worker_id().to_string()),
            audio_path: Some(audio.to_string_lossy().to_string()),
            min_speakers,
            max_speakers,
            ..WorkerRequest::command("diarize")
        };
        let response = Self::expect_ok(self.call_worker(&request)?)?;

        Ok(response.speaker_turns.unwrap_or_default())
    }

    fn assign_speakers(
        &self,
        turns: &[SpeakerTurn],
        segments: Vec<Segment>,
        word_segments: Vec<Word>,
    ) -> Result<Transcript> {
        let request = WorkerRequest {
            speaker_turns: Some(turns.to_vec()),
            segments: Some(segments),
            word_segments: Some(word_segments),
            ..WorkerRequest::command("assign_speakers")
        };
        let response = Self::expect_ok(self.call_worker(&request)?)?;

        Ok(Transcript {
            segments: response.segments.unwrap_or_default(),
            word_segments: response.word_segments.unwrap_or_default(),
        })
    }

    fn shutdown(&self) {
        if let Err(e) = self.stop_daemon() {
            warn!("Failed to stop transcription worker: {}", e);
        }
    }
}

impl Drop for PythonBridge {
    fn drop(&mut self) {
        // The worker daemon is left running across bridge drops; use
        // stop_daemon() (or SpeechBackend::shutdown) to stop it explicitly.
    }
}
