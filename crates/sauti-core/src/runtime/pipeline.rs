//! The per-request transcription pipeline.
//!
//! Stages run strictly sequentially for a request: persist the upload to a
//! scratch file, transcribe, optionally align, optionally diarize, then
//! assemble whatever survived. Transcription failure fails the request;
//! alignment and diarization failures are recorded and the request still
//! succeeds with the pre-enrichment result.

use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::device::DeviceProfile;
use crate::error::{Error, Result};
use crate::inference::{ModelHandle, PythonBridge, SpeechBackend};
use crate::model::{ModelCache, ModelKey, WhisperModel};
use crate::runtime::scratch::ScratchFile;
use crate::runtime::types::{TranscribeOptions, Transcript, TranscriptionReport};

/// Long-lived transcription service: the worker backend, the process-wide
/// model cache, and the resolved device profile.
pub struct TranscriptionEngine {
    config: EngineConfig,
    backend: Arc<dyn SpeechBackend>,
    cache: ModelCache,
    device: DeviceProfile,
}

impl TranscriptionEngine {
    /// Build an engine backed by the Python worker. Starts the worker and
    /// probes its device; an unreachable worker degrades to a CPU profile
    /// so the HTTP surface can still come up.
    pub fn new(config: EngineConfig) -> Result<Self> {
        std::fs::create_dir_all(&config.scratch_dir)?;

        let bridge = PythonBridge::new(&config);
        if let Err(e) = bridge.ensure_daemon_running() {
            warn!("Transcription worker not reachable yet: {}", e);
        }

        let device = match bridge.probe() {
            Ok(status) => DeviceProfile::from_status(&status, config.device_preference.as_deref()),
            Err(e) => {
                warn!("Device probe failed, assuming CPU: {}", e);
                DeviceProfile::cpu()
            }
        };
        info!(
            "Using device: {} with compute_type: {}",
            device.kind, device.compute_type
        );

        Ok(Self {
            config,
            backend: Arc::new(bridge),
            cache: ModelCache::new(),
            device,
        })
    }

    /// Build an engine over an arbitrary backend with a fixed device
    /// profile. Used by embedders and tests.
    pub fn with_backend(
        config: EngineConfig,
        backend: Arc<dyn SpeechBackend>,
        device: DeviceProfile,
    ) -> Self {
        Self {
            config,
            backend,
            cache: ModelCache::new(),
            device,
        }
    }

    pub fn device(&self) -> &DeviceProfile {
        &self.device
    }

    /// The fixed allow-list of supported transcription models.
    pub fn available_models(&self) -> &'static [WhisperModel] {
        WhisperModel::all()
    }

    /// Transcription models currently resident in the cache.
    pub async fn loaded_models(&self) -> Vec<WhisperModel> {
        self.cache.loaded_transcribers().await
    }

    /// Stop the worker backend. Best effort, called on server shutdown.
    pub fn shutdown(&self) {
        self.backend.shutdown();
    }

    /// Run the full pipeline over one uploaded payload.
    pub async fn transcribe_upload(
        &self,
        bytes: &[u8],
        opts: &TranscribeOptions,
    ) -> Result<TranscriptionReport> {
        let scratch = ScratchFile::write(&self.config.scratch_dir, bytes)?;
        // The guard drops at return on every path below.
        self.run_stages(&scratch, opts).await
    }

    async fn run_stages(
        &self,
        scratch: &ScratchFile,
        opts: &TranscribeOptions,
    ) -> Result<TranscriptionReport> {
        let transcriber = {
            let backend = Arc::clone(&self.backend);
            let device = self.device.clone();
            let model = opts.model;
            self.load_cached(ModelKey::Transcriber(model), move || {
                backend.load_transcriber(model, &device)
            })
            .await?
        };

        let raw = {
            let backend = Arc::clone(&self.backend);
            let handle = transcriber.clone();
            let audio = scratch.path().to_path_buf();
            let language = opts.language.clone();
            let batch_size = opts.batch_size;
            tokio::task::spawn_blocking(move || {
                backend.transcribe(&handle, &audio, batch_size, language.as_deref())
            })
            .await
            .map_err(|e| Error::InferenceError(format!("transcription task failed: {}", e)))??
        };
        info!(
            "Initial transcription complete, {} segments (language: {:?})",
            raw.segments.len(),
            raw.language
        );

        let detected_language = raw.language.clone();
        let mut transcript = Transcript {
            segments: raw.segments,
            word_segments: Vec::new(),
        };

        let mut alignment_error = None;
        if opts.align {
            match detected_language.as_deref() {
                Some(language) => {
                    match self.align_stage(scratch, language, transcript.clone()).await {
                        Ok(refined) => {
                            debug!("Alignment complete");
                            transcript = refined;
                        }
                        Err(e) => {
                            warn!("Alignment failed: {}", e);
                            alignment_error = Some(e.to_string());
                        }
                    }
                }
                None => debug!("Skipping alignment: no language detected"),
            }
        }

        let mut diarization_error = None;
        if opts.diarize {
            match self.diarize_stage(scratch, opts, transcript.clone()).await {
                Ok(enriched) => {
                    debug!("Diarization complete");
                    transcript = enriched;
                }
                Err(e) => {
                    warn!("Diarization failed: {}", e);
                    diarization_error = Some(e.to_string());
                }
            }
        }

        Ok(TranscriptionReport {
            segments: transcript.segments,
            word_segments: transcript.word_segments,
            language: detected_language.or_else(|| opts.language.clone()),
            alignment_error,
            diarization_error,
        })
    }

    async fn align_stage(
        &self,
        scratch: &ScratchFile,
        language: &str,
        transcript: Transcript,
    ) -> Result<Transcript> {
        let aligner = {
            let backend = Arc::clone(&self.backend);
            let device = self.device.clone();
            let language = language.to_string();
            self.load_cached(ModelKey::Aligner(language.clone()), move || {
                backend.load_aligner(&language, &device)
            })
            .await?
        };

        let backend = Arc::clone(&self.backend);
        let audio = scratch.path().to_path_buf();
        tokio::task::spawn_blocking(move || backend.align(&aligner, &transcript.segments, &audio))
            .await
            .map_err(|e| Error::InferenceError(format!("alignment task failed: {}", e)))?
    }

    async fn diarize_stage(
        &self,
        scratch: &ScratchFile,
        opts: &TranscribeOptions,
        transcript: Transcript,
    ) -> Result<Transcript> {
        let diarizer = {
            let backend = Arc::clone(&self.backend);
            let device = self.device.clone();
            self.load_cached(ModelKey::Diarizer, move || backend.load_diarizer(&device))
                .await?
        };

        let turns = {
            let backend = Arc::clone(&self.backend);
            let handle = diarizer.clone();
            let audio = scratch.path().to_path_buf();
            let min_speakers = opts.min_speakers;
            let max_speakers = opts.max_speakers;
            tokio::task::spawn_blocking(move || {
                backend.diarize(&handle, &audio, min_speakers, max_speakers)
            })
            .await
            .map_err(|e| Error::InferenceError(format!("diarization task failed: {}", e)))??
        };
        debug!("Diarization found {} speaker turns", turns.len());

        let backend = Arc::clone(&self.backend);
        tokio::task::spawn_blocking(move || {
            backend.assign_speakers(&turns, transcript.segments, transcript.word_segments)
        })
        .await
        .map_err(|e| Error::InferenceError(format!("speaker assignment task failed: {}", e)))?
    }

    async fn load_cached<F>(&self, key: ModelKey, load: F) -> Result<ModelHandle>
    where
        F: FnOnce() -> Result<ModelHandle> + Send + 'static,
    {
        self.cache
            .get_or_load(key, || async move {
                tokio::task::spawn_blocking(load)
                    .await
                    .map_err(|e| Error::ModelLoadError(format!("model load task failed: {}", e)))?
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::WorkerStatus;
    use crate::runtime::types::{RawTranscript, Segment, SpeakerTurn, Word};
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Backend double that counts loads and can be told to fail stages.
    #[derive(Default)]
    struct MockBackend {
        transcriber_loads: AtomicUsize,
        aligner_loads: AtomicUsize,
        diarizer_loads: AtomicUsize,
        fail_transcribe: bool,
        fail_align: bool,
        fail_diarize: bool,
        detected_language: Option<String>,
    }

    impl MockBackend {
        fn detecting(language: &str) -> Self {
            Self {
                detected_language: Some(language.to_string()),
                ..Self::default()
            }
        }
    }

    impl SpeechBackend for MockBackend {
        fn probe(&self) -> Result<WorkerStatus> {
            Ok(WorkerStatus {
                device: "cpu".into(),
                cuda_available: false,
                gpu_count: 0,
            })
        }

        fn load_transcriber(
            &self,
            model: WhisperModel,
            _device: &DeviceProfile,
        ) -> Result<ModelHandle> {
            self.transcriber_loads.fetch_add(1, Ordering::SeqCst);
            Ok(ModelHandle::new(
                format!("t-{}", model),
                ModelKey::Transcriber(model),
            ))
        }

        fn transcribe(
            &self,
            _handle: &ModelHandle,
            audio: &Path,
            _batch_size: u32,
            _language: Option<&str>,
        ) -> Result<RawTranscript> {
            // The scratch file must exist while the stage runs.
            let payload = std::fs::read(audio)?;
            if self.fail_transcribe || payload == b"boom" {
                return Err(Error::InferenceError("decoder blew up".into()));
            }
            Ok(RawTranscript {
                language: self.detected_language.clone(),
                segments: vec![Segment {
                    start: 0.0,
                    end: 2.0,
                    text: String::from_utf8_lossy(&payload).into_owned(),
                    speaker: None,
                    words: None,
                }],
            })
        }

        fn load_aligner(&self, language: &str, _device: &DeviceProfile) -> Result<ModelHandle> {
            self.aligner_loads.fetch_add(1, Ordering::SeqCst);
            Ok(ModelHandle::new(
                format!("a-{}", language),
                ModelKey::Aligner(language.to_string()),
            ))
        }

        fn align(
            &self,
            _handle: &ModelHandle,
            segments: &[Segment],
            _audio: &Path,
        ) -> Result<Transcript> {
            if self.fail_align {
                return Err(Error::InferenceError("alignment diverged".into()));
            }
            let words = segments
                .iter()
                .map(|s| Word {
                    word: s.text.clone(),
                    start: Some(s.start),
                    end: Some(s.end),
                    score: Some(0.9),
                    speaker: None,
                })
                .collect::<Vec<_>>();
            Ok(Transcript {
                segments: segments.to_vec(),
                word_segments: words,
            })
        }

        fn load_diarizer(&self, _device: &DeviceProfile) -> Result<ModelHandle> {
            self.diarizer_loads.fetch_add(1, Ordering::SeqCst);
            Ok(ModelHandle::new("d", ModelKey::Diarizer))
        }

        fn diarize(
            &self,
            _handle: &ModelHandle,
            _audio: &Path,
            _min_speakers: Option<u32>,
            _max_speakers: Option<u32>,
        ) -> Result<Vec<SpeakerTurn>> {
            if self.fail_diarize {
                return Err(Error::InferenceError("no speech activity".into()));
            }
            Ok(vec![SpeakerTurn {
                start: 0.0,
                end: 2.0,
                speaker: "SPEAKER_00".into(),
            }])
        }

        fn assign_speakers(
            &self,
            turns: &[SpeakerTurn],
            segments: Vec<Segment>,
            word_segments: Vec<Word>,
        ) -> Result<Transcript> {
            let speaker = turns.first().map(|t| t.speaker.clone());
            Ok(Transcript {
                segments: segments
                    .into_iter()
                    .map(|mut s| {
                        s.speaker = speaker.clone();
                        s
                    })
                    .collect(),
                word_segments,
            })
        }
    }

    struct Fixture {
        engine: TranscriptionEngine,
        backend: Arc<MockBackend>,
        scratch_root: tempfile::TempDir,
    }

    fn fixture(mock: MockBackend) -> Fixture {
        let scratch_root = tempfile::tempdir().unwrap();
        let config = EngineConfig {
            scratch_dir: scratch_root.path().to_path_buf(),
            ..EngineConfig::default()
        };
        let backend = Arc::new(mock);
        let engine = TranscriptionEngine::with_backend(
            config,
            backend.clone() as Arc<dyn SpeechBackend>,
            DeviceProfile::cpu(),
        );
        Fixture {
            engine,
            backend,
            scratch_root,
        }
    }

    fn scratch_is_empty(fixture: &Fixture) -> bool {
        std::fs::read_dir(fixture.scratch_root.path())
            .unwrap()
            .next()
            .is_none()
    }

    #[tokio::test]
    async fn successful_run_returns_enriched_report_and_cleans_scratch() {
        let f = fixture(MockBackend::detecting("en"));
        let report = f
            .engine
            .transcribe_upload(b"hello", &TranscribeOptions::default())
            .await
            .unwrap();

        assert_eq!(report.segments.len(), 1);
        assert_eq!(report.segments[0].text, "hello");
        assert_eq!(report.segments[0].speaker.as_deref(), Some("SPEAKER_00"));
        assert_eq!(report.word_segments.len(), 1);
        assert_eq!(report.language.as_deref(), Some("en"));
        assert!(report.alignment_error.is_none());
        assert!(report.diarization_error.is_none());
        assert!(scratch_is_empty(&f));
    }

    #[tokio::test]
    async fn transcription_failure_is_fatal_and_cleans_scratch() {
        let f = fixture(MockBackend::detecting("en"));
        let err = f
            .engine
            .transcribe_upload(b"boom", &TranscribeOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InferenceError(_)));
        assert!(scratch_is_empty(&f));
    }

    #[tokio::test]
    async fn repeated_requests_load_each_model_once() {
        let f = fixture(MockBackend::detecting("en"));
        for _ in 0..3 {
            f.engine
                .transcribe_upload(b"hello", &TranscribeOptions::default())
                .await
                .unwrap();
        }
        assert_eq!(f.backend.transcriber_loads.load(Ordering::SeqCst), 1);
        assert_eq!(f.backend.aligner_loads.load(Ordering::SeqCst), 1);
        assert_eq!(f.backend.diarizer_loads.load(Ordering::SeqCst), 1);
        assert_eq!(
            f.engine.loaded_models().await,
            vec![WhisperModel::LargeV3]
        );
    }

    #[tokio::test]
    async fn alignment_failure_keeps_pre_alignment_result() {
        let f = fixture(MockBackend {
            fail_align: true,
            ..MockBackend::detecting("en")
        });
        let report = f
            .engine
            .transcribe_upload(b"hello", &TranscribeOptions::default())
            .await
            .unwrap();

        assert_eq!(report.segments.len(), 1);
        assert!(report.word_segments.is_empty());
        assert!(report
            .alignment_error
            .as_deref()
            .unwrap()
            .contains("alignment diverged"));
        assert!(scratch_is_empty(&f));
    }

    #[tokio::test]
    async fn diarization_failure_keeps_unlabelled_transcript() {
        let f = fixture(MockBackend {
            fail_diarize: true,
            ..MockBackend::detecting("en")
        });
        let report = f
            .engine
            .transcribe_upload(b"hello", &TranscribeOptions::default())
            .await
            .unwrap();

        assert_eq!(report.segments.len(), 1);
        assert!(report.segments[0].speaker.is_none());
        assert!(report.diarization_error.is_some());
        // Alignment still ran.
        assert_eq!(report.word_segments.len(), 1);
    }

    #[tokio::test]
    async fn alignment_is_skipped_without_detected_language() {
        let f = fixture(MockBackend::default());
        let opts = TranscribeOptions {
            language: None,
            diarize: false,
            ..TranscribeOptions::default()
        };
        let report = f.engine.transcribe_upload(b"hello", &opts).await.unwrap();

        assert_eq!(f.backend.aligner_loads.load(Ordering::SeqCst), 0);
        assert!(report.word_segments.is_empty());
        assert!(report.alignment_error.is_none());
        assert!(report.language.is_none());
    }

    #[tokio::test]
    async fn language_falls_back_to_request_hint() {
        let f = fixture(MockBackend::default());
        let opts = TranscribeOptions {
            align: false,
            diarize: false,
            ..TranscribeOptions::default()
        };
        let report = f.engine.transcribe_upload(b"hello", &opts).await.unwrap();
        assert_eq!(report.language.as_deref(), Some("en"));
    }

    #[tokio::test]
    async fn optional_stages_are_not_invoked_when_disabled() {
        let f = fixture(MockBackend::detecting("en"));
        let opts = TranscribeOptions {
            align: false,
            diarize: false,
            ..TranscribeOptions::default()
        };
        f.engine.transcribe_upload(b"hello", &opts).await.unwrap();
        assert_eq!(f.backend.aligner_loads.load(Ordering::SeqCst), 0);
        assert_eq!(f.backend.diarizer_loads.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn failed_transcriber_load_is_retried_next_request() {
        struct FlakyLoad {
            inner: MockBackend,
            failures_left: AtomicUsize,
        }

        impl SpeechBackend for FlakyLoad {
            fn probe(&self) -> Result<WorkerStatus> {
                self.inner.probe()
            }
            fn load_transcriber(
                &self,
                model: WhisperModel,
                device: &DeviceProfile,
            ) -> Result<ModelHandle> {
                if self.failures_left.load(Ordering::SeqCst) > 0 {
                    self.failures_left.fetch_sub(1, Ordering::SeqCst);
                    return Err(Error::ModelLoadError("weights missing".into()));
                }
                self.inner.load_transcriber(model, device)
            }
            fn transcribe(
                &self,
                handle: &ModelHandle,
                audio: &Path,
                batch_size: u32,
                language: Option<&str>,
            ) -> Result<RawTranscript> {
                self.inner.transcribe(handle, audio, batch_size, language)
            }
            fn load_aligner(&self, language: &str, device: &DeviceProfile) -> Result<ModelHandle> {
                self.inner.load_aligner(language, device)
            }
            fn align(
                &self,
                handle: &ModelHandle,
                segments: &[Segment],
                audio: &Path,
            ) -> Result<Transcript> {
                self.inner.align(handle, segments, audio)
            }
            fn load_diarizer(&self, device: &DeviceProfile) -> Result<ModelHandle> {
                self.inner.load_diarizer(device)
            }
            fn diarize(
                &self,
                handle: &ModelHandle,
                audio: &Path,
                min_speakers: Option<u32>,
                max_speakers: Option<u32>,
            ) -> Result<Vec<SpeakerTurn>> {
                self.inner.diarize(handle, audio, min_speakers, max_speakers)
            }
            fn assign_speakers(
                &self,
                turns: &[SpeakerTurn],
                segments: Vec<Segment>,
                word_segments: Vec<Word>,
            ) -> Result<Transcript> {
                self.inner.assign_speakers(turns, segments, word_segments)
            }
        }

        let scratch_root = tempfile::tempdir().unwrap();
        let config = EngineConfig {
            scratch_dir: scratch_root.path().to_path_buf(),
            ..EngineConfig::default()
        };
        let backend = Arc::new(FlakyLoad {
            inner: MockBackend::detecting("en"),
            failures_left: AtomicUsize::new(1),
        });
        let engine = TranscriptionEngine::with_backend(
            config,
            backend.clone() as Arc<dyn SpeechBackend>,
            DeviceProfile::cpu(),
        );

        let opts = TranscribeOptions {
            align: false,
            diarize: false,
            ..TranscribeOptions::default()
        };
        let err = engine.transcribe_upload(b"hello", &opts).await.unwrap_err();
        assert!(matches!(err, Error::ModelLoadError(_)));
        assert!(engine.loaded_models().await.is_empty());

        engine.transcribe_upload(b"hello", &opts).await.unwrap();
        assert_eq!(engine.loaded_models().await, vec![WhisperModel::LargeV3]);
    }
}
