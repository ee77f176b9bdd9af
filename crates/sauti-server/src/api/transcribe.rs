//! Transcription endpoints.

use axum::extract::{Multipart, State};
use axum::Json;
use serde::Serialize;
use tracing::{error, info, warn};

use sauti_core::{
    parse_whisper_model, Segment, TranscribeOptions, TranscriptionEngine, TranscriptionReport,
    Word,
};

use crate::error::ApiError;
use crate::state::AppState;

/// Assembled result for one transcribed file. The `*_enabled` flags echo
/// the caller's request flags, not whether the stage succeeded.
#[derive(Debug, Serialize)]
pub struct TranscribeResponse {
    pub segments: Vec<Segment>,
    pub language: Option<String>,
    pub model_used: &'static str,
    pub device: String,
    pub diarization_enabled: bool,
    pub alignment_enabled: bool,
    pub word_segments: Vec<Word>,
}

/// Per-file outcome row of a batch request.
#[derive(Debug, Serialize)]
pub struct BatchEntry {
    pub filename: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<TranscribeResponse>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct BatchResponse {
    pub results: Vec<BatchEntry>,
}

/// Raw multipart scalar fields before validation.
#[derive(Debug, Default)]
struct OptionFields {
    model: Option<String>,
    language: Option<String>,
    diarize: Option<bool>,
    align: Option<bool>,
    batch_size: Option<u32>,
    min_speakers: Option<u32>,
    max_speakers: Option<u32>,
}

impl OptionFields {
    /// Record one scalar field. Empty values are ignored and unparsable
    /// numerics fall back to the defaults.
    fn apply(&mut self, name: &str, value: &str) {
        let value = value.trim();
        if value.is_empty() {
            return;
        }
        match name {
            "model" => self.model = Some(value.to_string()),
            "language" => self.language = Some(value.to_string()),
            "diarize" => self.diarize = Some(parse_bool(value)),
            "align" => self.align = Some(parse_bool(value)),
            "batch_size" => self.batch_size = value.parse().ok(),
            "min_speakers" => self.min_speakers = value.parse().ok(),
            "max_speakers" => self.max_speakers = value.parse().ok(),
            _ => {}
        }
    }

    /// Validate the model identifier and fill the remaining defaults.
    fn into_options(self) -> Result<TranscribeOptions, ApiError> {
        let mut opts = TranscribeOptions::default();
        if let Some(raw) = self.model {
            opts.model = parse_whisper_model(&raw).map_err(sauti_core::Error::from)?;
        }
        if let Some(language) = self.language {
            opts.language = Some(language);
        }
        if let Some(diarize) = self.diarize {
            opts.diarize = diarize;
        }
        if let Some(align) = self.align {
            opts.align = align;
        }
        if let Some(batch_size) = self.batch_size {
            opts.batch_size = batch_size;
        }
        if let Some(min_speakers) = self.min_speakers {
            opts.min_speakers = Some(min_speakers);
        }
        if let Some(max_speakers) = self.max_speakers {
            opts.max_speakers = Some(max_speakers);
        }
        Ok(opts)
    }
}

fn parse_bool(value: &str) -> bool {
    matches!(
        value.to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

/// Uploaded files plus the shared option fields of one multipart request.
#[derive(Debug, Default)]
struct UploadRequest {
    files: Vec<(String, Vec<u8>)>,
    options: OptionFields,
}

async fn read_upload(
    mut multipart: Multipart,
    file_fields: &[&str],
) -> Result<UploadRequest, ApiError> {
    let mut out = UploadRequest::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("Invalid multipart payload: {e}")))?
    {
        let name = field.name().unwrap_or_default().to_string();
        if file_fields.contains(&name.as_str()) {
            let filename = field.file_name().unwrap_or("upload").to_string();
            let bytes = field
                .bytes()
                .await
                .map_err(|e| multipart_field_error(&name, &e.to_string()))?;
            if !bytes.is_empty() {
                out.files.push((filename, bytes.to_vec()));
            }
        } else {
            let text = field.text().await.map_err(|e| {
                ApiError::bad_request(format!("Failed reading multipart '{}' field: {e}", name))
            })?;
            out.options.apply(&name, &text);
        }
    }

    Ok(out)
}

fn multipart_field_error(field_name: &str, raw: &str) -> ApiError {
    let lowered = raw.to_ascii_lowercase();
    if lowered.contains("multipart/form-data") {
        return ApiError::bad_request(format!(
            "Failed reading multipart '{}' field: {}. \
This is commonly caused by oversized uploads or malformed multipart boundaries. \
Ensure `Content-Type` includes a valid boundary (let your HTTP client set it automatically for FormData) and keep payload under 64 MiB.",
            field_name, raw
        ));
    }

    ApiError::bad_request(format!(
        "Failed reading multipart '{}' field: {}",
        field_name, raw
    ))
}

fn build_response(
    report: TranscriptionReport,
    opts: &TranscribeOptions,
    device: String,
) -> TranscribeResponse {
    TranscribeResponse {
        segments: report.segments,
        language: report.language,
        model_used: opts.model.id(),
        device,
        diarization_enabled: opts.diarize,
        alignment_enabled: opts.align,
        word_segments: report.word_segments,
    }
}

/// Transcribe a single uploaded audio file.
pub async fn transcribe(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<TranscribeResponse>, ApiError> {
    let upload = read_upload(multipart, &["file", "audio"]).await?;
    let opts = upload.options.into_options()?;
    let (filename, bytes) = upload
        .files
        .into_iter()
        .next()
        .ok_or_else(|| ApiError::bad_request("Missing audio input (`file` field)"))?;

    info!("Transcribing {} with model {}", filename, opts.model);

    let _permit = state.acquire_permit().await;
    let report = state
        .engine
        .transcribe_upload(&bytes, &opts)
        .await
        .map_err(|e| {
            error!("Transcription failed: {}", e);
            ApiError::from(e)
        })?;

    let device = state.engine.device().kind.to_string();
    Ok(Json(build_response(report, &opts, device)))
}

/// Transcribe several uploaded audio files, isolating per-file failures.
pub async fn transcribe_batch(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<BatchResponse>, ApiError> {
    let upload = read_upload(multipart, &["files", "file"]).await?;
    let opts = upload.options.into_options()?;
    if upload.files.is_empty() {
        return Err(ApiError::bad_request("Missing audio input (`files` field)"));
    }

    info!(
        "Batch transcription of {} files with model {}",
        upload.files.len(),
        opts.model
    );

    let _permit = state.acquire_permit().await;
    let results = run_batch(&state.engine, upload.files, &opts).await;
    Ok(Json(BatchResponse { results }))
}

/// Run each file through the single-file pipeline. A fatal error for one
/// file becomes its entry's error text and never aborts the siblings.
async fn run_batch(
    engine: &TranscriptionEngine,
    files: Vec<(String, Vec<u8>)>,
    opts: &TranscribeOptions,
) -> Vec<BatchEntry> {
    let device = engine.device().kind.to_string();
    let mut results = Vec::with_capacity(files.len());

    for (filename, bytes) in files {
        match engine.transcribe_upload(&bytes, opts).await {
            Ok(report) => results.push(BatchEntry {
                filename,
                success: true,
                result: Some(build_response(report, opts, device.clone())),
                error: None,
            }),
            Err(e) => {
                warn!("Batch file '{}' failed: {}", filename, e);
                results.push(BatchEntry {
                    filename,
                    success: false,
                    result: None,
                    error: Some(e.to_string()),
                });
            }
        }
    }

    results
}
