//! Voice processing handlers (main entry + TTS fetch)

use std::sync::Arc;

use axum::{
    Extension, Json,
    extract::{Multipart, Path, Query, State},
    http::{StatusCode, header},
    response::IntoResponse,
};
use serde::Deserialize;

use super::super::ClientIp;
use super::super::state::AppState;
use super::super::types::{ApiError, ServerResponse};
use crate::pipeline::PipelineOutcome;

#[derive(Debug, Deserialize)]
pub struct ProcessQuery {
    pub session_id: Option<String>,
}

/// Main entry: process one uploaded utterance
///
/// POST /api/voice/process
#[utoipa::path(
    post,
    path = "/api/voice/process",
    request_body(content = String, description = "multipart: audio_file (WAV) + optional session_id", content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Processed (success may be false for guided recovery)", body = ServerResponse),
        (status = 400, description = "File validation failed"),
        (status = 429, description = "Rate limited"),
        (status = 503, description = "Request queue full")
    ),
    tag = "Voice"
)]
pub async fn process_voice(
    State(state): State<Arc<AppState>>,
    Extension(ClientIp(client_ip)): Extension<ClientIp>,
    Query(query): Query<ProcessQuery>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<ServerResponse>), ApiError> {
    let mut filename = None;
    let mut bytes = None;
    let mut form_session_id = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("malformed multipart body: {}", e)))?
    {
        let name = field.name().map(|n| n.to_string());
        match name.as_deref() {
            Some("audio_file") => {
                filename = field.file_name().map(|n| n.to_string());
                bytes = Some(field.bytes().await.map_err(|e| {
                    ApiError::bad_request(format!("audio_file read failed: {}", e))
                })?);
            }
            Some("session_id") => {
                form_session_id = field.text().await.ok();
            }
            _ => {}
        }
    }

    let bytes = bytes.ok_or_else(|| ApiError::bad_request("audio_file field is required"))?;
    let filename = filename.unwrap_or_else(|| "upload.wav".to_string());

    // Unknown/garbled session ids start a fresh session rather than failing
    let session_id = form_session_id
        .or(query.session_id)
        .and_then(|s| uuid::Uuid::parse_str(s.trim()).ok());

    let outcome = state
        .pipeline
        .handle_request(&filename, &bytes, session_id, &client_ip)
        .await;

    match outcome {
        PipelineOutcome::Response(response) => Ok((StatusCode::OK, Json(*response))),
        PipelineOutcome::ValidationFailed(errors) => {
            let details = errors
                .iter()
                .map(|(field, message)| format!("{}: {}", field, message))
                .collect::<Vec<_>>()
                .join("; ");
            Err(ApiError::new(
                StatusCode::BAD_REQUEST,
                "FILE_VALIDATION_FAILED",
                "파일 검증에 실패했습니다",
            )
            .with("validation_errors", serde_json::json!(errors))
            .with("details", serde_json::json!(details)))
        }
        PipelineOutcome::QueueFull => Err(ApiError::service_unavailable(
            "요청 대기열이 가득 찼습니다. 잠시 후 다시 시도해주세요",
        )),
    }
}

/// Fetch a synthesized clip by id
///
/// GET /api/voice/tts/{file_id}
#[utoipa::path(
    get,
    path = "/api/voice/tts/{file_id}",
    params(("file_id" = String, Path, description = "TTS file id")),
    responses(
        (status = 200, description = "WAV stream", content_type = "audio/wav"),
        (status = 404, description = "Unknown or expired file id")
    ),
    tag = "Voice"
)]
pub async fn get_tts_file(
    State(state): State<Arc<AppState>>,
    Path(file_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let path = state
        .tts
        .file_path(&file_id)
        .ok_or_else(|| ApiError::not_found("TTS 파일을 찾을 수 없습니다"))?;

    let bytes = tokio::fs::read(&path)
        .await
        .map_err(|e| ApiError::internal(format!("TTS 파일을 읽을 수 없습니다: {}", e)))?;

    Ok((
        [
            (header::CONTENT_TYPE, "audio/wav".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("inline; filename=\"tts_{}.wav\"", file_id),
            ),
        ],
        bytes,
    ))
}
