//! TTS provider introspection and hot-swap handlers

use std::sync::Arc;

use axum::{Json, extract::State};
use serde::Deserialize;
use serde_json::json;

use super::super::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SwitchRequest {
    pub provider: String,
    #[serde(default)]
    pub config: Option<serde_json::Value>,
}

/// GET /api/tts/providers
#[utoipa::path(
    get,
    path = "/api/tts/providers",
    responses((status = 200, description = "Available and current TTS providers")),
    tag = "TTS"
)]
pub async fn get_providers(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(json!({
        "available_providers": state.tts.available_providers(),
        "current_provider": state.tts.provider_info(),
    }))
}

/// POST /api/tts/switch
#[utoipa::path(
    post,
    path = "/api/tts/switch",
    request_body(content = String, description = "{provider, config?}", content_type = "application/json"),
    responses((status = 200, description = "Switch outcome with provider info")),
    tag = "TTS"
)]
pub async fn switch_provider(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SwitchRequest>,
) -> Json<serde_json::Value> {
    match state
        .tts
        .switch_provider(&request.provider, request.config.as_ref())
    {
        Ok(()) => Json(json!({
            "success": true,
            "message": format!("TTS 제공자가 {}(으)로 변경되었습니다", request.provider),
            "provider_info": state.tts.provider_info(),
        })),
        Err(e) => Json(json!({
            "success": false,
            "message": e.to_string(),
            "provider_info": state.tts.provider_info(),
        })),
    }
}
