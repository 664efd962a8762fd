//! Liveness, system status and error-stat handlers

use std::sync::Arc;

use axum::{Json, extract::State};
use serde_json::json;

use super::super::state::AppState;
use super::security::security_stats_value;

/// GET /
pub async fn root() -> Json<serde_json::Value> {
    Json(json!({
        "message": "Voice Kiosk API Server",
        "version": env!("CARGO_PKG_VERSION"),
        "status": "running",
    }))
}

/// Liveness probe
///
/// GET /health
#[utoipa::path(
    get,
    path = "/health",
    responses((status = 200, description = "Service healthy")),
    tag = "System"
)]
pub async fn health(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "healthy",
        "api_initialized": true,
        "tts_provider": state.tts.provider_info(),
    }))
}

/// GET /api/system/status
#[utoipa::path(
    get,
    path = "/api/system/status",
    responses((status = 200, description = "Aggregate server status")),
    tag = "System"
)]
pub async fn system_status(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let menu_stats = {
        let catalog = state.catalog.read().expect("catalog lock poisoned");
        serde_json::to_value(catalog.stats()).unwrap_or_default()
    };
    Json(json!({
        "api_initialized": true,
        "server_status": "running",
        "started_at": state.started_at,
        "active_sessions": state.sessions.active_count(),
        "menu_stats": menu_stats,
        "error_stats": state.classifier.stats(),
        "security_stats": security_stats_value(&state),
        "tts_provider": state.tts.provider_info(),
        "pipeline_status": state.pipeline.stats(),
    }))
}

/// GET /api/errors/stats
#[utoipa::path(
    get,
    path = "/api/errors/stats",
    responses((status = 200, description = "Error taxonomy counters")),
    tag = "System"
)]
pub async fn error_stats(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(state.classifier.stats())
}

/// POST /api/errors/clear
#[utoipa::path(
    post,
    path = "/api/errors/clear",
    responses((status = 200, description = "Error counters cleared")),
    tag = "System"
)]
pub async fn clear_errors(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    state.classifier.clear();
    Json(json!({
        "success": true,
        "message": "오류 통계가 초기화되었습니다",
        "cleared_at": crate::now_micros(),
    }))
}
