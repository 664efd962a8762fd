//! Optimization stats handlers
//!
//! The `compression` and `connection_pool` sections report for compatibility
//! with the legacy client dashboard; only the TTS cache has a behavioral
//! contract behind it.

use std::sync::Arc;

use axum::{Json, extract::State};
use serde_json::json;

use super::super::state::AppState;

/// GET /api/optimization/stats
#[utoipa::path(
    get,
    path = "/api/optimization/stats",
    responses((status = 200, description = "Cache / pool statistics")),
    tag = "Optimization"
)]
pub async fn optimization_stats(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(json!({
        "compression": {
            "enabled": false,
        },
        "cache": state.tts_cache.stats(),
        "connection_pool": state.pipeline.stats(),
        "timestamp": crate::now_micros(),
    }))
}

/// POST /api/optimization/clear-cache
#[utoipa::path(
    post,
    path = "/api/optimization/clear-cache",
    responses((status = 200, description = "TTS cache cleared")),
    tag = "Optimization"
)]
pub async fn clear_cache(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    state.tts_cache.clear();
    Json(json!({
        "success": true,
        "message": "TTS 캐시가 초기화되었습니다",
        "cleared_at": crate::now_micros(),
    }))
}
