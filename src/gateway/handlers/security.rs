//! Security stats and administration handlers

use std::sync::Arc;

use axum::{Json, extract::State};
use serde_json::json;

use super::super::state::AppState;

pub(crate) fn security_stats_value(state: &AppState) -> serde_json::Value {
    let security = &state.config.security;
    json!({
        "rate_limit_config": {
            "max_requests": state.rate_limiter.config().max_requests,
            "time_window": state.rate_limiter.config().time_window.as_secs(),
            "block_duration": state.rate_limiter.config().block_duration.as_secs(),
        },
        "blocked_ips": state.rate_limiter.blocked_count(),
        "active_clients": state.rate_limiter.active_clients(),
        "file_validation_config": {
            "max_file_size_mb": security.max_file_size as f64 / (1024.0 * 1024.0),
            "allowed_extensions": security.allowed_extensions,
            "allowed_mime_types": security.allowed_mime_types,
        },
    })
}

/// GET /api/security/stats
#[utoipa::path(
    get,
    path = "/api/security/stats",
    responses((status = 200, description = "Rate limiting and validation stats")),
    tag = "Security"
)]
pub async fn security_stats(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(security_stats_value(&state))
}

/// POST /api/security/clear-rate-limit
#[utoipa::path(
    post,
    path = "/api/security/clear-rate-limit",
    responses((status = 200, description = "Rate limit windows and block list cleared")),
    tag = "Security"
)]
pub async fn clear_rate_limit(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    state.rate_limiter.clear();
    Json(json!({
        "success": true,
        "message": "Rate limit 데이터가 초기화되었습니다",
        "cleared_at": crate::now_micros(),
    }))
}

/// GET /api/security/config
#[utoipa::path(
    get,
    path = "/api/security/config",
    responses((status = 200, description = "Effective security configuration")),
    tag = "Security"
)]
pub async fn security_config(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let security = &state.config.security;
    Json(json!({
        "config": {
            "max_file_size": security.max_file_size,
            "allowed_extensions": security.allowed_extensions,
            "allowed_mime_types": security.allowed_mime_types,
            "force_https": security.force_https,
            "trusted_proxies": security.trusted_proxies,
            "rate_limit": {
                "max_requests": security.rate_limit.max_requests,
                "time_window": security.rate_limit.time_window.as_secs(),
                "block_duration": security.rate_limit.block_duration.as_secs(),
            },
        },
    }))
}
