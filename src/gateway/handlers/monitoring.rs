//! Monitoring and alerting handlers

use std::sync::Arc;

use axum::{Json, extract::State};
use serde::Deserialize;
use serde_json::json;

use super::super::state::AppState;
use super::super::types::ApiError;

/// GET /api/monitoring/stats
#[utoipa::path(
    get,
    path = "/api/monitoring/stats",
    responses((status = 200, description = "Current metrics and performance report")),
    tag = "Monitoring"
)]
pub async fn monitoring_stats(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(json!({
        "current_metrics": state.monitor.current_metrics(),
        "performance_report": state.monitor.performance_report(),
        "generated_at": crate::now_micros(),
    }))
}

/// GET /api/monitoring/alerts
#[utoipa::path(
    get,
    path = "/api/monitoring/alerts",
    responses((status = 200, description = "Fired alerts and current metrics")),
    tag = "Monitoring"
)]
pub async fn monitoring_alerts(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let alerts = state.alerts.check_alerts(&state.monitor);
    Json(json!({
        "alerts": alerts,
        "alert_count": alerts.len(),
        "current_metrics": state.monitor.current_metrics(),
    }))
}

#[derive(Debug, Deserialize, Default)]
pub struct ExportRequest {
    pub output_file: Option<String>,
}

/// POST /api/monitoring/export
#[utoipa::path(
    post,
    path = "/api/monitoring/export",
    request_body(content = String, description = "{output_file?}", content_type = "application/json"),
    responses((status = 200, description = "Metrics exported to a JSON file")),
    tag = "Monitoring"
)]
pub async fn monitoring_export(
    State(state): State<Arc<AppState>>,
    request: Result<Json<ExportRequest>, axum::extract::rejection::JsonRejection>,
) -> Result<Json<serde_json::Value>, ApiError> {
    // An absent or empty body falls back to a timestamped default file
    let output_file = request
        .ok()
        .and_then(|Json(r)| r.output_file)
        .unwrap_or_else(|| {
            format!(
                "{}/monitoring_export_{}.json",
                state.config.log.log_dir,
                chrono::Utc::now().format("%Y%m%d_%H%M%S")
            )
        });

    state
        .monitor
        .export(std::path::Path::new(&output_file))
        .map_err(|e| ApiError::internal(format!("모니터링 내보내기 실패: {}", e)))?;

    Ok(Json(json!({
        "success": true,
        "output_file": output_file,
        "exported_at": crate::now_micros(),
    })))
}

/// GET /api/monitoring/performance
#[utoipa::path(
    get,
    path = "/api/monitoring/performance",
    responses((status = 200, description = "Performance report with subsystem metrics")),
    tag = "Monitoring"
)]
pub async fn monitoring_performance(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(json!({
        "performance_report": state.monitor.performance_report(),
        "additional_metrics": {
            "tts_cache": state.tts_cache.stats(),
            "pipeline": state.pipeline.stats(),
            "active_sessions": state.sessions.active_count(),
            "orders_in_payment": state.payments.processing_count(),
        },
        "generated_at": crate::now_micros(),
    }))
}
