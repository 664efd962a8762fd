//! Payment progress polling handler

use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
};
use serde_json::json;

use super::super::state::AppState;
use super::super::types::ApiError;
use crate::dialogue::{PAYMENT_STEPS, PaymentState, STEP_DELAYS_MS};

/// Poll the scripted payment progression for an order
///
/// GET /api/payment/progress/{order_id}
#[utoipa::path(
    get,
    path = "/api/payment/progress/{order_id}",
    params(("order_id" = String, Path, description = "Order id")),
    responses(
        (status = 200, description = "Deterministic payment progress snapshot"),
        (status = 400, description = "Malformed order id")
    ),
    tag = "Payment"
)]
pub async fn payment_progress(
    State(state): State<Arc<AppState>>,
    Path(order_id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let id = uuid::Uuid::parse_str(order_id.trim())
        .map_err(|_| ApiError::bad_request("잘못된 주문 ID 형식입니다"))?;

    let Some(snapshot) = state.payments.progress(id) else {
        return Ok(Json(json!({
            "order_id": order_id,
            "status": "not_found",
            "message": "해당 주문을 찾을 수 없습니다.",
        })));
    };

    let body = match snapshot.status {
        PaymentState::Processing => json!({
            "order_id": order_id,
            "status": "processing",
            "progress": {
                "steps": PAYMENT_STEPS,
                "step_delays": STEP_DELAYS_MS,
                "current_step": snapshot.current_step,
            },
        }),
        PaymentState::Completed => json!({
            "order_id": order_id,
            "status": "completed",
            "message": "결제가 완료되었습니다.",
        }),
        PaymentState::Pending => json!({
            "order_id": order_id,
            "status": "pending",
            "message": "결제 대기 중입니다.",
        }),
    };
    Ok(Json(body))
}
