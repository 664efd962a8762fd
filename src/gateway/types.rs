//! Wire schema and response helpers
//!
//! `ServerResponse` is the single envelope for `/api/voice/process`:
//! recoverable per-request failures travel as `success=false` on HTTP 200 so
//! the client renders the guided recovery UI uniformly. Transport-layer
//! misuse (malformed multipart, oversize upload, HTTPS-required, rate-limit)
//! uses plain 4xx JSON bodies built by [`ApiError`].

use axum::{Json, http::StatusCode, response::IntoResponse};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::order::Order;

// ============================================================================
// ServerResponse envelope
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ServerResponse {
    pub success: bool,
    pub message: String,
    pub tts_audio_url: Option<String>,
    pub order_data: Option<OrderData>,
    pub ui_actions: Vec<UIAction>,
    pub error_info: Option<ErrorInfo>,
    /// Seconds spent in the processing stages
    pub processing_time: f64,
    pub session_id: Option<String>,
    /// ISO-8601 with microsecond precision
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct OrderItemData {
    pub item_id: String,
    pub name: String,
    pub category: String,
    pub quantity: u32,
    pub price: Decimal,
    #[schema(value_type = Object)]
    pub options: FxHashMap<String, String>,
    pub total_price: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct OrderData {
    pub order_id: Option<String>,
    pub items: Vec<OrderItemData>,
    pub total_amount: Decimal,
    pub status: String,
    pub requires_confirmation: bool,
    pub item_count: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl OrderData {
    pub fn from_order(order: &Order, requires_confirmation: bool) -> Self {
        Self {
            order_id: Some(order.id.to_string()),
            items: order
                .lines
                .iter()
                .map(|line| OrderItemData {
                    item_id: line.line_id.to_string(),
                    name: line.name.clone(),
                    category: line.category.clone(),
                    quantity: line.quantity,
                    price: line.unit_price,
                    options: line.options.clone(),
                    total_price: line.total(),
                })
                .collect(),
            total_amount: order.total_amount(),
            status: order.status.as_str().to_string(),
            requires_confirmation,
            item_count: order.item_count(),
            created_at: order.created_at,
            updated_at: order.updated_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct UIAction {
    /// One of: show_menu, show_payment, show_options, update_order,
    /// show_confirmation, show_error, show_voice_guide, show_retry_button,
    /// show_network_status
    pub action_type: String,
    #[schema(value_type = Object)]
    pub data: serde_json::Value,
    pub priority: i32,
    pub requires_user_input: bool,
    pub timeout_seconds: Option<u32>,
}

impl UIAction {
    pub fn update_order(order_data: &OrderData) -> Self {
        Self {
            action_type: "update_order".to_string(),
            data: serde_json::to_value(order_data).unwrap_or_default(),
            priority: 1,
            requires_user_input: false,
            timeout_seconds: None,
        }
    }

    pub fn show_confirmation(message: &str, options: Vec<&str>) -> Self {
        Self {
            action_type: "show_confirmation".to_string(),
            data: serde_json::json!({ "message": message, "options": options }),
            priority: 0,
            requires_user_input: true,
            timeout_seconds: Some(30),
        }
    }

    pub fn show_menu(data: serde_json::Value) -> Self {
        Self {
            action_type: "show_menu".to_string(),
            data,
            priority: 0,
            requires_user_input: true,
            timeout_seconds: None,
        }
    }

    pub fn show_payment(payment: &PaymentData) -> Self {
        Self {
            action_type: "show_payment".to_string(),
            data: serde_json::to_value(payment).unwrap_or_default(),
            priority: 0,
            requires_user_input: true,
            timeout_seconds: Some(300),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ErrorInfo {
    pub error_code: String,
    pub error_message: String,
    pub recovery_actions: Vec<String>,
    #[schema(value_type = Object, nullable)]
    pub details: Option<serde_json::Value>,
    pub timestamp: DateTime<Utc>,
}

/// Payload of the `show_payment` UI action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct PaymentData {
    pub total_amount: Decimal,
    pub payment_methods: Vec<String>,
    #[schema(value_type = Vec<Object>)]
    pub order_summary: Vec<serde_json::Value>,
    pub tax_amount: Decimal,
    pub service_charge: Decimal,
    pub discount_amount: Decimal,
}

impl PaymentData {
    pub fn from_order_data(order_data: &OrderData, tax_rate: Decimal) -> Self {
        Self {
            total_amount: order_data.total_amount,
            payment_methods: vec!["카드".to_string(), "현금".to_string(), "모바일".to_string()],
            order_summary: order_data
                .items
                .iter()
                .map(|i| serde_json::to_value(i).unwrap_or_default())
                .collect(),
            tax_amount: order_data.total_amount * tax_rate,
            service_charge: Decimal::ZERO,
            discount_amount: Decimal::ZERO,
        }
    }
}

/// Entry of the `show_menu` UI action's option list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct MenuOption {
    pub option_id: String,
    pub display_text: String,
    pub category: String,
    pub price: Option<Decimal>,
    pub description: Option<String>,
    pub available: bool,
}

impl MenuOption {
    pub fn from_menu_item(item: &crate::menu::MenuItem) -> Self {
        Self {
            option_id: item.name.clone(),
            display_text: item.name.clone(),
            category: item.category.clone(),
            price: Some(item.price),
            description: Some(item.description.clone()),
            available: item.available,
        }
    }
}

// ============================================================================
// Transport-layer error type for the admin/infra endpoints
// ============================================================================

/// 4xx/5xx JSON error with a stable `error` discriminator
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub error: &'static str,
    pub message: String,
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl ApiError {
    pub fn new(status: StatusCode, error: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            error,
            message: message.into(),
            extra: serde_json::Map::new(),
        }
    }

    pub fn with(mut self, key: &str, value: serde_json::Value) -> Self {
        self.extra.insert(key.to_string(), value);
        self
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "INVALID_REQUEST", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "NOT_FOUND", message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "SERVER_ERROR", message)
    }

    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::SERVICE_UNAVAILABLE,
            "SERVICE_UNAVAILABLE",
            message,
        )
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let mut body = serde_json::json!({
            "error": self.error,
            "message": self.message,
        });
        if let Some(map) = body.as_object_mut() {
            for (k, v) in self.extra {
                map.insert(k, v);
            }
        }
        (self.status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::order::OrderLine;

    fn sample_order() -> Order {
        let mut order = Order::new();
        let mut options = FxHashMap::default();
        options.insert("type".to_string(), "세트".to_string());
        order
            .lines
            .push(OrderLine::new("빅맥", "버거", 2, Decimal::from(8500), options));
        order
    }

    fn sample_response() -> ServerResponse {
        let order_data = OrderData::from_order(&sample_order(), true);
        ServerResponse {
            success: true,
            message: "빅맥 세트 2개이(가) 주문에 추가되었습니다.".to_string(),
            tts_audio_url: Some("/api/voice/tts/abc".to_string()),
            ui_actions: vec![
                UIAction::update_order(&order_data),
                UIAction::show_confirmation("결제하시겠어요?", vec!["예", "아니오"]),
            ],
            order_data: Some(order_data),
            error_info: None,
            processing_time: 0.42,
            session_id: Some(uuid::Uuid::new_v4().to_string()),
            timestamp: crate::now_micros(),
        }
    }

    #[test]
    fn test_server_response_json_round_trip() {
        let response = sample_response();
        let json = serde_json::to_string(&response).unwrap();
        let back: ServerResponse = serde_json::from_str(&json).unwrap();
        assert_eq!(response, back);
    }

    #[test]
    fn test_ui_action_order_preserved() {
        let response = sample_response();
        let json = serde_json::to_value(&response).unwrap();
        let actions = json["ui_actions"].as_array().unwrap();
        assert_eq!(actions[0]["action_type"], "update_order");
        assert_eq!(actions[1]["action_type"], "show_confirmation");
    }

    #[test]
    fn test_order_data_totals() {
        let data = OrderData::from_order(&sample_order(), false);
        assert_eq!(data.total_amount, Decimal::from(17000));
        assert_eq!(data.item_count, 2);
        assert_eq!(data.items[0].total_price, Decimal::from(17000));
        assert_eq!(data.items[0].options["type"], "세트");
    }

    #[test]
    fn test_payment_data_from_order_data() {
        let data = OrderData::from_order(&sample_order(), false);
        let payment = PaymentData::from_order_data(&data, Decimal::new(1, 1));
        assert_eq!(payment.total_amount, Decimal::from(17000));
        assert_eq!(payment.tax_amount, Decimal::from(1700));
        assert_eq!(payment.payment_methods.len(), 3);
    }

    #[test]
    fn test_api_error_body_shape() {
        let err =
            ApiError::new(StatusCode::TOO_MANY_REQUESTS, "RATE_LIMIT_EXCEEDED", "과도한 요청")
                .with("retry_after", serde_json::json!(3600));
        assert_eq!(err.status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(err.extra["retry_after"], 3600);
    }
}
