//! Order aggregate types
//!
//! An order is a per-session cart of lines. Lines carry a price snapshot
//! taken at add time (catalog price plus surcharges), so later menu edits
//! never reprice an existing cart. Status transitions are monotone:
//! PENDING -> CONFIRMED -> (PREPARING -> READY ->) COMPLETED, or any
//! non-terminal state -> CANCELLED.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Order lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Confirmed,
    Preparing,
    Ready,
    Completed,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Confirmed => "confirmed",
            OrderStatus::Preparing => "preparing",
            OrderStatus::Ready => "ready",
            OrderStatus::Completed => "completed",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Completed | OrderStatus::Cancelled)
    }

    /// Monotone transition check
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        match (self, next) {
            (_, Cancelled) => !self.is_terminal(),
            (Pending, Confirmed) => true,
            (Confirmed, Preparing) | (Confirmed, Completed) => true,
            (Preparing, Ready) => true,
            (Ready, Completed) => true,
            _ => false,
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One cart line: a menu item with an options map and a price snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderLine {
    pub line_id: Uuid,
    pub name: String,
    /// Category at time of order ("단품" / "세트" / "라지세트" semantic)
    pub category: String,
    pub quantity: u32,
    /// Unit price snapshot including surcharges
    pub unit_price: Decimal,
    pub options: FxHashMap<String, String>,
}

impl OrderLine {
    pub fn new(
        name: impl Into<String>,
        category: impl Into<String>,
        quantity: u32,
        unit_price: Decimal,
        options: FxHashMap<String, String>,
    ) -> Self {
        Self {
            line_id: Uuid::new_v4(),
            name: name.into(),
            category: category.into(),
            quantity,
            unit_price,
            options,
        }
    }

    pub fn total(&self) -> Decimal {
        self.unit_price * Decimal::from(self.quantity)
    }

    /// Two lines merge iff name and option map are equal
    pub fn merges_with(&self, other: &OrderLine) -> bool {
        self.name == other.name && self.options == other.options
    }

    /// `type` option value, if set
    pub fn type_option(&self) -> Option<&str> {
        self.options.get("type").map(|s| s.as_str())
    }
}

/// A per-session order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub lines: Vec<OrderLine>,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub customer_info: FxHashMap<String, String>,
}

impl Order {
    pub fn new() -> Self {
        let now = crate::now_micros();
        Self {
            id: Uuid::new_v4(),
            lines: Vec::new(),
            status: OrderStatus::Pending,
            created_at: now,
            updated_at: now,
            customer_info: FxHashMap::default(),
        }
    }

    pub fn total_amount(&self) -> Decimal {
        self.lines.iter().map(|l| l.total()).sum()
    }

    /// Total quantity across lines
    pub fn item_count(&self) -> u32 {
        self.lines.iter().map(|l| l.quantity).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn touch(&mut self) {
        self.updated_at = crate::now_micros();
    }

    pub fn summary(&self) -> OrderSummary {
        OrderSummary {
            order_id: self.id,
            lines: self.lines.clone(),
            total_amount: self.total_amount(),
            item_count: self.lines.len(),
            total_quantity: self.item_count(),
            status: self.status,
            created_at: self.created_at,
        }
    }
}

impl Default for Order {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot handed to formatting and the wire layer
#[derive(Debug, Clone)]
pub struct OrderSummary {
    pub order_id: Uuid,
    pub lines: Vec<OrderLine>,
    pub total_amount: Decimal,
    /// Distinct line count
    pub item_count: usize,
    pub total_quantity: u32,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
}

impl OrderSummary {
    /// The exact customer-facing surface; this text also feeds TTS.
    ///
    /// `- <name> <type|"단품"> <qty>개 - <line_total>원` per line, then a
    /// blank-prefixed total line.
    pub fn format(&self) -> String {
        if self.lines.is_empty() {
            return "주문한 메뉴가 없습니다.".to_string();
        }
        let mut lines = Vec::with_capacity(self.lines.len() + 1);
        for line in &self.lines {
            let type_option = line.type_option().unwrap_or("단품");
            lines.push(format!(
                "- {} {} {}개 - {}원",
                line.name,
                type_option,
                line.quantity,
                crate::money::format_won(line.total())
            ));
        }
        lines.push(format!(
            "\n총 금액: {}원",
            crate::money::format_won(self.total_amount)
        ));
        lines.join("\n")
    }
}

/// Closed failure codes for order operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderErrorKind {
    ItemNotFound,
    ItemUnavailable,
    InvalidQuantity,
    InvalidOption,
    ItemNotInOrder,
    NoActiveOrder,
    EmptyOrder,
    InvalidOrderState,
}

impl OrderErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderErrorKind::ItemNotFound => "ITEM_NOT_FOUND",
            OrderErrorKind::ItemUnavailable => "ITEM_UNAVAILABLE",
            OrderErrorKind::InvalidQuantity => "INVALID_QUANTITY",
            OrderErrorKind::InvalidOption => "INVALID_OPTION",
            OrderErrorKind::ItemNotInOrder => "ITEM_NOT_IN_ORDER",
            OrderErrorKind::NoActiveOrder => "NO_ACTIVE_ORDER",
            OrderErrorKind::EmptyOrder => "EMPTY_ORDER",
            OrderErrorKind::InvalidOrderState => "INVALID_ORDER_STATE",
        }
    }
}

/// Outcome of a single order operation
#[derive(Debug, Clone)]
pub enum OrderResult {
    Success {
        message: String,
        /// Line the operation added or merged into, when applicable
        added_line: Option<OrderLine>,
    },
    Failure {
        code: OrderErrorKind,
        message: String,
    },
}

impl OrderResult {
    pub fn success(message: impl Into<String>) -> Self {
        OrderResult::Success {
            message: message.into(),
            added_line: None,
        }
    }

    pub fn success_with_line(message: impl Into<String>, line: OrderLine) -> Self {
        OrderResult::Success {
            message: message.into(),
            added_line: Some(line),
        }
    }

    pub fn failure(code: OrderErrorKind, message: impl Into<String>) -> Self {
        OrderResult::Failure {
            code,
            message: message.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, OrderResult::Success { .. })
    }

    pub fn message(&self) -> &str {
        match self {
            OrderResult::Success { message, .. } => message,
            OrderResult::Failure { message, .. } => message,
        }
    }

    pub fn error_code(&self) -> Option<OrderErrorKind> {
        match self {
            OrderResult::Success { .. } => None,
            OrderResult::Failure { code, .. } => Some(*code),
        }
    }

    pub fn added_line(&self) -> Option<&OrderLine> {
        match self {
            OrderResult::Success { added_line, .. } => added_line.as_ref(),
            OrderResult::Failure { .. } => None,
        }
    }
}
