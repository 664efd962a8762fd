//! Payment sub-state machine
//!
//! While an order is in the `Processing` sub-state, short user utterances are
//! routed through the closed affirmative/negative vocabularies instead of the
//! reasoner's intent label (short confirmations are frequently mislabelled).
//!
//! Payment itself is a scripted four-step progression. The server never
//! blocks through the steps; it records when processing started and the
//! progress endpoint computes the current step from elapsed time.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use rust_decimal::Decimal;
use serde::Serialize;
use std::time::Instant;
use uuid::Uuid;

/// Per-order payment sub-state. Authoritative for routing ambiguous short
/// utterances.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentState {
    Pending,
    Processing,
    Completed,
}

impl PaymentState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentState::Pending => "pending",
            PaymentState::Processing => "processing",
            PaymentState::Completed => "completed",
        }
    }
}

/// Scripted progression published to the client
pub const PAYMENT_STEPS: [&str; 4] = [
    "결제를 진행합니다...",
    "카드를 삽입해 주세요...",
    "결제 승인 중...",
    "결제가 완료되었습니다!",
];

/// Per-step delay in milliseconds before the next step becomes current
pub const STEP_DELAYS_MS: [u64; 4] = [1000, 1000, 1000, 0];

/// Closed affirmative vocabulary for payment confirmation
pub const AFFIRMATIVE_VOCAB: [&str; 32] = [
    "네", "예", "알겠다", "확인", "좋아", "맞아", "그래", "응", "오케이", "ok", "결제", "진행",
    "해주세요", "부탁", "합니다", "결제해", "결제할게", "결제하자", "결제진행", "결제해주세요",
    "맞습니다", "맞아요", "그렇습니다", "그래요", "좋습니다", "동의", "승인", "허가", "진행해",
    "계속", "yes", "y",
];

/// Closed negative vocabulary for payment cancellation
pub const NEGATIVE_VOCAB: [&str; 16] = [
    "아니", "안", "취소", "그만", "중단", "멈춰", "stop", "no", "n", "아니요", "아니야", "싫어",
    "안해", "안할래", "취소해", "취소할게",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confirmation {
    Positive,
    Negative,
    Ambiguous,
}

/// Classify a short utterance against the confirmation vocabularies.
/// Negative tokens win over positive ones (the clearer signal).
pub fn classify_confirmation(input: &str) -> Confirmation {
    let cleaned: String = input
        .to_lowercase()
        .chars()
        .filter(|c| !c.is_whitespace() && !matches!(c, '.' | '!' | '?'))
        .collect();

    if cleaned.is_empty() {
        return Confirmation::Ambiguous;
    }
    if NEGATIVE_VOCAB.iter().any(|t| cleaned.contains(t)) {
        return Confirmation::Negative;
    }
    if AFFIRMATIVE_VOCAB.iter().any(|t| cleaned.contains(t)) {
        return Confirmation::Positive;
    }
    Confirmation::Ambiguous
}

/// Completion message: all four step strings plus the charged total
pub fn completion_message(total: Decimal) -> String {
    format!(
        "{}\n\n총 {}원이 결제되었습니다.",
        PAYMENT_STEPS.join("\n"),
        crate::money::format_won(total)
    )
}

// ============================================================================
// Progress tracking
// ============================================================================

#[derive(Debug, Clone)]
struct ProgressRecord {
    state: PaymentState,
    total_amount: Decimal,
    processing_since: Option<Instant>,
    updated_at: DateTime<Utc>,
}

/// Snapshot served by `/api/payment/progress/{order_id}`
#[derive(Debug, Clone, Serialize)]
pub struct ProgressSnapshot {
    pub status: PaymentState,
    pub current_step: usize,
    pub total_amount: Decimal,
}

/// Process-wide map of order id -> payment sub-state. Mutations happen only
/// inside the owning session's turn; the progress endpoint reads concurrently.
#[derive(Default)]
pub struct PaymentTracker {
    orders: DashMap<Uuid, ProgressRecord>,
}

impl PaymentTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state_of(&self, order_id: Uuid) -> Option<PaymentState> {
        self.orders.get(&order_id).map(|r| r.state)
    }

    pub fn is_processing(&self, order_id: Uuid) -> bool {
        self.state_of(order_id) == Some(PaymentState::Processing)
    }

    pub fn set_state(&self, order_id: Uuid, state: PaymentState, total_amount: Decimal) {
        let processing_since = match state {
            PaymentState::Processing => Some(Instant::now()),
            _ => None,
        };
        self.orders.insert(
            order_id,
            ProgressRecord {
                state,
                total_amount,
                processing_since,
                updated_at: crate::now_micros(),
            },
        );
        tracing::debug!(target: "PAYMENT", "Order {} payment state -> {}", order_id, state.as_str());
    }

    /// Deterministic progress snapshot: the current step is derived from the
    /// elapsed time since processing started and the per-step delays.
    pub fn progress(&self, order_id: Uuid) -> Option<ProgressSnapshot> {
        let record = self.orders.get(&order_id)?;
        let current_step = match (record.state, record.processing_since) {
            (PaymentState::Processing, Some(since)) => {
                let elapsed_ms = since.elapsed().as_millis() as u64;
                let mut step = 0;
                let mut boundary = 0;
                for delay in STEP_DELAYS_MS.iter().take(PAYMENT_STEPS.len() - 1) {
                    boundary += delay;
                    if elapsed_ms >= boundary {
                        step += 1;
                    }
                }
                step
            }
            (PaymentState::Completed, _) => PAYMENT_STEPS.len() - 1,
            _ => 0,
        };
        Some(ProgressSnapshot {
            status: record.state,
            current_step,
            total_amount: record.total_amount,
        })
    }

    pub fn processing_count(&self) -> usize {
        self.orders
            .iter()
            .filter(|r| r.state == PaymentState::Processing)
            .count()
    }

    /// Drop records older than the given age; called from the session sweeper
    pub fn sweep(&self, max_age: chrono::Duration) {
        let cutoff = Utc::now() - max_age;
        self.orders.retain(|_, r| r.updated_at > cutoff);
    }
}
