//! Error taxonomy and boundary classification
//!
//! Failures from external collaborators cross into the core as typed
//! [`KioskError`] variants; the [`ErrorClassifier`] maps each one into the
//! closed wire taxonomy with a severity, a localized user message, fixed
//! recovery actions and guidance UI actions. The substring table is a
//! fallback for untyped internal errors only.

use std::collections::VecDeque;
use std::time::Instant;

use chrono::{DateTime, Utc};
use rustc_hash::FxHashMap;
use serde::Serialize;
use std::sync::Mutex;
use thiserror::Error;

use crate::gateway::types::{ErrorInfo, UIAction};

// ============================================================================
// Subsystem Errors
// ============================================================================

/// Menu catalog errors (load, validation, lookup)
#[derive(Error, Debug)]
pub enum MenuError {
    #[error("Menu source {path} unreadable: {reason}")]
    Source { path: String, reason: String },

    #[error("Menu has no items")]
    EmptyCatalog,

    #[error("Menu has no categories")]
    NoCategories,

    #[error("Item '{item}' references undeclared category '{category}'")]
    UndeclaredCategory { item: String, category: String },

    #[error("Menu item not found: {name}")]
    ItemNotFound { name: String },

    #[error("Menu item unavailable: {name}")]
    ItemUnavailable { name: String },

    #[error("Invalid quantity: {quantity}")]
    InvalidQuantity { quantity: u32 },

    #[error("Invalid option: {key}={value}")]
    InvalidOption { key: String, value: String },
}

/// Any failure crossing the core boundary during a request
#[derive(Error, Debug)]
pub enum KioskError {
    #[error("request deadline exceeded")]
    Timeout,

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("speech recognition failed: {0}")]
    Transcription(String),

    #[error("intent extraction failed: {0}")]
    IntentExtraction(String),

    #[error("audio processing failed: {0}")]
    Audio(String),

    #[error("TTS synthesis failed: {0}")]
    Tts(String),

    #[error("order processing failed: {0}")]
    Order(String),

    #[error("payment failed: {0}")]
    Payment(String),

    #[error(transparent)]
    Menu(#[from] MenuError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("startup failure: {0}")]
    Startup(String),

    #[error("{0}")]
    Internal(String),
}

// ============================================================================
// Closed Wire Taxonomy
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NetworkError,
    TimeoutError,
    ValidationError,
    SpeechRecognitionError,
    IntentRecognitionError,
    OrderProcessingError,
    ServerError,
    AudioProcessingError,
    PaymentError,
    UnknownError,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NetworkError => "network_error",
            ErrorKind::TimeoutError => "timeout_error",
            ErrorKind::ValidationError => "validation_error",
            ErrorKind::SpeechRecognitionError => "speech_recognition_error",
            ErrorKind::IntentRecognitionError => "intent_recognition_error",
            ErrorKind::OrderProcessingError => "order_processing_error",
            ErrorKind::ServerError => "server_error",
            ErrorKind::AudioProcessingError => "audio_processing_error",
            ErrorKind::PaymentError => "payment_error",
            ErrorKind::UnknownError => "unknown_error",
        }
    }

    /// Fixed user-facing message template per kind
    pub fn user_message(&self) -> &'static str {
        match self {
            ErrorKind::NetworkError => "네트워크 연결에 문제가 있습니다. 연결 상태를 확인해주세요.",
            ErrorKind::TimeoutError => "요청 처리 시간이 초과되었습니다. 잠시 후 다시 시도해주세요.",
            ErrorKind::ValidationError => "입력하신 정보에 문제가 있습니다. 다시 확인해주세요.",
            ErrorKind::SpeechRecognitionError => "음성 인식에 실패했습니다. 더 명확하게 말씀해주세요.",
            ErrorKind::IntentRecognitionError => "명령을 이해하지 못했습니다. 다른 방식으로 말씀해주세요.",
            ErrorKind::OrderProcessingError => "주문 처리 중 문제가 발생했습니다. 다시 시도해주세요.",
            ErrorKind::ServerError => "서버에 일시적인 문제가 발생했습니다. 잠시 후 다시 시도해주세요.",
            ErrorKind::AudioProcessingError => "음성 파일 처리 중 문제가 발생했습니다. 다시 녹음해주세요.",
            ErrorKind::PaymentError => "결제 처리 중 문제가 발생했습니다. 결제 정보를 확인해주세요.",
            ErrorKind::UnknownError => "예상치 못한 문제가 발생했습니다. 잠시 후 다시 시도해주세요.",
        }
    }

    /// Fixed recovery-action list per kind
    pub fn recovery_actions(&self) -> Vec<String> {
        let actions: &[&str] = match self {
            ErrorKind::NetworkError => &[
                "네트워크 연결을 확인해주세요",
                "잠시 후 다시 시도해주세요",
                "서버 상태를 확인해주세요",
            ],
            ErrorKind::TimeoutError => &[
                "요청 시간이 초과되었습니다",
                "음성 파일 크기를 줄여보세요",
                "네트워크 상태를 확인하고 다시 시도해주세요",
            ],
            ErrorKind::ValidationError => &[
                "입력 데이터를 확인해주세요",
                "올바른 파일 형식인지 확인해주세요",
                "파일 크기 제한을 확인해주세요",
            ],
            ErrorKind::SpeechRecognitionError => &[
                "음성을 더 명확하게 말씀해주세요",
                "주변 소음을 줄여주세요",
                "다시 녹음해서 시도해주세요",
            ],
            ErrorKind::IntentRecognitionError => &[
                "명령을 더 구체적으로 말씀해주세요",
                "다른 표현으로 다시 시도해주세요",
                "메뉴에서 직접 선택해주세요",
            ],
            ErrorKind::OrderProcessingError => &[
                "주문 내용을 다시 확인해주세요",
                "메뉴 선택을 다시 해주세요",
                "처음부터 다시 주문해주세요",
            ],
            ErrorKind::PaymentError => &[
                "결제 정보를 확인해주세요",
                "다른 결제 방법을 시도해주세요",
                "카드를 다시 삽입해주세요",
            ],
            ErrorKind::ServerError => &[
                "서버에 일시적인 문제가 발생했습니다",
                "잠시 후 다시 시도해주세요",
                "문제가 지속되면 관리자에게 문의해주세요",
            ],
            ErrorKind::AudioProcessingError => &[
                "음성 파일을 다시 녹음해주세요",
                "WAV 형식인지 확인해주세요",
            ],
            ErrorKind::UnknownError => &[
                "잠시 후 다시 시도해주세요",
                "문제가 지속되면 관리자에게 문의해주세요",
            ],
        };
        actions.iter().map(|s| s.to_string()).collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

// ============================================================================
// Classification
// ============================================================================

/// Classifier output: everything the response layer needs to render a
/// well-formed error response
#[derive(Debug, Clone)]
pub struct ClassifiedError {
    pub kind: ErrorKind,
    pub severity: Severity,
    pub user_message: String,
    pub recovery_actions: Vec<String>,
    pub ui_actions: Vec<UIAction>,
}

impl ClassifiedError {
    pub fn error_info(&self) -> ErrorInfo {
        ErrorInfo {
            error_code: self.kind.as_str().to_string(),
            error_message: self.user_message.clone(),
            recovery_actions: self.recovery_actions.clone(),
            details: None,
            timestamp: crate::now_micros(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
struct KindStats {
    count: u64,
    first_occurrence: DateTime<Utc>,
    last_occurrence: DateTime<Utc>,
}

/// Window used to detect the same kind recurring frequently
const FREQUENT_WINDOW_SECS: u64 = 600;
const FREQUENT_THRESHOLD: usize = 5;

#[derive(Default)]
struct ClassifierState {
    stats: FxHashMap<&'static str, KindStats>,
    recent: FxHashMap<ErrorKind, VecDeque<Instant>>,
}

/// Process-wide error classifier, constructed at startup and injected
pub struct ErrorClassifier {
    state: Mutex<ClassifierState>,
}

impl Default for ErrorClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl ErrorClassifier {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ClassifierState::default()),
        }
    }

    /// Map a boundary error into the closed taxonomy, update the tracking
    /// counters and emit guidance UI actions.
    pub fn classify(&self, err: &KioskError) -> ClassifiedError {
        let (kind, mut severity) = kind_and_severity(err);

        let escalated = self.track(kind);
        if escalated && severity < Severity::High {
            severity = Severity::High;
        }

        let mut user_message = kind.user_message().to_string();
        match severity {
            Severity::Critical => {
                user_message = format!("심각한 오류: {} 관리자에게 즉시 문의해주세요.", user_message);
            }
            Severity::High => {
                user_message = format!("중요한 오류: {}", user_message);
            }
            _ => {}
        }

        let mut recovery_actions = kind.recovery_actions();
        if escalated {
            recovery_actions.push("문제가 반복되면 직원을 호출해주세요".to_string());
        }

        // Stack traces stay in the log, never on the wire
        match severity {
            Severity::High | Severity::Critical => {
                tracing::error!(
                    target: "ERROR",
                    kind = kind.as_str(),
                    severity = severity.as_str(),
                    backtrace = %std::backtrace::Backtrace::capture(),
                    "{}",
                    err
                );
            }
            Severity::Medium => {
                tracing::warn!(target: "ERROR", kind = kind.as_str(), "{}", err);
            }
            Severity::Low => {
                tracing::info!(target: "ERROR", kind = kind.as_str(), "{}", err);
            }
        }

        let ui_actions = guidance_actions(kind, &user_message, &recovery_actions, severity);

        ClassifiedError {
            kind,
            severity,
            user_message,
            recovery_actions,
            ui_actions,
        }
    }

    /// Record an occurrence; returns true when the kind has recurred
    /// frequently enough to escalate.
    fn track(&self, kind: ErrorKind) -> bool {
        let mut state = self.state.lock().expect("classifier lock poisoned");
        let now = Utc::now();

        let entry = state
            .stats
            .entry(kind.as_str())
            .or_insert_with(|| KindStats {
                count: 0,
                first_occurrence: now,
                last_occurrence: now,
            });
        entry.count += 1;
        entry.last_occurrence = now;

        let recent = state.recent.entry(kind).or_default();
        let cutoff = Instant::now();
        recent.push_back(cutoff);
        while let Some(front) = recent.front() {
            if cutoff.duration_since(*front).as_secs() > FREQUENT_WINDOW_SECS {
                recent.pop_front();
            } else {
                break;
            }
        }
        recent.len() >= FREQUENT_THRESHOLD
    }

    pub fn stats(&self) -> serde_json::Value {
        let state = self.state.lock().expect("classifier lock poisoned");
        let total: u64 = state.stats.values().map(|s| s.count).sum();
        serde_json::json!({
            "error_stats": state.stats,
            "total_errors": total,
            "generated_at": crate::now_micros(),
        })
    }

    pub fn clear(&self) {
        let mut state = self.state.lock().expect("classifier lock poisoned");
        state.stats.clear();
        state.recent.clear();
    }
}

fn kind_and_severity(err: &KioskError) -> (ErrorKind, Severity) {
    match err {
        KioskError::Timeout => (ErrorKind::TimeoutError, Severity::Medium),
        KioskError::Network(e) => {
            if e.is_timeout() {
                (ErrorKind::TimeoutError, Severity::Medium)
            } else {
                (ErrorKind::NetworkError, Severity::High)
            }
        }
        KioskError::Validation(_) => (ErrorKind::ValidationError, Severity::Medium),
        KioskError::Transcription(_) => (ErrorKind::SpeechRecognitionError, Severity::High),
        KioskError::IntentExtraction(_) => (ErrorKind::IntentRecognitionError, Severity::High),
        KioskError::Audio(_) => (ErrorKind::AudioProcessingError, Severity::Medium),
        KioskError::Tts(_) => (ErrorKind::AudioProcessingError, Severity::Medium),
        KioskError::Order(_) => (ErrorKind::OrderProcessingError, Severity::Medium),
        KioskError::Payment(_) => (ErrorKind::PaymentError, Severity::Medium),
        KioskError::Menu(MenuError::ItemNotFound { .. })
        | KioskError::Menu(MenuError::ItemUnavailable { .. })
        | KioskError::Menu(MenuError::InvalidQuantity { .. })
        | KioskError::Menu(MenuError::InvalidOption { .. }) => {
            (ErrorKind::OrderProcessingError, Severity::Medium)
        }
        KioskError::Menu(_) => (ErrorKind::ServerError, Severity::High),
        KioskError::Io(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            (ErrorKind::ServerError, Severity::High)
        }
        KioskError::Io(e) if e.kind() == std::io::ErrorKind::TimedOut => {
            (ErrorKind::TimeoutError, Severity::Medium)
        }
        KioskError::Io(_) => (ErrorKind::ValidationError, Severity::Medium),
        KioskError::Startup(_) => (ErrorKind::ServerError, Severity::Critical),
        // Untyped internal errors fall back to substring classification
        KioskError::Internal(msg) => classify_by_message(msg),
    }
}

/// Substring fallback for errors that reached the boundary untyped. A typed
/// adapter should supersede any entry observed here in practice.
fn classify_by_message(message: &str) -> (ErrorKind, Severity) {
    let lower = message.to_lowercase();
    let contains_any = |keys: &[&str]| keys.iter().any(|k| lower.contains(k));

    if contains_any(&["timeout", "deadline"]) {
        (ErrorKind::TimeoutError, Severity::Medium)
    } else if contains_any(&["connection", "network"]) {
        (ErrorKind::NetworkError, Severity::High)
    } else if contains_any(&["whisper", "speech", "audio", "recognition"]) {
        (ErrorKind::SpeechRecognitionError, Severity::High)
    } else if contains_any(&["llm", "gpt", "intent", "openai"]) {
        (ErrorKind::IntentRecognitionError, Severity::High)
    } else if contains_any(&["order", "menu", "payment"]) {
        (ErrorKind::OrderProcessingError, Severity::Medium)
    } else {
        (ErrorKind::UnknownError, Severity::Medium)
    }
}

fn guidance_actions(
    kind: ErrorKind,
    user_message: &str,
    recovery_actions: &[String],
    severity: Severity,
) -> Vec<UIAction> {
    let mut actions = vec![UIAction {
        action_type: "show_error".to_string(),
        data: serde_json::json!({
            "error_code": kind.as_str(),
            "error_message": user_message,
            "recovery_actions": recovery_actions,
            "severity": severity.as_str(),
        }),
        priority: 1,
        requires_user_input: false,
        timeout_seconds: None,
    }];

    match kind {
        ErrorKind::SpeechRecognitionError | ErrorKind::AudioProcessingError => {
            actions.push(UIAction {
                action_type: "show_voice_guide".to_string(),
                data: serde_json::json!({
                    "message": "음성 인식에 문제가 있습니다",
                    "guide_text": "마이크에 가까이서 천천히 말씀해주세요",
                }),
                priority: 0,
                requires_user_input: false,
                timeout_seconds: None,
            });
        }
        ErrorKind::OrderProcessingError => {
            actions.push(UIAction {
                action_type: "show_menu".to_string(),
                data: serde_json::json!({
                    "message": "메뉴에서 직접 선택해주세요",
                    "show_categories": true,
                }),
                priority: 0,
                requires_user_input: true,
                timeout_seconds: None,
            });
        }
        ErrorKind::NetworkError => {
            actions.push(UIAction {
                action_type: "show_retry_button".to_string(),
                data: serde_json::json!({
                    "message": "네트워크 연결을 확인하고 다시 시도해주세요",
                    "retry_delay": 3,
                }),
                priority: 0,
                requires_user_input: false,
                timeout_seconds: None,
            });
        }
        _ => {}
    }

    actions
}
