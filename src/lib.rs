//! Voice Kiosk - server-side core of a voice-driven ordering kiosk
//!
//! A client uploads a recorded utterance; the core transcribes it, interprets
//! the intent against a menu-aware dialogue policy, mutates the per-session
//! order, synthesizes a spoken reply and returns a structured response that
//! drives the remote UI.
//!
//! # Modules
//!
//! - [`config`] - Environment-driven runtime configuration
//! - [`menu`] - Menu catalog with search index and hot reload
//! - [`order`] - Order aggregate and per-session operations
//! - [`session`] - Session registry with idle reclamation
//! - [`dialogue`] - Intent model and the dialogue policy engine
//! - [`speech`] / [`llm`] / [`tts`] - External collaborator interfaces
//! - [`response`] - Wire response assembly (TTS cache, UI actions)
//! - [`pipeline`] - Bounded worker pool running the request stages
//! - [`security`] - Rate limiting, upload validation, security headers
//! - [`monitoring`] - Rolling request metrics and alerting
//! - [`error`] - Error taxonomy and boundary classification
//! - [`gateway`] - HTTP endpoints and wire schema

pub mod audio;
pub mod config;
pub mod dialogue;
pub mod error;
pub mod gateway;
pub mod llm;
pub mod logging;
pub mod menu;
pub mod money;
pub mod monitoring;
pub mod order;
pub mod pipeline;
pub mod response;
pub mod security;
pub mod session;
pub mod speech;
pub mod tts;

// Convenient re-exports at crate root
pub use config::AppConfig;
pub use dialogue::{DialogueEngine, Intent, IntentKind, PaymentState, PaymentTracker};
pub use error::{ErrorClassifier, ErrorKind, KioskError, Severity};
pub use gateway::state::AppState;
pub use menu::{MenuCatalog, SharedCatalog};
pub use order::{Order, OrderManager, OrderResult, OrderStatus};
pub use pipeline::RequestPipeline;
pub use response::ResponseBuilder;
pub use session::{SessionRegistry, SessionState};
pub use tts::{TtsCache, TtsManager};

use chrono::{DateTime, Timelike, Utc};

/// Now, truncated to microsecond precision — the wire timestamp resolution.
/// Truncating at the source keeps serialize/deserialize round trips exact.
pub fn now_micros() -> DateTime<Utc> {
    let now = Utc::now();
    now.with_nanosecond(now.nanosecond() / 1000 * 1000)
        .unwrap_or(now)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_now_micros_truncates_to_microseconds() {
        let t = now_micros();
        assert_eq!(t.nanosecond() % 1000, 0);
    }

    #[test]
    fn test_now_micros_round_trips_through_rfc3339() {
        let t = now_micros();
        let text = serde_json::to_string(&t).unwrap();
        let back: DateTime<Utc> = serde_json::from_str(&text).unwrap();
        assert_eq!(t, back);
    }
}
