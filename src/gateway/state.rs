//! Gateway application state (shared)
//!
//! Every process-wide collaborator is constructed once at startup and
//! injected here; handlers and middleware never reach for globals.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::config::AppConfig;
use crate::dialogue::PaymentTracker;
use crate::error::ErrorClassifier;
use crate::menu::SharedCatalog;
use crate::monitoring::{AlertManager, CommunicationMonitor};
use crate::pipeline::RequestPipeline;
use crate::security::{FileValidator, RateLimiter};
use crate::session::SessionRegistry;
use crate::tts::{TtsCache, TtsManager};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    /// Menu catalog (hot-reloadable read path; the watcher swaps it)
    pub catalog: SharedCatalog,
    pub sessions: Arc<SessionRegistry>,
    pub pipeline: Arc<RequestPipeline>,
    pub tts: Arc<TtsManager>,
    pub tts_cache: Arc<TtsCache>,
    pub payments: Arc<PaymentTracker>,
    pub monitor: Arc<CommunicationMonitor>,
    pub alerts: Arc<AlertManager>,
    pub classifier: Arc<ErrorClassifier>,
    pub rate_limiter: Arc<RateLimiter>,
    pub validator: Arc<FileValidator>,
    pub started_at: DateTime<Utc>,
}
