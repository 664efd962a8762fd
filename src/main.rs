//! Voice Kiosk server entry point
//!
//! Startup order matters: config, logging, menu catalog, collaborators,
//! shared state, background sweepers, then the gateway serve loop.
//!
//! ```text
//! ┌──────────┐    ┌──────────┐    ┌───────────┐    ┌──────────┐
//! │  Config  │───▶│   Menu   │───▶│ Pipeline  │───▶│ Gateway  │
//! │  (env)   │    │  (JSON)  │    │ (workers) │    │  (HTTP)  │
//! └──────────┘    └──────────┘    └───────────┘    └──────────┘
//! ```

use std::sync::{Arc, RwLock};

use voice_kiosk::config::AppConfig;
use voice_kiosk::dialogue::{DialogueEngine, PaymentTracker};
use voice_kiosk::error::ErrorClassifier;
use voice_kiosk::gateway::{self, state::AppState};
use voice_kiosk::llm::OpenAiClient;
use voice_kiosk::menu::{MenuCatalog, MenuReloader, menu_watcher};
use voice_kiosk::monitoring::{AlertManager, CommunicationMonitor};
use voice_kiosk::pipeline::RequestPipeline;
use voice_kiosk::response::ResponseBuilder;
use voice_kiosk::security::{FileValidator, RateLimiter};
use voice_kiosk::session::{SessionRegistry, session_sweeper};
use voice_kiosk::speech::WhisperTranscriber;
use voice_kiosk::tts::{TtsCache, TtsManager, tts_cache_sweeper};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Arc::new(AppConfig::from_env());
    let _log_guard = voice_kiosk::logging::init_logging(&config.log);

    tracing::info!(target: "MAIN", "Voice Kiosk server starting");

    // Menu catalog + hot reload
    let catalog = Arc::new(RwLock::new(MenuCatalog::load_from_file(&config.menu.path)?));
    let menu_reloader = Arc::new(MenuReloader::new(config.menu.path.clone()));

    // External collaborators
    let reasoner = Arc::new(OpenAiClient::new(&config.reasoner)?);
    let transcriber = Arc::new(WhisperTranscriber::new(&config.reasoner)?);
    let tts = Arc::new(TtsManager::new(&config.reasoner, &config.tts)?);
    let tts_cache = Arc::new(TtsCache::new(&config.tts));

    // Core services
    let payments = Arc::new(PaymentTracker::new());
    let sessions = Arc::new(SessionRegistry::new(catalog.clone(), config.session.clone()));
    let monitor = Arc::new(CommunicationMonitor::new(&config.monitoring));
    let alerts = Arc::new(AlertManager::new(&config.monitoring));
    let classifier = Arc::new(ErrorClassifier::new());
    let rate_limiter = Arc::new(RateLimiter::new(config.security.rate_limit.clone()));
    let validator = Arc::new(FileValidator::new(config.security.clone()));

    let dialogue = Arc::new(DialogueEngine::new(
        catalog.clone(),
        reasoner.clone(),
        payments.clone(),
    ));
    let responses = Arc::new(ResponseBuilder::new(
        tts.clone(),
        tts_cache.clone(),
        catalog.clone(),
    ));
    let pipeline = Arc::new(RequestPipeline::new(
        transcriber,
        reasoner,
        dialogue,
        responses,
        sessions.clone(),
        monitor.clone(),
        classifier.clone(),
        validator.clone(),
        catalog.clone(),
        config.pipeline.clone(),
    ));

    // Background sweepers
    tokio::spawn(menu_watcher(
        menu_reloader,
        catalog.clone(),
        config.menu.reload_interval,
    ));
    tokio::spawn(session_sweeper(sessions.clone(), payments.clone()));
    tokio::spawn(tts_cache_sweeper(tts_cache.clone(), tts.clone()));

    let state = Arc::new(AppState {
        config,
        catalog,
        sessions,
        pipeline,
        tts,
        tts_cache,
        payments,
        monitor,
        alerts,
        classifier,
        rate_limiter,
        validator,
        started_at: voice_kiosk::now_micros(),
    });

    gateway::run_gateway(state).await
}
