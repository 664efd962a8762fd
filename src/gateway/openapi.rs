//! OpenAPI / Swagger UI documentation
//!
//! Served at `/docs`; the raw document at `/api-docs/openapi.json`.

use utoipa::OpenApi;

use super::handlers;
use super::types::{ErrorInfo, OrderData, OrderItemData, PaymentData, ServerResponse, UIAction};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Voice Kiosk API",
        description = "Server-side core of a voice-driven ordering kiosk",
        version = env!("CARGO_PKG_VERSION"),
    ),
    paths(
        handlers::system::health,
        handlers::system::system_status,
        handlers::system::error_stats,
        handlers::system::clear_errors,
        handlers::voice::process_voice,
        handlers::voice::get_tts_file,
        handlers::tts::get_providers,
        handlers::tts::switch_provider,
        handlers::security::security_stats,
        handlers::security::clear_rate_limit,
        handlers::security::security_config,
        handlers::optimization::optimization_stats,
        handlers::optimization::clear_cache,
        handlers::payment::payment_progress,
        handlers::monitoring::monitoring_stats,
        handlers::monitoring::monitoring_alerts,
        handlers::monitoring::monitoring_export,
        handlers::monitoring::monitoring_performance,
    ),
    components(schemas(
        ServerResponse,
        OrderData,
        OrderItemData,
        UIAction,
        ErrorInfo,
        PaymentData,
    )),
    tags(
        (name = "Voice", description = "Voice processing entry points"),
        (name = "TTS", description = "Speech synthesis providers"),
        (name = "Payment", description = "Payment progress polling"),
        (name = "Security", description = "Rate limiting and validation"),
        (name = "Monitoring", description = "Metrics and alerts"),
        (name = "Optimization", description = "Caches and pools"),
        (name = "System", description = "Liveness and status"),
    )
)]
pub struct ApiDoc;
