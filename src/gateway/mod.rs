//! HTTP wire layer
//!
//! Router construction, the security middleware (HTTPS enforcement, rate
//! limiting, security + rate-limit headers on every response) and the serve
//! loop. All state flows in through [`state::AppState`].

pub mod handlers;
pub mod openapi;
pub mod state;
pub mod types;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    extract::{ConnectInfo, DefaultBodyLimit, State},
    http::{HeaderValue, Request, StatusCode},
    middleware::{Next, from_fn_with_state},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use tokio::net::TcpListener;

use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::security::{SECURITY_HEADERS, client_ip};
use state::AppState;
use types::ApiError;

/// Client IP resolved by the middleware, available to handlers as an
/// extension
#[derive(Debug, Clone)]
pub struct ClientIp(pub String);

/// Security middleware: HTTPS enforcement, per-client rate limiting, and the
/// security/rate-limit headers every response must carry.
async fn security_middleware(
    State(state): State<Arc<AppState>>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    // HTTPS enforcement (scheme arrives via the proxy's forwarded header)
    if state.config.security.force_https {
        let https = request
            .headers()
            .get("x-forwarded-proto")
            .and_then(|v| v.to_str().ok())
            .map(|proto| proto.eq_ignore_ascii_case("https"))
            .unwrap_or(false);
        if !https {
            let response = ApiError::new(
                StatusCode::UPGRADE_REQUIRED,
                "HTTPS_REQUIRED",
                "HTTPS 연결이 필요합니다",
            )
            .with("upgrade_to", serde_json::json!("https"));
            return finalize(state, None, response.into_response());
        }
    }

    // Resolve the client IP (forwarded headers only from trusted proxies)
    let peer_ip = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string());
    let forwarded_for = header_str(&request, "x-forwarded-for");
    let real_ip = header_str(&request, "x-real-ip");
    let ip = client_ip(
        forwarded_for.as_deref(),
        real_ip.as_deref(),
        &peer_ip,
        &state.config.security.trusted_proxies,
    );

    let decision = state.rate_limiter.check(&ip);
    if !decision.allowed {
        let retry_after = decision.retry_after.unwrap_or(0);
        let mut response = ApiError::new(
            StatusCode::TOO_MANY_REQUESTS,
            "RATE_LIMIT_EXCEEDED",
            "요청 한도를 초과했습니다",
        )
        .with("retry_after", serde_json::json!(retry_after))
        .with("client_ip", serde_json::json!(ip))
        .into_response();
        if let Ok(value) = HeaderValue::from_str(&retry_after.to_string()) {
            response.headers_mut().insert("Retry-After", value);
        }
        return finalize(state, Some(&ip), response);
    }

    request.extensions_mut().insert(ClientIp(ip.clone()));
    let response = next.run(request).await;
    finalize(state, Some(&ip), response)
}

fn header_str(request: &Request<Body>, name: &str) -> Option<String> {
    request
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
}

/// Attach the security headers and the rate-limit trio to a response
fn finalize(state: Arc<AppState>, ip: Option<&str>, mut response: Response) -> Response {
    let headers = response.headers_mut();
    for (name, value) in SECURITY_HEADERS {
        headers.insert(name, HeaderValue::from_static(value));
    }

    let limit = state.rate_limiter.config().max_requests;
    let remaining = ip.map(|ip| state.rate_limiter.remaining(ip)).unwrap_or(limit);
    let reset = chrono::Utc::now().timestamp() as u64
        + state.rate_limiter.config().time_window.as_secs();
    for (name, value) in [
        ("X-RateLimit-Limit", limit.to_string()),
        ("X-RateLimit-Remaining", remaining.to_string()),
        ("X-RateLimit-Reset", reset.to_string()),
    ] {
        if let Ok(value) = HeaderValue::from_str(&value) {
            headers.insert(name, value);
        }
    }
    response
}

/// Build the full router with middleware and Swagger UI
pub fn build_router(state: Arc<AppState>) -> Router {
    let body_limit = state.config.security.max_file_size as usize + 64 * 1024;

    Router::new()
        .route("/", get(handlers::system::root))
        .route("/health", get(handlers::system::health))
        .route("/api/voice/process", post(handlers::voice::process_voice))
        .route("/api/voice/tts/{file_id}", get(handlers::voice::get_tts_file))
        .route("/api/tts/providers", get(handlers::tts::get_providers))
        .route("/api/tts/switch", post(handlers::tts::switch_provider))
        .route("/api/errors/stats", get(handlers::system::error_stats))
        .route("/api/errors/clear", post(handlers::system::clear_errors))
        .route("/api/system/status", get(handlers::system::system_status))
        .route("/api/security/stats", get(handlers::security::security_stats))
        .route(
            "/api/security/clear-rate-limit",
            post(handlers::security::clear_rate_limit),
        )
        .route("/api/security/config", get(handlers::security::security_config))
        .route(
            "/api/optimization/stats",
            get(handlers::optimization::optimization_stats),
        )
        .route(
            "/api/optimization/clear-cache",
            post(handlers::optimization::clear_cache),
        )
        .route(
            "/api/payment/progress/{order_id}",
            get(handlers::payment::payment_progress),
        )
        .route("/api/monitoring/stats", get(handlers::monitoring::monitoring_stats))
        .route(
            "/api/monitoring/alerts",
            get(handlers::monitoring::monitoring_alerts),
        )
        .route(
            "/api/monitoring/export",
            post(handlers::monitoring::monitoring_export),
        )
        .route(
            "/api/monitoring/performance",
            get(handlers::monitoring::monitoring_performance),
        )
        .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", openapi::ApiDoc::openapi()))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(from_fn_with_state(state.clone(), security_middleware))
        .with_state(state)
}

/// Bind and serve until the process exits
pub async fn run_gateway(state: Arc<AppState>) -> anyhow::Result<()> {
    let addr = format!("{}:{}", state.config.server.host, state.config.server.port);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!(target: "GATEWAY", "Listening on {}", addr);

    let app = build_router(state);
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;
    Ok(())
}
