//! HTTP-level tests: the full router with scripted collaborators behind it.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;

use voice_kiosk::config::AppConfig;
use voice_kiosk::dialogue::{DialogueEngine, Intent, IntentPayload, PaymentTracker};
use voice_kiosk::error::{ErrorClassifier, KioskError};
use voice_kiosk::gateway::{build_router, state::AppState};
use voice_kiosk::llm::{ChatMessage, IntentExtractor, ReplyGenerator};
use voice_kiosk::menu::{MenuCatalog, MenuDocument};
use voice_kiosk::monitoring::{AlertManager, CommunicationMonitor};
use voice_kiosk::pipeline::RequestPipeline;
use voice_kiosk::response::ResponseBuilder;
use voice_kiosk::security::{FileValidator, RateLimiter};
use voice_kiosk::session::SessionRegistry;
use voice_kiosk::speech::{SpeechTranscriber, Transcript};
use voice_kiosk::tts::{TtsCache, TtsManager};

struct ScriptedTranscriber;

#[async_trait]
impl SpeechTranscriber for ScriptedTranscriber {
    async fn transcribe(&self, _audio_path: &Path) -> Result<Transcript, KioskError> {
        Ok(Transcript {
            text: "메뉴 보여줘".to_string(),
            language: Some("ko".to_string()),
        })
    }
}

struct ScriptedExtractor;

#[async_trait]
impl IntentExtractor for ScriptedExtractor {
    async fn extract(&self, text: &str, _menu_info: &str) -> Result<Intent, KioskError> {
        Ok(Intent::new(
            IntentPayload::Inquiry {
                text: text.to_string(),
            },
            0.9,
            text,
        ))
    }
}

struct ScriptedReplies;

#[async_trait]
impl ReplyGenerator for ScriptedReplies {
    async fn chat(&self, _messages: &[ChatMessage]) -> Result<String, KioskError> {
        Ok("네, 말씀하세요".to_string())
    }
}

const MENU_JSON: &str = r#"{
    "categories": ["버거"],
    "menu_items": {
        "빅맥": {"category": "버거", "price": 6500,
                  "available_options": ["단품", "세트"]}
    },
    "set_pricing": {"세트": 2000}
}"#;

fn unique_dir(label: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("vk_http_{}_{}", label, uuid::Uuid::new_v4()));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

async fn spawn_server(rate_max: usize) -> (String, Arc<AppState>, PathBuf) {
    let mut config = AppConfig::from_env();
    config.security.rate_limit.max_requests = rate_max;
    config.security.rate_limit.time_window = Duration::from_secs(3600);
    config.security.rate_limit.block_duration = Duration::from_secs(3600);
    config.pipeline.upload_dir = unique_dir("uploads");
    config.tts.output_dir = unique_dir("tts");
    // Unroutable reasoner endpoint: TTS synthesis fails fast and the
    // response builder falls back to the silent placeholder
    config.reasoner.api_base = "http://127.0.0.1:1/v1".to_string();
    config.reasoner.api_key = "test-key".to_string();
    config.reasoner.timeout = Duration::from_millis(200);
    let config = Arc::new(config);

    let catalog = Arc::new(RwLock::new(
        MenuCatalog::new(MenuDocument::from_json(MENU_JSON).unwrap()).unwrap(),
    ));
    let payments = Arc::new(PaymentTracker::new());
    let sessions = Arc::new(SessionRegistry::new(catalog.clone(), config.session.clone()));
    let monitor = Arc::new(CommunicationMonitor::new(&config.monitoring));
    let classifier = Arc::new(ErrorClassifier::new());
    let validator = Arc::new(FileValidator::new(config.security.clone()));
    let tts = Arc::new(TtsManager::new(&config.reasoner, &config.tts).unwrap());
    let tts_cache = Arc::new(TtsCache::new(&config.tts));

    let dialogue = Arc::new(DialogueEngine::new(
        catalog.clone(),
        Arc::new(ScriptedReplies),
        payments.clone(),
    ));
    let responses = Arc::new(ResponseBuilder::new(
        tts.clone(),
        tts_cache.clone(),
        catalog.clone(),
    ));
    let pipeline = Arc::new(RequestPipeline::new(
        Arc::new(ScriptedTranscriber),
        Arc::new(ScriptedExtractor),
        dialogue,
        responses,
        sessions.clone(),
        monitor.clone(),
        classifier.clone(),
        validator.clone(),
        catalog.clone(),
        config.pipeline.clone(),
    ));

    let upload_dir = config.pipeline.upload_dir.clone();
    let state = Arc::new(AppState {
        config: config.clone(),
        catalog,
        sessions,
        pipeline,
        tts,
        tts_cache,
        payments,
        monitor,
        alerts: Arc::new(AlertManager::new(&config.monitoring)),
        classifier,
        rate_limiter: Arc::new(RateLimiter::new(config.security.rate_limit.clone())),
        validator,
        started_at: voice_kiosk::now_micros(),
    });

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let router = build_router(state.clone());
    tokio::spawn(async move {
        axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .unwrap();
    });

    (format!("http://{}", addr), state, upload_dir)
}

fn wav_bytes() -> Vec<u8> {
    let path = std::env::temp_dir().join(format!("vk_http_clip_{}.wav", uuid::Uuid::new_v4()));
    voice_kiosk::audio::write_silent_wav(&path, "주문 테스트").unwrap();
    let bytes = std::fs::read(&path).unwrap();
    std::fs::remove_file(path).ok();
    bytes
}

fn audio_form(bytes: Vec<u8>, filename: &str) -> reqwest::multipart::Form {
    reqwest::multipart::Form::new().part(
        "audio_file",
        reqwest::multipart::Part::bytes(bytes)
            .file_name(filename.to_string())
            .mime_str("audio/wav")
            .unwrap(),
    )
}

#[tokio::test]
async fn test_process_voice_end_to_end() {
    let (base, _state, upload_dir) = spawn_server(100).await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{}/api/voice/process", base))
        .multipart(audio_form(wav_bytes(), "voice.wav"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["success"], true);
    // "메뉴 보여줘" routes to the formatted menu listing
    assert!(body["message"].as_str().unwrap().contains("빅맥"));
    assert!(body["session_id"].is_string());
    assert!(
        body["ui_actions"]
            .as_array()
            .unwrap()
            .iter()
            .any(|a| a["action_type"] == "show_menu")
    );

    // The TTS fallback still yields a fetchable clip
    let tts_url = body["tts_audio_url"].as_str().unwrap();
    let clip = client
        .get(format!("{}{}", base, tts_url))
        .send()
        .await
        .unwrap();
    assert_eq!(clip.status(), 200);
    assert_eq!(clip.headers()["content-type"], "audio/wav");

    // Resource cleanup: no upload temp files survive the request
    let leftovers: Vec<_> = std::fs::read_dir(&upload_dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().starts_with("upload_"))
        .collect();
    assert!(leftovers.is_empty(), "temp uploads left behind: {:?}", leftovers);
}

#[tokio::test]
async fn test_session_is_reused_across_requests() {
    let (base, state, _upload_dir) = spawn_server(100).await;
    let client = reqwest::Client::new();

    let first: serde_json::Value = client
        .post(format!("{}/api/voice/process", base))
        .multipart(audio_form(wav_bytes(), "voice.wav"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let session_id = first["session_id"].as_str().unwrap().to_string();

    let second: serde_json::Value = client
        .post(format!(
            "{}/api/voice/process?session_id={}",
            base, session_id
        ))
        .multipart(audio_form(wav_bytes(), "voice.wav"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(second["session_id"].as_str().unwrap(), session_id);
    assert_eq!(state.sessions.active_count(), 1);
}

#[tokio::test]
async fn test_rate_limit_boundary_returns_429_with_retry_after() {
    let (base, _state, _upload_dir) = spawn_server(2).await;
    let client = reqwest::Client::new();

    for _ in 0..2 {
        let ok = client.get(format!("{}/health", base)).send().await.unwrap();
        assert_eq!(ok.status(), 200);
    }

    let denied = client.get(format!("{}/health", base)).send().await.unwrap();
    assert_eq!(denied.status(), 429);
    assert_eq!(denied.headers()["Retry-After"], "3600");
    // Security headers ride along even on rejections
    assert_eq!(denied.headers()["X-Frame-Options"], "DENY");

    let body: serde_json::Value = denied.json().await.unwrap();
    assert_eq!(body["error"], "RATE_LIMIT_EXCEEDED");
}

#[tokio::test]
async fn test_renamed_text_file_is_rejected_with_content_error() {
    let (base, _state, _upload_dir) = spawn_server(100).await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{}/api/voice/process", base))
        .multipart(audio_form(b"just some text pretending".to_vec(), "voice.wav"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);

    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["error"], "FILE_VALIDATION_FAILED");
    assert!(body["validation_errors"]["content"].is_string());
}

#[tokio::test]
async fn test_security_headers_on_every_response() {
    let (base, _state, _upload_dir) = spawn_server(100).await;
    let client = reqwest::Client::new();

    for path in ["/health", "/api/system/status", "/api/tts/providers", "/nope"] {
        let response = client.get(format!("{}{}", base, path)).send().await.unwrap();
        let headers = response.headers();
        assert_eq!(headers["X-Content-Type-Options"], "nosniff", "{}", path);
        assert_eq!(headers["X-Frame-Options"], "DENY", "{}", path);
        assert_eq!(headers["X-XSS-Protection"], "1; mode=block", "{}", path);
        assert_eq!(
            headers["Strict-Transport-Security"],
            "max-age=31536000; includeSubDomains",
            "{}",
            path
        );
        assert_eq!(
            headers["Content-Security-Policy"],
            "default-src 'self'",
            "{}",
            path
        );
        assert_eq!(
            headers["Referrer-Policy"],
            "strict-origin-when-cross-origin",
            "{}",
            path
        );
        assert!(headers.contains_key("X-RateLimit-Limit"), "{}", path);
        assert!(headers.contains_key("X-RateLimit-Remaining"), "{}", path);
        assert!(headers.contains_key("X-RateLimit-Reset"), "{}", path);
    }
}

#[tokio::test]
async fn test_payment_progress_for_unknown_order() {
    let (base, _state, _upload_dir) = spawn_server(100).await;
    let client = reqwest::Client::new();

    let response: serde_json::Value = client
        .get(format!(
            "{}/api/payment/progress/{}",
            base,
            uuid::Uuid::new_v4()
        ))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(response["status"], "not_found");
}

#[tokio::test]
async fn test_payment_progress_reports_processing_steps() {
    let (base, state, _upload_dir) = spawn_server(100).await;
    let client = reqwest::Client::new();

    let order_id = uuid::Uuid::new_v4();
    state.payments.set_state(
        order_id,
        voice_kiosk::dialogue::PaymentState::Processing,
        rust_decimal::Decimal::from(8500),
    );

    let response: serde_json::Value = client
        .get(format!("{}/api/payment/progress/{}", base, order_id))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(response["status"], "processing");
    assert_eq!(response["progress"]["steps"].as_array().unwrap().len(), 4);
    assert_eq!(
        response["progress"]["step_delays"],
        serde_json::json!([1000, 1000, 1000, 0])
    );
}

#[tokio::test]
async fn test_health_and_status_endpoints() {
    let (base, _state, _upload_dir) = spawn_server(100).await;
    let client = reqwest::Client::new();

    let health: serde_json::Value = client
        .get(format!("{}/health", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["status"], "healthy");
    assert_eq!(health["api_initialized"], true);
    assert_eq!(health["tts_provider"]["provider"], "openai");

    let status: serde_json::Value = client
        .get(format!("{}/api/system/status", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(status["server_status"], "running");
    assert!(status["pipeline_status"]["max_workers"].is_number());
    assert!(status["security_stats"]["rate_limit_config"]["max_requests"].is_number());
}

#[tokio::test]
async fn test_monitoring_records_completed_requests() {
    let (base, _state, _upload_dir) = spawn_server(100).await;
    let client = reqwest::Client::new();

    client
        .post(format!("{}/api/voice/process", base))
        .multipart(audio_form(wav_bytes(), "voice.wav"))
        .send()
        .await
        .unwrap();

    let stats: serde_json::Value = client
        .get(format!("{}/api/monitoring/stats", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(stats["current_metrics"]["total_requests"].as_u64().unwrap() >= 1);
    assert_eq!(stats["current_metrics"]["error_count"], 0);
}

#[tokio::test]
async fn test_tts_switch_rejects_unknown_provider() {
    let (base, _state, _upload_dir) = spawn_server(100).await;
    let client = reqwest::Client::new();

    let response: serde_json::Value = client
        .post(format!("{}/api/tts/switch", base))
        .json(&serde_json::json!({"provider": "robotron"}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(response["success"], false);
    assert_eq!(response["provider_info"]["provider"], "openai");
}
