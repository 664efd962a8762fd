//! Runtime configuration
//!
//! Every knob is environment-overridable with a production-shaped default,
//! grouped per subsystem. `AppConfig::from_env()` is the single entry point;
//! nothing else in the crate reads the environment.

use std::path::PathBuf;
use std::time::Duration;

fn env_str(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(default)
}

fn env_list(key: &str, default: &[&str]) -> Vec<String> {
    std::env::var(key)
        .map(|v| {
            v.split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        })
        .unwrap_or_else(|_| default.iter().map(|s| s.to_string()).collect())
}

/// HTTP server binding
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn from_env() -> Self {
        Self {
            host: env_str("SERVER_HOST", "0.0.0.0"),
            port: env_parse("SERVER_PORT", 8000),
        }
    }
}

/// Rate limiting knobs (sliding window per client IP)
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub max_requests: usize,
    pub time_window: Duration,
    pub block_duration: Duration,
}

impl RateLimitConfig {
    pub fn from_env() -> Self {
        Self {
            max_requests: env_parse("RATE_LIMIT_REQUESTS", 100),
            time_window: Duration::from_secs(env_parse("RATE_LIMIT_WINDOW", 3600)),
            block_duration: Duration::from_secs(env_parse("RATE_LIMIT_BLOCK", 3600)),
        }
    }
}

/// Upload validation and transport security
#[derive(Debug, Clone)]
pub struct SecurityConfig {
    /// Maximum accepted upload size in bytes
    pub max_file_size: u64,
    pub allowed_mime_types: Vec<String>,
    pub allowed_extensions: Vec<String>,
    pub force_https: bool,
    pub trusted_proxies: Vec<String>,
    pub rate_limit: RateLimitConfig,
}

impl SecurityConfig {
    pub fn from_env() -> Self {
        Self {
            max_file_size: env_parse::<u64>("MAX_FILE_SIZE_MB", 10) * 1024 * 1024,
            allowed_mime_types: env_list("ALLOWED_MIME_TYPES", &["audio/wav", "audio/x-wav"]),
            allowed_extensions: env_list("ALLOWED_FILE_EXTENSIONS", &[".wav"]),
            force_https: env_bool("FORCE_HTTPS", false),
            trusted_proxies: env_list("TRUSTED_PROXIES", &[]),
            rate_limit: RateLimitConfig::from_env(),
        }
    }
}

/// Worker pool / queue / deadline for the request pipeline
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub max_workers: usize,
    pub queue_size: usize,
    pub request_timeout: Duration,
    /// Directory for request-scoped upload temp files
    pub upload_dir: PathBuf,
}

impl PipelineConfig {
    pub fn from_env() -> Self {
        Self {
            max_workers: env_parse("PIPELINE_WORKERS", 10),
            queue_size: env_parse("PIPELINE_QUEUE_SIZE", 100),
            request_timeout: Duration::from_secs(env_parse("REQUEST_TIMEOUT", 30)),
            upload_dir: PathBuf::from(env_str(
                "UPLOAD_TEMP_DIR",
                &std::env::temp_dir()
                    .join("voice_kiosk_uploads")
                    .to_string_lossy(),
            )),
        }
    }
}

/// Session registry knobs
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub idle_timeout: Duration,
    pub sweep_interval: Duration,
    /// Conversation history cap per session
    pub max_history: usize,
}

impl SessionConfig {
    pub fn from_env() -> Self {
        Self {
            idle_timeout: Duration::from_secs(env_parse("SESSION_TIMEOUT", 1800)),
            sweep_interval: Duration::from_secs(env_parse("SESSION_SWEEP_INTERVAL", 300)),
            max_history: env_parse("SESSION_MAX_HISTORY", 20),
        }
    }
}

/// TTS provider selection and synthesized-clip cache policy
#[derive(Debug, Clone)]
pub struct TtsConfig {
    pub provider: String,
    pub model: String,
    pub voice: String,
    pub speed: f64,
    pub format: String,
    pub output_dir: PathBuf,
    pub cache_ttl: Duration,
    pub cache_max_entries: usize,
    pub cache_memory_limit_mb: u64,
    pub cache_cleanup_interval: Duration,
}

impl TtsConfig {
    pub fn from_env() -> Self {
        Self {
            provider: env_str("TTS_PROVIDER", "openai"),
            model: env_str("TTS_MODEL", "tts-1"),
            voice: env_str("TTS_VOICE", "alloy"),
            speed: env_parse("TTS_SPEED", 1.0),
            format: env_str("TTS_FORMAT", "wav"),
            output_dir: PathBuf::from(env_str(
                "TTS_OUTPUT_DIR",
                &std::env::temp_dir()
                    .join("voice_kiosk_tts")
                    .to_string_lossy(),
            )),
            cache_ttl: Duration::from_secs(env_parse("TTS_CACHE_TTL", 3600)),
            cache_max_entries: env_parse("TTS_CACHE_MAX_ENTRIES", 100),
            cache_memory_limit_mb: env_parse("TTS_CACHE_MEMORY_LIMIT_MB", 500),
            cache_cleanup_interval: Duration::from_secs(env_parse(
                "TTS_CACHE_CLEANUP_INTERVAL",
                300,
            )),
        }
    }
}

/// External reasoner endpoints (speech-to-text, intent extraction, replies)
#[derive(Debug, Clone)]
pub struct ReasonerConfig {
    pub api_base: String,
    pub api_key: String,
    pub chat_model: String,
    pub transcribe_model: String,
    pub timeout: Duration,
}

impl ReasonerConfig {
    pub fn from_env() -> Self {
        Self {
            api_base: env_str("OPENAI_API_BASE", "https://api.openai.com/v1"),
            api_key: env_str("OPENAI_API_KEY", ""),
            chat_model: env_str("OPENAI_MODEL", "gpt-4o"),
            transcribe_model: env_str("WHISPER_MODEL", "whisper-1"),
            timeout: Duration::from_secs(env_parse("API_TIMEOUT", 60)),
        }
    }
}

/// Monitoring rings and alert thresholds
#[derive(Debug, Clone)]
pub struct MonitoringConfig {
    pub max_history: usize,
    pub error_threshold: usize,
    pub response_time_threshold: f64,
    pub alert_cooldown: Duration,
}

impl MonitoringConfig {
    pub fn from_env() -> Self {
        Self {
            max_history: env_parse("MONITORING_MAX_HISTORY", 1000),
            error_threshold: env_parse("ALERT_ERROR_THRESHOLD", 10),
            response_time_threshold: env_parse("ALERT_RESPONSE_TIME_THRESHOLD", 5.0),
            alert_cooldown: Duration::from_secs(env_parse("ALERT_COOLDOWN", 300)),
        }
    }
}

/// Logging output knobs consumed by [`crate::logging`]
#[derive(Debug, Clone)]
pub struct LogConfig {
    pub log_dir: String,
    pub log_file: String,
    /// "never" | "daily" | "hourly"
    pub rotation: String,
    pub log_level: String,
    pub use_json: bool,
}

impl LogConfig {
    pub fn from_env() -> Self {
        Self {
            log_dir: env_str("LOG_DIR", "logs"),
            log_file: env_str("LOG_FILE", "voice_kiosk.log"),
            rotation: env_str("LOG_ROTATION", "daily"),
            log_level: env_str("LOG_LEVEL", "info"),
            use_json: env_bool("LOG_JSON", false),
        }
    }
}

/// Menu catalog source
#[derive(Debug, Clone)]
pub struct MenuSourceConfig {
    pub path: PathBuf,
    pub reload_interval: Duration,
}

impl MenuSourceConfig {
    pub fn from_env() -> Self {
        Self {
            path: PathBuf::from(env_str("MENU_CONFIG_PATH", "config/menu.json")),
            reload_interval: Duration::from_secs(env_parse("MENU_RELOAD_INTERVAL", 10)),
        }
    }
}

/// Complete application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub security: SecurityConfig,
    pub pipeline: PipelineConfig,
    pub session: SessionConfig,
    pub tts: TtsConfig,
    pub reasoner: ReasonerConfig,
    pub monitoring: MonitoringConfig,
    pub log: LogConfig,
    pub menu: MenuSourceConfig,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            server: ServerConfig::from_env(),
            security: SecurityConfig::from_env(),
            pipeline: PipelineConfig::from_env(),
            session: SessionConfig::from_env(),
            tts: TtsConfig::from_env(),
            reasoner: ReasonerConfig::from_env(),
            monitoring: MonitoringConfig::from_env(),
            log: LogConfig::from_env(),
            menu: MenuSourceConfig::from_env(),
        }
    }
}
