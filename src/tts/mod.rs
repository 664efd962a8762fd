//! Speech synthesis: provider abstraction, hot-swappable manager, clip cache
//!
//! Synthesized clips are addressed by an opaque `file_id` with a one-hour
//! expiry, backing `GET /api/voice/tts/{file_id}`. Providers can be switched
//! at runtime without dropping already-synthesized files.

pub mod cache;
pub mod openai;

use std::path::{Path, PathBuf};
use std::sync::RwLock;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;

pub use cache::{TtsCache, tts_cache_sweeper};
pub use openai::OpenAiTts;

use crate::config::{ReasonerConfig, TtsConfig};
use crate::error::KioskError;

/// Maximum text length accepted for one synthesis call
const MAX_TEXT_LENGTH: usize = 4000;

/// Synthesized clips are served for this long before expiry
const FILE_TTL: Duration = Duration::from_secs(3600);

#[async_trait]
pub trait TtsProvider: Send + Sync {
    fn name(&self) -> &'static str;

    /// Synthesize `text` into an audio file at `output_path`
    async fn synthesize(&self, text: &str, output_path: &Path) -> Result<(), KioskError>;

    fn supported_voices(&self) -> Vec<&'static str>;
    fn supported_formats(&self) -> Vec<&'static str>;

    fn estimate_cost(&self, _text: &str) -> Option<f64> {
        None
    }

    fn info(&self) -> serde_json::Value {
        serde_json::json!({ "provider": self.name() })
    }
}

struct FileRecord {
    path: PathBuf,
    created_at: Instant,
}

/// Owns the active provider and the file-id registry of synthesized clips
pub struct TtsManager {
    provider: RwLock<std::sync::Arc<dyn TtsProvider>>,
    reasoner_config: ReasonerConfig,
    tts_config: RwLock<TtsConfig>,
    output_dir: PathBuf,
    files: DashMap<String, FileRecord>,
}

impl TtsManager {
    pub const AVAILABLE_PROVIDERS: [&'static str; 1] = ["openai"];

    pub fn new(reasoner: &ReasonerConfig, config: &TtsConfig) -> Result<Self, KioskError> {
        std::fs::create_dir_all(&config.output_dir)?;
        let provider = Self::build_provider(&config.provider, reasoner, config)?;
        Ok(Self {
            provider: RwLock::new(provider),
            reasoner_config: reasoner.clone(),
            tts_config: RwLock::new(config.clone()),
            output_dir: config.output_dir.clone(),
            files: DashMap::new(),
        })
    }

    fn build_provider(
        name: &str,
        reasoner: &ReasonerConfig,
        config: &TtsConfig,
    ) -> Result<std::sync::Arc<dyn TtsProvider>, KioskError> {
        match name {
            "openai" => Ok(std::sync::Arc::new(OpenAiTts::new(reasoner, config)?)),
            other => Err(KioskError::Tts(format!(
                "unsupported TTS provider: {} (available: {})",
                other,
                Self::AVAILABLE_PROVIDERS.join(", ")
            ))),
        }
    }

    /// Voice-config fingerprint used as part of the cache key
    pub fn voice_fingerprint(&self) -> Vec<(String, String)> {
        let config = self.tts_config.read().expect("tts config lock poisoned");
        vec![
            ("model".to_string(), config.model.clone()),
            ("provider".to_string(), config.provider.clone()),
            ("speed".to_string(), format!("{}", config.speed)),
            ("voice".to_string(), config.voice.clone()),
        ]
    }

    /// Synthesize a clip and register it under a fresh file id
    pub async fn synthesize(&self, text: &str) -> Result<String, KioskError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(KioskError::Tts("empty text".into()));
        }
        if text.chars().count() > MAX_TEXT_LENGTH {
            return Err(KioskError::Tts(format!(
                "text too long: {} chars (max {})",
                text.chars().count(),
                MAX_TEXT_LENGTH
            )));
        }

        let file_id = uuid::Uuid::new_v4().to_string();
        let format = {
            let config = self.tts_config.read().expect("tts config lock poisoned");
            config.format.clone()
        };
        let path = self.output_dir.join(format!("tts_{}.{}", file_id, format));

        let provider = self.provider.read().expect("tts provider lock poisoned").clone();
        provider.synthesize(text, &path).await?;

        self.register_file(&file_id, path);
        Ok(file_id)
    }

    /// Register an externally-produced clip (cache hits, placeholders)
    pub fn register_file(&self, file_id: &str, path: PathBuf) {
        self.files.insert(
            file_id.to_string(),
            FileRecord {
                path,
                created_at: Instant::now(),
            },
        );
    }

    /// Resolve a file id to its backing path; expired or vanished clips are
    /// forgotten and deleted.
    pub fn file_path(&self, file_id: &str) -> Option<PathBuf> {
        let record = self.files.get(file_id)?;
        if record.created_at.elapsed() > FILE_TTL {
            let path = record.path.clone();
            drop(record);
            self.files.remove(file_id);
            std::fs::remove_file(path).ok();
            return None;
        }
        if !record.path.exists() {
            let id = file_id.to_string();
            drop(record);
            self.files.remove(&id);
            return None;
        }
        Some(record.path.clone())
    }

    /// Swap the active provider; optional config overrides model/voice/speed.
    pub fn switch_provider(
        &self,
        provider_name: &str,
        overrides: Option<&serde_json::Value>,
    ) -> Result<(), KioskError> {
        let mut config = self
            .tts_config
            .read()
            .expect("tts config lock poisoned")
            .clone();
        config.provider = provider_name.to_string();
        if let Some(overrides) = overrides {
            if let Some(model) = overrides["model"].as_str() {
                config.model = model.to_string();
            }
            if let Some(voice) = overrides["voice"].as_str() {
                config.voice = voice.to_string();
            }
            if let Some(speed) = overrides["speed"].as_f64() {
                config.speed = speed;
            }
            if let Some(format) = overrides["format"].as_str() {
                config.format = format.to_string();
            }
        }

        let provider = Self::build_provider(provider_name, &self.reasoner_config, &config)?;
        *self.provider.write().expect("tts provider lock poisoned") = provider;
        *self.tts_config.write().expect("tts config lock poisoned") = config;
        tracing::info!(target: "TTS", "Provider switched to {}", provider_name);
        Ok(())
    }

    pub fn provider_info(&self) -> serde_json::Value {
        self.provider
            .read()
            .expect("tts provider lock poisoned")
            .info()
    }

    pub fn available_providers(&self) -> Vec<&'static str> {
        Self::AVAILABLE_PROVIDERS.to_vec()
    }

    pub fn estimate_cost(&self, text: &str) -> Option<f64> {
        self.provider
            .read()
            .expect("tts provider lock poisoned")
            .estimate_cost(text)
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Drop expired file records and their clips
    pub fn cleanup_expired_files(&self) -> usize {
        let expired: Vec<(String, PathBuf)> = self
            .files
            .iter()
            .filter(|r| r.created_at.elapsed() > FILE_TTL)
            .map(|r| (r.key().clone(), r.path.clone()))
            .collect();
        for (id, path) in &expired {
            self.files.remove(id);
            std::fs::remove_file(path).ok();
        }
        expired.len()
    }
}
