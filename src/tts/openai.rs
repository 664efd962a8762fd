//! OpenAI-compatible speech synthesis provider

use std::path::Path;

use async_trait::async_trait;
use serde_json::json;

use super::TtsProvider;
use crate::config::{ReasonerConfig, TtsConfig};
use crate::error::KioskError;

/// Cost per 1k input characters in USD (tts-1 list price)
const COST_PER_1K_CHARS: f64 = 0.015;

pub struct OpenAiTts {
    http: reqwest::Client,
    api_base: String,
    api_key: String,
    pub model: String,
    pub voice: String,
    pub speed: f64,
    pub format: String,
}

impl OpenAiTts {
    pub fn new(reasoner: &ReasonerConfig, tts: &TtsConfig) -> Result<Self, KioskError> {
        let http = reqwest::Client::builder()
            .timeout(reasoner.timeout)
            .build()
            .map_err(KioskError::Network)?;
        Ok(Self {
            http,
            api_base: reasoner.api_base.trim_end_matches('/').to_string(),
            api_key: reasoner.api_key.clone(),
            model: tts.model.clone(),
            voice: tts.voice.clone(),
            speed: tts.speed,
            format: tts.format.clone(),
        })
    }
}

#[async_trait]
impl TtsProvider for OpenAiTts {
    fn name(&self) -> &'static str {
        "openai"
    }

    async fn synthesize(&self, text: &str, output_path: &Path) -> Result<(), KioskError> {
        let response = self
            .http
            .post(format!("{}/audio/speech", self.api_base))
            .bearer_auth(&self.api_key)
            .json(&json!({
                "model": self.model,
                "voice": self.voice,
                "speed": self.speed,
                "response_format": self.format,
                "input": text,
            }))
            .send()
            .await
            .map_err(KioskError::Network)?;

        if !response.status().is_success() {
            let status = response.status();
            let detail = response.text().await.unwrap_or_default();
            return Err(KioskError::Tts(format!(
                "TTS provider returned {}: {}",
                status, detail
            )));
        }

        let bytes = response.bytes().await.map_err(KioskError::Network)?;
        tokio::fs::write(output_path, &bytes).await?;
        tracing::debug!(
            target: "TTS",
            "Synthesized {} chars -> {} ({} bytes)",
            text.chars().count(),
            output_path.display(),
            bytes.len()
        );
        Ok(())
    }

    fn supported_voices(&self) -> Vec<&'static str> {
        vec!["alloy", "echo", "fable", "onyx", "nova", "shimmer"]
    }

    fn supported_formats(&self) -> Vec<&'static str> {
        vec!["mp3", "opus", "aac", "flac", "wav", "pcm"]
    }

    fn estimate_cost(&self, text: &str) -> Option<f64> {
        Some(text.chars().count() as f64 / 1000.0 * COST_PER_1K_CHARS)
    }

    fn info(&self) -> serde_json::Value {
        json!({
            "provider": self.name(),
            "model": self.model,
            "voice": self.voice,
            "speed": self.speed,
            "format": self.format,
            "supported_voices": self.supported_voices(),
            "supported_formats": self.supported_formats(),
        })
    }
}
