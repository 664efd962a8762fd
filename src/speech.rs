//! Acoustic front-end interface
//!
//! The core never decodes audio itself; it hands the request-scoped upload
//! to the speech collaborator and receives a transcript back.

use std::path::Path;

use async_trait::async_trait;

use crate::config::ReasonerConfig;
use crate::error::KioskError;

/// Transcription result from the acoustic front-end
#[derive(Debug, Clone)]
pub struct Transcript {
    pub text: String,
    pub language: Option<String>,
}

#[async_trait]
pub trait SpeechTranscriber: Send + Sync {
    async fn transcribe(&self, audio_path: &Path) -> Result<Transcript, KioskError>;
}

/// Whisper-compatible HTTP transcriber
pub struct WhisperTranscriber {
    http: reqwest::Client,
    api_base: String,
    api_key: String,
    model: String,
}

impl WhisperTranscriber {
    pub fn new(config: &ReasonerConfig) -> Result<Self, KioskError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(KioskError::Network)?;
        Ok(Self {
            http,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            model: config.transcribe_model.clone(),
        })
    }
}

#[async_trait]
impl SpeechTranscriber for WhisperTranscriber {
    async fn transcribe(&self, audio_path: &Path) -> Result<Transcript, KioskError> {
        let bytes = tokio::fs::read(audio_path).await?;
        let file_name = audio_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "upload.wav".to_string());

        let part = reqwest::multipart::Part::bytes(bytes)
            .file_name(file_name)
            .mime_str("audio/wav")
            .map_err(KioskError::Network)?;
        let form = reqwest::multipart::Form::new()
            .part("file", part)
            .text("model", self.model.clone())
            .text("language", "ko");

        let response = self
            .http
            .post(format!("{}/audio/transcriptions", self.api_base))
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(KioskError::Network)?;

        if !response.status().is_success() {
            let status = response.status();
            let detail = response.text().await.unwrap_or_default();
            return Err(KioskError::Transcription(format!(
                "speech recognizer returned {}: {}",
                status, detail
            )));
        }

        let body: serde_json::Value = response.json().await.map_err(KioskError::Network)?;
        let text = body["text"]
            .as_str()
            .ok_or_else(|| KioskError::Transcription("transcript missing text field".into()))?
            .trim()
            .to_string();

        if text.is_empty() {
            return Err(KioskError::Transcription("empty transcript".into()));
        }

        Ok(Transcript {
            text,
            language: body["language"].as_str().map(|s| s.to_string()),
        })
    }
}
