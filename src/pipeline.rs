//! Request pipeline
//!
//! A bounded worker pool drains voice requests: admission (queue bound, then
//! a worker slot bounded by the request deadline), upload validation before
//! and after persisting the audio, then the transcribe -> intent -> dialogue
//! -> response stages under one deadline. The temp upload lives in a guard
//! that deletes the file on every exit path. Same-session turns serialize on
//! the session mutex; distinct sessions run on any free worker.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Instant;

use rustc_hash::FxHashMap;
use tokio::sync::Semaphore;
use uuid::Uuid;

use crate::config::PipelineConfig;
use crate::dialogue::DialogueEngine;
use crate::error::{ErrorClassifier, KioskError};
use crate::gateway::types::ServerResponse;
use crate::llm::IntentExtractor;
use crate::menu::SharedCatalog;
use crate::monitoring::CommunicationMonitor;
use crate::response::ResponseBuilder;
use crate::security::FileValidator;
use crate::session::SessionRegistry;
use crate::speech::SpeechTranscriber;

/// Request-scoped temp file; the backing file is removed when the guard
/// drops, on success and error paths alike.
pub struct TempUpload {
    path: PathBuf,
}

impl TempUpload {
    pub fn persist(dir: &Path, bytes: &[u8]) -> std::io::Result<Self> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(format!("upload_{}.wav", Uuid::new_v4()));
        std::fs::write(&path, bytes)?;
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TempUpload {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(target: "PIPELINE", "Temp upload cleanup failed {}: {}", self.path.display(), e);
            }
        }
    }
}

/// Terminal outcome of one pipeline run; the gateway maps it onto HTTP
pub enum PipelineOutcome {
    /// 200 with the envelope (success may still be false)
    Response(Box<ServerResponse>),
    /// 400 with `FILE_VALIDATION_FAILED` and the per-field errors
    ValidationFailed(FxHashMap<&'static str, String>),
    /// 503, the request queue is at capacity
    QueueFull,
}

pub struct RequestPipeline {
    transcriber: Arc<dyn SpeechTranscriber>,
    intents: Arc<dyn IntentExtractor>,
    dialogue: Arc<DialogueEngine>,
    responses: Arc<ResponseBuilder>,
    sessions: Arc<SessionRegistry>,
    monitor: Arc<CommunicationMonitor>,
    classifier: Arc<ErrorClassifier>,
    validator: Arc<FileValidator>,
    catalog: SharedCatalog,
    config: PipelineConfig,
    workers: Arc<Semaphore>,
    queued: AtomicUsize,
    total_requests: AtomicU64,
    completed_requests: AtomicU64,
    failed_requests: AtomicU64,
}

impl RequestPipeline {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        transcriber: Arc<dyn SpeechTranscriber>,
        intents: Arc<dyn IntentExtractor>,
        dialogue: Arc<DialogueEngine>,
        responses: Arc<ResponseBuilder>,
        sessions: Arc<SessionRegistry>,
        monitor: Arc<CommunicationMonitor>,
        classifier: Arc<ErrorClassifier>,
        validator: Arc<FileValidator>,
        catalog: SharedCatalog,
        config: PipelineConfig,
    ) -> Self {
        let workers = Arc::new(Semaphore::new(config.max_workers));
        Self {
            transcriber,
            intents,
            dialogue,
            responses,
            sessions,
            monitor,
            classifier,
            validator,
            catalog,
            config,
            workers,
            queued: AtomicUsize::new(0),
            total_requests: AtomicU64::new(0),
            completed_requests: AtomicU64::new(0),
            failed_requests: AtomicU64::new(0),
        }
    }

    /// Run one voice request end to end.
    pub async fn handle_request(
        &self,
        filename: &str,
        bytes: &[u8],
        session_id: Option<Uuid>,
        client_ip: &str,
    ) -> PipelineOutcome {
        let request_id = Uuid::new_v4().to_string();
        let deadline = tokio::time::Instant::now() + self.config.request_timeout;
        self.total_requests.fetch_add(1, Ordering::Relaxed);

        self.monitor
            .start_request(&request_id, client_ip, Some(bytes.len() as u64));
        tracing::info!(
            target: "PIPELINE",
            "Request {} from {}: {} ({} bytes)",
            request_id, client_ip, filename, bytes.len()
        );

        // Queue bound: reject instead of buffering unboundedly
        if self.queued.fetch_add(1, Ordering::AcqRel) >= self.config.queue_size {
            self.queued.fetch_sub(1, Ordering::AcqRel);
            self.failed_requests.fetch_add(1, Ordering::Relaxed);
            self.monitor
                .log_error(&request_id, "request queue full", "QUEUE_FULL");
            return PipelineOutcome::QueueFull;
        }

        let outcome = self
            .admitted_request(&request_id, filename, bytes, session_id, deadline)
            .await;
        self.queued.fetch_sub(1, Ordering::AcqRel);
        outcome
    }

    async fn admitted_request(
        &self,
        request_id: &str,
        filename: &str,
        bytes: &[u8],
        session_id: Option<Uuid>,
        deadline: tokio::time::Instant,
    ) -> PipelineOutcome {
        // Wait for a worker slot, bounded by the request deadline
        let permit = match tokio::time::timeout_at(deadline, self.workers.clone().acquire_owned())
            .await
        {
            Ok(Ok(permit)) => permit,
            Ok(Err(_)) => {
                // Semaphore closed only at shutdown
                self.failed_requests.fetch_add(1, Ordering::Relaxed);
                self.monitor
                    .log_error(request_id, "worker pool shut down", "SHUTDOWN");
                return PipelineOutcome::QueueFull;
            }
            Err(_) => {
                return self
                    .fail_at(request_id, session_id, KioskError::Timeout, 0.0)
                    .await;
            }
        };
        let _permit = permit;

        // Pre-persist validation against the multipart metadata
        if let Err(errors) = self
            .validator
            .validate_upload(filename, Some(bytes.len() as u64), None)
        {
            self.failed_requests.fetch_add(1, Ordering::Relaxed);
            self.monitor
                .log_error(request_id, "file validation failed", "VALIDATION");
            return PipelineOutcome::ValidationFailed(errors);
        }

        // Persist to a request-scoped temp file
        let upload = match TempUpload::persist(&self.config.upload_dir, bytes) {
            Ok(upload) => upload,
            Err(e) => {
                return self
                    .fail_at(request_id, session_id, KioskError::Io(e), 0.0)
                    .await;
            }
        };

        // Post-persist validation probes the actual bytes
        if let Err(errors) =
            self.validator
                .validate_upload(filename, Some(bytes.len() as u64), Some(upload.path()))
        {
            self.failed_requests.fetch_add(1, Ordering::Relaxed);
            self.monitor
                .log_error(request_id, "file content validation failed", "VALIDATION");
            return PipelineOutcome::ValidationFailed(errors);
        }

        self.monitor.update_processing_status(request_id);
        let processing_start = Instant::now();

        let staged = tokio::time::timeout_at(
            deadline,
            self.run_stages(request_id, &upload, session_id),
        )
        .await;

        // The upload is request-scoped; release it before the response is
        // serialized regardless of outcome
        drop(upload);

        let (session_id, result) = match staged {
            Ok(result) => result,
            Err(_) => (session_id, Err(KioskError::Timeout)),
        };

        let processing_time = processing_start.elapsed().as_secs_f64();
        match result {
            Ok(dialogue) => {
                let response = self
                    .responses
                    .build_from_dialogue(&dialogue, session_id, processing_time)
                    .await;
                let response_size = serde_json::to_vec(&response).map(|b| b.len() as u64).ok();
                self.monitor
                    .complete_request(request_id, processing_time, response_size);
                self.completed_requests.fetch_add(1, Ordering::Relaxed);
                PipelineOutcome::Response(Box::new(response))
            }
            Err(e) => {
                self.fail_at(request_id, session_id, e, processing_time).await
            }
        }
    }

    /// Transcribe, extract the intent, and run the dialogue turn under the
    /// session lock. Returns the (possibly newly created) session id.
    async fn run_stages(
        &self,
        request_id: &str,
        upload: &TempUpload,
        session_id: Option<Uuid>,
    ) -> (Option<Uuid>, Result<crate::dialogue::DialogueResponse, KioskError>) {
        let transcript = match self.transcriber.transcribe(upload.path()).await {
            Ok(t) => t,
            Err(e) => return (session_id, Err(e)),
        };
        tracing::info!(target: "PIPELINE", "Request {} transcript: {}", request_id, transcript.text);

        let menu_info = {
            let catalog = self.catalog.read().expect("catalog lock poisoned");
            catalog.format_for_reasoner()
        };
        let intent = match self.intents.extract(&transcript.text, &menu_info).await {
            Ok(intent) => intent,
            Err(e) => return (session_id, Err(e)),
        };
        tracing::info!(
            target: "PIPELINE",
            "Request {} intent: {} (confidence {:.2})",
            request_id, intent.kind().as_str(), intent.confidence
        );

        let session = self.sessions.get_or_create(session_id);
        let session_id = Some(session.id);

        // One in-flight dialogue turn per session
        let mut state = session.state.lock().await;
        let dialogue = self.dialogue.process(&intent, &mut state).await;
        drop(state);
        session.touch();

        (session_id, Ok(dialogue))
    }

    async fn fail_at(
        &self,
        request_id: &str,
        session_id: Option<Uuid>,
        error: KioskError,
        processing_time: f64,
    ) -> PipelineOutcome {
        self.failed_requests.fetch_add(1, Ordering::Relaxed);
        let classified = self.classifier.classify(&error);
        self.monitor
            .log_error(request_id, &error.to_string(), classified.kind.as_str());

        let response = self
            .responses
            .build_from_error(&classified, session_id, processing_time)
            .await;
        PipelineOutcome::Response(Box::new(response))
    }

    /// Live pool/queue counters for the status endpoints
    pub fn stats(&self) -> serde_json::Value {
        let total = self.total_requests.load(Ordering::Relaxed);
        let completed = self.completed_requests.load(Ordering::Relaxed);
        let failed = self.failed_requests.load(Ordering::Relaxed);
        let success_rate = if total > 0 {
            completed as f64 / total as f64 * 100.0
        } else {
            100.0
        };
        serde_json::json!({
            "max_workers": self.config.max_workers,
            "available_workers": self.workers.available_permits(),
            "queued": self.queued.load(Ordering::Relaxed),
            "queue_size": self.config.queue_size,
            "timeout_seconds": self.config.request_timeout.as_secs(),
            "total_requests": total,
            "completed_requests": completed,
            "failed_requests": failed,
            "success_rate": success_rate,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_temp_upload_deleted_on_drop() {
        let dir = std::env::temp_dir().join("voice_kiosk_pipeline_test");
        let upload = TempUpload::persist(&dir, b"RIFF....WAVEdata").unwrap();
        let path = upload.path().to_path_buf();
        assert!(path.exists());
        drop(upload);
        assert!(!path.exists());
    }
}
