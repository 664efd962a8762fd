//! Security gate: rate limiting, upload validation, security headers
//!
//! The rate limiter keeps a sliding timestamp window per client IP; a client
//! that exceeds the window lands on a block list for the configured
//! duration. Upload validation runs twice per request: against the multipart
//! metadata before the file is persisted, and against the persisted bytes
//! (WAV header probe) after.

use std::collections::VecDeque;
use std::path::Path;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use dashmap::DashMap;
use rustc_hash::FxHashMap;

use crate::config::{RateLimitConfig, SecurityConfig};

/// Headers attached to every HTTP response
pub const SECURITY_HEADERS: [(&str, &str); 6] = [
    ("X-Content-Type-Options", "nosniff"),
    ("X-Frame-Options", "DENY"),
    ("X-XSS-Protection", "1; mode=block"),
    (
        "Strict-Transport-Security",
        "max-age=31536000; includeSubDomains",
    ),
    ("Content-Security-Policy", "default-src 'self'"),
    ("Referrer-Policy", "strict-origin-when-cross-origin"),
];

/// Characters that must never appear in an uploaded filename
const DANGEROUS_SEQUENCES: [&str; 10] = ["..", "/", "\\", ":", "*", "?", "\"", "<", ">", "|"];

// ============================================================================
// Rate Limiter
// ============================================================================

/// Outcome of one admission check
#[derive(Debug, Clone)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub limit: usize,
    pub remaining: usize,
    /// Unix seconds at which the current window resets
    pub reset_at: u64,
    /// Seconds the client should wait before retrying, when denied
    pub retry_after: Option<u64>,
}

pub struct RateLimiter {
    config: RateLimitConfig,
    requests: DashMap<String, VecDeque<Instant>>,
    blocked: DashMap<String, Instant>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            requests: DashMap::new(),
            blocked: DashMap::new(),
        }
    }

    fn reset_epoch(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0)
            + self.config.time_window.as_secs()
    }

    fn is_blocked(&self, client_ip: &str) -> bool {
        if let Some(blocked_at) = self.blocked.get(client_ip) {
            if blocked_at.elapsed() < self.config.block_duration {
                return true;
            }
            drop(blocked_at);
            self.blocked.remove(client_ip);
        }
        false
    }

    /// Record a request start and decide admission.
    pub fn check(&self, client_ip: &str) -> RateLimitDecision {
        let denied = |retry_after: u64| RateLimitDecision {
            allowed: false,
            limit: self.config.max_requests,
            remaining: 0,
            reset_at: self.reset_epoch(),
            retry_after: Some(retry_after),
        };

        if self.is_blocked(client_ip) {
            return denied(self.config.block_duration.as_secs());
        }

        let now = Instant::now();
        let mut window = self.requests.entry(client_ip.to_string()).or_default();

        while let Some(front) = window.front() {
            if now.duration_since(*front) > self.config.time_window {
                window.pop_front();
            } else {
                break;
            }
        }

        if window.len() >= self.config.max_requests {
            drop(window);
            self.blocked.insert(client_ip.to_string(), now);
            tracing::warn!(target: "SECURITY", "Rate limit exceeded, blocking {}", client_ip);
            return denied(self.config.block_duration.as_secs());
        }

        window.push_back(now);
        let remaining = self.config.max_requests - window.len();
        RateLimitDecision {
            allowed: true,
            limit: self.config.max_requests,
            remaining,
            reset_at: self.reset_epoch(),
            retry_after: None,
        }
    }

    /// Remaining budget without recording a request
    pub fn remaining(&self, client_ip: &str) -> usize {
        let used = self
            .requests
            .get(client_ip)
            .map(|w| {
                w.iter()
                    .filter(|t| t.elapsed() <= self.config.time_window)
                    .count()
            })
            .unwrap_or(0);
        self.config.max_requests.saturating_sub(used)
    }

    pub fn blocked_count(&self) -> usize {
        self.blocked
            .iter()
            .filter(|b| b.elapsed() < self.config.block_duration)
            .count()
    }

    pub fn active_clients(&self) -> usize {
        self.requests.len()
    }

    pub fn clear(&self) {
        self.requests.clear();
        self.blocked.clear();
        tracing::info!(target: "SECURITY", "Rate limit data cleared");
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }
}

// ============================================================================
// Client IP extraction
// ============================================================================

/// Resolve the client IP: forwarded headers are honored only when the TCP
/// peer is a trusted proxy; otherwise the peer address wins.
pub fn client_ip(
    forwarded_for: Option<&str>,
    real_ip: Option<&str>,
    peer_ip: &str,
    trusted_proxies: &[String],
) -> String {
    let peer_trusted = trusted_proxies.iter().any(|p| p == peer_ip);
    if peer_trusted {
        if let Some(forwarded) = forwarded_for {
            if let Some(first_hop) = forwarded.split(',').next() {
                let first_hop = first_hop.trim();
                if !first_hop.is_empty() {
                    return first_hop.to_string();
                }
            }
        }
        if let Some(real) = real_ip {
            let real = real.trim();
            if !real.is_empty() {
                return real.to_string();
            }
        }
    }
    peer_ip.to_string()
}

// ============================================================================
// File validation
// ============================================================================

pub struct FileValidator {
    config: SecurityConfig,
}

impl FileValidator {
    pub fn new(config: SecurityConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SecurityConfig {
        &self.config
    }

    fn filename_is_safe(&self, filename: &str) -> bool {
        !filename.is_empty()
            && filename.len() <= 255
            && !DANGEROUS_SEQUENCES.iter().any(|s| filename.contains(s))
    }

    fn extension_allowed(&self, filename: &str) -> bool {
        let lower = filename.to_lowercase();
        self.config
            .allowed_extensions
            .iter()
            .any(|ext| lower.ends_with(ext.as_str()))
    }

    /// Validate an upload. `persisted` is the saved file for the content
    /// probe; pass `None` for the pre-persist pass. Returns field -> message
    /// on failure, matching the `validation_errors` wire shape.
    pub fn validate_upload(
        &self,
        filename: &str,
        size: Option<u64>,
        persisted: Option<&Path>,
    ) -> Result<(), FxHashMap<&'static str, String>> {
        let mut errors: FxHashMap<&'static str, String> = FxHashMap::default();

        if !self.filename_is_safe(filename) {
            errors.insert("filename", "안전하지 않은 파일명입니다".to_string());
        }

        if !self.extension_allowed(filename) {
            errors.insert(
                "extension",
                format!(
                    "허용되지 않는 파일 형식입니다. 허용 형식: {}",
                    self.config.allowed_extensions.join(", ")
                ),
            );
        }

        match size {
            Some(0) => {
                errors.insert("size", "빈 파일은 업로드할 수 없습니다".to_string());
            }
            Some(size) if size > self.config.max_file_size => {
                errors.insert(
                    "size",
                    format!(
                        "파일 크기가 {:.1}MB를 초과합니다",
                        self.config.max_file_size as f64 / (1024.0 * 1024.0)
                    ),
                );
            }
            _ => {}
        }

        if let Some(path) = persisted {
            match crate::audio::has_wav_header(path) {
                Ok(true) => {}
                Ok(false) => {
                    errors.insert(
                        "content",
                        format!(
                            "허용되지 않는 파일 타입입니다. 허용 타입: {}",
                            self.config.allowed_mime_types.join(", ")
                        ),
                    );
                }
                Err(e) => {
                    errors.insert("content", format!("파일 내용을 확인할 수 없습니다: {}", e));
                }
            }
        }

        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }
}
