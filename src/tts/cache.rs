//! Content-addressed cache of synthesized audio clips
//!
//! Key = md5 over `text` plus the sorted voice configuration, so the same
//! sentence under the same voice resolves to one backing file regardless of
//! how the config map was assembled. Three eviction policies compose: TTL,
//! entry-count bound (LRU) and a byte budget (evict LRU until usage drops to
//! 80% of the limit). Removing an entry also deletes its backing file,
//! best-effort. A background sweeper reaps TTL-expired entries.

use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use rustc_hash::FxHashMap;

use crate::config::TtsConfig;

#[derive(Debug, Clone)]
struct CacheEntry {
    path: PathBuf,
    size_bytes: u64,
    created_at: Instant,
    last_accessed: Instant,
    access_count: u64,
}

#[derive(Default)]
struct CacheInner {
    entries: FxHashMap<String, CacheEntry>,
    total_bytes: u64,
}

pub struct TtsCache {
    inner: Mutex<CacheInner>,
    ttl: Duration,
    max_entries: usize,
    memory_limit_bytes: u64,
    cleanup_interval: Duration,
}

impl TtsCache {
    pub fn new(config: &TtsConfig) -> Self {
        Self {
            inner: Mutex::new(CacheInner::default()),
            ttl: config.cache_ttl,
            max_entries: config.cache_max_entries,
            memory_limit_bytes: config.cache_memory_limit_mb * 1024 * 1024,
            cleanup_interval: config.cache_cleanup_interval,
        }
    }

    /// Digest over text and the sorted voice configuration
    pub fn cache_key(text: &str, voice_config: &[(String, String)]) -> String {
        let mut pairs: Vec<&(String, String)> = voice_config.iter().collect();
        pairs.sort();
        let serialized: Vec<String> = pairs.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
        let content = format!("{}_{}", text, serialized.join("&"));
        format!("{:x}", md5::compute(content.as_bytes()))
    }

    /// Look up a cached clip; misses on TTL expiry or a vanished file.
    pub fn get(&self, text: &str, voice_config: &[(String, String)]) -> Option<PathBuf> {
        let key = Self::cache_key(text, voice_config);
        let mut inner = self.inner.lock().expect("tts cache lock poisoned");

        let expired = match inner.entries.get(&key) {
            None => return None,
            Some(entry) => entry.created_at.elapsed() > self.ttl,
        };
        if expired {
            Self::remove_entry(&mut inner, &key);
            return None;
        }

        let path = inner.entries.get(&key)?.path.clone();
        if !path.exists() {
            Self::remove_entry(&mut inner, &key);
            return None;
        }

        let entry = inner.entries.get_mut(&key)?;
        entry.last_accessed = Instant::now();
        entry.access_count += 1;
        tracing::debug!(target: "TTS", "Cache hit: {}", key);
        Some(path)
    }

    /// Insert a synthesized clip, evicting as needed to honor the bounds.
    pub fn put(&self, text: &str, voice_config: &[(String, String)], path: &Path) -> bool {
        let size_bytes = match std::fs::metadata(path) {
            Ok(meta) => meta.len(),
            Err(e) => {
                tracing::warn!(target: "TTS", "Cache put skipped, unreadable file {}: {}", path.display(), e);
                return false;
            }
        };

        let key = Self::cache_key(text, voice_config);
        let mut inner = self.inner.lock().expect("tts cache lock poisoned");

        if inner.total_bytes + size_bytes > self.memory_limit_bytes {
            self.evict_to_byte_budget(&mut inner);
        }
        while inner.entries.len() >= self.max_entries {
            if !Self::evict_lru(&mut inner) {
                break;
            }
        }

        let now = Instant::now();
        if let Some(old) = inner.entries.insert(
            key.clone(),
            CacheEntry {
                path: path.to_path_buf(),
                size_bytes,
                created_at: now,
                last_accessed: now,
                access_count: 0,
            },
        ) {
            inner.total_bytes -= old.size_bytes;
        }
        inner.total_bytes += size_bytes;
        tracing::debug!(target: "TTS", "Cache store: {} ({} bytes)", key, size_bytes);
        true
    }

    /// Evict least-recently-accessed entries until usage is at most 80% of
    /// the byte budget
    fn evict_to_byte_budget(&self, inner: &mut CacheInner) {
        let target = (self.memory_limit_bytes as f64 * 0.8) as u64;
        while inner.total_bytes > target {
            if !Self::evict_lru(inner) {
                break;
            }
        }
    }

    fn evict_lru(inner: &mut CacheInner) -> bool {
        let lru_key = inner
            .entries
            .iter()
            .min_by_key(|(_, e)| e.last_accessed)
            .map(|(k, _)| k.clone());
        match lru_key {
            Some(key) => {
                Self::remove_entry(inner, &key);
                true
            }
            None => false,
        }
    }

    /// Drop an entry and delete its backing file, best-effort
    fn remove_entry(inner: &mut CacheInner, key: &str) {
        if let Some(entry) = inner.entries.remove(key) {
            inner.total_bytes -= entry.size_bytes;
            if let Err(e) = std::fs::remove_file(&entry.path) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!(target: "TTS", "Cache file delete failed {}: {}", entry.path.display(), e);
                }
            }
        }
    }

    /// Reap TTL-expired entries; called by the background sweeper
    pub fn cleanup_expired(&self) -> usize {
        let mut inner = self.inner.lock().expect("tts cache lock poisoned");
        let expired: Vec<String> = inner
            .entries
            .iter()
            .filter(|(_, e)| e.created_at.elapsed() > self.ttl)
            .map(|(k, _)| k.clone())
            .collect();
        for key in &expired {
            Self::remove_entry(&mut inner, key);
        }
        if !expired.is_empty() {
            tracing::info!(target: "TTS", "Reaped {} expired cache entries", expired.len());
        }
        expired.len()
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock().expect("tts cache lock poisoned");
        let keys: Vec<String> = inner.entries.keys().cloned().collect();
        for key in keys {
            Self::remove_entry(&mut inner, &key);
        }
        inner.total_bytes = 0;
    }

    pub fn stats(&self) -> serde_json::Value {
        let inner = self.inner.lock().expect("tts cache lock poisoned");
        let total_access: u64 = inner.entries.values().map(|e| e.access_count).sum();
        serde_json::json!({
            "total_entries": inner.entries.len(),
            "total_size_mb": inner.total_bytes as f64 / (1024.0 * 1024.0),
            "total_access_count": total_access,
            "memory_usage_percent":
                inner.total_bytes as f64 / self.memory_limit_bytes.max(1) as f64 * 100.0,
            "config": {
                "max_entries": self.max_entries,
                "ttl_seconds": self.ttl.as_secs(),
                "memory_limit_mb": self.memory_limit_bytes / (1024 * 1024),
            },
        })
    }

    pub fn cleanup_interval(&self) -> Duration {
        self.cleanup_interval
    }
}

/// Background task reaping TTL-expired cache entries and stale clip
/// registrations under their respective locks
pub async fn tts_cache_sweeper(
    cache: std::sync::Arc<TtsCache>,
    manager: std::sync::Arc<super::TtsManager>,
) {
    let interval = cache.cleanup_interval();
    loop {
        tokio::time::sleep(interval).await;
        cache.cleanup_expired();
        manager.cleanup_expired_files();
    }
}
