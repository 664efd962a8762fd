//! Rolling request metrics and alerting
//!
//! Three rings under one lock: active requests, completed requests and error
//! requests (completed/error capped at the configured history size), plus a
//! 100-entry system-metric ring. The performance report aggregates the last
//! 100 completions; error analysis buckets messages by substring.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Instant;

use chrono::{DateTime, Utc};
use rustc_hash::FxHashMap;
use serde::Serialize;

use crate::config::MonitoringConfig;

const SYSTEM_RING_CAPACITY: usize = 100;
const REPORT_WINDOW: usize = 100;
const CURRENT_METRICS_WINDOW: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Started,
    Processing,
    Completed,
    Error,
}

/// One request's measurements
#[derive(Debug, Clone, Serialize)]
pub struct RequestMetrics {
    pub request_id: String,
    pub client_ip: String,
    pub started_at: DateTime<Utc>,
    #[serde(skip)]
    start: Instant,
    pub file_size: Option<u64>,
    /// Seconds spent in the processing stages
    pub processing_time: Option<f64>,
    /// Seconds from arrival to completion
    pub total_time: Option<f64>,
    pub response_size: Option<u64>,
    pub status: RequestStatus,
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SystemMetrics {
    pub timestamp: DateTime<Utc>,
    pub active_requests: usize,
    pub total_requests: u64,
    pub error_count: u64,
    pub avg_processing_time: f64,
    pub avg_response_time: f64,
}

#[derive(Default)]
struct MonitorInner {
    active: FxHashMap<String, RequestMetrics>,
    completed: VecDeque<RequestMetrics>,
    errors: VecDeque<RequestMetrics>,
    system_history: VecDeque<SystemMetrics>,
    total_requests: u64,
    total_errors: u64,
}

pub struct CommunicationMonitor {
    inner: Mutex<MonitorInner>,
    max_history: usize,
}

impl CommunicationMonitor {
    pub fn new(config: &MonitoringConfig) -> Self {
        Self {
            inner: Mutex::new(MonitorInner::default()),
            max_history: config.max_history,
        }
    }

    pub fn start_request(&self, request_id: &str, client_ip: &str, file_size: Option<u64>) {
        let mut inner = self.inner.lock().expect("monitor lock poisoned");
        inner.active.insert(
            request_id.to_string(),
            RequestMetrics {
                request_id: request_id.to_string(),
                client_ip: client_ip.to_string(),
                started_at: crate::now_micros(),
                start: Instant::now(),
                file_size,
                processing_time: None,
                total_time: None,
                response_size: None,
                status: RequestStatus::Started,
                error_message: None,
            },
        );
        inner.total_requests += 1;
        tracing::info!(
            target: "MONITOR",
            "REQUEST_START id={} client={} file_size={:?}",
            request_id, client_ip, file_size
        );
    }

    pub fn update_processing_status(&self, request_id: &str) {
        let mut inner = self.inner.lock().expect("monitor lock poisoned");
        if let Some(metrics) = inner.active.get_mut(request_id) {
            metrics.status = RequestStatus::Processing;
            tracing::debug!(target: "MONITOR", "REQUEST_PROCESSING id={}", request_id);
        }
    }

    pub fn complete_request(
        &self,
        request_id: &str,
        processing_time: f64,
        response_size: Option<u64>,
    ) {
        let mut inner = self.inner.lock().expect("monitor lock poisoned");
        let Some(mut metrics) = inner.active.remove(request_id) else {
            tracing::warn!(target: "MONITOR", "REQUEST_NOT_FOUND id={}", request_id);
            return;
        };
        metrics.processing_time = Some(processing_time);
        metrics.total_time = Some(metrics.start.elapsed().as_secs_f64());
        metrics.response_size = response_size;
        metrics.status = RequestStatus::Completed;

        tracing::info!(
            target: "MONITOR",
            "REQUEST_COMPLETE id={} processing={:.3}s total={:.3}s response_size={:?}",
            request_id, processing_time, metrics.total_time.unwrap_or(0.0), response_size
        );

        inner.completed.push_back(metrics);
        while inner.completed.len() > self.max_history {
            inner.completed.pop_front();
        }
    }

    pub fn log_error(&self, request_id: &str, error_message: &str, error_type: &str) {
        let mut inner = self.inner.lock().expect("monitor lock poisoned");
        let mut metrics = inner.active.remove(request_id).unwrap_or(RequestMetrics {
            request_id: request_id.to_string(),
            client_ip: "unknown".to_string(),
            started_at: crate::now_micros(),
            start: Instant::now(),
            file_size: None,
            processing_time: None,
            total_time: None,
            response_size: None,
            status: RequestStatus::Error,
            error_message: None,
        });
        metrics.status = RequestStatus::Error;
        metrics.total_time = Some(metrics.start.elapsed().as_secs_f64());
        metrics.error_message = Some(error_message.to_string());
        inner.total_errors += 1;

        tracing::error!(
            target: "MONITOR",
            "REQUEST_ERROR id={} type={} message={}",
            request_id, error_type, error_message
        );

        inner.errors.push_back(metrics);
        while inner.errors.len() > self.max_history {
            inner.errors.pop_front();
        }
    }

    /// Current system snapshot; also appended to the system ring
    pub fn current_metrics(&self) -> SystemMetrics {
        let mut inner = self.inner.lock().expect("monitor lock poisoned");
        let recent: Vec<&RequestMetrics> = inner
            .completed
            .iter()
            .rev()
            .take(CURRENT_METRICS_WINDOW)
            .collect();

        let processing: Vec<f64> = recent.iter().filter_map(|m| m.processing_time).collect();
        let totals: Vec<f64> = recent.iter().filter_map(|m| m.total_time).collect();

        let metrics = SystemMetrics {
            timestamp: crate::now_micros(),
            active_requests: inner.active.len(),
            total_requests: inner.total_requests,
            error_count: inner.total_errors,
            avg_processing_time: mean(&processing),
            avg_response_time: mean(&totals),
        };

        inner.system_history.push_back(metrics.clone());
        while inner.system_history.len() > SYSTEM_RING_CAPACITY {
            inner.system_history.pop_front();
        }
        metrics
    }

    /// Aggregate over the last 100 completions plus error analysis
    pub fn performance_report(&self) -> serde_json::Value {
        let current = self.current_metrics();
        let inner = self.inner.lock().expect("monitor lock poisoned");

        let recent: Vec<&RequestMetrics> =
            inner.completed.iter().rev().take(REPORT_WINDOW).collect();
        let recent_errors: Vec<&RequestMetrics> = inner.errors.iter().rev().take(50).collect();

        let processing: Vec<f64> = recent.iter().filter_map(|m| m.processing_time).collect();
        let totals: Vec<f64> = recent.iter().filter_map(|m| m.total_time).collect();

        let mut error_analysis: FxHashMap<&'static str, usize> = FxHashMap::default();
        for err in &recent_errors {
            let bucket = err
                .error_message
                .as_deref()
                .map(classify_error_message)
                .unwrap_or("other");
            *error_analysis.entry(bucket).or_insert(0) += 1;
        }

        serde_json::json!({
            "timestamp": current.timestamp,
            "current_metrics": current,
            "processing_time_stats": distribution_stats(&processing),
            "response_time_stats": distribution_stats(&totals),
            "error_analysis": error_analysis,
            "recent_requests_count": recent.len(),
            "recent_errors_count": recent_errors.len(),
        })
    }

    /// Errors whose requests started within the trailing window
    pub fn errors_within(&self, window: chrono::Duration) -> usize {
        let cutoff = Utc::now() - window;
        let inner = self.inner.lock().expect("monitor lock poisoned");
        inner
            .errors
            .iter()
            .filter(|m| m.started_at > cutoff)
            .count()
    }

    pub fn export(&self, output_file: &std::path::Path) -> std::io::Result<()> {
        let report = self.performance_report();
        let inner = self.inner.lock().expect("monitor lock poisoned");
        let data = serde_json::json!({
            "export_time": crate::now_micros(),
            "completed_requests": inner.completed.iter().collect::<Vec<_>>(),
            "error_requests": inner.errors.iter().collect::<Vec<_>>(),
            "system_metrics": inner.system_history.iter().collect::<Vec<_>>(),
            "performance_report": report,
        });
        drop(inner);

        if let Some(parent) = output_file.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(output_file, serde_json::to_vec_pretty(&data)?)?;
        tracing::info!(target: "MONITOR", "LOGS_EXPORTED file={}", output_file.display());
        Ok(())
    }
}

/// Substring buckets for the error analysis section
fn classify_error_message(message: &str) -> &'static str {
    let lower = message.to_lowercase();
    if lower.contains("timeout") {
        "timeout"
    } else if lower.contains("connection") {
        "connection"
    } else if lower.contains("file") {
        "file"
    } else {
        "other"
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

fn distribution_stats(values: &[f64]) -> serde_json::Value {
    if values.is_empty() {
        return serde_json::json!({});
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).expect("finite durations"));
    let median = if sorted.len() % 2 == 0 {
        (sorted[sorted.len() / 2 - 1] + sorted[sorted.len() / 2]) / 2.0
    } else {
        sorted[sorted.len() / 2]
    };
    serde_json::json!({
        "min": sorted[0],
        "max": sorted[sorted.len() - 1],
        "avg": mean(values),
        "median": median,
    })
}

// ============================================================================
// Alerts
// ============================================================================

pub struct AlertManager {
    error_threshold: usize,
    response_time_threshold: f64,
    cooldown: std::time::Duration,
    last_alert: Mutex<FxHashMap<&'static str, Instant>>,
}

impl AlertManager {
    pub fn new(config: &MonitoringConfig) -> Self {
        Self {
            error_threshold: config.error_threshold,
            response_time_threshold: config.response_time_threshold,
            cooldown: config.alert_cooldown,
            last_alert: Mutex::new(FxHashMap::default()),
        }
    }

    /// Evaluate alert conditions; each alert key has a cooldown before
    /// re-firing.
    pub fn check_alerts(&self, monitor: &CommunicationMonitor) -> Vec<String> {
        let mut alerts = Vec::new();

        let recent_errors = monitor.errors_within(chrono::Duration::hours(1));
        if recent_errors >= self.error_threshold && self.fireable("high_error_rate") {
            alerts.push(format!(
                "높은 오류율 감지: 최근 1시간 내 {}개 오류",
                recent_errors
            ));
        }

        let metrics = monitor.current_metrics();
        if metrics.avg_response_time > self.response_time_threshold && self.fireable("slow_response")
        {
            alerts.push(format!(
                "느린 응답 시간 감지: 평균 {:.2}초",
                metrics.avg_response_time
            ));
        }

        for alert in &alerts {
            tracing::warn!(target: "MONITOR", "ALERT {}", alert);
        }
        alerts
    }

    fn fireable(&self, key: &'static str) -> bool {
        let mut last = self.last_alert.lock().expect("alert lock poisoned");
        match last.get(key) {
            Some(at) if at.elapsed() < self.cooldown => false,
            _ => {
                last.insert(key, Instant::now());
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn config(max_history: usize) -> MonitoringConfig {
        MonitoringConfig {
            max_history,
            error_threshold: 2,
            response_time_threshold: 5.0,
            alert_cooldown: Duration::from_secs(300),
        }
    }

    #[test]
    fn test_request_lifecycle() {
        let monitor = CommunicationMonitor::new(&config(100));
        monitor.start_request("r1", "1.2.3.4", Some(1024));
        monitor.update_processing_status("r1");
        monitor.complete_request("r1", 0.2, Some(2048));

        let metrics = monitor.current_metrics();
        assert_eq!(metrics.active_requests, 0);
        assert_eq!(metrics.total_requests, 1);
        assert_eq!(metrics.error_count, 0);
        assert!(metrics.avg_processing_time > 0.0);
    }

    #[test]
    fn test_error_moves_request_to_error_ring() {
        let monitor = CommunicationMonitor::new(&config(100));
        monitor.start_request("r1", "1.2.3.4", None);
        monitor.log_error("r1", "timeout while calling recognizer", "TIMEOUT");

        let metrics = monitor.current_metrics();
        assert_eq!(metrics.error_count, 1);
        assert_eq!(metrics.active_requests, 0);
        assert_eq!(monitor.errors_within(chrono::Duration::hours(1)), 1);
    }

    #[test]
    fn test_error_for_unknown_request_is_recorded() {
        let monitor = CommunicationMonitor::new(&config(100));
        monitor.log_error("ghost", "file unreadable", "FILE");
        assert_eq!(monitor.current_metrics().error_count, 1);
    }

    #[test]
    fn test_history_ring_is_bounded() {
        let monitor = CommunicationMonitor::new(&config(3));
        for i in 0..10 {
            let id = format!("r{}", i);
            monitor.start_request(&id, "1.2.3.4", None);
            monitor.complete_request(&id, 0.1, None);
        }
        let report = monitor.performance_report();
        assert_eq!(report["recent_requests_count"], 3);
    }

    #[test]
    fn test_performance_report_stats_and_buckets() {
        let monitor = CommunicationMonitor::new(&config(100));
        for (i, t) in [0.1, 0.2, 0.3].iter().enumerate() {
            let id = format!("r{}", i);
            monitor.start_request(&id, "1.2.3.4", None);
            monitor.complete_request(&id, *t, None);
        }
        monitor.log_error("e1", "connection refused", "NET");
        monitor.log_error("e2", "timeout talking to tts", "TIMEOUT");
        monitor.log_error("e3", "weird failure", "???");

        let report = monitor.performance_report();
        let stats = &report["processing_time_stats"];
        assert!((stats["min"].as_f64().unwrap() - 0.1).abs() < 1e-9);
        assert!((stats["max"].as_f64().unwrap() - 0.3).abs() < 1e-9);
        assert!((stats["median"].as_f64().unwrap() - 0.2).abs() < 1e-9);
        assert_eq!(report["error_analysis"]["connection"], 1);
        assert_eq!(report["error_analysis"]["timeout"], 1);
        assert_eq!(report["error_analysis"]["other"], 1);
    }

    #[test]
    fn test_alert_fires_once_within_cooldown() {
        let monitor = CommunicationMonitor::new(&config(100));
        monitor.log_error("e1", "boom", "X");
        monitor.log_error("e2", "boom", "X");

        let alerts = AlertManager::new(&config(100));
        let first = alerts.check_alerts(&monitor);
        assert_eq!(first.len(), 1);
        assert!(first[0].contains("높은 오류율"));

        // Within the cooldown the same alert key stays silent
        let second = alerts.check_alerts(&monitor);
        assert!(second.is_empty());
    }

    #[test]
    fn test_export_writes_json(){
        let monitor = CommunicationMonitor::new(&config(100));
        monitor.start_request("r1", "1.2.3.4", None);
        monitor.complete_request("r1", 0.1, Some(10));

        let path = std::env::temp_dir().join(format!("monitor_export_{}.json", uuid::Uuid::new_v4()));
        monitor.export(&path).unwrap();
        let data: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(data["completed_requests"].as_array().unwrap().len(), 1);
        std::fs::remove_file(path).ok();
    }
}
