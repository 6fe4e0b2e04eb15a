//! Metrics snapshot, threshold-alert, and configuration types.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MetricsConfig {
    pub latency_threshold_ms: f64,
    pub memory_threshold_mb: f64,
    pub metrics_interval_ms: i64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            latency_threshold_ms: 4000.0,
            memory_threshold_mb: 10_000.0,
            metrics_interval_ms: 5000,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PerLanguageStats {
    pub success_count: u64,
    pub error_count: u64,
    pub last_success_ts: Option<i64>,
    pub last_error_ts: Option<i64>,
    pub is_active: bool,
}

impl PerLanguageStats {
    pub fn error_rate(&self) -> f64 {
        let total = self.success_count + self.error_count;
        if total == 0 {
            0.0
        } else {
            self.error_count as f64 / total as f64
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ThroughputCounters {
    pub segments_per_sec: f64,
    pub translations_per_sec: f64,
    pub syntheses_per_sec: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub timestamp_ms: i64,
    /// Rolling mean latency (ms) per stage over the last 100 completed
    /// operations; keys are `"vad"`, `"asr"`, `"translation:<lang>"`,
    /// `"synthesis:<lang>"`, and `"total"`.
    pub stage_latencies_ms: BTreeMap<String, f64>,
    pub per_language: BTreeMap<String, PerLanguageStats>,
    pub per_language_error_rate: BTreeMap<String, f64>,
    pub memory_mb: f64,
    pub throughput: ThroughputCounters,
    pub buffer_bytes: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ViolationKind {
    Latency,
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Violation {
    pub kind: ViolationKind,
    /// The stage name for `Latency` violations (e.g. `"total"`,
    /// `"translation:es"`); empty for `Memory`.
    pub stage: String,
    pub value: f64,
    pub threshold: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThresholdAlert {
    pub snapshot: MetricsSnapshot,
    pub violations: Vec<Violation>,
}
