//! Rolling metrics store: per-stage latency means, per-language counters,
//! throughput, memory, and edge-triggered threshold alerts.

use super::types::{
    MetricsConfig, MetricsSnapshot, PerLanguageStats, ThresholdAlert, ThroughputCounters,
    Violation, ViolationKind,
};
use chrono::Utc;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::panic::AssertUnwindSafe;
use std::time::Instant;
use sysinfo::System;

/// How many completed operations feed the rolling latency mean.
const ROLLING_WINDOW: usize = 100;

pub struct MetricsStore {
    stage_latencies: HashMap<String, VecDeque<f64>>,
    per_language: HashMap<String, PerLanguageStats>,
    memory_mb: f64,
    buffer_bytes: usize,
    segments_count: u64,
    translations_count: u64,
    syntheses_count: u64,
    window_start: Instant,
    currently_violating: bool,
    listeners: Vec<Box<dyn Fn(&ThresholdAlert) + Send + Sync>>,
    system: System,
}

impl MetricsStore {
    pub fn new() -> Self {
        Self {
            stage_latencies: HashMap::new(),
            per_language: HashMap::new(),
            memory_mb: 0.0,
            buffer_bytes: 0,
            segments_count: 0,
            translations_count: 0,
            syntheses_count: 0,
            window_start: Instant::now(),
            currently_violating: false,
            listeners: Vec::new(),
            system: System::new(),
        }
    }

    pub fn add_threshold_listener(&mut self, listener: impl Fn(&ThresholdAlert) + Send + Sync + 'static) {
        self.listeners.push(Box::new(listener));
    }

    pub fn record_stage_latency(&mut self, stage: &str, duration_ms: f64) {
        let history = self
            .stage_latencies
            .entry(stage.to_string())
            .or_insert_with(|| VecDeque::with_capacity(ROLLING_WINDOW));
        if history.len() == ROLLING_WINDOW {
            history.pop_front();
        }
        history.push_back(duration_ms);
    }

    pub fn record_segment(&mut self) {
        self.segments_count += 1;
    }

    pub fn record_language_result(&mut self, language: &str, success: bool, is_translation: bool) {
        let now = Utc::now().timestamp_millis();
        let stats = self.per_language.entry(language.to_string()).or_default();
        stats.is_active = true;
        if success {
            stats.success_count += 1;
            stats.last_success_ts = Some(now);
        } else {
            stats.error_count += 1;
            stats.last_error_ts = Some(now);
        }
        if success && is_translation {
            self.translations_count += 1;
        } else if success {
            self.syntheses_count += 1;
        }
    }

    pub fn set_language_active(&mut self, language: &str, active: bool) {
        self.per_language.entry(language.to_string()).or_default().is_active = active;
    }

    pub fn set_buffer_bytes(&mut self, bytes: usize) {
        self.buffer_bytes = bytes;
    }

    /// Refreshes the process RSS estimate via `sysinfo`. Falls back to the
    /// previous value if the current process can't be located (unsupported
    /// platform, sandboxed environment).
    pub fn refresh_memory(&mut self) {
        let Ok(pid) = sysinfo::get_current_pid() else {
            return;
        };
        self.system.refresh_all();
        if let Some(process) = self.system.process(pid) {
            self.memory_mb = process.memory() as f64 / (1024.0 * 1024.0);
        }
    }

    fn rolling_mean(&self, stage: &str) -> f64 {
        match self.stage_latencies.get(stage) {
            Some(history) if !history.is_empty() => {
                history.iter().sum::<f64>() / history.len() as f64
            }
            _ => 0.0,
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let mut stage_latencies_ms = BTreeMap::new();
        for stage in self.stage_latencies.keys() {
            stage_latencies_ms.insert(stage.clone(), self.rolling_mean(stage));
        }

        let per_language_error_rate = self
            .per_language
            .iter()
            .map(|(lang, stats)| (lang.clone(), stats.error_rate()))
            .collect();

        let elapsed_secs = self.window_start.elapsed().as_secs_f64().max(f64::EPSILON);
        let throughput = ThroughputCounters {
            segments_per_sec: self.segments_count as f64 / elapsed_secs,
            translations_per_sec: self.translations_count as f64 / elapsed_secs,
            syntheses_per_sec: self.syntheses_count as f64 / elapsed_secs,
        };

        MetricsSnapshot {
            timestamp_ms: Utc::now().timestamp_millis(),
            stage_latencies_ms,
            per_language: self.per_language.clone(),
            per_language_error_rate,
            memory_mb: self.memory_mb,
            throughput,
            buffer_bytes: self.buffer_bytes,
        }
    }

    /// Resets the throughput window; call once per `metrics_interval_ms`
    /// tick.
    pub fn reset_throughput_window(&mut self) {
        self.segments_count = 0;
        self.translations_count = 0;
        self.syntheses_count = 0;
        self.window_start = Instant::now();
    }

    /// Checks `snapshot` against `config`, returning an alert only on the
    /// transition into violation (edge-triggered); subsequent calls while
    /// steady-state violating return `None` until recovery then a fresh
    /// violation. Invokes registered listeners (panics swallowed) when an
    /// alert fires.
    pub fn check_thresholds(
        &mut self,
        config: &MetricsConfig,
        snapshot: &MetricsSnapshot,
    ) -> Option<ThresholdAlert> {
        let mut violations = Vec::new();

        for (stage, latency) in &snapshot.stage_latencies_ms {
            let is_threshold_subject =
                stage == "total" || stage.starts_with("translation:") || stage.starts_with("synthesis:");
            if is_threshold_subject && *latency > config.latency_threshold_ms {
                violations.push(Violation {
                    kind: ViolationKind::Latency,
                    stage: stage.clone(),
                    value: *latency,
                    threshold: config.latency_threshold_ms,
                });
            }
        }
        if snapshot.memory_mb > config.memory_threshold_mb {
            violations.push(Violation {
                kind: ViolationKind::Memory,
                stage: String::new(),
                value: snapshot.memory_mb,
                threshold: config.memory_threshold_mb,
            });
        }

        let now_violating = !violations.is_empty();
        let fire = now_violating && !self.currently_violating;
        self.currently_violating = now_violating;

        if !fire {
            return None;
        }

        let alert = ThresholdAlert {
            snapshot: snapshot.clone(),
            violations,
        };
        for listener in &self.listeners {
            let _ = std::panic::catch_unwind(AssertUnwindSafe(|| listener(&alert)));
        }
        Some(alert)
    }
}

impl Default for MetricsStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rolling_mean_over_window() {
        let mut store = MetricsStore::new();
        for i in 1..=5 {
            store.record_stage_latency("vad", i as f64 * 10.0);
        }
        let snapshot = store.snapshot();
        assert_eq!(snapshot.stage_latencies_ms["vad"], 30.0);
    }

    #[test]
    fn rolling_window_caps_at_100() {
        let mut store = MetricsStore::new();
        for _ in 0..150 {
            store.record_stage_latency("vad", 1.0);
        }
        assert_eq!(store.stage_latencies.get("vad").unwrap().len(), 100);
    }

    #[test]
    fn error_rate_computed_per_language() {
        let mut store = MetricsStore::new();
        store.record_language_result("es", true, true);
        store.record_language_result("es", false, true);
        let snapshot = store.snapshot();
        assert_eq!(snapshot.per_language_error_rate["es"], 0.5);
    }

    #[test]
    fn threshold_alert_is_edge_triggered() {
        let mut store = MetricsStore::new();
        let config = MetricsConfig {
            latency_threshold_ms: 100.0,
            memory_threshold_mb: 1.0,
            metrics_interval_ms: 5000,
        };
        store.memory_mb = 2.0;
        let snapshot = store.snapshot();

        let first = store.check_thresholds(&config, &snapshot);
        assert!(first.is_some());

        let second = store.check_thresholds(&config, &snapshot);
        assert!(second.is_none(), "steady-state violation must not re-fire");

        store.memory_mb = 0.1;
        let recovered_snapshot = store.snapshot();
        let recovery = store.check_thresholds(&config, &recovered_snapshot);
        assert!(recovery.is_none());

        store.memory_mb = 5.0;
        let violating_again = store.snapshot();
        let third = store.check_thresholds(&config, &violating_again);
        assert!(third.is_some(), "recovery then violation must re-fire");
    }
}
