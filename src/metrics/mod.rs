//! Rolling metrics and edge-triggered threshold alerts.

pub mod store;
pub mod types;

pub use store::MetricsStore;
pub use types::{
    MetricsConfig, MetricsSnapshot, PerLanguageStats, ThresholdAlert, ThroughputCounters,
    Violation, ViolationKind,
};
