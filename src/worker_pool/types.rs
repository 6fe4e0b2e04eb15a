//! Worker pool configuration and the pool-error-construction contract each
//! domain error type implements so the pool never needs its own error enum.

use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct WorkerPoolConfig {
    pub max_queue_size: usize,
    pub task_timeout_ms: u64,
    pub max_restart_attempts: u32,
    pub restart_delay_ms: u64,
}

impl WorkerPoolConfig {
    pub fn task_timeout(&self) -> Duration {
        Duration::from_millis(self.task_timeout_ms)
    }

    pub fn restart_delay(&self) -> Duration {
        Duration::from_millis(self.restart_delay_ms)
    }
}

/// Translation pool defaults: `max_queue_size = 100`, `task_timeout_ms =
/// 30000`, `restart_delay_ms = 1000`.
impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            max_queue_size: 100,
            task_timeout_ms: 30_000,
            max_restart_attempts: 3,
            restart_delay_ms: 1000,
        }
    }
}

/// TTS pool defaults: `max_queue_size = 50`, `task_timeout_ms = 60000`,
/// `restart_delay_ms = 2000`.
pub fn tts_pool_defaults() -> WorkerPoolConfig {
    WorkerPoolConfig {
        max_queue_size: 50,
        task_timeout_ms: 60_000,
        max_restart_attempts: 3,
        restart_delay_ms: 2000,
    }
}

/// Every domain error the pool can produce (`TranslationError`, `TtsError`)
/// implements this so the pool can construct pool-level failures (queue
/// full, timeout, cancellation, worker failure) without its own error type.
pub trait PoolErrorFactory: std::error::Error + Send + Sync + 'static {
    fn queue_full() -> Self;
    fn timeout() -> Self;
    fn cancelled() -> Self;
    fn worker(reason: String) -> Self;

    /// Whether this error indicates the worker itself is no longer usable
    /// (transport-level failure) rather than an ordinary task failure. A
    /// fatal error triggers the restart policy.
    fn is_fatal(&self) -> bool {
        false
    }
}
