//! Per-language worker pools. One `WorkerPool<B>` hosts one worker per
//! target language, each an isolated, single-task-at-a-time actor so a slow
//! or crashed language can never block the others.

pub mod backend;
pub mod pool;
pub mod types;

pub use backend::LanguageWorkerBackend;
pub use pool::WorkerPool;
pub use types::{tts_pool_defaults, PoolErrorFactory, WorkerPoolConfig};
