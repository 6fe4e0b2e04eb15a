//! babelrelay - real-time voice-to-voice translation pipeline
//!
//! Streams microphone audio through voice activity detection, speech
//! recognition, and fan-out translation/synthesis into Spanish, Chinese,
//! and Korean, reusing a single speaker-prosody embedding per session.

pub mod asr;
pub mod audio;
pub mod cancellation;
pub mod metrics;
pub mod model_cache;
pub mod pipeline;
pub mod prosody;
pub mod translation;
pub mod tts;
pub mod vad;
pub mod worker_pool;

/// Installs the process-wide `tracing` subscriber, reading filter
/// directives from `RUST_LOG` (defaulting to `info`).
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
