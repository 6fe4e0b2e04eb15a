//! Audio primitives: sample containers, PCM/float conversion, the WAV codec,
//! the linear resampler (one-shot and streaming), and the chunked buffer.

pub mod buffer;
pub mod resampler;
pub mod types;
pub mod wav;

pub use types::{AudioChunk, AudioError};
