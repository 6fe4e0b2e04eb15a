//! VAD configuration, segment/event types, and the error taxonomy.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Fixed analysis frame size at the canonical 16 kHz rate: 512 samples = 32 ms.
pub const FRAME_SIZE: usize = 512;

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct VadConfig {
    pub threshold: f32,
    pub min_silence_duration_ms: u32,
    pub min_speech_duration_ms: u32,
    pub speech_pad_ms: u32,
    pub sample_rate: u32,
}

impl Default for VadConfig {
    fn default() -> Self {
        Self {
            threshold: 0.5,
            min_silence_duration_ms: 100,
            min_speech_duration_ms: 250,
            speech_pad_ms: 30,
            sample_rate: 16000,
        }
    }
}

impl VadConfig {
    pub fn min_silence_duration_sec(&self) -> f64 {
        self.min_silence_duration_ms as f64 / 1000.0
    }

    pub fn min_speech_duration_sec(&self) -> f64 {
        self.min_speech_duration_ms as f64 / 1000.0
    }

    pub fn speech_pad_sec(&self) -> f64 {
        self.speech_pad_ms as f64 / 1000.0
    }
}

/// A contiguous voiced region in stream-absolute time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VadSegment {
    pub start_sec: f64,
    pub end_sec: f64,
    pub confidence: f32,
}

/// A VAD event: `is_partial` means speech is still in progress; a final
/// event commits the segment.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VadEvent {
    pub segment: VadSegment,
    pub is_partial: bool,
}

#[derive(Debug, Error)]
pub enum VadError {
    #[error("invalid sample rate: {sample_rate}")]
    InvalidSampleRate {
        sample_rate: u32,
        context: BTreeMap<String, String>,
    },

    #[error("invalid channel count: {channels}")]
    InvalidChannelCount {
        channels: u8,
        context: BTreeMap<String, String>,
    },

    #[error("VAD model inference failed: {reason}")]
    InferenceFailed {
        reason: String,
        context: BTreeMap<String, String>,
    },
}

impl VadError {
    pub fn code(&self) -> &'static str {
        match self {
            VadError::InvalidSampleRate { .. } => "VAD_001",
            VadError::InvalidChannelCount { .. } => "VAD_002",
            VadError::InferenceFailed { .. } => "VAD_003",
        }
    }
}

/// Opaque recurrent-model state threaded across frames. The pipeline never
/// inspects its contents; it stores and re-submits it verbatim.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VadCarryState(pub Vec<u8>);
