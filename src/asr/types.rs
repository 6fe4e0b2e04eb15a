//! ASR types: results, per-call context, configuration, and errors.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// A single word's timing and (optional) confidence, in stream-absolute
/// time when requested.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WordResult {
    pub word: String,
    pub start_sec: f64,
    pub end_sec: f64,
    pub confidence: Option<f32>,
}

/// One transcription result: a partial (in-progress window) or the final
/// result for a segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AsrResult {
    pub text: String,
    pub language: String,
    pub is_partial: bool,
    pub words: Option<Vec<WordResult>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Task {
    Transcribe,
    Translate,
}

impl Default for Task {
    fn default() -> Self {
        Task::Transcribe
    }
}

/// Per-call options.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TranscriptionContext {
    pub language: Option<String>,
    pub task: Task,
    pub timestamps: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AsrConfig {
    pub window_sec: f64,
    pub stride_sec: f64,
    pub min_audio_duration_sec: f64,
    pub model_sample_rate: u32,
}

impl Default for AsrConfig {
    fn default() -> Self {
        Self {
            window_sec: 1.5,
            stride_sec: 0.4,
            min_audio_duration_sec: 0.1,
            model_sample_rate: 16000,
        }
    }
}

#[derive(Debug, Error)]
pub enum AsrError {
    #[error("ASR engine not initialized")]
    NotInitialized { context: BTreeMap<String, String> },

    #[error("empty audio buffer")]
    EmptyBuffer { context: BTreeMap<String, String> },

    #[error("audio too short: {duration_sec}s < minimum {minimum_sec}s")]
    AudioTooShort {
        duration_sec: f64,
        minimum_sec: f64,
        context: BTreeMap<String, String>,
    },

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

    #[error("transcription failed: {reason}")]
    TranscriptionFailed {
        reason: String,
        context: BTreeMap<String, String>,
    },
}

impl AsrError {
    pub fn code(&self) -> &'static str {
        match self {
            AsrError::NotInitialized { .. } => "ASR_001",
            AsrError::EmptyBuffer { .. } => "ASR_002",
            AsrError::AudioTooShort { .. } => "ASR_003",
            AsrError::InvalidSampleRate { .. } => "ASR_004",
            AsrError::InvalidChannelCount { .. } => "ASR_005",
            AsrError::TranscriptionFailed { .. } => "ASR_006",
        }
    }
}
