//! Pipeline-level configuration, events, session state, and error types.

use crate::metrics::{MetricsConfig, MetricsSnapshot, ThresholdAlert};
use crate::prosody::ProsodyStateChange;
use crate::translation::TranslationResult;
use crate::tts::SynthesisResult;
use crate::vad::{VadConfig, VadEvent};
use crate::worker_pool::WorkerPoolConfig;
use crate::{asr::AsrResult, tts::TtsConfig};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    Created,
    Active,
    Paused,
    Completed,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Active subset of `{es, zh, ko}`.
    pub target_languages: Vec<String>,
    pub enable_prosody_matching: bool,
    /// Canonical pipeline rate, default 16000.
    pub sample_rate: u32,
    pub vad: VadConfig,
    pub metrics: MetricsConfig,
    pub translation_pool: WorkerPoolConfig,
    pub tts_pool: WorkerPoolConfig,
    pub tts: TtsConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            target_languages: vec!["es".to_string(), "zh".to_string(), "ko".to_string()],
            enable_prosody_matching: true,
            sample_rate: 16_000,
            vad: VadConfig::default(),
            metrics: MetricsConfig::default(),
            translation_pool: WorkerPoolConfig::default(),
            tts_pool: crate::worker_pool::tts_pool_defaults(),
            tts: TtsConfig::default(),
        }
    }
}

/// One event from `process_audio`/`flush`. Every event carries
/// `timestamp_ms`; events correlate via `segment_id -> transcription_id ->
/// (translation, synthesis)` ids.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineEvent {
    pub timestamp_ms: i64,
    pub kind: PipelineEventKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PipelineEventKind {
    Vad {
        segment_id: u64,
        event: VadEvent,
    },
    Transcription {
        segment_id: u64,
        transcription_id: u64,
        result: AsrResult,
    },
    Translation {
        segment_id: u64,
        transcription_id: u64,
        target_language: String,
        result: TranslationResult,
    },
    Synthesis {
        segment_id: u64,
        target_language: String,
        result: SynthesisResult,
    },
    Prosody {
        change: ProsodyStateChange,
    },
    Metrics {
        snapshot: MetricsSnapshot,
        alert: Option<ThresholdAlert>,
    },
    Error {
        stage: String,
        target_language: Option<String>,
        recoverable: bool,
        message: String,
    },
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("pipeline not initialized")]
    NotInitialized { context: BTreeMap<String, String> },

    #[error("pipeline is shut down")]
    Shutdown { context: BTreeMap<String, String> },

    #[error("processing failed at stage {stage} for language {language}")]
    LanguageProcessing {
        stage: String,
        language: String,
        context: BTreeMap<String, String>,
    },

    #[error("stage {stage} failed")]
    StageFailed {
        stage: String,
        context: BTreeMap<String, String>,
    },

    #[error("a metrics threshold was exceeded")]
    ThresholdExceeded { context: BTreeMap<String, String> },

    #[error("invalid input: {reason}")]
    InvalidInput {
        reason: String,
        context: BTreeMap<String, String>,
    },
}

impl PipelineError {
    pub fn code(&self) -> &'static str {
        match self {
            PipelineError::NotInitialized { .. } => "PIPELINE_001",
            PipelineError::Shutdown { .. } => "PIPELINE_002",
            PipelineError::LanguageProcessing { .. } => "PIPELINE_003",
            PipelineError::StageFailed { .. } => "PIPELINE_004",
            PipelineError::ThresholdExceeded { .. } => "PIPELINE_005",
            PipelineError::InvalidInput { .. } => "PIPELINE_006",
        }
    }
}

/// Metadata the orchestrator remembers per VAD-final segment, keyed by
/// `segment_id`, so downstream ASR/translation/synthesis stages can refer
/// back to it.
#[derive(Debug, Clone)]
pub struct SegmentMetadata {
    pub id: u64,
    pub start_sec: f64,
    pub end_sec: f64,
    pub audio: Vec<f32>,
}

/// Optional per-call metadata accepted by `process_audio`.
#[derive(Debug, Clone, Default)]
pub struct AudioMeta {
    pub channels: Option<u16>,
}
