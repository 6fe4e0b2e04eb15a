//! TTS wire contracts, result/config types, and the error taxonomy.
//!
//! All audio and embedding payloads on the wire are base64 of little-endian
//! float32 bytes, per the external synthesis service's HTTP/JSON contract.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub model_loaded: bool,
    pub supported_languages: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct ExtractEmbeddingRequest {
    pub audio_base64: String,
    pub sample_rate: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ExtractEmbeddingResponse {
    pub embedding_base64: String,
    pub embedding_shape: Vec<usize>,
    #[allow(dead_code)]
    pub duration_seconds: f64,
    #[allow(dead_code)]
    pub processing_time_seconds: f64,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct SynthesizeRequest {
    pub text: String,
    pub language: String,
    pub speed: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding_base64: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct SynthesizeResponse {
    pub audio_base64: String,
    pub sample_rate: u32,
    pub duration_seconds: f64,
    #[allow(dead_code)]
    pub processing_time_seconds: f64,
    #[allow(dead_code)]
    pub latency_warning: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ErrorBody {
    pub detail: String,
}

/// An opaque speaker-characterizing vector; never inspected by the
/// pipeline, only threaded through to synthesis requests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeakerEmbedding {
    pub data: Vec<f32>,
    pub shape: Vec<usize>,
}

/// A unit of work submitted to the TTS worker pool.
#[derive(Debug, Clone)]
pub struct TtsRequest {
    pub text: String,
    pub language: String,
    pub speed: f32,
    pub embedding: Option<SpeakerEmbedding>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SynthesisResult {
    pub audio: Vec<f32>,
    pub sample_rate: u32,
    pub duration_sec: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TtsConfig {
    pub base_url: String,
    pub timeout_ms: u64,
    pub retry_attempts: u32,
    pub retry_delay_ms: u64,
    pub fallback_to_neutral: bool,
    pub supported_languages: Vec<String>,
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            timeout_ms: 60_000,
            retry_attempts: 2,
            retry_delay_ms: 500,
            fallback_to_neutral: true,
            supported_languages: vec!["es".to_string(), "zh".to_string(), "ko".to_string()],
        }
    }
}

#[derive(Debug, Error)]
pub enum TtsError {
    #[error("TTS client not initialized")]
    NotInitialized { context: BTreeMap<String, String> },

    #[error("unsupported language code: {code}")]
    UnsupportedLanguage {
        code: String,
        allowed: Vec<String>,
        context: BTreeMap<String, String>,
    },

    #[error("synthesis failed: {reason}")]
    SynthesisFailed {
        reason: String,
        context: BTreeMap<String, String>,
    },

    #[error("TTS server unavailable after retries")]
    ServerUnavailable { context: BTreeMap<String, String> },

    #[error("embedding extraction failed: {reason}")]
    EmbeddingExtractionFailed {
        reason: String,
        context: BTreeMap<String, String>,
    },

    #[error("insufficient audio for embedding extraction")]
    InsufficientAudio { context: BTreeMap<String, String> },

    #[error("network error: {reason}")]
    Network {
        reason: String,
        context: BTreeMap<String, String>,
    },

    #[error("worker error: {reason}")]
    Worker {
        reason: String,
        context: BTreeMap<String, String>,
    },

    #[error("queue full")]
    QueueFull { context: BTreeMap<String, String> },

    #[error("task timed out")]
    Timeout { context: BTreeMap<String, String> },

    #[error("task cancelled")]
    Cancelled { context: BTreeMap<String, String> },
}

impl crate::worker_pool::PoolErrorFactory for TtsError {
    fn queue_full() -> Self {
        TtsError::QueueFull {
            context: Default::default(),
        }
    }

    fn timeout() -> Self {
        TtsError::Timeout {
            context: Default::default(),
        }
    }

    fn cancelled() -> Self {
        TtsError::Cancelled {
            context: Default::default(),
        }
    }

    fn worker(reason: String) -> Self {
        TtsError::Worker {
            reason,
            context: Default::default(),
        }
    }

    fn is_fatal(&self) -> bool {
        matches!(self, TtsError::ServerUnavailable { .. } | TtsError::Network { .. })
    }
}

impl TtsError {
    pub fn code(&self) -> &'static str {
        match self {
            TtsError::NotInitialized { .. } => "TTS_001",
            TtsError::UnsupportedLanguage { .. } => "TTS_002",
            TtsError::SynthesisFailed { .. } => "TTS_003",
            TtsError::ServerUnavailable { .. } => "TTS_004",
            TtsError::EmbeddingExtractionFailed { .. } => "TTS_005",
            TtsError::InsufficientAudio { .. } => "TTS_006",
            TtsError::Network { .. } => "TTS_007",
            TtsError::Worker { .. } => "TTS_008",
            TtsError::QueueFull { .. } => "TTS_009",
            TtsError::Timeout { .. } => "TTS_010",
            TtsError::Cancelled { .. } => "TTS_011",
        }
    }
}
