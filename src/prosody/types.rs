//! Prosody extractor configuration, state machine, and error types.

use crate::tts::SpeakerEmbedding;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProsodyState {
    Accumulating,
    Extracting,
    Locked,
    Error,
}

#[derive(Debug, Clone, Copy)]
pub struct ProsodyConfig {
    pub min_duration_s: f64,
    pub target_duration_s: f64,
    pub max_buffer_s: f64,
}

impl Default for ProsodyConfig {
    fn default() -> Self {
        Self {
            min_duration_s: 3.0,
            target_duration_s: 6.0,
            max_buffer_s: 10.0,
        }
    }
}

/// Delivered to the state-change listener on every transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProsodyStateChange {
    pub previous: ProsodyState,
    pub current: ProsodyState,
    pub accumulated_duration: f64,
    pub embedding: Option<SpeakerEmbedding>,
}

#[derive(Debug, Error)]
pub enum ProsodyError {
    #[error("insufficient audio accumulated for extraction")]
    InsufficientAudio { context: BTreeMap<String, String> },

    #[error("embedding extraction failed: {reason}")]
    ExtractionFailed {
        reason: String,
        context: BTreeMap<String, String>,
    },
}

impl ProsodyError {
    pub fn code(&self) -> &'static str {
        match self {
            ProsodyError::InsufficientAudio { .. } => "PROSODY_001",
            ProsodyError::ExtractionFailed { .. } => "PROSODY_002",
        }
    }
}
