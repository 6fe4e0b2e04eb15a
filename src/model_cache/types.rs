//! Model cache trait contract, metadata, and error type.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModelKind {
    Vad,
    Asr,
    Translator,
    Tts,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelFile {
    pub path: String,
    pub sha256: Option<String>,
    pub size_bytes: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelInfo {
    pub id: String,
    pub name: String,
    pub kind: ModelKind,
    pub source: String,
    pub files: Vec<ModelFile>,
    pub size_bytes: Option<u64>,
    /// `true` for models this cache never downloads (e.g. the external TTS
    /// service's own weights).
    pub external: bool,
}

#[derive(Debug, Error)]
pub enum ModelCacheError {
    #[error("unknown model id: {id}")]
    UnknownModel {
        id: String,
        context: BTreeMap<String, String>,
    },

    #[error("model {id} is external and cannot be downloaded here")]
    ExternalModel {
        id: String,
        context: BTreeMap<String, String>,
    },

    #[error("download failed for {id}: {reason}")]
    DownloadFailed {
        id: String,
        reason: String,
        context: BTreeMap<String, String>,
    },

    #[error("integrity check failed for {id}: expected sha256 {expected}, got {actual}")]
    IntegrityMismatch {
        id: String,
        expected: String,
        actual: String,
        context: BTreeMap<String, String>,
    },

    #[error("filesystem error: {reason}")]
    Io {
        reason: String,
        context: BTreeMap<String, String>,
    },
}

impl ModelCacheError {
    pub fn code(&self) -> &'static str {
        match self {
            ModelCacheError::UnknownModel { .. } => "MODEL_CACHE_001",
            ModelCacheError::ExternalModel { .. } => "MODEL_CACHE_002",
            ModelCacheError::DownloadFailed { .. } => "MODEL_CACHE_003",
            ModelCacheError::IntegrityMismatch { .. } => "MODEL_CACHE_004",
            ModelCacheError::Io { .. } => "MODEL_CACHE_005",
        }
    }
}

pub type ProgressCallback = Box<dyn Fn(u64, u64) + Send + Sync>;

#[async_trait]
pub trait ModelCache: Send + Sync {
    async fn is_model_cached(&self, id: &str) -> bool;
    async fn get_model_path(&self, id: &str) -> Option<PathBuf>;
    async fn ensure_model(
        &self,
        id: &str,
        progress: Option<ProgressCallback>,
    ) -> Result<PathBuf, ModelCacheError>;
    async fn delete_model(&self, id: &str) -> Result<(), ModelCacheError>;
    fn list_models(&self) -> Vec<ModelInfo>;
    async fn list_cached_models(&self) -> Vec<ModelInfo>;
    fn get_model_info(&self, id: &str) -> Option<ModelInfo>;
}
