//! Translation result and error types, and the user-code <-> backend-code
//! language mapping.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// A unit of work submitted to the translation worker pool.
#[derive(Debug, Clone)]
pub struct TranslationRequest {
    pub text: String,
    pub source_lang: String,
    pub target_lang: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranslationResult {
    pub text: String,
    pub source_lang: String,
    pub target_lang: String,
    pub is_partial: bool,
}

#[derive(Debug, Error)]
pub enum TranslationError {
    #[error("translator not initialized")]
    NotInitialized { context: BTreeMap<String, String> },

    #[error("translation failed: {reason}")]
    TranslationFailed {
        reason: String,
        context: BTreeMap<String, String>,
    },

    #[error("unsupported language code: {code}")]
    UnsupportedLanguage {
        code: String,
        allowed: Vec<String>,
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

impl TranslationError {
    pub fn code(&self) -> &'static str {
        match self {
            TranslationError::NotInitialized { .. } => "TRANSLATION_001",
            TranslationError::TranslationFailed { .. } => "TRANSLATION_002",
            TranslationError::UnsupportedLanguage { .. } => "TRANSLATION_003",
            TranslationError::Worker { .. } => "TRANSLATION_004",
            TranslationError::QueueFull { .. } => "TRANSLATION_005",
            TranslationError::Timeout { .. } => "TRANSLATION_006",
            TranslationError::Cancelled { .. } => "TRANSLATION_007",
        }
    }
}

/// Maps user-facing language codes to backend codes, also accepting the
/// backend form directly. Unknown codes fail `UnsupportedLanguage`,
/// carrying the allowed user-facing set.
#[derive(Debug, Clone)]
pub struct LanguageCodeMap {
    user_to_backend: BTreeMap<String, String>,
}

impl Default for LanguageCodeMap {
    fn default() -> Self {
        let mut user_to_backend = BTreeMap::new();
        user_to_backend.insert("en".to_string(), "eng_Latn".to_string());
        user_to_backend.insert("es".to_string(), "spa_Latn".to_string());
        user_to_backend.insert("zh".to_string(), "zho_Hans".to_string());
        user_to_backend.insert("ko".to_string(), "kor_Hang".to_string());
        Self { user_to_backend }
    }
}

impl LanguageCodeMap {
    pub fn resolve(&self, code: &str) -> Result<String, TranslationError> {
        if let Some(backend) = self.user_to_backend.get(code) {
            return Ok(backend.clone());
        }
        if self.user_to_backend.values().any(|v| v == code) {
            return Ok(code.to_string());
        }
        Err(TranslationError::UnsupportedLanguage {
            code: code.to_string(),
            allowed: self.user_to_backend.keys().cloned().collect(),
            context: Default::default(),
        })
    }
}

impl crate::worker_pool::PoolErrorFactory for TranslationError {
    fn queue_full() -> Self {
        TranslationError::QueueFull {
            context: Default::default(),
        }
    }

    fn timeout() -> Self {
        TranslationError::Timeout {
            context: Default::default(),
        }
    }

    fn cancelled() -> Self {
        TranslationError::Cancelled {
            context: Default::default(),
        }
    }

    fn worker(reason: String) -> Self {
        TranslationError::Worker {
            reason,
            context: Default::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_user_code() {
        let map = LanguageCodeMap::default();
        assert_eq!(map.resolve("es").unwrap(), "spa_Latn");
    }

    #[test]
    fn accepts_backend_form_directly() {
        let map = LanguageCodeMap::default();
        assert_eq!(map.resolve("kor_Hang").unwrap(), "kor_Hang");
    }

    #[test]
    fn unknown_code_carries_allowed_set() {
        let map = LanguageCodeMap::default();
        let err = map.resolve("fr").unwrap_err();
        match err {
            TranslationError::UnsupportedLanguage { allowed, .. } => {
                assert!(allowed.contains(&"es".to_string()));
            }
            _ => panic!("expected UnsupportedLanguage"),
        }
    }
}
