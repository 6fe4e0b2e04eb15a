//! The translation model contract. The real backend (NLLB or similar) is
//! an out-of-scope external collaborator.

use super::types::TranslationError;
use async_trait::async_trait;

#[async_trait]
pub trait TranslationModel: Send + Sync {
    /// Translates one unit of text (a whole text or a single sentence).
    async fn translate(
        &self,
        text: &str,
        src_backend_lang: &str,
        tgt_backend_lang: &str,
    ) -> Result<String, TranslationError>;
}

/// Deterministic test backend: tags the input with the target language so
/// tests can assert on routing without a real model.
pub struct MockTranslationModel;

#[async_trait]
impl TranslationModel for MockTranslationModel {
    async fn translate(
        &self,
        text: &str,
        _src_backend_lang: &str,
        tgt_backend_lang: &str,
    ) -> Result<String, TranslationError> {
        Ok(format!("[{tgt_backend_lang}] {text}"))
    }
}
