//! Adapts `Translator` to `LanguageWorkerBackend` so each target language
//! gets its own single-flight worker.

use super::translator::Translator;
use super::types::{TranslationError, TranslationRequest, TranslationResult};
use crate::cancellation::CancellationToken;
use crate::worker_pool::LanguageWorkerBackend;
use async_trait::async_trait;
use futures_util::StreamExt;
use std::sync::Arc;
use tokio::sync::mpsc;

pub struct TranslationBackend {
    translator: Arc<Translator>,
}

impl TranslationBackend {
    pub fn new(translator: Arc<Translator>) -> Self {
        Self { translator }
    }
}

#[async_trait]
impl LanguageWorkerBackend for TranslationBackend {
    type Request = TranslationRequest;
    type Response = TranslationResult;
    type Error = TranslationError;

    async fn initialize(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }

    async fn handle(
        &mut self,
        request: Self::Request,
        partial: Option<mpsc::UnboundedSender<Self::Response>>,
        _cancel: CancellationToken,
    ) -> Result<Self::Response, Self::Error> {
        match partial {
            Some(sink) => {
                let mut stream = self.translator.translate_stream(
                    &request.text,
                    &request.source_lang,
                    &request.target_lang,
                )?;
                let mut last = None;
                while let Some(item) = stream.next().await {
                    let item = item?;
                    let _ = sink.send(item.clone());
                    last = Some(item);
                }
                last.ok_or_else(|| TranslationError::TranslationFailed {
                    reason: "translation stream produced no output".to_string(),
                    context: Default::default(),
                })
            }
            None => {
                self.translator
                    .translate(&request.text, &request.source_lang, &request.target_lang)
                    .await
            }
        }
    }
}
