//! Adapts `TtsClient` to `LanguageWorkerBackend` so each target language
//! gets its own single-flight synthesis worker.

use super::client::TtsClient;
use super::types::{SynthesisResult, TtsError, TtsRequest};
use crate::cancellation::CancellationToken;
use crate::worker_pool::LanguageWorkerBackend;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;

pub struct TtsBackend {
    client: Arc<TtsClient>,
}

impl TtsBackend {
    pub fn new(client: Arc<TtsClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl LanguageWorkerBackend for TtsBackend {
    type Request = TtsRequest;
    type Response = SynthesisResult;
    type Error = TtsError;

    async fn initialize(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }

    async fn handle(
        &mut self,
        request: Self::Request,
        _partial: Option<mpsc::UnboundedSender<Self::Response>>,
        cancel: CancellationToken,
    ) -> Result<Self::Response, Self::Error> {
        self.client
            .synthesize(
                &request.text,
                &request.language,
                request.speed,
                request.embedding.as_ref(),
                Some(&cancel),
            )
            .await
    }
}
