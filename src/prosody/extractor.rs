//! The prosody extractor: accumulates VAD-filtered voiced audio and locks a
//! speaker embedding once, extracted a single time per session.

use super::types::{ProsodyConfig, ProsodyError, ProsodyState, ProsodyStateChange};
use crate::tts::{SpeakerEmbedding, TtsClient};
use futures_util::future::{BoxFuture, Shared};
use futures_util::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

type ExtractionFuture = Shared<BoxFuture<'static, Result<SpeakerEmbedding, ProsodyError>>>;

pub struct ProsodyExtractor {
    config: ProsodyConfig,
    tts_client: Arc<TtsClient>,
    sample_rate: u32,
    buffer: Vec<f32>,
    state: ProsodyState,
    locked: Option<SpeakerEmbedding>,
    in_flight: Option<ExtractionFuture>,
    listener: Option<Box<dyn Fn(ProsodyStateChange) + Send + Sync>>,
}

impl ProsodyExtractor {
    pub fn new(config: ProsodyConfig, tts_client: Arc<TtsClient>, sample_rate: u32) -> Self {
        Self {
            config,
            tts_client,
            sample_rate,
            buffer: Vec::new(),
            state: ProsodyState::Accumulating,
            locked: None,
            in_flight: None,
            listener: None,
        }
    }

    pub fn state(&self) -> ProsodyState {
        self.state
    }

    pub fn accumulated_duration(&self) -> f64 {
        self.buffer.len() as f64 / self.sample_rate as f64
    }

    pub fn set_state_change_listener(
        &mut self,
        listener: impl Fn(ProsodyStateChange) + Send + Sync + 'static,
    ) {
        self.listener = Some(Box::new(listener));
    }

    fn transition(&mut self, next: ProsodyState, embedding: Option<SpeakerEmbedding>) {
        let previous = self.state;
        self.state = next;
        if let Some(listener) = &self.listener {
            let change = ProsodyStateChange {
                previous,
                current: next,
                accumulated_duration: self.accumulated_duration(),
                embedding,
            };
            let _ = std::panic::catch_unwind(AssertUnwindSafe(|| listener(change)));
        }
    }

    /// Appends voiced samples; returns whether extraction was triggered by
    /// this call. `Locked` ignores further audio; `Error` recovers to
    /// `Accumulating` first (discarding the stale buffer).
    pub async fn add_audio(&mut self, samples: &[f32]) -> Result<bool, ProsodyError> {
        if self.state == ProsodyState::Locked {
            return Ok(false);
        }
        if self.state == ProsodyState::Error {
            self.buffer.clear();
            self.transition(ProsodyState::Accumulating, None);
        }

        self.buffer.extend_from_slice(samples);
        let duration = self.accumulated_duration();

        if self.state == ProsodyState::Accumulating
            && (duration >= self.config.target_duration_s || duration >= self.config.max_buffer_s)
        {
            self.run_extraction().await?;
            return Ok(true);
        }
        Ok(false)
    }

    /// Forces extraction if at least `min_duration_s` is present.
    pub async fn extract_now(&mut self) -> Result<SpeakerEmbedding, ProsodyError> {
        if let Some(locked) = &self.locked {
            return Ok(locked.clone());
        }
        if let Some(in_flight) = self.in_flight.clone() {
            return in_flight.await;
        }
        if self.accumulated_duration() < self.config.min_duration_s {
            return Err(ProsodyError::InsufficientAudio {
                context: Default::default(),
            });
        }
        self.run_extraction().await
    }

    /// Awaits an in-flight extraction, or returns the locked embedding, or
    /// `None` if neither applies.
    pub async fn get_embedding(&mut self) -> Option<SpeakerEmbedding> {
        if let Some(locked) = &self.locked {
            return Some(locked.clone());
        }
        if let Some(in_flight) = self.in_flight.clone() {
            return in_flight.await.ok();
        }
        None
    }

    /// Never awaits: the locked embedding, or `None`.
    pub fn get_embedding_sync(&self) -> Option<SpeakerEmbedding> {
        self.locked.clone()
    }

    pub fn reset(&mut self) {
        self.buffer.clear();
        self.locked = None;
        self.in_flight = None;
        self.transition(ProsodyState::Accumulating, None);
    }

    async fn run_extraction(&mut self) -> Result<SpeakerEmbedding, ProsodyError> {
        let samples = self.buffer.clone();
        let sample_rate = self.sample_rate;
        let client = Arc::clone(&self.tts_client);

        let fut: BoxFuture<'static, Result<SpeakerEmbedding, ProsodyError>> = async move {
            client
                .extract_embedding(&samples, sample_rate, None)
                .await
                .map_err(|e| ProsodyError::ExtractionFailed {
                    reason: e.to_string(),
                    context: Default::default(),
                })
        }
        .boxed();
        let shared = fut.shared();
        self.in_flight = Some(shared.clone());
        self.transition(ProsodyState::Extracting, None);

        let result = shared.await;
        match &result {
            Ok(embedding) => {
                self.locked = Some(embedding.clone());
                self.transition(ProsodyState::Locked, Some(embedding.clone()));
            }
            Err(_) => {
                self.transition(ProsodyState::Error, None);
            }
        }
        self.in_flight = None;
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tts::TtsConfig;

    fn extractor() -> ProsodyExtractor {
        ProsodyExtractor::new(
            ProsodyConfig::default(),
            Arc::new(TtsClient::new(TtsConfig::default())),
            16000,
        )
    }

    #[tokio::test]
    async fn below_min_duration_stays_accumulating() {
        let mut extractor = extractor();
        extractor.add_audio(&vec![0.0; 16000]).await.unwrap(); // 1s < 3s min
        assert_eq!(extractor.state(), ProsodyState::Accumulating);
        assert!(extractor.get_embedding_sync().is_none());
    }

    #[tokio::test]
    async fn extract_now_below_minimum_duration_fails() {
        let mut extractor = extractor();
        extractor.add_audio(&vec![0.0; 16000]).await.unwrap();
        assert!(extractor.extract_now().await.is_err());
    }

    #[tokio::test]
    async fn locked_ignores_further_audio() {
        let mut extractor = extractor();
        // Force a state transition without a live TTS server by driving it
        // into Error, then verify Locked (simulated by direct field checks)
        // is respected once reached via the public API contract: once
        // Locked, add_audio is a no-op regardless of outcome.
        extractor.locked = Some(SpeakerEmbedding {
            data: vec![0.1, 0.2],
            shape: vec![2],
        });
        extractor.state = ProsodyState::Locked;
        let triggered = extractor.add_audio(&vec![0.0; 16000]).await.unwrap();
        assert!(!triggered);
        assert_eq!(extractor.accumulated_duration(), 0.0);
    }

    #[tokio::test]
    async fn error_state_recovers_to_accumulating_on_add_audio() {
        let mut extractor = extractor();
        extractor.state = ProsodyState::Error;
        extractor.buffer = vec![0.0; 1000];
        extractor.add_audio(&vec![0.1; 10]).await.unwrap();
        assert_eq!(extractor.state(), ProsodyState::Accumulating);
        assert_eq!(extractor.buffer.len(), 10);
    }

    #[tokio::test]
    async fn reset_clears_state() {
        let mut extractor = extractor();
        extractor.add_audio(&vec![0.0; 16000]).await.unwrap();
        extractor.reset();
        assert_eq!(extractor.state(), ProsodyState::Accumulating);
        assert_eq!(extractor.accumulated_duration(), 0.0);
        assert!(extractor.get_embedding_sync().is_none());
    }
}
