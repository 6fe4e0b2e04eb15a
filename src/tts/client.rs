//! Stateless HTTP/JSON client for the external synthesis service: health,
//! embedding extraction, and synthesis, with retry and fallback-to-neutral
//! policy.

use super::types::{
    ErrorBody, ExtractEmbeddingRequest, ExtractEmbeddingResponse, HealthResponse,
    SpeakerEmbedding, SynthesisResult, SynthesizeRequest, SynthesizeResponse, TtsConfig, TtsError,
};
use crate::cancellation::CancellationToken;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tracing::{debug, warn};

/// Safe for concurrent use: holds only an HTTP client and config, no
/// per-call mutable state.
#[derive(Clone)]
pub struct TtsClient {
    http: Client,
    config: TtsConfig,
}

impl TtsClient {
    pub fn new(config: TtsConfig) -> Self {
        let http = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .expect("reqwest client construction is infallible for this configuration");
        Self { http, config }
    }

    fn ensure_supported(&self, language: &str) -> Result<(), TtsError> {
        if self.config.supported_languages.iter().any(|l| l == language) {
            Ok(())
        } else {
            Err(TtsError::UnsupportedLanguage {
                code: language.to_string(),
                allowed: self.config.supported_languages.clone(),
                context: Default::default(),
            })
        }
    }

    pub async fn health(&self) -> Result<HealthResponse, TtsError> {
        let url = format!("{}/health", self.config.base_url);
        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| network_error(&e))?;
        parse_json(resp).await
    }

    /// Extracts a speaker embedding from `samples` (mono float32 at
    /// `sample_rate`), rejecting the call outright if the caller did not
    /// already enforce `min_duration` upstream (the prosody extractor's
    /// responsibility; this client just forwards `InsufficientAudio` from
    /// the server).
    pub async fn extract_embedding(
        &self,
        samples: &[f32],
        sample_rate: u32,
        cancel: Option<&CancellationToken>,
    ) -> Result<SpeakerEmbedding, TtsError> {
        if samples.is_empty() {
            return Err(TtsError::InsufficientAudio {
                context: Default::default(),
            });
        }
        let body = ExtractEmbeddingRequest {
            audio_base64: encode_f32(samples),
            sample_rate,
        };
        let url = format!("{}/extract-embedding", self.config.base_url);

        let response: ExtractEmbeddingResponse = self
            .with_retry(cancel, || {
                let url = url.clone();
                let body = body.clone();
                async move {
                    let resp = self
                        .http
                        .post(&url)
                        .json(&body)
                        .send()
                        .await
                        .map_err(|e| network_error(&e))?;
                    parse_json_or_detail(resp, |detail| TtsError::EmbeddingExtractionFailed {
                        reason: detail,
                        context: Default::default(),
                    })
                    .await
                }
            })
            .await?;

        let data = decode_f32(&response.embedding_base64).map_err(|reason| {
            TtsError::EmbeddingExtractionFailed {
                reason,
                context: Default::default(),
            }
        })?;
        Ok(SpeakerEmbedding {
            data,
            shape: response.embedding_shape,
        })
    }

    /// Synthesizes `text` in `language`, optionally attaching a prosody
    /// embedding. If the call fails with an embedding attached and
    /// `fallback_to_neutral` is set, retries once without it.
    pub async fn synthesize(
        &self,
        text: &str,
        language: &str,
        speed: f32,
        embedding: Option<&SpeakerEmbedding>,
        cancel: Option<&CancellationToken>,
    ) -> Result<SynthesisResult, TtsError> {
        self.ensure_supported(language)?;

        match self
            .synthesize_once(text, language, speed, embedding, cancel)
            .await
        {
            Ok(result) => Ok(result),
            Err(e) if embedding.is_some() && self.config.fallback_to_neutral => {
                warn!(error = %e, "synthesis with embedding failed, retrying without it");
                self.synthesize_once(text, language, speed, None, cancel).await
            }
            Err(e) => Err(e),
        }
    }

    async fn synthesize_once(
        &self,
        text: &str,
        language: &str,
        speed: f32,
        embedding: Option<&SpeakerEmbedding>,
        cancel: Option<&CancellationToken>,
    ) -> Result<SynthesisResult, TtsError> {
        let body = SynthesizeRequest {
            text: text.to_string(),
            language: language.to_string(),
            speed,
            embedding_base64: embedding.map(|e| encode_f32(&e.data)),
        };
        let url = format!("{}/synthesize", self.config.base_url);

        let response: SynthesizeResponse = self
            .with_retry(cancel, || {
                let url = url.clone();
                let body = body.clone();
                async move {
                    let resp = self
                        .http
                        .post(&url)
                        .json(&body)
                        .send()
                        .await
                        .map_err(|e| network_error(&e))?;
                    parse_json_or_detail(resp, |detail| TtsError::SynthesisFailed {
                        reason: detail,
                        context: Default::default(),
                    })
                    .await
                }
            })
            .await?;

        let audio = decode_f32(&response.audio_base64)
            .map_err(|reason| TtsError::SynthesisFailed {
                reason,
                context: Default::default(),
            })?;
        Ok(SynthesisResult {
            audio,
            sample_rate: response.sample_rate,
            duration_sec: response.duration_seconds,
        })
    }

    /// Runs `op` up to `retry_attempts + 1` times with `retry_delay_ms`
    /// between attempts, aborting immediately if `cancel` fires. On
    /// retry exhaustion against a transient (network/unavailable) failure,
    /// surfaces `ServerUnavailable`.
    async fn with_retry<T, F, Fut>(
        &self,
        cancel: Option<&CancellationToken>,
        mut op: F,
    ) -> Result<T, TtsError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, TtsError>>,
    {
        let mut attempt = 0;
        loop {
            if let Some(c) = cancel {
                if c.is_cancelled() {
                    return Err(TtsError::Cancelled {
                        context: Default::default(),
                    });
                }
            }

            let result = if let Some(c) = cancel {
                tokio::select! {
                    r = op() => r,
                    _ = c.cancelled() => return Err(TtsError::Cancelled { context: Default::default() }),
                }
            } else {
                op().await
            };

            match result {
                Ok(v) => return Ok(v),
                Err(e) if attempt < self.config.retry_attempts && is_transient(&e) => {
                    attempt += 1;
                    debug!(attempt, error = %e, "retrying TTS request");
                    tokio::time::sleep(Duration::from_millis(self.config.retry_delay_ms)).await;
                }
                Err(e) if is_transient(&e) => {
                    return Err(TtsError::ServerUnavailable {
                        context: Default::default(),
                    });
                }
                Err(e) => return Err(e),
            }
        }
    }
}

fn is_transient(e: &TtsError) -> bool {
    matches!(e, TtsError::Network { .. } | TtsError::ServerUnavailable { .. })
}

fn network_error(e: &reqwest::Error) -> TtsError {
    TtsError::Network {
        reason: e.to_string(),
        context: Default::default(),
    }
}

async fn parse_json<T: serde::de::DeserializeOwned>(resp: reqwest::Response) -> Result<T, TtsError> {
    if !resp.status().is_success() {
        return Err(TtsError::Network {
            reason: format!("unexpected status {}", resp.status()),
            context: Default::default(),
        });
    }
    resp.json::<T>().await.map_err(|e| network_error(&e))
}

async fn parse_json_or_detail<T: serde::de::DeserializeOwned>(
    resp: reqwest::Response,
    on_error: impl FnOnce(String) -> TtsError,
) -> Result<T, TtsError> {
    let status = resp.status();
    if status.is_success() {
        return resp.json::<T>().await.map_err(|e| network_error(&e));
    }
    if status == StatusCode::SERVICE_UNAVAILABLE {
        return Err(TtsError::ServerUnavailable {
            context: Default::default(),
        });
    }
    let detail = resp
        .json::<ErrorBody>()
        .await
        .map(|b| b.detail)
        .unwrap_or_else(|_| format!("HTTP {status}"));
    Err(on_error(detail))
}

fn encode_f32(samples: &[f32]) -> String {
    let mut bytes = Vec::with_capacity(samples.len() * 4);
    for s in samples {
        bytes.extend_from_slice(&s.to_le_bytes());
    }
    BASE64.encode(bytes)
}

fn decode_f32(encoded: &str) -> Result<Vec<f32>, String> {
    let bytes = BASE64.decode(encoded).map_err(|e| e.to_string())?;
    if bytes.len() % 4 != 0 {
        return Err("base64 payload length is not a multiple of 4".to_string());
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn f32_base64_round_trips() {
        let samples = vec![0.0f32, 1.0, -1.0, 0.5, -0.5];
        let encoded = encode_f32(&samples);
        let decoded = decode_f32(&encoded).unwrap();
        assert_eq!(samples, decoded);
    }

    #[test]
    fn decode_rejects_misaligned_payload() {
        let encoded = BASE64.encode([0u8, 1, 2]);
        assert!(decode_f32(&encoded).is_err());
    }

    #[test]
    fn ensure_supported_rejects_unknown_language() {
        let client = TtsClient::new(TtsConfig::default());
        assert!(client.ensure_supported("fr").is_err());
        assert!(client.ensure_supported("es").is_ok());
    }
}
