//! The ASR engine: preprocessing, the short-audio path, and the rolling
//! sliding-window path that emits periodic partials and one final result.

use super::model::{parse_timestamped_text, AsrModel};
use super::types::{AsrConfig, AsrError, AsrResult, TranscriptionContext, WordResult};
use crate::audio::types::mixdown_to_mono;
use async_stream::stream;
use futures_util::Stream;
use std::pin::Pin;
use std::sync::Arc;

pub struct AsrEngine {
    config: AsrConfig,
    model: Arc<dyn AsrModel>,
}

impl AsrEngine {
    pub fn new(config: AsrConfig, model: Arc<dyn AsrModel>) -> Self {
        Self { config, model }
    }

    /// Validates and canonicalizes input: non-empty, mono, at the model's
    /// required rate, and at least `min_audio_duration_sec` long.
    fn preprocess(&self, samples: &[f32], input_rate: u32, channels: u8) -> Result<Vec<f32>, AsrError> {
        if samples.is_empty() {
            return Err(AsrError::EmptyBuffer {
                context: Default::default(),
            });
        }
        if input_rate == 0 {
            return Err(AsrError::InvalidSampleRate {
                sample_rate: input_rate,
                context: Default::default(),
            });
        }
        if channels == 0 {
            return Err(AsrError::InvalidChannelCount {
                channels,
                context: Default::default(),
            });
        }

        let mono = mixdown_to_mono(samples, channels).map_err(|e| AsrError::InvalidChannelCount {
            channels,
            context: [("source".to_string(), e.to_string())].into(),
        })?;

        let model_rate = self.model.sample_rate();
        let resampled = crate::audio::resampler::resample(&mono, input_rate, model_rate)
            .map_err(|e| AsrError::InvalidSampleRate {
                sample_rate: input_rate,
                context: [("source".to_string(), e.to_string())].into(),
            })?;

        let duration = resampled.len() as f64 / model_rate as f64;
        if duration < self.config.min_audio_duration_sec {
            return Err(AsrError::AudioTooShort {
                duration_sec: duration,
                minimum_sec: self.config.min_audio_duration_sec,
                context: Default::default(),
            });
        }

        Ok(resampled)
    }

    /// Transcribes `samples` (at `input_rate`, `channels` channels),
    /// yielding a short-audio single final result, or a rolling-window
    /// sequence of partials followed by one final.
    pub fn transcribe(
        &self,
        samples: &[f32],
        input_rate: u32,
        channels: u8,
        ctx: TranscriptionContext,
    ) -> Result<Pin<Box<dyn Stream<Item = Result<AsrResult, AsrError>> + Send>>, AsrError> {
        let audio = self.preprocess(samples, input_rate, channels)?;
        let model = Arc::clone(&self.model);
        let model_rate = self.model.sample_rate();
        let window_sec = self.config.window_sec;
        let stride_sec = self.config.stride_sec;
        let language = ctx.language.clone().unwrap_or_else(|| "en".to_string());

        let duration = audio.len() as f64 / model_rate as f64;

        if duration <= window_sec {
            let stream = stream! {
                match infer_window(&model, &audio, 0.0, &ctx, &language).await {
                    Ok(mut result) => {
                        result.is_partial = false;
                        yield Ok(result);
                    }
                    Err(e) => yield Err(e),
                }
            };
            return Ok(Box::pin(stream));
        }

        let stream = stream! {
            let window_samples = (window_sec * model_rate as f64).round() as usize;
            let stride_samples = (stride_sec * model_rate as f64).round() as usize;
            let mut window_start_sample = 0usize;
            loop {
                let is_last = window_start_sample + window_samples >= audio.len();
                let window_end_sample = if is_last {
                    audio.len()
                } else {
                    window_start_sample + window_samples
                };
                let window = &audio[window_start_sample..window_end_sample];
                let window_start_sec = window_start_sample as f64 / model_rate as f64;

                match infer_window(&model, window, window_start_sec, &ctx, &language).await {
                    Ok(mut result) => {
                        result.is_partial = !is_last;
                        yield Ok(result);
                    }
                    Err(e) => {
                        yield Err(e);
                        return;
                    }
                }

                if is_last {
                    break;
                }
                window_start_sample += stride_samples;
            }
        };
        Ok(Box::pin(stream))
    }
}

async fn infer_window(
    model: &Arc<dyn AsrModel>,
    window: &[f32],
    window_start_sec: f64,
    ctx: &TranscriptionContext,
    language: &str,
) -> Result<AsrResult, AsrError> {
    let raw = model.infer(window, ctx).await?;
    if ctx.timestamps {
        let (text, words) = parse_timestamped_text(&raw);
        let offset_words: Vec<WordResult> = words
            .into_iter()
            .map(|w| WordResult {
                start_sec: w.start_sec + window_start_sec,
                end_sec: w.end_sec + window_start_sec,
                ..w
            })
            .collect();
        Ok(AsrResult {
            text,
            language: language.to_string(),
            is_partial: true,
            words: Some(offset_words),
        })
    } else {
        Ok(AsrResult {
            text: raw,
            language: language.to_string(),
            is_partial: true,
            words: None,
        })
    }
}
