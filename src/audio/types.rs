//! Audio primitives: sample containers, error taxonomy, PCM<->float conversion helpers.
//!
//! The pipeline's canonical sample representation is normalized 32-bit float,
//! mono, at a configurable sample rate (16 kHz by default). Everything above
//! this module assumes that invariant; conversion into it happens here.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// A chunk of audio as it enters the pipeline, before mono-mixdown or resampling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioChunk {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub channels: u8,
}

impl AudioChunk {
    pub fn mono(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
            channels: 1,
        }
    }
}

/// Errors raised by audio primitives: PCM conversion, the WAV codec, resampling,
/// and the chunked buffer. Stable string codes follow the `AUDIO_NNN` scheme;
/// `context` carries structured diagnostic data for logging/telemetry.
#[derive(Debug, Error)]
pub enum AudioError {
    #[error("invalid sample rate: {sample_rate}")]
    InvalidSampleRate {
        sample_rate: u32,
        context: BTreeMap<String, String>,
    },

    #[error("invalid channel count: {channels}")]
    InvalidChannelCount {
        channels: u8,
        context: BTreeMap<String, String>,
    },

    #[error("empty audio input")]
    EmptyInput { context: BTreeMap<String, String> },

    #[error("malformed WAV data: {reason}")]
    MalformedWav {
        reason: String,
        context: BTreeMap<String, String>,
    },

    #[error("unsupported WAV format: {reason}")]
    UnsupportedWavFormat {
        reason: String,
        context: BTreeMap<String, String>,
    },

    #[error("sample rate mutation attempted on a non-empty buffer")]
    NonEmptyRateMutation { context: BTreeMap<String, String> },
}

impl AudioError {
    pub fn code(&self) -> &'static str {
        match self {
            AudioError::InvalidSampleRate { .. } => "AUDIO_001",
            AudioError::InvalidChannelCount { .. } => "AUDIO_002",
            AudioError::EmptyInput { .. } => "AUDIO_003",
            AudioError::MalformedWav { .. } => "AUDIO_004",
            AudioError::UnsupportedWavFormat { .. } => "AUDIO_005",
            AudioError::NonEmptyRateMutation { .. } => "AUDIO_006",
        }
    }

    pub fn invalid_sample_rate(sample_rate: u32) -> Self {
        AudioError::InvalidSampleRate {
            sample_rate,
            context: BTreeMap::new(),
        }
    }

    pub fn invalid_channel_count(channels: u8) -> Self {
        AudioError::InvalidChannelCount {
            channels,
            context: BTreeMap::new(),
        }
    }
}

/// Converts a single normalized float sample in `[-1, 1]` to 16-bit PCM,
/// clamping out-of-range input to the extremes (property 3 in the test
/// suite: `|x| > 1 => float_to_int16(x) = +/-32767`).
pub fn float_to_int16(sample: f32) -> i16 {
    let clamped = sample.clamp(-1.0, 1.0);
    if clamped >= 1.0 {
        return i16::MAX;
    }
    (clamped * 32767.0).round() as i16
}

/// Converts 16-bit PCM back to normalized float.
pub fn int16_to_float(sample: i16) -> f32 {
    sample as f32 / 32767.0
}

/// Averages interleaved multi-channel samples down to mono. `channels == 1`
/// returns the input unchanged (may share the allocation via clone-free move
/// when already mono, handled by the caller).
pub fn mixdown_to_mono(samples: &[f32], channels: u8) -> Result<Vec<f32>, AudioError> {
    if channels == 0 {
        return Err(AudioError::invalid_channel_count(channels));
    }
    if channels == 1 {
        return Ok(samples.to_vec());
    }
    let channels = channels as usize;
    if samples.len() % channels != 0 {
        return Err(AudioError::MalformedWav {
            reason: format!(
                "sample count {} is not a multiple of channel count {}",
                samples.len(),
                channels
            ),
            context: BTreeMap::new(),
        });
    }
    let frames = samples.len() / channels;
    let mut out = Vec::with_capacity(frames);
    for frame in 0..frames {
        let base = frame * channels;
        let sum: f32 = samples[base..base + channels].iter().sum();
        out.push(sum / channels as f32);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn float_to_int16_round_trip_bounded() {
        for i in -999..=999 {
            let x = i as f32 / 1000.0;
            let y = int16_to_float(float_to_int16(x));
            assert!((y - x).abs() <= 1.0 / 32767.0 + 1e-4);
        }
    }

    #[test]
    fn float_to_int16_clamps_out_of_range() {
        assert_eq!(float_to_int16(2.0), i16::MAX);
        assert_eq!(float_to_int16(-2.0), -i16::MAX);
    }

    #[test]
    fn mixdown_stereo_averages_channels() {
        let samples = vec![1.0, -1.0, 0.5, 0.5];
        let mono = mixdown_to_mono(&samples, 2).unwrap();
        assert_eq!(mono, vec![0.0, 0.5]);
    }

    #[test]
    fn mixdown_mono_passthrough() {
        let samples = vec![0.1, 0.2, 0.3];
        let mono = mixdown_to_mono(&samples, 1).unwrap();
        assert_eq!(mono, samples);
    }

    #[test]
    fn mixdown_rejects_zero_channels() {
        assert!(mixdown_to_mono(&[0.0], 0).is_err());
    }
}
