//! Minimal WAV (RIFF/WAVE) codec: mono 16-bit PCM encode, permissive decode.
//!
//! Encoding always produces the canonical 44-byte header described in
//! `spec.md` §4.3/§6: RIFF/WAVE, a 16-byte `fmt ` chunk (PCM), and a `data`
//! chunk with no trailing chunks. Decoding is more permissive: it accepts
//! PCM or IEEE-float `fmt ` chunks at 16 or 32 bits/sample and mixes
//! multi-channel data to mono.

use super::types::{int16_to_float, mixdown_to_mono, AudioError};
use std::collections::BTreeMap;

const RIFF_HEADER_LEN: usize = 44;

/// Encodes mono float32 samples as a canonical 16-bit PCM WAV file.
/// Samples are clamped to `[-1, 1]` before quantization.
pub fn encode(samples: &[f32], sample_rate: u32) -> Vec<u8> {
    let data_len = samples.len() * 2;
    let mut buf = Vec::with_capacity(RIFF_HEADER_LEN + data_len);

    buf.extend_from_slice(b"RIFF");
    buf.extend_from_slice(&((36 + data_len) as u32).to_le_bytes());
    buf.extend_from_slice(b"WAVE");

    buf.extend_from_slice(b"fmt ");
    buf.extend_from_slice(&16u32.to_le_bytes()); // fmt chunk size
    buf.extend_from_slice(&1u16.to_le_bytes()); // audioFormat = PCM
    buf.extend_from_slice(&1u16.to_le_bytes()); // channels = mono
    buf.extend_from_slice(&sample_rate.to_le_bytes());
    let byte_rate = sample_rate * 1 * 16 / 8;
    buf.extend_from_slice(&byte_rate.to_le_bytes());
    let block_align: u16 = 1 * 16 / 8;
    buf.extend_from_slice(&block_align.to_le_bytes());
    buf.extend_from_slice(&16u16.to_le_bytes()); // bits per sample

    buf.extend_from_slice(b"data");
    buf.extend_from_slice(&(data_len as u32).to_le_bytes());
    for &s in samples {
        let clamped = s.clamp(-1.0, 1.0);
        let quantized = if clamped >= 1.0 {
            i16::MAX
        } else {
            (clamped * 32767.0).round() as i16
        };
        buf.extend_from_slice(&quantized.to_le_bytes());
    }

    buf
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SampleFormat {
    Pcm,
    Float,
}

/// Decodes a WAV byte stream into mono float32 samples and the declared
/// sample rate. Mixes multi-channel data to mono by averaging.
pub fn decode(bytes: &[u8]) -> Result<(Vec<f32>, u32), AudioError> {
    if bytes.len() < 12 {
        return Err(malformed("file shorter than the RIFF/WAVE preamble"));
    }
    if &bytes[0..4] != b"RIFF" {
        return Err(malformed("missing RIFF marker"));
    }
    if &bytes[8..12] != b"WAVE" {
        return Err(malformed("missing WAVE marker"));
    }

    let mut pos = 12;
    let mut channels: Option<u16> = None;
    let mut sample_rate: Option<u32> = None;
    let mut bits_per_sample: Option<u16> = None;
    let mut format: Option<SampleFormat> = None;
    let mut data: Option<&[u8]> = None;

    while pos + 8 <= bytes.len() {
        let chunk_id = &bytes[pos..pos + 4];
        let chunk_len = u32::from_le_bytes(bytes[pos + 4..pos + 8].try_into().unwrap()) as usize;
        let body_start = pos + 8;
        let body_end = (body_start + chunk_len).min(bytes.len());
        let body = &bytes[body_start..body_end];

        if chunk_id == b"fmt " {
            if body.len() < 16 {
                return Err(malformed("fmt chunk shorter than 16 bytes"));
            }
            let audio_format = u16::from_le_bytes(body[0..2].try_into().unwrap());
            format = Some(match audio_format {
                1 => SampleFormat::Pcm,
                3 => SampleFormat::Float,
                other => {
                    return Err(AudioError::UnsupportedWavFormat {
                        reason: format!("unsupported audioFormat tag {other}"),
                        context: BTreeMap::new(),
                    })
                }
            });
            channels = Some(u16::from_le_bytes(body[2..4].try_into().unwrap()));
            sample_rate = Some(u32::from_le_bytes(body[4..8].try_into().unwrap()));
            bits_per_sample = Some(u16::from_le_bytes(body[14..16].try_into().unwrap()));
        } else if chunk_id == b"data" {
            data = Some(body);
        }

        // Chunks are word-aligned; odd-length chunks carry a pad byte.
        let advance = chunk_len + (chunk_len % 2);
        pos = body_start + advance;
    }

    let channels = channels.ok_or_else(|| malformed("missing fmt chunk"))?;
    let sample_rate = sample_rate.ok_or_else(|| malformed("missing fmt chunk"))?;
    let bits_per_sample = bits_per_sample.ok_or_else(|| malformed("missing fmt chunk"))?;
    let format = format.ok_or_else(|| malformed("missing fmt chunk"))?;
    let data = data.ok_or_else(|| malformed("missing data chunk"))?;

    if channels == 0 {
        return Err(AudioError::invalid_channel_count(0));
    }

    let raw_samples = match (format, bits_per_sample) {
        (SampleFormat::Pcm, 16) => data
            .chunks_exact(2)
            .map(|b| int16_to_float(i16::from_le_bytes([b[0], b[1]])))
            .collect::<Vec<f32>>(),
        (SampleFormat::Float, 32) => data
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect::<Vec<f32>>(),
        (fmt, bits) => {
            return Err(AudioError::UnsupportedWavFormat {
                reason: format!("unsupported combination: {fmt:?} at {bits} bits/sample"),
                context: BTreeMap::new(),
            })
        }
    };

    let mono = mixdown_to_mono(&raw_samples, channels as u8)?;
    Ok((mono, sample_rate))
}

fn malformed(reason: &str) -> AudioError {
    AudioError::MalformedWav {
        reason: reason.to_string(),
        context: BTreeMap::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_preserves_header_fields() {
        let samples = vec![0.0, 0.5, -0.5, 1.0, -1.0];
        let encoded = encode(&samples, 16000);
        let (decoded, sr) = decode(&encoded).unwrap();
        assert_eq!(sr, 16000);
        assert_eq!(decoded.len(), samples.len());
        for (a, b) in samples.iter().zip(decoded.iter()) {
            assert!((a - b).abs() < 0.01, "{a} vs {b}");
        }
    }

    #[test]
    fn header_is_44_bytes_for_canonical_encode() {
        let encoded = encode(&[0.0; 10], 16000);
        assert_eq!(&encoded[0..4], b"RIFF");
        assert_eq!(&encoded[8..12], b"WAVE");
        assert_eq!(&encoded[12..16], b"fmt ");
        assert_eq!(&encoded[36..40], b"data");
        assert_eq!(encoded.len(), RIFF_HEADER_LEN + 20);
    }

    #[test]
    fn decode_rejects_missing_riff_marker() {
        let bytes = vec![0u8; 20];
        assert!(decode(&bytes).is_err());
    }

    #[test]
    fn decode_mixes_stereo_to_mono() {
        // Hand-build a tiny stereo 16-bit PCM WAV: two frames, channels=2.
        let mut buf = Vec::new();
        buf.extend_from_slice(b"RIFF");
        buf.extend_from_slice(&(36u32 + 8).to_le_bytes());
        buf.extend_from_slice(b"WAVE");
        buf.extend_from_slice(b"fmt ");
        buf.extend_from_slice(&16u32.to_le_bytes());
        buf.extend_from_slice(&1u16.to_le_bytes());
        buf.extend_from_slice(&2u16.to_le_bytes());
        buf.extend_from_slice(&16000u32.to_le_bytes());
        buf.extend_from_slice(&(16000u32 * 2 * 2).to_le_bytes());
        buf.extend_from_slice(&4u16.to_le_bytes());
        buf.extend_from_slice(&16u16.to_le_bytes());
        buf.extend_from_slice(b"data");
        buf.extend_from_slice(&8u32.to_le_bytes());
        buf.extend_from_slice(&32767i16.to_le_bytes());
        buf.extend_from_slice(&(-32767i16).to_le_bytes());
        buf.extend_from_slice(&0i16.to_le_bytes());
        buf.extend_from_slice(&0i16.to_le_bytes());

        let (samples, sr) = decode(&buf).unwrap();
        assert_eq!(sr, 16000);
        assert_eq!(samples.len(), 2);
        assert!((samples[0] - 0.0).abs() < 0.001);
        assert!((samples[1] - 0.0).abs() < 0.001);
    }
}
