//! The ASR model contract. The real backend (Whisper or similar) is an
//! out-of-scope external collaborator; the engine passes it normalized
//! float32 mono audio at its required rate and receives plain text or,
//! with timestamps requested, a sequence of `<|t|>word` spans.

use super::types::{AsrError, TranscriptionContext, WordResult};
use async_trait::async_trait;

#[async_trait]
pub trait AsrModel: Send + Sync {
    /// Required input sample rate for this model.
    fn sample_rate(&self) -> u32;

    /// Runs inference over `samples` (mono, at `sample_rate()`). When
    /// `ctx.timestamps` is set, the returned string embeds `<|t|>` tags
    /// immediately before each word, `t` being seconds from the start of
    /// `samples`.
    async fn infer(&self, samples: &[f32], ctx: &TranscriptionContext) -> Result<String, AsrError>;
}

/// Deterministic test backend: synthesizes one placeholder word per 0.3s
/// of audio, optionally timestamped, standing in for the real decoder.
pub struct MockAsrModel {
    rate: u32,
}

impl MockAsrModel {
    pub fn new(rate: u32) -> Self {
        Self { rate }
    }
}

impl Default for MockAsrModel {
    fn default() -> Self {
        Self::new(16000)
    }
}

#[async_trait]
impl AsrModel for MockAsrModel {
    fn sample_rate(&self) -> u32 {
        self.rate
    }

    async fn infer(&self, samples: &[f32], ctx: &TranscriptionContext) -> Result<String, AsrError> {
        let duration = samples.len() as f64 / self.rate as f64;
        let word_dur = 0.3;
        let word_count = ((duration / word_dur).floor() as usize).max(1);

        if !ctx.timestamps {
            return Ok((0..word_count).map(|i| format!("word{i}")).collect::<Vec<_>>().join(" "));
        }

        let mut out = String::new();
        for i in 0..word_count {
            out.push_str(&format!("<|{:.2}|>word{i}", i as f64 * word_dur));
        }
        out.push_str(&format!("<|{:.2}|>", word_count as f64 * word_dur));
        Ok(out)
    }
}

/// Parses a `<|t|>word<|t|>word...<|t|>` string into plain text and word
/// spans, each word's `start` the previous timestamp and `end` the next.
pub fn parse_timestamped_text(raw: &str) -> (String, Vec<WordResult>) {
    let mut words = Vec::new();
    let mut timestamps = Vec::new();
    let mut texts = Vec::new();
    let mut rest = raw;

    while let Some(open) = rest.find("<|") {
        let Some(close) = rest[open..].find("|>") else {
            break;
        };
        let tag = &rest[open + 2..open + close];
        let Ok(t) = tag.parse::<f64>() else {
            break;
        };
        timestamps.push(t);
        let after_tag = &rest[open + close + 2..];
        let next_open = after_tag.find("<|").unwrap_or(after_tag.len());
        texts.push(after_tag[..next_open].to_string());
        rest = &after_tag[next_open..];
    }

    for i in 0..texts.len() {
        let word = texts[i].trim();
        if word.is_empty() || i + 1 >= timestamps.len() {
            continue;
        }
        words.push(WordResult {
            word: word.to_string(),
            start_sec: timestamps[i],
            end_sec: timestamps[i + 1],
            confidence: None,
        });
    }

    let plain_text = words
        .iter()
        .map(|w| w.word.as_str())
        .collect::<Vec<_>>()
        .join(" ");
    (plain_text, words)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_model_without_timestamps_returns_plain_words() {
        let model = MockAsrModel::default();
        let ctx = TranscriptionContext::default();
        let text = model.infer(&vec![0.0; 16000], &ctx).await.unwrap();
        assert!(text.contains("word0"));
        assert!(!text.contains("<|"));
    }

    #[test]
    fn parses_timestamped_spans() {
        let raw = "<|0.00|>hello<|0.32|>world<|0.64|>";
        let (text, words) = parse_timestamped_text(raw);
        assert_eq!(text, "hello world");
        assert_eq!(words.len(), 2);
        assert_eq!(words[0].word, "hello");
        assert_eq!(words[0].start_sec, 0.0);
        assert_eq!(words[0].end_sec, 0.32);
        assert!(words[1].end_sec >= words[1].start_sec);
    }

    #[test]
    fn parses_empty_string_without_panic() {
        let (text, words) = parse_timestamped_text("");
        assert!(text.is_empty());
        assert!(words.is_empty());
    }
}
