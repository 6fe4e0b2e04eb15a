//! Single-shot and sentence-streaming translation.

use super::model::TranslationModel;
use super::types::{LanguageCodeMap, TranslationError, TranslationResult};
use async_stream::stream;
use futures_util::Stream;
use std::pin::Pin;
use std::sync::Arc;

/// Sentence-terminating punctuation the streaming translator splits on:
/// ASCII `.!?` and the CJK full-width equivalents `。！？`.
const SENTENCE_TERMINATORS: &[char] = &['.', '!', '?', '。', '！', '？'];

/// Splits `text` into sentences at a terminator *only when it is followed
/// by whitespace* (or sentence-medial "Mr. Smith"-style abbreviations would
/// wrongly split). A terminator at the very end of the string with no
/// trailing whitespace is treated as sentence-internal and does not split;
/// it stays attached to the final segment. Empty segments are dropped.
pub fn split_sentences(text: &str) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    let mut sentences = Vec::new();
    let mut start = 0usize;

    for i in 0..chars.len() {
        if !SENTENCE_TERMINATORS.contains(&chars[i]) {
            continue;
        }
        let followed_by_whitespace = chars.get(i + 1).map(|c| c.is_whitespace()).unwrap_or(false);
        if !followed_by_whitespace {
            continue;
        }
        let sentence: String = chars[start..=i].iter().collect();
        let trimmed = sentence.trim();
        if !trimmed.is_empty() {
            sentences.push(trimmed.to_string());
        }
        start = i + 1;
    }

    if start < chars.len() {
        let rest: String = chars[start..].iter().collect();
        let trimmed = rest.trim();
        if !trimmed.is_empty() {
            sentences.push(trimmed.to_string());
        }
    }

    sentences
}

pub struct Translator {
    model: Arc<dyn TranslationModel>,
    code_map: LanguageCodeMap,
}

impl Translator {
    pub fn new(model: Arc<dyn TranslationModel>) -> Self {
        Self {
            model,
            code_map: LanguageCodeMap::default(),
        }
    }

    pub fn with_code_map(model: Arc<dyn TranslationModel>, code_map: LanguageCodeMap) -> Self {
        Self { model, code_map }
    }

    /// `{text, {src_lang, tgt_lang}} -> {text, src, tgt, is_partial=false}`.
    pub async fn translate(
        &self,
        text: &str,
        src_lang: &str,
        tgt_lang: &str,
    ) -> Result<TranslationResult, TranslationError> {
        let src_backend = self.code_map.resolve(src_lang)?;
        let tgt_backend = self.code_map.resolve(tgt_lang)?;
        let translated = self.model.translate(text, &src_backend, &tgt_backend).await?;
        Ok(TranslationResult {
            text: translated,
            source_lang: src_lang.to_string(),
            target_lang: tgt_lang.to_string(),
            is_partial: false,
        })
    }

    /// Splits on sentence boundaries and translates sentence by sentence,
    /// yielding an accumulated-text result after each with `is_partial =
    /// true` for all but the last. Falls back to single-shot when there is
    /// at most one sentence.
    pub fn translate_stream(
        &self,
        text: &str,
        src_lang: &str,
        tgt_lang: &str,
    ) -> Result<Pin<Box<dyn Stream<Item = Result<TranslationResult, TranslationError>> + Send>>, TranslationError>
    {
        let src_backend = self.code_map.resolve(src_lang)?;
        let tgt_backend = self.code_map.resolve(tgt_lang)?;
        let model = Arc::clone(&self.model);
        let src_lang = src_lang.to_string();
        let tgt_lang = tgt_lang.to_string();

        let sentences = split_sentences(text);
        if sentences.len() <= 1 {
            let whole = text.to_string();
            let stream = stream! {
                match model.translate(&whole, &src_backend, &tgt_backend).await {
                    Ok(translated) => yield Ok(TranslationResult {
                        text: translated,
                        source_lang: src_lang,
                        target_lang: tgt_lang,
                        is_partial: false,
                    }),
                    Err(e) => yield Err(e),
                }
            };
            return Ok(Box::pin(stream));
        }

        let stream = stream! {
            let mut accumulated = String::new();
            let last_index = sentences.len() - 1;
            for (i, sentence) in sentences.into_iter().enumerate() {
                match model.translate(&sentence, &src_backend, &tgt_backend).await {
                    Ok(translated) => {
                        if !accumulated.is_empty() {
                            accumulated.push(' ');
                        }
                        accumulated.push_str(&translated);
                        yield Ok(TranslationResult {
                            text: accumulated.clone(),
                            source_lang: src_lang.clone(),
                            target_lang: tgt_lang.clone(),
                            is_partial: i != last_index,
                        });
                    }
                    Err(e) => {
                        yield Err(e);
                        return;
                    }
                }
            }
        };
        Ok(Box::pin(stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::translation::model::MockTranslationModel;
    use futures_util::StreamExt;

    #[test]
    fn splits_on_ascii_terminator_with_whitespace() {
        let sentences = split_sentences("Hello world. How are you?");
        assert_eq!(sentences, vec!["Hello world.", "How are you?"]);
    }

    #[test]
    fn splits_on_cjk_terminator_with_whitespace() {
        let sentences = split_sentences("你好。 最近怎么样？");
        assert_eq!(sentences, vec!["你好。", "最近怎么样？"]);
    }

    #[test]
    fn trailing_terminator_without_whitespace_does_not_split() {
        let sentences = split_sentences("Hello world.");
        assert_eq!(sentences, vec!["Hello world."]);
    }

    #[test]
    fn terminator_not_followed_by_whitespace_is_not_a_boundary() {
        // "Mr.Smith" should not split at the internal period.
        let sentences = split_sentences("Mr.Smith is here.");
        assert_eq!(sentences, vec!["Mr.Smith is here."]);
    }

    #[tokio::test]
    async fn single_shot_translates_whole_text() {
        let translator = Translator::new(Arc::new(MockTranslationModel));
        let result = translator.translate("hello", "en", "es").await.unwrap();
        assert_eq!(result.source_lang, "en");
        assert_eq!(result.target_lang, "es");
        assert!(!result.is_partial);
        assert!(result.text.contains("hello"));
    }

    #[tokio::test]
    async fn unsupported_language_fails_fast() {
        let translator = Translator::new(Arc::new(MockTranslationModel));
        assert!(translator.translate("hello", "en", "fr").await.is_err());
    }

    #[tokio::test]
    async fn single_sentence_stream_falls_back_to_single_shot() {
        let translator = Translator::new(Arc::new(MockTranslationModel));
        let mut stream = translator.translate_stream("hello", "en", "es").unwrap();
        let mut results = Vec::new();
        while let Some(r) = stream.next().await {
            results.push(r.unwrap());
        }
        assert_eq!(results.len(), 1);
        assert!(!results[0].is_partial);
    }

    #[tokio::test]
    async fn multi_sentence_stream_yields_partials_then_final() {
        let translator = Translator::new(Arc::new(MockTranslationModel));
        let mut stream = translator
            .translate_stream("Hello world. How are you? Goodbye.", "en", "es")
            .unwrap();
        let mut results = Vec::new();
        while let Some(r) = stream.next().await {
            results.push(r.unwrap());
        }
        assert_eq!(results.len(), 3);
        assert!(results[0].is_partial);
        assert!(results[1].is_partial);
        assert!(!results[2].is_partial);
        assert!(results[2].text.len() >= results[0].text.len());
    }
}
