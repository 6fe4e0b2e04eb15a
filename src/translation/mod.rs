//! Translation: single-shot and sentence-streaming translation with
//! language-code mapping, over an opaque model contract.

pub mod model;
pub mod translator;
pub mod types;
pub mod worker;

pub use model::{MockTranslationModel, TranslationModel};
pub use translator::{split_sentences, Translator};
pub use types::{LanguageCodeMap, TranslationError, TranslationRequest, TranslationResult};
pub use worker::TranslationBackend;
