//! Speaker prosody: accumulate voiced audio, extract a speaker embedding
//! once, and lock it for reuse across all synthesis.

pub mod extractor;
pub mod types;

pub use extractor::ProsodyExtractor;
pub use types::{ProsodyConfig, ProsodyError, ProsodyState, ProsodyStateChange};
