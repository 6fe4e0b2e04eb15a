//! TTS client: stateless HTTP/JSON access to the external synthesis
//! service (health, embedding extraction, synthesis).

pub mod client;
pub mod types;
pub mod worker;

pub use client::TtsClient;
pub use types::{SpeakerEmbedding, SynthesisResult, TtsConfig, TtsError, TtsRequest};
pub use worker::TtsBackend;
