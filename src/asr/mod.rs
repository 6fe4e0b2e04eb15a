//! Automatic speech recognition: the short-audio and rolling-window
//! transcription paths over an opaque model contract.

pub mod engine;
pub mod model;
pub mod types;

pub use engine::AsrEngine;
pub use model::{AsrModel, MockAsrModel};
pub use types::{AsrConfig, AsrError, AsrResult, Task, TranscriptionContext, WordResult};
