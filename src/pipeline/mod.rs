//! Orchestration layer: wires VAD, ASR, translation, TTS, prosody, and
//! metrics into a single audio-in, event-stream-out pipeline.

pub mod context;
pub mod orchestrator;
pub mod types;

pub use context::PipelineContext;
pub use orchestrator::Pipeline;
pub use types::{
    AudioMeta, PipelineConfig, PipelineError, PipelineEvent, PipelineEventKind, SegmentMetadata,
    SessionState,
};
