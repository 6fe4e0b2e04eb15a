//! Per-session state the orchestrator threads through every call: the
//! session id, its config, the metrics store, the optional prosody
//! extractor, and the segment/transcription id indexes correlating events.

use super::types::{PipelineConfig, SegmentMetadata, SessionState};
use crate::metrics::MetricsStore;
use crate::prosody::{ProsodyExtractor, ProsodyStateChange};
use crate::tts::TtsClient;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

pub struct PipelineContext {
    pub session_id: String,
    pub config: PipelineConfig,
    pub state: SessionState,
    pub metrics: MetricsStore,
    pub prosody: Option<ProsodyExtractor>,
    pub segments: HashMap<u64, SegmentMetadata>,
    /// Transitions the prosody extractor's listener has recorded since the
    /// last drain. The extractor only exposes state via a synchronous
    /// callback, so the orchestrator drains this after every call that
    /// might have triggered a transition rather than re-deriving it.
    prosody_changes: Arc<Mutex<Vec<ProsodyStateChange>>>,
    segment_counter: u64,
    transcription_counter: u64,
}

impl PipelineContext {
    pub fn new(session_id: String, config: PipelineConfig, tts_client: Arc<TtsClient>) -> Self {
        let prosody_changes = Arc::new(Mutex::new(Vec::new()));
        let prosody = if config.enable_prosody_matching {
            let mut extractor = ProsodyExtractor::new(Default::default(), tts_client, config.sample_rate);
            let sink = Arc::clone(&prosody_changes);
            extractor.set_state_change_listener(move |change| {
                sink.lock().unwrap().push(change);
            });
            Some(extractor)
        } else {
            None
        };
        let mut metrics = MetricsStore::new();
        for language in &config.target_languages {
            metrics.set_language_active(language, true);
        }
        Self {
            session_id,
            config,
            state: SessionState::Created,
            metrics,
            prosody,
            segments: HashMap::new(),
            prosody_changes,
            segment_counter: 0,
            transcription_counter: 0,
        }
    }

    /// Drains every prosody transition recorded since the last call, in
    /// the order the extractor emitted them.
    pub fn drain_prosody_changes(&self) -> Vec<ProsodyStateChange> {
        std::mem::take(&mut self.prosody_changes.lock().unwrap())
    }

    pub fn next_segment_id(&mut self) -> u64 {
        let id = self.segment_counter;
        self.segment_counter += 1;
        id
    }

    pub fn next_transcription_id(&mut self) -> u64 {
        let id = self.transcription_counter;
        self.transcription_counter += 1;
        id
    }

    /// Restarts the session in place, keeping config but dropping all
    /// per-session indexes and accumulated prosody state.
    pub fn reset(&mut self) {
        self.segments.clear();
        self.segment_counter = 0;
        self.transcription_counter = 0;
        if let Some(prosody) = &mut self.prosody {
            prosody.reset();
        }
        self.state = SessionState::Active;
    }
}
