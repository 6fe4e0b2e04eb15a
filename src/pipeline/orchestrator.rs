//! The pipeline orchestrator: wires VAD, ASR, the prosody extractor, and
//! the translation/TTS worker pools into one audio-in, event-stream-out
//! state machine.
//!
//! Metrics counters only ever change on the task driving `process_audio`
//! or `flush` (never from a background timer), so the "periodic" tick is
//! realized by checking elapsed time at the top of each call rather than
//! spawning a ticker that would mutate `MetricsStore` off-task.

use super::context::PipelineContext;
use super::types::{
    AudioMeta, PipelineConfig, PipelineError, PipelineEvent, PipelineEventKind, SegmentMetadata,
    SessionState,
};
use crate::asr::{AsrEngine, AsrModel, TranscriptionContext};
use crate::audio::buffer::ChunkedAudioBuffer;
use crate::audio::types::mixdown_to_mono;
use crate::cancellation::CancellationToken;
use crate::translation::{TranslationBackend, TranslationModel, TranslationRequest, Translator};
use crate::tts::{TtsBackend, TtsClient, TtsRequest};
use crate::vad::{VadEngine, VadModel};
use crate::worker_pool::WorkerPool;
use async_stream::stream;
use futures_util::{Stream, StreamExt};
use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::warn;
use uuid::Uuid;

/// Internal fan-out channel payload: events destined for the caller plus
/// metrics updates that must land on the orchestrator's own task (the
/// spawned fan-out task has no access to `PipelineContext`).
enum FanOutMsg {
    Event(PipelineEventKind),
    Latency { stage: String, duration_ms: f64 },
    LanguageResult { language: String, success: bool, is_translation: bool },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PipelineState {
    Created,
    Ready,
    Processing,
    Shutdown,
}

/// Caps the resident buffer at 60s of canonical-rate audio; segments are
/// always evicted well before this once consumed.
const MAX_BUFFER_SECONDS: u64 = 60;

pub struct Pipeline {
    state: PipelineState,
    config: PipelineConfig,
    buffer: ChunkedAudioBuffer,
    vad: VadEngine,
    asr: AsrEngine,
    translation_model: Arc<dyn TranslationModel>,
    tts_client: Option<Arc<TtsClient>>,
    translation_pool: Option<Arc<WorkerPool<TranslationBackend>>>,
    tts_pool: Option<Arc<WorkerPool<TtsBackend>>>,
    context: Option<PipelineContext>,
    last_metrics_tick: Instant,
    /// Fan-out tasks spawned per segment. Tracked so `shutdown` can abort
    /// them and reclaim the pools' `Arc`s rather than leaking supervisors.
    inflight: tokio::task::JoinSet<()>,
}

impl Pipeline {
    /// Accepts the out-of-scope ML backends as dependency-injected handles;
    /// everything else is built from `config`.
    pub fn new(
        config: PipelineConfig,
        vad_model: Box<dyn VadModel>,
        asr_model: Arc<dyn AsrModel>,
        translation_model: Arc<dyn TranslationModel>,
    ) -> Result<Self, PipelineError> {
        let vad = VadEngine::new(config.vad, vad_model).map_err(|e| PipelineError::StageFailed {
            stage: "vad".to_string(),
            context: [("source".to_string(), e.to_string())].into(),
        })?;
        let asr = AsrEngine::new(
            crate::asr::AsrConfig {
                model_sample_rate: asr_model.sample_rate(),
                ..Default::default()
            },
            asr_model,
        );
        let max_samples = MAX_BUFFER_SECONDS * config.sample_rate as u64;
        let buffer = ChunkedAudioBuffer::new(config.sample_rate, max_samples, 0);

        Ok(Self {
            state: PipelineState::Created,
            config,
            buffer,
            vad,
            asr,
            translation_model,
            tts_client: None,
            translation_pool: None,
            tts_pool: None,
            context: None,
            last_metrics_tick: Instant::now(),
            inflight: tokio::task::JoinSet::new(),
        })
    }

    /// Builds the TTS client, both worker pools, and the session context.
    /// Both pools initialize concurrently; any failure leaves the pipeline
    /// in `Created` with a `StageFailed` error.
    pub async fn initialize(&mut self) -> Result<(), PipelineError> {
        let tts_client = Arc::new(TtsClient::new(self.config.tts.clone()));
        let translator = Arc::new(Translator::new(Arc::clone(&self.translation_model)));

        let languages = self.config.target_languages.clone();
        let translation_config = self.config.translation_pool;
        let translation_languages = languages.clone();
        let translation_factory: Arc<dyn Fn() -> TranslationBackend + Send + Sync> = {
            let translator = Arc::clone(&translator);
            Arc::new(move || TranslationBackend::new(Arc::clone(&translator)))
        };

        let tts_config = self.config.tts_pool;
        let tts_languages = languages.clone();
        let tts_factory: Arc<dyn Fn() -> TtsBackend + Send + Sync> = {
            let client = Arc::clone(&tts_client);
            Arc::new(move || TtsBackend::new(Arc::clone(&client)))
        };

        let (translation_pool, tts_pool) = tokio::join!(
            WorkerPool::new(translation_languages, translation_factory, translation_config),
            WorkerPool::new(tts_languages, tts_factory, tts_config),
        );
        let translation_pool = translation_pool.map_err(|e| PipelineError::StageFailed {
            stage: "translation_pool".to_string(),
            context: [("source".to_string(), e.to_string())].into(),
        })?;
        let tts_pool = tts_pool.map_err(|e| PipelineError::StageFailed {
            stage: "tts_pool".to_string(),
            context: [("source".to_string(), e.to_string())].into(),
        })?;

        let session_id = Uuid::new_v4().to_string();
        let mut context = PipelineContext::new(session_id, self.config.clone(), Arc::clone(&tts_client));
        context.state = SessionState::Active;

        self.tts_client = Some(tts_client);
        self.translation_pool = Some(Arc::new(translation_pool));
        self.tts_pool = Some(Arc::new(tts_pool));
        self.context = Some(context);
        self.last_metrics_tick = Instant::now();
        self.state = PipelineState::Ready;
        Ok(())
    }

    fn context_mut(&mut self) -> Result<&mut PipelineContext, PipelineError> {
        self.context.as_mut().ok_or_else(|| PipelineError::NotInitialized {
            context: Default::default(),
        })
    }

    fn require_ready(&self) -> Result<(), PipelineError> {
        match self.state {
            PipelineState::Created => Err(PipelineError::NotInitialized {
                context: Default::default(),
            }),
            PipelineState::Shutdown => Err(PipelineError::Shutdown {
                context: Default::default(),
            }),
            PipelineState::Ready | PipelineState::Processing => Ok(()),
        }
    }

    /// Emits a `Metrics` event (with threshold alert if one fires) if
    /// `metrics_interval_ms` has elapsed since the last tick. `<= 0`
    /// disables the tick entirely.
    fn maybe_tick_metrics(&mut self, now_ms: i64) -> Option<PipelineEventKind> {
        let interval = self.config.metrics.metrics_interval_ms;
        if interval <= 0 {
            return None;
        }
        if self.last_metrics_tick.elapsed().as_millis() < interval as u128 {
            return None;
        }
        self.last_metrics_tick = Instant::now();
        self.emit_metrics_snapshot(now_ms)
    }

    fn emit_metrics_snapshot(&mut self, _now_ms: i64) -> Option<PipelineEventKind> {
        let context = self.context.as_mut()?;
        context.metrics.refresh_memory();
        context.metrics.set_buffer_bytes(self.buffer.total_samples() as usize * std::mem::size_of::<f32>());
        let snapshot = context.metrics.snapshot();
        let alert = context.metrics.check_thresholds(&context.config.metrics, &snapshot);
        context.metrics.reset_throughput_window();
        Some(PipelineEventKind::Metrics { snapshot, alert })
    }

    fn record_fan_out_msg(&mut self, msg: FanOutMsg) -> Option<PipelineEventKind> {
        match msg {
            FanOutMsg::Event(kind) => Some(kind),
            FanOutMsg::Latency { stage, duration_ms } => {
                if let Some(ctx) = self.context.as_mut() {
                    ctx.metrics.record_stage_latency(&stage, duration_ms);
                }
                None
            }
            FanOutMsg::LanguageResult { language, success, is_translation } => {
                if let Some(ctx) = self.context.as_mut() {
                    ctx.metrics.record_language_result(&language, success, is_translation);
                }
                None
            }
        }
    }

    /// Processes one chunk of audio (mono-mixed and appended to the
    /// resident buffer, passed through VAD, then ASR and fan-out for every
    /// final segment), yielding events as each stage completes.
    ///
    /// Borrows `&mut self` for the duration of the returned stream: drive
    /// it to completion before calling `process_audio` again.
    pub fn process_audio(
        &mut self,
        samples: Vec<f32>,
        input_rate: u32,
        meta: AudioMeta,
    ) -> Pin<Box<dyn Stream<Item = Result<PipelineEvent, PipelineError>> + Send + '_>> {
        let channels = meta.channels.unwrap_or(1) as u8;
        let stream = stream! {
            if let Err(e) = self.require_ready() {
                yield Err(e);
                return;
            }
            self.state = PipelineState::Processing;
            let chunk_start = Instant::now();

            let mono = match mixdown_to_mono(&samples, channels) {
                Ok(m) => m,
                Err(e) => {
                    self.state = PipelineState::Ready;
                    yield Err(PipelineError::InvalidInput {
                        reason: e.to_string(),
                        context: Default::default(),
                    });
                    return;
                }
            };
            let canonical = if input_rate == self.buffer.sample_rate() {
                mono
            } else if self.buffer.is_empty_buffer() {
                match self.buffer.set_sample_rate(input_rate) {
                    Ok(()) => {}
                    Err(e) => {
                        self.state = PipelineState::Ready;
                        yield Err(stage_error("buffer", &e));
                        return;
                    }
                }
                mono
            } else {
                match crate::audio::resampler::resample(&mono, input_rate, self.buffer.sample_rate()) {
                    Ok(r) => r,
                    Err(e) => {
                        self.state = PipelineState::Ready;
                        yield Err(stage_error("resampler", &e));
                        return;
                    }
                }
            };

            self.buffer.append(&canonical);

            let chunk = crate::audio::types::AudioChunk::mono(canonical, self.buffer.sample_rate());
            let vad_start = Instant::now();
            let vad_events = match self.vad.push(&chunk) {
                Ok(events) => events,
                Err(e) => {
                    self.state = PipelineState::Ready;
                    yield Err(stage_error("vad", &e));
                    return;
                }
            };
            if let Some(ctx) = self.context.as_mut() {
                ctx.metrics.record_stage_latency("vad", vad_start.elapsed().as_secs_f64() * 1000.0);
            }

            let mut final_segments: Vec<SegmentMetadata> = Vec::new();

            for vad_event in vad_events {
                let segment = vad_event.segment.clone();
                let is_partial = vad_event.is_partial;

                let segment_id = {
                    let ctx = match self.context_mut() {
                        Ok(c) => c,
                        Err(e) => { yield Err(e); return; }
                    };
                    ctx.next_segment_id()
                };

                if !is_partial {
                    let audio = self.buffer.extract_range(segment.start_sec, segment.end_sec);
                    let meta = SegmentMetadata {
                        id: segment_id,
                        start_sec: segment.start_sec,
                        end_sec: segment.end_sec,
                        audio,
                    };

                    if let Some(ctx) = self.context.as_mut() {
                        if let Some(prosody) = &mut ctx.prosody {
                            if let Err(e) = prosody.add_audio(&meta.audio).await {
                                warn!(error = %e, "prosody extraction failed");
                            }
                        }
                        for change in ctx.drain_prosody_changes() {
                            yield Ok(event(PipelineEventKind::Prosody { change }));
                        }
                    }

                    yield Ok(event(PipelineEventKind::Vad { segment_id, event: vad_event }));

                    if let Some(ctx) = self.context.as_mut() {
                        ctx.segments.insert(segment_id, meta.clone());
                    }
                    final_segments.push(meta);
                } else {
                    yield Ok(event(PipelineEventKind::Vad { segment_id, event: vad_event }));
                }
            }

            for segment in final_segments {
                if let Some(ctx) = self.context.as_mut() {
                    ctx.metrics.record_segment();
                }

                let sample_rate = self.buffer.sample_rate();
                let tctx = TranscriptionContext { timestamps: true, ..Default::default() };
                let asr_start = Instant::now();
                match self.asr.transcribe(&segment.audio, sample_rate, 1, tctx) {
                    Ok(mut asr_stream) => {
                        let mut final_text: Option<(u64, crate::asr::AsrResult)> = None;
                        let mut asr_err = None;
                        while let Some(result) = asr_stream.next().await {
                            match result {
                                Ok(result) => {
                                    let transcription_id = match self.context_mut() {
                                        Ok(c) => c.next_transcription_id(),
                                        Err(e) => { asr_err = Some(e); break; }
                                    };
                                    if !result.is_partial && !result.text.trim().is_empty() {
                                        final_text = Some((transcription_id, result.clone()));
                                    }
                                    yield Ok(event(PipelineEventKind::Transcription {
                                        segment_id: segment.id,
                                        transcription_id,
                                        result,
                                    }));
                                }
                                Err(e) => {
                                    asr_err = Some(PipelineError::StageFailed {
                                        stage: "asr".to_string(),
                                        context: [("source".to_string(), e.to_string())].into(),
                                    });
                                    break;
                                }
                            }
                        }
                        drop(asr_stream);
                        if let Some(ctx) = self.context.as_mut() {
                            ctx.metrics.record_stage_latency("asr", asr_start.elapsed().as_secs_f64() * 1000.0);
                        }
                        if let Some(e) = asr_err {
                            yield Ok(event(PipelineEventKind::Error {
                                stage: "asr".to_string(),
                                target_language: None,
                                recoverable: true,
                                message: e.to_string(),
                            }));
                        } else if let Some((transcription_id, asr_result)) = final_text {
                            let mut rx = self.fan_out(segment.id, transcription_id, asr_result.text.clone(), &asr_result.language);
                            while let Some(msg) = rx.recv().await {
                                if let Some(kind) = self.record_fan_out_msg(msg) {
                                    yield Ok(event(kind));
                                }
                            }
                        }
                    }
                    Err(e) => {
                        yield Ok(event(PipelineEventKind::Error {
                            stage: "asr".to_string(),
                            target_language: None,
                            recoverable: true,
                            message: PipelineError::StageFailed {
                                stage: "asr".to_string(),
                                context: [("source".to_string(), e.to_string())].into(),
                            }.to_string(),
                        }));
                    }
                }

                self.buffer.evict_before(segment.end_sec);
                if let Some(ctx) = self.context.as_mut() {
                    ctx.segments.remove(&segment.id);
                }
            }

            if let Some(ctx) = self.context.as_mut() {
                ctx.metrics.record_stage_latency("total", chunk_start.elapsed().as_secs_f64() * 1000.0);
            }
            if let Some(tick) = self.maybe_tick_metrics(now_ms()) {
                yield Ok(event(tick));
            }

            self.state = PipelineState::Ready;
        };
        Box::pin(stream)
    }

    /// Submits translation, then synthesis, to every active target
    /// language concurrently. Events arrive on the returned receiver in
    /// completion order, not grouped by language.
    fn fan_out(
        &mut self,
        segment_id: u64,
        transcription_id: u64,
        text: String,
        source_lang: &str,
    ) -> mpsc::UnboundedReceiver<FanOutMsg> {
        let (tx, rx) = mpsc::unbounded_channel();
        let translation_pool = self.translation_pool.clone();
        let tts_pool = self.tts_pool.clone();
        let source_lang = source_lang.to_string();
        let fallback_embedding_enabled = self
            .context
            .as_ref()
            .map(|c| c.config.enable_prosody_matching)
            .unwrap_or(false);
        let embedding = self.context.as_ref().and_then(|c| {
            c.prosody
                .as_ref()
                .and_then(|p| p.get_embedding_sync())
        });

        for target_lang in self.config.target_languages.clone() {
            if target_lang == source_lang {
                continue;
            }
            let tx = tx.clone();
            let translation_pool = translation_pool.clone();
            let tts_pool = tts_pool.clone();
            let text = text.clone();
            let source_lang = source_lang.clone();
            let embedding = embedding.clone();

            self.inflight.spawn(async move {
                let (Some(translation_pool), Some(tts_pool)) = (translation_pool, tts_pool) else {
                    return;
                };
                let cancel = CancellationToken::new();
                let request = TranslationRequest {
                    text,
                    source_lang,
                    target_lang: target_lang.clone(),
                };

                let t0 = Instant::now();
                let translation = match translation_pool.submit(&target_lang, request, cancel.clone()).await {
                    Ok(result) => result,
                    Err(e) => {
                        let _ = tx.send(FanOutMsg::LanguageResult {
                            language: target_lang.clone(),
                            success: false,
                            is_translation: true,
                        });
                        let _ = tx.send(FanOutMsg::Event(PipelineEventKind::Error {
                            stage: "translation".to_string(),
                            target_language: Some(target_lang.clone()),
                            recoverable: true,
                            message: e.to_string(),
                        }));
                        return;
                    }
                };
                let _ = tx.send(FanOutMsg::Latency {
                    stage: format!("translation:{target_lang}"),
                    duration_ms: t0.elapsed().as_secs_f64() * 1000.0,
                });
                let _ = tx.send(FanOutMsg::LanguageResult {
                    language: target_lang.clone(),
                    success: true,
                    is_translation: true,
                });
                let _ = tx.send(FanOutMsg::Event(PipelineEventKind::Translation {
                    segment_id,
                    transcription_id,
                    target_language: target_lang.clone(),
                    result: translation.clone(),
                }));

                let tts_request = TtsRequest {
                    text: translation.text,
                    language: target_lang.clone(),
                    speed: 1.0,
                    embedding: if fallback_embedding_enabled { embedding } else { None },
                };
                let t1 = Instant::now();
                match tts_pool.submit(&target_lang, tts_request, cancel).await {
                    Ok(synthesis) => {
                        let _ = tx.send(FanOutMsg::Latency {
                            stage: format!("synthesis:{target_lang}"),
                            duration_ms: t1.elapsed().as_secs_f64() * 1000.0,
                        });
                        let _ = tx.send(FanOutMsg::LanguageResult {
                            language: target_lang.clone(),
                            success: true,
                            is_translation: false,
                        });
                        let _ = tx.send(FanOutMsg::Event(PipelineEventKind::Synthesis {
                            segment_id,
                            target_language: target_lang,
                            result: synthesis,
                        }));
                    }
                    Err(e) => {
                        let _ = tx.send(FanOutMsg::LanguageResult {
                            language: target_lang.clone(),
                            success: false,
                            is_translation: false,
                        });
                        let _ = tx.send(FanOutMsg::Event(PipelineEventKind::Error {
                            stage: "synthesis".to_string(),
                            target_language: Some(target_lang),
                            recoverable: true,
                            message: e.to_string(),
                        }));
                    }
                }
            });
        }
        drop(tx);
        rx
    }

    /// Flushes the VAD's trailing partial segment (if any) to a final,
    /// runs it through ASR and fan-out exactly like `process_audio`, forces
    /// prosody extraction, and closes with a metrics snapshot.
    pub fn flush(&mut self) -> Pin<Box<dyn Stream<Item = Result<PipelineEvent, PipelineError>> + Send + '_>> {
        let stream = stream! {
            if let Err(e) = self.require_ready() {
                yield Err(e);
                return;
            }

            let flushed = match self.vad.flush() {
                Ok(f) => f,
                Err(e) => { yield Err(stage_error("vad", &e)); return; }
            };

            if let Some(vad_event) = flushed {
                let segment = vad_event.segment.clone();
                let segment_id = match self.context_mut() {
                    Ok(c) => c.next_segment_id(),
                    Err(e) => { yield Err(e); return; }
                };
                let meta = SegmentMetadata {
                    id: segment_id,
                    start_sec: segment.start_sec,
                    end_sec: segment.end_sec,
                    audio: self.buffer.extract_range(segment.start_sec, segment.end_sec),
                };
                yield Ok(event(PipelineEventKind::Vad { segment_id, event: vad_event }));
                if let Some(ctx) = self.context.as_mut() {
                    ctx.metrics.record_segment();
                }

                let sample_rate = self.buffer.sample_rate();
                let tctx = TranscriptionContext { timestamps: true, ..Default::default() };
                let asr_start = Instant::now();
                match self.asr.transcribe(&meta.audio, sample_rate, 1, tctx) {
                    Ok(mut asr_stream) => {
                        let mut final_text: Option<(u64, crate::asr::AsrResult)> = None;
                        let mut asr_err = None;
                        while let Some(result) = asr_stream.next().await {
                            match result {
                                Ok(result) => {
                                    let transcription_id = match self.context_mut() {
                                        Ok(c) => c.next_transcription_id(),
                                        Err(e) => { asr_err = Some(e); break; }
                                    };
                                    if !result.is_partial && !result.text.trim().is_empty() {
                                        final_text = Some((transcription_id, result.clone()));
                                    }
                                    yield Ok(event(PipelineEventKind::Transcription {
                                        segment_id: meta.id,
                                        transcription_id,
                                        result,
                                    }));
                                }
                                Err(e) => {
                                    asr_err = Some(PipelineError::StageFailed {
                                        stage: "asr".to_string(),
                                        context: [("source".to_string(), e.to_string())].into(),
                                    });
                                    break;
                                }
                            }
                        }
                        drop(asr_stream);
                        if let Some(ctx) = self.context.as_mut() {
                            ctx.metrics.record_stage_latency("asr", asr_start.elapsed().as_secs_f64() * 1000.0);
                        }
                        if let Some(e) = asr_err {
                            yield Ok(event(PipelineEventKind::Error {
                                stage: "asr".to_string(),
                                target_language: None,
                                recoverable: true,
                                message: e.to_string(),
                            }));
                        } else if let Some((transcription_id, asr_result)) = final_text {
                            let mut rx = self.fan_out(meta.id, transcription_id, asr_result.text.clone(), &asr_result.language);
                            while let Some(msg) = rx.recv().await {
                                if let Some(kind) = self.record_fan_out_msg(msg) {
                                    yield Ok(event(kind));
                                }
                            }
                        }
                    }
                    Err(e) => {
                        yield Ok(event(PipelineEventKind::Error {
                            stage: "asr".to_string(),
                            target_language: None,
                            recoverable: true,
                            message: PipelineError::StageFailed {
                                stage: "asr".to_string(),
                                context: [("source".to_string(), e.to_string())].into(),
                            }.to_string(),
                        }));
                    }
                }
                self.buffer.evict_before(segment.end_sec);
            }

            if let Some(ctx) = self.context.as_mut() {
                if let Some(prosody) = &mut ctx.prosody {
                    if let Err(e) = prosody.extract_now().await {
                        warn!(error = %e, "forced prosody extraction at flush failed");
                    }
                }
                for change in ctx.drain_prosody_changes() {
                    yield Ok(event(PipelineEventKind::Prosody { change }));
                }
            }

            if let Some(kind) = self.emit_metrics_snapshot(now_ms()) {
                yield Ok(event(kind));
            }
        };
        Box::pin(stream)
    }

    /// Resets VAD carry state, the audio buffer, and the session context,
    /// starting a fresh session in place.
    pub fn reset(&mut self) -> Result<(), PipelineError> {
        self.require_ready()?;
        self.vad.reset();
        self.buffer = ChunkedAudioBuffer::new(
            self.config.sample_rate,
            MAX_BUFFER_SECONDS * self.config.sample_rate as u64,
            0,
        );
        self.context_mut()?.reset();
        self.last_metrics_tick = Instant::now();
        Ok(())
    }

    /// Aborts in-flight fan-out work, shuts down both worker pools
    /// concurrently, marks the session completed, and transitions to
    /// `Shutdown`. Idempotent.
    pub async fn shutdown(mut self) -> Result<(), PipelineError> {
        if self.state == PipelineState::Shutdown {
            return Ok(());
        }
        self.inflight.shutdown().await;

        if let Some(ctx) = self.context.as_mut() {
            ctx.state = SessionState::Completed;
        }

        let translation_pool = self.translation_pool.take().and_then(|p| Arc::try_unwrap(p).ok());
        let tts_pool = self.tts_pool.take().and_then(|p| Arc::try_unwrap(p).ok());
        match (translation_pool, tts_pool) {
            (Some(t), Some(s)) => {
                tokio::join!(t.shutdown(), s.shutdown());
            }
            (Some(t), None) => t.shutdown().await,
            (None, Some(s)) => s.shutdown().await,
            (None, None) => {}
        }

        self.state = PipelineState::Shutdown;
        Ok(())
    }
}

fn event(kind: PipelineEventKind) -> PipelineEvent {
    PipelineEvent {
        timestamp_ms: now_ms(),
        kind,
    }
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

fn stage_error(stage: &str, err: &impl std::fmt::Display) -> PipelineError {
    PipelineError::StageFailed {
        stage: stage.to_string(),
        context: [("source".to_string(), err.to_string())].into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asr::model::MockAsrModel;
    use crate::translation::model::{MockTranslationModel, TranslationModel};
    use crate::translation::types::TranslationError;
    use crate::tts::TtsConfig;
    use crate::vad::model::EnergyVadModel;
    use async_trait::async_trait;
    use base64::Engine as _;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// Fails translation into `zho_Hans` (the backend code for `zh`)
    /// deterministically; everything else delegates to `MockTranslationModel`.
    struct FailingZhTranslationModel {
        inner: MockTranslationModel,
    }

    #[async_trait]
    impl TranslationModel for FailingZhTranslationModel {
        async fn translate(
            &self,
            text: &str,
            src_backend_lang: &str,
            tgt_backend_lang: &str,
        ) -> Result<String, TranslationError> {
            if tgt_backend_lang == "zho_Hans" {
                return Err(TranslationError::TranslationFailed {
                    reason: "simulated zh backend failure".to_string(),
                    context: Default::default(),
                });
            }
            self.inner.translate(text, src_backend_lang, tgt_backend_lang).await
        }
    }

    fn tone_samples(duration_sec: f64, rate: u32) -> Vec<f32> {
        let n = (duration_sec * rate as f64).round() as usize;
        (0..n).map(|i| (i as f32 * 0.3).sin() * 0.8).collect()
    }

    async fn mock_tts_server() -> MockServer {
        let server = MockServer::start().await;
        let audio_b64 = base64::engine::general_purpose::STANDARD
            .encode([0u8; 64].as_slice());
        Mock::given(method("POST"))
            .and(path("/synthesize"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "audio_base64": audio_b64,
                "sample_rate": 16000,
                "duration_seconds": 0.1,
                "processing_time_seconds": 0.01,
                "latency_warning": null,
            })))
            .mount(&server)
            .await;
        server
    }

    fn base_config(tts_base_url: String) -> PipelineConfig {
        PipelineConfig {
            enable_prosody_matching: false,
            tts: TtsConfig {
                base_url: tts_base_url,
                ..TtsConfig::default()
            },
            ..PipelineConfig::default()
        }
    }

    async fn build_pipeline(
        config: PipelineConfig,
        translation_model: Arc<dyn TranslationModel>,
    ) -> Pipeline {
        let mut pipeline = Pipeline::new(
            config,
            Box::new(EnergyVadModel::default()),
            Arc::new(MockAsrModel::new(16000)),
            translation_model,
        )
        .unwrap();
        pipeline.initialize().await.unwrap();
        pipeline
    }

    async fn drain(
        stream: Pin<Box<dyn Stream<Item = Result<PipelineEvent, PipelineError>> + Send + '_>>,
    ) -> Vec<PipelineEventKind> {
        let mut out = Vec::new();
        let mut stream = stream;
        while let Some(item) = stream.next().await {
            out.push(item.unwrap().kind);
        }
        out
    }

    #[tokio::test]
    async fn s1_three_languages_end_to_end() {
        let server = mock_tts_server().await;
        let config = base_config(server.uri());
        let mut pipeline = build_pipeline(config, Arc::new(MockTranslationModel)).await;

        let mut events = drain(pipeline.process_audio(tone_samples(1.0, 16000), 16000, AudioMeta::default())).await;
        events.extend(drain(pipeline.flush()).await);

        let vad_count = events.iter().filter(|e| matches!(e, PipelineEventKind::Vad { .. })).count();
        assert!(vad_count >= 1);

        let final_transcriptions: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                PipelineEventKind::Transcription { result, .. } if !result.is_partial => Some(result),
                _ => None,
            })
            .collect();
        assert!(!final_transcriptions.is_empty());

        let translations = events.iter().filter(|e| matches!(e, PipelineEventKind::Translation { .. })).count();
        let syntheses = events.iter().filter(|e| matches!(e, PipelineEventKind::Synthesis { .. })).count();
        let errors = events.iter().filter(|e| matches!(e, PipelineEventKind::Error { .. })).count();
        assert_eq!(translations, 3);
        assert_eq!(syntheses, 3);
        assert_eq!(errors, 0);

        pipeline.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn s2_chunked_streaming_preserves_segment_audio() {
        let server = mock_tts_server().await;
        let config = base_config(server.uri());
        let mut pipeline = build_pipeline(config, Arc::new(MockTranslationModel)).await;

        let mut events = Vec::new();
        for _ in 0..6 {
            events.extend(drain(pipeline.process_audio(tone_samples(0.5, 16000), 16000, AudioMeta::default())).await);
        }
        events.extend(drain(pipeline.flush()).await);

        let finals = events.iter().filter(|e| matches!(e, PipelineEventKind::Vad { event, .. } if !event.is_partial)).count();
        assert!(finals >= 1);
        let final_transcriptions = events
            .iter()
            .filter(|e| matches!(e, PipelineEventKind::Transcription { result, .. } if !result.is_partial))
            .count();
        assert!(final_transcriptions >= 1);

        pipeline.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn s3_translation_failure_isolates_target_language() {
        let server = mock_tts_server().await;
        let config = base_config(server.uri());
        let model = Arc::new(FailingZhTranslationModel { inner: MockTranslationModel });
        let mut pipeline = build_pipeline(config, model).await;

        let mut events = drain(pipeline.process_audio(tone_samples(1.0, 16000), 16000, AudioMeta::default())).await;
        events.extend(drain(pipeline.flush()).await);

        let translations: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                PipelineEventKind::Translation { target_language, .. } => Some(target_language.clone()),
                _ => None,
            })
            .collect();
        assert!(translations.contains(&"es".to_string()));
        assert!(translations.contains(&"ko".to_string()));
        assert!(!translations.contains(&"zh".to_string()));

        let zh_errors: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                PipelineEventKind::Error { stage, target_language, recoverable, .. }
                    if stage == "translation" && target_language.as_deref() == Some("zh") =>
                {
                    Some(*recoverable)
                }
                _ => None,
            })
            .collect();
        assert_eq!(zh_errors.len(), 1);
        assert!(zh_errors[0]);

        let zh_synthesis = events.iter().any(|e| matches!(e, PipelineEventKind::Synthesis { target_language, .. } if target_language == "zh"));
        assert!(!zh_synthesis);

        pipeline.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn property6_ordering_within_segment() {
        let server = mock_tts_server().await;
        let config = base_config(server.uri());
        let mut pipeline = build_pipeline(config, Arc::new(MockTranslationModel)).await;

        let mut events = drain(pipeline.process_audio(tone_samples(1.0, 16000), 16000, AudioMeta::default())).await;
        events.extend(drain(pipeline.flush()).await);

        let vad_final_idx = events
            .iter()
            .position(|e| matches!(e, PipelineEventKind::Vad { event, .. } if !event.is_partial))
            .expect("expected a final VAD event");
        let transcription_idx = events
            .iter()
            .position(|e| matches!(e, PipelineEventKind::Transcription { result, .. } if !result.is_partial))
            .expect("expected a final transcription event");
        assert!(vad_final_idx < transcription_idx);

        for target in ["es", "zh", "ko"] {
            let translation_idx = events
                .iter()
                .position(|e| matches!(e, PipelineEventKind::Translation { target_language, .. } if target_language == target))
                .unwrap_or_else(|| panic!("missing translation event for {target}"));
            let synthesis_idx = events
                .iter()
                .position(|e| matches!(e, PipelineEventKind::Synthesis { target_language, .. } if target_language == target))
                .unwrap_or_else(|| panic!("missing synthesis event for {target}"));
            assert!(translation_idx < synthesis_idx);
            assert!(transcription_idx < translation_idx);
        }

        pipeline.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn property7_fire_and_forget_isolation_keeps_state_ready() {
        let server = mock_tts_server().await;
        let config = base_config(server.uri());
        let model = Arc::new(FailingZhTranslationModel { inner: MockTranslationModel });
        let mut pipeline = build_pipeline(config, model).await;

        let mut events = drain(pipeline.process_audio(tone_samples(1.0, 16000), 16000, AudioMeta::default())).await;
        events.extend(drain(pipeline.flush()).await);

        let translations = events.iter().filter(|e| matches!(e, PipelineEventKind::Translation { .. })).count();
        let syntheses = events.iter().filter(|e| matches!(e, PipelineEventKind::Synthesis { .. })).count();
        let errors = events.iter().filter(|e| matches!(e, PipelineEventKind::Error { .. })).count();
        assert_eq!(translations, 2);
        assert_eq!(syntheses, 2);
        assert_eq!(errors, 1);
        assert_eq!(pipeline.state, PipelineState::Ready);

        pipeline.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn s4_memory_threshold_fires_immediately() {
        let server = mock_tts_server().await;
        let mut config = base_config(server.uri());
        config.metrics.memory_threshold_mb = 0.001;
        let mut pipeline = build_pipeline(config, Arc::new(MockTranslationModel)).await;

        let events = drain(pipeline.flush()).await;
        let alert = events.iter().find_map(|e| match e {
            PipelineEventKind::Metrics { alert: Some(alert), .. } => Some(alert),
            _ => None,
        });
        let alert = alert.expect("expected an immediate memory threshold alert");
        assert!(alert.violations.iter().any(|v| v.kind == crate::metrics::ViolationKind::Memory));

        pipeline.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn reset_clears_session_and_stays_ready() {
        let server = mock_tts_server().await;
        let config = base_config(server.uri());
        let mut pipeline = build_pipeline(config, Arc::new(MockTranslationModel)).await;

        let _ = drain(pipeline.process_audio(tone_samples(1.0, 16000), 16000, AudioMeta::default())).await;
        pipeline.reset().unwrap();
        assert_eq!(pipeline.state, PipelineState::Ready);

        let events = drain(pipeline.process_audio(tone_samples(1.0, 16000), 16000, AudioMeta::default())).await;
        assert!(events.iter().any(|e| matches!(e, PipelineEventKind::Vad { .. })));

        pipeline.shutdown().await.unwrap();
    }
}

