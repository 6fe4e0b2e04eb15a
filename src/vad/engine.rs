//! The VAD state machine: fixed-size frames, hysteresis, speech padding,
//! carry-state threading, and flush-on-end semantics.

use crate::audio::resampler::StreamingResampler;
use crate::audio::types::{mixdown_to_mono, AudioChunk};
use super::model::VadModel;
use super::types::{VadCarryState, VadConfig, VadError, VadEvent, VadSegment, FRAME_SIZE};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Idle,
    Speaking,
}

pub struct VadEngine {
    config: VadConfig,
    model: Box<dyn VadModel>,
    resampler: StreamingResampler,
    state: State,
    carry: VadCarryState,
    /// Samples accumulated toward canonical rate but not yet a full frame.
    tail: Vec<f32>,
    /// Time, in seconds, at the start of the next frame to be processed.
    current_time: f64,
    speech_start: f64,
    silence_start: Option<f64>,
    last_prob: f32,
}

impl VadEngine {
    pub fn new(config: VadConfig, model: Box<dyn VadModel>) -> Result<Self, VadError> {
        if config.sample_rate == 0 {
            return Err(VadError::InvalidSampleRate {
                sample_rate: config.sample_rate,
                context: Default::default(),
            });
        }
        let resampler = StreamingResampler::new(config.sample_rate, config.sample_rate)
            .map_err(|_| VadError::InvalidSampleRate {
                sample_rate: config.sample_rate,
                context: Default::default(),
            })?;
        Ok(Self {
            config,
            model,
            resampler,
            state: State::Idle,
            carry: VadCarryState::default(),
            tail: Vec::with_capacity(FRAME_SIZE),
            current_time: 0.0,
            speech_start: 0.0,
            silence_start: None,
            last_prob: 0.0,
        })
    }

    fn frame_duration(&self) -> f64 {
        FRAME_SIZE as f64 / self.config.sample_rate as f64
    }

    /// Accepts a chunk at its declared rate/channel count, mixes to mono,
    /// resamples to the canonical rate, and runs the state machine over
    /// every complete frame that results. Returns finals first, then at
    /// most one trailing partial if still speaking.
    pub fn push(&mut self, chunk: &AudioChunk) -> Result<Vec<VadEvent>, VadError> {
        if chunk.sample_rate == 0 {
            return Err(VadError::InvalidSampleRate {
                sample_rate: chunk.sample_rate,
                context: Default::default(),
            });
        }
        if chunk.channels == 0 {
            return Err(VadError::InvalidChannelCount {
                channels: chunk.channels,
                context: Default::default(),
            });
        }

        let mono = mixdown_to_mono(&chunk.samples, chunk.channels).map_err(|e| {
            VadError::InvalidChannelCount {
                channels: chunk.channels,
                context: [("source".to_string(), e.to_string())].into(),
            }
        })?;

        if self.resampler.input_rate() != chunk.sample_rate {
            self.resampler = StreamingResampler::new(chunk.sample_rate, self.config.sample_rate)
                .map_err(|_| VadError::InvalidSampleRate {
                    sample_rate: chunk.sample_rate,
                    context: Default::default(),
                })?;
        }
        let canonical = self.resampler.process(&mono);

        self.tail.extend_from_slice(&canonical);

        let mut events = Vec::new();
        while self.tail.len() >= FRAME_SIZE {
            let frame: Vec<f32> = self.tail.drain(0..FRAME_SIZE).collect();
            if let Some(segment) = self.step_frame(&frame)? {
                events.push(VadEvent {
                    segment,
                    is_partial: false,
                });
            }
        }

        if self.state == State::Speaking {
            events.push(VadEvent {
                segment: VadSegment {
                    start_sec: self.speech_start,
                    end_sec: self.current_time,
                    confidence: self.last_prob,
                },
                is_partial: true,
            });
        }

        Ok(events)
    }

    /// Runs one frame through the state machine. Returns `Some(segment)` if
    /// a final segment closes within this frame.
    fn step_frame(&mut self, frame: &[f32]) -> Result<Option<VadSegment>, VadError> {
        let frame_start_time = self.current_time;
        let (p, carry) = self.model.run(frame, self.carry.clone())?;
        self.carry = carry;
        self.last_prob = p;
        self.current_time += self.frame_duration();

        let threshold = self.config.threshold;
        match self.state {
            State::Idle => {
                if p >= threshold {
                    self.state = State::Speaking;
                    self.speech_start = (frame_start_time - self.config.speech_pad_sec()).max(0.0);
                    self.silence_start = None;
                }
                Ok(None)
            }
            State::Speaking => {
                if p >= threshold {
                    self.silence_start = None;
                    return Ok(None);
                }
                let silence_start = *self.silence_start.get_or_insert(frame_start_time);
                let accumulated_silence = self.current_time - silence_start;
                if accumulated_silence >= self.config.min_silence_duration_sec() {
                    let speech_duration = silence_start - self.speech_start;
                    let result = if speech_duration >= self.config.min_speech_duration_sec() {
                        Some(VadSegment {
                            start_sec: self.speech_start,
                            end_sec: silence_start + self.config.speech_pad_sec(),
                            confidence: p,
                        })
                    } else {
                        None
                    };
                    self.state = State::Idle;
                    self.silence_start = None;
                    Ok(result)
                } else {
                    Ok(None)
                }
            }
        }
    }

    /// Pads the remaining sub-frame tail with zeros to form one more frame,
    /// runs it, then closes out any still-open speech region.
    pub fn flush(&mut self) -> Result<Option<VadEvent>, VadError> {
        let mut frame = std::mem::take(&mut self.tail);
        frame.resize(FRAME_SIZE, 0.0);

        if let Some(segment) = self.step_frame(&frame)? {
            return Ok(Some(VadEvent {
                segment,
                is_partial: false,
            }));
        }

        if self.state == State::Speaking {
            let speech_duration = self.current_time - self.speech_start;
            let event = if speech_duration >= self.config.min_speech_duration_sec() {
                Some(VadEvent {
                    segment: VadSegment {
                        start_sec: self.speech_start,
                        end_sec: self.current_time + self.config.speech_pad_sec(),
                        confidence: self.last_prob,
                    },
                    is_partial: false,
                })
            } else {
                None
            };
            self.state = State::Idle;
            self.silence_start = None;
            return Ok(event);
        }

        Ok(None)
    }

    /// Re-zeros carry state, clears the pending tail, returns to `Idle` at
    /// time 0.
    pub fn reset(&mut self) {
        self.model.reset();
        self.resampler.reset();
        self.state = State::Idle;
        self.carry = VadCarryState::default();
        self.tail.clear();
        self.current_time = 0.0;
        self.speech_start = 0.0;
        self.silence_start = None;
        self.last_prob = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vad::model::EnergyVadModel;

    fn engine() -> VadEngine {
        VadEngine::new(VadConfig::default(), Box::new(EnergyVadModel::default())).unwrap()
    }

    fn tone_chunk(n_samples: usize, amplitude: f32) -> AudioChunk {
        let samples: Vec<f32> = (0..n_samples)
            .map(|i| (i as f32 * 0.3).sin() * amplitude)
            .collect();
        AudioChunk::mono(samples, 16000)
    }

    #[test]
    fn silence_only_yields_no_events() {
        let mut engine = engine();
        let events = engine.push(&AudioChunk::mono(vec![0.0; 16000], 16000)).unwrap();
        assert!(events.is_empty());
    }

    #[test]
    fn sustained_speech_yields_partial_then_flush_final() {
        let mut engine = engine();
        // ~0.5s of loud tone: well above min_speech_duration (250ms).
        let events = engine.push(&tone_chunk(8000, 0.9)).unwrap();
        assert!(events.iter().all(|e| e.is_partial));
        assert!(!events.is_empty());

        let flushed = engine.flush().unwrap();
        let flushed = flushed.expect("sufficient speech duration should flush a final segment");
        assert!(!flushed.is_partial);
        assert!(flushed.segment.end_sec > flushed.segment.start_sec);
    }

    #[test]
    fn short_speech_burst_is_discarded_on_flush() {
        let mut engine = engine();
        // One frame (~32ms) of tone: below min_speech_duration.
        engine.push(&tone_chunk(FRAME_SIZE, 0.9)).unwrap();
        let flushed = engine.flush().unwrap();
        assert!(flushed.is_none());
    }

    #[test]
    fn speech_then_silence_emits_final_without_flush() {
        let mut engine = engine();
        // 0.5s speech then 0.5s silence: silence exceeds min_silence_duration (100ms).
        let mut events = engine.push(&tone_chunk(8000, 0.9)).unwrap();
        events.extend(engine.push(&AudioChunk::mono(vec![0.0; 8000], 16000)).unwrap());

        let finals: Vec<_> = events.iter().filter(|e| !e.is_partial).collect();
        assert_eq!(finals.len(), 1);
    }

    #[test]
    fn reset_returns_to_idle_at_time_zero() {
        let mut engine = engine();
        engine.push(&tone_chunk(8000, 0.9)).unwrap();
        engine.reset();
        assert_eq!(engine.state, State::Idle);
        assert_eq!(engine.current_time, 0.0);
    }
}
