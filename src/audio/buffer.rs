//! Chunked audio buffer: O(1) append, O(range) time-indexed extraction,
//! O(1) eviction, and a size cap.
//!
//! Samples are stored as a list of chunks rather than a single growing
//! vector so that `append` never needs to copy existing data. `extract_range`
//! walks the chunk list, copying only the overlap with the requested range.

use super::types::AudioError;
use std::collections::VecDeque;

struct Chunk {
    samples: Vec<f32>,
    /// Absolute sample index of `samples[0]`.
    start_index: u64,
}

impl Chunk {
    fn end_index(&self) -> u64 {
        self.start_index + self.samples.len() as u64
    }
}

/// A growable, evictable store of audio samples indexed by absolute sample
/// position from stream start. `start_sample_index + total_samples ==
/// end_sample_index` holds after every operation.
pub struct ChunkedAudioBuffer {
    sample_rate: u32,
    max_samples: u64,
    min_retain_samples: u64,
    chunks: VecDeque<Chunk>,
    /// Absolute index of the oldest sample still resident.
    start_sample_index: u64,
    /// Absolute index one past the newest sample appended.
    end_sample_index: u64,
}

impl ChunkedAudioBuffer {
    pub fn new(sample_rate: u32, max_samples: u64, min_retain_samples: u64) -> Self {
        Self {
            sample_rate,
            max_samples,
            min_retain_samples,
            chunks: VecDeque::new(),
            start_sample_index: 0,
            end_sample_index: 0,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn start_sample_index(&self) -> u64 {
        self.start_sample_index
    }

    pub fn end_sample_index(&self) -> u64 {
        self.end_sample_index
    }

    pub fn total_samples(&self) -> u64 {
        self.end_sample_index - self.start_sample_index
    }

    pub fn start_time(&self) -> f64 {
        self.start_sample_index as f64 / self.sample_rate as f64
    }

    pub fn end_time(&self) -> f64 {
        self.end_sample_index as f64 / self.sample_rate as f64
    }

    pub fn is_empty_buffer(&self) -> bool {
        self.total_samples() == 0
    }

    /// Sample rate may only be changed when the buffer holds no data;
    /// otherwise indexing would no longer correspond to a single rate.
    pub fn set_sample_rate(&mut self, sample_rate: u32) -> Result<(), AudioError> {
        if !self.is_empty_buffer() {
            return Err(AudioError::NonEmptyRateMutation {
                context: Default::default(),
            });
        }
        self.sample_rate = sample_rate;
        Ok(())
    }

    /// Appends a defensive copy of `samples` as a new chunk (O(1) besides
    /// the copy itself), then evicts oldest data past `max_samples`.
    pub fn append(&mut self, samples: &[f32]) {
        if samples.is_empty() {
            return;
        }
        let start_index = self.end_sample_index;
        self.chunks.push_back(Chunk {
            samples: samples.to_vec(),
            start_index,
        });
        self.end_sample_index += samples.len() as u64;
        self.enforce_max_samples();
    }

    fn enforce_max_samples(&mut self) {
        if self.total_samples() <= self.max_samples {
            return;
        }
        let target_start = self.end_sample_index - self.max_samples;
        self.evict_before_index(target_start);
    }

    /// Drops whole chunks entirely before absolute sample `floor(t * sr)`,
    /// splitting the oldest remaining chunk if needed. Always keeps at
    /// least `min_retain_samples`.
    pub fn evict_before(&mut self, t_sec: f64) {
        let target = (t_sec * self.sample_rate as f64).floor().max(0.0) as u64;
        self.evict_before_index(target);
    }

    fn evict_before_index(&mut self, target: u64) {
        let floor = self
            .end_sample_index
            .saturating_sub(self.min_retain_samples);
        let target = target.min(floor).max(self.start_sample_index);

        while let Some(front) = self.chunks.front() {
            if front.end_index() <= target {
                self.chunks.pop_front();
                continue;
            }
            if front.start_index < target {
                let drop = (target - front.start_index) as usize;
                let front = self.chunks.front_mut().unwrap();
                front.samples.drain(0..drop);
                front.start_index = target;
            }
            break;
        }
        self.start_sample_index = target;
    }

    /// Returns an owned copy of samples whose absolute indices fall in
    /// `[floor(start_sec*sr), ceil(end_sec*sr))`, clamped to resident data.
    /// A request entirely before `start_sample_index` yields an empty
    /// vector for that portion (no error).
    pub fn extract_range(&self, start_sec: f64, end_sec: f64) -> Vec<f32> {
        if end_sec <= start_sec {
            return Vec::new();
        }
        let req_start = (start_sec * self.sample_rate as f64).floor().max(0.0) as u64;
        let req_end = (end_sec * self.sample_rate as f64).ceil().max(0.0) as u64;

        let clamped_start = req_start.max(self.start_sample_index);
        let clamped_end = req_end.min(self.end_sample_index);
        if clamped_end <= clamped_start {
            return Vec::new();
        }

        let mut out = Vec::with_capacity((clamped_end - clamped_start) as usize);
        for chunk in &self.chunks {
            if chunk.end_index() <= clamped_start {
                continue;
            }
            if chunk.start_index >= clamped_end {
                break;
            }
            let lo = clamped_start.max(chunk.start_index) - chunk.start_index;
            let hi = clamped_end.min(chunk.end_index()) - chunk.start_index;
            out.extend_from_slice(&chunk.samples[lo as usize..hi as usize]);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_holds_after_append_and_evict() {
        let mut buf = ChunkedAudioBuffer::new(16000, 1_000_000, 0);
        buf.append(&vec![0.0; 100]);
        buf.append(&vec![0.0; 200]);
        buf.evict_before(0.005); // 80 samples
        assert_eq!(
            buf.start_sample_index() + buf.total_samples(),
            buf.end_sample_index()
        );
    }

    #[test]
    fn extract_range_returns_resident_content() {
        let mut buf = ChunkedAudioBuffer::new(16000, 1_000_000, 0);
        let a: Vec<f32> = (0..100).map(|i| i as f32).collect();
        let b: Vec<f32> = (100..200).map(|i| i as f32).collect();
        buf.append(&a);
        buf.append(&b);

        let extracted = buf.extract_range(50.0 / 16000.0, 150.0 / 16000.0);
        let expected: Vec<f32> = (50..150).map(|i| i as f32).collect();
        assert_eq!(extracted, expected);
    }

    #[test]
    fn extract_range_partially_evicted_returns_only_tail() {
        let mut buf = ChunkedAudioBuffer::new(16000, 1_000_000, 0);
        let samples: Vec<f32> = (0..200).map(|i| i as f32).collect();
        buf.append(&samples);
        buf.evict_before(100.0 / 16000.0);

        let extracted = buf.extract_range(0.0, 150.0 / 16000.0);
        let expected: Vec<f32> = (100..150).map(|i| i as f32).collect();
        assert_eq!(extracted, expected);
    }

    #[test]
    fn enforces_max_samples_cap() {
        let mut buf = ChunkedAudioBuffer::new(16000, 50, 0);
        buf.append(&vec![1.0; 100]);
        assert_eq!(buf.total_samples(), 50);
        assert_eq!(buf.start_sample_index(), 50);
    }

    #[test]
    fn rate_mutation_rejected_when_nonempty() {
        let mut buf = ChunkedAudioBuffer::new(16000, 1000, 0);
        buf.append(&[0.0; 10]);
        assert!(buf.set_sample_rate(48000).is_err());
    }

    #[test]
    fn rate_mutation_allowed_when_empty() {
        let mut buf = ChunkedAudioBuffer::new(16000, 1000, 0);
        assert!(buf.set_sample_rate(48000).is_ok());
    }

    #[test]
    fn extraction_is_idempotent() {
        let mut buf = ChunkedAudioBuffer::new(16000, 1_000_000, 0);
        buf.append(&vec![1.0, 2.0, 3.0, 4.0, 5.0]);
        let first = buf.extract_range(0.0, 5.0 / 16000.0);
        let second = buf.extract_range(0.0, 5.0 / 16000.0);
        assert_eq!(first, second);
    }
}
