//! Linear-interpolation resampling: a one-shot function and a streaming
//! variant that shares the same interpolation kernel but carries fractional
//! read position and the last input sample across calls.
//!
//! High-fidelity resampling (windowed sinc, polyphase filters) is explicitly
//! out of scope; linear interpolation is the deliberate choice here.

use super::types::AudioError;

/// One-shot linear resample from `input_rate` to `output_rate`. Produces
/// exactly `floor(N * O / I)` output samples for `N` input samples.
/// Identity rates return the input unchanged.
pub fn resample(samples: &[f32], input_rate: u32, output_rate: u32) -> Result<Vec<f32>, AudioError> {
    if input_rate == 0 {
        return Err(AudioError::invalid_sample_rate(input_rate));
    }
    if output_rate == 0 {
        return Err(AudioError::invalid_sample_rate(output_rate));
    }
    if input_rate == output_rate {
        return Ok(samples.to_vec());
    }
    if samples.is_empty() {
        return Ok(Vec::new());
    }

    let ratio = input_rate as f64 / output_rate as f64;
    let out_len = ((samples.len() as f64) * output_rate as f64 / input_rate as f64).floor() as usize;
    let mut out = Vec::with_capacity(out_len);

    for k in 0..out_len {
        let pos = k as f64 * ratio;
        out.push(interpolate(samples, pos));
    }

    Ok(out)
}

/// Samples `input` at fractional index `pos` via linear interpolation,
/// clamping to the last sample past the end of the buffer.
fn interpolate(input: &[f32], pos: f64) -> f32 {
    let i0 = pos.floor() as usize;
    let frac = (pos - pos.floor()) as f32;
    if i0 + 1 >= input.len() {
        return *input.last().unwrap();
    }
    let a = input[i0];
    let b = input[i0 + 1];
    a + (b - a) * frac
}

/// Streaming resampler: maintains a fractional read position and a
/// one-sample carry across chunked `process` calls so that splitting a
/// signal into arbitrary chunks stays within +/-1 sample length and
/// +/-0.01 amplitude of the one-shot result over the common prefix.
#[derive(Debug, Clone)]
pub struct StreamingResampler {
    input_rate: u32,
    output_rate: u32,
    /// Fractional position, in input-sample units relative to the start of
    /// the next chunk, of the next output sample.
    position: f64,
    /// The last sample of the previous chunk, used as the virtual
    /// predecessor sample when the interpolation window straddles a chunk
    /// boundary.
    carry: Option<f32>,
}

impl StreamingResampler {
    pub fn new(input_rate: u32, output_rate: u32) -> Result<Self, AudioError> {
        if input_rate == 0 {
            return Err(AudioError::invalid_sample_rate(input_rate));
        }
        if output_rate == 0 {
            return Err(AudioError::invalid_sample_rate(output_rate));
        }
        Ok(Self {
            input_rate,
            output_rate,
            position: 0.0,
            carry: None,
        })
    }

    /// Restores fresh state: zero position, no carry sample.
    pub fn reset(&mut self) {
        self.position = 0.0;
        self.carry = None;
    }

    pub fn input_rate(&self) -> u32 {
        self.input_rate
    }

    pub fn output_rate(&self) -> u32 {
        self.output_rate
    }

    /// Processes one chunk, returning as many output samples as the
    /// accumulated fractional position allows, and retaining the remainder
    /// (plus the chunk's last sample) for the next call.
    pub fn process(&mut self, chunk: &[f32]) -> Vec<f32> {
        if self.input_rate == self.output_rate {
            return chunk.to_vec();
        }
        if chunk.is_empty() {
            return Vec::new();
        }

        // Virtual buffer: [carry?] ++ chunk. `position` is expressed
        // relative to the start of the chunk proper, so we offset it by 1
        // when a carry sample is present.
        let offset = if self.carry.is_some() { 1 } else { 0 };
        let mut virtual_buf = Vec::with_capacity(chunk.len() + offset);
        if let Some(c) = self.carry {
            virtual_buf.push(c);
        }
        virtual_buf.extend_from_slice(chunk);

        let ratio = self.input_rate as f64 / self.output_rate as f64;
        let mut out = Vec::new();
        let mut pos = self.position + offset as f64;

        // Emit while the interpolation window (pos, pos+1) lies within the
        // virtual buffer, i.e. before its last sample.
        while (pos.floor() as usize) + 1 < virtual_buf.len() {
            out.push(interpolate(&virtual_buf, pos));
            pos += ratio;
        }

        // Re-express the leftover position relative to the next chunk.
        self.position = pos - offset as f64 - chunk.len() as f64;
        self.carry = chunk.last().copied();

        out
    }
}
