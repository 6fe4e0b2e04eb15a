//! The VAD model contract. The real backend (an LSTM-based classifier such
//! as Silero) is an out-of-scope external collaborator; this module defines
//! the shim trait the engine drives and a deterministic test backend.

use super::types::{VadCarryState, VadError, FRAME_SIZE};

/// A speech-probability model over fixed-size frames, threading opaque
/// carry state across calls the way a recurrent model's hidden state is
/// threaded across frames.
pub trait VadModel: Send {
    /// Runs inference on one `FRAME_SIZE`-sample frame, returning the
    /// speech probability and updated carry state.
    fn run(&mut self, frame: &[f32], carry: VadCarryState) -> Result<(f32, VadCarryState), VadError>;

    /// Re-zeros any internal state (distinct from the caller-held carry,
    /// which the engine resets separately).
    fn reset(&mut self);
}

/// Energy-threshold test backend: probability is the frame's RMS energy
/// mapped through a soft saturation curve. Deterministic and fast, standing
/// in for the real ONNX/LSTM model this module does not implement.
pub struct EnergyVadModel {
    gain: f32,
}

impl Default for EnergyVadModel {
    fn default() -> Self {
        Self { gain: 8.0 }
    }
}

impl EnergyVadModel {
    pub fn new(gain: f32) -> Self {
        Self { gain }
    }
}

impl VadModel for EnergyVadModel {
    fn run(&mut self, frame: &[f32], carry: VadCarryState) -> Result<(f32, VadCarryState), VadError> {
        if frame.len() != FRAME_SIZE {
            return Err(VadError::InferenceFailed {
                reason: format!("expected frame of {FRAME_SIZE} samples, got {}", frame.len()),
                context: Default::default(),
            });
        }
        let energy = (frame.iter().map(|s| s * s).sum::<f32>() / frame.len() as f32).sqrt();
        let prob = 1.0 - (-self.gain * energy).exp();
        Ok((prob.clamp(0.0, 1.0), carry))
    }

    fn reset(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn silence_yields_low_probability() {
        let mut model = EnergyVadModel::default();
        let frame = vec![0.0f32; FRAME_SIZE];
        let (p, _) = model.run(&frame, VadCarryState::default()).unwrap();
        assert!(p < 0.1, "p={p}");
    }

    #[test]
    fn loud_tone_yields_high_probability() {
        let mut model = EnergyVadModel::default();
        let frame: Vec<f32> = (0..FRAME_SIZE)
            .map(|i| (i as f32 * 0.3).sin() * 0.8)
            .collect();
        let (p, _) = model.run(&frame, VadCarryState::default()).unwrap();
        assert!(p > 0.5, "p={p}");
    }

    #[test]
    fn rejects_wrong_frame_size() {
        let mut model = EnergyVadModel::default();
        assert!(model.run(&[0.0; 10], VadCarryState::default()).is_err());
    }
}
