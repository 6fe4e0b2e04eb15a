//! Voice activity detection: a fixed-frame state machine with LSTM-style
//! carry state, hysteresis, padding, and flush-on-end semantics.

pub mod engine;
pub mod model;
pub mod types;

pub use engine::VadEngine;
pub use model::{EnergyVadModel, VadModel};
pub use types::{VadCarryState, VadConfig, VadError, VadEvent, VadSegment};
