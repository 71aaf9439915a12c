//! Signal-processing building blocks
//!
//! Everything here is a pure function or a small stack-local state machine;
//! nothing is shared between analysis requests.

pub mod biquad;
pub mod stats;

pub use biquad::{BandSpec, Biquad, BiquadCoefficients};
