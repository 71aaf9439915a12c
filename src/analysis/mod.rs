//! Audio analysis layer
//!
//! Each analyzer is a plain function over a mono `f32` buffer. The
//! [`TrackAnalyzer`] trait bundles them so the worker can run the real
//! pipeline or a test double.

mod automix;
pub mod bpm;
pub mod config;
pub mod energy;
pub mod fingerprint;
pub mod intro;
pub mod multiband;
pub mod outro;
mod traits;
pub mod volume;

pub use automix::AutoMixAnalyzer;
pub use config::{load_config, AnalyzerConfig};
pub use traits::TrackAnalyzer;
