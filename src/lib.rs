//! AutoMix Analyzer - track analysis for automatic DJ-style transitions
//!
//! This library measures loudness, energy, tempo and spectral shape of
//! decoded tracks, classifies how each track ends, and suggests where a
//! crossfade into the next track should start.

pub mod analysis;
pub mod decode;
pub mod dsp;
pub mod error;
pub mod model;
pub mod worker;

pub use analysis::{AnalyzerConfig, AutoMixAnalyzer, TrackAnalyzer};
pub use error::AnalysisError;
pub use worker::AnalysisWorker;
