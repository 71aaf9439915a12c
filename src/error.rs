//! Error types

use thiserror::Error;

/// Reasons a request is rejected before or around analysis
#[derive(Debug, Error, Clone, PartialEq)]
pub enum AnalysisError {
    #[error("Audio buffer is empty")]
    EmptyBuffer,

    #[error("Invalid sample rate: {0} Hz")]
    InvalidSampleRate(u32),

    #[error("Invalid duration: {0} s")]
    InvalidDuration(f64),

    #[error("Non-finite sample at index {index}")]
    NonFiniteSample { index: usize },

    #[error("Analysis worker is no longer running")]
    WorkerDisconnected,
}
