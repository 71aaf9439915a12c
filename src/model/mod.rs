//! Data model shared by the analyzers and the worker protocol
//!
//! All records are plain values produced once per request; nothing here
//! outlives the response it is sent in.

mod analysis;
mod message;

pub use analysis::{
    AnalysisReport, BpmResult, EnergyAnalysis, IntroAnalysis, MultibandEnergy, OutroAnalysis,
    OutroType, SpectralFingerprint, VolumeAnalysis, FINGERPRINT_BANDS,
};
pub use message::{
    AnalysisRequest, AnalysisResponse, ErrorResponse, InboundMessage, OutboundMessage, RequestId,
};
