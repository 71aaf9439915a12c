//! Request/response protocol between a host and an analysis worker

use super::analysis::AnalysisReport;
use serde::{Deserialize, Serialize};

/// Correlates a response with the request that produced it
pub type RequestId = u64;

/// One track to analyze
///
/// The PCM buffer is moved into the worker, never copied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisRequest {
    pub id: RequestId,

    /// Decoded mono samples, nominally in [-1, 1]
    pub mono_data: Vec<f32>,

    pub sample_rate: u32,

    /// Track duration in seconds as known by the host
    pub duration: f64,

    /// Whether to run tempo detection
    #[serde(rename = "analyzeBPM")]
    pub analyze_bpm: bool,
}

impl AnalysisRequest {
    pub fn new(id: RequestId, mono_data: Vec<f32>, sample_rate: u32) -> Self {
        let duration = if sample_rate > 0 {
            mono_data.len() as f64 / sample_rate as f64
        } else {
            0.0
        };
        Self {
            id,
            mono_data,
            sample_rate,
            duration,
            analyze_bpm: true,
        }
    }

    /// Override the duration reported by the host
    pub fn with_duration(mut self, duration: f64) -> Self {
        self.duration = duration;
        self
    }

    pub fn with_bpm(mut self, analyze_bpm: bool) -> Self {
        self.analyze_bpm = analyze_bpm;
        self
    }
}

/// Messages a worker accepts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum InboundMessage {
    Analyze(AnalysisRequest),
}

impl InboundMessage {
    pub fn id(&self) -> RequestId {
        match self {
            InboundMessage::Analyze(request) => request.id,
        }
    }
}

/// Successful analysis of one request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResponse {
    pub id: RequestId,

    #[serde(flatten)]
    pub report: AnalysisReport,

    pub duration: f64,
}

/// A request that faulted; no partial result is ever returned
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub id: RequestId,
    pub error: String,
}

/// Messages a worker emits, exactly one per inbound message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum OutboundMessage {
    Result(AnalysisResponse),
    Error(ErrorResponse),
}

impl OutboundMessage {
    pub fn id(&self) -> RequestId {
        match self {
            OutboundMessage::Result(response) => response.id,
            OutboundMessage::Error(error) => error.id,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, OutboundMessage::Error(_))
    }
}
