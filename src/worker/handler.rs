//! One request in, exactly one response out

use crate::analysis::TrackAnalyzer;
use crate::error::AnalysisError;
use crate::model::{
    AnalysisRequest, AnalysisResponse, ErrorResponse, InboundMessage, OutboundMessage, RequestId,
};
use std::panic::{self, AssertUnwindSafe};

/// Handle one inbound message
///
/// Validation failures, analyzer errors and panics all become an
/// [`ErrorResponse`] carrying the request id.
pub fn handle_message<A: TrackAnalyzer + ?Sized>(analyzer: &A, message: InboundMessage) -> OutboundMessage {
    match message {
        InboundMessage::Analyze(request) => handle_request(analyzer, &request),
    }
}

fn handle_request<A: TrackAnalyzer + ?Sized>(analyzer: &A, request: &AnalysisRequest) -> OutboundMessage {
    let id = request.id;
    if let Err(e) = validate(request) {
        log::warn!("Rejecting request {}: {}", id, e);
        return error_response(id, e.to_string());
    }

    match panic::catch_unwind(AssertUnwindSafe(|| analyzer.analyze(request))) {
        Ok(Ok(report)) => OutboundMessage::Result(AnalysisResponse {
            id,
            report,
            duration: request.duration,
        }),
        Ok(Err(e)) => {
            log::warn!("Analysis of request {} failed: {:#}", id, e);
            error_response(id, format!("{:#}", e))
        }
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            log::warn!("Analysis of request {} panicked: {}", id, message);
            error_response(id, format!("Analysis panicked: {}", message))
        }
    }
}

fn error_response(id: RequestId, error: String) -> OutboundMessage {
    OutboundMessage::Error(ErrorResponse { id, error })
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Reject requests the analyzers cannot work with
///
/// A duration that disagrees with the buffer length is only logged; the
/// host's duration stays authoritative.
pub fn validate(request: &AnalysisRequest) -> Result<(), AnalysisError> {
    if request.mono_data.is_empty() {
        return Err(AnalysisError::EmptyBuffer);
    }
    if request.sample_rate == 0 {
        return Err(AnalysisError::InvalidSampleRate(request.sample_rate));
    }
    if !request.duration.is_finite() || request.duration <= 0.0 {
        return Err(AnalysisError::InvalidDuration(request.duration));
    }
    if let Some(index) = request.mono_data.iter().position(|s| !s.is_finite()) {
        return Err(AnalysisError::NonFiniteSample { index });
    }

    let buffer_secs = request.mono_data.len() as f64 / request.sample_rate as f64;
    let tolerance = (request.duration * 0.05).max(1.0);
    if (buffer_secs - request.duration).abs() > tolerance {
        log::warn!(
            "Request {}: duration {:.2}s does not match buffer length {:.2}s",
            request.id,
            request.duration,
            buffer_secs
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::AnalysisReport;
    use anyhow::{bail, Context, Result};

    struct Failing;

    impl TrackAnalyzer for Failing {
        fn analyze(&self, _request: &AnalysisRequest) -> Result<AnalysisReport> {
            let inner: Result<AnalysisReport> = Err(anyhow::anyhow!("decoder exploded"));
            inner.context("Failed to analyze track")
        }
    }

    struct Panicking;

    impl TrackAnalyzer for Panicking {
        fn analyze(&self, request: &AnalysisRequest) -> Result<AnalysisReport> {
            if request.id > 0 {
                panic!("index out of range");
            }
            bail!("unreachable")
        }
    }

    fn request(id: u64) -> InboundMessage {
        InboundMessage::Analyze(AnalysisRequest::new(id, vec![0.1; 800], 8000))
    }

    #[test]
    fn test_validation() {
        let empty = AnalysisRequest::new(1, Vec::new(), 44100);
        assert_eq!(validate(&empty), Err(AnalysisError::EmptyBuffer));

        let no_rate = AnalysisRequest::new(1, vec![0.0; 10], 0).with_duration(1.0);
        assert_eq!(validate(&no_rate), Err(AnalysisError::InvalidSampleRate(0)));

        let no_duration = AnalysisRequest::new(1, vec![0.0; 10], 44100).with_duration(f64::NAN);
        assert!(matches!(validate(&no_duration), Err(AnalysisError::InvalidDuration(_))));

        let mut samples = vec![0.0; 10];
        samples[7] = f32::INFINITY;
        let bad_sample = AnalysisRequest::new(1, samples, 10);
        assert_eq!(validate(&bad_sample), Err(AnalysisError::NonFiniteSample { index: 7 }));

        // Mismatched duration is tolerated
        let mismatch = AnalysisRequest::new(1, vec![0.0; 8000], 8000).with_duration(30.0);
        assert!(validate(&mismatch).is_ok());
    }

    #[test]
    fn test_error_carries_context_chain() {
        let response = handle_message(&Failing, request(7));
        match response {
            OutboundMessage::Error(e) => {
                assert_eq!(e.id, 7);
                assert_eq!(e.error, "Failed to analyze track: decoder exploded");
            }
            other => panic!("expected error, got {:?}", other),
        }
    }

    #[test]
    fn test_panic_becomes_error_response() {
        let response = handle_message(&Panicking, request(9));
        assert!(response.is_error());
        assert_eq!(response.id(), 9);
        if let OutboundMessage::Error(e) = response {
            assert!(e.error.contains("index out of range"));
        }
    }

    #[test]
    fn test_invalid_request_is_rejected_before_analysis() {
        let message = InboundMessage::Analyze(AnalysisRequest::new(3, Vec::new(), 8000));
        // Panicking would panic if it were reached
        let response = handle_message(&Panicking, message);
        match response {
            OutboundMessage::Error(e) => assert_eq!(e.error, "Audio buffer is empty"),
            other => panic!("expected error, got {:?}", other),
        }
    }
}
