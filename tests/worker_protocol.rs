mod common;

use anyhow::Result;
use automix_analyzer::model::{
    AnalysisReport, AnalysisRequest, InboundMessage, OutboundMessage, OutroType,
};
use automix_analyzer::{AnalysisError, AnalysisWorker, AutoMixAnalyzer, TrackAnalyzer};
use common::{sine_bed, silence};

/// Real analyzer that panics on one specific request
struct PanicsOn(u64);

impl TrackAnalyzer for PanicsOn {
    fn analyze(&self, request: &AnalysisRequest) -> Result<AnalysisReport> {
        if request.id == self.0 {
            panic!("window index out of range");
        }
        AutoMixAnalyzer::new().analyze(request)
    }
}

#[test]
fn test_round_trip() {
    let worker = AnalysisWorker::spawn("round-trip", AutoMixAnalyzer::new()).unwrap();
    let request = AnalysisRequest::new(42, sine_bed(440.0, 0.5, 16000, 12.0), 16000);

    match worker.analyze(request).unwrap() {
        OutboundMessage::Result(response) => {
            assert_eq!(response.id, 42);
            assert_eq!(response.duration, 12.0);
            assert!(response.report.outro.is_some());
            assert!(response.report.intro.is_some());
        }
        OutboundMessage::Error(e) => panic!("unexpected error: {}", e.error),
    }
    worker.shutdown();
}

#[test]
fn test_error_keeps_request_id() {
    let worker = AnalysisWorker::spawn("errors", AutoMixAnalyzer::new()).unwrap();
    let response = worker
        .analyze(AnalysisRequest::new(77, Vec::new(), 44100))
        .unwrap();
    assert!(response.is_error());
    assert_eq!(response.id(), 77);
}

#[test]
fn test_worker_survives_a_panic() {
    let worker = AnalysisWorker::spawn("survivor", PanicsOn(2)).unwrap();
    for id in 1..=3 {
        let request = AnalysisRequest::new(id, silence(8000, 12.0), 8000).with_bpm(false);
        worker.submit(InboundMessage::Analyze(request)).unwrap();
    }

    let responses: Vec<OutboundMessage> = (0..3).map(|_| worker.recv().unwrap()).collect();
    assert_eq!(responses.iter().map(|r| r.id()).collect::<Vec<_>>(), vec![1, 2, 3]);
    assert!(!responses[0].is_error());
    assert!(responses[1].is_error());
    assert!(!responses[2].is_error());

    if let OutboundMessage::Result(response) = &responses[2] {
        assert_eq!(
            response.report.outro.as_ref().map(|o| o.outro_type),
            Some(OutroType::Silence)
        );
    }
    assert!(matches!(&responses[1], OutboundMessage::Error(e) if e.error.contains("window index out of range")));
}

#[test]
fn test_shutdown_joins_worker() {
    let worker = AnalysisWorker::spawn("closing", AutoMixAnalyzer::new()).unwrap();
    assert_eq!(worker.name(), "closing");
    assert_eq!(worker.try_recv(), Ok(None));
    worker.shutdown();
    assert_eq!(
        AnalysisError::WorkerDisconnected.to_string(),
        "Analysis worker is no longer running"
    );
}

#[test]
fn test_inbound_json_format() {
    let json = r#"{"type":"analyze","id":5,"monoData":[0.0,0.5,-0.5],"sampleRate":8000,"duration":0.000375,"analyzeBPM":false}"#;
    let message: InboundMessage = serde_json::from_str(json).unwrap();
    let InboundMessage::Analyze(request) = &message;
    assert_eq!(request.id, 5);
    assert_eq!(request.mono_data, vec![0.0, 0.5, -0.5]);
    assert_eq!(request.sample_rate, 8000);
    assert!(!request.analyze_bpm);

    let back = serde_json::to_value(&message).unwrap();
    assert_eq!(back["type"], "analyze");
    assert_eq!(back["analyzeBPM"], false);
    assert_eq!(back["monoData"][1], 0.5);
}

#[test]
fn test_outbound_json_format() {
    let worker = AnalysisWorker::spawn("json", AutoMixAnalyzer::new()).unwrap();
    let request = AnalysisRequest::new(9, sine_bed(440.0, 0.5, 8000, 3.0), 8000);
    let response = worker.analyze(request).unwrap();

    let value = serde_json::to_value(&response).unwrap();
    assert_eq!(value["type"], "result");
    assert_eq!(value["id"], 9);
    assert_eq!(value["duration"], 3.0);
    assert!(value["volume"]["estimatedLUFS"].is_number());
    assert!(value["volume"]["gainAdjustment"].is_number());
    assert!(value["energy"]["energyPerSecond"].is_array());
    assert!(value["bpm"].is_null());
    assert!(value["outro"].is_null());
    assert!(value["intro"].is_null());
    assert_eq!(value["fingerprint"]["bands"].as_array().unwrap().len(), 8);

    let parsed: OutboundMessage = serde_json::from_value(value).unwrap();
    assert_eq!(parsed, response);

    let error = worker.analyze(AnalysisRequest::new(10, Vec::new(), 8000)).unwrap();
    let value = serde_json::to_value(&error).unwrap();
    assert_eq!(value["type"], "error");
    assert_eq!(value["id"], 10);
    assert_eq!(value["error"], "Audio buffer is empty");
}
