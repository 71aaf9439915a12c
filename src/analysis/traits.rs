//! Analyzer trait

use crate::model::{AnalysisReport, AnalysisRequest};
use anyhow::Result;

/// Track analyzer trait - lets the worker run the real pipeline or a test double
pub trait TrackAnalyzer {
    /// Analyze one decoded track
    ///
    /// Insufficient data is not an error: the affected parts of the report
    /// are simply `None`.
    fn analyze(&self, request: &AnalysisRequest) -> Result<AnalysisReport>;
}

impl<T: TrackAnalyzer + ?Sized> TrackAnalyzer for Box<T> {
    fn analyze(&self, request: &AnalysisRequest) -> Result<AnalysisReport> {
        (**self).analyze(request)
    }
}
