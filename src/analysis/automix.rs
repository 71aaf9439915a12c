//! Full AutoMix analysis pipeline
//!
//! Runs every analyzer over one decoded track in dependency order:
//! volume and energy first, then tempo and fingerprint, then the outro and
//! intro analyzers that build on the energy envelope.

use super::config::AnalyzerConfig;
use super::traits::TrackAnalyzer;
use super::{bpm, energy, fingerprint, intro, outro, volume};
use crate::model::{AnalysisReport, AnalysisRequest};
use anyhow::Result;

/// Analyzer producing a complete [`AnalysisReport`]
#[derive(Debug, Clone, Default)]
pub struct AutoMixAnalyzer {
    config: AnalyzerConfig,
}

impl AutoMixAnalyzer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: AnalyzerConfig) -> Self {
        Self { config }
    }

    /// Set the tempo search range
    pub fn with_bpm_range(mut self, min: f64, max: f64) -> Self {
        self.config = self.config.with_bpm_range(min, max);
        self
    }

    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }
}

impl TrackAnalyzer for AutoMixAnalyzer {
    fn analyze(&self, request: &AnalysisRequest) -> Result<AnalysisReport> {
        let samples = &request.mono_data;
        let sample_rate = request.sample_rate;
        let duration = request.duration;
        log::debug!(
            "Analyzing request {}: {} samples @ {} Hz ({:.1}s)",
            request.id,
            samples.len(),
            sample_rate,
            duration
        );

        let volume = volume::analyze_volume(samples, &self.config.volume);
        let energy = energy::analyze_energy(samples, sample_rate, duration, &self.config.energy);

        let bpm = if request.analyze_bpm {
            bpm::detect_bpm(samples, sample_rate, duration, &self.config.bpm)
        } else {
            None
        };
        let fingerprint = fingerprint::compute_fingerprint(samples, sample_rate);

        let outro = outro::analyze_outro(samples, sample_rate, duration, &energy, &self.config.outro);
        let intro = intro::analyze_intro(samples, sample_rate, duration, &energy, &self.config.intro);

        log::info!(
            "Request {}: {:.1} LUFS (gain {:.2}), {}, outro {}, crossfade at {}",
            request.id,
            volume.estimated_lufs,
            volume.gain_adjustment,
            bpm.as_ref()
                .map(|b| format!("{:.1} BPM ({:.2})", b.bpm, b.confidence))
                .unwrap_or_else(|| "no tempo".to_string()),
            outro
                .as_ref()
                .map(|o| o.outro_type.name())
                .unwrap_or("n/a"),
            outro
                .as_ref()
                .map(|o| format!("{:.1}s", o.suggested_crossfade_start))
                .unwrap_or_else(|| "n/a".to_string()),
        );

        Ok(AnalysisReport {
            volume,
            energy,
            bpm,
            fingerprint,
            outro,
            intro,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tone(secs: f64, sample_rate: u32) -> Vec<f32> {
        let n = (secs * sample_rate as f64) as usize;
        (0..n)
            .map(|i| {
                let t = i as f64 / sample_rate as f64;
                (0.5 * (2.0 * std::f64::consts::PI * 440.0 * t).sin()) as f32
            })
            .collect()
    }

    #[test]
    fn test_bpm_can_be_skipped() {
        let request = AnalysisRequest::new(1, tone(12.0, 8000), 8000).with_bpm(false);
        let report = AutoMixAnalyzer::new().analyze(&request).unwrap();
        assert!(report.bpm.is_none());
        assert!(report.outro.is_some());
        assert!(report.intro.is_some());
    }

    #[test]
    fn test_short_track_has_only_basic_analysis() {
        let request = AnalysisRequest::new(2, tone(3.0, 8000), 8000);
        let report = AutoMixAnalyzer::new().analyze(&request).unwrap();
        assert!(report.bpm.is_none());
        assert!(report.outro.is_none());
        assert!(report.intro.is_none());
        assert_eq!(report.energy.energy_per_second.len(), 3);
        assert!(report.volume.rms > 0.3);
    }

    #[test]
    fn test_with_bpm_range() {
        let analyzer = AutoMixAnalyzer::new().with_bpm_range(80.0, 160.0);
        assert_eq!(analyzer.config().bpm.min_bpm, 80.0);
        assert_eq!(analyzer.config().bpm.max_bpm, 160.0);
    }
}
