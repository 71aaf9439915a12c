//! Intro shape: how long the track stays quiet and how long it takes to build

use super::config::IntroConfig;
use super::multiband;
use crate::dsp::stats::mean;
use crate::model::{EnergyAnalysis, IntroAnalysis};

/// Describe the opening of a track from its energy envelope
///
/// Returns `None` for tracks shorter than `config.min_duration` or with
/// fewer than four seconds of energy data.
pub fn analyze_intro(
    samples: &[f32],
    sample_rate: u32,
    duration: f64,
    energy: &EnergyAnalysis,
    config: &IntroConfig,
) -> Option<IntroAnalysis> {
    let envelope = &energy.energy_per_second;
    if duration < config.min_duration || envelope.len() < 4 {
        return None;
    }

    let average = energy.average_energy;
    let scan = config.scan_secs.min(envelope.len());
    let quiet_intro_duration =
        sustained_crossing(envelope, average * config.quiet_threshold, config.scan_secs);
    let energy_build_duration =
        sustained_crossing(envelope, average * config.build_threshold, config.scan_secs);
    let intro_energy_ratio = if average > 0.0 {
        mean(&envelope[..scan]) / average
    } else {
        0.0
    };

    let intro_end = (config.scan_secs as f64 * sample_rate as f64) as usize;
    let series = multiband::analyze_region(
        samples,
        sample_rate,
        0,
        intro_end.min(samples.len()),
        0,
        config.window_secs,
    );
    let multiband_energy = (series.len() >= 4).then_some(series.energy);

    log::debug!(
        "Intro: quiet {:.0}s, build {:.0}s, ratio {:.2}",
        quiet_intro_duration,
        energy_build_duration,
        intro_energy_ratio
    );

    Some(IntroAnalysis {
        quiet_intro_duration,
        energy_build_duration,
        intro_energy_ratio,
        multiband_energy,
    })
}

/// First second `i < limit` where seconds `i` and `i + 1` both exceed `threshold`
///
/// Falls back to `min(limit, len)` when the envelope never crosses.
fn sustained_crossing(envelope: &[f64], threshold: f64, limit: usize) -> f64 {
    let end = limit.min(envelope.len().saturating_sub(1));
    (0..end)
        .find(|&i| envelope[i] > threshold && envelope[i + 1] > threshold)
        .unwrap_or_else(|| limit.min(envelope.len())) as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn energy_with(envelope: Vec<f64>) -> EnergyAnalysis {
        let average_energy = mean(&envelope);
        EnergyAnalysis {
            energy_per_second: envelope,
            outro_start_offset: 3.0,
            intro_end_offset: 0.0,
            average_energy,
            trailing_silence: 0.0,
            is_fade_out: false,
        }
    }

    #[test]
    fn test_build_up_intro() {
        // 4 quiet seconds, 4 building, then full level
        let mut envelope = vec![0.05; 4];
        envelope.extend([0.3, 0.4, 0.6, 0.7]);
        envelope.extend(vec![1.0; 52]);
        let energy = energy_with(envelope);
        let samples = vec![0.0f32; 8000 * 60];

        let intro = analyze_intro(&samples, 8000, 60.0, &energy, &IntroConfig::default()).unwrap();
        // average ~0.9: 50% crossed at second 6, 80% at second 8
        assert_eq!(intro.quiet_intro_duration, 6.0);
        assert_eq!(intro.energy_build_duration, 8.0);
        assert!(intro.intro_energy_ratio < 1.0);
        // 20 s at 250 ms
        assert_eq!(intro.multiband_energy.unwrap().len(), 80);
    }

    #[test]
    fn test_single_spike_does_not_end_intro() {
        let mut envelope = vec![0.05; 30];
        envelope[2] = 1.0;
        envelope[10] = 1.0;
        envelope[11] = 1.0;
        let energy = energy_with(envelope);
        assert_eq!(
            sustained_crossing(&energy.energy_per_second, 0.5, 20),
            10.0
        );
    }

    #[test]
    fn test_never_crossing_uses_scan_limit() {
        assert_eq!(sustained_crossing(&[0.1; 30], 0.5, 20), 20.0);
        assert_eq!(sustained_crossing(&[0.1; 6], 0.5, 20), 6.0);
    }

    #[test]
    fn test_short_track_has_no_intro() {
        let energy = energy_with(vec![1.0; 4]);
        let samples = vec![0.0f32; 8000 * 4];
        assert!(analyze_intro(&samples, 8000, 4.0, &energy, &IntroConfig::default()).is_none());
    }

    #[test]
    fn test_silent_track_ratio_is_zero() {
        let energy = energy_with(vec![0.0; 10]);
        let samples = vec![0.0f32; 8000 * 10];
        let intro = analyze_intro(&samples, 8000, 10.0, &energy, &IntroConfig::default()).unwrap();
        assert_eq!(intro.intro_energy_ratio, 0.0);
        assert_eq!(intro.quiet_intro_duration, 10.0);
    }
}
