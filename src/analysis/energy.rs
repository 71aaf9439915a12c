//! Per-second energy envelope, trailing silence and coarse intro/outro offsets

use super::config::EnergyConfig;
use crate::dsp::stats::{mean, rms, round1};
use crate::model::EnergyAnalysis;

/// Build the energy envelope of a track
///
/// Normalization uses only the content seconds so a long silent tail does
/// not skew the scale.
pub fn analyze_energy(
    samples: &[f32],
    sample_rate: u32,
    duration: f64,
    config: &EnergyConfig,
) -> EnergyAnalysis {
    let chunk = (sample_rate as usize).max(1);
    let raw: Vec<f64> = samples.chunks(chunk).map(rms).collect();

    let content_end = find_content_end(samples, sample_rate, config);
    let (trailing_silence, content_secs) = match content_end {
        Some(end) => (
            round1((samples.len() - end) as f64 / sample_rate as f64),
            end.div_ceil(chunk).min(raw.len()),
        ),
        None => (duration, 0),
    };

    let max_rms = raw[..content_secs].iter().copied().fold(0.0f64, f64::max);
    let energy_per_second: Vec<f64> = raw
        .iter()
        .map(|&r| if max_rms > 0.0 { (r / max_rms).min(1.0) } else { 0.0 })
        .collect();
    let content = &energy_per_second[..content_secs];
    let average_energy = mean(content);

    // Seconds between the last energetic second and the content end
    let outro_threshold = average_energy * config.outro_threshold;
    let tail_secs = match (0..content_secs).rev().find(|&i| content[i] > outro_threshold) {
        Some(i) => content_secs - 1 - i,
        None => content_secs,
    };
    let outro_start_offset = (tail_secs as f64 + trailing_silence).max(config.min_outro_offset);

    let intro_threshold = average_energy * config.intro_threshold;
    let intro_end_offset = (0..content_secs.min(config.intro_scan_secs))
        .find(|&i| content[i] > intro_threshold)
        .map(|i| i as f64)
        .unwrap_or(0.0)
        .clamp(0.0, config.max_intro_offset);

    let fade_window = tail_secs.max(config.fade_window_secs).min(content_secs);
    let is_fade_out = is_gradual_decline(&content[content_secs - fade_window..], config.fade_ratio);

    log::debug!(
        "Energy: {} s, content {} s, avg={:.3}, trailing silence {:.1} s, outro offset {:.1} s, fade={}",
        energy_per_second.len(),
        content_secs,
        average_energy,
        trailing_silence,
        outro_start_offset,
        is_fade_out
    );

    EnergyAnalysis {
        energy_per_second,
        outro_start_offset,
        intro_end_offset,
        average_energy,
        trailing_silence,
        is_fade_out,
    }
}

/// End of the audible content in samples, or `None` when the whole buffer is below the floor
///
/// Scans backward in fixed windows; the first window above the floor marks
/// the end of content.
pub fn find_content_end(samples: &[f32], sample_rate: u32, config: &EnergyConfig) -> Option<usize> {
    let window = ((sample_rate as f64 * config.silence_window_secs) as usize).max(1);
    let mut end = samples.len();
    while end > 0 {
        let start = end.saturating_sub(window);
        if rms(&samples[start..end]) > config.silence_threshold {
            return Some(end);
        }
        end = start;
    }
    None
}

/// Gradual decline: end well below start, midpoint strictly in between
fn is_gradual_decline(window: &[f64], fade_ratio: f64) -> bool {
    if window.len() <= 5 {
        return false;
    }
    let n = window.len();
    let start = mean(&window[..2]);
    let end = mean(&window[n - 2..]);
    let mid = mean(&window[n / 2 - 1..=n / 2]);

    start > 0.0 && end / start < fade_ratio && end < mid && mid < start
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    const SR: u32 = 8000;

    fn tone(secs: f64, amp: impl Fn(f64) -> f32) -> Vec<f32> {
        let n = (secs * SR as f64) as usize;
        (0..n)
            .map(|i| {
                let t = i as f64 / SR as f64;
                amp(t) * (2.0 * PI * 440.0 * t as f32).sin()
            })
            .collect()
    }

    #[test]
    fn test_trailing_silence_and_outro_offset() {
        let mut samples = tone(20.0, |_| 0.5);
        samples.extend(vec![0.0; 5 * SR as usize]);

        let energy = analyze_energy(&samples, SR, 25.0, &EnergyConfig::default());
        assert_eq!(energy.energy_per_second.len(), 25);
        assert!((energy.trailing_silence - 5.0).abs() < 1e-9);
        assert!((energy.outro_start_offset - 5.0).abs() < 1e-9);
        assert_eq!(energy.intro_end_offset, 0.0);
        assert!((energy.average_energy - 1.0).abs() < 0.01);
        assert!(!energy.is_fade_out);
        // Silence seconds normalize to zero
        assert_eq!(energy.energy_per_second[24], 0.0);
    }

    #[test]
    fn test_all_silent_track() {
        let samples = vec![0.0f32; 12 * SR as usize];
        let energy = analyze_energy(&samples, SR, 12.0, &EnergyConfig::default());
        assert_eq!(energy.trailing_silence, 12.0);
        assert_eq!(energy.average_energy, 0.0);
        assert!(energy.outro_start_offset >= 3.0);
        assert!(energy.energy_per_second.iter().all(|&e| e == 0.0));
    }

    #[test]
    fn test_linear_fade_is_flagged() {
        let samples = tone(30.0, |t| if t < 20.0 { 0.5 } else { 0.5 * (30.0 - t) as f32 / 10.0 });
        let energy = analyze_energy(&samples, SR, 30.0, &EnergyConfig::default());
        assert!(energy.is_fade_out);
        assert!(energy.outro_start_offset >= 3.0);
        assert!(energy.trailing_silence < 0.5);
    }

    #[test]
    fn test_quiet_intro_offset() {
        let samples = tone(30.0, |t| if t < 4.0 { 0.02 } else { 0.5 });
        let energy = analyze_energy(&samples, SR, 30.0, &EnergyConfig::default());
        assert_eq!(energy.intro_end_offset, 4.0);
    }
}
