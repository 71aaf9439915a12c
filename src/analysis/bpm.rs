//! Tempo detection on decoded PCM
//!
//! This module estimates tempo by:
//! 1. Decimating to ~11 kHz and taking a 30 s window from the middle of the track
//! 2. Building a time-domain onset envelope (rectified RMS difference)
//! 3. Autocorrelating the envelope over the lags of the allowed tempo range
//! 4. Refining the best lag with a comb over its harmonics to fix octave errors
//!
//! Everything is O(N) in the window length apart from the lag search, which
//! is bounded by the tempo range.

use super::config::BpmConfig;
use crate::dsp::stats::{mean, round1};
use crate::model::BpmResult;

/// Smoothing kernel applied to the onset envelope
const ONSET_KERNEL: [f64; 5] = [1.0, 2.0, 3.0, 2.0, 1.0];

/// Number of harmonics averaged by the comb refinement
const COMB_HARMONICS: usize = 4;

/// Detect tempo from mono samples
///
/// Returns `None` for tracks shorter than `config.min_duration` and for
/// material without any periodic energy change.
pub fn detect_bpm(
    samples: &[f32],
    sample_rate: u32,
    duration: f64,
    config: &BpmConfig,
) -> Option<BpmResult> {
    if duration < config.min_duration || sample_rate == 0 {
        return None;
    }

    let factor = ((sample_rate as f64 / config.target_rate as f64).round() as usize).max(1);
    let rate = sample_rate as f64 / factor as f64;
    let decimated: Vec<f32> = samples.iter().step_by(factor).copied().collect();

    let window_len = ((config.window_secs * rate) as usize).min(decimated.len());
    let window_start = (decimated.len() - window_len) / 2;
    let window = &decimated[window_start..window_start + window_len];
    let analysis_offset = window_start as f64 * factor as f64 / sample_rate as f64;

    log::debug!(
        "BPM: decimation x{} ({:.0} Hz), window {:.1}s at {:.1}s",
        factor,
        rate,
        window_len as f64 / rate,
        analysis_offset
    );

    let envelope = onset_envelope(window, config.frame_size, config.hop_size);
    if envelope.len() < 2 {
        return None;
    }
    let hops_per_second = rate / config.hop_size as f64;
    let acf = Autocorrelation::new(&envelope);
    let zero_lag = acf.at(0);
    if zero_lag <= 1e-18 {
        log::debug!("BPM: flat onset envelope");
        return None;
    }

    let lag_for = |bpm: f64| hops_per_second * 60.0 / bpm;
    let min_lag = (lag_for(config.max_bpm).floor() as usize).max(1);
    let max_lag = (lag_for(config.min_bpm).ceil() as usize).min(envelope.len() - 1);
    if min_lag > max_lag {
        return None;
    }

    let best_lag = (min_lag..=max_lag)
        .max_by(|&a, &b| acf.at(a).total_cmp(&acf.at(b)))?;
    let max_corr = acf.at(best_lag);

    let in_range = |lag: f64| {
        let bpm = hops_per_second * 60.0 / lag;
        bpm >= config.min_bpm && bpm <= config.max_bpm
    };
    let best = best_lag as f64;
    let scored: Vec<(f64, f64)> = [best, best / 2.0, best * 2.0, best * 2.0 / 3.0, best * 1.5]
        .into_iter()
        .filter(|&lag| in_range(lag))
        .map(|lag| (lag, acf.comb_score(lag)))
        .collect();

    let period = if scored.is_empty() {
        best
    } else {
        let top_score = scored.iter().map(|&(_, s)| s).fold(f64::MIN, f64::max);
        let cutoff = top_score - top_score.abs() * (1.0 - config.octave_tolerance);
        scored
            .iter()
            .filter(|&&(_, s)| s >= cutoff)
            .map(|&(lag, _)| lag)
            .fold(f64::MAX, f64::min)
    };

    let refined_lag = acf.refine_period(period);
    let bpm = round1(hops_per_second * 60.0 / refined_lag).clamp(config.min_bpm, config.max_bpm);
    let confidence = (max_corr / zero_lag).clamp(0.0, 1.0);

    let window_duration = window_len as f64 / rate;
    let beat_grid = beat_grid(bpm, window_duration);

    log::debug!(
        "BPM: raw lag {}, comb period {:.2}, refined {:.3} -> {:.1} BPM (confidence {:.2})",
        best_lag,
        period,
        refined_lag,
        bpm,
        confidence
    );

    Some(BpmResult {
        bpm,
        confidence,
        beat_grid,
        analysis_offset,
    })
}

/// Half-wave rectified difference of frame RMS, lightly smoothed
pub fn onset_envelope(samples: &[f32], frame_size: usize, hop_size: usize) -> Vec<f64> {
    if samples.len() < frame_size || hop_size == 0 {
        return Vec::new();
    }
    let frames = (samples.len() - frame_size) / hop_size + 1;

    let frame_rms: Vec<f64> = (0..frames)
        .map(|f| {
            let frame = &samples[f * hop_size..f * hop_size + frame_size];
            let sum_sq: f64 = frame.iter().map(|&s| (s as f64) * (s as f64)).sum();
            (sum_sq / frame_size as f64).sqrt()
        })
        .collect();

    let onsets: Vec<f64> = frame_rms
        .windows(2)
        .map(|w| (w[1] - w[0]).max(0.0))
        .collect();

    let half = ONSET_KERNEL.len() / 2;
    (0..onsets.len())
        .map(|i| {
            let mut acc = 0.0;
            let mut weight = 0.0;
            for (k, &w) in ONSET_KERNEL.iter().enumerate() {
                let j = i as isize + k as isize - half as isize;
                if j >= 0 && (j as usize) < onsets.len() {
                    acc += w * onsets[j as usize];
                    weight += w;
                }
            }
            acc / weight
        })
        .collect()
}

/// Beat times `0, 60/bpm, 2*60/bpm, ...` strictly below `window_duration`
pub fn beat_grid(bpm: f64, window_duration: f64) -> Vec<f64> {
    let interval = 60.0 / bpm;
    (0..)
        .map(|i| i as f64 * interval)
        .take_while(|&t| t < window_duration)
        .collect()
}

/// Biased autocorrelation of a DC-removed envelope, evaluated on demand
struct Autocorrelation {
    signal: Vec<f64>,
}

impl Autocorrelation {
    fn new(envelope: &[f64]) -> Self {
        let dc = mean(envelope);
        Self {
            signal: envelope.iter().map(|&v| v - dc).collect(),
        }
    }

    fn at(&self, lag: usize) -> f64 {
        let n = self.signal.len();
        if lag >= n {
            return 0.0;
        }
        let sum: f64 = self.signal[..n - lag]
            .iter()
            .zip(&self.signal[lag..])
            .map(|(a, b)| a * b)
            .sum();
        sum / n as f64
    }

    /// Strongest integer lag within one hop of `target`
    fn local_peak(&self, target: f64) -> usize {
        let centre = target.round().max(1.0) as usize;
        (centre.saturating_sub(1).max(1)..=centre + 1)
            .max_by(|&a, &b| self.at(a).total_cmp(&self.at(b)))
            .unwrap_or(centre)
    }

    /// Average correlation at the first harmonics of `lag`; missing harmonics count as zero
    fn comb_score(&self, lag: f64) -> f64 {
        let n = self.signal.len();
        let sum: f64 = (1..=COMB_HARMONICS)
            .map(|k| k as f64 * lag)
            .take_while(|&h| (h.round() as usize) + 1 < n)
            .map(|h| self.at(self.local_peak(h)))
            .sum();
        sum / COMB_HARMONICS as f64
    }

    /// Fractional period from the highest harmonic peak that fits the envelope
    fn refine_period(&self, period: f64) -> f64 {
        let n = self.signal.len();
        let Some(order) = (1..=COMB_HARMONICS)
            .rev()
            .find(|&k| ((k as f64 * period).round() as usize) + 2 < n)
        else {
            return period;
        };

        let peak = self.local_peak(order as f64 * period);
        let (left, centre, right) = (self.at(peak - 1), self.at(peak), self.at(peak + 1));
        let denom = left - 2.0 * centre + right;
        let offset = if denom.abs() > 1e-18 {
            (0.5 * (left - right) / denom).clamp(-0.5, 0.5)
        } else {
            0.0
        };
        (peak as f64 + offset) / order as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    fn click_track(bpm: f64, sample_rate: u32, secs: f64) -> Vec<f32> {
        let n = (sample_rate as f64 * secs) as usize;
        let mut samples = vec![0.0f32; n];
        let click_len = (sample_rate as f64 * 0.03) as usize;
        let mut t = 0.1;
        while t < secs {
            let start = (t * sample_rate as f64) as usize;
            for i in 0..click_len.min(n.saturating_sub(start)) {
                let env = (-(i as f64) / (click_len as f64 / 4.0)).exp();
                samples[start + i] =
                    (0.8 * env * (2.0 * PI * 1000.0 * i as f64 / sample_rate as f64).sin()) as f32;
            }
            t += 60.0 / bpm;
        }
        samples
    }

    #[test]
    fn test_short_track_has_no_tempo() {
        let samples = click_track(120.0, 22050, 4.0);
        assert!(detect_bpm(&samples, 22050, 4.0, &BpmConfig::default()).is_none());
    }

    #[test]
    fn test_click_track_tempo() {
        for bpm in [100.0, 128.0] {
            let samples = click_track(bpm, 22050, 40.0);
            let result = detect_bpm(&samples, 22050, 40.0, &BpmConfig::default()).unwrap();
            assert!((result.bpm - bpm).abs() <= 1.0, "expected {} got {}", bpm, result.bpm);
            assert!(result.confidence > 0.5);
            assert!((result.analysis_offset - 5.0).abs() < 0.01);
        }
    }

    #[test]
    fn test_silence_has_no_tempo() {
        let samples = vec![0.0f32; 22050 * 10];
        assert!(detect_bpm(&samples, 22050, 10.0, &BpmConfig::default()).is_none());
    }

    #[test]
    fn test_beat_grid_spacing() {
        let grid = beat_grid(120.0, 2.0);
        assert_eq!(grid, vec![0.0, 0.5, 1.0, 1.5]);
    }

    #[test]
    fn test_onset_envelope_length() {
        let samples = vec![0.1f32; 1024 + 256 * 9];
        // 10 frames -> 9 differences
        assert_eq!(onset_envelope(&samples, 1024, 256).len(), 9);
        assert!(onset_envelope(&samples[..1000], 1024, 256).is_empty());
    }
}
