//! 8-band perceptual spectral fingerprint
//!
//! Bandpass filters are evaluated over a handful of short windows spread
//! across the track instead of running an FFT over everything.

use crate::dsp::{BandSpec, Biquad};
use crate::model::{SpectralFingerprint, FINGERPRINT_BANDS};

/// Perceptual bands, sub-bass to air
pub const BANDS: [BandSpec; FINGERPRINT_BANDS] = [
    BandSpec::new(20.0, 150.0),
    BandSpec::new(150.0, 400.0),
    BandSpec::new(400.0, 1000.0),
    BandSpec::new(1000.0, 2500.0),
    BandSpec::new(2500.0, 4000.0),
    BandSpec::new(4000.0, 6000.0),
    BandSpec::new(6000.0, 10000.0),
    BandSpec::new(10000.0, 16000.0),
];

const WINDOW_SIZE: usize = 2048;
const MAX_WINDOWS: usize = 8;
const WARM_UP: usize = 64;

/// Compute the relative energy of each band, normalized so the loudest band is 1
pub fn compute_fingerprint(samples: &[f32], sample_rate: u32) -> SpectralFingerprint {
    let windows = (samples.len() / WINDOW_SIZE).min(MAX_WINDOWS);
    if windows == 0 {
        return SpectralFingerprint::silent();
    }

    let span = samples.len() - WINDOW_SIZE;
    let starts: Vec<usize> = (0..windows)
        .map(|k| if windows > 1 { span * k / (windows - 1) } else { 0 })
        .collect();

    let mut bands = [0.0f64; FINGERPRINT_BANDS];
    for (band, energy) in BANDS.iter().zip(bands.iter_mut()) {
        let Some(coeffs) = band.coefficients(sample_rate) else {
            continue;
        };
        let sum: f64 = starts
            .iter()
            .map(|&start| {
                let window = &samples[start..start + WINDOW_SIZE];
                // Fresh state per window: no ringing carried across the gap
                let mut filter = Biquad::new(coeffs);
                filter.warm_up(&window[..WARM_UP]);
                let measured = &window[WARM_UP..];
                let sum_sq: f64 = measured
                    .iter()
                    .map(|&s| {
                        let y = filter.process(s as f64);
                        y * y
                    })
                    .sum();
                (sum_sq / measured.len() as f64).sqrt()
            })
            .sum();
        *energy = sum / windows as f64;
    }

    let max = bands.iter().copied().fold(0.0f64, f64::max);
    if max < 1e-12 {
        return SpectralFingerprint::silent();
    }
    for value in bands.iter_mut() {
        *value /= max;
    }

    log::debug!("Fingerprint: {:?}", bands);
    SpectralFingerprint { bands }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    fn sine(freq: f32, sample_rate: u32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| 0.5 * (2.0 * PI * freq * i as f32 / sample_rate as f32).sin())
            .collect()
    }

    #[test]
    fn test_silence_is_all_zero() {
        let fp = compute_fingerprint(&vec![0.0; 44100], 44100);
        assert_eq!(fp.bands, [0.0; FINGERPRINT_BANDS]);
    }

    #[test]
    fn test_short_input_is_all_zero() {
        let fp = compute_fingerprint(&sine(440.0, 44100, 1000), 44100);
        assert_eq!(fp, SpectralFingerprint::silent());
    }

    #[test]
    fn test_tone_lands_in_its_band() {
        let fp = compute_fingerprint(&sine(700.0, 44100, 44100 * 5), 44100);
        // 700 Hz is in the 400-1000 band
        assert_eq!(fp.bands[2], 1.0);
        assert!(fp.bands.iter().all(|&b| (0.0..=1.0).contains(&b)));
        assert!(fp.bands[7] < 0.2);
    }

    #[test]
    fn test_bands_above_nyquist_stay_zero() {
        let fp = compute_fingerprint(&sine(300.0, 16000, 16000 * 3), 16000);
        assert_eq!(fp.bands[7], 0.0);
        assert_eq!(fp.bands.iter().copied().fold(0.0, f64::max), 1.0);
    }
}
