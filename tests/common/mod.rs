//! Synthetic signals shared by the integration tests

#![allow(dead_code)]

use std::f64::consts::PI;

/// Decaying 1 kHz clicks every beat, starting at 0.1 s
pub fn click_track(bpm: f64, sample_rate: u32, secs: f64) -> Vec<f32> {
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

/// Steady sine
pub fn sine_bed(freq: f64, amplitude: f64, sample_rate: u32, secs: f64) -> Vec<f32> {
    let n = (sample_rate as f64 * secs) as usize;
    (0..n)
        .map(|i| (amplitude * (2.0 * PI * freq * i as f64 / sample_rate as f64).sin()) as f32)
        .collect()
}

/// Ramp the last `fade_secs` linearly down to zero
pub fn with_linear_fade(mut samples: Vec<f32>, sample_rate: u32, fade_secs: f64) -> Vec<f32> {
    let fade_len = ((fade_secs * sample_rate as f64) as usize).min(samples.len());
    let start = samples.len() - fade_len;
    for (i, s) in samples[start..].iter_mut().enumerate() {
        *s *= (1.0 - i as f64 / fade_len as f64) as f32;
    }
    samples
}

/// Append `secs` of digital silence
pub fn with_silence(mut samples: Vec<f32>, sample_rate: u32, secs: f64) -> Vec<f32> {
    samples.extend(std::iter::repeat(0.0).take((secs * sample_rate as f64) as usize));
    samples
}

pub fn silence(sample_rate: u32, secs: f64) -> Vec<f32> {
    vec![0.0; (sample_rate as f64 * secs) as usize]
}
