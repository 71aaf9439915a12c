//! Peak, RMS and loudness normalization

use super::config::VolumeConfig;
use crate::dsp::stats::rms_and_peak;
use crate::model::VolumeAnalysis;

/// Loudness reported for digital silence
pub const SILENCE_LUFS: f64 = -70.0;

/// RMS of a full-scale sine, the 0 dB reference of the loudness estimate
const SINE_RMS: f64 = 0.707;

/// Measure level and loudness in one pass over the buffer
pub fn analyze_volume(samples: &[f32], config: &VolumeConfig) -> VolumeAnalysis {
    let (rms, peak) = rms_and_peak(samples);
    let estimated_lufs = estimate_lufs(rms);
    let gain_adjustment = 10f64
        .powf((config.target_lufs - estimated_lufs) / 20.0)
        .clamp(config.min_gain, config.max_gain);

    log::debug!(
        "Volume: peak={:.4}, rms={:.4}, lufs={:.1}, gain={:.3}",
        peak,
        rms,
        estimated_lufs,
        gain_adjustment
    );

    VolumeAnalysis {
        peak,
        rms,
        estimated_lufs,
        gain_adjustment,
    }
}

/// LUFS-like loudness from a linear RMS value
pub fn estimate_lufs(rms: f64) -> f64 {
    if rms < 1e-10 {
        SILENCE_LUFS
    } else {
        20.0 * (rms / SINE_RMS).log10() - 0.691
    }
}
