//! Analyzer configuration
//!
//! Most of these values are empirically tuned thresholds. They are kept as
//! named fields so they can be adjusted from a TOML file without touching
//! the analyzers.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::Path;

/// Configuration for a full track analysis
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    pub volume: VolumeConfig,
    pub energy: EnergyConfig,
    pub bpm: BpmConfig,
    pub outro: OutroConfig,
    pub intro: IntroConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct VolumeConfig {
    /// Loudness the gain adjustment aims for
    pub target_lufs: f64,
    pub min_gain: f64,
    pub max_gain: f64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct EnergyConfig {
    /// Linear RMS floor separating content from trailing silence (~ -50 dBFS)
    pub silence_threshold: f64,
    /// Window used when scanning backward for trailing silence
    pub silence_window_secs: f64,
    /// Fraction of average energy that marks the outro start
    pub outro_threshold: f64,
    /// Fraction of average energy that marks the intro end
    pub intro_threshold: f64,
    pub intro_scan_secs: usize,
    pub max_intro_offset: f64,
    pub min_outro_offset: f64,
    /// End/start energy ratio below which the outro counts as a fade
    pub fade_ratio: f64,
    /// Minimum length of the outro window examined by the fade check
    pub fade_window_secs: usize,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct BpmConfig {
    pub target_rate: u32,
    pub window_secs: f64,
    pub frame_size: usize,
    pub hop_size: usize,
    pub min_bpm: f64,
    pub max_bpm: f64,
    /// Tracks shorter than this get no tempo estimate
    pub min_duration: f64,
    /// Comb scores within this fraction of the best prefer the faster tempo
    pub octave_tolerance: f64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct OutroConfig {
    pub window_secs: f64,
    pub scan_secs: f64,
    pub min_content_secs: f64,
    pub warm_up_samples: usize,
    pub min_crossfade_start: f64,
    pub end_margin: f64,

    pub silence_ratio: f64,
    pub silence_energy: f64,

    pub noise_tail_fraction: f64,
    pub noise_flux_factor: f64,
    pub noise_energy_factor: f64,
    pub noise_high_share: f64,
    pub noise_match_fraction: f64,

    pub loop_max_windows: usize,
    pub loop_min_period: usize,
    pub loop_max_period: usize,
    pub loop_min_correlation: f64,
    pub loop_decreasing_fraction: f64,
    pub loop_min_modulation: f64,
    pub band_ratio_tolerance: f64,

    pub fade_min_windows: usize,
    pub fade_max_nonmonotonic: f64,
    pub fade_min_drop: f64,
    pub fade_max_ratio_change: f64,
    pub fade_max_flux: f64,
    pub fade_crossfade_lead: f64,

    pub slowdown_windows: usize,
    pub slowdown_flux_factor: f64,
    pub slowdown_min_intervals: usize,
    pub slowdown_min_r_squared: f64,

    pub sustain_scan_windows: usize,
    pub sustain_min_windows: usize,
    pub sustain_flux_factor: f64,
    pub sustain_min_slope: f64,

    pub musical_mid_start: f64,
    pub musical_mid_end: f64,
    pub musical_mid_max_secs: f64,
    pub musical_tail_secs: f64,
    pub musical_max_similarity: f64,
    pub musical_min_energy: f64,
    pub musical_crossfade_fraction: f64,

    pub reverb_min_secs: f64,
    pub reverb_max_secs: f64,
    pub reverb_decay_ratio: f64,

    pub hard_drop_ratio: f64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct IntroConfig {
    pub scan_secs: usize,
    /// Fraction of average energy that ends the quiet part of the intro
    pub quiet_threshold: f64,
    /// Fraction of average energy that ends the build-up
    pub build_threshold: f64,
    pub min_duration: f64,
    /// Window of the intro multiband series
    pub window_secs: f64,
}

impl Default for VolumeConfig {
    fn default() -> Self {
        Self {
            target_lufs: -14.0,
            min_gain: 0.1,
            max_gain: 3.0,
        }
    }
}

impl Default for EnergyConfig {
    fn default() -> Self {
        Self {
            silence_threshold: 0.003,
            silence_window_secs: 0.1,
            outro_threshold: 0.3,
            intro_threshold: 0.4,
            intro_scan_secs: 30,
            max_intro_offset: 10.0,
            min_outro_offset: 3.0,
            fade_ratio: 0.3,
            fade_window_secs: 10,
        }
    }
}

impl Default for BpmConfig {
    fn default() -> Self {
        Self {
            target_rate: 11025,
            window_secs: 30.0,
            frame_size: 1024,
            hop_size: 256,
            min_bpm: 60.0,
            max_bpm: 200.0,
            min_duration: 5.0,
            octave_tolerance: 0.9,
        }
    }
}

impl Default for OutroConfig {
    fn default() -> Self {
        Self {
            window_secs: 0.25,
            scan_secs: 60.0,
            min_content_secs: 10.0,
            warm_up_samples: 200,
            min_crossfade_start: 30.0,
            end_margin: 3.0,

            silence_ratio: 0.5,
            silence_energy: 0.001,

            noise_tail_fraction: 0.2,
            noise_flux_factor: 1.5,
            noise_energy_factor: 0.5,
            noise_high_share: 0.4,
            noise_match_fraction: 0.6,

            loop_max_windows: 120,
            loop_min_period: 2,
            loop_max_period: 32,
            loop_min_correlation: 0.65,
            loop_decreasing_fraction: 0.7,
            loop_min_modulation: 0.05,
            band_ratio_tolerance: 2.0,

            fade_min_windows: 12,
            fade_max_nonmonotonic: 0.15,
            fade_min_drop: 0.5,
            fade_max_ratio_change: 1.0,
            fade_max_flux: 0.1,
            fade_crossfade_lead: 4.0,

            slowdown_windows: 60,
            slowdown_flux_factor: 1.5,
            slowdown_min_intervals: 6,
            slowdown_min_r_squared: 0.3,

            sustain_scan_windows: 80,
            sustain_min_windows: 32,
            sustain_flux_factor: 0.3,
            sustain_min_slope: -0.05,

            musical_mid_start: 0.25,
            musical_mid_end: 0.55,
            musical_mid_max_secs: 30.0,
            musical_tail_secs: 15.0,
            musical_max_similarity: 0.7,
            musical_min_energy: 0.3,
            musical_crossfade_fraction: 0.6,

            reverb_min_secs: 2.0,
            reverb_max_secs: 8.0,
            reverb_decay_ratio: 2.0,

            hard_drop_ratio: 0.8,
        }
    }
}

impl Default for IntroConfig {
    fn default() -> Self {
        Self {
            scan_secs: 20,
            quiet_threshold: 0.5,
            build_threshold: 0.8,
            min_duration: 5.0,
            window_secs: 0.25,
        }
    }
}

impl AnalyzerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the loudness target used for the gain adjustment
    pub fn with_target_lufs(mut self, target_lufs: f64) -> Self {
        self.volume.target_lufs = target_lufs;
        self
    }

    /// Set the tempo search range
    pub fn with_bpm_range(mut self, min: f64, max: f64) -> Self {
        self.bpm.min_bpm = min;
        self.bpm.max_bpm = max;
        self
    }

    /// Set the silence floor (linear RMS)
    pub fn with_silence_threshold(mut self, threshold: f64) -> Self {
        self.energy.silence_threshold = threshold;
        self
    }

    /// Reject window and frame sizes the analyzers cannot divide by
    pub fn validate(&self) -> Result<()> {
        let windows = [
            ("energy.silence_window_secs", self.energy.silence_window_secs),
            ("bpm.window_secs", self.bpm.window_secs),
            ("outro.window_secs", self.outro.window_secs),
            ("outro.scan_secs", self.outro.scan_secs),
            ("intro.window_secs", self.intro.window_secs),
        ];
        for (name, value) in windows {
            if !(value.is_finite() && value > 0.0) {
                bail!("{} must be positive, got {}", name, value);
            }
        }

        let sizes = [
            ("bpm.target_rate", self.bpm.target_rate as usize),
            ("bpm.frame_size", self.bpm.frame_size),
            ("bpm.hop_size", self.bpm.hop_size),
        ];
        for (name, value) in sizes {
            if value == 0 {
                bail!("{} must be at least 1", name);
            }
        }

        if !(self.bpm.min_bpm > 0.0 && self.bpm.min_bpm < self.bpm.max_bpm) {
            bail!(
                "Invalid BPM range: {}-{}",
                self.bpm.min_bpm,
                self.bpm.max_bpm
            );
        }
        Ok(())
    }
}

/// Load an [`AnalyzerConfig`] from a TOML file; missing keys keep their defaults
pub fn load_config(path: &Path) -> Result<AnalyzerConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;
    let config: AnalyzerConfig = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;
    config
        .validate()
        .with_context(|| format!("Invalid config file: {:?}", path))?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[volume]\ntarget_lufs = -16.0\n\n[outro]\nfade_min_windows = 16").unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.volume.target_lufs, -16.0);
        assert_eq!(config.volume.max_gain, 3.0);
        assert_eq!(config.outro.fade_min_windows, 16);
        assert_eq!(config.outro.loop_min_correlation, 0.65);
        assert_eq!(config.bpm, BpmConfig::default());
    }

    #[test]
    fn test_invalid_toml_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[volume\ntarget_lufs = ").unwrap();
        assert!(load_config(file.path()).is_err());
    }

    #[test]
    fn test_zero_window_is_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[outro]\nwindow_secs = 0.0").unwrap();
        let err = load_config(file.path()).unwrap_err();
        let message = format!("{:#}", err);
        assert!(message.contains("Invalid config file"), "{}", message);
        assert!(message.contains("outro.window_secs must be positive"), "{}", message);
    }

    #[test]
    fn test_zero_hop_and_frame_are_rejected() {
        let mut config = AnalyzerConfig::default();
        config.bpm.hop_size = 0;
        assert!(config.validate().is_err());

        let mut config = AnalyzerConfig::default();
        config.bpm.frame_size = 0;
        assert!(config.validate().is_err());

        let inverted = AnalyzerConfig::default().with_bpm_range(180.0, 90.0);
        assert!(inverted.validate().is_err());
        assert!(AnalyzerConfig::default().validate().is_ok());
    }

    #[test]
    fn test_builder_methods() {
        let config = AnalyzerConfig::new()
            .with_target_lufs(-23.0)
            .with_bpm_range(70.0, 170.0)
            .with_silence_threshold(0.001);
        assert_eq!(config.volume.target_lufs, -23.0);
        assert_eq!(config.energy.silence_threshold, 0.001);
        assert_eq!(config.bpm.min_bpm, 70.0);
        assert_eq!(config.bpm.max_bpm, 170.0);
    }
}
