use serde::{Deserialize, Serialize};
use std::fmt;

/// Peak/RMS level and loudness normalization for a track
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VolumeAnalysis {
    /// Absolute sample peak (linear)
    pub peak: f64,

    /// RMS over the whole buffer (linear)
    pub rms: f64,

    /// Approximate integrated loudness, LUFS-like
    #[serde(rename = "estimatedLUFS")]
    pub estimated_lufs: f64,

    /// Linear gain that brings the track to the target loudness, clamped to [0.1, 3.0]
    pub gain_adjustment: f64,
}

/// Coarse energy envelope and silence/offset detection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnergyAnalysis {
    /// One RMS value per second, normalized to the loudest content second (0..1)
    pub energy_per_second: Vec<f64>,

    /// Seconds from the end of the file where the outro begins (>= 3)
    pub outro_start_offset: f64,

    /// Seconds from the start where the intro ends (0..10)
    pub intro_end_offset: f64,

    /// Mean normalized energy over the content seconds
    pub average_energy: f64,

    /// Silence at the end of the file in seconds (0.1 s resolution)
    pub trailing_silence: f64,

    /// Whether the outro shows a gradual decline rather than a cliff
    pub is_fade_out: bool,
}

/// Tempo estimate and beat grid
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BpmResult {
    /// Beats per minute (60..200, one decimal)
    pub bpm: f64,

    /// Peak autocorrelation relative to zero lag (0..1)
    pub confidence: f64,

    /// Beat times in seconds, relative to `analysis_offset`
    pub beat_grid: Vec<f64>,

    /// Start of the analyzed window in seconds from the file start
    pub analysis_offset: f64,
}

/// Number of perceptual bands in a [`SpectralFingerprint`]
pub const FINGERPRINT_BANDS: usize = 8;

/// Relative energy in 8 perceptual bands, sub-bass to air
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpectralFingerprint {
    pub bands: [f64; FINGERPRINT_BANDS],
}

impl SpectralFingerprint {
    pub fn silent() -> Self {
        Self {
            bands: [0.0; FINGERPRINT_BANDS],
        }
    }
}

/// Per-window RMS in the low (20-300 Hz), mid (300-4000 Hz) and high (4-16 kHz) bands
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MultibandEnergy {
    pub low: Vec<f64>,
    pub mid: Vec<f64>,
    pub high: Vec<f64>,
}

impl MultibandEnergy {
    pub fn len(&self) -> usize {
        self.low.len()
    }

    pub fn is_empty(&self) -> bool {
        self.low.is_empty()
    }

    /// Sum of the three band RMS values for window `i`
    pub fn total(&self, i: usize) -> f64 {
        self.low[i] + self.mid[i] + self.high[i]
    }

    pub fn totals(&self) -> Vec<f64> {
        (0..self.len()).map(|i| self.total(i)).collect()
    }
}

/// How a track ends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OutroType {
    /// Music stops abruptly
    Hard,
    /// Gradual volume decline with stable spectrum
    FadeOut,
    /// Music stops and a room/reverb tail rings out
    ReverbTail,
    /// The track is (mostly) silence
    Silence,
    /// Applause/crowd noise after the music
    NoiseEnd,
    /// Tempo decelerates into the ending (ritardando)
    SlowDown,
    /// A held chord or drone with slow decay
    Sustained,
    /// A distinct closing section that does not fade
    MusicalOutro,
    /// A repeating loop fading out
    LoopFade,
}

impl OutroType {
    pub fn name(&self) -> &'static str {
        match self {
            OutroType::Hard => "hard",
            OutroType::FadeOut => "fadeOut",
            OutroType::ReverbTail => "reverbTail",
            OutroType::Silence => "silence",
            OutroType::NoiseEnd => "noiseEnd",
            OutroType::SlowDown => "slowDown",
            OutroType::Sustained => "sustained",
            OutroType::MusicalOutro => "musicalOutro",
            OutroType::LoopFade => "loopFade",
        }
    }
}

impl fmt::Display for OutroType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Outro classification plus the series it was derived from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutroAnalysis {
    pub outro_type: OutroType,

    /// 0..1
    pub outro_confidence: f64,

    /// Seconds from the end of the file where musical content effectively stops
    pub musical_end_offset: f64,

    /// Seconds from the start of the file where a crossfade should begin
    pub suggested_crossfade_start: f64,

    /// 250 ms band energies over the outro scan region
    pub multiband_energy: MultibandEnergy,

    /// Sum of positive band-to-band RMS deltas per window
    pub spectral_flux: Vec<f64>,

    /// K-weighted loudness per window (LUFS-like)
    pub short_term_loudness: Vec<f64>,

    /// slowDown: seconds from file start where the tempo starts to drop
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deceleration_start: Option<f64>,

    /// sustained: seconds from file start where the held sound begins
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sustain_onset: Option<f64>,

    /// musicalOutro: seconds from file start where the closing section begins
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outro_section_start: Option<f64>,

    /// loopFade: loop length in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loop_period: Option<f64>,
}

/// How a track begins
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntroAnalysis {
    /// Seconds before the energy first holds above 50 % of the track average
    pub quiet_intro_duration: f64,

    /// Seconds before the energy first holds above 80 % of the track average
    pub energy_build_duration: f64,

    /// Mean energy of the first 20 s relative to the track average
    pub intro_energy_ratio: f64,

    /// 250 ms band energies over the first 20 s
    pub multiband_energy: Option<MultibandEnergy>,
}

/// Everything computed for one track
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisReport {
    pub volume: VolumeAnalysis,
    pub energy: EnergyAnalysis,
    pub bpm: Option<BpmResult>,
    pub fingerprint: SpectralFingerprint,
    pub outro: Option<OutroAnalysis>,
    pub intro: Option<IntroAnalysis>,
}
