//! Second-order IIR (biquad) filters
//!
//! Coefficients are designed with the bilinear transform (RBJ cookbook form)
//! and evaluated one sample at a time in Direct-Form-II-transposed, which
//! needs only two state registers per filter.
//!
//! A [`Biquad`] carries its own registers. Create a fresh one for every
//! logical window you measure; reusing one across non-contiguous windows
//! leaks the previous window's ringing into the next measurement.

use std::f64::consts::PI;

/// Fraction of Nyquist above which band edges are clamped
const NYQUIST_GUARD: f64 = 0.95;

/// Normalized biquad coefficients (a0 already divided out)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BiquadCoefficients {
    pub b0: f64,
    pub b1: f64,
    pub b2: f64,
    pub a1: f64,
    pub a2: f64,
}

impl BiquadCoefficients {
    fn normalized(b0: f64, b1: f64, b2: f64, a0: f64, a1: f64, a2: f64) -> Self {
        Self {
            b0: b0 / a0,
            b1: b1 / a0,
            b2: b2 / a0,
            a1: a1 / a0,
            a2: a2 / a0,
        }
    }
}

/// Design a 2nd-order Butterworth-style bandpass between `f_low` and `f_high`
///
/// The centre frequency is the geometric mean of the edges and
/// `Q = centre / bandwidth`. Peak gain at the centre is 0 dB.
/// `f_high` is clamped just below Nyquist.
pub fn design_bandpass(f_low: f64, f_high: f64, sample_rate: u32) -> BiquadCoefficients {
    let nyquist = sample_rate as f64 / 2.0;
    let f_high = f_high.min(nyquist * NYQUIST_GUARD);
    let f_low = f_low.max(1.0).min(f_high * 0.5);

    let centre = (f_low * f_high).sqrt();
    let q = centre / (f_high - f_low);
    let w0 = 2.0 * PI * centre / sample_rate as f64;
    let alpha = w0.sin() / (2.0 * q);
    let cos_w0 = w0.cos();

    BiquadCoefficients::normalized(
        alpha,
        0.0,
        -alpha,
        1.0 + alpha,
        -2.0 * cos_w0,
        1.0 - alpha,
    )
}

/// Fixed +4 dB high shelf at 2 kHz (Q 0.707), a cheap stand-in for the
/// K-weighting curve used by loudness meters
pub fn design_k_weight_shelf(sample_rate: u32) -> BiquadCoefficients {
    const SHELF_FREQ: f64 = 2000.0;
    const SHELF_GAIN_DB: f64 = 4.0;
    const SHELF_Q: f64 = 0.707;

    let freq = SHELF_FREQ.min(sample_rate as f64 / 2.0 * NYQUIST_GUARD);
    let a = 10f64.powf(SHELF_GAIN_DB / 40.0);
    let w0 = 2.0 * PI * freq / sample_rate as f64;
    let cos_w0 = w0.cos();
    let alpha = w0.sin() / (2.0 * SHELF_Q);
    let two_sqrt_a_alpha = 2.0 * a.sqrt() * alpha;

    BiquadCoefficients::normalized(
        a * ((a + 1.0) + (a - 1.0) * cos_w0 + two_sqrt_a_alpha),
        -2.0 * a * ((a - 1.0) + (a + 1.0) * cos_w0),
        a * ((a + 1.0) + (a - 1.0) * cos_w0 - two_sqrt_a_alpha),
        (a + 1.0) - (a - 1.0) * cos_w0 + two_sqrt_a_alpha,
        2.0 * ((a - 1.0) - (a + 1.0) * cos_w0),
        (a + 1.0) - (a - 1.0) * cos_w0 - two_sqrt_a_alpha,
    )
}

/// A frequency band with its filter edges in Hz
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BandSpec {
    pub low_hz: f64,
    pub high_hz: f64,
}

impl BandSpec {
    pub const fn new(low_hz: f64, high_hz: f64) -> Self {
        Self { low_hz, high_hz }
    }

    /// Bandpass coefficients, or `None` when the band lies above Nyquist
    pub fn coefficients(&self, sample_rate: u32) -> Option<BiquadCoefficients> {
        let limit = sample_rate as f64 / 2.0 * NYQUIST_GUARD;
        if self.low_hz >= limit {
            return None;
        }
        Some(design_bandpass(self.low_hz, self.high_hz, sample_rate))
    }
}

/// Single biquad section with its two state registers
#[derive(Debug, Clone)]
pub struct Biquad {
    coeffs: BiquadCoefficients,
    z1: f64,
    z2: f64,
}

impl Biquad {
    pub fn new(coeffs: BiquadCoefficients) -> Self {
        Self {
            coeffs,
            z1: 0.0,
            z2: 0.0,
        }
    }

    #[inline]
    pub fn process(&mut self, input: f64) -> f64 {
        let c = &self.coeffs;
        let output = input * c.b0 + self.z1;
        self.z1 = input * c.b1 + self.z2 - c.a1 * output;
        self.z2 = input * c.b2 - c.a2 * output;
        output
    }

    /// Run samples through the filter and throw the output away
    pub fn warm_up(&mut self, samples: &[f32]) {
        for &s in samples {
            self.process(s as f64);
        }
    }
}
