//! Outro classification
//!
//! The last minute of content is turned into a 250 ms multiband series and
//! passed through an ordered table of rules. Each rule either declines or
//! returns a full [`Classification`]; the first match wins and `hard` is the
//! fallback.

use super::config::OutroConfig;
use super::multiband::{self, BandProfile, MultibandSeries};
use crate::dsp::stats::{cosine_similarity, linear_regression, mean, median};
use crate::model::{EnergyAnalysis, OutroAnalysis, OutroType};

/// Offset below which a value counts as zero in ratio checks
const EPSILON: f64 = 1e-9;

/// Windows averaged when locating the start of a musical outro section
const SECTION_SMOOTHING: usize = 4;

/// Similarity a smoothed window needs to belong to the outro section
const SECTION_SIMILARITY: f64 = 0.9;

/// A rule inspects the context and either classifies the outro or declines
pub type Rule = fn(&OutroContext) -> Option<Classification>;

/// Classifier rules in evaluation order
pub const RULES: [(OutroType, Rule); 9] = [
    (OutroType::Silence, silence),
    (OutroType::NoiseEnd, noise_end),
    (OutroType::LoopFade, loop_fade),
    (OutroType::FadeOut, fade_out),
    (OutroType::SlowDown, slow_down),
    (OutroType::Sustained, sustained),
    (OutroType::MusicalOutro, musical_outro),
    (OutroType::ReverbTail, reverb_tail),
    (OutroType::Hard, hard),
];

/// Classify the end of a track
///
/// Returns `None` when there is less than `min_content_secs` of content or
/// fewer than four analysis windows. A completely silent track is analyzed
/// over its raw buffer so it still classifies as [`OutroType::Silence`].
pub fn analyze_outro(
    samples: &[f32],
    sample_rate: u32,
    duration: f64,
    energy: &EnergyAnalysis,
    config: &OutroConfig,
) -> Option<OutroAnalysis> {
    let all_silent = energy.trailing_silence >= duration;
    let content_secs = if all_silent {
        duration
    } else {
        duration - energy.trailing_silence
    };
    if content_secs < config.min_content_secs {
        log::debug!("Outro: only {:.1}s of content, skipping", content_secs);
        return None;
    }

    let rate = sample_rate as f64;
    let region_end = if all_silent {
        samples.len()
    } else {
        samples
            .len()
            .saturating_sub((energy.trailing_silence * rate).round() as usize)
    };
    let window_len = ((config.window_secs * rate).round() as usize).max(1);
    let scan_len = ((config.scan_secs * rate) as usize).min(region_end);
    let windows = scan_len / window_len;
    if windows < 4 {
        log::debug!("Outro: {} windows, need at least 4", windows);
        return None;
    }
    let region_start = region_end - windows * window_len;

    let series = multiband::analyze_region(
        samples,
        sample_rate,
        region_start,
        region_end,
        config.warm_up_samples,
        config.window_secs,
    );
    let mid_profile = mid_track_profile(samples, sample_rate, region_end, config);
    let ctx = OutroContext::new(&series, duration, energy.trailing_silence, mid_profile, config);
    let classification = classify(&ctx);

    log::debug!(
        "Outro: {} ({:.2}), music ends at {:.1}s, crossfade at {:.1}s",
        classification.outro_type,
        classification.confidence,
        classification.musical_end,
        classification.crossfade_start
    );

    Some(classification.into_analysis(series, duration, config))
}

/// Aggregate band profile of the middle of the track, the reference for `musicalOutro`
fn mid_track_profile(
    samples: &[f32],
    sample_rate: u32,
    content_end: usize,
    config: &OutroConfig,
) -> Option<BandProfile> {
    let start = (content_end as f64 * config.musical_mid_start) as usize;
    let max_len = (config.musical_mid_max_secs * sample_rate as f64) as usize;
    let end = ((content_end as f64 * config.musical_mid_end) as usize).min(start + max_len);
    let min_len = (config.window_secs * sample_rate as f64) as usize;
    if end <= start || end - start < min_len {
        return None;
    }
    Some(multiband::band_profile(
        samples,
        sample_rate,
        start,
        end,
        config.warm_up_samples,
    ))
}

/// Run the rule table; `hard` always matches so the fallback is only a formality
pub fn classify(ctx: &OutroContext) -> Classification {
    RULES
        .iter()
        .find_map(|(outro_type, rule)| {
            let found = rule(ctx);
            if found.is_some() {
                log::debug!("Outro rule matched: {}", outro_type);
            }
            found
        })
        .unwrap_or_else(|| hard_ending(ctx))
}

/// Everything a rule can look at
pub struct OutroContext<'a> {
    pub series: &'a MultibandSeries,
    pub totals: Vec<f64>,
    pub duration: f64,
    pub trailing_silence: f64,
    /// Seconds from the file start where trailing silence begins
    pub content_end: f64,
    pub mid_profile: Option<BandProfile>,
    pub config: &'a OutroConfig,
    mean_total: f64,
    median_flux: f64,
}

impl<'a> OutroContext<'a> {
    pub fn new(
        series: &'a MultibandSeries,
        duration: f64,
        trailing_silence: f64,
        mid_profile: Option<BandProfile>,
        config: &'a OutroConfig,
    ) -> Self {
        let totals = series.energy.totals();
        let mean_total = mean(&totals);
        let median_flux = median(&series.flux);
        Self {
            series,
            totals,
            duration,
            trailing_silence,
            content_end: (duration - trailing_silence).max(0.0),
            mid_profile,
            config,
            mean_total,
            median_flux,
        }
    }

    fn len(&self) -> usize {
        self.totals.len()
    }

    fn time_at(&self, i: usize) -> f64 {
        self.series.time_at(i)
    }

    fn profile(&self, range: std::ops::Range<usize>) -> BandProfile {
        BandProfile::from_windows(&self.series.energy, range)
    }

    /// Log-energy decay in natural-log units per second, positive when decaying
    fn decay_rate(&self, values: &[f64]) -> f64 {
        let logs: Vec<f64> = values.iter().map(|&v| (v + EPSILON).ln()).collect();
        -linear_regression(&logs).slope / self.series.window_secs
    }

    /// Slope per second relative to the mean level, positive when decaying
    fn relative_decay(&self, values: &[f64]) -> f64 {
        let level = mean(values);
        if level < EPSILON {
            return 0.0;
        }
        -linear_regression(values).slope / self.series.window_secs / level
    }
}

/// Result of a matching rule; times are seconds from the file start
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub outro_type: OutroType,
    pub confidence: f64,
    pub musical_end: f64,
    /// Unclamped crossfade start
    pub crossfade_start: f64,
    pub deceleration_start: Option<f64>,
    pub sustain_onset: Option<f64>,
    pub outro_section_start: Option<f64>,
    pub loop_period: Option<f64>,
}

impl Classification {
    fn new(outro_type: OutroType, confidence: f64, musical_end: f64, crossfade_start: f64) -> Self {
        Self {
            outro_type,
            confidence: confidence.clamp(0.0, 1.0),
            musical_end,
            crossfade_start,
            deceleration_start: None,
            sustain_onset: None,
            outro_section_start: None,
            loop_period: None,
        }
    }

    fn into_analysis(self, series: MultibandSeries, duration: f64, config: &OutroConfig) -> OutroAnalysis {
        OutroAnalysis {
            outro_type: self.outro_type,
            outro_confidence: self.confidence,
            musical_end_offset: (duration - self.musical_end).clamp(0.0, duration.max(0.0)),
            suggested_crossfade_start: clamp_crossfade(self.crossfade_start, duration, config),
            multiband_energy: series.energy,
            spectral_flux: series.flux,
            short_term_loudness: series.loudness,
            deceleration_start: self.deceleration_start,
            sustain_onset: self.sustain_onset,
            outro_section_start: self.outro_section_start,
            loop_period: self.loop_period,
        }
    }
}

/// Keep the crossfade between `min_crossfade_start` and `duration - end_margin`
///
/// On tracks too short for both bounds the upper one wins.
pub fn clamp_crossfade(value: f64, duration: f64, config: &OutroConfig) -> f64 {
    let upper = (duration - config.end_margin).max(0.0);
    let lower = config.min_crossfade_start.min(upper);
    value.clamp(lower, upper)
}

/// Band shares of two profiles differ by at most `tolerance` times per band
fn shares_stable(a: [f64; 3], b: [f64; 3], tolerance: f64) -> bool {
    a.iter().zip(b).all(|(&x, y)| {
        let (lo, hi) = (x.min(y), x.max(y));
        hi < 0.02 || hi <= tolerance * lo.max(EPSILON)
    })
}

fn silence(ctx: &OutroContext) -> Option<Classification> {
    let c = ctx.config;
    let mostly_silent = ctx.trailing_silence >= c.silence_ratio * ctx.duration;
    let all_quiet = ctx.totals.iter().all(|&t| t < c.silence_energy);
    if !mostly_silent && !all_quiet {
        return None;
    }
    Some(Classification::new(
        OutroType::Silence,
        0.95,
        ctx.content_end,
        ctx.content_end - 1.0,
    ))
}

fn noise_end(ctx: &OutroContext) -> Option<Classification> {
    let c = ctx.config;
    let n = ctx.len();
    if n < 4 {
        return None;
    }
    let tail_len = ((n as f64 * c.noise_tail_fraction).ceil() as usize).max(4).min(n);
    let tail_start = n - tail_len;
    let flux = &ctx.series.flux;
    let high = &ctx.series.energy.high;

    let is_noisy = |i: usize| {
        let total = ctx.totals[i];
        flux[i] > 0.0
            && flux[i] > c.noise_flux_factor * ctx.median_flux
            && total < c.noise_energy_factor * ctx.mean_total
            && high[i] >= c.noise_high_share * total
    };

    let noisy = (tail_start..n).filter(|&i| is_noisy(i)).count();
    if (noisy as f64) < c.noise_match_fraction * tail_len as f64 {
        return None;
    }

    let mut start = n;
    while start > 0 && is_noisy(start - 1) {
        start -= 1;
    }
    if start == n {
        start = (tail_start..n).find(|&i| is_noisy(i))?;
    }

    let noise_start = ctx.time_at(start);
    let fraction = noisy as f64 / tail_len as f64;
    Some(Classification::new(
        OutroType::NoiseEnd,
        (0.5 + 0.4 * fraction).min(0.9),
        noise_start,
        noise_start - 1.0,
    ))
}

fn loop_fade(ctx: &OutroContext) -> Option<Classification> {
    let c = ctx.config;
    let n = ctx.len();
    let len = n.min(c.loop_max_windows);
    if len < 16 {
        return None;
    }
    let offset = n - len;
    let region = &ctx.totals[offset..];

    let diffs: Vec<f64> = region.windows(2).map(|w| w[1] - w[0]).collect();
    let dc = mean(&diffs);
    let centred: Vec<f64> = diffs.iter().map(|d| d - dc).collect();
    let energy: f64 = centred.iter().map(|d| d * d).sum();
    let modulation = (energy / centred.len() as f64).sqrt();
    if energy <= EPSILON || modulation < c.loop_min_modulation * mean(region) {
        return None;
    }

    let max_period = c.loop_max_period.min(centred.len() / 2);
    let (period, correlation) = (c.loop_min_period..=max_period)
        .map(|p| {
            let sum: f64 = centred.iter().zip(&centred[p..]).map(|(a, b)| a * b).sum();
            (p, sum / energy)
        })
        .max_by(|a, b| a.1.total_cmp(&b.1))?;
    if correlation <= c.loop_min_correlation {
        return None;
    }

    // Whole repetitions aligned to the end of the region
    let blocks = len / period;
    if blocks < 3 {
        return None;
    }
    let block_means: Vec<f64> = (0..blocks)
        .map(|b| {
            let end = len - (blocks - 1 - b) * period;
            mean(&region[end - period..end])
        })
        .collect();
    let decreasing = block_means.windows(2).filter(|w| w[1] < w[0]).count();
    if (decreasing as f64) <= c.loop_decreasing_fraction * (blocks - 1) as f64 {
        return None;
    }

    let half = offset + len / 2;
    let first = ctx.profile(offset..half).shares();
    let second = ctx.profile(half..n).shares();
    if !shares_stable(first, second, c.band_ratio_tolerance) {
        return None;
    }

    let peak = region.iter().copied().fold(0.0f64, f64::max);
    let last_audible = region.iter().rposition(|&t| t >= 0.1 * peak).unwrap_or(len - 1);
    let musical_end = ctx.time_at(offset + last_audible + 1);
    let period_secs = period as f64 * ctx.series.window_secs;

    let mut found = Classification::new(
        OutroType::LoopFade,
        correlation.min(0.95),
        musical_end,
        musical_end - 2.0 * period_secs,
    );
    found.loop_period = Some(period_secs);
    Some(found)
}

fn fade_out(ctx: &OutroContext) -> Option<Classification> {
    let c = ctx.config;
    let n = ctx.len();
    if n < c.fade_min_windows || n < 2 {
        return None;
    }
    let totals = &ctx.totals;

    // Longest suffix with few enough increasing steps
    let mut increases = 0usize;
    let mut fade = None;
    for s in (0..n - 1).rev() {
        if totals[s + 1] > totals[s] {
            increases += 1;
        }
        let windows = n - s;
        if windows >= c.fade_min_windows
            && increases as f64 <= c.fade_max_nonmonotonic * (windows - 1) as f64
        {
            fade = Some((s, increases));
        }
    }
    let (start, increases) = fade?;
    let windows = n - start;

    let start_level = mean(&totals[start..start + 2]);
    let end_level = mean(&totals[n - 2..]);
    if start_level <= EPSILON || end_level >= c.fade_min_drop * start_level {
        return None;
    }

    let energy = &ctx.series.energy;
    let low_mid = |range: std::ops::Range<usize>| {
        (mean(&energy.low[range.clone()]) + EPSILON) / (mean(&energy.mid[range]) + EPSILON)
    };
    let midpoint = start + windows / 2;
    let start_ratio = low_mid(start..start + 2);
    let mid_ratio = low_mid(midpoint - 1..midpoint + 1);
    if (mid_ratio - start_ratio).abs() / start_ratio >= c.fade_max_ratio_change {
        return None;
    }

    if mean(&ctx.series.flux[start..]) >= c.fade_max_flux * mean(&totals[start..]) {
        return None;
    }

    let pre_fade_mid = mean(&energy.mid[start..start + 2]);
    let half_level = (start..n)
        .find(|&i| energy.mid[i] < 0.5 * pre_fade_mid)
        .unwrap_or(n - 1);
    let last_audible = (start..n)
        .rev()
        .find(|&i| totals[i] >= 0.05 * start_level)
        .unwrap_or(start);

    let irregularity = increases as f64 / (windows - 1) as f64;
    Some(Classification::new(
        OutroType::FadeOut,
        0.95 - irregularity,
        ctx.time_at(last_audible + 1),
        ctx.time_at(half_level) - c.fade_crossfade_lead,
    ))
}

fn slow_down(ctx: &OutroContext) -> Option<Classification> {
    let c = ctx.config;
    let n = ctx.len();
    let len = n.min(c.slowdown_windows);
    if len < 3 {
        return None;
    }
    let offset = n - len;
    let flux = &ctx.series.flux[offset..];
    let threshold = c.slowdown_flux_factor * median(flux);

    let onsets: Vec<usize> = (1..len - 1)
        .filter(|&i| {
            flux[i] > threshold && flux[i] > EPSILON && flux[i] >= flux[i - 1] && flux[i] > flux[i + 1]
        })
        .collect();
    let intervals: Vec<f64> = onsets.windows(2).map(|w| (w[1] - w[0]) as f64).collect();
    if intervals.len() < c.slowdown_min_intervals {
        return None;
    }

    let fit = linear_regression(&intervals);
    if fit.slope <= 0.0 || fit.r_squared <= c.slowdown_min_r_squared {
        return None;
    }

    let opening = intervals[0];
    let slowing = intervals
        .iter()
        .position(|&interval| interval > 1.15 * opening)
        .unwrap_or(0);
    let deceleration_start = ctx.time_at(offset + onsets[slowing]);

    let last_onset = onsets[onsets.len() - 1];
    let last_interval = intervals[intervals.len() - 1];
    let musical_end = (ctx.time_at(offset + last_onset) + last_interval * ctx.series.window_secs)
        .min(ctx.series.end_time());

    let mut found = Classification::new(
        OutroType::SlowDown,
        (0.5 + 0.4 * fit.r_squared).min(0.9),
        musical_end,
        deceleration_start,
    );
    found.deceleration_start = Some(deceleration_start);
    Some(found)
}

fn sustained(ctx: &OutroContext) -> Option<Classification> {
    let c = ctx.config;
    let n = ctx.len();
    let offset = n - n.min(c.sustain_scan_windows);
    let threshold = c.sustain_flux_factor * ctx.median_flux + 1e-6;

    // Longest run of quiet-flux windows
    let (mut best_start, mut best_len) = (0, 0);
    let mut run_start = offset;
    for i in offset..=n {
        if i < n && ctx.series.flux[i] <= threshold {
            continue;
        }
        if i - run_start > best_len {
            best_start = run_start;
            best_len = i - run_start;
        }
        run_start = i + 1;
    }
    if best_len < c.sustain_min_windows {
        return None;
    }
    let run = best_start..best_start + best_len;

    let totals = &ctx.totals[run.clone()];
    if mean(totals) < c.silence_energy {
        return None;
    }
    let slope = -ctx.relative_decay(totals);
    if slope <= c.sustain_min_slope || slope > 1e-6 {
        return None;
    }

    let energy = &ctx.series.energy;
    let low_decay = ctx.relative_decay(&energy.low[run.clone()]).max(0.0);
    let limit = 2.0 * low_decay + 0.02;
    if ctx.relative_decay(&energy.mid[run.clone()]) > limit
        || ctx.relative_decay(&energy.high[run.clone()]) > limit
    {
        return None;
    }

    let half = run.start + best_len / 2;
    let first = ctx.profile(run.start..half).shares();
    let second = ctx.profile(half..run.end).shares();
    if !shares_stable(first, second, c.band_ratio_tolerance) {
        return None;
    }

    let onset = ctx.time_at(run.start);
    let run_secs = best_len as f64 * ctx.series.window_secs;
    let mut found = Classification::new(
        OutroType::Sustained,
        0.7,
        ctx.time_at(run.end),
        onset + (run_secs / 2.0).min(4.0),
    );
    found.sustain_onset = Some(onset);
    Some(found)
}

fn musical_outro(ctx: &OutroContext) -> Option<Classification> {
    let c = ctx.config;
    let reference = ctx.mid_profile?;
    let n = ctx.len();
    if n == 0 {
        return None;
    }
    let tail_windows = ((c.musical_tail_secs / ctx.series.window_secs).round() as usize).clamp(1, n);
    let tail_start = n - tail_windows;

    let tail_shares = ctx.profile(tail_start..n).shares();
    let similarity = cosine_similarity(&reference.shares(), &tail_shares);
    if similarity >= c.musical_max_similarity {
        return None;
    }
    if mean(&ctx.totals[tail_start..]) <= c.musical_min_energy * reference.total() {
        return None;
    }

    let mut section = n - 1;
    while section > 0 {
        let from = (section - 1).saturating_sub(SECTION_SMOOTHING - 1);
        let shares = ctx.profile(from..section).shares();
        if cosine_similarity(&shares, &tail_shares) < SECTION_SIMILARITY {
            break;
        }
        section -= 1;
    }

    let section_start = ctx.time_at(section);
    let section_end = ctx.series.end_time();
    let mut found = Classification::new(
        OutroType::MusicalOutro,
        (0.5 + c.musical_max_similarity - similarity).clamp(0.5, 0.85),
        section_end,
        section_start + c.musical_crossfade_fraction * (section_end - section_start),
    );
    found.outro_section_start = Some(section_start);
    Some(found)
}

fn reverb_tail(ctx: &OutroContext) -> Option<Classification> {
    let c = ctx.config;
    let n = ctx.len();
    let window = ctx.series.window_secs;
    let longest = ((c.reverb_max_secs / window).round() as usize).min(n);
    let shortest = ((c.reverb_min_secs / window).round() as usize).max(2);
    if longest < shortest {
        return None;
    }
    let energy = &ctx.series.energy;

    (shortest..=longest).rev().find_map(|tail| {
        let start = n - tail;
        let upper: Vec<f64> = (start..n).map(|i| energy.mid[i] + energy.high[i]).collect();
        let upper_decay = ctx.decay_rate(&upper);
        let low_decay = ctx.decay_rate(&energy.low[start..]);
        if upper_decay <= 0.1 || upper_decay < c.reverb_decay_ratio * low_decay.max(0.05) {
            return None;
        }

        let flux = &ctx.series.flux[start..];
        if mean(flux) <= EPSILON || linear_regression(flux).slope >= 0.0 {
            return None;
        }

        let tail_start = ctx.time_at(start);
        let separation = upper_decay / low_decay.max(0.05);
        Some(Classification::new(
            OutroType::ReverbTail,
            (0.6 + 0.05 * separation).min(0.85),
            tail_start,
            tail_start - 1.0,
        ))
    })
}

fn hard(ctx: &OutroContext) -> Option<Classification> {
    Some(hard_ending(ctx))
}

fn hard_ending(ctx: &OutroContext) -> Classification {
    let c = ctx.config;
    let n = ctx.len();
    let last_second = (1.0 / ctx.series.window_secs).round() as usize;
    let from = n.saturating_sub(last_second.saturating_add(1));
    let cliff = (from..n.saturating_sub(1)).any(|i| {
        ctx.totals[i] > c.silence_energy && ctx.totals[i + 1] < (1.0 - c.hard_drop_ratio) * ctx.totals[i]
    });

    Classification::new(
        OutroType::Hard,
        if cliff { 0.85 } else { 0.6 },
        ctx.content_end,
        ctx.content_end - 2.0,
    )
}
