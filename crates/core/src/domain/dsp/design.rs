//! Coefficient factory
//!
//! Pure functions from a `ParameterSnapshot` and a sample rate to filter
//! coefficients. Nothing here holds state, so the same inputs always give
//! bit-identical coefficients.
//!
//! Designs are computed in f64 via the bilinear transform with frequency
//! prewarping and narrowed to f32 once, at the end.

use super::{BiquadCoeffs, CoefficientSet};
use crate::domain::params::{FilterKind, ParameterSnapshot, Slope};
use std::f64::consts::PI;

/// Highest design frequency as a fraction of the sample rate
///
/// `tan(pi * f / fs)` diverges at Nyquist; keeping the design just under it
/// leaves every section stable even when a 20 kHz control meets a low rate.
const MAX_FREQ_RATIO: f64 = 0.499;

#[inline]
fn design_freq(sample_rate: f64, freq: f64) -> f64 {
    debug_assert!(sample_rate > 0.0, "sample rate must be positive");
    freq.min(sample_rate * MAX_FREQ_RATIO)
}

impl BiquadCoeffs {
    /// Second-order low-pass at `freq` Hz with quality `q`
    #[must_use]
    pub fn low_pass(sample_rate: f64, freq: f64, q: f64) -> Self {
        let n = 1.0 / (PI * design_freq(sample_rate, freq) / sample_rate).tan();
        let n2 = n * n;
        let inv_q = 1.0 / q;

        Self::from_raw(
            1.0,
            2.0,
            1.0,
            1.0 + inv_q * n + n2,
            2.0 * (1.0 - n2),
            1.0 - inv_q * n + n2,
        )
    }

    /// Second-order high-pass at `freq` Hz with quality `q`
    #[must_use]
    pub fn high_pass(sample_rate: f64, freq: f64, q: f64) -> Self {
        let n = (PI * design_freq(sample_rate, freq) / sample_rate).tan();
        let n2 = n * n;
        let inv_q = 1.0 / q;

        Self::from_raw(
            1.0,
            -2.0,
            1.0,
            1.0 + inv_q * n + n2,
            2.0 * (n2 - 1.0),
            1.0 - inv_q * n + n2,
        )
    }

    /// Peaking EQ around `freq` Hz
    ///
    /// `gain` is a linear amplitude factor; 1.0 yields an exact identity.
    #[must_use]
    pub fn peaking(sample_rate: f64, freq: f64, q: f64, gain: f64) -> Self {
        let a = gain.max(1.0e-6).sqrt();
        let omega = 2.0 * PI * design_freq(sample_rate, freq) / sample_rate;
        let alpha = omega.sin() / (2.0 * q);
        let c2 = -2.0 * omega.cos();

        Self::from_raw(
            1.0 + alpha * a,
            c2,
            1.0 - alpha * a,
            1.0 + alpha / a,
            c2,
            1.0 - alpha / a,
        )
    }

    /// Notch (band-reject) at `freq` Hz
    #[must_use]
    pub fn notch(sample_rate: f64, freq: f64, q: f64) -> Self {
        let n = 1.0 / (PI * design_freq(sample_rate, freq) / sample_rate).tan();
        let n2 = n * n;
        let inv_q = 1.0 / q;

        Self::from_raw(
            1.0 + n2,
            2.0 * (1.0 - n2),
            1.0 + n2,
            1.0 + n * inv_q + n2,
            2.0 * (1.0 - n2),
            1.0 - n * inv_q + n2,
        )
    }

    /// Constant-peak band-pass at `freq` Hz (0 dB at the centre)
    #[must_use]
    pub fn band_pass(sample_rate: f64, freq: f64, q: f64) -> Self {
        let n = 1.0 / (PI * design_freq(sample_rate, freq) / sample_rate).tan();
        let n2 = n * n;
        let inv_q = 1.0 / q;

        Self::from_raw(
            n * inv_q,
            0.0,
            -n * inv_q,
            1.0 + n * inv_q + n2,
            2.0 * (1.0 - n2),
            1.0 - n * inv_q + n2,
        )
    }
}

/// Convert decibels to a linear amplitude factor
#[inline]
pub fn db_to_gain(db: f64) -> f64 {
    10.0_f64.powf(db / 20.0)
}

/// Quality factors of the second-order sections of an even-order
/// Butterworth prototype, lowest Q first
///
/// Section `k` of order `N` takes the conjugate pole pair at angle
/// `(2k + 1) * pi / (2N)`, giving `Q_k = 1 / (2 cos((2k + 1) pi / (2N)))`.
pub fn butterworth_qs(slope: Slope) -> impl Iterator<Item = f64> {
    let order = slope.order() as f64;
    (0..slope.sections())
        .map(move |k| 1.0 / (2.0 * ((2.0 * k as f64 + 1.0) * PI / (2.0 * order)).cos()))
}

/// Butterworth high-pass of order `2 * (slope + 1)` as a cascade of sections
pub fn butterworth_high_pass(sample_rate: f64, freq: f64, slope: Slope) -> CoefficientSet {
    let mut sections = [BiquadCoeffs::IDENTITY; super::MAX_CUT_SECTIONS];
    for (section, q) in sections.iter_mut().zip(butterworth_qs(slope)) {
        *section = BiquadCoeffs::high_pass(sample_rate, freq, q);
    }
    CoefficientSet::from_sections(&sections[..slope.sections()])
}

/// Butterworth low-pass of order `2 * (slope + 1)` as a cascade of sections
pub fn butterworth_low_pass(sample_rate: f64, freq: f64, slope: Slope) -> CoefficientSet {
    let mut sections = [BiquadCoeffs::IDENTITY; super::MAX_CUT_SECTIONS];
    for (section, q) in sections.iter_mut().zip(butterworth_qs(slope)) {
        *section = BiquadCoeffs::low_pass(sample_rate, freq, q);
    }
    CoefficientSet::from_sections(&sections[..slope.sections()])
}

/// Peak filter from the mid-band controls
pub fn make_peak(snapshot: &ParameterSnapshot, sample_rate: f64) -> CoefficientSet {
    CoefficientSet::single(BiquadCoeffs::peaking(
        sample_rate,
        snapshot.peak_freq as f64,
        snapshot.peak_quality as f64,
        db_to_gain(snapshot.peak_gain_db as f64),
    ))
}

/// Notch filter from the mid-band controls (gain is ignored)
pub fn make_notch(snapshot: &ParameterSnapshot, sample_rate: f64) -> CoefficientSet {
    CoefficientSet::single(BiquadCoeffs::notch(
        sample_rate,
        snapshot.peak_freq as f64,
        snapshot.peak_quality as f64,
    ))
}

/// Band-pass filter from the mid-band controls (gain is ignored)
pub fn make_band_pass(snapshot: &ParameterSnapshot, sample_rate: f64) -> CoefficientSet {
    CoefficientSet::single(BiquadCoeffs::band_pass(
        sample_rate,
        snapshot.peak_freq as f64,
        snapshot.peak_quality as f64,
    ))
}

/// Mid-band coefficients for the selected filter kind
pub fn make_chosen_mid_band(snapshot: &ParameterSnapshot, sample_rate: f64) -> CoefficientSet {
    match snapshot.filter_kind {
        FilterKind::Peak => make_peak(snapshot, sample_rate),
        FilterKind::Notch => make_notch(snapshot, sample_rate),
        FilterKind::BandPass => make_band_pass(snapshot, sample_rate),
    }
}

/// Low-cut (high-pass) bank for the low-cut frequency and slope
pub fn make_low_cut_bank(snapshot: &ParameterSnapshot, sample_rate: f64) -> CoefficientSet {
    butterworth_high_pass(
        sample_rate,
        snapshot.low_cut_freq as f64,
        snapshot.low_cut_slope,
    )
}

/// High-cut (low-pass) bank for the high-cut frequency and slope
pub fn make_high_cut_bank(snapshot: &ParameterSnapshot, sample_rate: f64) -> CoefficientSet {
    butterworth_low_pass(
        sample_rate,
        snapshot.high_cut_freq as f64,
        snapshot.high_cut_slope,
    )
}
