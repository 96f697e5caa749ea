//! Digital signal processing primitives for the equalizer
//!
//! This module provides the building blocks of the filter chain:
//! - `BiquadCoeffs`: one second-order section, normalised so that a0 = 1
//! - `BiquadFilter`: a Direct Form I section with its own delay line
//! - `CoefficientSet`: a fixed-capacity group of sections produced together
//!
//! Designs live in [`design`], the cascade topology in [`chain`].
//!
//! Everything on the audio path is designed for:
//! - Zero allocations in the hot path
//! - Fixed topology (bypass instead of insert/remove)
//! - Single-precision processing with double-precision design

pub mod chain;
pub mod design;

use num_complex::Complex64;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

pub use chain::{CascadeStage, ChainPosition, CutFilterBank, MidBandFilter, MonoChain};
pub use design::*;

/// Maximum number of sections a cut filter bank can run (48 dB/oct)
pub const MAX_CUT_SECTIONS: usize = 4;

/// Output magnitudes below this are flushed to zero to keep the feedback
/// path out of denormal range on long silent tails.
const DENORMAL_THRESHOLD: f32 = 1.0e-30;

// ============================================================================
// BIQUAD COEFFICIENTS
// ============================================================================

/// Biquad filter coefficients
///
/// Direct Form I implementation for numerical stability.
/// Coefficients are pre-computed to avoid per-sample calculations.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BiquadCoeffs {
    /// Numerator coefficients
    pub b0: f32,
    pub b1: f32,
    pub b2: f32,
    /// Denominator coefficients (a0 is normalized to 1.0)
    pub a1: f32,
    pub a2: f32,
}

impl Default for BiquadCoeffs {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl BiquadCoeffs {
    /// Unity gain, no filtering
    pub const IDENTITY: Self = Self {
        b0: 1.0,
        b1: 0.0,
        b2: 0.0,
        a1: 0.0,
        a2: 0.0,
    };

    /// Normalise raw double-precision coefficients by `a0` and narrow to f32
    pub(crate) fn from_raw(b0: f64, b1: f64, b2: f64, a0: f64, a1: f64, a2: f64) -> Self {
        let inv_a0 = 1.0 / a0;
        Self {
            b0: (b0 * inv_a0) as f32,
            b1: (b1 * inv_a0) as f32,
            b2: (b2 * inv_a0) as f32,
            a1: (a1 * inv_a0) as f32,
            a2: (a2 * inv_a0) as f32,
        }
    }

    /// Complex response H(e^jw) at `freq` Hz
    pub fn frequency_response(&self, freq: f64, sample_rate: f64) -> Complex64 {
        let w = 2.0 * PI * freq / sample_rate;
        let z1 = Complex64::from_polar(1.0, -w);
        let z2 = z1 * z1;

        let num = self.b0 as f64 + z1 * self.b1 as f64 + z2 * self.b2 as f64;
        let den = 1.0 + z1 * self.a1 as f64 + z2 * self.a2 as f64;
        num / den
    }

    /// Linear magnitude at `freq` Hz
    pub fn magnitude_at(&self, freq: f64, sample_rate: f64) -> f64 {
        self.frequency_response(freq, sample_rate).norm()
    }

    /// Roots of z^2 + a1*z + a2
    pub fn poles(&self) -> [Complex64; 2] {
        let a1 = self.a1 as f64;
        let a2 = self.a2 as f64;
        let disc = Complex64::new(a1 * a1 - 4.0 * a2, 0.0).sqrt();
        [(-a1 + disc) / 2.0, (-a1 - disc) / 2.0]
    }

    /// Whether both poles lie strictly inside the unit circle
    pub fn is_stable(&self) -> bool {
        self.poles().iter().all(|p| p.norm() < 1.0)
    }
}

// ============================================================================
// COEFFICIENT SET
// ============================================================================

/// Sections produced by one design call
///
/// Fixed capacity so that building and swapping a set never allocates.
/// A mid-band design fills one section; a cut design fills one section per
/// 12 dB/oct of slope.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoefficientSet {
    sections: [BiquadCoeffs; MAX_CUT_SECTIONS],
    len: usize,
}

impl CoefficientSet {
    /// Set holding a single section
    pub fn single(coeffs: BiquadCoeffs) -> Self {
        let mut sections = [BiquadCoeffs::IDENTITY; MAX_CUT_SECTIONS];
        sections[0] = coeffs;
        Self { sections, len: 1 }
    }

    /// Build from up to `MAX_CUT_SECTIONS` sections
    ///
    /// # Panics
    /// Panics if more than `MAX_CUT_SECTIONS` sections are supplied.
    pub fn from_sections(coeffs: &[BiquadCoeffs]) -> Self {
        assert!(
            coeffs.len() <= MAX_CUT_SECTIONS,
            "coefficient set holds at most {} sections, got {}",
            MAX_CUT_SECTIONS,
            coeffs.len()
        );
        let mut sections = [BiquadCoeffs::IDENTITY; MAX_CUT_SECTIONS];
        sections[..coeffs.len()].copy_from_slice(coeffs);
        Self {
            sections,
            len: coeffs.len(),
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn sections(&self) -> &[BiquadCoeffs] {
        &self.sections[..self.len]
    }

    pub fn get(&self, index: usize) -> Option<&BiquadCoeffs> {
        self.sections().get(index)
    }

    /// Combined magnitude of all sections in cascade
    pub fn magnitude_at(&self, freq: f64, sample_rate: f64) -> f64 {
        self.sections()
            .iter()
            .map(|c| c.magnitude_at(freq, sample_rate))
            .product()
    }

    pub fn is_stable(&self) -> bool {
        self.sections().iter().all(BiquadCoeffs::is_stable)
    }
}

impl std::ops::Index<usize> for CoefficientSet {
    type Output = BiquadCoeffs;

    fn index(&self, index: usize) -> &BiquadCoeffs {
        &self.sections()[index]
    }
}

// ============================================================================
// BIQUAD FILTER
// ============================================================================

/// Stateful biquad filter using Direct Form I
///
/// Direct Form I is chosen over Transposed Direct Form II for:
/// - Better numerical stability with low-frequency filters
/// - Easier coefficient updates without artifacts
///
/// Replacing the coefficients keeps the delay line, so a running stream
/// continues from its current state.
#[derive(Debug, Clone, PartialEq)]
pub struct BiquadFilter {
    coeffs: BiquadCoeffs,
    // Previous input samples (x[n-1], x[n-2])
    x1: f32,
    x2: f32,
    // Previous output samples (y[n-1], y[n-2])
    y1: f32,
    y2: f32,
}

impl BiquadFilter {
    /// Create a new biquad filter with given coefficients
    pub fn new(coeffs: BiquadCoeffs) -> Self {
        Self {
            coeffs,
            x1: 0.0,
            x2: 0.0,
            y1: 0.0,
            y2: 0.0,
        }
    }

    pub fn coeffs(&self) -> &BiquadCoeffs {
        &self.coeffs
    }

    /// Update filter coefficients
    ///
    /// Can be called in real-time for parameter changes.
    pub fn set_coeffs(&mut self, coeffs: BiquadCoeffs) {
        self.coeffs = coeffs;
    }

    /// Process a single sample
    #[inline]
    pub fn process_sample(&mut self, x: f32) -> f32 {
        // Direct Form I: y[n] = b0*x[n] + b1*x[n-1] + b2*x[n-2]
        //                        - a1*y[n-1] - a2*y[n-2]
        let mut y = self.coeffs.b0 * x
            + self.coeffs.b1 * self.x1
            + self.coeffs.b2 * self.x2
            - self.coeffs.a1 * self.y1
            - self.coeffs.a2 * self.y2;

        if y.abs() < DENORMAL_THRESHOLD {
            y = 0.0;
        }

        self.x2 = self.x1;
        self.x1 = x;
        self.y2 = self.y1;
        self.y1 = y;

        y
    }

    /// Process a buffer of samples
    pub fn process(&mut self, buffer: &mut [f32]) {
        for sample in buffer.iter_mut() {
            *sample = self.process_sample(*sample);
        }
    }

    /// Reset filter state
    pub fn reset(&mut self) {
        self.x1 = 0.0;
        self.x2 = 0.0;
        self.y1 = 0.0;
        self.y2 = 0.0;
    }

    /// Whether the delay line holds only zeros
    pub fn is_quiescent(&self) -> bool {
        self.x1 == 0.0 && self.x2 == 0.0 && self.y1 == 0.0 && self.y2 == 0.0
    }
}

impl Default for BiquadFilter {
    fn default() -> Self {
        Self::new(BiquadCoeffs::IDENTITY)
    }
}

// ============================================================================
// TESTS
// ============================================================================
