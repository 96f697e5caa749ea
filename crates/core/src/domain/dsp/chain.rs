//! Fixed-topology filter cascade
//!
//! A `MonoChain` is always `low-cut bank -> mid-band filter -> high-cut bank`.
//! Each cut bank owns four stages; the slope decides how many of them run and
//! the rest are bypassed, so changing the slope never reallocates and never
//! changes the shape of the processing loop.

use super::{BiquadCoeffs, BiquadFilter, CoefficientSet, MAX_CUT_SECTIONS};
use crate::domain::params::Slope;

/// One second-order section in a cascade
///
/// A bypassed stage passes samples through untouched and leaves its delay
/// line alone.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CascadeStage {
    filter: BiquadFilter,
    bypassed: bool,
}

impl CascadeStage {
    pub fn new(coeffs: BiquadCoeffs) -> Self {
        Self {
            filter: BiquadFilter::new(coeffs),
            bypassed: false,
        }
    }

    pub fn coeffs(&self) -> &BiquadCoeffs {
        self.filter.coeffs()
    }

    /// Replace the coefficients, keeping the running state
    pub fn set_coeffs(&mut self, coeffs: BiquadCoeffs) {
        self.filter.set_coeffs(coeffs);
    }

    pub fn is_bypassed(&self) -> bool {
        self.bypassed
    }

    pub fn set_bypassed(&mut self, bypassed: bool) {
        self.bypassed = bypassed;
    }

    #[inline]
    pub fn process_sample(&mut self, x: f32) -> f32 {
        if self.bypassed {
            x
        } else {
            self.filter.process_sample(x)
        }
    }

    pub fn reset(&mut self) {
        self.filter.reset();
    }

    pub fn filter(&self) -> &BiquadFilter {
        &self.filter
    }
}

// ============================================================================
// CUT FILTER BANK
// ============================================================================

/// Slope-controlled cascade of up to four sections
#[derive(Debug, Clone, PartialEq)]
pub struct CutFilterBank {
    stages: [CascadeStage; MAX_CUT_SECTIONS],
}

impl CutFilterBank {
    /// Create a bank with every stage bypassed
    pub fn new() -> Self {
        let mut stage = CascadeStage::default();
        stage.set_bypassed(true);
        Self {
            stages: std::array::from_fn(|_| stage.clone()),
        }
    }

    /// Activate the first `slope.sections()` stages with `coeffs`
    ///
    /// Every stage is bypassed first, then stages `0..=slope.index()` get
    /// their section and are enabled, so the active stages always form a
    /// contiguous prefix.
    ///
    /// # Panics
    /// Panics if `coeffs` holds fewer sections than the slope needs.
    pub fn apply_slope(&mut self, coeffs: &CoefficientSet, slope: Slope) {
        assert!(
            coeffs.len() >= slope.sections(),
            "{} needs {} sections, coefficient set has {}",
            slope,
            slope.sections(),
            coeffs.len()
        );

        for stage in &mut self.stages {
            stage.set_bypassed(true);
        }

        for i in 0..=slope.index() {
            let stage = &mut self.stages[i];
            stage.set_coeffs(coeffs[i]);
            stage.set_bypassed(false);
        }
    }

    #[inline]
    pub fn process_sample(&mut self, x: f32) -> f32 {
        self.stages
            .iter_mut()
            .fold(x, |acc, stage| stage.process_sample(acc))
    }

    pub fn stages(&self) -> &[CascadeStage] {
        &self.stages
    }

    pub fn stage(&self, index: usize) -> Option<&CascadeStage> {
        self.stages.get(index)
    }

    pub fn active_stages(&self) -> usize {
        self.stages.iter().filter(|s| !s.is_bypassed()).count()
    }

    /// Coefficients of the active stages, in processing order
    pub fn active_coefficients(&self) -> CoefficientSet {
        let mut sections = [BiquadCoeffs::IDENTITY; MAX_CUT_SECTIONS];
        let mut len = 0;
        for stage in self.stages.iter().filter(|s| !s.is_bypassed()) {
            sections[len] = *stage.coeffs();
            len += 1;
        }
        CoefficientSet::from_sections(&sections[..len])
    }

    pub fn reset(&mut self) {
        for stage in &mut self.stages {
            stage.reset();
        }
    }
}

impl Default for CutFilterBank {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// MID-BAND FILTER
// ============================================================================

/// Single always-active section whose response is chosen by the filter kind
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MidBandFilter {
    stage: CascadeStage,
}

impl MidBandFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Swap in the first section of `coeffs`
    pub fn set_coefficients(&mut self, coeffs: &CoefficientSet) {
        self.stage.set_coeffs(coeffs[0]);
    }

    pub fn coeffs(&self) -> &BiquadCoeffs {
        self.stage.coeffs()
    }

    #[inline]
    pub fn process_sample(&mut self, x: f32) -> f32 {
        self.stage.process_sample(x)
    }

    pub fn reset(&mut self) {
        self.stage.reset();
    }
}

// ============================================================================
// MONO CHAIN
// ============================================================================

/// Position of a filter in the mono chain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainPosition {
    LowCut,
    MidBand,
    HighCut,
}

/// Single-channel pipeline: low-cut, mid band, high-cut
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MonoChain {
    low_cut: CutFilterBank,
    mid_band: MidBandFilter,
    high_cut: CutFilterBank,
}

impl MonoChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn low_cut(&self) -> &CutFilterBank {
        &self.low_cut
    }

    pub fn low_cut_mut(&mut self) -> &mut CutFilterBank {
        &mut self.low_cut
    }

    pub fn mid_band(&self) -> &MidBandFilter {
        &self.mid_band
    }

    pub fn mid_band_mut(&mut self) -> &mut MidBandFilter {
        &mut self.mid_band
    }

    pub fn high_cut(&self) -> &CutFilterBank {
        &self.high_cut
    }

    pub fn high_cut_mut(&mut self) -> &mut CutFilterBank {
        &mut self.high_cut
    }

    /// Run one sample through every active stage
    #[inline]
    pub fn process_sample(&mut self, x: f32) -> f32 {
        let y = self.low_cut.process_sample(x);
        let y = self.mid_band.process_sample(y);
        self.high_cut.process_sample(y)
    }

    /// Process a single-channel block in place
    pub fn process(&mut self, buffer: &mut [f32]) {
        for sample in buffer.iter_mut() {
            *sample = self.process_sample(*sample);
        }
    }

    /// Combined magnitude of one position at `freq` Hz
    pub fn position_magnitude(&self, position: ChainPosition, freq: f64, sample_rate: f64) -> f64 {
        match position {
            ChainPosition::LowCut => self.low_cut.active_coefficients().magnitude_at(freq, sample_rate),
            ChainPosition::MidBand => self.mid_band.coeffs().magnitude_at(freq, sample_rate),
            ChainPosition::HighCut => self.high_cut.active_coefficients().magnitude_at(freq, sample_rate),
        }
    }

    /// Magnitude of the whole chain at `freq` Hz
    pub fn magnitude_at(&self, freq: f64, sample_rate: f64) -> f64 {
        [ChainPosition::LowCut, ChainPosition::MidBand, ChainPosition::HighCut]
            .into_iter()
            .map(|p| self.position_magnitude(p, freq, sample_rate))
            .product()
    }

    /// Clear every delay line
    pub fn reset(&mut self) {
        self.low_cut.reset();
        self.mid_band.reset();
        self.high_cut.reset();
    }
}
