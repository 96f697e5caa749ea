//! Stereo processor and per-block update orchestration
//!
//! `StereoProcessor` owns one `MonoChain` per channel. `update_all` derives
//! every coefficient set from one snapshot and swaps it into both channels.
//! `Equalizer` ties the two together behind the block callback surface:
//! `prepare` once, then `process` per block, which refreshes coefficients
//! from its `ParameterSource` before touching any sample.

use crate::domain::dsp::{
    make_chosen_mid_band, make_high_cut_bank, make_low_cut_bank, MonoChain,
};
use crate::domain::params::{ParameterSnapshot, ParameterSource};
use tracing::{debug, trace};

/// Sample rate and block size fixed by `prepare`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProcessSpec {
    pub sample_rate: f64,
    pub max_block_size: usize,
}

impl ProcessSpec {
    /// # Panics
    /// Panics if the sample rate is not a positive finite number or the
    /// block size is zero.
    pub fn new(sample_rate: f64, max_block_size: usize) -> Self {
        assert!(
            sample_rate.is_finite() && sample_rate > 0.0,
            "sample rate must be positive, got {sample_rate}"
        );
        assert!(max_block_size > 0, "max block size must be positive");
        Self {
            sample_rate,
            max_block_size,
        }
    }
}

/// Two independent mono chains
#[derive(Debug, Clone, Default)]
pub struct StereoProcessor {
    left: MonoChain,
    right: MonoChain,
    spec: Option<ProcessSpec>,
}

impl StereoProcessor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Initialise both channels for `sample_rate` and `max_block_size`
    ///
    /// Clears every delay line. Must be called before `process` and again
    /// whenever the sample rate changes.
    pub fn prepare(&mut self, sample_rate: f64, max_block_size: usize) {
        let spec = ProcessSpec::new(sample_rate, max_block_size);
        self.left.reset();
        self.right.reset();
        self.spec = Some(spec);
        debug!(sample_rate, max_block_size, "Stereo processor prepared");
    }

    pub fn spec(&self) -> Option<ProcessSpec> {
        self.spec
    }

    pub fn is_prepared(&self) -> bool {
        self.spec.is_some()
    }

    pub fn left(&self) -> &MonoChain {
        &self.left
    }

    pub fn right(&self) -> &MonoChain {
        &self.right
    }

    pub(crate) fn chains_mut(&mut self) -> [&mut MonoChain; 2] {
        [&mut self.left, &mut self.right]
    }

    /// Process one planar stereo block in place
    ///
    /// # Panics
    /// Panics if called before `prepare`, if the channels differ in length,
    /// or if the block exceeds the prepared maximum.
    pub fn process(&mut self, left: &mut [f32], right: &mut [f32]) {
        let spec = self
            .spec
            .expect("StereoProcessor::process called before prepare");
        assert_eq!(
            left.len(),
            right.len(),
            "left and right blocks must have equal length"
        );
        assert!(
            left.len() <= spec.max_block_size,
            "block of {} samples exceeds prepared maximum of {}",
            left.len(),
            spec.max_block_size
        );

        self.left.process(left);
        self.right.process(right);
    }

    /// Clear every delay line without touching coefficients
    pub fn reset(&mut self) {
        self.left.reset();
        self.right.reset();
    }
}

/// Recompute every coefficient set from `snapshot` and swap it into both
/// channels
///
/// Order is low-cut, mid band, high-cut. Coefficient sets are fixed-size
/// values, so this never allocates and is safe to run on the audio thread.
pub fn update_all(processor: &mut StereoProcessor, snapshot: &ParameterSnapshot, sample_rate: f64) {
    let low_cut = make_low_cut_bank(snapshot, sample_rate);
    for chain in processor.chains_mut() {
        chain.low_cut_mut().apply_slope(&low_cut, snapshot.low_cut_slope);
    }

    let mid = make_chosen_mid_band(snapshot, sample_rate);
    for chain in processor.chains_mut() {
        chain.mid_band_mut().set_coefficients(&mid);
    }

    let high_cut = make_high_cut_bank(snapshot, sample_rate);
    for chain in processor.chains_mut() {
        chain.high_cut_mut().apply_slope(&high_cut, snapshot.high_cut_slope);
    }
}

/// Three-band equalizer driven by a parameter source
///
/// Low-cut and high-cut with 12-48 dB/oct Butterworth slopes around a
/// peak, notch or band-pass mid band, applied to left and right
/// independently.
#[derive(Debug)]
pub struct Equalizer<S> {
    source: S,
    processor: StereoProcessor,
    last_snapshot: Option<ParameterSnapshot>,
}

impl<S: ParameterSource> Equalizer<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            processor: StereoProcessor::new(),
            last_snapshot: None,
        }
    }

    /// (Re)initialise for a sample rate and maximum block size
    ///
    /// Clears every delay line and installs coefficients for the current
    /// parameters so the first block is already filtered correctly.
    pub fn prepare(&mut self, sample_rate: f64, max_block_size: usize) {
        self.processor.prepare(sample_rate, max_block_size);
        self.last_snapshot = None;
        self.refresh();
    }

    /// Read the parameter source
    pub fn current_snapshot(&self) -> ParameterSnapshot {
        self.source.snapshot()
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn processor(&self) -> &StereoProcessor {
        &self.processor
    }

    /// Snapshot the parameters and swap coefficients into both channels
    ///
    /// Returns the snapshot that was applied.
    pub fn refresh(&mut self) -> ParameterSnapshot {
        let spec = self
            .processor
            .spec()
            .expect("Equalizer::refresh called before prepare");
        let snapshot = self.source.snapshot();
        update_all(&mut self.processor, &snapshot, spec.sample_rate);

        if self.last_snapshot != Some(snapshot) {
            trace!(
                "EQ updated: LC={:.0}Hz/{}, {}={:.0}Hz {:.1}dB Q{:.2}, HC={:.0}Hz/{}",
                snapshot.low_cut_freq,
                snapshot.low_cut_slope,
                snapshot.filter_kind,
                snapshot.peak_freq,
                snapshot.peak_gain_db,
                snapshot.peak_quality,
                snapshot.high_cut_freq,
                snapshot.high_cut_slope
            );
            self.last_snapshot = Some(snapshot);
        }
        snapshot
    }

    /// Process one stereo block in place
    ///
    /// Coefficients are refreshed from a single snapshot before any sample
    /// of the block is processed, so both channels see the same parameters.
    pub fn process(&mut self, left: &mut [f32], right: &mut [f32]) {
        self.refresh();
        self.processor.process(left, right);
    }

    /// Clear delay lines (e.g. on transport stop)
    pub fn reset(&mut self) {
        self.processor.reset();
    }

    /// Magnitude of the left chain at `freq` Hz with its current coefficients
    pub fn magnitude_at(&self, freq: f64) -> Option<f64> {
        let spec = self.processor.spec()?;
        Some(self.processor.left().magnitude_at(freq, spec.sample_rate))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::params::{FilterKind, ParamId, ParameterStore, Slope};
    use std::sync::Arc;

    const SAMPLE_RATE: f64 = 48000.0;
    const BLOCK: usize = 512;

    fn generate_test_signal(samples: usize, frequency: f32) -> Vec<f32> {
        (0..samples)
            .map(|i| (2.0 * std::f32::consts::PI * frequency * i as f32 / SAMPLE_RATE as f32).sin())
            .collect()
    }

    fn peak_of(buffer: &[f32]) -> f32 {
        buffer.iter().map(|s| s.abs()).fold(0.0_f32, f32::max)
    }

    fn busy_snapshot() -> ParameterSnapshot {
        ParameterSnapshot {
            low_cut_freq: 150.0,
            high_cut_freq: 6000.0,
            filter_kind: FilterKind::Peak,
            peak_freq: 1200.0,
            peak_gain_db: 9.0,
            peak_quality: 0.8,
            low_cut_slope: Slope::Db36,
            high_cut_slope: Slope::Db24,
        }
    }

    #[test]
    fn test_update_all_keeps_channels_identical() {
        let mut processor = StereoProcessor::new();
        processor.prepare(SAMPLE_RATE, BLOCK);
        update_all(&mut processor, &busy_snapshot(), SAMPLE_RATE);

        assert_eq!(processor.left(), processor.right());
        assert_eq!(processor.left().low_cut().active_stages(), 3);
        assert_eq!(processor.left().high_cut().active_stages(), 2);
        assert_eq!(
            processor.left().low_cut().active_coefficients(),
            make_low_cut_bank(&busy_snapshot(), SAMPLE_RATE)
        );
        assert_eq!(
            processor.right().mid_band().coeffs(),
            &make_chosen_mid_band(&busy_snapshot(), SAMPLE_RATE)[0]
        );
    }

    #[test]
    fn test_zero_block_stays_zero() {
        let mut eq = Equalizer::new(busy_snapshot());
        eq.prepare(SAMPLE_RATE, BLOCK);

        let mut left = vec![0.0; BLOCK];
        let mut right = vec![0.0; BLOCK];
        eq.process(&mut left, &mut right);

        assert!(left.iter().all(|&s| s == 0.0));
        assert!(right.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_channels_are_independent() {
        let mut eq = Equalizer::new(busy_snapshot());
        eq.prepare(SAMPLE_RATE, BLOCK);

        let mut left = generate_test_signal(BLOCK, 1000.0);
        let mut right = vec![0.0; BLOCK];
        eq.process(&mut left, &mut right);

        assert!(peak_of(&left) > 0.1);
        assert!(right.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_low_cut_attenuates_rumble() {
        let store = Arc::new(ParameterStore::new());
        store.set(ParamId::LowCutFreq, 1000.0);
        store.set_low_cut_slope(Slope::Db48);

        let mut eq = Equalizer::new(Arc::clone(&store));
        eq.prepare(SAMPLE_RATE, 4800);

        let mut left = generate_test_signal(4800, 100.0);
        let mut right = left.clone();
        eq.process(&mut left, &mut right);

        // Skip the transient, then the 100 Hz tone should be gone
        assert!(peak_of(&left[2400..]) < 0.01);
    }

    #[test]
    fn test_store_edits_apply_on_next_block() {
        let store = Arc::new(ParameterStore::new());
        let mut eq = Equalizer::new(Arc::clone(&store));
        eq.prepare(SAMPLE_RATE, BLOCK);

        let mut left = vec![0.0; BLOCK];
        let mut right = vec![0.0; BLOCK];
        eq.process(&mut left, &mut right);
        assert_eq!(eq.processor().left().low_cut().active_stages(), 1);

        store.set(ParamId::LowCutSlope, 3.0);
        store.set_filter_kind(FilterKind::Notch);
        eq.process(&mut left, &mut right);

        assert_eq!(eq.processor().left().low_cut().active_stages(), 4);
        assert_eq!(eq.processor().right().low_cut().active_stages(), 4);
        let notch = make_chosen_mid_band(&store.snapshot(), SAMPLE_RATE);
        assert_eq!(eq.processor().left().mid_band().coeffs(), &notch[0]);
    }

    #[test]
    fn test_prepare_installs_coefficients() {
        let eq = {
            let mut eq = Equalizer::new(busy_snapshot());
            eq.prepare(SAMPLE_RATE, BLOCK);
            eq
        };
        let gain_db = 20.0 * eq.magnitude_at(1200.0).unwrap().log10();
        // Peak boost minus a little from the surrounding cuts
        assert!((gain_db - 9.0).abs() < 0.5, "gain was {gain_db}");
    }

    #[test]
    fn test_unprepared_equalizer_has_no_response() {
        let eq = Equalizer::new(ParameterSnapshot::default());
        assert!(eq.magnitude_at(1000.0).is_none());
    }

    #[test]
    #[should_panic(expected = "before prepare")]
    fn test_process_before_prepare_panics() {
        let mut processor = StereoProcessor::new();
        processor.process(&mut [0.0; 4], &mut [0.0; 4]);
    }

    #[test]
    #[should_panic(expected = "equal length")]
    fn test_mismatched_channels_panic() {
        let mut processor = StereoProcessor::new();
        processor.prepare(SAMPLE_RATE, BLOCK);
        processor.process(&mut [0.0; 4], &mut [0.0; 5]);
    }

    #[test]
    #[should_panic(expected = "exceeds prepared maximum")]
    fn test_oversized_block_panics() {
        let mut processor = StereoProcessor::new();
        processor.prepare(SAMPLE_RATE, 16);
        processor.process(&mut [0.0; 32], &mut [0.0; 32]);
    }

    #[test]
    #[should_panic(expected = "sample rate must be positive")]
    fn test_prepare_rejects_zero_rate() {
        StereoProcessor::new().prepare(0.0, BLOCK);
    }

    #[test]
    #[should_panic(expected = "block size must be positive")]
    fn test_prepare_rejects_zero_block() {
        StereoProcessor::new().prepare(SAMPLE_RATE, 0);
    }

    #[test]
    fn test_prepare_clears_state() {
        let mut eq = Equalizer::new(busy_snapshot());
        eq.prepare(SAMPLE_RATE, BLOCK);

        let mut left = generate_test_signal(BLOCK, 440.0);
        let mut right = left.clone();
        eq.process(&mut left, &mut right);

        eq.prepare(44100.0, BLOCK);
        let mut left = vec![0.0; BLOCK];
        let mut right = vec![0.0; BLOCK];
        eq.process(&mut left, &mut right);
        assert!(left.iter().chain(right.iter()).all(|&s| s == 0.0));
    }
}
