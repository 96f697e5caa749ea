//! Frequency-response measurement
//!
//! Two views of the same chain: the analytic response computed from the
//! installed coefficients, and a measured response taken by pushing an
//! impulse through the equalizer and transforming the output with an FFT.

use rustfft::{num_complex::Complex, FftPlanner};
use thiserror::Error;
use tracing::debug;
use triband_core::domain::dsp::{ChainPosition, MonoChain};
use triband_core::domain::params::ParameterSource;
use triband_core::domain::processor::Equalizer;

#[derive(Debug, Error, PartialEq)]
pub enum AnalysisError {
    #[error("FFT size must be a power of two, got {0}")]
    InvalidFftSize(usize),

    #[error("Equalizer must be prepared before analysis")]
    NotPrepared,
}

pub type Result<T> = std::result::Result<T, AnalysisError>;

/// One row of a response table
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResponsePoint {
    pub freq: f64,
    pub low_cut_db: f64,
    pub mid_band_db: f64,
    pub high_cut_db: f64,
    pub total_db: f64,
}

/// Linear magnitude to dB, floored at -200 dB
pub fn gain_to_db(gain: f64) -> f64 {
    20.0 * gain.max(1e-10).log10()
}

/// `count` log-spaced frequencies from `start` to `end` Hz inclusive
pub fn log_frequencies(start: f64, end: f64, count: usize) -> Vec<f64> {
    match count {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let ratio = (end / start).ln() / (count - 1) as f64;
            (0..count).map(|i| start * (ratio * i as f64).exp()).collect()
        }
    }
}

/// Analytic response of each chain position at the given frequencies
pub fn response_table(chain: &MonoChain, sample_rate: f64, freqs: &[f64]) -> Vec<ResponsePoint> {
    freqs
        .iter()
        .map(|&freq| {
            let db = |p| gain_to_db(chain.position_magnitude(p, freq, sample_rate));
            let low_cut_db = db(ChainPosition::LowCut);
            let mid_band_db = db(ChainPosition::MidBand);
            let high_cut_db = db(ChainPosition::HighCut);
            ResponsePoint {
                freq,
                low_cut_db,
                mid_band_db,
                high_cut_db,
                total_db: low_cut_db + mid_band_db + high_cut_db,
            }
        })
        .collect()
}

/// Magnitude spectrum measured from an impulse response
#[derive(Debug, Clone)]
pub struct MeasuredResponse {
    sample_rate: f64,
    fft_size: usize,
    /// Linear magnitude for bins `0..=fft_size / 2`
    magnitudes: Vec<f64>,
}

impl MeasuredResponse {
    pub fn bin_width(&self) -> f64 {
        self.sample_rate / self.fft_size as f64
    }

    pub fn magnitudes(&self) -> &[f64] {
        &self.magnitudes
    }

    /// Magnitude in dB of the bin nearest `freq`
    pub fn db_at(&self, freq: f64) -> f64 {
        let bin = (freq / self.bin_width()).round() as usize;
        gain_to_db(self.magnitudes[bin.min(self.magnitudes.len() - 1)])
    }
}

/// Measure the left channel of `equalizer` with an `fft_size`-sample impulse
///
/// The equalizer is reset before and after, so its delay lines are clean
/// for whatever runs next.
pub fn measure_impulse_response<S: ParameterSource>(
    equalizer: &mut Equalizer<S>,
    fft_size: usize,
) -> Result<MeasuredResponse> {
    if !fft_size.is_power_of_two() || fft_size < 2 {
        return Err(AnalysisError::InvalidFftSize(fft_size));
    }
    let spec = equalizer
        .processor()
        .spec()
        .ok_or(AnalysisError::NotPrepared)?;

    let mut left = vec![0.0f32; fft_size];
    let mut right = vec![0.0f32; fft_size];
    left[0] = 1.0;

    equalizer.reset();
    for (l, r) in left
        .chunks_mut(spec.max_block_size)
        .zip(right.chunks_mut(spec.max_block_size))
    {
        equalizer.process(l, r);
    }
    equalizer.reset();

    let mut buffer: Vec<Complex<f64>> = left
        .iter()
        .map(|&x| Complex::new(f64::from(x), 0.0))
        .collect();
    let mut planner = FftPlanner::new();
    let fft = planner.plan_fft_forward(fft_size);
    fft.process(&mut buffer);

    let magnitudes = buffer[..=fft_size / 2].iter().map(|c| c.norm()).collect();
    debug!(fft_size, sample_rate = spec.sample_rate, "Measured impulse response");

    Ok(MeasuredResponse {
        sample_rate: spec.sample_rate,
        fft_size,
        magnitudes,
    })
}
