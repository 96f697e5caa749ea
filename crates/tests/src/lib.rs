//! Signal helpers shared by the integration tests

use triband_core::domain::params::ParameterSource;
use triband_core::domain::processor::Equalizer;

pub const SAMPLE_RATE: f64 = 48000.0;

pub fn generate_sine_wave(frequency: f64, sample_rate: f64, num_samples: usize) -> Vec<f32> {
    (0..num_samples)
        .map(|i| (2.0 * std::f64::consts::PI * frequency * i as f64 / sample_rate).sin() as f32)
        .collect()
}

pub fn generate_silence(num_samples: usize) -> Vec<f32> {
    vec![0.0; num_samples]
}

/// RMS level in dB of `buffer[skip..]`
pub fn rms_db(buffer: &[f32], skip: usize) -> f64 {
    let tail = &buffer[skip.min(buffer.len())..];
    if tail.is_empty() {
        return f64::NEG_INFINITY;
    }
    let power = tail.iter().map(|&s| f64::from(s) * f64::from(s)).sum::<f64>() / tail.len() as f64;
    10.0 * power.max(1e-30).log10()
}

/// Run `left`/`right` through `eq` in blocks of `block` samples
pub fn process_in_blocks<S: ParameterSource>(
    eq: &mut Equalizer<S>,
    left: &mut [f32],
    right: &mut [f32],
    block: usize,
) {
    for (l, r) in left.chunks_mut(block).zip(right.chunks_mut(block)) {
        eq.process(l, r);
    }
}

/// Steady-state gain in dB of a sine at `frequency` through `eq`
pub fn measure_tone_gain<S: ParameterSource>(eq: &mut Equalizer<S>, frequency: f64) -> f64 {
    let len = 48000;
    let block = 512;
    let input = generate_sine_wave(frequency, SAMPLE_RATE, len);
    let mut left = input.clone();
    let mut right = input.clone();
    eq.reset();
    process_in_blocks(eq, &mut left, &mut right, block);
    rms_db(&left, len / 2) - rms_db(&input, len / 2)
}
