//! Interleaved device buffers to planar equalizer blocks
//!
//! Device callbacks hand over interleaved frames of arbitrary length. The
//! adapter splits them into chunks of at most `max_block_size` frames,
//! deinterleaves into preallocated planar scratch, runs the equalizer and
//! writes the result back in place.

use triband_core::domain::params::ParameterSource;
use triband_core::domain::processor::Equalizer;

/// Equalizer wrapper for interleaved callbacks
#[derive(Debug)]
pub struct BlockAdapter<S> {
    equalizer: Equalizer<S>,
    left: Vec<f32>,
    right: Vec<f32>,
    max_block_size: usize,
}

impl<S: ParameterSource> BlockAdapter<S> {
    /// Prepare `equalizer` and allocate scratch for `max_block_size` frames
    pub fn new(mut equalizer: Equalizer<S>, sample_rate: f64, max_block_size: usize) -> Self {
        equalizer.prepare(sample_rate, max_block_size);
        Self {
            equalizer,
            left: vec![0.0; max_block_size],
            right: vec![0.0; max_block_size],
            max_block_size,
        }
    }

    pub fn equalizer(&self) -> &Equalizer<S> {
        &self.equalizer
    }

    pub fn max_block_size(&self) -> usize {
        self.max_block_size
    }

    /// Process interleaved frames in place
    ///
    /// Mono buffers run through the left chain only. With more than two
    /// channels the first two are equalized and the rest pass through.
    /// Trailing samples that do not form a whole frame are left untouched.
    pub fn process_interleaved(&mut self, data: &mut [f32], channels: usize) {
        if channels == 0 {
            return;
        }

        let frames = data.len() / channels;
        let whole = &mut data[..frames * channels];

        for chunk in whole.chunks_mut(self.max_block_size * channels) {
            let n = chunk.len() / channels;
            let (left, right) = (&mut self.left[..n], &mut self.right[..n]);

            for (i, frame) in chunk.chunks_exact(channels).enumerate() {
                left[i] = frame[0];
                right[i] = if channels > 1 { frame[1] } else { 0.0 };
            }

            self.equalizer.process(left, right);

            for (i, frame) in chunk.chunks_exact_mut(channels).enumerate() {
                frame[0] = left[i];
                if channels > 1 {
                    frame[1] = right[i];
                }
            }
        }
    }

    /// Process planar stereo of any length in place
    pub fn process_planar(&mut self, left: &mut [f32], right: &mut [f32]) {
        assert_eq!(left.len(), right.len(), "left and right must have equal length");
        for (l, r) in left
            .chunks_mut(self.max_block_size)
            .zip(right.chunks_mut(self.max_block_size))
        {
            self.equalizer.process(l, r);
        }
    }

    pub fn reset(&mut self) {
        self.equalizer.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use triband_core::domain::params::{FilterKind, ParameterSnapshot, Slope};

    const SAMPLE_RATE: f64 = 48000.0;

    fn snapshot() -> ParameterSnapshot {
        ParameterSnapshot {
            low_cut_freq: 120.0,
            high_cut_freq: 9000.0,
            filter_kind: FilterKind::Peak,
            peak_freq: 2000.0,
            peak_gain_db: -6.0,
            peak_quality: 2.0,
            low_cut_slope: Slope::Db24,
            high_cut_slope: Slope::Db12,
        }
    }

    fn signal(frames: usize, seed: f32) -> Vec<f32> {
        (0..frames)
            .map(|i| ((i as f32 * 0.37 + seed).sin() * 0.5 + (i as f32 * 0.011).cos() * 0.3))
            .collect()
    }

    fn interleave(left: &[f32], right: &[f32]) -> Vec<f32> {
        left.iter().zip(right).flat_map(|(&l, &r)| [l, r]).collect()
    }

    #[test]
    fn test_interleaved_matches_planar() {
        let frames = 1000;
        let left = signal(frames, 0.0);
        let right = signal(frames, 1.3);

        let mut planar = BlockAdapter::new(Equalizer::new(snapshot()), SAMPLE_RATE, 128);
        let (mut l, mut r) = (left.clone(), right.clone());
        planar.process_planar(&mut l, &mut r);

        let mut interleaved = BlockAdapter::new(Equalizer::new(snapshot()), SAMPLE_RATE, 128);
        let mut data = interleave(&left, &right);
        interleaved.process_interleaved(&mut data, 2);

        assert_eq!(data, interleave(&l, &r));
    }

    #[test]
    fn test_chunking_is_transparent() {
        // 1000 frames through 64-frame blocks equals one 1000-frame block
        let frames = 1000;
        let left = signal(frames, 0.2);
        let right = signal(frames, 2.1);

        let mut whole = Equalizer::new(snapshot());
        whole.prepare(SAMPLE_RATE, frames);
        let (mut l, mut r) = (left.clone(), right.clone());
        whole.process(&mut l, &mut r);

        let mut adapter = BlockAdapter::new(Equalizer::new(snapshot()), SAMPLE_RATE, 64);
        let mut data = interleave(&left, &right);
        adapter.process_interleaved(&mut data, 2);

        assert_eq!(data, interleave(&l, &r));
    }

    #[test]
    fn test_extra_channels_pass_through() {
        let frames = 32;
        let mut data: Vec<f32> = (0..frames * 4).map(|i| i as f32 * 0.01).collect();
        let original = data.clone();

        let mut adapter = BlockAdapter::new(Equalizer::new(snapshot()), SAMPLE_RATE, 16);
        adapter.process_interleaved(&mut data, 4);

        for (frame, orig) in data.chunks_exact(4).zip(original.chunks_exact(4)) {
            assert_eq!(frame[2..], orig[2..]);
        }
        assert_ne!(data, original);
    }

    #[test]
    fn test_mono_and_partial_frames() {
        let mut adapter = BlockAdapter::new(Equalizer::new(snapshot()), SAMPLE_RATE, 16);
        let mut mono = vec![0.0; 40];
        adapter.process_interleaved(&mut mono, 1);
        assert!(mono.iter().all(|&s| s == 0.0));

        // Odd tail sample in a stereo buffer is not touched
        let mut stereo = vec![0.0; 9];
        stereo[8] = 0.75;
        adapter.process_interleaved(&mut stereo, 2);
        assert_eq!(stereo[8], 0.75);

        adapter.process_interleaved(&mut stereo, 0);
    }
}
