//! Duplex equalizer stream
//!
//! Capture and playback run as two CPAL streams. The input callback folds
//! each frame to stereo and pushes it into a lock-free ring; the output
//! callback pops stereo frames, runs them through the equalizer and spreads
//! them over the device's channels. Neither callback locks or allocates.

use super::block::BlockAdapter;
use super::cpal_backend::CpalEnumerator;
use super::lockfree_buffer::{sample_ring, RingConsumer, RingProducer};
use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{Stream, StreamConfig as CpalStreamConfig};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{error, info};
use triband_core::domain::audio::{AudioError, Result, StreamSettings};
use triband_core::domain::params::ParameterSource;
use triband_core::domain::processor::Equalizer;

/// Ring capacity in device blocks
const RING_BLOCKS: usize = 8;

/// Queued blocks beyond which the playback side drops the oldest audio
const MAX_QUEUED_BLOCKS: usize = 4;

/// Underrun/overrun counters shared with the control thread
#[derive(Debug, Default)]
pub struct StreamStats {
    underruns: AtomicUsize,
    overruns: AtomicUsize,
}

impl StreamStats {
    /// Output callbacks that had to pad with silence
    pub fn underruns(&self) -> usize {
        self.underruns.load(Ordering::Relaxed)
    }

    /// Input callbacks that dropped frames because the ring was full
    pub fn overruns(&self) -> usize {
        self.overruns.load(Ordering::Relaxed)
    }
}

/// Fold one interleaved frame to a stereo pair
#[inline]
fn frame_to_stereo(frame: &[f32]) -> [f32; 2] {
    match frame {
        [] => [0.0, 0.0],
        [mono] => [*mono, *mono],
        [l, r, ..] => [*l, *r],
    }
}

/// Spread a stereo pair over one interleaved output frame
#[inline]
fn stereo_to_frame(frame: &mut [f32], [l, r]: [f32; 2]) {
    match frame {
        [] => {}
        [mono] => *mono = 0.5 * (l + r),
        [fl, fr, rest @ ..] => {
            *fl = l;
            *fr = r;
            rest.fill(0.0);
        }
    }
}

/// State owned by the capture callback
pub struct CaptureState {
    producer: RingProducer,
    stats: Arc<StreamStats>,
}

impl CaptureState {
    pub fn new(producer: RingProducer, stats: Arc<StreamStats>) -> Self {
        Self { producer, stats }
    }

    /// Push interleaved device frames as stereo
    pub fn capture(&mut self, data: &[f32], channels: usize) {
        if channels == 0 {
            return;
        }
        let mut dropped = false;
        for frame in data.chunks_exact(channels) {
            if self.producer.free_space() < 2 {
                dropped = true;
                break;
            }
            self.producer.push(&frame_to_stereo(frame));
        }
        if dropped {
            self.stats.overruns.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// State owned by the playback callback
pub struct PlaybackState<S> {
    consumer: RingConsumer,
    adapter: BlockAdapter<S>,
    scratch: Vec<f32>,
    max_queued: usize,
    stats: Arc<StreamStats>,
}

impl<S: ParameterSource> PlaybackState<S> {
    /// `adapter` decides the block size; scratch holds one stereo block
    pub fn new(consumer: RingConsumer, adapter: BlockAdapter<S>, stats: Arc<StreamStats>) -> Self {
        let block = adapter.max_block_size();
        Self {
            consumer,
            scratch: vec![0.0; block * 2],
            max_queued: block * 2 * MAX_QUEUED_BLOCKS,
            adapter,
            stats,
        }
    }

    /// Fill interleaved device frames with equalized input
    ///
    /// Missing input is replaced by silence and counted as an underrun.
    pub fn render(&mut self, data: &mut [f32], channels: usize) {
        if channels == 0 {
            return;
        }

        let queued = self.consumer.len();
        if queued > self.max_queued {
            // Keep latency bounded when capture runs ahead of playback
            let excess = queued - self.max_queued;
            self.consumer.skip(excess - excess % 2);
        }

        let block_frames = self.scratch.len() / 2;
        let mut short = false;
        for out in data.chunks_mut(block_frames * channels) {
            let frames = out.len() / channels;
            let scratch = &mut self.scratch[..frames * 2];

            let got = self.consumer.pop(scratch);
            if got < scratch.len() {
                scratch[got..].fill(0.0);
                short = true;
            }

            self.adapter.process_interleaved(scratch, 2);

            for (frame, pair) in out.chunks_exact_mut(channels).zip(scratch.chunks_exact(2)) {
                stereo_to_frame(frame, [pair[0], pair[1]]);
            }
        }
        if short {
            self.stats.underruns.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn adapter(&self) -> &BlockAdapter<S> {
        &self.adapter
    }
}

/// Running input → equalizer → output stream pair
///
/// Dropping it stops both streams.
pub struct EqStream {
    _input: Stream,
    _output: Stream,
    settings: StreamSettings,
    stats: Arc<StreamStats>,
}

impl EqStream {
    /// Open and start the duplex stream
    pub fn start<S>(enumerator: &CpalEnumerator, settings: &StreamSettings, source: S) -> Result<Self>
    where
        S: ParameterSource + 'static,
    {
        settings.validate()?;
        let input_device = enumerator.find_input(settings.input_device.as_deref())?;
        let output_device = enumerator.find_output(settings.output_device.as_deref())?;

        let input_channels = input_device
            .default_input_config()
            .map_err(|e| AudioError::UnsupportedConfiguration(e.to_string()))?
            .channels();
        let output_channels = output_device
            .default_output_config()
            .map_err(|e| AudioError::UnsupportedConfiguration(e.to_string()))?
            .channels();
        if input_channels == 0 {
            return Err(AudioError::UnsupportedChannels(input_channels));
        }
        if output_channels == 0 {
            return Err(AudioError::UnsupportedChannels(output_channels));
        }

        let block = settings.block_size as usize;
        let sample_rate = settings.sample_rate.hz();
        let stats = Arc::new(StreamStats::default());
        let (producer, consumer) = sample_ring(block * 2 * RING_BLOCKS);

        let adapter = BlockAdapter::new(Equalizer::new(source), f64::from(sample_rate), block);
        let mut capture = CaptureState::new(producer, Arc::clone(&stats));
        let mut playback = PlaybackState::new(consumer, adapter, Arc::clone(&stats));

        let input_config = CpalStreamConfig {
            channels: input_channels,
            sample_rate,
            buffer_size: cpal::BufferSize::Fixed(settings.block_size),
        };
        let output_config = CpalStreamConfig {
            channels: output_channels,
            sample_rate,
            buffer_size: cpal::BufferSize::Fixed(settings.block_size),
        };

        let in_ch = input_channels as usize;
        let input = input_device
            .build_input_stream(
                &input_config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| capture.capture(data, in_ch),
                |err| error!("Input stream error: {}", err),
                None,
            )
            .map_err(|e| AudioError::StreamError(format!("Failed to build input stream: {}", e)))?;

        let out_ch = output_channels as usize;
        let output = output_device
            .build_output_stream(
                &output_config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| playback.render(data, out_ch),
                |err| error!("Output stream error: {}", err),
                None,
            )
            .map_err(|e| AudioError::StreamError(format!("Failed to build output stream: {}", e)))?;

        input
            .play()
            .map_err(|e| AudioError::StreamError(format!("Failed to start input stream: {}", e)))?;
        output
            .play()
            .map_err(|e| AudioError::StreamError(format!("Failed to start output stream: {}", e)))?;

        info!(
            sample_rate,
            block_size = settings.block_size,
            input_channels,
            output_channels,
            "Equalizer stream started"
        );

        Ok(Self {
            _input: input,
            _output: output,
            settings: settings.clone(),
            stats,
        })
    }

    pub fn settings(&self) -> &StreamSettings {
        &self.settings
    }

    pub fn stats(&self) -> &Arc<StreamStats> {
        &self.stats
    }
}
