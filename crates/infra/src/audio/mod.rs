//! Platform audio backend built on CPAL
//!
//! CPAL abstracts the platform APIs:
//! - Windows: WASAPI
//! - Linux: ALSA/PulseAudio
//! - macOS: CoreAudio

pub mod block;
pub mod cpal_backend;
pub mod lockfree_buffer;
pub mod stream;

pub use block::BlockAdapter;
pub use cpal_backend::CpalEnumerator;
pub use lockfree_buffer::{sample_ring, RingConsumer, RingProducer};
pub use stream::{CaptureState, EqStream, PlaybackState, StreamStats};
