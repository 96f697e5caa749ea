//! Lock-free sample FIFO between the capture and playback callbacks
//!
//! The input callback owns the `RingProducer`, the output callback owns the
//! `RingConsumer`. Positions are free-running counters in cache-padded
//! atomics; the slot index is `pos & mask`.
//!
//! Performance characteristics:
//! - Wait-free for the single producer and single consumer
//! - No allocations after construction

use crossbeam::utils::CachePadded;
use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

struct Shared {
    slots: Box<[UnsafeCell<f32>]>,
    write_pos: CachePadded<AtomicUsize>,
    read_pos: CachePadded<AtomicUsize>,
    mask: usize,
}

// SAFETY: a slot is written only by the producer while it lies outside
// `read_pos..write_pos`, and read only by the consumer while inside it.
// The Release/Acquire pair on the counters orders those accesses.
unsafe impl Sync for Shared {}

impl Shared {
    fn capacity(&self) -> usize {
        self.mask + 1
    }

    fn len(&self) -> usize {
        let write_pos = self.write_pos.load(Ordering::Acquire);
        let read_pos = self.read_pos.load(Ordering::Acquire);
        write_pos.wrapping_sub(read_pos)
    }
}

/// Create a ring holding at least `capacity` samples
///
/// Capacity is rounded up to the next power of two.
pub fn sample_ring(capacity: usize) -> (RingProducer, RingConsumer) {
    let capacity = capacity.max(1).next_power_of_two();
    let slots = (0..capacity).map(|_| UnsafeCell::new(0.0)).collect();
    let shared = Arc::new(Shared {
        slots,
        write_pos: CachePadded::new(AtomicUsize::new(0)),
        read_pos: CachePadded::new(AtomicUsize::new(0)),
        mask: capacity - 1,
    });
    (
        RingProducer {
            shared: Arc::clone(&shared),
        },
        RingConsumer { shared },
    )
}

/// Writing half of the ring
pub struct RingProducer {
    shared: Arc<Shared>,
}

impl RingProducer {
    /// Push as many samples as fit
    ///
    /// Returns the number written; the rest is dropped.
    pub fn push(&mut self, samples: &[f32]) -> usize {
        let shared = &*self.shared;
        let write_pos = shared.write_pos.load(Ordering::Relaxed);
        let read_pos = shared.read_pos.load(Ordering::Acquire);

        let free = shared.capacity() - write_pos.wrapping_sub(read_pos);
        let to_write = samples.len().min(free);

        for (i, &sample) in samples[..to_write].iter().enumerate() {
            let slot = &shared.slots[write_pos.wrapping_add(i) & shared.mask];
            // SAFETY: slot is outside the readable region, see `Shared`
            unsafe { *slot.get() = sample };
        }

        shared
            .write_pos
            .store(write_pos.wrapping_add(to_write), Ordering::Release);
        to_write
    }

    pub fn free_space(&self) -> usize {
        self.shared.capacity() - self.shared.len()
    }

    pub fn capacity(&self) -> usize {
        self.shared.capacity()
    }
}

/// Reading half of the ring
pub struct RingConsumer {
    shared: Arc<Shared>,
}

impl RingConsumer {
    /// Pop up to `out.len()` samples
    ///
    /// Returns the number read; the tail of `out` is left untouched.
    pub fn pop(&mut self, out: &mut [f32]) -> usize {
        let shared = &*self.shared;
        let read_pos = shared.read_pos.load(Ordering::Relaxed);
        let write_pos = shared.write_pos.load(Ordering::Acquire);

        let available = write_pos.wrapping_sub(read_pos);
        let to_read = out.len().min(available);

        for (i, sample) in out[..to_read].iter_mut().enumerate() {
            let slot = &shared.slots[read_pos.wrapping_add(i) & shared.mask];
            // SAFETY: slot is inside the readable region, see `Shared`
            *sample = unsafe { *slot.get() };
        }

        shared
            .read_pos
            .store(read_pos.wrapping_add(to_read), Ordering::Release);
        to_read
    }

    /// Drop up to `count` samples without reading them
    pub fn skip(&mut self, count: usize) -> usize {
        let shared = &*self.shared;
        let read_pos = shared.read_pos.load(Ordering::Relaxed);
        let write_pos = shared.write_pos.load(Ordering::Acquire);
        let to_skip = count.min(write_pos.wrapping_sub(read_pos));
        shared
            .read_pos
            .store(read_pos.wrapping_add(to_skip), Ordering::Release);
        to_skip
    }

    pub fn len(&self) -> usize {
        self.shared.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.shared.capacity()
    }
}
