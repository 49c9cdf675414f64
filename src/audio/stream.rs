//! Remote audio stream player.
//!
//! Lock-free SPSC ring between the network receiver (producer) and the audio
//! pump (consumer). Underruns are filled with silence so the codec cadence
//! never stalls; overruns drop the incoming samples and count them.

use core::cell::UnsafeCell;
use core::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

/// Stream buffer capacity in samples. Must be a power of 2.
/// ~85 ms of stereo audio at 48 kHz, enough to ride out network jitter.
pub const STREAM_BUFFER_SAMPLES: usize = 8192;

/// SPSC sample ring for received remote audio.
///
/// # Safety
///
/// `UnsafeCell` storage is sound for the same reason as the paddle event
/// queue: one producer, one consumer, slots published/released through
/// acquire/release index stores.
pub struct StreamPlayer<const N: usize = STREAM_BUFFER_SAMPLES> {
    buffer: UnsafeCell<[i16; N]>,
    write_idx: AtomicUsize,
    read_idx: AtomicUsize,
    overrun: AtomicU32,
}

// SAFETY: single producer, single consumer, atomic index coordination.
unsafe impl<const N: usize> Sync for StreamPlayer<N> {}
unsafe impl<const N: usize> Send for StreamPlayer<N> {}

impl<const N: usize> StreamPlayer<N> {
    const MASK: usize = N - 1;

    pub const fn new() -> Self {
        assert!(N.is_power_of_two(), "Stream buffer size must be power of 2");
        Self {
            buffer: UnsafeCell::new([0i16; N]),
            write_idx: AtomicUsize::new(0),
            read_idx: AtomicUsize::new(0),
            overrun: AtomicU32::new(0),
        }
    }

    /// Append received samples. Returns how many were accepted; the rest are
    /// dropped and counted when the ring is full.
    pub fn push_samples(&self, samples: &[i16]) -> usize {
        let mut write = self.write_idx.load(Ordering::Relaxed);
        let read = self.read_idx.load(Ordering::Acquire);
        let free = N - write.wrapping_sub(read);
        let accepted = samples.len().min(free);
        for &sample in &samples[..accepted] {
            // SAFETY: slots between write and read+N are owned by the producer.
            unsafe {
                (*self.buffer.get())[write & Self::MASK] = sample;
            }
            write = write.wrapping_add(1);
        }
        self.write_idx.store(write, Ordering::Release);
        let dropped = samples.len() - accepted;
        if dropped > 0 {
            self.overrun.fetch_add(dropped as u32, Ordering::Relaxed);
        }
        accepted
    }

    /// Fill `frames` stereo frames into `out`, zero-padding on underrun.
    /// Returns the number of whole frames served from the stream.
    pub fn read_stereo_frames(&self, out: &mut [i16], frames: usize) -> usize {
        let frames = frames.min(out.len() / 2);
        let mut read = self.read_idx.load(Ordering::Relaxed);
        let write = self.write_idx.load(Ordering::Acquire);
        let available = write.wrapping_sub(read);
        let whole_frames = (available / 2).min(frames);

        for sample in out.iter_mut().take(whole_frames * 2) {
            // SAFETY: slots between read and the published write are filled.
            *sample = unsafe { (*self.buffer.get())[read & Self::MASK] };
            read = read.wrapping_add(1);
        }
        self.read_idx.store(read, Ordering::Release);

        for sample in out.iter_mut().take(frames * 2).skip(whole_frames * 2) {
            *sample = 0;
        }
        whole_frames
    }

    /// Discard buffered samples (mode switches).
    pub fn reset(&self) {
        let write = self.write_idx.load(Ordering::Relaxed);
        self.read_idx.store(write, Ordering::Release);
    }

    /// Samples currently buffered.
    pub fn len(&self) -> usize {
        let write = self.write_idx.load(Ordering::Acquire);
        let read = self.read_idx.load(Ordering::Acquire);
        write.wrapping_sub(read).min(N)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Samples dropped because the ring was full. Monotonic.
    pub fn overrun_count(&self) -> u32 {
        self.overrun.load(Ordering::Relaxed)
    }
}

impl<const N: usize> Default for StreamPlayer<N> {
    fn default() -> Self {
        Self::new()
    }
}
