use std::sync::Arc;

use parking_lot::Mutex;

/// Byte-oriented circular buffer connecting one capture callback to one
/// render callback.
///
/// Shared between the two stream threads as
/// `Arc<parking_lot::Mutex<RingBuffer>>`. Exactly one writer and one reader
/// interact with it; each critical section is a bounded number of `memcpy`
/// segments proportional to the chunk, never to the buffer capacity.
///
/// Overflow behavior: a write that does not fit is clamped to free space and
/// the excess is dropped. Unread bytes are never overwritten, so the render
/// side always plays what was actually captured, in order.
#[derive(Debug)]
pub struct RingBuffer {
    buf: Box<[u8]>,
    read_pos: usize,
    write_pos: usize,
    held: usize,
    stats: BufferStats,
}

/// Monotonic transfer counters, for observability only.
///
/// Transient overflow/underflow is expected under clock drift and is never
/// escalated to a fault from here.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BufferStats {
    /// Total bytes accepted by `write`.
    pub bytes_written: u64,
    /// Total bytes handed out by `read` / `fill_or_silence`.
    pub bytes_read: u64,
    /// Number of `write` calls that had to drop bytes for lack of space.
    pub overflows: u64,
    /// Number of `fill_or_silence` calls that came up short and padded.
    pub underflows: u64,
}

/// The buffer as shared between the capture and render threads.
pub type SharedRingBuffer = Arc<Mutex<RingBuffer>>;

impl RingBuffer {
    /// Create a buffer holding at most `capacity` bytes.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "ring buffer capacity must be non-zero");
        Self {
            buf: vec![0u8; capacity].into_boxed_slice(),
            read_pos: 0,
            write_pos: 0,
            held: 0,
            stats: BufferStats::default(),
        }
    }

    /// Convenience constructor for the shared form.
    pub fn shared(capacity: usize) -> SharedRingBuffer {
        Arc::new(Mutex::new(Self::new(capacity)))
    }

    /// Copy as many of `bytes` as fit into free space, returning how many
    /// were accepted. A clamped write bumps the overflow counter once.
    ///
    /// Never blocks, never allocates.
    pub fn write(&mut self, bytes: &[u8]) -> usize {
        let free = self.capacity() - self.held;
        let n = bytes.len().min(free);
        if n < bytes.len() {
            self.stats.overflows += 1;
        }
        if n == 0 {
            return 0;
        }

        // At most two contiguous segments: cursor→end, then start.
        let cap = self.capacity();
        let first = n.min(cap - self.write_pos);
        self.buf[self.write_pos..self.write_pos + first].copy_from_slice(&bytes[..first]);
        let rest = n - first;
        if rest > 0 {
            self.buf[..rest].copy_from_slice(&bytes[first..n]);
        }

        self.write_pos = (self.write_pos + n) % cap;
        self.held += n;
        self.stats.bytes_written += n as u64;
        n
    }

    /// Copy up to `out.len()` held bytes into `out`, returning how many were
    /// copied. Returns fewer on underrun and does not touch the remainder of
    /// `out` — padding with silence is the render side's responsibility.
    ///
    /// Never blocks, never allocates.
    pub fn read(&mut self, out: &mut [u8]) -> usize {
        let n = out.len().min(self.held);
        if n == 0 {
            return 0;
        }

        let cap = self.capacity();
        let first = n.min(cap - self.read_pos);
        out[..first].copy_from_slice(&self.buf[self.read_pos..self.read_pos + first]);
        let rest = n - first;
        if rest > 0 {
            out[first..n].copy_from_slice(&self.buf[..rest]);
        }

        self.read_pos = (self.read_pos + n) % cap;
        self.held -= n;
        self.stats.bytes_read += n as u64;
        n
    }

    /// Fill all of `out`: held bytes first, zeros (silence) for whatever is
    /// missing. Returns the number of real bytes; a short fill bumps the
    /// underflow counter once.
    ///
    /// This is the render-side degradation policy: zero-valued PCM samples
    /// play as silence, keeping the hardware fed instead of glitching.
    pub fn fill_or_silence(&mut self, out: &mut [u8]) -> usize {
        let n = self.read(out);
        if n < out.len() {
            out[n..].fill(0);
            self.stats.underflows += 1;
        }
        n
    }

    /// Bytes currently held. A snapshot: stale by at most one callback under
    /// concurrent access, which both endpoints tolerate.
    pub fn available_to_read(&self) -> usize {
        self.held
    }

    /// Free space currently available to `write`. Same snapshot semantics.
    pub fn available_to_write(&self) -> usize {
        self.capacity() - self.held
    }

    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.held == 0
    }

    /// Reset cursors to empty, preserving counters.
    ///
    /// Only call while both producer and consumer are quiesced.
    pub fn clear(&mut self) {
        self.read_pos = 0;
        self.write_pos = 0;
        self.held = 0;
    }

    pub fn stats(&self) -> BufferStats {
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basic_write_read() {
        let mut buf = RingBuffer::new(10);
        assert_eq!(buf.write(&[1, 2, 3]), 3);
        assert_eq!(buf.available_to_read(), 3);

        let mut out = [0u8; 3];
        assert_eq!(buf.read(&mut out), 3);
        assert_eq!(out, [1, 2, 3]);
        assert!(buf.is_empty());
    }

    #[test]
    fn held_never_exceeds_capacity() {
        let mut buf = RingBuffer::new(8);
        let mut out = [0u8; 5];
        for i in 0..50u8 {
            buf.write(&[i; 5]);
            assert!(buf.available_to_read() <= buf.capacity());
            buf.read(&mut out[..(i as usize % 5)]);
            assert!(buf.available_to_read() <= buf.capacity());
        }
    }

    #[test]
    fn overflow_clamps_and_preserves_unread() {
        // Capacity 1000, two 600-byte writes: second write clamps to 400.
        let mut buf = RingBuffer::new(1000);
        assert_eq!(buf.write(&[0xAA; 600]), 600);
        let written = buf.write(&[0xBB; 600]);
        assert_eq!(written, 400);
        assert_eq!(buf.available_to_read(), 1000);
        assert_eq!(buf.stats().overflows, 1);

        // The first 600 bytes survive untouched.
        let mut out = [0u8; 600];
        assert_eq!(buf.read(&mut out), 600);
        assert!(out.iter().all(|&b| b == 0xAA));
        let mut tail = [0u8; 400];
        assert_eq!(buf.read(&mut tail), 400);
        assert!(tail.iter().all(|&b| b == 0xBB));
    }

    #[test]
    fn write_into_full_accepts_nothing() {
        let mut buf = RingBuffer::new(4);
        assert_eq!(buf.write(&[1, 2, 3, 4]), 4);
        assert_eq!(buf.write(&[5]), 0);
        assert_eq!(buf.stats().overflows, 1);
        assert_eq!(buf.available_to_write(), 0);
    }

    #[test]
    fn read_from_empty_leaves_destination_alone() {
        // Empty buffer, 200-byte read returns 0 and the
        // caller's bytes are not zeroed by `read`.
        let mut buf = RingBuffer::new(1000);
        let mut out = [0x5Au8; 200];
        assert_eq!(buf.read(&mut out), 0);
        assert!(out.iter().all(|&b| b == 0x5A));
    }

    #[test]
    fn repeated_reads_drain_to_zero() {
        let mut buf = RingBuffer::new(16);
        buf.write(&[7; 10]);
        let mut out = [0u8; 4];
        assert_eq!(buf.read(&mut out), 4);
        assert_eq!(buf.read(&mut out), 4);
        assert_eq!(buf.read(&mut out), 2);
        assert_eq!(buf.read(&mut out), 0);
    }

    #[test]
    fn round_trip_across_wrap() {
        let mut buf = RingBuffer::new(8);
        let mut out = [0u8; 6];

        // Advance cursors so the next write straddles the end.
        buf.write(&[0; 6]);
        buf.read(&mut out);

        let data = [10, 20, 30, 40, 50, 60];
        assert_eq!(buf.write(&data), 6);
        assert_eq!(buf.read(&mut out), 6);
        assert_eq!(out, data);
    }

    #[test]
    fn silence_substitution() {
        let mut buf = RingBuffer::new(32);
        buf.write(&[9, 9, 9]);

        let mut out = [0xFFu8; 8];
        let real = buf.fill_or_silence(&mut out);
        assert_eq!(real, 3);
        assert_eq!(&out[..3], &[9, 9, 9]);
        assert!(out[3..].iter().all(|&b| b == 0));
        assert_eq!(buf.stats().underflows, 1);
    }

    #[test]
    fn full_fill_counts_no_underflow() {
        let mut buf = RingBuffer::new(32);
        buf.write(&[1; 8]);
        let mut out = [0u8; 8];
        assert_eq!(buf.fill_or_silence(&mut out), 8);
        assert_eq!(buf.stats().underflows, 0);
    }

    #[test]
    fn clear_empties_but_keeps_counters() {
        let mut buf = RingBuffer::new(16);
        buf.write(&[1; 10]);
        buf.clear();

        assert!(buf.is_empty());
        assert_eq!(buf.available_to_write(), 16);
        assert_eq!(buf.stats().bytes_written, 10);
    }

    #[test]
    fn counters_accumulate() {
        let mut buf = RingBuffer::new(16);
        let mut out = [0u8; 8];
        buf.write(&[1; 8]);
        buf.read(&mut out);
        buf.write(&[2; 8]);
        buf.read(&mut out);

        let stats = buf.stats();
        assert_eq!(stats.bytes_written, 16);
        assert_eq!(stats.bytes_read, 16);
        assert_eq!(stats.overflows, 0);
    }
}
