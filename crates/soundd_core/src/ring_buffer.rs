//! Single-producer/single-consumer byte ring buffer.
//!
//! `std::sync::Mutex` is not reentrant, but nothing here needs it to be: each
//! public method takes `parking_lot::Mutex<Inner>` exactly once and calls
//! private, already-locked `&mut Inner` helpers for anything it needs
//! internally (`write` calls `writable_locked(&inner)` rather than
//! re-entering `self.writable()`). That preserves "write can tell how much
//! room it has without deadlocking" without an actual reentrant primitive.

use parking_lot::Mutex;

struct Inner {
    buffer: Vec<u8>,
    write_pos: usize,
    read_pos: usize,
    /// Disambiguates `write_pos == read_pos` meaning full vs. empty.
    empty: bool,
}

/// A fixed-capacity byte FIFO safe to call from one producer and one
/// consumer thread concurrently.
pub struct RingBuffer {
    inner: Mutex<Inner>,
    capacity: usize,
}

impl RingBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                buffer: vec![0u8; capacity],
                write_pos: 0,
                read_pos: 0,
                empty: true,
            }),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Bytes available to read without blocking.
    pub fn readable(&self) -> usize {
        let inner = self.inner.lock();
        Self::readable_locked(&inner, self.capacity)
    }

    /// Free space available to write without overwriting unread bytes.
    pub fn writable(&self) -> usize {
        let inner = self.inner.lock();
        Self::writable_locked(&inner, self.capacity)
    }

    fn readable_locked(inner: &Inner, capacity: usize) -> usize {
        if inner.write_pos > inner.read_pos {
            inner.write_pos - inner.read_pos
        } else if inner.write_pos < inner.read_pos {
            capacity - inner.read_pos + inner.write_pos
        } else if inner.empty {
            0
        } else {
            capacity
        }
    }

    fn writable_locked(inner: &Inner, capacity: usize) -> usize {
        if inner.write_pos > inner.read_pos {
            capacity - inner.write_pos + inner.read_pos
        } else if inner.write_pos < inner.read_pos {
            inner.read_pos - inner.write_pos
        } else if inner.empty {
            capacity
        } else {
            0
        }
    }

    /// Write as many bytes of `src` as fit; returns the number written.
    /// Excess bytes beyond the writable space are silently truncated — the
    /// caller detects this by comparing the return value to `src.len()`.
    pub fn write(&self, src: &[u8]) -> usize {
        let mut inner = self.inner.lock();
        let capacity = self.capacity;

        let writable = Self::writable_locked(&inner, capacity);
        let size = src.len().min(writable);
        if size == 0 {
            return 0;
        }

        let trail = capacity - inner.write_pos;
        if size <= trail {
            inner.buffer[inner.write_pos..inner.write_pos + size].copy_from_slice(&src[..size]);
            inner.write_pos += size;
        } else {
            inner.buffer[inner.write_pos..capacity].copy_from_slice(&src[..trail]);
            inner.buffer[..size - trail].copy_from_slice(&src[trail..size]);
            inner.write_pos = size - trail;
        }
        if inner.write_pos == capacity {
            inner.write_pos = 0;
        }
        inner.empty = false;
        size
    }

    /// Read up to `dst.len()` bytes, advancing the read position; returns
    /// the number actually read.
    pub fn read(&self, dst: &mut [u8]) -> usize {
        let mut inner = self.inner.lock();
        let size = Self::copy_out(&inner, dst, self.capacity);
        Self::advance_read(&mut inner, size, self.capacity);
        size
    }

    /// Like `read` but does not advance the read position.
    pub fn peek(&self, dst: &mut [u8]) -> usize {
        let inner = self.inner.lock();
        Self::copy_out(&inner, dst, self.capacity)
    }

    /// Advance the read position by `n` bytes without copying; returns the
    /// number of bytes actually dropped.
    pub fn drop_bytes(&self, n: usize) -> usize {
        let mut inner = self.inner.lock();
        let readable = Self::readable_locked(&inner, self.capacity);
        let size = n.min(readable);
        Self::advance_read(&mut inner, size, self.capacity);
        size
    }

    fn copy_out(inner: &Inner, dst: &mut [u8], capacity: usize) -> usize {
        let readable = Self::readable_locked(inner, capacity);
        let size = dst.len().min(readable);
        if size == 0 {
            return 0;
        }
        let trail = capacity - inner.read_pos;
        if size <= trail {
            dst[..size].copy_from_slice(&inner.buffer[inner.read_pos..inner.read_pos + size]);
        } else {
            dst[..trail].copy_from_slice(&inner.buffer[inner.read_pos..capacity]);
            dst[trail..size].copy_from_slice(&inner.buffer[..size - trail]);
        }
        size
    }

    fn advance_read(inner: &mut Inner, size: usize, capacity: usize) {
        if size == 0 {
            return;
        }
        let trail = capacity - inner.read_pos;
        if size <= trail {
            inner.read_pos += size;
        } else {
            inner.read_pos = size - trail;
        }
        if inner.read_pos == capacity {
            inner.read_pos = 0;
        }
        if inner.read_pos == inner.write_pos {
            inner.empty = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invariant_readable_plus_writable_eq_capacity() {
        let rb = RingBuffer::new(16);
        assert_eq!(rb.readable() + rb.writable(), 16);
        rb.write(&[1, 2, 3]);
        assert_eq!(rb.readable() + rb.writable(), 16);
        let mut buf = [0u8; 2];
        rb.read(&mut buf);
        assert_eq!(rb.readable() + rb.writable(), 16);
    }

    #[test]
    fn test_wrap_around_round_trips() {
        let cap = 16;
        let rb = RingBuffer::new(cap);
        let k = 5;
        let first: Vec<u8> = (0..(cap - k) as u8).collect();
        rb.write(&first);
        let mut scratch = vec![0u8; cap - k];
        rb.read(&mut scratch);
        assert_eq!(rb.readable(), 0);

        let second: Vec<u8> = (0..k as u8).collect();
        rb.write(&second);
        assert_eq!(rb.readable(), k);

        let mut out = vec![0u8; k];
        let n = rb.read(&mut out);
        assert_eq!(n, k);
        assert_eq!(out, second);
        assert_eq!(rb.readable() + rb.writable(), cap);
    }

    #[test]
    fn test_write_read_concatenation_across_wrap() {
        let cap = 8;
        let rb = RingBuffer::new(cap);
        rb.write(&[0, 1, 2, 3, 4, 5]);
        let mut drained = [0u8; 4];
        rb.read(&mut drained);
        rb.write(&[6, 7, 8, 9]);
        let mut out = vec![0u8; 6];
        let n = rb.read(&mut out);
        assert_eq!(n, 6);
        assert_eq!(out, vec![4, 5, 6, 7, 8, 9]);
    }

    #[test]
    fn test_write_truncates_on_overrun() {
        let rb = RingBuffer::new(4);
        let written = rb.write(&[1, 2, 3, 4, 5, 6]);
        assert_eq!(written, 4);
        assert_eq!(rb.writable(), 0);
    }

    #[test]
    fn test_read_clamps_to_readable() {
        let rb = RingBuffer::new(8);
        rb.write(&[1, 2]);
        let mut buf = [0u8; 8];
        let n = rb.read(&mut buf);
        assert_eq!(n, 2);
    }

    #[test]
    fn test_peek_does_not_advance() {
        let rb = RingBuffer::new(8);
        rb.write(&[1, 2, 3]);
        let mut buf = [0u8; 3];
        rb.peek(&mut buf);
        assert_eq!(buf, [1, 2, 3]);
        assert_eq!(rb.readable(), 3);
    }

    #[test]
    fn test_drop_advances_without_copy() {
        let rb = RingBuffer::new(8);
        rb.write(&[1, 2, 3, 4]);
        let dropped = rb.drop_bytes(2);
        assert_eq!(dropped, 2);
        assert_eq!(rb.readable(), 2);
        let mut buf = [0u8; 2];
        rb.read(&mut buf);
        assert_eq!(buf, [3, 4]);
    }

    #[test]
    fn test_full_vs_empty_disambiguation() {
        let rb = RingBuffer::new(4);
        assert_eq!(rb.readable(), 0);
        assert_eq!(rb.writable(), 4);
        rb.write(&[1, 2, 3, 4]);
        assert_eq!(rb.readable(), 4);
        assert_eq!(rb.writable(), 0);
    }
}
