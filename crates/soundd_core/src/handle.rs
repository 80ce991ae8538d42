//! Per-stream sound buffer bridging client-side wire bytes and engine-side
//! canonical samples.
//!
//! Grounded on `write-handle.cpp`/`read-handle.cpp`: a `WriteHandle` carries
//! PLAYBACK data (client writes wire bytes, engine reads canonical samples);
//! a `ReadHandle` carries RECORD data with the roles reversed. Both wrap the
//! same [`crate::ring_buffer::RingBuffer`] of canonical `i32` samples; only
//! which side speaks wire bytes differs.

use std::sync::atomic::{AtomicBool, Ordering};

use soundd_dsp::{from_canonical, to_canonical, Sample, WireFormat, SILENCE};
use thiserror::Error;

use crate::ring_buffer::RingBuffer;

/// Frames the ring buffer can hold: 120 seconds at the base rate, matching
/// the original's `44100 * 4 * 120`-byte sizing (4 bytes per canonical sample).
const HANDLE_CAPACITY_FRAMES: usize = 44_100 * 120;
const CANONICAL_SAMPLE_BYTES: usize = 4;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleError {
    #[error("handle is no longer alive")]
    Dead,

    #[error("handle is stalled below its prebuffer threshold")]
    Stalled,

    #[error("this operation is not valid for the handle's direction")]
    WrongDirection,
}

pub type HandleResult<T> = Result<T, HandleError>;

/// Count of frames actually moved, alongside how many of the request's
/// frames were deficit-filled (underrun) or silently dropped (overrun).
/// `deficit == 0` on a clean transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferReport {
    pub frames: usize,
    pub deficit: usize,
}

/// PLAYBACK handle: client `write`s wire bytes in, the engine `read`s
/// canonical samples out.
pub struct WriteHandle {
    format: WireFormat,
    ring: RingBuffer,
    prebuffer_remaining: std::sync::atomic::AtomicUsize,
    alive: AtomicBool,
}

impl WriteHandle {
    pub fn new(format: WireFormat, prebuffer_frames: usize) -> Self {
        Self {
            format,
            ring: RingBuffer::new(HANDLE_CAPACITY_FRAMES * CANONICAL_SAMPLE_BYTES),
            prebuffer_remaining: std::sync::atomic::AtomicUsize::new(prebuffer_frames),
            alive: AtomicBool::new(true),
        }
    }

    pub fn format(&self) -> WireFormat {
        self.format
    }

    pub fn alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    pub fn abort(&self) {
        self.alive.store(false, Ordering::Release);
    }

    pub fn flush(&self) {
        let readable = self.ring.readable();
        self.ring.drop_bytes(readable);
    }

    pub fn drain(&self) -> HandleResult<()> {
        Ok(())
    }

    /// Client-side: convert `n_frames` wire-format frames from `wire_bytes`
    /// and queue them as canonical samples. Clamps to writable space;
    /// excess frames are dropped and reported as the overrun deficit.
    pub fn write(&self, wire_bytes: &[u8], n_frames: usize) -> HandleResult<TransferReport> {
        if !self.alive() {
            return Err(HandleError::Dead);
        }
        let sample_bytes = self.format.sample_bytes();
        let writable_frames = self.ring.writable() / CANONICAL_SAMPLE_BYTES;
        let accepted = n_frames.min(writable_frames);

        for frame in 0..accepted {
            let start = frame * sample_bytes;
            let canonical = to_canonical(self.format, &wire_bytes[start..start + sample_bytes]);
            self.ring.write(&canonical.to_ne_bytes());
        }

        Ok(TransferReport {
            frames: accepted,
            deficit: n_frames - accepted,
        })
    }

    /// Engine-side: pull `n_frames` canonical samples. Returns
    /// [`HandleError::Stalled`] without advancing the buffer until
    /// cumulative writes have ever met the prebuffer threshold; once met,
    /// the gate never re-engages for this handle's lifetime. Underruns are
    /// filled with [`SILENCE`] and reported via `deficit`.
    pub fn read(&self, out: &mut [Sample], n_frames: usize) -> HandleResult<TransferReport> {
        if !self.alive() {
            return Err(HandleError::Dead);
        }

        let readable_frames = self.ring.readable() / CANONICAL_SAMPLE_BYTES;
        let remaining = self.prebuffer_remaining.load(Ordering::Acquire);
        if remaining > 0 {
            if readable_frames < remaining {
                return Err(HandleError::Stalled);
            }
            self.prebuffer_remaining.store(0, Ordering::Release);
        }

        let available = n_frames.min(readable_frames);
        let mut scratch = [0u8; CANONICAL_SAMPLE_BYTES];
        for slot in out.iter_mut().take(available) {
            self.ring.read(&mut scratch);
            *slot = Sample::from_ne_bytes(scratch);
        }
        let trail = n_frames - available;
        for slot in out.iter_mut().skip(available).take(trail) {
            *slot = SILENCE;
        }

        Ok(TransferReport {
            frames: n_frames,
            deficit: trail,
        })
    }
}

/// RECORD handle: the engine `write`s canonical samples in, the client
/// `read`s wire bytes out via `pull`.
pub struct ReadHandle {
    format: WireFormat,
    ring: RingBuffer,
    alive: AtomicBool,
}

impl ReadHandle {
    pub fn new(format: WireFormat) -> Self {
        Self {
            format,
            ring: RingBuffer::new(HANDLE_CAPACITY_FRAMES * CANONICAL_SAMPLE_BYTES),
            alive: AtomicBool::new(true),
        }
    }

    pub fn format(&self) -> WireFormat {
        self.format
    }

    pub fn alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    pub fn abort(&self) {
        self.alive.store(false, Ordering::Release);
    }

    pub fn flush(&self) {
        let readable = self.ring.readable();
        self.ring.drop_bytes(readable);
    }

    pub fn drain(&self) -> HandleResult<()> {
        Ok(())
    }

    /// Engine-side: push `n_frames` canonical samples captured from the
    /// device. Clamps to writable space; excess is dropped and reported,
    /// matching the Write Handle's overrun policy exactly.
    pub fn write(&self, samples: &[Sample], n_frames: usize) -> HandleResult<TransferReport> {
        if !self.alive() {
            return Err(HandleError::Dead);
        }
        let writable_frames = self.ring.writable() / CANONICAL_SAMPLE_BYTES;
        let accepted = n_frames.min(writable_frames);
        for sample in samples.iter().take(accepted) {
            self.ring.write(&sample.to_ne_bytes());
        }
        Ok(TransferReport {
            frames: accepted,
            deficit: n_frames - accepted,
        })
    }

    /// Client-side (`pull`): deliver `n_frames` wire-format frames into
    /// `dest`. Never stalls — a short window is silence-padded instead,
    /// since the client is the consumer and can tolerate the gap.
    pub fn read(&self, dest: &mut [u8], n_frames: usize) -> HandleResult<TransferReport> {
        if !self.alive() {
            return Err(HandleError::Dead);
        }
        let sample_bytes = self.format.sample_bytes();
        let readable_frames = self.ring.readable() / CANONICAL_SAMPLE_BYTES;
        let trail = n_frames.saturating_sub(readable_frames);
        let available = n_frames - trail;

        let mut scratch = [0u8; CANONICAL_SAMPLE_BYTES];
        for frame in 0..available {
            self.ring.read(&mut scratch);
            let canonical = Sample::from_ne_bytes(scratch);
            let wire = from_canonical(self.format, canonical);
            let start = frame * sample_bytes;
            dest[start..start + sample_bytes].copy_from_slice(&wire);
        }
        let silence_wire = from_canonical(self.format, SILENCE);
        for frame in available..n_frames {
            let start = frame * sample_bytes;
            dest[start..start + sample_bytes].copy_from_slice(&silence_wire);
        }

        Ok(TransferReport {
            frames: n_frames,
            deficit: trail,
        })
    }
}

/// Either side of a stream's Handle. A Stream Session owns exactly one,
/// selected by the stream's declared direction at `connect` time; an enum
/// wrapper is simpler than a trait object for two concrete,
/// mutually-exclusive variants with asymmetric method sets.
pub enum Handle {
    Write(WriteHandle),
    Read(ReadHandle),
}

impl Handle {
    pub fn alive(&self) -> bool {
        match self {
            Handle::Write(h) => h.alive(),
            Handle::Read(h) => h.alive(),
        }
    }

    pub fn abort(&self) {
        match self {
            Handle::Write(h) => h.abort(),
            Handle::Read(h) => h.abort(),
        }
    }

    pub fn flush(&self) {
        match self {
            Handle::Write(h) => h.flush(),
            Handle::Read(h) => h.flush(),
        }
    }

    pub fn drain(&self) -> HandleResult<()> {
        match self {
            Handle::Write(h) => h.drain(),
            Handle::Read(h) => h.drain(),
        }
    }

    /// Client-side `push`: only valid on a Write Handle.
    pub fn client_write(&self, wire_bytes: &[u8], n_frames: usize) -> HandleResult<TransferReport> {
        match self {
            Handle::Write(h) => h.write(wire_bytes, n_frames),
            Handle::Read(_) => Err(HandleError::WrongDirection),
        }
    }

    /// Client-side `pull`: only valid on a Read Handle.
    pub fn client_read(&self, dest: &mut [u8], n_frames: usize) -> HandleResult<TransferReport> {
        match self {
            Handle::Read(h) => h.read(dest, n_frames),
            Handle::Write(_) => Err(HandleError::WrongDirection),
        }
    }

    pub fn as_write(&self) -> Option<&WriteHandle> {
        match self {
            Handle::Write(h) => Some(h),
            Handle::Read(_) => None,
        }
    }

    pub fn as_read(&self) -> Option<&ReadHandle> {
        match self {
            Handle::Read(h) => Some(h),
            Handle::Write(_) => None,
        }
    }
}
