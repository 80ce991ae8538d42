//! PCM sample-format conversion.
//!
//! Every function here is pure and total: converting a fixed-size wire
//! sample to canonical and back never fails. The canonical representation
//! is a host-endian `i32`; `Silence` is its minimum value.

/// Canonical interchange sample: signed 32-bit, host-endian.
pub type Sample = i32;

/// Canonical silence value.
pub const SILENCE: Sample = i32::MIN;

/// Wire sample formats a client may declare for a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WireFormat {
    U8,
    S16LE,
    S16BE,
    S32LE,
    S32BE,
    F32LE,
    F32BE,
}

impl WireFormat {
    /// Byte size of one sample in this format.
    pub const fn sample_bytes(self) -> usize {
        match self {
            WireFormat::U8 => 1,
            WireFormat::S16LE | WireFormat::S16BE => 2,
            WireFormat::S32LE
            | WireFormat::S32BE
            | WireFormat::F32LE
            | WireFormat::F32BE => 4,
        }
    }
}

const POS_SCALE_16: i32 = i32::MAX / i16::MAX as i32;
const NEG_SCALE_16: i32 = i32::MIN / i16::MIN as i32;

fn swap_if_host_differs_16(bytes: [u8; 2], wire_is_le: bool) -> [u8; 2] {
    if cfg!(target_endian = "little") == wire_is_le {
        bytes
    } else {
        [bytes[1], bytes[0]]
    }
}

fn swap_if_host_differs_32(bytes: [u8; 4], wire_is_le: bool) -> [u8; 4] {
    if cfg!(target_endian = "little") == wire_is_le {
        bytes
    } else {
        [bytes[3], bytes[2], bytes[1], bytes[0]]
    }
}

/// Convert one wire-format sample to the canonical representation.
pub fn to_canonical(format: WireFormat, wire_bytes: &[u8]) -> Sample {
    match format {
        WireFormat::U8 => {
            let v = wire_bytes[0] as i32 - 128;
            // [-128, 127] -> [INT32_MIN, INT32_MAX], 0 (canonical silence midpoint) maps
            // back from wire value 128.
            if v >= 0 {
                v.saturating_mul(i32::MAX / 127)
            } else {
                v.saturating_mul(i32::MIN / -128)
            }
        }
        WireFormat::S16LE | WireFormat::S16BE => {
            let host_bytes =
                swap_if_host_differs_16([wire_bytes[0], wire_bytes[1]], matches!(format, WireFormat::S16LE));
            let raw = i16::from_ne_bytes(host_bytes);
            if raw >= 0 {
                raw as i32 * POS_SCALE_16
            } else {
                raw as i32 * NEG_SCALE_16
            }
        }
        WireFormat::S32LE | WireFormat::S32BE => {
            let host_bytes = swap_if_host_differs_32(
                [wire_bytes[0], wire_bytes[1], wire_bytes[2], wire_bytes[3]],
                matches!(format, WireFormat::S32LE),
            );
            i32::from_ne_bytes(host_bytes)
        }
        WireFormat::F32LE | WireFormat::F32BE => {
            let host_bytes = swap_if_host_differs_32(
                [wire_bytes[0], wire_bytes[1], wire_bytes[2], wire_bytes[3]],
                matches!(format, WireFormat::F32LE),
            );
            let f = f32::from_ne_bytes(host_bytes).clamp(-1.0, 1.0);
            if f >= 0.0 {
                (f * i32::MAX as f32) as i32
            } else {
                (f * -(i32::MIN as f32)) as i32
            }
        }
    }
}

/// Convert one canonical sample into the given wire format.
pub fn from_canonical(format: WireFormat, sample: Sample) -> Vec<u8> {
    match format {
        WireFormat::U8 => {
            let scaled = if sample >= 0 {
                sample / (i32::MAX / 127)
            } else {
                sample / (i32::MIN / -128)
            };
            vec![(scaled + 128).clamp(0, 255) as u8]
        }
        WireFormat::S16LE | WireFormat::S16BE => {
            let scaled = if sample >= 0 {
                (sample / POS_SCALE_16) as i16
            } else {
                (sample / NEG_SCALE_16) as i16
            };
            let host_bytes = scaled.to_ne_bytes();
            let out = swap_if_host_differs_16(host_bytes, matches!(format, WireFormat::S16LE));
            out.to_vec()
        }
        WireFormat::S32LE | WireFormat::S32BE => {
            let host_bytes = sample.to_ne_bytes();
            swap_if_host_differs_32(host_bytes, matches!(format, WireFormat::S32LE)).to_vec()
        }
        WireFormat::F32LE | WireFormat::F32BE => {
            let f = if sample >= 0 {
                sample as f32 / i32::MAX as f32
            } else {
                sample as f32 / -(i32::MIN as f32)
            };
            let host_bytes = f.clamp(-1.0, 1.0).to_ne_bytes();
            swap_if_host_differs_32(host_bytes, matches!(format, WireFormat::F32LE)).to_vec()
        }
    }
}

/// Byte size of one sample of the given wire format.
pub const fn sample_bytes(format: WireFormat) -> usize {
    format.sample_bytes()
}
