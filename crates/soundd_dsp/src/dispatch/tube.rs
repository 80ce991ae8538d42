//! Tube dispatcher: broadcasts one canonical channel to many wire-format
//! channels, or folds many wire-format channels down to one canonical channel.

use crate::codec::{from_canonical, to_canonical, Sample, WireFormat, SILENCE};
use crate::error::DspError;

/// How samples are laid out across channels in a multichannel buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelLayout {
    /// Frame-major: `[ch0_f0, ch1_f0, ..., ch0_f1, ch1_f1, ...]`.
    Interleaved,
    /// Channel-major: `[ch0_f0, ch0_f1, ..., ch1_f0, ch1_f1, ...]`.
    NonInterleaved,
}

impl ChannelLayout {
    /// Index of frame `frame` in channel `channel` of a `channels`-wide,
    /// `frames`-long buffer.
    fn index(self, channel: usize, frame: usize, channels: usize, frames: usize) -> usize {
        match self {
            ChannelLayout::Interleaved => frame * channels + channel,
            ChannelLayout::NonInterleaved => channel * frames + frame,
        }
    }
}

/// The non-clipping additive mix law used to fold multiple canonical
/// channels into one. Canonical `0` (true digital silence) is the natural
/// identity of the additive formula below; the `Silence` sentinel
/// (`i32::MIN`) is a distinct value — used to mark "no data produced" when
/// a handle underruns or a bass band carries no energy — and is special-
/// cased to the same identity behavior so a filler sample never pollutes a
/// real contributor's signal (`mix(v, Silence) == v`).
///
/// Same-sign operands use the asymmetric positive/negative scale already
/// used by the codec to avoid overflow at the domain's endpoints; opposite
/// signs (or either operand at rest) simply add, since they cannot clip.
pub fn mix_pair(a: Sample, b: Sample) -> Sample {
    if a == SILENCE {
        return b;
    }
    if b == SILENCE {
        return a;
    }
    let (a64, b64) = (a as i64, b as i64);
    let mixed = if a > 0 && b > 0 {
        a64 + b64 - (a64 * b64) / i32::MAX as i64
    } else if a < 0 && b < 0 {
        a64 + b64 - (a64 * b64) / i32::MIN as i64
    } else {
        a64 + b64
    };
    mixed.clamp(i32::MIN as i64, i32::MAX as i64) as Sample
}

/// Fold a slice of canonical samples left to right with [`mix_pair`].
/// An empty slice mixes to canonical silence (`0`), the identity element.
pub fn fold_mix(samples: &[Sample]) -> Sample {
    samples.iter().copied().fold(0, mix_pair)
}

/// Broadcasts/folds between one canonical channel and many wire-format channels.
pub struct TubeDispatcher {
    pub layout: ChannelLayout,
    pub format: WireFormat,
}

impl TubeDispatcher {
    pub fn new(layout: ChannelLayout, format: WireFormat) -> Self {
        Self { layout, format }
    }

    /// ONE→MANY: broadcast `input` (one canonical channel, `frames` long)
    /// to `channels` wire-format channels of `frames` each, written into `out`.
    pub fn dispatch_one_to_many(
        &self,
        input: &[Sample],
        out: &mut [u8],
        channels: usize,
        frames: usize,
    ) -> Result<(), DspError> {
        if input.len() != frames {
            return Err(DspError::MisalignedBuffer {
                got: input.len(),
                frame_size: frames,
            });
        }
        let sample_bytes = self.format.sample_bytes();
        let needed = channels * frames * sample_bytes;
        if out.len() < needed {
            return Err(DspError::MisalignedBuffer {
                got: out.len(),
                frame_size: needed,
            });
        }

        for channel in 0..channels {
            for frame in 0..frames {
                let wire = from_canonical(self.format, input[frame]);
                let sample_index = self.layout.index(channel, frame, channels, frames);
                let byte_start = sample_index * sample_bytes;
                out[byte_start..byte_start + sample_bytes].copy_from_slice(&wire);
            }
        }
        Ok(())
    }

    /// MANY→ONE: fold `channels` wire-format channels of `frames` each
    /// (`input`) down to one canonical channel of `frames` samples (`out`).
    pub fn dispatch_many_to_one(
        &self,
        input: &[u8],
        out: &mut [Sample],
        channels: usize,
        frames: usize,
    ) -> Result<(), DspError> {
        if out.len() != frames {
            return Err(DspError::MisalignedBuffer {
                got: out.len(),
                frame_size: frames,
            });
        }
        let sample_bytes = self.format.sample_bytes();
        let needed = channels * frames * sample_bytes;
        if input.len() < needed {
            return Err(DspError::MisalignedBuffer {
                got: input.len(),
                frame_size: needed,
            });
        }

        let mut scratch = Vec::with_capacity(channels);
        for frame in 0..frames {
            scratch.clear();
            for channel in 0..channels {
                let sample_index = self.layout.index(channel, frame, channels, frames);
                let byte_start = sample_index * sample_bytes;
                let wire = &input[byte_start..byte_start + sample_bytes];
                scratch.push(to_canonical(self.format, wire));
            }
            out[frame] = fold_mix(&scratch);
        }
        Ok(())
    }
}
