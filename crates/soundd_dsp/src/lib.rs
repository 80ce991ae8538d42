//! soundd_dsp - pure sample-format conversion and multichannel dispatch
//!
//! This crate provides the signal-processing primitives the sound-server
//! core is built on:
//! - PCM codec: canonical s32 <-> wire format conversion (u8, s16, s32, f32)
//! - Tube dispatcher: one-to-many broadcast and many-to-one non-clipping mix
//! - Bass router dispatcher: FFT band split of a mono canonical window
//!
//! # Architecture
//!
//! Every function here is allocation-free on the hot per-sample path except
//! the bass router's spectrum buffers, which are sized once per call and
//! scale with the window length rather than per sample.

mod codec;
mod dispatch;
mod error;

pub use codec::{from_canonical, sample_bytes, to_canonical, Sample, WireFormat, SILENCE};
pub use dispatch::{
    fold_mix, mix_pair, BassRange, BassRouterDispatcher, ChannelAssignment, ChannelLayout,
    TubeDispatcher,
};
pub use error::DspError;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crate_exports() {
        let _ = WireFormat::S32LE;
        let _ = TubeDispatcher::new(ChannelLayout::Interleaved, WireFormat::S32LE);
    }
}
