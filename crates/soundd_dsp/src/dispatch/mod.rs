//! Pure transformers over interleaved/non-interleaved multichannel buffers.

mod bass_router;
mod tube;

pub use bass_router::{BassRange, BassRouterDispatcher, ChannelAssignment};
pub use tube::{fold_mix, mix_pair, ChannelLayout, TubeDispatcher};
