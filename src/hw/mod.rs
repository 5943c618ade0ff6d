#[cfg(all(target_os = "linux", feature = "alsa-backend"))]
pub mod alsa;
pub mod traits;

pub use traits::{
    AudioBackend, ChannelArea, ChannelPosition, DeviceId, HwParams, PcmHandle, PcmState,
};
