#![cfg(unix)]

pub mod bridge;
pub mod config;
pub mod device;
pub mod enumerator;
pub mod error;
pub mod format;
pub mod hw;
pub mod logging;
pub mod negotiate;
pub mod options;
pub mod probe;
mod rt;
pub mod stream;
pub mod wait;

pub use bridge::{BufferBridge, BufferView, Grant};
pub use device::Device;
pub use enumerator::DeviceEnumerator;
pub use error::{DeviceError, ErrorClass, HwError, HwErrorKind, HwResult};
pub use format::{AccessMode, CANDIDATE_RATES, Direction, Sample, SampleFormat};
pub use hw::{AudioBackend, ChannelPosition, DeviceId, PcmHandle, PcmState};
pub use logging::init_logging;
pub use negotiate::{StreamConfig, StreamRequest, negotiate};
pub use options::StreamOptions;
pub use probe::{CapabilitySet, probe};
pub use stream::{StreamExit, StreamInfo, StreamStatus};
pub use wait::{CancelHandle, WaitOutcome, Waiter, cancel_pair};

#[cfg(all(target_os = "linux", feature = "alsa-backend"))]
pub use hw::alsa::AlsaBackend;

/// Enumerator over the system's ALSA hardware devices.
#[cfg(all(target_os = "linux", feature = "alsa-backend"))]
pub fn alsa_enumerator() -> DeviceEnumerator<AlsaBackend> {
    DeviceEnumerator::with_options(AlsaBackend::new(), StreamOptions::from_env())
}
