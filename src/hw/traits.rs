use crate::error::HwResult;
use crate::format::{AccessMode, Direction, SampleFormat};
use nix::libc;

/// Hardware transport state as reported by the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PcmState {
    Open,
    Setup,
    Prepared,
    Running,
    XRun,
    Draining,
    Paused,
    Suspended,
    Disconnected,
}

/// Opaque `(card, device)` address of one hardware endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceId {
    pub card: i32,
    pub device: i32,
}

impl DeviceId {
    pub fn new(card: i32, device: i32) -> Self {
        Self { card, device }
    }

    pub fn card_name(&self) -> String {
        format!("hw:{}", self.card)
    }

    pub fn hw_name(&self) -> String {
        format!("hw:{},{}", self.card, self.device)
    }
}

impl std::fmt::Display for DeviceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.hw_name())
    }
}

/// One channel of a mapped ring buffer, in the driver's own terms: `first` and
/// `step` are bit offsets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelArea {
    pub addr: *mut u8,
    pub first: u32,
    pub step: u32,
}

// Addresses point into memory owned by the handle that produced them.
unsafe impl Send for ChannelArea {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelPosition {
    Mono,
    FrontLeft,
    FrontRight,
}

/// Scratch hardware parameter space. Nothing here touches the committed
/// configuration of the stream.
pub trait HwParams {
    fn test_rate(&self, rate: u32) -> HwResult<()>;
    fn test_format(&self, format: SampleFormat) -> HwResult<()>;
    fn buffer_size_min(&self) -> HwResult<usize>;
    fn buffer_size_max(&self) -> HwResult<usize>;

    fn set_rate_resample(&mut self, enabled: bool) -> HwResult<()>;
    fn set_access(&mut self, access: AccessMode) -> HwResult<()>;
    fn set_format(&mut self, format: SampleFormat) -> HwResult<()>;
    fn set_channels(&mut self, channels: usize) -> HwResult<()>;
    fn set_rate(&mut self, rate: u32) -> HwResult<()>;
    /// Returns the size the hardware rounded to.
    fn set_buffer_size_near(&mut self, frames: usize) -> HwResult<usize>;
}

/// An open hardware stream.
///
/// # Safety
///
/// Safe code writes through the areas `mmap_begin` hands out. An implementation
/// must fill `areas` with one entry per configured channel, each addressing
/// memory that stays valid and writable for `offset + granted` frames of that
/// channel's `step` until the matching `mmap_commit`, or until the handle is
/// dropped. A null `addr` marks a channel that must not be touched.
pub unsafe trait PcmHandle: Send {
    type Params<'a>: HwParams
    where
        Self: 'a;

    /// Allocates a parameter object filled with the full configuration space.
    fn hw_params_any(&self) -> HwResult<Self::Params<'_>>;
    fn hw_params_commit(&self, params: &Self::Params<'_>) -> HwResult<()>;

    fn state(&self) -> PcmState;
    fn prepare(&mut self) -> HwResult<()>;
    fn start(&mut self) -> HwResult<()>;
    fn resume(&mut self) -> HwResult<()>;

    /// Frames available for writing. Xruns surface as errors.
    fn avail_update(&mut self) -> HwResult<usize>;

    /// Reserves up to `frames` contiguous frames. `areas` is refilled with one
    /// entry per channel; returns `(offset, granted)`.
    fn mmap_begin(&mut self, frames: usize, areas: &mut Vec<ChannelArea>)
    -> HwResult<(usize, usize)>;
    fn mmap_commit(&mut self, offset: usize, frames: usize) -> HwResult<usize>;

    fn poll_descriptors(&self) -> HwResult<Vec<libc::pollfd>>;
    /// Translates raw `revents` of the descriptors returned above into
    /// `POLLOUT`/`POLLIN`/`POLLERR`/`POLLHUP` bits.
    fn poll_revents(&self, fds: &mut [libc::pollfd]) -> HwResult<libc::c_short>;

    fn set_channel_map(&mut self, positions: &[ChannelPosition]) -> HwResult<()>;
}

pub trait AudioBackend: Send + Sync + 'static {
    type Handle: PcmHandle + 'static;

    const LABEL: &'static str;
    const WORKER_THREAD_NAME: &'static str;

    fn open(&self, id: DeviceId, direction: Direction) -> HwResult<Self::Handle>;

    fn device_ids(&self) -> Vec<DeviceId>;
    fn device_name(&self, id: DeviceId) -> Option<String>;
    fn supports_direction(&self, id: DeviceId, direction: Direction) -> bool;
    fn default_device_id(&self, direction: Direction) -> Option<DeviceId>;
}
