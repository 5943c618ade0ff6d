use nix::libc;
use std::fmt;
use thiserror::Error;

/// Raw status reported by the hardware layer: a negative errno-style code and
/// the primitive that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HwError {
    pub code: i32,
    pub op: &'static str,
}

pub type HwResult<T> = Result<T, HwError>;

#[cfg(any(target_os = "linux", target_os = "android"))]
pub const ESTRPIPE: i32 = libc::ESTRPIPE;
#[cfg(not(any(target_os = "linux", target_os = "android")))]
pub const ESTRPIPE: i32 = 86;

#[cfg(any(target_os = "linux", target_os = "android"))]
pub const EBADFD: i32 = libc::EBADFD;
#[cfg(not(any(target_os = "linux", target_os = "android")))]
pub const EBADFD: i32 = 77;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HwErrorKind {
    Underrun,
    Suspended,
    Again,
    Disconnected,
    Other,
}

impl HwError {
    pub fn new(op: &'static str, code: i32) -> Self {
        // Some callers hand over positive errno values.
        let code = if code > 0 { -code } else { code };
        Self { code, op }
    }

    pub fn check(op: &'static str, rc: i32) -> HwResult<i32> {
        if rc < 0 { Err(Self::new(op, rc)) } else { Ok(rc) }
    }

    pub fn kind(&self) -> HwErrorKind {
        match -self.code {
            libc::EPIPE => HwErrorKind::Underrun,
            ESTRPIPE => HwErrorKind::Suspended,
            libc::EAGAIN => HwErrorKind::Again,
            libc::ENODEV | EBADFD => HwErrorKind::Disconnected,
            _ => HwErrorKind::Other,
        }
    }

    pub fn is_xrun(&self) -> bool {
        matches!(self.kind(), HwErrorKind::Underrun | HwErrorKind::Suspended)
    }
}

impl fmt::Display for HwError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} failed: {} ({})",
            self.op,
            std::io::Error::from_raw_os_error(-self.code),
            self.code
        )
    }
}

impl std::error::Error for HwError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Rejected before the stream ever runs.
    Configuration,
    /// Terminated a running stream.
    Fatal,
    /// API misuse.
    Programming,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DeviceError {
    #[error("device reported no usable sample rates or formats")]
    NoCapabilities,

    #[error("neither mmap interleaved nor mmap non-interleaved access is supported")]
    NoAccessMode,

    #[error("sample rate {0} Hz is not supported by the device")]
    UnsupportedRate(u32),

    #[error("sample format {0} is not supported by the device")]
    UnsupportedFormat(crate::format::SampleFormat),

    #[error("buffer size {requested} frames outside supported range [{min}, {max}]")]
    BufferSizeOutOfRange {
        requested: usize,
        min: usize,
        max: usize,
    },

    #[error("failed to open '{device}': {source}")]
    Open { device: String, source: HwError },

    #[error("hardware configuration failed: {0}")]
    Config(HwError),

    #[error("hardware error: {0}")]
    Hardware(HwError),

    #[error("xrun recovery failed: {0}")]
    Recovery(HwError),

    #[error("device disconnected")]
    Disconnected,

    #[error("stream left the loop in state {0:?}")]
    StreamLost(crate::hw::PcmState),

    #[error("poll wait failed: {0}")]
    Wait(String),

    #[error("stream thread failed: {0}")]
    Thread(String),

    #[error("worker did not exit within {0:?}")]
    StopTimeout(std::time::Duration),

    #[error("cannot connect a callback to a running device")]
    ConnectWhileRunning,

    #[error("cannot reconfigure a running device")]
    Running,

    #[error("{requested:?} request for a {device:?} device")]
    DirectionMismatch {
        device: crate::format::Direction,
        requested: crate::format::Direction,
    },

    #[error("mmap commit of {committed} frames does not match {granted} granted frames")]
    CommitMismatch { granted: usize, committed: usize },
}

impl DeviceError {
    pub fn class(&self) -> ErrorClass {
        match self {
            DeviceError::NoCapabilities
            | DeviceError::NoAccessMode
            | DeviceError::UnsupportedRate(_)
            | DeviceError::UnsupportedFormat(_)
            | DeviceError::BufferSizeOutOfRange { .. }
            | DeviceError::Open { .. }
            | DeviceError::Config(_) => ErrorClass::Configuration,
            DeviceError::Hardware(_)
            | DeviceError::Recovery(_)
            | DeviceError::Disconnected
            | DeviceError::StreamLost(_)
            | DeviceError::Wait(_)
            | DeviceError::Thread(_)
            | DeviceError::StopTimeout(_) => ErrorClass::Fatal,
            DeviceError::ConnectWhileRunning
            | DeviceError::Running
            | DeviceError::DirectionMismatch { .. }
            | DeviceError::CommitMismatch { .. } => ErrorClass::Programming,
        }
    }
}
