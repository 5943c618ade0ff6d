use crate::error::DeviceError;
use crate::format::{AccessMode, Direction, SampleFormat};
use crate::hw::{ChannelPosition, HwParams, PcmHandle};
use crate::probe::CapabilitySet;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// What the caller asks for. Unset fields are chosen from the capability set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamRequest {
    pub direction: Direction,
    pub channels: usize,
    pub buffer_frames: usize,
    pub sample_rate: Option<u32>,
    pub sample_format: Option<SampleFormat>,
}

impl StreamRequest {
    pub fn playback(channels: usize, buffer_frames: usize) -> Self {
        Self {
            direction: Direction::Playback,
            channels,
            buffer_frames,
            sample_rate: None,
            sample_format: None,
        }
    }

    pub fn capture(channels: usize, buffer_frames: usize) -> Self {
        Self {
            direction: Direction::Capture,
            ..Self::playback(channels, buffer_frames)
        }
    }

    /// Pins every parameter to an already negotiated configuration.
    pub fn from_config(config: &StreamConfig) -> Self {
        Self {
            direction: if config.output_channels > 0 {
                Direction::Playback
            } else {
                Direction::Capture
            },
            channels: config.channels(),
            buffer_frames: config.buffer_frames,
            sample_rate: Some(config.sample_rate),
            sample_format: Some(config.sample_format),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamConfig {
    pub access: AccessMode,
    pub sample_rate: u32,
    pub sample_format: SampleFormat,
    pub input_channels: usize,
    pub output_channels: usize,
    pub buffer_frames: usize,
    #[serde(skip)]
    pub channel_map: Option<Vec<ChannelPosition>>,
}

impl StreamConfig {
    pub fn channels(&self) -> usize {
        self.input_channels.max(self.output_channels)
    }

    pub fn frame_bytes(&self) -> usize {
        self.channels() * self.sample_format.bytes()
    }
}

/// Fixed channel map table. Only mono and stereo layouts are known.
pub fn channel_map_for(channels: usize) -> Option<Vec<ChannelPosition>> {
    match channels {
        1 => Some(vec![ChannelPosition::Mono]),
        2 => Some(vec![ChannelPosition::FrontLeft, ChannelPosition::FrontRight]),
        _ => None,
    }
}

/// Selects rate, format, access mode and buffer size, then commits them in one
/// step. On error nothing has been committed.
pub fn negotiate<H: PcmHandle>(
    handle: &mut H,
    caps: &CapabilitySet,
    request: &StreamRequest,
) -> Result<StreamConfig, DeviceError> {
    if caps.is_empty() {
        return Err(DeviceError::NoCapabilities);
    }

    let sample_rate = match request.sample_rate {
        Some(rate) if caps.supports_rate(rate) => rate,
        Some(rate) => return Err(DeviceError::UnsupportedRate(rate)),
        None => caps.sample_rates[0],
    };
    let sample_format = match request.sample_format {
        Some(format) if caps.supports_format(format) => format,
        Some(format) => return Err(DeviceError::UnsupportedFormat(format)),
        None => caps.preferred_format().ok_or(DeviceError::NoCapabilities)?,
    };

    let (access, buffer_frames) = {
        let mut params = handle.hw_params_any().map_err(DeviceError::Config)?;
        params.set_rate_resample(false).map_err(DeviceError::Config)?;

        let access = AccessMode::PREFERENCE
            .into_iter()
            .find(|mode| match params.set_access(*mode) {
                Ok(()) => true,
                Err(e) => {
                    debug!("access mode {:?} rejected: {}", mode, e);
                    false
                }
            })
            .ok_or(DeviceError::NoAccessMode)?;

        params
            .set_format(sample_format)
            .map_err(DeviceError::Config)?;
        params
            .set_channels(request.channels)
            .map_err(DeviceError::Config)?;
        params.set_rate(sample_rate).map_err(DeviceError::Config)?;
        let buffer_frames = params
            .set_buffer_size_near(request.buffer_frames)
            .map_err(DeviceError::Config)?;

        handle
            .hw_params_commit(&params)
            .map_err(DeviceError::Config)?;
        (access, buffer_frames)
    };

    let channel_map = match channel_map_for(request.channels) {
        Some(map) => match handle.set_channel_map(&map) {
            Ok(()) => Some(map),
            Err(e) => {
                debug!("channel map not applied: {}", e);
                None
            }
        },
        None => {
            warn!(
                "no channel map for {} channels; hardware default layout left in place",
                request.channels
            );
            None
        }
    };

    let (input_channels, output_channels) = match request.direction {
        Direction::Playback => (0, request.channels),
        Direction::Capture => (request.channels, 0),
    };

    Ok(StreamConfig {
        access,
        sample_rate,
        sample_format,
        input_channels,
        output_channels,
        buffer_frames,
        channel_map,
    })
}
