use crate::format::{CANDIDATE_RATES, SampleFormat};
use crate::hw::{HwParams, PcmHandle};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Stream parameters a device accepts, in preference order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilitySet {
    pub sample_rates: Vec<u32>,
    pub sample_formats: Vec<SampleFormat>,
    pub min_buffer_frames: usize,
    pub max_buffer_frames: usize,
}

impl CapabilitySet {
    pub fn is_empty(&self) -> bool {
        self.sample_rates.is_empty()
            || self.sample_formats.is_empty()
            || (self.min_buffer_frames != 0
                && self.max_buffer_frames != 0
                && self.min_buffer_frames > self.max_buffer_frames)
    }

    pub fn supports_rate(&self, rate: u32) -> bool {
        self.sample_rates.contains(&rate)
    }

    pub fn supports_format(&self, format: SampleFormat) -> bool {
        self.sample_formats.contains(&format)
    }

    pub fn buffer_size_in_range(&self, frames: usize) -> bool {
        frames >= self.min_buffer_frames
            && (self.max_buffer_frames == 0 || frames <= self.max_buffer_frames)
    }

    /// First accepted format in negotiation preference order.
    pub fn preferred_format(&self) -> Option<SampleFormat> {
        SampleFormat::PREFERENCE
            .into_iter()
            .find(|f| self.supports_format(*f))
    }
}

/// Queries the device's parameter space without committing anything. A device
/// that cannot be queried yields an empty set.
pub fn probe<H: PcmHandle>(handle: &H) -> CapabilitySet {
    let params = match handle.hw_params_any() {
        Ok(p) => p,
        Err(e) => {
            debug!("capability probe failed: {}", e);
            return CapabilitySet::default();
        }
    };

    let sample_rates: Vec<u32> = CANDIDATE_RATES
        .into_iter()
        .filter(|rate| params.test_rate(*rate).is_ok())
        .collect();
    let sample_formats: Vec<SampleFormat> = SampleFormat::PREFERENCE
        .into_iter()
        .filter(|format| params.test_format(*format).is_ok())
        .collect();

    let (min_buffer_frames, max_buffer_frames) =
        match (params.buffer_size_min(), params.buffer_size_max()) {
            (Ok(min), Ok(max)) => (min, max),
            (Err(e), _) | (_, Err(e)) => {
                debug!("buffer size range query failed: {}", e);
                return CapabilitySet::default();
            }
        };

    let caps = CapabilitySet {
        sample_rates,
        sample_formats,
        min_buffer_frames,
        max_buffer_frames,
    };
    if caps.is_empty() {
        debug!("device reported an empty capability set: {:?}", caps);
        return CapabilitySet::default();
    }
    caps
}
