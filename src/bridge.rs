use crate::error::DeviceError;
use crate::format::{AccessMode, Sample, SampleFormat};
use crate::hw::{ChannelArea, PcmHandle};
use crate::negotiate::StreamConfig;
use std::marker::PhantomData;
use std::mem;
use tracing::trace;

/// Region of the ring buffer reserved by one `begin`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Grant {
    pub offset: usize,
    pub frames: usize,
}

/// Zero-copy access to the mapped hardware ring buffer.
#[derive(Debug)]
pub struct BufferBridge {
    areas: Vec<ChannelArea>,
    access: AccessMode,
    format: SampleFormat,
}

impl BufferBridge {
    pub fn new(config: &StreamConfig) -> Self {
        Self {
            areas: Vec::with_capacity(config.channels()),
            access: config.access,
            format: config.sample_format,
        }
    }

    /// Reserves up to `requested` frames. The grant may be smaller at the
    /// ring-buffer wrap.
    pub fn begin<H: PcmHandle>(
        &mut self,
        handle: &mut H,
        requested: usize,
    ) -> Result<Grant, DeviceError> {
        let (offset, granted) = handle
            .mmap_begin(requested, &mut self.areas)
            .map_err(DeviceError::Hardware)?;
        let frames = granted.min(requested);
        trace!("mmap begin: requested {} offset {} granted {}", requested, offset, frames);
        Ok(Grant { offset, frames })
    }

    pub fn view(&mut self, grant: &Grant) -> BufferView<'_> {
        BufferView {
            areas: &self.areas,
            offset: grant.offset,
            frames: grant.frames,
            access: self.access,
            format: self.format,
            _memory: PhantomData,
        }
    }

    /// Hands the granted frames to the hardware. Anything other than the full
    /// grant desynchronizes the ring buffer and is reported as an error.
    pub fn commit<H: PcmHandle>(&mut self, handle: &mut H, grant: Grant) -> Result<usize, DeviceError> {
        let committed = handle
            .mmap_commit(grant.offset, grant.frames)
            .map_err(DeviceError::Hardware)?;
        if committed != grant.frames {
            return Err(DeviceError::CommitMismatch {
                granted: grant.frames,
                committed,
            });
        }
        Ok(committed)
    }
}

/// View of the frames granted for one fill. Only valid until the matching
/// commit, which the lifetime enforces.
pub struct BufferView<'a> {
    areas: &'a [ChannelArea],
    offset: usize,
    frames: usize,
    access: AccessMode,
    format: SampleFormat,
    _memory: PhantomData<&'a mut [u8]>,
}

impl std::fmt::Debug for BufferView<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferView")
            .field("offset", &self.offset)
            .field("frames", &self.frames)
            .field("channels", &self.areas.len())
            .field("access", &self.access)
            .field("format", &self.format)
            .finish()
    }
}

impl<'a> BufferView<'a> {
    pub fn frames(&self) -> usize {
        self.frames
    }

    pub fn channels(&self) -> usize {
        self.areas.len()
    }

    pub fn access(&self) -> AccessMode {
        self.access
    }

    pub fn format(&self) -> SampleFormat {
        self.format
    }

    pub fn is_interleaved(&self) -> bool {
        self.access == AccessMode::MmapInterleaved
    }

    /// `None` for a channel the handle left unmapped.
    fn sample_ptr(&self, channel: usize, frame: usize) -> Option<*mut u8> {
        let area = &self.areas[channel];
        if area.addr.is_null() {
            return None;
        }
        let bits = area.first as usize + (self.offset + frame) * area.step as usize;
        // In bounds per the `PcmHandle` contract for granted frames.
        Some(unsafe { area.addr.add(bits / 8) })
    }

    fn typed<S: Sample>(&self, ptr: *mut u8) -> bool {
        S::accepts(self.format)
            && mem::size_of::<S>() == self.format.bytes()
            && (ptr as usize) % mem::align_of::<S>() == 0
    }

    /// All channels, frame after frame. `None` unless the stream uses
    /// interleaved access and `S` matches the sample format.
    pub fn interleaved<S: Sample>(&mut self) -> Option<&mut [S]> {
        if !self.is_interleaved() || self.areas.is_empty() {
            return None;
        }
        let frame_bits = self.channels() * self.format.bits();
        if self.areas[0].step as usize != frame_bits {
            return None;
        }
        let ptr = self.sample_ptr(0, 0)?;
        if !self.typed::<S>(ptr) {
            return None;
        }
        let len = self.frames * self.channels();
        Some(unsafe { std::slice::from_raw_parts_mut(ptr as *mut S, len) })
    }

    /// One channel's contiguous samples. `None` unless the stream uses planar
    /// access and `S` matches the sample format.
    pub fn channel<S: Sample>(&mut self, channel: usize) -> Option<&mut [S]> {
        if self.is_interleaved() || channel >= self.channels() {
            return None;
        }
        if self.areas[channel].step as usize != self.format.bits() {
            return None;
        }
        let ptr = self.sample_ptr(channel, 0)?;
        if !self.typed::<S>(ptr) {
            return None;
        }
        Some(unsafe { std::slice::from_raw_parts_mut(ptr as *mut S, self.frames) })
    }

    /// Layout independent single-sample write.
    pub fn write<S: Sample>(&mut self, channel: usize, frame: usize, value: S) -> bool {
        if channel >= self.channels() || frame >= self.frames {
            return false;
        }
        let Some(ptr) = self.sample_ptr(channel, frame) else {
            return false;
        };
        if !self.typed::<S>(ptr) {
            return false;
        }
        unsafe { (ptr as *mut S).write(value) };
        true
    }

    pub fn fill_silence(&mut self) {
        let bytes = self.format.bytes();
        for channel in 0..self.channels() {
            for frame in 0..self.frames {
                let Some(ptr) = self.sample_ptr(channel, frame) else {
                    break;
                };
                unsafe { std::ptr::write_bytes(ptr, 0, bytes) };
            }
        }
    }
}
