use crate::error::{HwError, HwResult};
use crate::format::{AccessMode, Direction, SampleFormat};
use crate::hw::traits::{ChannelArea, ChannelPosition, HwParams, PcmHandle, PcmState};
use alsa_sys as sys;
use nix::libc::{self, c_int, c_uint, c_ushort};
use std::cell::Cell;
use std::ffi::CString;
use std::marker::PhantomData;
use std::ptr;

// `alsa-sys` does not export these `<alsa/pcm.h>` defines; values match the header.
const SND_PCM_NO_AUTO_RESAMPLE: c_int = 0x0001_0000;
const SND_PCM_NO_AUTO_CHANNELS: c_int = 0x0002_0000;
const SND_PCM_NO_AUTO_FORMAT: c_int = 0x0004_0000;

const OPEN_MODE: c_int = (sys::SND_PCM_NONBLOCK
    | SND_PCM_NO_AUTO_RESAMPLE
    | SND_PCM_NO_AUTO_CHANNELS
    | SND_PCM_NO_AUTO_FORMAT) as c_int;

#[cfg(target_endian = "little")]
fn native_format(format: SampleFormat) -> sys::snd_pcm_format_t {
    match format {
        SampleFormat::F32 => sys::SND_PCM_FORMAT_FLOAT_LE,
        SampleFormat::S16 => sys::SND_PCM_FORMAT_S16_LE,
        SampleFormat::S24 => sys::SND_PCM_FORMAT_S24_LE,
        SampleFormat::S32 => sys::SND_PCM_FORMAT_S32_LE,
        SampleFormat::F64 => sys::SND_PCM_FORMAT_FLOAT64_LE,
        SampleFormat::S8 => sys::SND_PCM_FORMAT_S8,
    }
}

#[cfg(target_endian = "big")]
fn native_format(format: SampleFormat) -> sys::snd_pcm_format_t {
    match format {
        SampleFormat::F32 => sys::SND_PCM_FORMAT_FLOAT_BE,
        SampleFormat::S16 => sys::SND_PCM_FORMAT_S16_BE,
        SampleFormat::S24 => sys::SND_PCM_FORMAT_S24_BE,
        SampleFormat::S32 => sys::SND_PCM_FORMAT_S32_BE,
        SampleFormat::F64 => sys::SND_PCM_FORMAT_FLOAT64_BE,
        SampleFormat::S8 => sys::SND_PCM_FORMAT_S8,
    }
}

fn native_access(access: AccessMode) -> sys::snd_pcm_access_t {
    match access {
        AccessMode::MmapInterleaved => sys::SND_PCM_ACCESS_MMAP_INTERLEAVED,
        AccessMode::MmapPlanar => sys::SND_PCM_ACCESS_MMAP_NONINTERLEAVED,
    }
}

fn native_position(position: ChannelPosition) -> c_uint {
    match position {
        ChannelPosition::Mono => sys::SND_CHMAP_MONO as c_uint,
        ChannelPosition::FrontLeft => sys::SND_CHMAP_FL as c_uint,
        ChannelPosition::FrontRight => sys::SND_CHMAP_FR as c_uint,
    }
}

/// Owned `snd_pcm_t`, opened non-blocking on a raw `hw:` device.
#[derive(Debug)]
pub struct AlsaPcm {
    pcm: *mut sys::snd_pcm_t,
    name: String,
    // Channel count of the committed configuration; sizes the mmap areas.
    channels: Cell<usize>,
}

// The handle is used from one thread at a time: the caller while negotiating,
// then the stream thread.
unsafe impl Send for AlsaPcm {}

impl AlsaPcm {
    pub fn open(name: &str, direction: Direction) -> HwResult<Self> {
        let c_name = CString::new(name).map_err(|_| HwError::new("snd_pcm_open", libc::EINVAL))?;
        let stream = match direction {
            Direction::Playback => sys::SND_PCM_STREAM_PLAYBACK,
            Direction::Capture => sys::SND_PCM_STREAM_CAPTURE,
        };
        let mut pcm = ptr::null_mut();
        HwError::check("snd_pcm_open", unsafe {
            sys::snd_pcm_open(&mut pcm, c_name.as_ptr(), stream, OPEN_MODE)
        })?;
        Ok(Self {
            pcm,
            name: name.to_string(),
            channels: Cell::new(0),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for AlsaPcm {
    fn drop(&mut self) {
        unsafe {
            sys::snd_pcm_close(self.pcm);
        }
    }
}

/// Owned `snd_pcm_hw_params_t` bound to the handle it was filled from.
pub struct AlsaHwParams<'a> {
    pcm: *mut sys::snd_pcm_t,
    params: *mut sys::snd_pcm_hw_params_t,
    _pcm: PhantomData<&'a AlsaPcm>,
}

impl Drop for AlsaHwParams<'_> {
    fn drop(&mut self) {
        unsafe {
            sys::snd_pcm_hw_params_free(self.params);
        }
    }
}

impl HwParams for AlsaHwParams<'_> {
    fn test_rate(&self, rate: u32) -> HwResult<()> {
        HwError::check("snd_pcm_hw_params_test_rate", unsafe {
            sys::snd_pcm_hw_params_test_rate(self.pcm, self.params, rate, 0)
        })
        .map(|_| ())
    }

    fn test_format(&self, format: SampleFormat) -> HwResult<()> {
        HwError::check("snd_pcm_hw_params_test_format", unsafe {
            sys::snd_pcm_hw_params_test_format(self.pcm, self.params, native_format(format))
        })
        .map(|_| ())
    }

    fn buffer_size_min(&self) -> HwResult<usize> {
        let mut frames: sys::snd_pcm_uframes_t = 0;
        HwError::check("snd_pcm_hw_params_get_buffer_size_min", unsafe {
            sys::snd_pcm_hw_params_get_buffer_size_min(self.params, &mut frames)
        })?;
        Ok(frames as usize)
    }

    fn buffer_size_max(&self) -> HwResult<usize> {
        let mut frames: sys::snd_pcm_uframes_t = 0;
        HwError::check("snd_pcm_hw_params_get_buffer_size_max", unsafe {
            sys::snd_pcm_hw_params_get_buffer_size_max(self.params, &mut frames)
        })?;
        Ok(frames as usize)
    }

    fn set_rate_resample(&mut self, enabled: bool) -> HwResult<()> {
        HwError::check("snd_pcm_hw_params_set_rate_resample", unsafe {
            sys::snd_pcm_hw_params_set_rate_resample(self.pcm, self.params, enabled as c_uint)
        })
        .map(|_| ())
    }

    fn set_access(&mut self, access: AccessMode) -> HwResult<()> {
        HwError::check("snd_pcm_hw_params_set_access", unsafe {
            sys::snd_pcm_hw_params_set_access(self.pcm, self.params, native_access(access))
        })
        .map(|_| ())
    }

    fn set_format(&mut self, format: SampleFormat) -> HwResult<()> {
        HwError::check("snd_pcm_hw_params_set_format", unsafe {
            sys::snd_pcm_hw_params_set_format(self.pcm, self.params, native_format(format))
        })
        .map(|_| ())
    }

    fn set_channels(&mut self, channels: usize) -> HwResult<()> {
        HwError::check("snd_pcm_hw_params_set_channels", unsafe {
            sys::snd_pcm_hw_params_set_channels(self.pcm, self.params, channels as c_uint)
        })
        .map(|_| ())
    }

    fn set_rate(&mut self, rate: u32) -> HwResult<()> {
        HwError::check("snd_pcm_hw_params_set_rate", unsafe {
            sys::snd_pcm_hw_params_set_rate(self.pcm, self.params, rate, 0)
        })
        .map(|_| ())
    }

    fn set_buffer_size_near(&mut self, frames: usize) -> HwResult<usize> {
        let mut frames = frames as sys::snd_pcm_uframes_t;
        HwError::check("snd_pcm_hw_params_set_buffer_size_near", unsafe {
            sys::snd_pcm_hw_params_set_buffer_size_near(self.pcm, self.params, &mut frames)
        })?;
        Ok(frames as usize)
    }
}

// SAFETY: areas come from `snd_pcm_mmap_begin` and map the ring buffer owned
// by this handle, which stays mapped until `snd_pcm_close` in `Drop`.
unsafe impl PcmHandle for AlsaPcm {
    type Params<'a> = AlsaHwParams<'a>;

    fn hw_params_any(&self) -> HwResult<AlsaHwParams<'_>> {
        let mut params = ptr::null_mut();
        HwError::check("snd_pcm_hw_params_malloc", unsafe {
            sys::snd_pcm_hw_params_malloc(&mut params)
        })?;
        let params = AlsaHwParams {
            pcm: self.pcm,
            params,
            _pcm: PhantomData,
        };
        HwError::check("snd_pcm_hw_params_any", unsafe {
            sys::snd_pcm_hw_params_any(self.pcm, params.params)
        })?;
        Ok(params)
    }

    fn hw_params_commit(&self, params: &AlsaHwParams<'_>) -> HwResult<()> {
        HwError::check("snd_pcm_hw_params", unsafe {
            sys::snd_pcm_hw_params(self.pcm, params.params)
        })?;
        let mut channels: c_uint = 0;
        HwError::check("snd_pcm_hw_params_get_channels", unsafe {
            sys::snd_pcm_hw_params_get_channels(params.params, &mut channels)
        })?;
        self.channels.set(channels as usize);
        Ok(())
    }

    fn state(&self) -> PcmState {
        match unsafe { sys::snd_pcm_state(self.pcm) } {
            sys::SND_PCM_STATE_OPEN => PcmState::Open,
            sys::SND_PCM_STATE_SETUP => PcmState::Setup,
            sys::SND_PCM_STATE_PREPARED => PcmState::Prepared,
            sys::SND_PCM_STATE_RUNNING => PcmState::Running,
            sys::SND_PCM_STATE_XRUN => PcmState::XRun,
            sys::SND_PCM_STATE_DRAINING => PcmState::Draining,
            sys::SND_PCM_STATE_PAUSED => PcmState::Paused,
            sys::SND_PCM_STATE_SUSPENDED => PcmState::Suspended,
            _ => PcmState::Disconnected,
        }
    }

    fn prepare(&mut self) -> HwResult<()> {
        HwError::check("snd_pcm_prepare", unsafe { sys::snd_pcm_prepare(self.pcm) }).map(|_| ())
    }

    fn start(&mut self) -> HwResult<()> {
        HwError::check("snd_pcm_start", unsafe { sys::snd_pcm_start(self.pcm) }).map(|_| ())
    }

    fn resume(&mut self) -> HwResult<()> {
        HwError::check("snd_pcm_resume", unsafe { sys::snd_pcm_resume(self.pcm) }).map(|_| ())
    }

    fn avail_update(&mut self) -> HwResult<usize> {
        let avail = unsafe { sys::snd_pcm_avail_update(self.pcm) };
        if avail < 0 {
            return Err(HwError::new("snd_pcm_avail_update", avail as i32));
        }
        Ok(avail as usize)
    }

    fn mmap_begin(
        &mut self,
        frames: usize,
        areas: &mut Vec<ChannelArea>,
    ) -> HwResult<(usize, usize)> {
        let mut raw: *const sys::snd_pcm_channel_area_t = ptr::null();
        let mut offset: sys::snd_pcm_uframes_t = 0;
        let mut granted = frames as sys::snd_pcm_uframes_t;
        HwError::check("snd_pcm_mmap_begin", unsafe {
            sys::snd_pcm_mmap_begin(self.pcm, &mut raw, &mut offset, &mut granted)
        })?;
        areas.clear();
        if !raw.is_null() {
            let slice = unsafe { std::slice::from_raw_parts(raw, self.channels.get()) };
            areas.extend(slice.iter().map(|area| ChannelArea {
                addr: area.addr.cast(),
                first: area.first,
                step: area.step,
            }));
        }
        Ok((offset as usize, granted as usize))
    }

    fn mmap_commit(&mut self, offset: usize, frames: usize) -> HwResult<usize> {
        let committed = unsafe {
            sys::snd_pcm_mmap_commit(
                self.pcm,
                offset as sys::snd_pcm_uframes_t,
                frames as sys::snd_pcm_uframes_t,
            )
        };
        if committed < 0 {
            return Err(HwError::new("snd_pcm_mmap_commit", committed as i32));
        }
        Ok(committed as usize)
    }

    fn poll_descriptors(&self) -> HwResult<Vec<libc::pollfd>> {
        let count = HwError::check("snd_pcm_poll_descriptors_count", unsafe {
            sys::snd_pcm_poll_descriptors_count(self.pcm)
        })? as usize;
        let mut fds = vec![
            libc::pollfd {
                fd: -1,
                events: 0,
                revents: 0,
            };
            count
        ];
        let filled = HwError::check("snd_pcm_poll_descriptors", unsafe {
            sys::snd_pcm_poll_descriptors(self.pcm, fds.as_mut_ptr().cast(), count as c_uint)
        })? as usize;
        fds.truncate(filled);
        Ok(fds)
    }

    fn poll_revents(&self, fds: &mut [libc::pollfd]) -> HwResult<libc::c_short> {
        let mut revents: c_ushort = 0;
        HwError::check("snd_pcm_poll_descriptors_revents", unsafe {
            sys::snd_pcm_poll_descriptors_revents(
                self.pcm,
                fds.as_mut_ptr().cast(),
                fds.len() as c_uint,
                &mut revents,
            )
        })?;
        Ok(revents as libc::c_short)
    }

    fn set_channel_map(&mut self, positions: &[ChannelPosition]) -> HwResult<()> {
        // snd_pcm_chmap_t is a channel count followed by the positions.
        let mut map: Vec<c_uint> = Vec::with_capacity(positions.len() + 1);
        map.push(positions.len() as c_uint);
        map.extend(positions.iter().copied().map(native_position));
        HwError::check("snd_pcm_set_chmap", unsafe {
            sys::snd_pcm_set_chmap(self.pcm, map.as_ptr().cast())
        })
        .map(|_| ())
    }
}
