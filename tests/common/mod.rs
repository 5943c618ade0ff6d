#![allow(dead_code)]

//! Scripted in-process hardware used by the integration tests.
//!
//! The fake keeps a real ring buffer and a real readiness descriptor (one end
//! of a socket pair), so the stream thread blocks in `poll` exactly as it does
//! on ALSA. Tests move the hardware forward with [`FakeHw::advance`] and inject
//! faults through the other `FakeHw` methods.

use maolan_device::error::{EBADFD, ESTRPIPE, HwError, HwResult};
use maolan_device::format::{AccessMode, Direction, SampleFormat};
use maolan_device::hw::{
    AudioBackend, ChannelArea, ChannelPosition, DeviceId, HwParams, PcmHandle, PcmState,
};
use maolan_device::{Device, StreamOptions};
use nix::libc;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::io::{ErrorKind, Read, Write};
use std::os::fd::AsRawFd;
use std::os::unix::net::UnixStream;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

pub fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(1));
    }
    cond()
}

pub const TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct FakeSpec {
    pub rates: Vec<u32>,
    pub formats: Vec<SampleFormat>,
    pub access: Vec<AccessMode>,
    pub min_buffer: usize,
    pub max_buffer: usize,
    pub fail_open: bool,
    pub fail_query: bool,
    pub fail_commit: bool,
    pub fail_chmap: bool,
    pub short_commit: bool,
    pub devices: Vec<(DeviceId, String, Direction)>,
    pub default_device: Option<DeviceId>,
}

impl Default for FakeSpec {
    fn default() -> Self {
        Self {
            rates: vec![44100, 48000],
            formats: vec![SampleFormat::F32, SampleFormat::S16],
            access: vec![AccessMode::MmapInterleaved, AccessMode::MmapPlanar],
            min_buffer: 64,
            max_buffer: 4096,
            fail_open: false,
            fail_query: false,
            fail_commit: false,
            fail_chmap: false,
            short_commit: false,
            devices: vec![(
                DeviceId::new(0, 0),
                "Fake Card, Fake PCM".to_string(),
                Direction::Playback,
            )],
            default_device: Some(DeviceId::new(0, 0)),
        }
    }
}

/// Counters, logs and fault injection shared by every handle of one backend.
#[derive(Debug)]
pub struct FakeHw {
    pub opens: AtomicUsize,
    pub closes: AtomicUsize,
    pub hw_commits: AtomicUsize,
    pub fail_prepare: AtomicBool,
    ops: Mutex<Vec<&'static str>>,
    grants: Mutex<Vec<usize>>,
    commits: Mutex<Vec<usize>>,
    pending: AtomicUsize,
    avail_errors: Mutex<VecDeque<i32>>,
    resume_results: Mutex<VecDeque<i32>>,
    forced_state: Mutex<Option<PcmState>>,
    wake_tx: UnixStream,
    wake_rx: UnixStream,
}

impl FakeHw {
    fn new() -> Self {
        let (wake_tx, wake_rx) = UnixStream::pair().unwrap();
        wake_tx.set_nonblocking(true).unwrap();
        wake_rx.set_nonblocking(true).unwrap();
        Self {
            opens: AtomicUsize::new(0),
            closes: AtomicUsize::new(0),
            hw_commits: AtomicUsize::new(0),
            fail_prepare: AtomicBool::new(false),
            ops: Mutex::new(Vec::new()),
            grants: Mutex::new(Vec::new()),
            commits: Mutex::new(Vec::new()),
            pending: AtomicUsize::new(0),
            avail_errors: Mutex::new(VecDeque::new()),
            resume_results: Mutex::new(VecDeque::new()),
            forced_state: Mutex::new(None),
            wake_tx,
            wake_rx,
        }
    }

    fn wake(&self) {
        let _ = (&self.wake_tx).write(&[1]);
    }

    fn log(&self, op: &'static str) {
        self.ops.lock().unwrap().push(op);
    }

    /// Lets the hardware consume `frames`; the stream sees them as available.
    pub fn advance(&self, frames: usize) {
        self.pending.fetch_add(frames, Ordering::SeqCst);
        self.wake();
    }

    /// The next `avail_update` fails with `code` (negative errno).
    pub fn inject_avail_error(&self, code: i32) {
        self.avail_errors.lock().unwrap().push_back(code);
        self.wake();
    }

    /// Results of the next `resume` calls; an empty script means success.
    pub fn script_resume(&self, codes: &[i32]) {
        self.resume_results.lock().unwrap().extend(codes);
    }

    pub fn force_state(&self, state: PcmState) {
        *self.forced_state.lock().unwrap() = Some(state);
        self.wake();
    }

    pub fn ops(&self) -> Vec<&'static str> {
        self.ops.lock().unwrap().clone()
    }

    pub fn count(&self, op: &str) -> usize {
        self.ops.lock().unwrap().iter().filter(|o| **o == op).count()
    }

    pub fn grants(&self) -> Vec<usize> {
        self.grants.lock().unwrap().clone()
    }

    pub fn commits(&self) -> Vec<usize> {
        self.commits.lock().unwrap().clone()
    }

    pub fn committed_frames(&self) -> usize {
        self.commits.lock().unwrap().iter().sum()
    }

    pub fn open_handles(&self) -> usize {
        self.opens.load(Ordering::SeqCst) - self.closes.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone)]
pub struct FakeBackend {
    spec: Arc<FakeSpec>,
    hw: Arc<FakeHw>,
}

impl FakeBackend {
    pub fn new(spec: FakeSpec) -> Self {
        Self {
            spec: Arc::new(spec),
            hw: Arc::new(FakeHw::new()),
        }
    }

    pub fn hw(&self) -> Arc<FakeHw> {
        self.hw.clone()
    }

    fn entry(&self, id: DeviceId) -> Option<&(DeviceId, String, Direction)> {
        self.spec.devices.iter().find(|(dev, _, _)| *dev == id)
    }
}

impl AudioBackend for FakeBackend {
    type Handle = FakePcm;

    const LABEL: &'static str = "Fake";
    const WORKER_THREAD_NAME: &'static str = "fake-pcm";

    fn open(&self, _id: DeviceId, _direction: Direction) -> HwResult<FakePcm> {
        if self.spec.fail_open {
            return Err(HwError::new("open", -libc::EBUSY));
        }
        self.hw.opens.fetch_add(1, Ordering::SeqCst);
        Ok(FakePcm {
            spec: self.spec.clone(),
            hw: self.hw.clone(),
            inner: RefCell::new(Inner::default()),
        })
    }

    fn device_ids(&self) -> Vec<DeviceId> {
        self.spec.devices.iter().map(|(id, _, _)| *id).collect()
    }

    fn device_name(&self, id: DeviceId) -> Option<String> {
        self.entry(id).map(|(_, name, _)| name.clone())
    }

    fn supports_direction(&self, id: DeviceId, direction: Direction) -> bool {
        self.entry(id).is_some_and(|(_, _, dir)| *dir == direction)
    }

    fn default_device_id(&self, direction: Direction) -> Option<DeviceId> {
        self.spec
            .default_device
            .filter(|id| self.supports_direction(*id, direction))
    }
}

#[derive(Debug, Clone, Copy)]
struct Committed {
    access: AccessMode,
    format: SampleFormat,
    channels: usize,
    buffer: usize,
}

#[derive(Debug)]
struct Inner {
    state: PcmState,
    config: Option<Committed>,
    ring: Vec<u64>,
    appl: usize,
    avail: usize,
}

impl Default for Inner {
    fn default() -> Self {
        Self {
            state: PcmState::Open,
            config: None,
            ring: Vec::new(),
            appl: 0,
            avail: 0,
        }
    }
}

#[derive(Debug)]
pub struct FakePcm {
    spec: Arc<FakeSpec>,
    hw: Arc<FakeHw>,
    inner: RefCell<Inner>,
}

impl Drop for FakePcm {
    fn drop(&mut self) {
        self.hw.closes.fetch_add(1, Ordering::SeqCst);
    }
}

pub struct FakeParams<'a> {
    spec: &'a FakeSpec,
    access: Option<AccessMode>,
    format: Option<SampleFormat>,
    channels: Option<usize>,
    rate: Option<u32>,
    buffer: Option<usize>,
    resample: bool,
}

fn einval(op: &'static str) -> HwError {
    HwError::new(op, -libc::EINVAL)
}

impl HwParams for FakeParams<'_> {
    fn test_rate(&self, rate: u32) -> HwResult<()> {
        if self.spec.rates.contains(&rate) { Ok(()) } else { Err(einval("test_rate")) }
    }

    fn test_format(&self, format: SampleFormat) -> HwResult<()> {
        if self.spec.formats.contains(&format) {
            Ok(())
        } else {
            Err(einval("test_format"))
        }
    }

    fn buffer_size_min(&self) -> HwResult<usize> {
        Ok(self.spec.min_buffer)
    }

    fn buffer_size_max(&self) -> HwResult<usize> {
        Ok(self.spec.max_buffer)
    }

    fn set_rate_resample(&mut self, enabled: bool) -> HwResult<()> {
        self.resample = enabled;
        Ok(())
    }

    fn set_access(&mut self, access: AccessMode) -> HwResult<()> {
        if !self.spec.access.contains(&access) {
            return Err(einval("set_access"));
        }
        self.access = Some(access);
        Ok(())
    }

    fn set_format(&mut self, format: SampleFormat) -> HwResult<()> {
        if !self.spec.formats.contains(&format) {
            return Err(einval("set_format"));
        }
        self.format = Some(format);
        Ok(())
    }

    fn set_channels(&mut self, channels: usize) -> HwResult<()> {
        if !(1..=8).contains(&channels) {
            return Err(einval("set_channels"));
        }
        self.channels = Some(channels);
        Ok(())
    }

    fn set_rate(&mut self, rate: u32) -> HwResult<()> {
        if self.resample || !self.spec.rates.contains(&rate) {
            return Err(einval("set_rate"));
        }
        self.rate = Some(rate);
        Ok(())
    }

    fn set_buffer_size_near(&mut self, frames: usize) -> HwResult<usize> {
        let frames = frames.clamp(self.spec.min_buffer, self.spec.max_buffer);
        self.buffer = Some(frames);
        Ok(frames)
    }
}

// SAFETY: areas point into `ring`, which is sized once at commit and only
// reallocated by the next commit.
unsafe impl PcmHandle for FakePcm {
    type Params<'a> = FakeParams<'a>;

    fn hw_params_any(&self) -> HwResult<FakeParams<'_>> {
        if self.spec.fail_query {
            return Err(HwError::new("hw_params_any", -libc::ENODEV));
        }
        Ok(FakeParams {
            spec: &self.spec,
            access: None,
            format: None,
            channels: None,
            rate: None,
            buffer: None,
            resample: true,
        })
    }

    fn hw_params_commit(&self, params: &FakeParams<'_>) -> HwResult<()> {
        if self.spec.fail_commit {
            return Err(HwError::new("hw_params", -libc::EIO));
        }
        let (Some(access), Some(format), Some(channels), Some(_), Some(buffer)) = (
            params.access,
            params.format,
            params.channels,
            params.rate,
            params.buffer,
        ) else {
            return Err(einval("hw_params"));
        };
        let bytes = buffer * channels * format.bytes();
        let mut inner = self.inner.borrow_mut();
        inner.ring = vec![0_u64; bytes.div_ceil(8)];
        inner.config = Some(Committed {
            access,
            format,
            channels,
            buffer,
        });
        inner.state = PcmState::Prepared;
        inner.appl = 0;
        inner.avail = buffer;
        self.hw.hw_commits.fetch_add(1, Ordering::SeqCst);
        self.hw.log("hw_params");
        Ok(())
    }

    fn state(&self) -> PcmState {
        if let Some(state) = *self.hw.forced_state.lock().unwrap() {
            return state;
        }
        self.inner.borrow().state
    }

    fn prepare(&mut self) -> HwResult<()> {
        self.hw.log("prepare");
        if self.hw.fail_prepare.load(Ordering::SeqCst) {
            return Err(HwError::new("prepare", -libc::EIO));
        }
        let inner = self.inner.get_mut();
        let Some(config) = inner.config else {
            return Err(HwError::new("prepare", -EBADFD));
        };
        inner.state = PcmState::Prepared;
        inner.appl = 0;
        inner.avail = config.buffer;
        Ok(())
    }

    fn start(&mut self) -> HwResult<()> {
        self.hw.log("start");
        let inner = self.inner.get_mut();
        if inner.state != PcmState::Prepared {
            return Err(HwError::new("start", -EBADFD));
        }
        inner.state = PcmState::Running;
        Ok(())
    }

    fn resume(&mut self) -> HwResult<()> {
        self.hw.log("resume");
        let code = self.hw.resume_results.lock().unwrap().pop_front().unwrap_or(0);
        if code < 0 {
            return Err(HwError::new("resume", code));
        }
        self.inner.get_mut().state = PcmState::Running;
        Ok(())
    }

    fn avail_update(&mut self) -> HwResult<usize> {
        let injected = self.hw.avail_errors.lock().unwrap().pop_front();
        let inner = self.inner.get_mut();
        if let Some(code) = injected {
            if code == -libc::EPIPE {
                inner.state = PcmState::XRun;
            } else if code == -ESTRPIPE {
                inner.state = PcmState::Suspended;
            }
            return Err(HwError::new("avail_update", code));
        }
        let Some(config) = inner.config else {
            return Err(HwError::new("avail_update", -EBADFD));
        };
        if inner.state == PcmState::Running {
            let consumed = self.hw.pending.swap(0, Ordering::SeqCst);
            inner.avail = (inner.avail + consumed).min(config.buffer);
        }
        Ok(inner.avail)
    }

    fn mmap_begin(
        &mut self,
        frames: usize,
        areas: &mut Vec<ChannelArea>,
    ) -> HwResult<(usize, usize)> {
        let inner = self.inner.get_mut();
        let Some(config) = inner.config else {
            return Err(HwError::new("mmap_begin", -EBADFD));
        };
        let offset = inner.appl % config.buffer;
        let granted = frames.min(inner.avail).min(config.buffer - offset);

        let bits = config.format.bits() as u32;
        let base = inner.ring.as_mut_ptr().cast::<u8>();
        areas.clear();
        for ch in 0..config.channels {
            areas.push(match config.access {
                AccessMode::MmapInterleaved => ChannelArea {
                    addr: base,
                    first: ch as u32 * bits,
                    step: config.channels as u32 * bits,
                },
                AccessMode::MmapPlanar => ChannelArea {
                    addr: unsafe { base.add(ch * config.buffer * config.format.bytes()) },
                    first: 0,
                    step: bits,
                },
            });
        }
        self.hw.grants.lock().unwrap().push(granted);
        Ok((offset, granted))
    }

    fn mmap_commit(&mut self, _offset: usize, frames: usize) -> HwResult<usize> {
        if self.spec.short_commit && frames > 0 {
            return Ok(frames - 1);
        }
        let inner = self.inner.get_mut();
        inner.appl += frames;
        inner.avail -= frames.min(inner.avail);
        self.hw.commits.lock().unwrap().push(frames);
        Ok(frames)
    }

    fn poll_descriptors(&self) -> HwResult<Vec<libc::pollfd>> {
        Ok(vec![libc::pollfd {
            fd: self.hw.wake_rx.as_raw_fd(),
            events: libc::POLLIN,
            revents: 0,
        }])
    }

    fn poll_revents(&self, fds: &mut [libc::pollfd]) -> HwResult<libc::c_short> {
        if fds.iter().all(|fd| fd.revents & libc::POLLIN == 0) {
            return Ok(0);
        }
        let mut buf = [0_u8; 64];
        loop {
            match (&self.hw.wake_rx).read(&mut buf) {
                Ok(0) => break,
                Ok(_) => continue,
                Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(e) => return Err(HwError::new("poll_revents", -e.raw_os_error().unwrap_or(libc::EIO))),
            }
        }
        Ok(libc::POLLOUT)
    }

    fn set_channel_map(&mut self, _positions: &[ChannelPosition]) -> HwResult<()> {
        if self.spec.fail_chmap {
            return Err(einval("set_chmap"));
        }
        self.hw.log("chmap");
        Ok(())
    }
}

pub fn options(buffer_frames: usize) -> StreamOptions {
    StreamOptions {
        buffer_frames,
        join_timeout: Duration::from_secs(2),
        resume_interval: Duration::from_millis(1),
        ..StreamOptions::default()
    }
}

/// A playback device on the default fake card.
pub fn fake_device(spec: FakeSpec, options: StreamOptions) -> (Device<FakeBackend>, Arc<FakeHw>) {
    let backend = FakeBackend::new(spec);
    let hw = backend.hw();
    let device = Device::new(
        Arc::new(backend),
        DeviceId::new(0, 0),
        "Fake Card, Fake PCM".to_string(),
        Direction::Playback,
        options,
    );
    (device, hw)
}
