pub mod state;

use crate::bridge::{BufferBridge, BufferView};
use crate::error::{DeviceError, HwError, HwErrorKind};
use crate::hw::{DeviceId, PcmHandle};
use crate::negotiate::StreamConfig;
use crate::options::StreamOptions;
use crate::wait::{WaitOutcome, Waiter};
use state::{Action, XrunKind, next_action};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

/// Fill callback. Runs on the stream thread; must not block.
pub type Callback = Box<dyn FnMut(&StreamInfo, &mut BufferView<'_>) + Send + 'static>;

/// What the callbacks get to see of the device they run for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamInfo {
    pub id: DeviceId,
    pub name: String,
    pub config: StreamConfig,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamExit {
    Stopped,
    Failed(DeviceError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamStatus {
    Idle,
    Running,
    Stopped,
    Failed(DeviceError),
}

#[derive(Debug)]
pub(crate) struct StreamShared {
    stop: AtomicBool,
    running: AtomicBool,
    xruns: AtomicU64,
    frames: AtomicU64,
    status: Mutex<StreamStatus>,
}

impl Default for StreamShared {
    fn default() -> Self {
        Self {
            stop: AtomicBool::new(false),
            running: AtomicBool::new(false),
            xruns: AtomicU64::new(0),
            frames: AtomicU64::new(0),
            status: Mutex::new(StreamStatus::Idle),
        }
    }
}

impl StreamShared {
    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::Release);
    }

    pub fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn xrun_count(&self) -> u64 {
        self.xruns.load(Ordering::Relaxed)
    }

    pub fn frames_committed(&self) -> u64 {
        self.frames.load(Ordering::Relaxed)
    }

    pub fn status(&self) -> StreamStatus {
        match self.status.lock() {
            Ok(status) => status.clone(),
            Err(_) => StreamStatus::Failed(DeviceError::Thread("status lock poisoned".to_string())),
        }
    }

    pub fn set_status(&self, status: StreamStatus) {
        if let Ok(mut current) = self.status.lock() {
            *current = status;
        }
    }

    /// Marks a run that never got its thread.
    pub fn abort(&self, error: DeviceError) {
        self.set_status(StreamStatus::Failed(error));
        self.running.store(false, Ordering::Release);
    }

    /// Resets the counters and flags for a fresh run.
    pub fn arm(&self) {
        self.stop.store(false, Ordering::Release);
        self.xruns.store(0, Ordering::Relaxed);
        self.frames.store(0, Ordering::Relaxed);
        self.running.store(true, Ordering::Release);
        self.set_status(StreamStatus::Running);
    }
}

/// Clears the running flag when the stream thread ends, panics included.
pub(crate) struct RunningGuard(pub(crate) Arc<StreamShared>);

impl Drop for RunningGuard {
    fn drop(&mut self) {
        if self.0.status() == StreamStatus::Running {
            self.0.set_status(StreamStatus::Failed(DeviceError::Thread(
                "stream thread panicked".to_string(),
            )));
        }
        self.0.running.store(false, Ordering::Release);
    }
}

/// The hardware-driven playback loop. Owns the handle for the lifetime of the
/// stream thread.
pub(crate) struct StreamWorker<H: PcmHandle> {
    handle: H,
    waiter: Waiter,
    bridge: BufferBridge,
    callback: Option<Callback>,
    info: Arc<StreamInfo>,
    shared: Arc<StreamShared>,
    options: StreamOptions,
}

impl<H: PcmHandle> StreamWorker<H> {
    pub fn new(
        handle: H,
        waiter: Waiter,
        callback: Option<Callback>,
        info: Arc<StreamInfo>,
        shared: Arc<StreamShared>,
        options: StreamOptions,
    ) -> Self {
        let bridge = BufferBridge::new(&info.config);
        Self {
            handle,
            waiter,
            bridge,
            callback,
            info,
            shared,
            options,
        }
    }

    pub fn info(&self) -> &Arc<StreamInfo> {
        &self.info
    }

    pub fn run(&mut self) -> StreamExit {
        loop {
            if self.shared.stop_requested() {
                return StreamExit::Stopped;
            }
            match self.step() {
                Ok(None) => {}
                Ok(Some(exit)) => return exit,
                Err(e) => return StreamExit::Failed(e),
            }
        }
    }

    /// Releases the hardware handle and hands the callback back.
    pub fn finish(self) -> Option<Callback> {
        let StreamWorker {
            handle, callback, ..
        } = self;
        drop(handle);
        callback
    }

    fn step(&mut self) -> Result<Option<StreamExit>, DeviceError> {
        let state = self.handle.state();
        match next_action(state) {
            Action::Prepare => {
                self.handle.prepare().map_err(DeviceError::Hardware)?;
            }
            Action::PrimeOrStart => match self.handle.avail_update() {
                Ok(avail) if avail == self.info.config.buffer_frames => self.fill(avail)?,
                Ok(_) => {
                    if let Err(e) = self.handle.start() {
                        self.recover_from(e)?;
                    }
                }
                Err(e) => self.recover_from(e)?,
            },
            Action::WaitAndFill => {
                if self.waiter.wait(&self.handle)? == WaitOutcome::Cancelled {
                    return Ok(Some(StreamExit::Stopped));
                }
                match self.handle.avail_update() {
                    Ok(0) => {}
                    Ok(avail) => self.fill(avail)?,
                    Err(e) => self.recover_from(e)?,
                }
            }
            Action::Recover(kind) => self.recover(kind)?,
            Action::Exit => {
                return Ok(Some(StreamExit::Failed(DeviceError::StreamLost(state))));
            }
        }
        Ok(None)
    }

    /// Produces exactly `avail` frames, in several begin/commit rounds when
    /// the region wraps.
    fn fill(&mut self, avail: usize) -> Result<(), DeviceError> {
        let mut remaining = avail;
        while remaining > 0 {
            let grant = match self.bridge.begin(&mut self.handle, remaining) {
                Ok(grant) => grant,
                Err(DeviceError::Hardware(e)) if e.is_xrun() => return self.recover_from(e),
                Err(e) => return Err(e),
            };
            if grant.frames == 0 {
                break;
            }
            {
                let mut view = self.bridge.view(&grant);
                match self.callback.as_mut() {
                    Some(callback) => callback(self.info.as_ref(), &mut view),
                    None => view.fill_silence(),
                }
            }
            match self.bridge.commit(&mut self.handle, grant) {
                Ok(committed) => {
                    self.shared
                        .frames
                        .fetch_add(committed as u64, Ordering::Relaxed);
                }
                Err(DeviceError::Hardware(e)) if e.is_xrun() => return self.recover_from(e),
                Err(e) => return Err(e),
            }
            remaining -= grant.frames;
        }
        Ok(())
    }

    fn recover_from(&mut self, err: HwError) -> Result<(), DeviceError> {
        match err.kind() {
            HwErrorKind::Underrun => self.recover(XrunKind::Underrun),
            HwErrorKind::Suspended => self.recover(XrunKind::Suspended),
            HwErrorKind::Disconnected => Err(DeviceError::Disconnected),
            HwErrorKind::Again | HwErrorKind::Other => Err(DeviceError::Hardware(err)),
        }
    }

    fn recover(&mut self, kind: XrunKind) -> Result<(), DeviceError> {
        let count = self.shared.xruns.fetch_add(1, Ordering::Relaxed) + 1;
        warn!("{} xrun #{} ({:?})", self.info.name, count, kind);
        if kind == XrunKind::Suspended {
            for _ in 0..self.options.resume_attempts {
                match self.handle.resume() {
                    Ok(()) => return Ok(()),
                    Err(e) if e.kind() == HwErrorKind::Again => {
                        std::thread::sleep(self.options.resume_interval);
                    }
                    Err(e) => {
                        debug!("resume refused, preparing instead: {}", e);
                        break;
                    }
                }
            }
        }
        self.handle.prepare().map_err(DeviceError::Recovery)
    }
}
