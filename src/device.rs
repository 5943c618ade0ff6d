use crate::bridge::BufferView;
use crate::error::DeviceError;
use crate::format::{Direction, Sample};
use crate::hw::{AudioBackend, DeviceId};
use crate::negotiate::{StreamConfig, StreamRequest, negotiate};
use crate::options::StreamOptions;
use crate::probe::{CapabilitySet, probe};
use crate::rt::promote_to_fifo;
use crate::stream::{
    Callback, RunningGuard, StreamExit, StreamInfo, StreamShared, StreamStatus, StreamWorker,
};
use crate::wait::{CancelHandle, Waiter, cancel_pair};
use std::sync::Arc;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread::JoinHandle;
use tracing::{debug, error, info, warn};

struct WorkerThread {
    thread: JoinHandle<Option<Callback>>,
    done: mpsc::Receiver<()>,
    cancel: CancelHandle,
}

/// One hardware endpoint. Owns the stream thread while running.
pub struct Device<B: AudioBackend> {
    backend: Arc<B>,
    id: DeviceId,
    name: String,
    direction: Direction,
    options: StreamOptions,
    caps: CapabilitySet,
    config: Option<StreamConfig>,
    buffer_frames: usize,
    callback: Option<Callback>,
    shared: Arc<StreamShared>,
    worker: Option<WorkerThread>,
}

impl<B: AudioBackend> std::fmt::Debug for Device<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Device")
            .field("backend", &B::LABEL)
            .field("id", &self.id)
            .field("name", &self.name)
            .field("direction", &self.direction)
            .field("config", &self.config)
            .field("running", &self.is_running())
            .finish()
    }
}

impl<B: AudioBackend> Device<B> {
    /// Opens the endpoint once to probe and negotiate, then releases it. The
    /// stream reopens it on `start`. An endpoint that cannot be opened now
    /// (busy, removed) keeps an empty capability set and no configuration.
    pub fn new(
        backend: Arc<B>,
        id: DeviceId,
        name: String,
        direction: Direction,
        options: StreamOptions,
    ) -> Self {
        let (caps, config) = match backend.open(id, direction) {
            Ok(mut handle) => {
                let request = StreamRequest {
                    direction,
                    channels: options.channels,
                    buffer_frames: options.buffer_frames,
                    sample_rate: None,
                    sample_format: None,
                };
                let caps = probe(&handle);
                let config = match negotiate(&mut handle, &caps, &request) {
                    Ok(config) => Some(config),
                    Err(e) => {
                        warn!("{} '{}' ({}): {}", B::LABEL, name, id, e);
                        None
                    }
                };
                (caps, config)
            }
            Err(e) => {
                debug!("{} '{}' ({}): not queryable: {}", B::LABEL, name, id, e);
                (CapabilitySet::default(), None)
            }
        };

        let buffer_frames = config
            .as_ref()
            .map_or(options.buffer_frames, |c| c.buffer_frames);
        Self {
            backend,
            id,
            name,
            direction,
            options,
            caps,
            config,
            buffer_frames,
            callback: None,
            shared: Arc::new(StreamShared::default()),
            worker: None,
        }
    }

    pub fn id(&self) -> DeviceId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn is_input(&self) -> bool {
        self.direction == Direction::Capture
    }

    pub fn is_output(&self) -> bool {
        self.direction == Direction::Playback
    }

    pub fn capabilities(&self) -> &CapabilitySet {
        &self.caps
    }

    pub fn config(&self) -> Option<&StreamConfig> {
        self.config.as_ref()
    }

    pub fn input_channels(&self) -> usize {
        self.config.as_ref().map_or(0, |c| c.input_channels)
    }

    pub fn output_channels(&self) -> usize {
        self.config.as_ref().map_or(0, |c| c.output_channels)
    }

    pub fn sample_rate(&self) -> Option<u32> {
        self.config.as_ref().map(|c| c.sample_rate)
    }

    pub fn supports_sample_type<S: Sample>(&self) -> bool {
        self.config
            .as_ref()
            .is_some_and(|c| S::accepts(c.sample_format))
    }

    pub fn buffer_size_frames(&self) -> usize {
        self.buffer_frames
    }

    /// Takes effect on the next `start`; the hardware may round it then.
    pub fn set_buffer_size_frames(&mut self, frames: usize) -> Result<(), DeviceError> {
        if self.is_running() {
            return Err(DeviceError::Running);
        }
        if !self.caps.buffer_size_in_range(frames) {
            return Err(DeviceError::BufferSizeOutOfRange {
                requested: frames,
                min: self.caps.min_buffer_frames,
                max: self.caps.max_buffer_frames,
            });
        }
        self.buffer_frames = frames;
        if let Some(config) = self.config.as_mut() {
            config.buffer_frames = frames;
        }
        Ok(())
    }

    /// Renegotiates against a fresh handle with explicit choices.
    pub fn configure(&mut self, request: StreamRequest) -> Result<&StreamConfig, DeviceError> {
        if self.is_running() {
            return Err(DeviceError::Running);
        }
        if request.direction != self.direction {
            return Err(DeviceError::DirectionMismatch {
                device: self.direction,
                requested: request.direction,
            });
        }
        let mut handle = self
            .backend
            .open(self.id, self.direction)
            .map_err(|source| DeviceError::Open {
                device: self.id.hw_name(),
                source,
            })?;
        if self.caps.is_empty() {
            self.caps = probe(&handle);
        }
        let config = negotiate(&mut handle, &self.caps, &request)?;
        self.buffer_frames = config.buffer_frames;
        Ok(self.config.insert(config))
    }

    pub fn connect<F>(&mut self, callback: F) -> Result<(), DeviceError>
    where
        F: FnMut(&StreamInfo, &mut BufferView<'_>) + Send + 'static,
    {
        if self.is_running() {
            return Err(DeviceError::ConnectWhileRunning);
        }
        self.reap();
        self.callback = Some(Box::new(callback));
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.shared.is_running()
    }

    pub fn status(&self) -> StreamStatus {
        self.shared.status()
    }

    pub fn xrun_count(&self) -> u64 {
        self.shared.xrun_count()
    }

    pub fn frames_committed(&self) -> u64 {
        self.shared.frames_committed()
    }

    pub fn start(&mut self) -> Result<(), DeviceError> {
        self.start_with(|_| {}, |_, _| {})
    }

    /// `on_start` runs on the calling thread once the stream is armed;
    /// `on_stop` runs on the stream thread as it exits, for any reason.
    pub fn start_with<S, E>(&mut self, on_start: S, on_stop: E) -> Result<(), DeviceError>
    where
        S: FnOnce(&StreamInfo),
        E: FnOnce(&StreamInfo, &StreamExit) + Send + 'static,
    {
        if self.worker.is_some() && self.is_running() {
            return Ok(());
        }
        self.reap();

        let mut handle = self
            .backend
            .open(self.id, self.direction)
            .map_err(|source| DeviceError::Open {
                device: self.id.hw_name(),
                source,
            })?;
        let request = match self.config.as_ref() {
            Some(config) => StreamRequest::from_config(config),
            None => StreamRequest {
                direction: self.direction,
                channels: self.options.channels,
                buffer_frames: self.buffer_frames,
                sample_rate: None,
                sample_format: None,
            },
        };
        if self.caps.is_empty() {
            self.caps = probe(&handle);
        }
        let config = negotiate(&mut handle, &self.caps, &request)?;
        self.buffer_frames = config.buffer_frames;
        self.config = Some(config.clone());

        let (cancel, receiver) = cancel_pair().map_err(|e| DeviceError::Wait(e.to_string()))?;
        let waiter = Waiter::new(&handle, receiver)?;
        let info = Arc::new(StreamInfo {
            id: self.id,
            name: self.name.clone(),
            config,
        });

        self.shared.arm();
        on_start(info.as_ref());

        let mut worker = StreamWorker::new(
            handle,
            waiter,
            self.callback.take(),
            info,
            self.shared.clone(),
            self.options,
        );
        let shared = self.shared.clone();
        let options = self.options;
        let (done_tx, done) = mpsc::channel();
        let spawned = std::thread::Builder::new()
            .name(B::WORKER_THREAD_NAME.to_string())
            .spawn(move || {
                let _running = RunningGuard(shared.clone());
                if options.realtime
                    && let Err(e) = promote_to_fifo(options.rt_priority)
                {
                    error!(
                        "{} stream thread: SCHED_FIFO priority {}: {}",
                        B::LABEL,
                        options.rt_priority,
                        e
                    );
                }
                let exit = worker.run();
                let info = worker.info().clone();
                match &exit {
                    StreamExit::Stopped => info!("{} '{}' stopped", B::LABEL, info.name),
                    StreamExit::Failed(e) => error!("{} '{}' lost: {}", B::LABEL, info.name, e),
                }
                let callback = worker.finish();
                shared.set_status(match &exit {
                    StreamExit::Stopped => StreamStatus::Stopped,
                    StreamExit::Failed(e) => StreamStatus::Failed(e.clone()),
                });
                on_stop(info.as_ref(), &exit);
                let _ = done_tx.send(());
                callback
            });
        match spawned {
            Ok(thread) => {
                self.worker = Some(WorkerThread {
                    thread,
                    done,
                    cancel,
                });
                Ok(())
            }
            Err(e) => {
                let err = DeviceError::Thread(e.to_string());
                self.shared.abort(err.clone());
                Err(err)
            }
        }
    }

    /// Signals the stream thread and waits up to the join timeout for it to
    /// leave. On timeout the thread is kept so `stop` can be retried.
    pub fn stop(&mut self) -> Result<(), DeviceError> {
        let Some(worker) = self.worker.take() else {
            return Ok(());
        };
        self.shared.request_stop();
        if let Err(e) = worker.cancel.cancel() {
            warn!("{} '{}': cancel signal failed: {}", B::LABEL, self.name, e);
        }
        match worker.done.recv_timeout(self.options.join_timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {}
            Err(RecvTimeoutError::Timeout) => {
                error!(
                    "{} '{}': stream thread still busy after {:?}",
                    B::LABEL,
                    self.name,
                    self.options.join_timeout
                );
                self.worker = Some(worker);
                return Err(DeviceError::StopTimeout(self.options.join_timeout));
            }
        }
        match worker.thread.join() {
            Ok(callback) => {
                self.callback = callback;
                Ok(())
            }
            Err(_) => Err(DeviceError::Thread("stream thread panicked".to_string())),
        }
    }

    /// Joins a stream thread that already exited on its own.
    fn reap(&mut self) {
        if self.worker.is_some()
            && !self.is_running()
            && let Err(e) = self.stop()
        {
            warn!("{} '{}': {}", B::LABEL, self.name, e);
        }
    }
}

impl<B: AudioBackend> Drop for Device<B> {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            error!("{} '{}': {}", B::LABEL, self.name, e);
        }
    }
}
