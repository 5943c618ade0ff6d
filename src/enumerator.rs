use crate::device::Device;
use crate::format::Direction;
use crate::hw::{AudioBackend, DeviceId};
use crate::options::StreamOptions;
use std::sync::Arc;
use tracing::debug;

/// Lists hardware endpoints of one backend. Each call queries the hardware
/// again; nothing is cached between calls.
#[derive(Debug)]
pub struct DeviceEnumerator<B: AudioBackend> {
    backend: Arc<B>,
    options: StreamOptions,
}

impl<B: AudioBackend> Clone for DeviceEnumerator<B> {
    fn clone(&self) -> Self {
        Self {
            backend: self.backend.clone(),
            options: self.options,
        }
    }
}

impl<B: AudioBackend> DeviceEnumerator<B> {
    pub fn new(backend: B) -> Self {
        Self::with_options(backend, StreamOptions::default())
    }

    pub fn with_options(backend: B, options: StreamOptions) -> Self {
        Self {
            backend: Arc::new(backend),
            options,
        }
    }

    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    pub fn list_output_devices(&self) -> Vec<Device<B>> {
        self.list(Direction::Playback)
    }

    pub fn list_input_devices(&self) -> Vec<Device<B>> {
        self.list(Direction::Capture)
    }

    pub fn default_output_device(&self) -> Option<Device<B>> {
        self.default_device(Direction::Playback)
    }

    pub fn default_input_device(&self) -> Option<Device<B>> {
        self.default_device(Direction::Capture)
    }

    fn list(&self, direction: Direction) -> Vec<Device<B>> {
        self.backend
            .device_ids()
            .into_iter()
            .filter(|id| self.backend.supports_direction(*id, direction))
            .map(|id| self.open(id, direction))
            .collect()
    }

    fn default_device(&self, direction: Direction) -> Option<Device<B>> {
        let id = self.backend.default_device_id(direction).or_else(|| {
            debug!("{}: no default {:?} device, using the first one", B::LABEL, direction);
            self.backend
                .device_ids()
                .into_iter()
                .find(|id| self.backend.supports_direction(*id, direction))
        })?;
        Some(self.open(id, direction))
    }

    fn open(&self, id: DeviceId, direction: Direction) -> Device<B> {
        let name = self
            .backend
            .device_name(id)
            .unwrap_or_else(|| id.hw_name());
        Device::new(self.backend.clone(), id, name, direction, self.options)
    }
}
