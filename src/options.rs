use crate::config;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamOptions {
    pub channels: usize,
    /// Requested ring buffer size; the hardware may round it.
    pub buffer_frames: usize,
    /// Upper bound on how long `stop` waits for the worker to exit.
    pub join_timeout: Duration,
    pub resume_attempts: usize,
    pub resume_interval: Duration,
    pub realtime: bool,
    pub rt_priority: i32,
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self {
            channels: 2,
            buffer_frames: 1024,
            join_timeout: Duration::from_secs(2),
            resume_attempts: 100,
            resume_interval: Duration::from_millis(10),
            realtime: false,
            rt_priority: 18,
        }
    }
}

impl StreamOptions {
    /// Defaults overridden by `MAOLAN_DEVICE_*` environment variables.
    pub fn from_env() -> Self {
        Self::default().overlay(|key| std::env::var(key).ok())
    }

    fn overlay(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let number = |key: &str| lookup(key).and_then(|v| config::parse_usize(&v));
        if let Some(frames) = number(config::BUFFER_FRAMES_ENV) {
            self.buffer_frames = frames.max(1);
        }
        if let Some(channels) = number(config::CHANNELS_ENV) {
            self.channels = channels.max(1);
        }
        if lookup(config::REALTIME_ENV).is_some_and(|v| config::parse_flag(&v)) {
            self.realtime = true;
        }
        self
    }
}
