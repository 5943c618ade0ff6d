#![cfg(all(target_os = "linux", feature = "alsa-backend"))]

//! Runs against the machine's real ALSA devices. Ignored by default because
//! headless CI has no sound card.

#[cfg(test)]
mod tests {
    use maolan_device::{DeviceEnumerator, AlsaBackend, StreamStatus};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[test]
    #[ignore = "requires ALSA hardware"]
    fn test_alsa_enumeration() {
        let enumerator = DeviceEnumerator::new(AlsaBackend::new());
        let outputs = enumerator.list_output_devices();
        assert!(!outputs.is_empty(), "no ALSA playback devices found");
        for device in &outputs {
            assert!(device.id().hw_name().starts_with("hw:"));
            assert!(device.name().contains(", "), "{}", device.name());
        }
    }

    #[test]
    #[ignore = "requires ALSA hardware"]
    fn test_alsa_silence_streams() {
        let enumerator = DeviceEnumerator::new(AlsaBackend::new());
        let mut device = enumerator
            .default_output_device()
            .expect("no default output device");
        let config = device.config().expect("negotiation failed").clone();
        assert!(device.capabilities().supports_rate(config.sample_rate));

        let fills = Arc::new(AtomicUsize::new(0));
        let counter = fills.clone();
        device
            .connect(move |_, view| {
                view.fill_silence();
                counter.fetch_add(view.frames(), Ordering::Relaxed);
            })
            .unwrap();
        device.start().unwrap();
        std::thread::sleep(Duration::from_millis(500));
        assert!(device.is_running(), "stream died: {:?}", device.status());
        device.stop().unwrap();

        assert_eq!(device.status(), StreamStatus::Stopped);
        assert!(fills.load(Ordering::Relaxed) >= config.buffer_frames);
    }
}
