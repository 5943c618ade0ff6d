//! Plays a 440 Hz sine on the default ALSA output for two seconds.

use maolan_device::{BufferView, SampleFormat, StreamInfo, alsa_enumerator, init_logging};
use std::f64::consts::TAU;
use std::time::Duration;
use tracing::{error, info};

const FREQUENCY: f64 = 440.0;
const AMPLITUDE: f64 = 0.2;

fn main() {
    init_logging("info");

    let enumerator = alsa_enumerator();
    for device in enumerator.list_output_devices() {
        info!("output: {} ({})", device.name(), device.id());
    }
    let Some(mut device) = enumerator.default_output_device() else {
        error!("no output device");
        return;
    };

    let mut phase = 0.0_f64;
    let connected = device.connect(move |info: &StreamInfo, view: &mut BufferView<'_>| {
        let step = FREQUENCY * TAU / info.config.sample_rate as f64;
        for frame in 0..view.frames() {
            let value = phase.sin() * AMPLITUDE;
            phase = (phase + step) % TAU;
            for channel in 0..view.channels() {
                match view.format() {
                    SampleFormat::F32 => view.write(channel, frame, value as f32),
                    SampleFormat::F64 => view.write(channel, frame, value),
                    SampleFormat::S16 => view.write(channel, frame, (value * i16::MAX as f64) as i16),
                    SampleFormat::S32 => view.write(channel, frame, (value * i32::MAX as f64) as i32),
                    SampleFormat::S24 => view.write(channel, frame, (value * 8_388_607.0) as i32),
                    SampleFormat::S8 => view.write(channel, frame, (value * i8::MAX as f64) as i8),
                };
            }
        }
    });
    if let Err(e) = connected {
        error!("{}", e);
        return;
    }

    let started = device.start_with(
        |info| info!("{} at {} Hz, {:?}", info.name, info.config.sample_rate, info.config),
        |info, exit| info!("{} finished: {:?}", info.name, exit),
    );
    if let Err(e) = started {
        error!("{}", e);
        return;
    }
    std::thread::sleep(Duration::from_secs(2));
    if let Err(e) = device.stop() {
        error!("{}", e);
    }
    info!("xruns: {}", device.xrun_count());
}
