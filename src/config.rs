pub const BUFFER_FRAMES_ENV: &str = "MAOLAN_DEVICE_BUFFER_FRAMES";
pub const CHANNELS_ENV: &str = "MAOLAN_DEVICE_CHANNELS";
pub const REALTIME_ENV: &str = "MAOLAN_DEVICE_REALTIME";

pub(crate) fn parse_flag(value: &str) -> bool {
    let s = value.trim().to_ascii_lowercase();
    s == "1" || s == "true" || s == "yes" || s == "on"
}

pub(crate) fn parse_usize(value: &str) -> Option<usize> {
    value.trim().parse().ok()
}
