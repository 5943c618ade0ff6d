use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Playback,
    Capture,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SampleFormat {
    F32,
    S16,
    /// 24 significant bits in a 32-bit native-endian container.
    S24,
    S32,
    F64,
    S8,
}

impl SampleFormat {
    /// Probe order and negotiation preference.
    pub const PREFERENCE: [SampleFormat; 6] = [
        SampleFormat::F32,
        SampleFormat::S16,
        SampleFormat::S24,
        SampleFormat::S32,
        SampleFormat::F64,
        SampleFormat::S8,
    ];

    pub fn bytes(self) -> usize {
        match self {
            SampleFormat::S8 => 1,
            SampleFormat::S16 => 2,
            SampleFormat::S24 | SampleFormat::S32 | SampleFormat::F32 => 4,
            SampleFormat::F64 => 8,
        }
    }

    pub fn bits(self) -> usize {
        self.bytes() * 8
    }
}

impl fmt::Display for SampleFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SampleFormat::F32 => "F32",
            SampleFormat::S16 => "S16",
            SampleFormat::S24 => "S24",
            SampleFormat::S32 => "S32",
            SampleFormat::F64 => "F64",
            SampleFormat::S8 => "S8",
        };
        f.write_str(name)
    }
}

/// Candidate rates, tested in this order. Lower rates win negotiation.
pub const CANDIDATE_RATES: [u32; 8] = [4000, 8000, 22050, 32000, 44100, 48000, 96000, 192000];

/// Mapped access layout of the hardware ring buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AccessMode {
    MmapInterleaved,
    MmapPlanar,
}

impl AccessMode {
    pub const PREFERENCE: [AccessMode; 2] = [AccessMode::MmapInterleaved, AccessMode::MmapPlanar];
}

/// Element type a [`crate::bridge::BufferView`] can be viewed as.
///
/// # Safety
/// Implementors must be plain old data where every bit pattern is valid.
pub unsafe trait Sample: Copy + Send + 'static {
    fn accepts(format: SampleFormat) -> bool;
}

unsafe impl Sample for i8 {
    fn accepts(format: SampleFormat) -> bool {
        format == SampleFormat::S8
    }
}

unsafe impl Sample for i16 {
    fn accepts(format: SampleFormat) -> bool {
        format == SampleFormat::S16
    }
}

unsafe impl Sample for i32 {
    fn accepts(format: SampleFormat) -> bool {
        matches!(format, SampleFormat::S24 | SampleFormat::S32)
    }
}

unsafe impl Sample for f32 {
    fn accepts(format: SampleFormat) -> bool {
        format == SampleFormat::F32
    }
}

unsafe impl Sample for f64 {
    fn accepts(format: SampleFormat) -> bool {
        format == SampleFormat::F64
    }
}
