//! Per-sample signal primitives used by the mixer.
//!
//! Everything here is allocation-free and keeps its own running state so it
//! can be driven one sample at a time from inside an audio callback.

pub mod isochronic;
pub mod oscillator;
pub mod spatial;

pub use isochronic::IsochronicModulator;
pub use oscillator::Oscillator;
pub use spatial::{SpatialGains, SpatialPanner};

/// Convert a float sample in [-1, 1] to 16-bit PCM, clamping overs.
pub fn to_i16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16
}

/// Offset-binary 16-bit PCM; silence sits at 32768.
pub fn to_u16(sample: f32) -> u16 {
    (to_i16(sample) as i32 + 32_768) as u16
}
