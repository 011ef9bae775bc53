
use crate::error::ValidationError;

pub const MAX_CHANNELS: usize = 12;
pub const DEFAULT_CHANNEL_COUNT: usize = 10;

pub const MIN_FREQUENCY: f64 = 20.0;
pub const ABSOLUTE_MAX_FREQUENCY: f64 = 20_000.0;
pub const DEFAULT_MAX_FREQUENCY: f64 = 5000.0;
pub const DEFAULT_FREQUENCY: f64 = 100.0;

pub const DEFAULT_AMPLITUDE: f64 = 0.5;

pub const MAX_ISO_FREQUENCY: f64 = 50.0;

pub const MIN_POSITION: f64 = -1.0;
pub const MAX_POSITION: f64 = 1.0;

pub const DEFAULT_RECORDING_DURATION: f64 = 60.0;

/// Clamp `value` into `[lo, hi]`, describing the adjustment when one was made.
///
/// NaN is treated as out of range and replaced by `lo`.
pub fn clamp_field(field: &str, value: f64, lo: f64, hi: f64) -> (f64, Option<ValidationError>) {
    let applied = if value.is_nan() { lo } else { value.clamp(lo, hi) };
    if applied == value {
        (applied, None)
    } else {
        let issue = ValidationError {
            field: field.to_string(),
            requested: value,
            applied,
        };
        (applied, Some(issue))
    }
}

/// Location of a source relative to a listener at the origin.
/// x = left/right, y = front/back, z = up/down.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Position {
    pub const ORIGIN: Position = Position { x: 0.0, y: 0.0, z: 0.0 };

    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Axis {
    X,
    Y,
    Z,
}

/// Parameters of one sound source.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChannelState {
    id: usize,
    pub active: bool,
    pub frequency: f64,
    pub amplitude: f64,
    pub isochronic_enabled: bool,
    pub isochronic_frequency: f64,
    pub position: Position,
}

impl ChannelState {
    pub fn new(id: usize) -> Self {
        Self {
            id,
            active: true,
            frequency: DEFAULT_FREQUENCY,
            amplitude: DEFAULT_AMPLITUDE,
            isochronic_enabled: false,
            isochronic_frequency: 0.0,
            position: Position::ORIGIN,
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    /// Restore defaults, keeping the id.
    pub fn reset(&mut self) {
        *self = Self::new(self.id);
    }

    /// Pulse rate the modulator should use, 0 meaning "no gating".
    pub fn effective_isochronic_frequency(&self) -> f64 {
        if self.isochronic_enabled {
            self.isochronic_frequency
        } else {
            0.0
        }
    }

    pub fn set_frequency(&mut self, hz: f64, max_frequency: f64) -> Option<ValidationError> {
        let (v, issue) = clamp_field(
            &format!("channels[{}].frequency", self.id),
            hz,
            MIN_FREQUENCY,
            max_frequency,
        );
        self.frequency = v;
        issue
    }

    pub fn set_amplitude(&mut self, amplitude: f64) -> Option<ValidationError> {
        let (v, issue) = clamp_field(
            &format!("channels[{}].amplitude", self.id),
            amplitude,
            0.0,
            1.0,
        );
        self.amplitude = v;
        issue
    }

    pub fn set_isochronic_frequency(&mut self, hz: f64) -> Option<ValidationError> {
        let (v, issue) = clamp_field(
            &format!("channels[{}].isochronic_frequency", self.id),
            hz,
            0.0,
            MAX_ISO_FREQUENCY,
        );
        self.isochronic_frequency = v;
        issue
    }

    pub fn set_axis(&mut self, axis: Axis, value: f64) -> Option<ValidationError> {
        let name = match axis {
            Axis::X => "x_pos",
            Axis::Y => "y_pos",
            Axis::Z => "z_pos",
        };
        let (v, issue) = clamp_field(
            &format!("channels[{}].{}", self.id, name),
            value,
            MIN_POSITION,
            MAX_POSITION,
        );
        match axis {
            Axis::X => self.position.x = v,
            Axis::Y => self.position.y = v,
            Axis::Z => self.position.z = v,
        }
        issue
    }
}

/// A single automation control point: `level` in [0, 1] at `time` seconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Keyframe {
    pub time: f64,
    pub level: f64,
}

impl Keyframe {
    pub fn new(time: f64, level: f64) -> Self {
        Self { time, level }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_original_application() {
        let ch = ChannelState::new(3);
        assert_eq!(ch.id(), 3);
        assert!(ch.active);
        assert_eq!(ch.frequency, 100.0);
        assert_eq!(ch.amplitude, 0.5);
        assert!(!ch.isochronic_enabled);
        assert_eq!(ch.position, Position::ORIGIN);
    }

    #[test]
    fn frequency_is_clamped_to_max() {
        let mut ch = ChannelState::new(0);
        let issue = ch.set_frequency(9000.0, 5000.0).expect("should report clamp");
        assert_eq!(ch.frequency, 5000.0);
        assert_eq!(issue.requested, 9000.0);
        assert_eq!(issue.applied, 5000.0);
        assert!(ch.set_frequency(440.0, 5000.0).is_none());
        assert_eq!(ch.frequency, 440.0);
    }

    #[test]
    fn nan_is_rejected_to_lower_bound() {
        let mut ch = ChannelState::new(0);
        assert!(ch.set_amplitude(f64::NAN).is_some());
        assert_eq!(ch.amplitude, 0.0);
    }

    #[test]
    fn isochronic_disabled_reports_zero_rate() {
        let mut ch = ChannelState::new(0);
        ch.set_isochronic_frequency(10.0);
        assert_eq!(ch.effective_isochronic_frequency(), 0.0);
        ch.isochronic_enabled = true;
        assert_eq!(ch.effective_isochronic_frequency(), 10.0);
    }

    #[test]
    fn reset_keeps_id() {
        let mut ch = ChannelState::new(7);
        ch.set_axis(Axis::X, -0.4);
        ch.active = false;
        ch.reset();
        assert_eq!(ch, ChannelState::new(7));
    }
}
