use crate::models::{Axis, Keyframe};

/// Discrete edits issued by a control surface (UI, CLI, scripting).
///
/// Each command is applied atomically by [`crate::session::Session::apply`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    SetActive { channel: usize, active: bool },
    SetFrequency { channel: usize, hz: f64 },
    SetAmplitude { channel: usize, amplitude: f64 },
    SetIsochronicEnabled { channel: usize, enabled: bool },
    SetIsochronicFrequency { channel: usize, hz: f64 },
    SetPosition { channel: usize, axis: Axis, value: f64 },
    SetChannelCount(usize),
    SetMaxFrequency(f64),
    SetRecordingDuration(f64),
    AddKeyframe(Keyframe),
    RemoveKeyframe(usize),
    MoveKeyframe { index: usize, to: Keyframe },
    ClearKeyframes,
    /// Restore every channel to defaults and clear the automation curve.
    Reset,
}
