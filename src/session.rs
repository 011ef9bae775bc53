//! Control-side session state and the immutable snapshots handed to the
//! audio-producing threads.

use tracing::warn;

use crate::automation::VolumeAutomationCurve;
use crate::command::Command;
use crate::error::{EngineError, ValidationError};
use crate::models::{
    clamp_field, ChannelState, Keyframe, ABSOLUTE_MAX_FREQUENCY, DEFAULT_CHANNEL_COUNT,
    DEFAULT_MAX_FREQUENCY, DEFAULT_RECORDING_DURATION, MAX_CHANNELS, MIN_FREQUENCY,
};

/// Shortest recording accepted, in seconds.
pub const MIN_RECORDING_DURATION: f64 = 0.01;
/// Longest recording accepted, in seconds (24 h).
pub const MAX_RECORDING_DURATION: f64 = 86_400.0;

/// Everything a render pass needs, frozen at publish time.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MixSnapshot {
    /// Audible slots only (the first `channel_count`).
    pub channels: Vec<ChannelState>,
    pub automation: VolumeAutomationCurve,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    channels: [ChannelState; MAX_CHANNELS],
    channel_count: usize,
    max_frequency: f64,
    recording_duration: f64,
    automation: VolumeAutomationCurve,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    pub fn new() -> Self {
        Self {
            channels: std::array::from_fn(ChannelState::new),
            channel_count: DEFAULT_CHANNEL_COUNT,
            max_frequency: DEFAULT_MAX_FREQUENCY,
            recording_duration: DEFAULT_RECORDING_DURATION,
            automation: VolumeAutomationCurve::new(),
        }
    }

    pub fn channels(&self) -> &[ChannelState] {
        &self.channels
    }

    pub fn audible_channels(&self) -> &[ChannelState] {
        &self.channels[..self.channel_count]
    }

    pub fn channel(&self, id: usize) -> Option<&ChannelState> {
        self.channels.get(id)
    }

    pub fn channel_count(&self) -> usize {
        self.channel_count
    }

    pub fn max_frequency(&self) -> f64 {
        self.max_frequency
    }

    pub fn recording_duration(&self) -> f64 {
        self.recording_duration
    }

    pub fn automation(&self) -> &VolumeAutomationCurve {
        &self.automation
    }

    pub fn snapshot(&self) -> MixSnapshot {
        MixSnapshot {
            channels: self.audible_channels().to_vec(),
            automation: self.automation.clone(),
        }
    }

    /// Apply one control command.
    ///
    /// Out-of-range values are clamped and the command still takes effect;
    /// every adjustment is returned so the caller can surface it. Only
    /// references to slots or keyframes that do not exist are refused.
    pub fn apply(&mut self, command: Command) -> Result<Vec<ValidationError>, EngineError> {
        let mut issues = Vec::new();
        match command {
            Command::SetActive { channel, active } => {
                self.channel_mut(channel)?.active = active;
            }
            Command::SetFrequency { channel, hz } => {
                let max = self.max_frequency;
                issues.extend(self.channel_mut(channel)?.set_frequency(hz, max));
            }
            Command::SetAmplitude { channel, amplitude } => {
                issues.extend(self.channel_mut(channel)?.set_amplitude(amplitude));
            }
            Command::SetIsochronicEnabled { channel, enabled } => {
                self.channel_mut(channel)?.isochronic_enabled = enabled;
            }
            Command::SetIsochronicFrequency { channel, hz } => {
                issues.extend(self.channel_mut(channel)?.set_isochronic_frequency(hz));
            }
            Command::SetPosition {
                channel,
                axis,
                value,
            } => {
                issues.extend(self.channel_mut(channel)?.set_axis(axis, value));
            }
            Command::SetChannelCount(count) => issues.extend(self.set_channel_count(count)),
            Command::SetMaxFrequency(hz) => issues.extend(self.set_max_frequency(hz)),
            Command::SetRecordingDuration(secs) => {
                issues.extend(self.set_recording_duration(secs))
            }
            Command::AddKeyframe(kf) => {
                let (kf, mut found) = self.validate_keyframe(kf);
                self.automation.insert(kf);
                issues.append(&mut found);
            }
            Command::RemoveKeyframe(index) => {
                self.automation
                    .remove(index)
                    .ok_or(EngineError::UnknownKeyframe(index))?;
            }
            Command::MoveKeyframe { index, to } => {
                if index >= self.automation.len() {
                    return Err(EngineError::UnknownKeyframe(index));
                }
                let (kf, mut found) = self.validate_keyframe(to);
                self.automation.move_keyframe(index, kf);
                issues.append(&mut found);
            }
            Command::ClearKeyframes => self.automation.clear(),
            Command::Reset => self.reset(),
        }
        for issue in &issues {
            warn!("{issue}");
        }
        Ok(issues)
    }

    pub fn reset(&mut self) {
        for ch in &mut self.channels {
            ch.reset();
        }
        self.automation.clear();
    }

    fn channel_mut(&mut self, id: usize) -> Result<&mut ChannelState, EngineError> {
        self.channels
            .get_mut(id)
            .ok_or(EngineError::UnknownChannel(id))
    }

    pub(crate) fn set_channel_count(&mut self, count: usize) -> Option<ValidationError> {
        let (applied, issue) =
            clamp_field("displayed_channels", count as f64, 1.0, MAX_CHANNELS as f64);
        let applied = applied as usize;
        if applied < self.channel_count {
            for ch in &mut self.channels[applied..] {
                ch.reset();
            }
        }
        self.channel_count = applied;
        issue
    }

    pub(crate) fn set_max_frequency(&mut self, hz: f64) -> Vec<ValidationError> {
        let (applied, issue) =
            clamp_field("max_frequency", hz, MIN_FREQUENCY, ABSOLUTE_MAX_FREQUENCY);
        self.max_frequency = applied;
        let mut issues: Vec<ValidationError> = issue.into_iter().collect();
        for ch in &mut self.channels {
            let current = ch.frequency;
            issues.extend(ch.set_frequency(current, applied));
        }
        issues
    }

    pub(crate) fn set_recording_duration(&mut self, secs: f64) -> Vec<ValidationError> {
        let (applied, issue) = clamp_field(
            "recording_duration",
            secs,
            MIN_RECORDING_DURATION,
            MAX_RECORDING_DURATION,
        );
        self.recording_duration = applied;
        let mut issues: Vec<ValidationError> = issue.into_iter().collect();

        if self
            .automation
            .keyframes()
            .iter()
            .any(|kf| kf.time > applied)
        {
            let mut clamped = Vec::with_capacity(self.automation.len());
            for (i, kf) in self.automation.keyframes().iter().enumerate() {
                let (time, issue) =
                    clamp_field(&format!("volume_keyframes[{i}].time"), kf.time, 0.0, applied);
                issues.extend(issue);
                clamped.push(Keyframe::new(time, kf.level));
            }
            self.automation = VolumeAutomationCurve::from_keyframes(clamped);
        }
        issues
    }

    pub(crate) fn validate_keyframe(&self, kf: Keyframe) -> (Keyframe, Vec<ValidationError>) {
        let (time, t_issue) = clamp_field("keyframe.time", kf.time, 0.0, self.recording_duration);
        let (level, l_issue) = clamp_field("keyframe.level", kf.level, 0.0, 1.0);
        let issues = t_issue.into_iter().chain(l_issue).collect();
        (Keyframe::new(time, level), issues)
    }

    /// Replace a slot wholesale (used by the config loader).
    pub(crate) fn replace_channel(&mut self, channel: ChannelState) {
        if let Some(slot) = self.channels.get_mut(channel.id()) {
            *slot = channel;
        }
    }

    pub(crate) fn replace_automation(&mut self, automation: VolumeAutomationCurve) {
        self.automation = automation;
    }
}
