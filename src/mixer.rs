//! Stereo summing mixer.
//!
//! A `Mixer` owns the running oscillator/modulator state for every channel
//! slot, so each consumer (live output, recording, preview) keeps its own
//! clock simply by owning its own mixer.

use crate::dsp::{IsochronicModulator, Oscillator, SpatialGains, SpatialPanner};
use crate::models::{ChannelState, MAX_CHANNELS};

/// Fixed rendering parameters shared by every channel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MixerSettings {
    pub sample_rate: f64,
    pub iso_ramp_seconds: f64,
    pub panner: SpatialPanner,
}

impl MixerSettings {
    pub fn new(sample_rate: f64) -> Self {
        Self {
            sample_rate,
            iso_ramp_seconds: 0.002,
            panner: SpatialPanner::default(),
        }
    }
}

/// Peak level of a rendered block and whether it went past full scale.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MixReport {
    pub peak: f32,
    pub clipped: bool,
}

impl MixReport {
    pub fn from_interleaved(buffer: &[f32]) -> Self {
        let peak = buffer.iter().fold(0.0f32, |acc, s| acc.max(s.abs()));
        Self {
            peak,
            clipped: peak > 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct VoiceState {
    osc: Oscillator,
    iso: IsochronicModulator,
}

#[derive(Debug, Clone)]
pub struct Mixer {
    settings: MixerSettings,
    voices: [VoiceState; MAX_CHANNELS],
}

impl Mixer {
    pub fn new(settings: MixerSettings) -> Self {
        Self {
            settings,
            voices: [VoiceState::default(); MAX_CHANNELS],
        }
    }

    pub fn settings(&self) -> &MixerSettings {
        &self.settings
    }

    /// Render `out.len() / 2` interleaved stereo frames from `channels`.
    ///
    /// Active channels are summed without normalization; the returned report
    /// flags any sample beyond full scale. Channels with an id outside the
    /// slot range are ignored.
    pub fn render(&mut self, channels: &[ChannelState], out: &mut [f32]) -> MixReport {
        let MixerSettings {
            sample_rate,
            iso_ramp_seconds,
            panner,
        } = self.settings;

        let mut gains = [SpatialGains {
            left: 0.0,
            right: 0.0,
            attenuation: 0.0,
        }; MAX_CHANNELS];
        for ch in channels.iter().filter(|c| c.id() < MAX_CHANNELS) {
            gains[ch.id()] = panner.gains(ch.position);
        }

        let mut peak = 0.0f32;
        for frame in out.chunks_exact_mut(2) {
            let mut left = 0.0f64;
            let mut right = 0.0f64;
            for ch in channels {
                if !ch.active || ch.id() >= MAX_CHANNELS {
                    continue;
                }
                let voice = &mut self.voices[ch.id()];
                let carrier = voice.osc.next_sample(ch.frequency, ch.amplitude, sample_rate);
                let env = voice.iso.next_gain(
                    ch.effective_isochronic_frequency(),
                    iso_ramp_seconds,
                    sample_rate,
                );
                let (l, r) = gains[ch.id()].apply(carrier * env);
                left += l;
                right += r;
            }
            frame[0] = left as f32;
            frame[1] = right as f32;
            peak = peak.max(frame[0].abs()).max(frame[1].abs());
        }

        MixReport {
            peak,
            clipped: peak > 1.0,
        }
    }
}
