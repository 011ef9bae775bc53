//! Isochronic gating: a square on/off pulse with short linear edges.

/// Pulse rates at or below this are treated as "no gating".
pub const MIN_PULSE_HZ: f64 = 1e-3;

/// Envelope value at `phase` (cycles, `[0, 1)`) of a half-on/half-off pulse.
///
/// `ramp` is the edge length in cycles; it is capped at a quarter period so
/// the rising and falling edges never overlap.
pub fn pulse_envelope(phase: f64, ramp: f64) -> f64 {
    if phase >= 0.5 {
        return 0.0;
    }
    let ramp = ramp.clamp(0.0, 0.25);
    if ramp <= 0.0 {
        return 1.0;
    }
    if phase < ramp {
        phase / ramp
    } else if phase > 0.5 - ramp {
        (0.5 - phase) / ramp
    } else {
        1.0
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct IsochronicModulator {
    phase: f64,
}

impl IsochronicModulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Gain for the current sample, then advance one sample.
    #[inline]
    pub fn next_gain(&mut self, pulse_hz: f64, ramp_seconds: f64, sample_rate: f64) -> f64 {
        if pulse_hz <= MIN_PULSE_HZ {
            return 1.0;
        }
        let gain = pulse_envelope(self.phase, ramp_seconds * pulse_hz);
        self.phase += pulse_hz / sample_rate;
        self.phase -= self.phase.floor();
        gain
    }
}
