use std::f64::consts::TAU;

/// Phase-accumulating sine carrier.
///
/// Phase is kept in cycles and only ever advanced, so frequency or amplitude
/// changes between calls never cause a discontinuity.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Oscillator {
    phase: f64,
}

impl Oscillator {
    pub fn new() -> Self {
        Self::default()
    }

    /// `amplitude * sin(2π·phase)`, then advance by one sample at `frequency`.
    #[inline]
    pub fn next_sample(&mut self, frequency: f64, amplitude: f64, sample_rate: f64) -> f64 {
        let sample = amplitude * (TAU * self.phase).sin();
        self.phase += frequency / sample_rate;
        self.phase -= self.phase.floor();
        sample
    }

}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_at_zero_crossing() {
        let mut osc = Oscillator::new();
        assert_eq!(osc.next_sample(440.0, 1.0, 44_100.0), 0.0);
    }

    #[test]
    fn stays_within_amplitude() {
        let mut osc = Oscillator::new();
        for _ in 0..44_100 {
            let s = osc.next_sample(440.0, 0.7, 44_100.0);
            assert!(s.abs() <= 0.7 + 1e-12, "out of range: {s}");
        }
    }

    #[test]
    fn silent_oscillator_still_advances() {
        let mut silent = Oscillator::new();
        let mut loud = Oscillator::new();
        for _ in 0..1000 {
            assert_eq!(silent.next_sample(200.0, 0.0, 48_000.0), 0.0);
            loud.next_sample(200.0, 1.0, 48_000.0);
        }
        assert_eq!(silent, loud);
        assert_ne!(silent, Oscillator::new());
    }

    #[test]
    fn frequency_change_is_continuous() {
        let mut osc = Oscillator::new();
        let mut prev = 0.0;
        for i in 0..4800 {
            let freq = if i < 2400 { 100.0 } else { 150.0 };
            let s = osc.next_sample(freq, 1.0, 48_000.0);
            // max slope of a 150 Hz unit sine at 48 kHz is 2π·150/48000 ≈ 0.0196
            assert!((s - prev).abs() < 0.02, "jump at sample {i}");
            prev = s;
        }
    }
}
