use crate::models::Position;

/// Default distance constant `k` for `1 / (1 + k·d)`.
pub const DEFAULT_DISTANCE_K: f64 = 0.5;

/// Left/right gains and distance attenuation for one source.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpatialGains {
    pub left: f64,
    pub right: f64,
    pub attenuation: f64,
}

impl SpatialGains {
    #[inline]
    pub fn apply(&self, sample: f64) -> (f64, f64) {
        let s = sample * self.attenuation;
        (s * self.left, s * self.right)
    }
}

/// Places sources around a listener fixed at the origin.
///
/// Uses a linear pan law, `L = 0.5 − x/2`, `R = 0.5 + x/2`, so the two gains
/// always sum to one. Depth and height fold into a single attenuation
/// `1 / (1 + k·sqrt(y² + z²))`, which stays in (0, 1].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpatialPanner {
    k: f64,
}

impl Default for SpatialPanner {
    fn default() -> Self {
        Self::new(DEFAULT_DISTANCE_K)
    }
}

impl SpatialPanner {
    pub fn new(k: f64) -> Self {
        let k = if k.is_finite() { k.max(0.0) } else { DEFAULT_DISTANCE_K };
        Self { k }
    }

    pub fn gains(&self, position: Position) -> SpatialGains {
        let x = position.x;
        let left = (0.5 - x / 2.0).clamp(0.0, 1.0);
        let right = (0.5 + x / 2.0).clamp(0.0, 1.0);
        let distance = (position.y * position.y + position.z * position.z).sqrt();
        SpatialGains {
            left,
            right,
            attenuation: 1.0 / (1.0 + self.k * distance),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pan_law_boundaries() {
        let p = SpatialPanner::default();
        let hard_left = p.gains(Position::new(-1.0, 0.0, 0.0));
        assert_eq!((hard_left.left, hard_left.right), (1.0, 0.0));
        let hard_right = p.gains(Position::new(1.0, 0.0, 0.0));
        assert_eq!((hard_right.left, hard_right.right), (0.0, 1.0));
        let centre = p.gains(Position::ORIGIN);
        assert_eq!((centre.left, centre.right), (0.5, 0.5));
    }

    #[test]
    fn attenuation_is_unity_at_origin_and_decreasing() {
        let p = SpatialPanner::default();
        assert_eq!(p.gains(Position::ORIGIN).attenuation, 1.0);
        let mut last = 1.0;
        for step in 1..=10 {
            let d = step as f64 / 10.0;
            let att = p.gains(Position::new(0.0, d, d)).attenuation;
            assert!(att < last);
            assert!(att > 0.0);
            last = att;
        }
        let far = p.gains(Position::new(0.0, 1.0, 1.0)).attenuation;
        assert!((far - 1.0 / (1.0 + 0.5 * 2f64.sqrt())).abs() < 1e-12);
    }

    #[test]
    fn x_does_not_attenuate() {
        let p = SpatialPanner::new(3.0);
        assert_eq!(p.gains(Position::new(0.8, 0.0, 0.0)).attenuation, 1.0);
    }

    #[test]
    fn apply_scales_both_sides() {
        let g = SpatialGains { left: 0.25, right: 0.75, attenuation: 0.5 };
        assert_eq!(g.apply(1.0), (0.125, 0.375));
    }

    #[test]
    fn invalid_k_falls_back() {
        assert_eq!(SpatialPanner::new(f64::NAN), SpatialPanner::default());
        assert_eq!(SpatialPanner::new(-2.0), SpatialPanner::new(0.0));
    }
}
