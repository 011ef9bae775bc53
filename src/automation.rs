//! Keyframed volume envelope applied to recordings.

use crate::models::Keyframe;

/// Sorted keyframes with piecewise-linear interpolation.
///
/// An empty curve is flat unity gain. Before the first keyframe the first
/// level is held, after the last keyframe the last level is held.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VolumeAutomationCurve {
    keyframes: Vec<Keyframe>,
}

impl VolumeAutomationCurve {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from unsorted points. Later duplicates of a time win.
    pub fn from_keyframes<I: IntoIterator<Item = Keyframe>>(points: I) -> Self {
        let mut curve = Self::new();
        for kf in points {
            curve.insert(kf);
        }
        curve
    }

    pub fn keyframes(&self) -> &[Keyframe] {
        &self.keyframes
    }

    pub fn len(&self) -> usize {
        self.keyframes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keyframes.is_empty()
    }

    /// Insert keeping the sequence sorted; an existing keyframe at the same
    /// time is replaced. Returns the index of the keyframe.
    pub fn insert(&mut self, kf: Keyframe) -> usize {
        match self
            .keyframes
            .binary_search_by(|other| other.time.total_cmp(&kf.time))
        {
            Ok(idx) => {
                self.keyframes[idx] = kf;
                idx
            }
            Err(idx) => {
                self.keyframes.insert(idx, kf);
                idx
            }
        }
    }

    pub fn remove(&mut self, index: usize) -> Option<Keyframe> {
        if index < self.keyframes.len() {
            Some(self.keyframes.remove(index))
        } else {
            None
        }
    }

    /// Move a keyframe to a new time/level. Returns its new index.
    pub fn move_keyframe(&mut self, index: usize, to: Keyframe) -> Option<usize> {
        self.remove(index)?;
        Some(self.insert(to))
    }

    pub fn clear(&mut self) {
        self.keyframes.clear();
    }

    /// Gain at `t` seconds.
    pub fn level_at(&self, t: f64) -> f64 {
        let kfs = &self.keyframes;
        let (first, last) = match (kfs.first(), kfs.last()) {
            (Some(f), Some(l)) => (f, l),
            _ => return 1.0,
        };
        if t <= first.time {
            return first.level;
        }
        if t >= last.time {
            return last.level;
        }
        // First keyframe strictly after t; t > first.time so idx >= 1.
        let idx = kfs.partition_point(|kf| kf.time <= t);
        let k0 = kfs[idx - 1];
        let k1 = kfs[idx];
        let span = k1.time - k0.time;
        if span <= 0.0 {
            return k1.level;
        }
        k0.level + (k1.level - k0.level) * (t - k0.time) / span
    }
}
