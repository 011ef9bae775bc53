use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::dsp::spatial::DEFAULT_DISTANCE_K;
use crate::mixer::MixerSettings;
use crate::dsp::SpatialPanner;

/// Environment variable naming an alternative engine config file.
pub const CONFIG_ENV: &str = "ENTRAINMENT_CONFIG";

/// Larger `queue_seconds` values are capped to this.
pub const MAX_QUEUE_SECONDS: f64 = 60.0;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct EngineConfig {
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
    /// Frames requested per live callback; 0 lets the device decide.
    #[serde(default = "default_live_block_frames")]
    pub live_block_frames: u32,
    /// Frames rendered per recording pull.
    #[serde(default = "default_recording_block_frames")]
    pub recording_block_frames: usize,
    /// Length of each isochronic on/off edge.
    #[serde(default = "default_iso_ramp_ms")]
    pub iso_ramp_ms: f64,
    /// `k` in the distance attenuation `1 / (1 + k·d)`.
    #[serde(default = "default_distance_k")]
    pub distance_k: f64,
    /// Capacity of the recording queue, in seconds of audio.
    #[serde(default = "default_queue_seconds")]
    pub queue_seconds: f64,
    /// Pace recording renders to wall-clock time instead of running flat out.
    #[serde(default = "default_realtime_recording")]
    pub realtime_recording: bool,
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("output")
}

fn default_sample_rate() -> u32 {
    44_100
}

fn default_live_block_frames() -> u32 {
    0
}

fn default_recording_block_frames() -> usize {
    4410
}

fn default_iso_ramp_ms() -> f64 {
    2.0
}

fn default_distance_k() -> f64 {
    DEFAULT_DISTANCE_K
}

fn default_queue_seconds() -> f64 {
    2.0
}

fn default_realtime_recording() -> bool {
    true
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            sample_rate: default_sample_rate(),
            live_block_frames: default_live_block_frames(),
            recording_block_frames: default_recording_block_frames(),
            iso_ramp_ms: default_iso_ramp_ms(),
            distance_k: default_distance_k(),
            queue_seconds: default_queue_seconds(),
            realtime_recording: default_realtime_recording(),
        }
    }
}

impl EngineConfig {
    pub fn from_toml_str(txt: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(txt)
    }

    /// Read a config file; a missing or unreadable file yields the defaults.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        match std::fs::read_to_string(path) {
            Ok(txt) => match Self::from_toml_str(&txt) {
                Ok(cfg) => cfg,
                Err(e) => {
                    tracing::warn!("ignoring {}: {e}", path.display());
                    Self::default()
                }
            },
            Err(_) => Self::default(),
        }
    }

    /// Write the default configuration as a TOML template.
    pub fn generate_default<P: AsRef<Path>>(path: P) -> Result<(), Box<dyn std::error::Error>> {
        let txt = toml::to_string_pretty(&Self::default())?;
        std::fs::write(path, txt)?;
        Ok(())
    }

    pub fn mixer_settings(&self) -> MixerSettings {
        MixerSettings {
            sample_rate: self.sample_rate.max(1) as f64,
            iso_ramp_seconds: self.iso_ramp_ms.max(0.0) / 1000.0,
            panner: SpatialPanner::new(self.distance_k),
        }
    }

    /// Never smaller than one recording block; NaN falls back to the default.
    pub fn queue_capacity_samples(&self) -> usize {
        let seconds = if self.queue_seconds.is_nan() {
            default_queue_seconds()
        } else {
            self.queue_seconds.clamp(0.0, MAX_QUEUE_SECONDS)
        };
        let frames = (seconds * self.sample_rate as f64) as usize;
        frames.max(self.recording_block_frames.max(1)).saturating_mul(2)
    }

    /// Resolve a relative output path against `output_dir`.
    pub fn resolve_output<P: AsRef<Path>>(&self, path: P) -> PathBuf {
        let path = path.as_ref();
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.output_dir.join(path)
        }
    }
}

pub static CONFIG: Lazy<EngineConfig> = Lazy::new(|| {
    let path = std::env::var_os(CONFIG_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"));
    EngineConfig::load_or_default(path)
});
