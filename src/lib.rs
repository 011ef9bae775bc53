//! Real-time synthesis, spatial mixing and recording of multi-channel
//! entrainment tones.
//!
//! A [`session::Session`] holds the channel slots and the volume automation
//! curve; an [`engine::AudioEngine`] owns one and drives live playback through
//! a [`audio_io::LiveSink`] and WAV capture through [`recorder::Recording`].

pub mod audio_io;
pub mod automation;
pub mod command;
pub mod config;
pub mod config_store;
pub mod dsp;
pub mod engine;
pub mod error;
pub mod mixer;
pub mod models;
pub mod recorder;
pub mod session;
pub mod transport;

#[cfg(feature = "python")]
mod python;

pub use command::Command;
pub use engine::{AudioEngine, PlaybackMode};
pub use error::{ConfigError, EngineError, ValidationError};
pub use session::Session;
