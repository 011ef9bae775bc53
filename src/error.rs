use std::path::PathBuf;

use thiserror::Error;

/// A parameter arrived outside its declared range and was clamped.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{field} = {requested} is out of range, clamped to {applied}")]
pub struct ValidationError {
    pub field: String,
    pub requested: f64,
    pub applied: f64,
}

/// Structural failures while loading a session document.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid config: missing '{0}'")]
    MissingSection(&'static str),
    #[error("invalid config: '{0}' has the wrong type")]
    WrongType(&'static str),
    #[error("could not access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("no channel slot {0}")]
    UnknownChannel(usize),
    #[error("no keyframe at index {0}")]
    UnknownKeyframe(usize),
    #[error("cannot {command} while {state}")]
    InvalidTransition {
        command: &'static str,
        state: &'static str,
    },
    #[error("recording sink error: {0}")]
    Resource(String),
    #[error("audio device unavailable: {0}")]
    Device(String),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl From<hound::Error> for EngineError {
    fn from(e: hound::Error) -> Self {
        EngineError::Resource(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
