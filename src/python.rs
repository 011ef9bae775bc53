//! Python extension module.
//!
//! Python callers have no place to keep a Rust handle, so the engine lives in
//! a module-level slot created on first use.

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use pyo3::exceptions::{PyRuntimeError, PyValueError};
use pyo3::prelude::*;

use crate::audio_io::CpalSink;
use crate::config::CONFIG;
use crate::engine::{AudioEngine, PlaybackMode};
use crate::error::EngineError;
use crate::session::Session;

static ENGINE: Lazy<Mutex<Option<AudioEngine>>> = Lazy::new(|| Mutex::new(None));

fn to_py_err(e: EngineError) -> PyErr {
    match e {
        EngineError::Config(_) | EngineError::Validation(_) => PyValueError::new_err(e.to_string()),
        _ => PyRuntimeError::new_err(e.to_string()),
    }
}

fn with_engine<T>(f: impl FnOnce(&mut AudioEngine) -> Result<T, EngineError>) -> PyResult<T> {
    let mut slot = ENGINE.lock();
    let engine = slot.get_or_insert_with(|| {
        let sink = CpalSink::new(CONFIG.live_block_frames);
        AudioEngine::new(CONFIG.clone(), Session::new(), Box::new(sink))
    });
    f(engine).map_err(to_py_err)
}

/// Load `session_json` and start live playback. Returns False when no audio
/// device was available and playback runs silently.
#[pyfunction]
fn start_playback(session_json: &str) -> PyResult<bool> {
    with_engine(|engine| {
        engine.load_session_str(session_json)?;
        Ok(engine.start_playback()? == PlaybackMode::Audible)
    })
}

#[pyfunction]
fn stop_playback() -> PyResult<()> {
    with_engine(|engine| engine.stop_playback())
}

/// Replace the running session; takes effect from the next audio block.
/// Returns the per-field warnings as strings.
#[pyfunction]
fn update_session(session_json: &str) -> PyResult<Vec<String>> {
    with_engine(|engine| {
        let issues = engine.load_session_str(session_json)?;
        Ok(issues.iter().map(ToString::to_string).collect())
    })
}

#[pyfunction]
fn start_recording(session_json: &str, path: &str) -> PyResult<()> {
    with_engine(|engine| {
        engine.load_session_str(session_json)?;
        let duration = engine.session().recording_duration();
        engine.start_recording(duration, path)
    })
}

#[pyfunction]
fn pause_recording() -> PyResult<()> {
    with_engine(|engine| engine.pause_recording())
}

#[pyfunction]
fn resume_recording() -> PyResult<()> {
    with_engine(|engine| engine.resume_recording())
}

/// Stop and finalize the recording; returns `(path, frames_written, seconds)`.
#[pyfunction]
fn stop_recording(py: Python<'_>) -> PyResult<(String, u64, f64)> {
    py.allow_threads(|| {
        with_engine(|engine| {
            let summary = engine.stop_recording()?;
            Ok((
                summary.path.display().to_string(),
                summary.frames_written,
                summary.duration,
            ))
        })
    })
}

#[pyfunction]
fn recording_progress() -> PyResult<Option<f64>> {
    with_engine(|engine| Ok(engine.recording_progress()))
}

#[pymodule]
fn spatial_entrainment(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_function(wrap_pyfunction!(start_playback, m)?)?;
    m.add_function(wrap_pyfunction!(stop_playback, m)?)?;
    m.add_function(wrap_pyfunction!(update_session, m)?)?;
    m.add_function(wrap_pyfunction!(start_recording, m)?)?;
    m.add_function(wrap_pyfunction!(pause_recording, m)?)?;
    m.add_function(wrap_pyfunction!(resume_recording, m)?)?;
    m.add_function(wrap_pyfunction!(stop_recording, m)?)?;
    m.add_function(wrap_pyfunction!(recording_progress, m)?)?;
    Ok(())
}
