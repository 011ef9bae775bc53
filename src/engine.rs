use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use arc_swap::{ArcSwap, Guard};
use parking_lot::Mutex;
use tracing::{info, warn};

use crate::audio_io::{LiveRenderer, LiveSink};
use crate::command::Command;
use crate::config::EngineConfig;
use crate::config_store::{self, FieldIssue};
use crate::error::{EngineError, Result, ValidationError};
use crate::mixer::Mixer;
use crate::models::clamp_field;
use crate::recorder::{RecorderSettings, Recording, RecordingSummary};
use crate::session::{MixSnapshot, Session, MAX_RECORDING_DURATION, MIN_RECORDING_DURATION};
use crate::transport::{PlaybackState, RecordingState, Transport, TransportCommand};

/// State read by every audio-producing thread.
#[derive(Debug)]
pub struct EngineShared {
    snapshot: ArcSwap<MixSnapshot>,
    /// Replaced snapshots that a reader may still hold.
    retired: Mutex<Vec<Arc<MixSnapshot>>>,
    transport: Transport,
    clipped: AtomicBool,
}

impl EngineShared {
    pub fn new(snapshot: MixSnapshot) -> Self {
        Self {
            snapshot: ArcSwap::from_pointee(snapshot),
            retired: Mutex::new(Vec::new()),
            transport: Transport::new(),
            clipped: AtomicBool::new(false),
        }
    }

    /// Lock-free view of the latest published mix.
    pub fn snapshot(&self) -> Guard<Arc<MixSnapshot>> {
        self.snapshot.load()
    }

    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    /// Swap in `snapshot`. The previous one stays parked until a later
    /// publish finds no reader left, so the last reference is always dropped
    /// here and never inside an audio callback.
    pub(crate) fn publish(&self, snapshot: MixSnapshot) {
        let old = self.snapshot.swap(Arc::new(snapshot));
        let mut retired = self.retired.lock();
        retired.push(old);
        retired.retain(|s| Arc::strong_count(s) > 1);
    }

    pub(crate) fn flag_clip(&self) {
        self.clipped.store(true, Ordering::Relaxed);
    }

    pub fn take_clip(&self) -> bool {
        self.clipped.swap(false, Ordering::Relaxed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackMode {
    Audible,
    /// The live sink could not be opened; playback state runs without sound.
    VisualOnly,
}

/// Owns a session and drives live playback and recording from it.
///
/// Every edit goes through the session and is then published as a single
/// immutable snapshot, so audio threads never observe a half-applied change.
pub struct AudioEngine {
    config: EngineConfig,
    session: Session,
    shared: Arc<EngineShared>,
    sink: Box<dyn LiveSink>,
    mode: Option<PlaybackMode>,
    recording: Option<Recording>,
}

impl AudioEngine {
    pub fn new(config: EngineConfig, session: Session, sink: Box<dyn LiveSink>) -> Self {
        let shared = Arc::new(EngineShared::new(session.snapshot()));
        Self {
            config,
            session,
            shared,
            sink,
            mode: None,
            recording: None,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn shared(&self) -> &Arc<EngineShared> {
        &self.shared
    }

    pub fn playback_state(&self) -> PlaybackState {
        self.shared.transport().playback()
    }

    pub fn recording_state(&self) -> RecordingState {
        self.shared.transport().recording()
    }

    /// `None` while playback is idle.
    pub fn playback_mode(&self) -> Option<PlaybackMode> {
        self.mode
    }

    pub fn apply(&mut self, command: Command) -> Result<Vec<ValidationError>> {
        let issues = self.session.apply(command)?;
        self.publish();
        Ok(issues)
    }

    /// Swap in a whole session (channels and curve) with one publish.
    pub fn replace_session(&mut self, session: Session) {
        self.session = session;
        self.publish();
    }

    pub fn load_session_str(&mut self, txt: &str) -> Result<Vec<FieldIssue>> {
        let loaded = config_store::load_str(txt)?;
        self.replace_session(loaded.session);
        Ok(loaded.issues)
    }

    pub fn load_session_file<P: AsRef<Path>>(&mut self, path: P) -> Result<Vec<FieldIssue>> {
        let loaded = config_store::load_file(path)?;
        self.replace_session(loaded.session);
        Ok(loaded.issues)
    }

    fn publish(&self) {
        self.shared.publish(self.session.snapshot());
    }

    pub fn start_playback(&mut self) -> Result<PlaybackMode> {
        self.shared.transport().apply(TransportCommand::StartPlayback)?;
        let renderer = LiveRenderer::new(Arc::clone(&self.shared), self.config.mixer_settings());
        let mode = match self.sink.open(renderer) {
            Ok(()) => PlaybackMode::Audible,
            Err(e) => {
                warn!("{e}; playing without sound");
                PlaybackMode::VisualOnly
            }
        };
        info!("playback started ({mode:?})");
        self.mode = Some(mode);
        Ok(mode)
    }

    pub fn stop_playback(&mut self) -> Result<()> {
        self.shared.transport().apply(TransportCommand::StopPlayback)?;
        self.sink.close();
        self.mode = None;
        info!("playback stopped");
        Ok(())
    }

    /// Record `duration` seconds of the automated mix to `path`.
    ///
    /// Relative paths land in the configured output directory. The length is
    /// fixed here; later duration edits only affect the next recording.
    pub fn start_recording<P: AsRef<Path>>(&mut self, duration: f64, path: P) -> Result<()> {
        if let Some(Err(e)) = self.reap_idle() {
            warn!("previous recording failed: {e}");
        }
        let (duration, issue) = clamp_field(
            "recording_duration",
            duration,
            MIN_RECORDING_DURATION,
            MAX_RECORDING_DURATION,
        );
        if let Some(issue) = issue {
            warn!("{issue}");
        }
        let path = self.config.resolve_output(path);
        let settings = RecorderSettings::from_config(&self.config);
        let recording = Recording::start(Arc::clone(&self.shared), settings, &path, duration)?;
        self.recording = Some(recording);
        Ok(())
    }

    pub fn pause_recording(&mut self) -> Result<()> {
        self.shared.transport().apply(TransportCommand::Pause)?;
        info!("recording paused");
        Ok(())
    }

    pub fn resume_recording(&mut self) -> Result<()> {
        self.shared.transport().apply(TransportCommand::Resume)?;
        info!("recording resumed");
        Ok(())
    }

    /// End the recording early and wait for the file to be finalized.
    pub fn stop_recording(&mut self) -> Result<RecordingSummary> {
        let recording = self.recording.take().ok_or_else(|| EngineError::InvalidTransition {
            command: TransportCommand::StopRecording.name(),
            state: self.recording_state().name(),
        })?;
        // Losing this race to the length limit is fine; the file is complete.
        if self
            .shared
            .transport()
            .apply(TransportCommand::StopRecording)
            .is_ok()
        {
            info!("recording stopped");
        }
        recording.join()
    }

    /// Block until the recording reaches its length (or is stopped elsewhere).
    pub fn wait_recording(&mut self) -> Result<RecordingSummary> {
        let recording = self.recording.take().ok_or(EngineError::InvalidTransition {
            command: "wait for recording",
            state: RecordingState::Idle.name(),
        })?;
        recording.join()
    }

    /// The recording's outcome once it has finished, without blocking.
    pub fn poll_recording(&mut self) -> Option<Result<RecordingSummary>> {
        if self.recording.as_ref()?.is_finished() {
            self.recording.take().map(Recording::join)
        } else {
            None
        }
    }

    /// Fraction of the current recording rendered so far.
    pub fn recording_progress(&self) -> Option<f64> {
        self.recording.as_ref().map(Recording::progress)
    }

    /// Render `frames` stereo frames of the current mix with a fresh clock.
    ///
    /// Works in every transport state and never touches the live sink.
    pub fn preview(&self, frames: usize) -> Vec<f32> {
        let mut mixer = Mixer::new(self.config.mixer_settings());
        let mut out = vec![0.0f32; frames * 2];
        let snapshot = self.shared.snapshot();
        if mixer.render(&snapshot.channels, &mut out).clipped {
            self.shared.flag_clip();
        }
        out
    }

    /// Whether any output clipped since the last call.
    pub fn take_clip_warning(&self) -> bool {
        self.shared.take_clip()
    }

    /// Collect a recording whose transport is already back to idle.
    ///
    /// The writer finalizes before its thread returns, so this joins instead
    /// of waiting for `is_finished`.
    fn reap_idle(&mut self) -> Option<Result<RecordingSummary>> {
        if self.recording_state() != RecordingState::Idle {
            return None;
        }
        self.recording.take().map(Recording::join)
    }
}

impl Drop for AudioEngine {
    fn drop(&mut self) {
        if self.shared.transport().is_playing() {
            let _ = self.stop_playback();
        }
        if let Some(recording) = self.recording.take() {
            let _ = self.shared.transport().apply(TransportCommand::StopRecording);
            if let Err(e) = recording.join() {
                warn!("recording failed during shutdown: {e}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio_io::PullSink;
    use crate::models::Keyframe;

    struct NoDevice;

    impl LiveSink for NoDevice {
        fn open(&mut self, _renderer: LiveRenderer) -> Result<()> {
            Err(EngineError::Device("unplugged".into()))
        }

        fn close(&mut self) {}
    }

    fn offline_engine() -> AudioEngine {
        AudioEngine::new(offline_config(), Session::new(), Box::new(PullSink::new()))
    }

    fn offline_config() -> EngineConfig {
        EngineConfig {
            sample_rate: 8000,
            realtime_recording: false,
            output_dir: std::env::temp_dir(),
            ..EngineConfig::default()
        }
    }

    #[test]
    fn edits_are_published_to_the_live_renderer() {
        let sink = PullSink::new();
        let handle = sink.handle();
        let mut engine = AudioEngine::new(offline_config(), Session::new(), Box::new(sink));
        engine.apply(Command::SetChannelCount(1)).unwrap();
        assert_eq!(engine.start_playback().unwrap(), PlaybackMode::Audible);

        let mut out = vec![0.0f32; 200];
        assert!(handle.pull(&mut out));
        assert!(out.iter().any(|&s| s != 0.0));

        engine
            .apply(Command::SetAmplitude { channel: 0, amplitude: 0.0 })
            .unwrap();
        handle.pull(&mut out);
        assert!(out.iter().all(|&s| s == 0.0));

        engine.stop_playback().unwrap();
        assert!(!handle.pull(&mut out));
        assert_eq!(engine.playback_mode(), None);
    }

    #[test]
    fn missing_device_degrades_to_visual_only() {
        let mut engine = AudioEngine::new(offline_config(), Session::new(), Box::new(NoDevice));
        assert_eq!(engine.start_playback().unwrap(), PlaybackMode::VisualOnly);
        assert_eq!(engine.playback_state(), PlaybackState::Playing);
        assert!(engine.preview(64).iter().any(|&s| s != 0.0));
        engine.stop_playback().unwrap();
        assert_eq!(engine.playback_state(), PlaybackState::Idle);
    }

    #[test]
    fn invalid_transport_commands_change_nothing() {
        let mut engine = offline_engine();
        assert!(matches!(
            engine.pause_recording(),
            Err(EngineError::InvalidTransition { command: "pause", state: "idle" })
        ));
        assert!(engine.stop_playback().is_err());
        assert!(engine.stop_recording().is_err());
        assert_eq!(engine.recording_state(), RecordingState::Idle);
        assert_eq!(engine.playback_state(), PlaybackState::Idle);
    }

    #[test]
    fn recording_runs_to_length() {
        let mut engine = offline_engine();
        engine.apply(Command::SetChannelCount(2)).unwrap();
        engine.apply(Command::AddKeyframe(Keyframe::new(0.0, 0.5))).unwrap();
        let name = format!("entrainment_engine_{}.wav", std::process::id());
        engine.start_recording(0.25, &name).unwrap();
        let summary = engine.wait_recording().unwrap();
        assert_eq!(summary.frames_written, 2000);
        assert!((summary.duration - 0.25).abs() < 1e-9);
        assert_eq!(summary.path, std::env::temp_dir().join(&name));
        assert_eq!(engine.recording_state(), RecordingState::Idle);
        assert_eq!(engine.recording_progress(), None);
        std::fs::remove_file(&summary.path).ok();
    }

    #[test]
    fn preview_matches_a_fresh_mixer() {
        let mut engine = offline_engine();
        engine.apply(Command::SetChannelCount(3)).unwrap();
        let a = engine.preview(500);
        let b = engine.preview(500);
        assert_eq!(a, b);
        assert_eq!(a.len(), 1000);
    }

    #[test]
    fn clip_warning_is_taken_once() {
        let engine = offline_engine();
        // Ten centred channels at half amplitude sum past full scale.
        engine.preview(400);
        assert!(engine.take_clip_warning());
        assert!(!engine.take_clip_warning());
    }

    #[test]
    fn replacing_the_session_publishes_once() {
        let mut engine = offline_engine();
        let mut next = Session::new();
        next.apply(Command::SetChannelCount(2)).unwrap();
        next.apply(Command::AddKeyframe(Keyframe::new(1.0, 0.25))).unwrap();
        engine.replace_session(next.clone());
        assert_eq!(**engine.shared().snapshot(), next.snapshot());
    }

    #[test]
    fn replaced_snapshots_are_freed_on_the_publishing_side() {
        let shared = EngineShared::new(Session::new().snapshot());
        let held = shared.snapshot();
        let weak = Arc::downgrade(&*held);
        shared.publish(Session::new().snapshot());
        drop(held);
        // The reader let go, but only the next publish releases it.
        assert!(weak.upgrade().is_some());
        shared.publish(Session::new().snapshot());
        assert!(weak.upgrade().is_none());
    }

    #[test]
    fn a_recording_back_at_idle_is_collected_even_if_its_thread_lingers() {
        let mut engine = offline_engine();
        let name = format!("entrainment_reap_{}.wav", std::process::id());
        engine.start_recording(0.1, &name).unwrap();
        for _ in 0..500 {
            if engine.recording_state() == RecordingState::Idle {
                break;
            }
            std::thread::sleep(std::time::Duration::from_millis(2));
        }
        assert_eq!(engine.recording_state(), RecordingState::Idle);

        let summary = engine.reap_idle().unwrap().unwrap();
        assert_eq!(summary.frames_written, 800);
        assert!(engine.reap_idle().is_none());

        engine.start_recording(0.05, &name).unwrap();
        assert_eq!(engine.wait_recording().unwrap().frames_written, 400);
        std::fs::remove_file(std::env::temp_dir().join(&name)).ok();
    }
}
