//! Play / record state machines shared between the control thread and the
//! audio-producing threads.
//!
//! Both machines are single atomics advanced with compare-exchange, so a
//! transition is either fully applied or not at all and readers on the audio
//! side never take a lock.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

use crate::error::EngineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PlaybackState {
    Idle = 0,
    Playing = 1,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RecordingState {
    Idle = 0,
    Recording = 1,
    Paused = 2,
    /// Capture has ended; the file sink is being finalized.
    Stopped = 3,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportCommand {
    StartPlayback,
    StopPlayback,
    StartRecording,
    Pause,
    Resume,
    StopRecording,
    Finalize,
}

impl PlaybackState {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => PlaybackState::Playing,
            _ => PlaybackState::Idle,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            PlaybackState::Idle => "idle",
            PlaybackState::Playing => "playing",
        }
    }

    pub fn next(self, command: TransportCommand) -> Option<Self> {
        use PlaybackState::*;
        use TransportCommand::*;
        match (self, command) {
            (Idle, StartPlayback) => Some(Playing),
            (Playing, StopPlayback) => Some(Idle),
            _ => None,
        }
    }
}

impl RecordingState {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => RecordingState::Recording,
            2 => RecordingState::Paused,
            3 => RecordingState::Stopped,
            _ => RecordingState::Idle,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            RecordingState::Idle => "idle",
            RecordingState::Recording => "recording",
            RecordingState::Paused => "paused",
            RecordingState::Stopped => "stopped",
        }
    }

    pub fn next(self, command: TransportCommand) -> Option<Self> {
        use RecordingState::*;
        use TransportCommand::*;
        match (self, command) {
            (Idle, StartRecording) => Some(Recording),
            (Recording, Pause) => Some(Paused),
            (Paused, Resume) => Some(Recording),
            (Recording | Paused, StopRecording) => Some(Stopped),
            (Stopped, Finalize) => Some(Idle),
            _ => None,
        }
    }
}

impl TransportCommand {
    pub fn name(self) -> &'static str {
        match self {
            TransportCommand::StartPlayback => "start playback",
            TransportCommand::StopPlayback => "stop playback",
            TransportCommand::StartRecording => "start recording",
            TransportCommand::Pause => "pause",
            TransportCommand::Resume => "resume",
            TransportCommand::StopRecording => "stop recording",
            TransportCommand::Finalize => "finalize",
        }
    }

    fn is_playback(self) -> bool {
        matches!(
            self,
            TransportCommand::StartPlayback | TransportCommand::StopPlayback
        )
    }
}

impl fmt::Display for TransportCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Default)]
pub struct Transport {
    playback: AtomicU8,
    recording: AtomicU8,
}

impl Transport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn playback(&self) -> PlaybackState {
        PlaybackState::from_u8(self.playback.load(Ordering::Acquire))
    }

    pub fn recording(&self) -> RecordingState {
        RecordingState::from_u8(self.recording.load(Ordering::Acquire))
    }

    pub fn is_playing(&self) -> bool {
        self.playback() == PlaybackState::Playing
    }

    /// Advance the machine `command` belongs to.
    ///
    /// Commands that are not legal in the current state leave it untouched
    /// and return [`EngineError::InvalidTransition`].
    pub fn apply(&self, command: TransportCommand) -> Result<(), EngineError> {
        if command.is_playback() {
            step(&self.playback, command, |v| {
                let state = PlaybackState::from_u8(v);
                state.next(command).map(|n| n as u8).ok_or(state.name())
            })
        } else {
            step(&self.recording, command, |v| {
                let state = RecordingState::from_u8(v);
                state.next(command).map(|n| n as u8).ok_or(state.name())
            })
        }
    }
}

fn step<F>(cell: &AtomicU8, command: TransportCommand, next: F) -> Result<(), EngineError>
where
    F: Fn(u8) -> Result<u8, &'static str>,
{
    let mut current = cell.load(Ordering::Acquire);
    loop {
        let target = next(current).map_err(|state| EngineError::InvalidTransition {
            command: command.name(),
            state,
        })?;
        match cell.compare_exchange(current, target, Ordering::AcqRel, Ordering::Acquire) {
            Ok(_) => return Ok(()),
            Err(actual) => current = actual,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn pause_while_idle_is_invalid_and_changes_nothing() {
        let t = Transport::new();
        let err = t.apply(TransportCommand::Pause).unwrap_err();
        match err {
            EngineError::InvalidTransition { command, state } => {
                assert_eq!(command, "pause");
                assert_eq!(state, "idle");
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert_eq!(t.recording(), RecordingState::Idle);
        assert_eq!(t.playback(), PlaybackState::Idle);
    }

    #[test]
    fn full_recording_cycle() {
        let t = Transport::new();
        t.apply(TransportCommand::StartRecording).unwrap();
        t.apply(TransportCommand::Pause).unwrap();
        assert_eq!(t.recording(), RecordingState::Paused);
        assert!(t.apply(TransportCommand::Pause).is_err());
        t.apply(TransportCommand::Resume).unwrap();
        t.apply(TransportCommand::StopRecording).unwrap();
        assert_eq!(t.recording(), RecordingState::Stopped);
        assert!(t.apply(TransportCommand::StartRecording).is_err());
        t.apply(TransportCommand::Finalize).unwrap();
        assert_eq!(t.recording(), RecordingState::Idle);
    }

    #[test]
    fn stop_from_paused_is_allowed() {
        let t = Transport::new();
        t.apply(TransportCommand::StartRecording).unwrap();
        t.apply(TransportCommand::Pause).unwrap();
        t.apply(TransportCommand::StopRecording).unwrap();
        assert_eq!(t.recording(), RecordingState::Stopped);
    }

    #[test]
    fn playback_and_recording_are_independent() {
        let t = Transport::new();
        t.apply(TransportCommand::StartPlayback).unwrap();
        t.apply(TransportCommand::StartRecording).unwrap();
        t.apply(TransportCommand::Pause).unwrap();
        assert!(t.is_playing());
        assert!(t.apply(TransportCommand::StartPlayback).is_err());
        t.apply(TransportCommand::StopPlayback).unwrap();
        assert_eq!(t.recording(), RecordingState::Paused);
    }

    #[test]
    fn concurrent_stop_wins_exactly_once() {
        let t = Arc::new(Transport::new());
        t.apply(TransportCommand::StartRecording).unwrap();
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let t = Arc::clone(&t);
                std::thread::spawn(move || t.apply(TransportCommand::StopRecording).is_ok())
            })
            .collect();
        let wins = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();
        assert_eq!(wins, 1);
        assert_eq!(t.recording(), RecordingState::Stopped);
    }
}
