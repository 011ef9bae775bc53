//! JSON session documents.
//!
//! Loading is lenient below the top level: a bad field is defaulted or
//! clamped, recorded as a [`FieldIssue`], and the rest of the document still
//! loads. Only unparsable JSON or a missing top-level section fails.

use std::fmt;
use std::path::Path;

use serde_json::{json, Map, Value};
use tracing::{debug, warn};

use crate::automation::VolumeAutomationCurve;
use crate::error::{ConfigError, ValidationError};
use crate::models::{
    Axis, ChannelState, Keyframe, DEFAULT_AMPLITUDE, DEFAULT_FREQUENCY, DEFAULT_MAX_FREQUENCY,
    DEFAULT_RECORDING_DURATION, MAX_CHANNELS, DEFAULT_CHANNEL_COUNT,
};
use crate::session::Session;

/// One field that could not be taken as written.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldIssue {
    pub path: String,
    pub message: String,
}

impl fmt::Display for FieldIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

impl From<ValidationError> for FieldIssue {
    fn from(e: ValidationError) -> Self {
        Self {
            path: e.field.clone(),
            message: format!("{} is out of range, clamped to {}", e.requested, e.applied),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LoadedSession {
    pub session: Session,
    pub issues: Vec<FieldIssue>,
}

#[derive(Default)]
struct Issues(Vec<FieldIssue>);

impl Issues {
    fn push(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.0.push(FieldIssue {
            path: path.into(),
            message: message.into(),
        });
    }

    fn clamped<I: IntoIterator<Item = ValidationError>>(&mut self, found: I) {
        self.0.extend(found.into_iter().map(FieldIssue::from));
    }

    fn get_f64(&mut self, obj: &Map<String, Value>, prefix: &str, key: &str, default: f64) -> f64 {
        match obj.get(key) {
            None => default,
            Some(v) => v.as_f64().unwrap_or_else(|| {
                self.push(format!("{prefix}.{key}"), format!("expected a number, using {default}"));
                default
            }),
        }
    }

    fn get_bool(
        &mut self,
        obj: &Map<String, Value>,
        prefix: &str,
        key: &str,
        default: bool,
    ) -> bool {
        match obj.get(key) {
            None => default,
            Some(v) => v.as_bool().unwrap_or_else(|| {
                self.push(
                    format!("{prefix}.{key}"),
                    format!("expected a boolean, using {default}"),
                );
                default
            }),
        }
    }
}

pub fn load_str(txt: &str) -> Result<LoadedSession, ConfigError> {
    let doc: Value = serde_json::from_str(txt)?;
    let root = doc.as_object().ok_or(ConfigError::WrongType("document"))?;
    let settings = root
        .get("app_settings")
        .ok_or(ConfigError::MissingSection("app_settings"))?
        .as_object()
        .ok_or(ConfigError::WrongType("app_settings"))?;
    let channels = root
        .get("channels")
        .ok_or(ConfigError::MissingSection("channels"))?
        .as_array()
        .ok_or(ConfigError::WrongType("channels"))?;

    let mut issues = Issues::default();
    let mut session = Session::new();

    let max_frequency =
        issues.get_f64(settings, "app_settings", "max_frequency", DEFAULT_MAX_FREQUENCY);
    issues.clamped(session.set_max_frequency(max_frequency));

    let count = issues.get_f64(
        settings,
        "app_settings",
        "displayed_channels",
        DEFAULT_CHANNEL_COUNT as f64,
    );
    // Fractional or negative counts are clamped by the session; round first.
    issues.clamped(session.set_channel_count(count.max(0.0).round() as usize));

    let duration = issues.get_f64(
        settings,
        "app_settings",
        "recording_duration",
        DEFAULT_RECORDING_DURATION,
    );
    issues.clamped(session.set_recording_duration(duration));

    for (i, entry) in channels.iter().enumerate() {
        let Some(obj) = entry.as_object() else {
            issues.push(format!("channels[{i}]"), "expected an object, skipped");
            continue;
        };
        let id = match obj.get("id") {
            None => i,
            Some(v) => match v.as_u64() {
                Some(id) if (id as usize) < MAX_CHANNELS => id as usize,
                _ => {
                    issues.push(
                        format!("channels[{i}].id"),
                        format!("{v} is not a channel slot, skipped"),
                    );
                    continue;
                }
            },
        };
        let channel = read_channel(&mut issues, obj, id, session.max_frequency());
        session.replace_channel(channel);
    }

    let automation = read_keyframes(&mut issues, settings, &session);
    session.replace_automation(automation);

    for issue in &issues.0 {
        warn!("{issue}");
    }
    Ok(LoadedSession {
        session,
        issues: issues.0,
    })
}

fn read_channel(
    issues: &mut Issues,
    obj: &Map<String, Value>,
    id: usize,
    max_frequency: f64,
) -> ChannelState {
    let prefix = format!("channels[{id}]");
    let mut ch = ChannelState::new(id);
    ch.active = issues.get_bool(obj, &prefix, "is_active", true);
    ch.isochronic_enabled = issues.get_bool(obj, &prefix, "is_iso_active", false);

    let hz = issues.get_f64(obj, &prefix, "frequency", DEFAULT_FREQUENCY);
    issues.clamped(ch.set_frequency(hz, max_frequency));
    let amplitude = issues.get_f64(obj, &prefix, "amplitude", DEFAULT_AMPLITUDE);
    issues.clamped(ch.set_amplitude(amplitude));
    let iso = issues.get_f64(obj, &prefix, "isochronic_frequency", 0.0);
    issues.clamped(ch.set_isochronic_frequency(iso));

    for (key, axis) in [("x_pos", Axis::X), ("y_pos", Axis::Y), ("z_pos", Axis::Z)] {
        let v = issues.get_f64(obj, &prefix, key, 0.0);
        issues.clamped(ch.set_axis(axis, v));
    }
    ch
}

fn read_keyframes(
    issues: &mut Issues,
    settings: &Map<String, Value>,
    session: &Session,
) -> VolumeAutomationCurve {
    let mut curve = VolumeAutomationCurve::new();
    let Some(raw) = settings.get("volume_keyframes") else {
        return curve;
    };
    let Some(list) = raw.as_array() else {
        issues.push("app_settings.volume_keyframes", "expected an array, ignored");
        return curve;
    };
    for (i, item) in list.iter().enumerate() {
        let pair = item
            .as_array()
            .filter(|p| p.len() == 2)
            .and_then(|p| Some((p[0].as_f64()?, p[1].as_f64()?)));
        let Some((time, level)) = pair else {
            issues.push(
                format!("app_settings.volume_keyframes[{i}]"),
                "expected [time, level], skipped",
            );
            continue;
        };
        let (kf, found) = session.validate_keyframe(Keyframe::new(time, level));
        issues.clamped(found);
        curve.insert(kf);
    }
    curve
}

pub fn load_file<P: AsRef<Path>>(path: P) -> Result<LoadedSession, ConfigError> {
    let path = path.as_ref();
    let txt = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    debug!("loading session from {}", path.display());
    load_str(&txt)
}

pub fn to_value(session: &Session) -> Value {
    let keyframes: Vec<Value> = session
        .automation()
        .keyframes()
        .iter()
        .map(|kf| json!([kf.time, kf.level]))
        .collect();
    let channels: Vec<Value> = session
        .channels()
        .iter()
        .map(|ch| {
            json!({
                "id": ch.id(),
                "is_active": ch.active,
                "frequency": ch.frequency,
                "amplitude": ch.amplitude,
                "is_iso_active": ch.isochronic_enabled,
                "isochronic_frequency": ch.isochronic_frequency,
                "x_pos": ch.position.x,
                "y_pos": ch.position.y,
                "z_pos": ch.position.z,
            })
        })
        .collect();
    json!({
        "app_settings": {
            "displayed_channels": session.channel_count(),
            "recording_duration": session.recording_duration(),
            "max_frequency": session.max_frequency(),
            "volume_keyframes": keyframes,
        },
        "channels": channels,
    })
}

pub fn save_string(session: &Session) -> Result<String, ConfigError> {
    Ok(serde_json::to_string_pretty(&to_value(session))?)
}

pub fn save_file<P: AsRef<Path>>(session: &Session, path: P) -> Result<(), ConfigError> {
    let path = path.as_ref();
    let txt = save_string(session)?;
    std::fs::write(path, txt).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    debug!("saved session to {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::Command;
    use crate::models::Position;

    #[test]
    fn save_then_load_restores_the_session() {
        let mut s = Session::new();
        s.apply(Command::SetChannelCount(6)).unwrap();
        s.apply(Command::SetRecordingDuration(30.0)).unwrap();
        s.apply(Command::SetFrequency { channel: 1, hz: 432.5 }).unwrap();
        s.apply(Command::SetIsochronicEnabled { channel: 1, enabled: true }).unwrap();
        s.apply(Command::SetIsochronicFrequency { channel: 1, hz: 7.5 }).unwrap();
        s.apply(Command::SetPosition { channel: 2, axis: Axis::X, value: -0.25 }).unwrap();
        s.apply(Command::SetActive { channel: 3, active: false }).unwrap();
        s.apply(Command::AddKeyframe(Keyframe::new(0.0, 0.0))).unwrap();
        s.apply(Command::AddKeyframe(Keyframe::new(15.0, 1.0))).unwrap();

        let txt = save_string(&s).unwrap();
        let loaded = load_str(&txt).unwrap();
        assert!(loaded.issues.is_empty(), "{:?}", loaded.issues);
        assert_eq!(loaded.session, s);
    }

    #[test]
    fn bad_fields_are_reported_individually() {
        let txt = r#"{
            "app_settings": {"displayed_channels": 3, "recording_duration": 10.0,
                             "volume_keyframes": [[2.0, 1.5], "oops", [20.0, 0.5]]},
            "channels": [
                {"id": 0, "frequency": "loud", "amplitude": 2.0},
                {"id": 1, "x_pos": 3.0, "is_active": 1},
                {"id": 44}
            ]
        }"#;
        let loaded = load_str(txt).unwrap();
        let paths: Vec<&str> = loaded.issues.iter().map(|i| i.path.as_str()).collect();
        assert!(paths.contains(&"channels[0].frequency"));
        assert!(paths.contains(&"channels[0].amplitude"));
        assert!(paths.contains(&"channels[1].x_pos"));
        assert!(paths.contains(&"channels[1].is_active"));
        assert!(paths.contains(&"channels[2].id"));
        assert!(paths.contains(&"app_settings.volume_keyframes[1]"));
        assert!(paths.contains(&"keyframe.level"));
        assert!(paths.contains(&"keyframe.time"));

        let s = &loaded.session;
        assert_eq!(s.channel(0).unwrap().frequency, DEFAULT_FREQUENCY);
        assert_eq!(s.channel(0).unwrap().amplitude, 1.0);
        assert_eq!(s.channel(1).unwrap().position, Position::new(1.0, 0.0, 0.0));
        assert!(s.channel(1).unwrap().active);
        assert_eq!(
            s.automation().keyframes(),
            &[Keyframe::new(2.0, 1.0), Keyframe::new(10.0, 0.5)]
        );
    }

    #[test]
    fn channels_absent_from_the_document_are_defaults() {
        let txt = r#"{"app_settings": {}, "channels": [{"id": 4, "frequency": 250.0}]}"#;
        let loaded = load_str(txt).unwrap();
        let s = &loaded.session;
        assert_eq!(s.channel(4).unwrap().frequency, 250.0);
        for id in (0..MAX_CHANNELS).filter(|&i| i != 4) {
            assert_eq!(s.channel(id).unwrap(), &ChannelState::new(id));
        }
        assert_eq!(s.channel_count(), DEFAULT_CHANNEL_COUNT);
    }

    #[test]
    fn structural_problems_fail() {
        assert!(matches!(load_str("{not json"), Err(ConfigError::Json(_))));
        assert!(matches!(
            load_str(r#"{"channels": []}"#),
            Err(ConfigError::MissingSection("app_settings"))
        ));
        assert!(matches!(
            load_str(r#"{"app_settings": {}}"#),
            Err(ConfigError::MissingSection("channels"))
        ));
        assert!(matches!(
            load_str(r#"{"app_settings": {}, "channels": {}}"#),
            Err(ConfigError::WrongType("channels"))
        ));
    }

    #[test]
    fn frequencies_respect_the_loaded_ceiling() {
        let txt = r#"{"app_settings": {"max_frequency": 800.0},
                      "channels": [{"id": 0, "frequency": 1200.0}]}"#;
        let loaded = load_str(txt).unwrap();
        assert_eq!(loaded.session.channel(0).unwrap().frequency, 800.0);
        assert_eq!(loaded.issues.len(), 1);
    }

    #[test]
    fn file_round_trip_and_missing_file() {
        let name = format!("entrainment_session_{}.json", std::process::id());
        let path = std::env::temp_dir().join(name);
        let s = Session::new();
        save_file(&s, &path).unwrap();
        assert_eq!(load_file(&path).unwrap().session, s);
        std::fs::remove_file(&path).ok();
        assert!(matches!(load_file(&path), Err(ConfigError::Io { .. })));
    }
}
