//! Wrapper around the `SwitchAudioSource` command-line helper.
//!
//! The helper reports devices as one JSON object per line when run with
//! `-f json`:
//!
//! ```text
//! {"name": "MacBook Pro Speakers", "type": "output", "id": "73", "uid": "BuiltInSpeakerDevice"}
//! ```

use std::path::{Path, PathBuf};
use std::process::Command;

use serde::Deserialize;
use thiserror::Error;

use soundgrabber_core::models::device::{AudioDevice, DeviceDirection};
use soundgrabber_core::models::error::DeviceError;

/// Device class understood by `-t`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceType {
    Input,
    Output,
}

impl DeviceType {
    pub fn as_arg(self) -> &'static str {
        match self {
            Self::Input => "input",
            Self::Output => "output",
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SwitchAudioError {
    #[error("failed to launch {}: {reason}", .program.display())]
    Launch { program: PathBuf, reason: String },

    #[error("SwitchAudioSource exited with status {status}: {stderr}")]
    Exit { status: i32, stderr: String },

    #[error("unparseable SwitchAudioSource output: {0}")]
    Parse(String),

    #[error("device not found: {0}")]
    UnknownDevice(String),
}

impl From<SwitchAudioError> for DeviceError {
    fn from(err: SwitchAudioError) -> Self {
        match err {
            SwitchAudioError::UnknownDevice(name) => DeviceError::NotFound(name),
            // Core Audio occasionally answers mid-reconfiguration with garbage.
            SwitchAudioError::Parse(_) => DeviceError::Transient(err.to_string()),
            other => DeviceError::Failed(other.to_string()),
        }
    }
}

/// One line of `SwitchAudioSource -f json` output.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct HelperDevice {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub id: Option<serde_json::Value>,
    #[serde(default)]
    pub uid: Option<String>,
}

impl HelperDevice {
    pub fn direction(&self) -> Option<DeviceDirection> {
        match self.kind.as_str() {
            "input" => Some(DeviceDirection::Input),
            "output" => Some(DeviceDirection::Output),
            _ => None,
        }
    }

    /// Stable identifier: the UID, or the numeric object id for helpers too
    /// old to print one, or the name as a last resort.
    pub fn stable_id(&self) -> String {
        if let Some(uid) = self.uid.as_deref().filter(|u| !u.is_empty()) {
            return uid.to_string();
        }
        match &self.id {
            Some(serde_json::Value::String(s)) if !s.is_empty() => s.clone(),
            Some(serde_json::Value::Number(n)) => n.to_string(),
            _ => self.name.clone(),
        }
    }
}

/// Parse `-f json` output. Blank lines are skipped; any other bad line fails
/// the whole parse.
pub fn parse_devices(output: &str) -> Result<Vec<HelperDevice>, SwitchAudioError> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| serde_json::from_str::<HelperDevice>(line).map_err(|e| SwitchAudioError::Parse(format!("{e}: {line}"))))
        .collect()
}

/// Fold input and output listings of the same device into one `AudioDevice`.
///
/// System-alert entries are dropped. Order of first appearance is kept.
pub fn merge_devices(entries: &[HelperDevice], is_aggregate: impl Fn(&str) -> bool) -> Vec<AudioDevice> {
    let mut devices: Vec<AudioDevice> = Vec::new();
    for entry in entries {
        let Some(direction) = entry.direction() else {
            continue;
        };
        let id = entry.stable_id();
        match devices.iter_mut().find(|d| d.id == id) {
            Some(existing) => existing.direction = existing.direction.merge(direction),
            None => {
                let mut device = AudioDevice::new(id.clone(), entry.name.clone(), direction);
                device.is_aggregate = is_aggregate(&id);
                devices.push(device);
            }
        }
    }
    devices
}

/// Runs the helper binary.
#[derive(Debug, Clone)]
pub struct SwitchAudio {
    program: PathBuf,
}

impl SwitchAudio {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self { program: program.into() }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// `SwitchAudioSource -a -f json`
    pub fn list(&self) -> Result<Vec<HelperDevice>, SwitchAudioError> {
        let output = self.run(&["-a", "-f", "json"])?;
        parse_devices(&output)
    }

    /// `SwitchAudioSource -c -t <type> -f json`
    pub fn current(&self, kind: DeviceType) -> Result<HelperDevice, SwitchAudioError> {
        let output = self.run(&["-c", "-t", kind.as_arg(), "-f", "json"])?;
        parse_devices(&output)?
            .into_iter()
            .next()
            .ok_or_else(|| SwitchAudioError::UnknownDevice(format!("no current {} device", kind.as_arg())))
    }

    /// `SwitchAudioSource -s <name> -t <type>`
    pub fn select(&self, name: &str, kind: DeviceType) -> Result<(), SwitchAudioError> {
        log::debug!("Switching {} device to \"{}\"", kind.as_arg(), name);
        match self.run(&["-s", name, "-t", kind.as_arg()]) {
            Ok(_) => Ok(()),
            Err(SwitchAudioError::Exit { stderr, .. }) if mentions_missing_device(&stderr) => {
                Err(SwitchAudioError::UnknownDevice(name.to_string()))
            }
            Err(e) => Err(e),
        }
    }

    fn run(&self, args: &[&str]) -> Result<String, SwitchAudioError> {
        let output = Command::new(&self.program)
            .args(args)
            .output()
            .map_err(|e| SwitchAudioError::Launch {
                program: self.program.clone(),
                reason: e.to_string(),
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(SwitchAudioError::Exit {
                status: output.status.code().unwrap_or(-1),
                stderr: if stderr.is_empty() { stdout.trim().to_string() } else { stderr },
            });
        }
        Ok(stdout)
    }
}

fn mentions_missing_device(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    lower.contains("could not find") || lower.contains("not found")
}

#[cfg(test)]
mod tests {
    use super::*;

    const LISTING: &str = r#"
{"name": "MacBook Pro Microphone", "type": "input", "id": "91", "uid": "BuiltInMicrophoneDevice"}
{"name": "BlackHole 2ch", "type": "input", "id": "64", "uid": "BlackHole2ch_UID"}
{"name": "MacBook Pro Speakers", "type": "output", "id": "84", "uid": "BuiltInSpeakerDevice"}
{"name": "BlackHole 2ch", "type": "output", "id": "64", "uid": "BlackHole2ch_UID"}
{"name": "SoundGrabber", "type": "output", "id": "120", "uid": "com.soundgrabber.aggregate.1234"}
{"name": "MacBook Pro Speakers", "type": "system", "id": "84", "uid": "BuiltInSpeakerDevice"}
"#;

    #[test]
    fn parses_json_lines() {
        let entries = parse_devices(LISTING).unwrap();
        assert_eq!(entries.len(), 6);
        assert_eq!(entries[0].name, "MacBook Pro Microphone");
        assert_eq!(entries[0].direction(), Some(DeviceDirection::Input));
        assert_eq!(entries[5].direction(), None);
    }

    #[test]
    fn merges_directions_by_uid() {
        let entries = parse_devices(LISTING).unwrap();
        let devices = merge_devices(&entries, |id| id.starts_with("com.soundgrabber.aggregate"));

        assert_eq!(devices.len(), 4);
        let blackhole = devices.iter().find(|d| d.id == "BlackHole2ch_UID").unwrap();
        assert_eq!(blackhole.direction, DeviceDirection::Both);
        assert!(!blackhole.is_aggregate);

        let speakers = devices.iter().find(|d| d.id == "BuiltInSpeakerDevice").unwrap();
        assert_eq!(speakers.direction, DeviceDirection::Output);

        let aggregate = devices.iter().find(|d| d.name == "SoundGrabber").unwrap();
        assert!(aggregate.is_aggregate);
    }

    #[test]
    fn falls_back_to_numeric_id_without_uid() {
        let entries = parse_devices(r#"{"name": "USB Audio", "type": "output", "id": 42}"#).unwrap();
        assert_eq!(entries[0].stable_id(), "42");

        let entries = parse_devices(r#"{"name": "USB Audio", "type": "output"}"#).unwrap();
        assert_eq!(entries[0].stable_id(), "USB Audio");
    }

    #[test]
    fn rejects_non_json_output() {
        let err = parse_devices("MacBook Pro Speakers (output)\n").unwrap_err();
        assert!(matches!(err, SwitchAudioError::Parse(_)));
        assert!(DeviceError::from(err).is_transient());
    }

    #[test]
    fn missing_device_messages_map_to_not_found() {
        assert!(mentions_missing_device("Could not find an audio device named \"Foo\""));
        assert!(!mentions_missing_device("permission denied"));
        assert_eq!(
            DeviceError::from(SwitchAudioError::UnknownDevice("Foo".into())),
            DeviceError::NotFound("Foo".into())
        );
    }

    #[test]
    fn launch_failure_is_not_transient() {
        let helper = SwitchAudio::new("/nonexistent/SwitchAudioSource");
        let err = helper.list().unwrap_err();
        assert!(matches!(err, SwitchAudioError::Launch { .. }));
        assert!(!DeviceError::from(err).is_transient());
    }
}
