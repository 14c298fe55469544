use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::audio_format::{SampleFormat, StreamFormat};
use crate::processing::frame_queue::MAX_QUEUE_SECS;

/// Sample rates the loopback driver is known to run at.
pub const SUPPORTED_SAMPLE_RATES: [u32; 2] = [44100, 48000];

pub const DEFAULT_SAMPLE_RATE: u32 = 48000;

/// Upper bound for `buffer_secs`.
pub const MAX_BUFFER_SECS: f64 = MAX_QUEUE_SECS;

/// User-editable application settings (`settings.toml`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Directory new recordings are written to (default: Desktop).
    pub output_folder: PathBuf,

    /// File-name prefix for recordings, also used to find the last one.
    pub file_prefix: String,

    /// Capture sample rate in Hz. Only 44100 and 48000 are accepted.
    pub sample_rate: u32,

    /// Channels written to the file (1 or 2).
    pub channels: u16,

    pub sample_format: SampleFormat,

    /// Name of the virtual loopback device to tap.
    pub loopback_device: String,

    /// Name given to the aggregate (multi-output) device created while recording.
    pub aggregate_name: String,

    /// Seconds of audio the capture queue holds before dropping the oldest frames.
    pub buffer_secs: f64,

    /// Directory for durable state (the in-flight routing plan).
    pub state_dir: PathBuf,

    pub dependencies: DependencySettings,
}

/// Where dependencies live and how to install them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DependencySettings {
    /// Executable name of the device switch helper.
    pub helper_name: String,

    /// Known install locations checked before falling back to `PATH`.
    pub helper_search_paths: Vec<PathBuf>,

    /// Installed driver bundle; its `Info.plist` carries the driver version.
    pub driver_bundle: PathBuf,

    /// Driver installer package shipped with the app.
    pub driver_package: PathBuf,

    /// Helper binary shipped with the app.
    pub helper_binary: PathBuf,

    /// Directory the helper is copied into.
    pub helper_install_dir: PathBuf,

    /// Run installer steps through an administrator-privileges prompt.
    pub elevate: bool,

    /// Open the driver package in Installer.app instead of installing headlessly.
    pub interactive_driver_install: bool,
}

impl Settings {
    pub fn validate(&self) -> Result<(), String> {
        if !SUPPORTED_SAMPLE_RATES.contains(&self.sample_rate) {
            return Err(format!(
                "unsupported sample rate {} (supported: 44100, 48000)",
                self.sample_rate
            ));
        }
        self.stream_format().validate()?;
        if !self.buffer_secs.is_finite() || self.buffer_secs <= 0.0 || self.buffer_secs > MAX_BUFFER_SECS {
            return Err(format!(
                "buffer_secs must be between 0 and {} seconds, got {}",
                MAX_BUFFER_SECS, self.buffer_secs
            ));
        }
        if self.loopback_device.trim().is_empty() {
            return Err("loopback_device must not be empty".into());
        }
        if self.aggregate_name.trim().is_empty() {
            return Err("aggregate_name must not be empty".into());
        }
        Ok(())
    }

    /// Repair values the app can recover from instead of refusing to start.
    ///
    /// An unsupported sample rate falls back to 48000, `~` in paths is expanded.
    pub fn normalized(mut self) -> Self {
        if !SUPPORTED_SAMPLE_RATES.contains(&self.sample_rate) {
            log::warn!(
                "Unsupported sample rate: {}. Using default {}.",
                self.sample_rate,
                DEFAULT_SAMPLE_RATE
            );
            self.sample_rate = DEFAULT_SAMPLE_RATE;
        }
        self.output_folder = expand_home(&self.output_folder);
        self.state_dir = expand_home(&self.state_dir);
        self
    }

    pub fn stream_format(&self) -> StreamFormat {
        StreamFormat::new(self.sample_rate, self.channels, self.sample_format)
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            output_folder: dirs_next::desktop_dir().unwrap_or_else(|| PathBuf::from(".")),
            file_prefix: "recording_".into(),
            sample_rate: DEFAULT_SAMPLE_RATE,
            channels: 2,
            sample_format: SampleFormat::Float32,
            loopback_device: "BlackHole 2ch".into(),
            aggregate_name: "SoundGrabber".into(),
            buffer_secs: 5.0,
            state_dir: dirs_next::data_dir()
                .map(|d| d.join("SoundGrabber"))
                .unwrap_or_else(|| PathBuf::from(".soundgrabber")),
            dependencies: DependencySettings::default(),
        }
    }
}

impl Default for DependencySettings {
    fn default() -> Self {
        Self {
            helper_name: "SwitchAudioSource".into(),
            helper_search_paths: vec![
                PathBuf::from("/usr/local/bin/SwitchAudioSource"),
                PathBuf::from("/opt/homebrew/bin/SwitchAudioSource"),
                PathBuf::from("/usr/bin/SwitchAudioSource"),
            ],
            driver_bundle: PathBuf::from("/Library/Audio/Plug-Ins/HAL/BlackHole2ch.driver"),
            driver_package: PathBuf::from("installers/BlackHole2ch-0.6.0.pkg"),
            helper_binary: PathBuf::from("installers/SwitchAudioSource"),
            helper_install_dir: PathBuf::from("/usr/local/bin"),
            elevate: true,
            interactive_driver_install: false,
        }
    }
}

/// Expand a leading `~` to the user's home directory.
pub fn expand_home(path: &Path) -> PathBuf {
    let Ok(rest) = path.strip_prefix("~") else {
        return path.to_path_buf();
    };
    match dirs_next::home_dir() {
        Some(home) => home.join(rest),
        None => path.to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let settings = Settings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.stream_format().sample_format, SampleFormat::Float32);
    }

    #[test]
    fn unsupported_rate_falls_back() {
        let settings = Settings {
            sample_rate: 96000,
            ..Default::default()
        };
        assert!(settings.validate().is_err());

        let normalized = settings.normalized();
        assert_eq!(normalized.sample_rate, 48000);
        assert!(normalized.validate().is_ok());
    }

    #[test]
    fn buffer_length_must_be_finite_and_bounded() {
        for buffer_secs in [f64::INFINITY, f64::NAN, -1.0, 0.0, MAX_BUFFER_SECS + 1.0] {
            let settings = Settings {
                buffer_secs,
                ..Default::default()
            };
            assert!(settings.validate().is_err(), "buffer_secs {buffer_secs} accepted");
        }
        let settings = Settings {
            buffer_secs: MAX_BUFFER_SECS,
            ..Default::default()
        };
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn blank_loopback_name_rejected() {
        let settings = Settings {
            loopback_device: "  ".into(),
            ..Default::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn tilde_is_expanded() {
        let expanded = expand_home(Path::new("~/Desktop"));
        if dirs_next::home_dir().is_some() {
            assert!(!expanded.starts_with("~"));
            assert!(expanded.ends_with("Desktop"));
        }
        assert_eq!(expand_home(Path::new("/tmp/x")), PathBuf::from("/tmp/x"));
    }
}
