//! `settings.toml` discovery, loading, and first-run initialization.

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::models::config::Settings;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("Failed to write config file {path}: {message}")]
    Write { path: PathBuf, message: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// `<config_dir>/soundgrabber/settings.toml`, or `./soundgrabber.toml` when
/// the platform has no config directory.
pub fn default_settings_path() -> PathBuf {
    dirs_next::config_dir()
        .map(|d| d.join("soundgrabber").join("settings.toml"))
        .unwrap_or_else(|| PathBuf::from("soundgrabber.toml"))
}

/// Load settings from `path`. Missing keys take their defaults.
pub fn load_from_file(path: &Path) -> Result<Settings, ConfigError> {
    let contents = fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
        path: path.to_path_buf(),
        source: e,
    })?;
    parse_settings(&contents, path)
}

fn parse_settings(contents: &str, path: &Path) -> Result<Settings, ConfigError> {
    let settings: Settings = toml::from_str(contents).map_err(|e| ConfigError::Parse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    let settings = settings.normalized();
    settings.validate().map_err(ConfigError::Invalid)?;
    Ok(settings)
}

/// Write `settings` to `path`, creating the parent directory.
pub fn save(settings: &Settings, path: &Path) -> Result<(), ConfigError> {
    let write_err = |message: String| ConfigError::Write {
        path: path.to_path_buf(),
        message,
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| write_err(e.to_string()))?;
    }
    let contents = toml::to_string_pretty(settings).map_err(|e| write_err(e.to_string()))?;
    fs::write(path, contents).map_err(|e| write_err(e.to_string()))
}

/// Load settings, writing the defaults out first if the file does not exist.
pub fn load_or_init(path: &Path) -> Result<Settings, ConfigError> {
    if !path.exists() {
        let settings = Settings::default();
        save(&settings, path)?;
        log::info!("Created default settings at {}", path.display());
        return Ok(settings.normalized());
    }
    let settings = load_from_file(path)?;
    log::debug!("Loaded settings from {}", path.display());
    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::audio_format::SampleFormat;

    #[test]
    fn missing_file_writes_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("soundgrabber/settings.toml");

        let settings = load_or_init(&path).unwrap();
        assert!(path.exists());
        assert_eq!(settings.sample_rate, 48000);

        let reloaded = load_or_init(&path).unwrap();
        assert_eq!(reloaded, settings);
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.toml");
        fs::write(
            &path,
            "sample_rate = 44100\nsample_format = \"int16\"\n\n[dependencies]\nelevate = false\n",
        )
        .unwrap();

        let settings = load_from_file(&path).unwrap();
        assert_eq!(settings.sample_rate, 44100);
        assert_eq!(settings.sample_format, SampleFormat::Int16);
        assert!(!settings.dependencies.elevate);
        assert_eq!(settings.loopback_device, "BlackHole 2ch");
        assert_eq!(settings.dependencies.helper_name, "SwitchAudioSource");
    }

    #[test]
    fn unsupported_rate_falls_back_on_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.toml");
        fs::write(&path, "sample_rate = 22050\n").unwrap();

        assert_eq!(load_from_file(&path).unwrap().sample_rate, 48000);
    }

    #[test]
    fn malformed_file_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.toml");
        fs::write(&path, "sample_rate = [").unwrap();

        assert!(matches!(load_from_file(&path), Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn invalid_channel_count_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.toml");
        fs::write(&path, "channels = 6\n").unwrap();

        assert!(matches!(load_from_file(&path), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn non_finite_buffer_length_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.toml");
        for literal in ["inf", "nan", "1e9"] {
            fs::write(&path, format!("buffer_secs = {literal}\n")).unwrap();
            assert!(
                matches!(load_from_file(&path), Err(ConfigError::Invalid(_))),
                "buffer_secs = {literal} accepted"
            );
        }
    }

    #[test]
    fn unreadable_file_is_read_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            load_from_file(&dir.path().join("absent.toml")),
            Err(ConfigError::FileRead { .. })
        ));
    }
}
