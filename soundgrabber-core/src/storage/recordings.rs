use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, TimeZone};

use crate::models::error::CaptureError;

/// Timestamp used in default recording names, e.g. `2024.Mar.05 - 14.03.27`.
pub const FILE_TIMESTAMP_FORMAT: &str = "%Y.%b.%d - %H.%M.%S";

/// `<folder>/<prefix><timestamp>.wav`
pub fn default_recording_path<Tz>(folder: &Path, prefix: &str, at: &DateTime<Tz>) -> PathBuf
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    folder.join(format!("{}{}.wav", prefix, at.format(FILE_TIMESTAMP_FORMAT)))
}

/// Most recently modified `<prefix>*.wav` in `folder`, if any.
pub fn last_recording(folder: &Path, prefix: &str) -> Result<Option<PathBuf>, CaptureError> {
    let entries = match fs::read_dir(folder) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(CaptureError::StorageError(format!(
                "failed to list {}: {}",
                folder.display(),
                e
            )))
        }
    };

    let mut newest: Option<(SystemTime, PathBuf)> = None;
    for entry in entries.flatten() {
        let path = entry.path();
        let is_match = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(|n| n.starts_with(prefix) && n.ends_with(".wav"))
            .unwrap_or(false);
        if !is_match {
            continue;
        }
        let Ok(modified) = entry.metadata().and_then(|m| m.modified()) else {
            continue;
        };
        if newest.as_ref().map_or(true, |(t, _)| modified > *t) {
            newest = Some((modified, path));
        }
    }
    Ok(newest.map(|(_, path)| path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::time::Duration;

    #[test]
    fn default_name_uses_timestamp_format() {
        let at = Utc.with_ymd_and_hms(2024, 3, 5, 14, 3, 27).unwrap();
        let path = default_recording_path(Path::new("/tmp/rec"), "recording_", &at);
        assert_eq!(path, PathBuf::from("/tmp/rec/recording_2024.Mar.05 - 14.03.27.wav"));
    }

    #[test]
    fn newest_matching_file_wins() {
        let dir = tempfile::tempdir().unwrap();
        let old = dir.path().join("recording_a.wav");
        let new = dir.path().join("recording_b.wav");
        fs::write(&old, b"x").unwrap();
        fs::write(&new, b"x").unwrap();
        fs::write(dir.path().join("other.wav"), b"x").unwrap();
        fs::write(dir.path().join("recording_c.metadata.json"), b"{}").unwrap();

        let earlier = SystemTime::now() - Duration::from_secs(3600);
        fs::File::options()
            .write(true)
            .open(&old)
            .unwrap()
            .set_modified(earlier)
            .unwrap();

        assert_eq!(last_recording(dir.path(), "recording_").unwrap(), Some(new));
    }

    #[test]
    fn missing_folder_has_no_recordings() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(last_recording(&dir.path().join("nope"), "recording_").unwrap(), None);
    }
}
