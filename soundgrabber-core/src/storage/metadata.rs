use std::fs;
use std::path::{Path, PathBuf};

use crate::models::artifact::RecordingArtifact;
use crate::models::error::CaptureError;

/// Sidecar path for a recording: `take.wav` -> `take.metadata.json`.
pub fn metadata_path(recording_path: &Path) -> PathBuf {
    recording_path.with_extension("metadata.json")
}

/// Write recording metadata as a JSON sidecar next to the recording.
pub fn write_metadata(artifact: &RecordingArtifact) -> Result<PathBuf, CaptureError> {
    let path = metadata_path(&artifact.file_path);
    let json = serde_json::to_string_pretty(artifact)
        .map_err(|e| CaptureError::StorageError(format!("failed to serialize metadata: {}", e)))?;
    fs::write(&path, json).map_err(|e| CaptureError::StorageError(format!("failed to write metadata: {}", e)))?;
    Ok(path)
}

/// Read recording metadata from a JSON sidecar.
pub fn read_metadata(recording_path: &Path) -> Result<RecordingArtifact, CaptureError> {
    let json = fs::read_to_string(metadata_path(recording_path))
        .map_err(|e| CaptureError::StorageError(format!("failed to read metadata: {}", e)))?;
    serde_json::from_str(&json).map_err(|e| CaptureError::StorageError(format!("failed to parse metadata: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::audio_format::SampleFormat;
    use chrono::Utc;

    #[test]
    fn sidecar_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let artifact = RecordingArtifact {
            id: "a1".into(),
            file_path: dir.path().join("take.wav"),
            started_at: Utc::now(),
            duration_secs: 2.0,
            byte_size: 768_044,
            frames: 96_000,
            sample_rate: 48000,
            channels: 2,
            sample_format: SampleFormat::Float32,
            checksum: "ab".repeat(32),
            dropped_samples: 0,
        };

        let written = write_metadata(&artifact).unwrap();
        assert_eq!(written, dir.path().join("take.metadata.json"));
        assert_eq!(read_metadata(&artifact.file_path).unwrap(), artifact);
    }

    #[test]
    fn missing_sidecar_is_storage_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = read_metadata(&dir.path().join("none.wav")).unwrap_err();
        assert!(matches!(err, CaptureError::StorageError(_)));
    }
}
