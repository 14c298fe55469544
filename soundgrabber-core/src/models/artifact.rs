use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::audio_format::SampleFormat;

/// A finished recording on disk.
///
/// Serialized as the `.metadata.json` sidecar next to the audio file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordingArtifact {
    pub id: String,
    pub file_path: PathBuf,
    pub started_at: DateTime<Utc>,
    pub duration_secs: f64,
    pub byte_size: u64,
    pub frames: u64,
    pub sample_rate: u32,
    pub channels: u16,
    pub sample_format: SampleFormat,
    pub checksum: String,
    #[serde(default)]
    pub dropped_samples: u64,
}
