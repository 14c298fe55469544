use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::models::audio_format::StreamFormat;
use crate::models::error::CaptureError;

/// Summary of a finalized recording file.
#[derive(Debug, Clone, PartialEq)]
pub struct SinkSummary {
    pub path: PathBuf,
    pub frames: u64,
    pub byte_size: u64,
    pub sample_rate: u32,
    pub checksum: String,
}

/// Persists captured audio to a file. Replaceable encoder backend.
pub trait RecordingSink: Send {
    /// Create the file. Fails with `SinkOpenFailed(path)` when it cannot be written.
    fn open(&mut self, path: &Path, format: StreamFormat) -> Result<(), CaptureError>;

    /// Append interleaved samples in the format given to `open`.
    fn write(&mut self, samples: &[f32]) -> Result<(), CaptureError>;

    /// Flush and finalize. A sink with zero frames still produces a valid file.
    ///
    /// `actual_sample_rate` overrides the header rate when the device ran at a
    /// different rate than requested.
    fn close(&mut self, actual_sample_rate: Option<u32>) -> Result<SinkSummary, CaptureError>;

    /// Abandon the recording and remove the partial file.
    fn discard(&mut self);

    fn frames_written(&self) -> u64;
}

/// Creates a fresh sink for each recording.
pub type SinkFactory = Arc<dyn Fn() -> Box<dyn RecordingSink> + Send + Sync>;
