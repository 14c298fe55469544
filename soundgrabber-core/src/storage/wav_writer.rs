use std::fs::{self, File};
use std::io::{self, BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::models::audio_format::StreamFormat;
use crate::models::error::CaptureError;
use crate::processing::wav_format;
use crate::traits::recording_sink::{RecordingSink, SinkSummary};

/// Streaming WAV writer.
///
/// Owned by the writer thread while recording; protect with a `Mutex` when
/// shared. The header is written with zero sizes at open and patched at close.
///
/// ```text
/// [44-byte RIFF/WAVE header]
/// [interleaved little-endian samples...]
/// ```
pub struct WavFileWriter {
    path: Option<PathBuf>,
    format: StreamFormat,
    file: Option<BufWriter<File>>,
    data_bytes: u64,
    frames: u64,
    scratch: Vec<u8>,
}

impl WavFileWriter {
    pub fn new() -> Self {
        Self {
            path: None,
            format: StreamFormat::default(),
            file: None,
            data_bytes: 0,
            frames: 0,
            scratch: Vec::new(),
        }
    }

    pub fn is_open(&self) -> bool {
        self.file.is_some()
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Total bytes written so far, header included.
    pub fn bytes_written(&self) -> u64 {
        if self.path.is_some() {
            wav_format::WAV_HEADER_SIZE as u64 + self.data_bytes
        } else {
            0
        }
    }

    fn storage_error(context: &str, e: io::Error) -> CaptureError {
        CaptureError::StorageError(format!("{}: {}", context, e))
    }
}

impl Default for WavFileWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingSink for WavFileWriter {
    fn open(&mut self, path: &Path, format: StreamFormat) -> Result<(), CaptureError> {
        if self.is_open() {
            return Err(CaptureError::StorageError("writer is already open".into()));
        }
        format.validate().map_err(CaptureError::ConfigurationFailed)?;

        let fail = |e: io::Error| {
            log::error!("Cannot open recording file {}: {}", path.display(), e);
            CaptureError::SinkOpenFailed(path.to_path_buf())
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(fail)?;
        }
        let file = File::create(path).map_err(fail)?;
        let mut file = BufWriter::new(file);
        file.write_all(&wav_format::generate_wav_header(&format, 0))
            .map_err(fail)?;

        self.path = Some(path.to_path_buf());
        self.format = format;
        self.file = Some(file);
        self.data_bytes = 0;
        self.frames = 0;
        log::debug!("Opened {} ({:?})", path.display(), format);
        Ok(())
    }

    fn write(&mut self, samples: &[f32]) -> Result<(), CaptureError> {
        let file = self
            .file
            .as_mut()
            .ok_or_else(|| CaptureError::StorageError("file is not open for writing".into()))?;

        let channels = self.format.channels as usize;
        let whole = samples.len() - samples.len() % channels;
        if whole == 0 {
            return Ok(());
        }

        self.scratch.clear();
        wav_format::encode_samples(&samples[..whole], self.format.sample_format, &mut self.scratch);
        file.write_all(&self.scratch)
            .map_err(|e| Self::storage_error("write failed", e))?;

        self.data_bytes += self.scratch.len() as u64;
        self.frames += (whole / channels) as u64;
        Ok(())
    }

    fn close(&mut self, actual_sample_rate: Option<u32>) -> Result<SinkSummary, CaptureError> {
        let mut writer = self
            .file
            .take()
            .ok_or_else(|| CaptureError::StorageError("file is not open".into()))?;
        let path = self
            .path
            .clone()
            .ok_or_else(|| CaptureError::StorageError("file is not open".into()))?;

        let mut format = self.format;
        if let Some(rate) = actual_sample_rate.filter(|&r| r > 0 && r != format.sample_rate) {
            log::info!("Patching header sample rate {} -> {}", format.sample_rate, rate);
            format.sample_rate = rate;
        }

        let mut header = wav_format::generate_wav_header(&format, 0);
        if !wav_format::patch_sizes(&mut header, self.data_bytes) {
            log::warn!(
                "{}: {} bytes of audio exceed the WAV size limit; header records {} bytes",
                path.display(),
                self.data_bytes,
                wav_format::MAX_DATA_SIZE
            );
        }

        writer.flush().map_err(|e| Self::storage_error("flush failed", e))?;
        let mut file = writer
            .into_inner()
            .map_err(|e| Self::storage_error("flush failed", e.into_error()))?;
        file.seek(SeekFrom::Start(0))
            .and_then(|_| file.write_all(&header))
            .and_then(|_| file.sync_all())
            .map_err(|e| Self::storage_error("failed to finalize header", e))?;
        drop(file);

        let checksum = sha256_file(&path)?;
        let byte_size = wav_format::WAV_HEADER_SIZE as u64 + self.data_bytes;
        log::info!(
            "Finalized {} ({} frames, {} bytes)",
            path.display(),
            self.frames,
            byte_size
        );

        Ok(SinkSummary {
            path,
            frames: self.frames,
            byte_size,
            sample_rate: format.sample_rate,
            checksum,
        })
    }

    fn discard(&mut self) {
        self.file = None;
        if let Some(path) = self.path.take() {
            match fs::remove_file(&path) {
                Ok(()) => log::info!("Removed partial recording {}", path.display()),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => log::warn!("Failed to remove {}: {}", path.display(), e),
            }
        }
        self.data_bytes = 0;
        self.frames = 0;
    }

    fn frames_written(&self) -> u64 {
        self.frames
    }
}

/// SHA-256 hex digest of a file, streamed.
pub fn sha256_file(path: &Path) -> Result<String, CaptureError> {
    let mut file = File::open(path).map_err(|e| WavFileWriter::storage_error("failed to read file for checksum", e))?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)
        .map_err(|e| WavFileWriter::storage_error("failed to read file for checksum", e))?;
    Ok(hex_encode(&hasher.finalize()))
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}
