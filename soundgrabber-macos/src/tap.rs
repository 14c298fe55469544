//! Loopback tap: reads the loopback device's input stream through cpal.
//!
//! cpal streams are not `Send` on macOS, so the stream lives on its own
//! thread for its whole life. `start` waits for that thread to report whether
//! the stream came up.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use parking_lot::Mutex;

use soundgrabber_core::models::error::CaptureError;
use soundgrabber_core::traits::capture_provider::{AudioFrameCallback, CaptureProvider};

const START_TIMEOUT: Duration = Duration::from_secs(5);

/// Captures whatever is played into the loopback device.
pub struct LoopbackTap {
    device_name: String,
    running: Arc<AtomicBool>,
    capture_handle: Mutex<Option<thread::JoinHandle<()>>>,
}

impl LoopbackTap {
    pub fn new(device_name: impl Into<String>) -> Self {
        Self {
            device_name: device_name.into(),
            running: Arc::new(AtomicBool::new(false)),
            capture_handle: Mutex::new(None),
        }
    }
}

impl CaptureProvider for LoopbackTap {
    fn is_available(&self) -> bool {
        find_input_device(&self.device_name).is_ok()
    }

    fn check_permission(&self) -> Result<(), CaptureError> {
        crate::permissions::ensure_recording_access()
    }

    fn start(&mut self, callback: AudioFrameCallback) -> Result<(), CaptureError> {
        if self.running.load(Ordering::SeqCst) {
            return Err(CaptureError::ConfigurationFailed("loopback tap already running".into()));
        }
        self.join();

        self.running.store(true, Ordering::SeqCst);
        let running = Arc::clone(&self.running);
        let device_name = self.device_name.clone();
        let (started_tx, started_rx) = mpsc::channel();

        let handle = thread::Builder::new()
            .name("soundgrabber-tap".into())
            .spawn(move || {
                let stream = match open_stream(&device_name, callback, Arc::clone(&running)) {
                    Ok(stream) => stream,
                    Err(e) => {
                        running.store(false, Ordering::SeqCst);
                        let _ = started_tx.send(Err(e));
                        return;
                    }
                };
                let _ = started_tx.send(Ok(()));
                while running.load(Ordering::SeqCst) {
                    thread::sleep(Duration::from_millis(20));
                }
                drop(stream);
                log::debug!("Loopback stream on \"{}\" closed", device_name);
            })
            .map_err(|e| CaptureError::ConfigurationFailed(format!("failed to spawn tap thread: {e}")))?;
        *self.capture_handle.lock() = Some(handle);

        match started_rx.recv_timeout(START_TIMEOUT) {
            Ok(Ok(())) => {
                log::info!("Loopback tap started on \"{}\"", self.device_name);
                Ok(())
            }
            Ok(Err(e)) => {
                self.join();
                Err(e)
            }
            Err(_) => {
                self.running.store(false, Ordering::SeqCst);
                self.join();
                Err(CaptureError::DeviceNotAvailable)
            }
        }
    }

    fn stop(&mut self) -> Result<(), CaptureError> {
        self.running.store(false, Ordering::SeqCst);
        self.join();
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn device_name(&self) -> String {
        self.device_name.clone()
    }
}

impl LoopbackTap {
    fn join(&self) {
        if let Some(handle) = self.capture_handle.lock().take() {
            let _ = handle.join();
        }
    }
}

impl Drop for LoopbackTap {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        self.join();
    }
}

fn find_input_device(name: &str) -> Result<cpal::Device, CaptureError> {
    let host = cpal::default_host();
    let devices = host
        .input_devices()
        .map_err(|e| CaptureError::DeviceEnumerationFailed(e.to_string()))?;
    let mut fallback = None;
    for device in devices {
        let Ok(device_name) = device.name() else {
            continue;
        };
        if device_name == name {
            return Ok(device);
        }
        if fallback.is_none() && device_name.contains(name) {
            fallback = Some(device);
        }
    }
    fallback.ok_or(CaptureError::DeviceNotAvailable)
}

fn open_stream(
    device_name: &str,
    callback: AudioFrameCallback,
    running: Arc<AtomicBool>,
) -> Result<cpal::Stream, CaptureError> {
    let device = find_input_device(device_name)?;
    let supported = device.default_input_config().map_err(|e| map_stream_error(&e.to_string()))?;
    let sample_rate = supported.sample_rate().0;
    let channels = supported.channels();
    log::info!(
        "Loopback config - Sample rate: {}, Channels: {}, Format: {:?}",
        sample_rate,
        channels,
        supported.sample_format()
    );

    let config: cpal::StreamConfig = supported.config();
    let err_running = Arc::clone(&running);
    let on_error = move |err: cpal::StreamError| {
        log::error!("Loopback stream error: {}", err);
        err_running.store(false, Ordering::SeqCst);
    };

    let stream = match supported.sample_format() {
        cpal::SampleFormat::F32 => device.build_input_stream(
            &config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| callback(data, sample_rate, channels),
            on_error,
            None,
        ),
        cpal::SampleFormat::I16 => {
            let mut scratch = Vec::new();
            device.build_input_stream(
                &config,
                move |data: &[i16], _: &cpal::InputCallbackInfo| {
                    scratch.clear();
                    scratch.extend(data.iter().map(|&s| s as f32 / i16::MAX as f32));
                    callback(&scratch, sample_rate, channels);
                },
                on_error,
                None,
            )
        }
        other => {
            return Err(CaptureError::ConfigurationFailed(format!(
                "unsupported loopback sample format {other:?}"
            )))
        }
    }
    .map_err(|e| map_stream_error(&e.to_string()))?;

    stream.play().map_err(|e| map_stream_error(&e.to_string()))?;
    Ok(stream)
}

fn map_stream_error(message: &str) -> CaptureError {
    let lower = message.to_ascii_lowercase();
    if lower.contains("permission") || lower.contains("not permitted") {
        CaptureError::PermissionDenied
    } else if lower.contains("not available") || lower.contains("no longer available") {
        CaptureError::DeviceNotAvailable
    } else {
        CaptureError::ConfigurationFailed(message.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stream_errors_are_classified() {
        assert_eq!(
            map_stream_error("Operation not permitted (permission denied)"),
            CaptureError::PermissionDenied
        );
        assert_eq!(
            map_stream_error("The requested device is no longer available"),
            CaptureError::DeviceNotAvailable
        );
        assert!(matches!(
            map_stream_error("buffer size out of range"),
            CaptureError::ConfigurationFailed(_)
        ));
    }

    #[test]
    fn unknown_device_is_unavailable() {
        let tap = LoopbackTap::new("No Such Loopback Device 9000");
        assert!(!tap.is_available());
        assert!(!tap.is_running());
    }
}
