use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::Mutex;

use crate::models::error::CaptureError;
use crate::traits::capture_provider::{AudioFrameCallback, CaptureProvider};

/// Frames per injected chunk (10 ms at 48 kHz).
const CHUNK_FRAMES: usize = 480;

struct TapInner {
    sample_rate: u32,
    channels: u16,
    realtime: bool,
    callback: Mutex<Option<AudioFrameCallback>>,
    running: AtomicBool,
    fail_next_start: Mutex<Option<CaptureError>>,
    permission_denied: AtomicBool,
    feeder: Mutex<Option<JoinHandle<()>>>,
    starts: AtomicU64,
}

/// Loopback tap driven by the test (or by a silence feeder thread).
///
/// Clones share state, so a test can keep a handle after moving the tap into
/// a session.
#[derive(Clone)]
pub struct SimulatedTap {
    inner: Arc<TapInner>,
}

impl SimulatedTap {
    pub fn new(sample_rate: u32, channels: u16) -> Self {
        Self::build(sample_rate, channels, false)
    }

    /// A tap that feeds itself silence in real time while running.
    pub fn realtime_silence(sample_rate: u32, channels: u16) -> Self {
        Self::build(sample_rate, channels, true)
    }

    fn build(sample_rate: u32, channels: u16, realtime: bool) -> Self {
        Self {
            inner: Arc::new(TapInner {
                sample_rate,
                channels,
                realtime,
                callback: Mutex::new(None),
                running: AtomicBool::new(false),
                fail_next_start: Mutex::new(None),
                permission_denied: AtomicBool::new(false),
                feeder: Mutex::new(None),
                starts: AtomicU64::new(0),
            }),
        }
    }

    /// Deliver `samples` to the session. Returns false when the tap is not running.
    pub fn inject(&self, samples: &[f32]) -> bool {
        self.inner.deliver(samples)
    }

    /// Deliver `seconds` of silence in 10 ms chunks.
    pub fn inject_silence(&self, seconds: f64) -> bool {
        let total_frames = (seconds * self.inner.sample_rate as f64).round() as usize;
        let channels = self.inner.channels as usize;
        let chunk = vec![0.0f32; CHUNK_FRAMES * channels];

        let mut remaining = total_frames;
        while remaining > 0 {
            let frames = remaining.min(CHUNK_FRAMES);
            if !self.inject(&chunk[..frames * channels]) {
                return false;
            }
            remaining -= frames;
        }
        true
    }

    /// Make the next `start` fail with `error`.
    pub fn fail_next_start(&self, error: CaptureError) {
        *self.inner.fail_next_start.lock() = Some(error);
    }

    /// The user refused audio recording access.
    pub fn deny_permission(&self) {
        self.inner.permission_denied.store(true, Ordering::SeqCst);
    }

    /// The device vanished: the stream dies without `stop` being called.
    pub fn interrupt(&self) {
        self.inner.running.store(false, Ordering::SeqCst);
    }

    pub fn start_count(&self) -> u64 {
        self.inner.starts.load(Ordering::SeqCst)
    }
}

impl TapInner {
    fn deliver(&self, samples: &[f32]) -> bool {
        if !self.running.load(Ordering::SeqCst) {
            return false;
        }
        let Some(callback) = self.callback.lock().clone() else {
            return false;
        };
        callback(samples, self.sample_rate, self.channels);
        true
    }
}

impl CaptureProvider for SimulatedTap {
    fn is_available(&self) -> bool {
        true
    }

    fn check_permission(&self) -> Result<(), CaptureError> {
        if self.inner.permission_denied.load(Ordering::SeqCst) {
            return Err(CaptureError::PermissionDenied);
        }
        Ok(())
    }

    fn start(&mut self, callback: AudioFrameCallback) -> Result<(), CaptureError> {
        if let Some(error) = self.inner.fail_next_start.lock().take() {
            return Err(error);
        }
        *self.inner.callback.lock() = Some(callback);
        self.inner.running.store(true, Ordering::SeqCst);
        self.inner.starts.fetch_add(1, Ordering::SeqCst);

        if self.inner.realtime {
            let inner = Arc::clone(&self.inner);
            let handle = thread::Builder::new()
                .name("soundgrabber-sim-tap".into())
                .spawn(move || {
                    let chunk = vec![0.0f32; CHUNK_FRAMES * inner.channels as usize];
                    let period = Duration::from_secs_f64(CHUNK_FRAMES as f64 / inner.sample_rate as f64);
                    while inner.deliver(&chunk) {
                        thread::sleep(period);
                    }
                })
                .map_err(|e| CaptureError::StorageError(format!("failed to spawn tap thread: {}", e)))?;
            *self.inner.feeder.lock() = Some(handle);
        }
        Ok(())
    }

    fn stop(&mut self) -> Result<(), CaptureError> {
        self.inner.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.inner.feeder.lock().take() {
            let _ = handle.join();
        }
        *self.inner.callback.lock() = None;
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    fn device_name(&self) -> String {
        super::simulated::SIM_LOOPBACK.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn delivers_only_while_running() {
        let mut tap = SimulatedTap::new(48000, 2);
        let received = Arc::new(AtomicUsize::new(0));
        assert!(!tap.inject(&[0.0, 0.0]));

        let counter = received.clone();
        tap.start(Arc::new(move |samples: &[f32], rate: u32, channels: u16| {
            assert_eq!((rate, channels), (48000, 2));
            counter.fetch_add(samples.len(), Ordering::SeqCst);
        }))
        .unwrap();

        assert!(tap.inject_silence(0.1));
        assert_eq!(received.load(Ordering::SeqCst), 4800 * 2);

        tap.stop().unwrap();
        assert!(!tap.inject(&[0.0, 0.0]));
    }

    #[test]
    fn scripted_start_failure_fires_once() {
        let mut tap = SimulatedTap::new(48000, 2);
        tap.fail_next_start(CaptureError::PermissionDenied);

        assert_eq!(tap.start(Arc::new(|_: &[f32], _: u32, _: u16| {})), Err(CaptureError::PermissionDenied));
        assert!(tap.start(Arc::new(|_: &[f32], _: u32, _: u16| {})).is_ok());
        assert_eq!(tap.start_count(), 1);
    }

    #[test]
    fn denied_permission_is_sticky() {
        let tap = SimulatedTap::new(48000, 2);
        assert!(tap.check_permission().is_ok());

        tap.deny_permission();
        assert_eq!(tap.check_permission(), Err(CaptureError::PermissionDenied));
        assert_eq!(tap.check_permission(), Err(CaptureError::PermissionDenied));
    }

    #[test]
    fn interrupt_stops_reporting_running() {
        let mut tap = SimulatedTap::new(44100, 1);
        tap.start(Arc::new(|_: &[f32], _: u32, _: u16| {})).unwrap();
        tap.interrupt();
        assert!(!tap.is_running());
    }
}
