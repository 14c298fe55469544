use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};

use crate::dependencies::probe::DependencyProbe;
use crate::models::artifact::RecordingArtifact;
use crate::models::audio_format::StreamFormat;
use crate::models::dependency::missing_required;
use crate::models::error::CaptureError;
use crate::models::routing_plan::RoutingPlan;
use crate::models::state::{SessionDiagnostics, SessionState};
use crate::processing::frame_queue::FrameQueue;
use crate::processing::wav_format;
use crate::routing::cancel::CancelToken;
use crate::routing::controller::RoutingController;
use crate::storage::metadata;
use crate::traits::capture_provider::{AudioFrameCallback, CaptureProvider};
use crate::traits::device_registry::AudioDeviceRegistry;
use crate::traits::recording_sink::{RecordingSink, SinkFactory};
use crate::traits::session_delegate::SessionDelegate;

/// How often the writer thread drains the frame queue into the sink.
const WRITE_INTERVAL: Duration = Duration::from_millis(50);

type SharedSink = Arc<Mutex<Option<Box<dyn RecordingSink>>>>;

/// Mutable session state shared with the tap callback and the writer thread.
struct SharedState {
    state: SessionState,
    /// Set while a `start` is in flight so `stop` can cancel it.
    cancel: Option<CancelToken>,
    diagnostics: SessionDiagnostics,
    /// Rate the tap actually delivered, when it differs from the requested one.
    detected_rate: Option<u32>,
}

impl SharedState {
    fn new() -> Self {
        Self {
            state: SessionState::Idle,
            cancel: None,
            diagnostics: SessionDiagnostics::default(),
            detected_rate: None,
        }
    }
}

/// Resources held for the lifetime of one recording.
struct ActiveRecording {
    id: String,
    plan: RoutingPlan,
    path: PathBuf,
    started_at: DateTime<Utc>,
    writer_running: Arc<AtomicBool>,
    writer_handle: Option<thread::JoinHandle<()>>,
}

/// What a finished (or aborted) recording produced.
struct Finish {
    artifact: Option<RecordingArtifact>,
    error: Option<CaptureError>,
}

/// One recording at a time, from dependency check to restored routing.
///
/// ```text
/// [Loopback tap] → callback → [FrameQueue] → writer thread (50ms) → [RecordingSink]
/// ```
///
/// `start` and `stop` block and must be called off any UI thread. The tap
/// callback never touches the file; only the writer thread does.
pub struct CaptureSession<R: AudioDeviceRegistry, P: CaptureProvider> {
    routing: Arc<RoutingController<R>>,
    probe: DependencyProbe,
    tap: Mutex<P>,
    sink_factory: SinkFactory,
    format: StreamFormat,
    buffer_secs: f64,

    shared: Arc<Mutex<SharedState>>,
    queue: Arc<Mutex<FrameQueue>>,
    sink: SharedSink,
    active: Mutex<Option<ActiveRecording>>,
    delegate: RwLock<Option<Arc<dyn SessionDelegate>>>,
}

impl<R: AudioDeviceRegistry, P: CaptureProvider> CaptureSession<R, P> {
    pub fn new(
        routing: Arc<RoutingController<R>>,
        probe: DependencyProbe,
        tap: P,
        sink_factory: SinkFactory,
        format: StreamFormat,
        buffer_secs: f64,
    ) -> Self {
        Self {
            routing,
            probe,
            tap: Mutex::new(tap),
            sink_factory,
            format,
            buffer_secs,
            shared: Arc::new(Mutex::new(SharedState::new())),
            queue: Arc::new(Mutex::new(FrameQueue::new(1, format.channels))),
            sink: Arc::new(Mutex::new(None)),
            active: Mutex::new(None),
            delegate: RwLock::new(None),
        }
    }

    pub fn set_delegate(&self, delegate: Arc<dyn SessionDelegate>) {
        *self.delegate.write() = Some(delegate);
    }

    pub fn state(&self) -> SessionState {
        self.shared.lock().state.clone()
    }

    pub fn diagnostics(&self) -> SessionDiagnostics {
        self.shared.lock().diagnostics.clone()
    }

    pub fn format(&self) -> StreamFormat {
        self.format
    }

    pub fn routing(&self) -> &Arc<RoutingController<R>> {
        &self.routing
    }

    pub fn probe(&self) -> &DependencyProbe {
        &self.probe
    }

    /// Path of the file being recorded, if any.
    pub fn recording_path(&self) -> Option<PathBuf> {
        self.active.lock().as_ref().map(|a| a.path.clone())
    }

    /// Check dependencies, route audio, open `path` and start tapping.
    ///
    /// Transitions: idle/failed → checking dependencies → routing → recording.
    /// On any failure nothing is left behind: routing is restored and a
    /// partially written file is removed.
    pub fn start(&self, path: &Path) -> Result<(), CaptureError> {
        let cancel = CancelToken::new();
        {
            let mut shared = self.shared.lock();
            if !shared.state.can_start() {
                return Err(CaptureError::AlreadyActive);
            }
            shared.state = SessionState::CheckingDependencies;
            shared.cancel = Some(cancel.clone());
            shared.diagnostics = SessionDiagnostics::default();
            shared.detected_rate = None;
        }
        self.notify_state(&SessionState::CheckingDependencies);

        match self.start_inner(path, &cancel) {
            Ok(()) => Ok(()),
            Err(e) => {
                let end_state = if e == CaptureError::Cancelled {
                    log::info!("Start cancelled; routing unwound");
                    SessionState::Idle
                } else {
                    log::error!("Failed to start recording: {}", e);
                    SessionState::Failed(e.clone())
                };
                {
                    let mut shared = self.shared.lock();
                    shared.state = end_state.clone();
                    shared.cancel = None;
                }
                self.notify_state(&end_state);
                if e != CaptureError::Cancelled {
                    self.notify_error(&e);
                }
                Err(e)
            }
        }
    }

    fn start_inner(&self, path: &Path, cancel: &CancelToken) -> Result<(), CaptureError> {
        let report = self.probe.check_all(self.routing.registry());
        let missing = missing_required(&report);
        if !missing.is_empty() {
            return Err(CaptureError::DependencyMissing(missing));
        }
        self.tap.lock().check_permission()?;

        // Sized before any routing change.
        *self.queue.lock() = FrameQueue::for_duration(self.buffer_secs, self.format.sample_rate, self.format.channels);

        cancel.check()?;
        self.set_state(SessionState::Routing);
        let plan = self.routing.begin_routing(cancel)?;

        if let Err(e) = self.open_and_tap(path, &plan, cancel) {
            if let Err(restore) = self.routing.end_routing(&plan) {
                log::error!("Restoring routing after failed start: {}", restore);
            }
            return Err(e);
        }
        Ok(())
    }

    fn open_and_tap(&self, path: &Path, plan: &RoutingPlan, cancel: &CancelToken) -> Result<(), CaptureError> {
        let mut sink = (self.sink_factory)();
        sink.open(path, self.format)?;
        *self.sink.lock() = Some(sink);

        if let Err(e) = self.tap.lock().start(self.frame_callback()) {
            self.discard_sink();
            return Err(e);
        }

        let writer_running = Arc::new(AtomicBool::new(true));
        let writer_handle = match self.spawn_writer(Arc::clone(&writer_running)) {
            Ok(handle) => handle,
            Err(e) => {
                self.stop_tap();
                self.discard_sink();
                return Err(e);
            }
        };

        *self.active.lock() = Some(ActiveRecording {
            id: uuid::Uuid::new_v4().to_string(),
            plan: plan.clone(),
            path: path.to_path_buf(),
            started_at: Utc::now(),
            writer_running,
            writer_handle: Some(writer_handle),
        });

        // Commit under the state lock: a concurrent stop either sees Recording
        // or has already set the cancel flag checked here.
        {
            let mut shared = self.shared.lock();
            if cancel.is_cancelled() {
                drop(shared);
                self.abort_recording();
                return Err(CaptureError::Cancelled);
            }
            shared.state = SessionState::Recording { duration_secs: 0.0 };
            shared.cancel = None;
        }
        self.notify_state(&SessionState::Recording { duration_secs: 0.0 });
        log::info!(
            "Recording {} from '{}' to {}",
            plan.id,
            self.tap.lock().device_name(),
            path.display()
        );
        Ok(())
    }

    /// Tap callback: adapt channels, queue, count. Never blocks on I/O.
    fn frame_callback(&self) -> AudioFrameCallback {
        let queue = Arc::clone(&self.queue);
        let shared = Arc::clone(&self.shared);
        let requested = self.format;

        Arc::new(move |samples: &[f32], sample_rate: u32, channels: u16| {
            let adapted = wav_format::adapt_channels(samples, channels, requested.channels);
            let dropped = queue.lock().push(&adapted);

            let mut s = shared.lock();
            s.diagnostics.callback_count += 1;
            s.diagnostics.samples_received += adapted.len() as u64;
            s.diagnostics.samples_dropped += dropped as u64;
            if sample_rate != requested.sample_rate && s.detected_rate != Some(sample_rate) {
                log::warn!(
                    "Tap delivers {} Hz, requested {} Hz; header will be patched",
                    sample_rate,
                    requested.sample_rate
                );
                s.detected_rate = Some(sample_rate);
            }
        })
    }

    fn spawn_writer(&self, running: Arc<AtomicBool>) -> Result<thread::JoinHandle<()>, CaptureError> {
        let queue = Arc::clone(&self.queue);
        let sink = Arc::clone(&self.sink);
        let shared = Arc::clone(&self.shared);
        let format = self.format;

        thread::Builder::new()
            .name("soundgrabber-writer".into())
            .spawn(move || {
                while running.load(Ordering::SeqCst) {
                    thread::sleep(WRITE_INTERVAL);
                    drain_queue(&queue, &sink, &shared, format);
                }
            })
            .map_err(|e| CaptureError::StorageError(format!("failed to spawn writer thread: {}", e)))
    }

    /// Stop recording and restore routing.
    ///
    /// Returns the finished recording, or `None` when there was nothing to
    /// stop. During an in-flight `start` this cancels it instead; the start
    /// call unwinds and returns `Cancelled`.
    pub fn stop(&self) -> Result<Option<RecordingArtifact>, CaptureError> {
        {
            let mut shared = self.shared.lock();
            if shared.state.is_starting() {
                if let Some(cancel) = &shared.cancel {
                    log::info!("Stop requested during start; cancelling");
                    cancel.cancel();
                }
                return Ok(None);
            }
            if !shared.state.is_recording() {
                return Ok(None);
            }
            shared.state = SessionState::Stopping;
        }
        self.notify_state(&SessionState::Stopping);

        let finish = self.finish_recording();
        if let Some(artifact) = &finish.artifact {
            self.notify_finished(artifact);
        }
        match finish.error {
            None => {
                self.set_state(SessionState::Idle);
                Ok(finish.artifact)
            }
            Some(e) => {
                self.set_state(SessionState::Failed(e.clone()));
                self.notify_error(&e);
                Err(e)
            }
        }
    }

    /// Watchdog: end a recording whose tap has died (device unplugged,
    /// driver removed). The partial recording is kept.
    pub fn check_health(&self) -> Result<(), CaptureError> {
        let tap_running = self.tap.lock().is_running();
        {
            let mut shared = self.shared.lock();
            if !shared.state.is_recording() || tap_running {
                return Ok(());
            }
            shared.state = SessionState::Stopping;
        }
        log::warn!("Loopback tap stopped unexpectedly; ending recording");
        self.notify_state(&SessionState::Stopping);

        let finish = self.finish_recording();
        if let Some(artifact) = &finish.artifact {
            self.notify_finished(artifact);
        }
        if let Some(e) = &finish.error {
            log::error!("Cleanup after tap loss: {}", e);
        }
        let error = CaptureError::DeviceNotAvailable;
        self.set_state(SessionState::Failed(error.clone()));
        self.notify_error(&error);
        Err(error)
    }

    /// Tear down the active recording: tap, writer, sink, routing, sidecar.
    ///
    /// Every step runs even if an earlier one failed; the first error wins.
    fn finish_recording(&self) -> Finish {
        let Some(mut active) = self.active.lock().take() else {
            return Finish {
                artifact: None,
                error: Some(CaptureError::StorageError("no active recording".into())),
            };
        };
        let mut error = None;

        self.stop_tap();
        active.writer_running.store(false, Ordering::SeqCst);
        if let Some(handle) = active.writer_handle.take() {
            let _ = handle.join();
        }
        drain_queue(&self.queue, &self.sink, &self.shared, self.format);

        let (detected_rate, dropped) = {
            let s = self.shared.lock();
            (s.detected_rate, s.diagnostics.samples_dropped)
        };
        let summary = match self.sink.lock().take() {
            Some(mut sink) => sink.close(detected_rate).map_err(|e| {
                log::error!("Failed to finalize {}: {}", active.path.display(), e);
                e
            }),
            None => Err(CaptureError::StorageError("file writer not available".into())),
        };

        if let Err(e) = self.routing.end_routing(&active.plan) {
            error.get_or_insert(e);
        }

        let artifact = match summary {
            Ok(summary) => {
                let duration_secs = if summary.sample_rate > 0 {
                    summary.frames as f64 / summary.sample_rate as f64
                } else {
                    0.0
                };
                let artifact = RecordingArtifact {
                    id: active.id.clone(),
                    file_path: summary.path,
                    started_at: active.started_at,
                    duration_secs,
                    byte_size: summary.byte_size,
                    frames: summary.frames,
                    sample_rate: summary.sample_rate,
                    channels: self.format.channels,
                    sample_format: self.format.sample_format,
                    checksum: summary.checksum,
                    dropped_samples: dropped,
                };
                if let Err(e) = metadata::write_metadata(&artifact) {
                    log::warn!("Recording saved without metadata sidecar: {}", e);
                }
                log::info!(
                    "Recorded {:.2}s to {} ({} samples dropped)",
                    artifact.duration_secs,
                    artifact.file_path.display(),
                    dropped
                );
                Some(artifact)
            }
            Err(e) => {
                error.get_or_insert(e);
                None
            }
        };

        Finish { artifact, error }
    }

    /// Undo a start that got as far as the tap and writer.
    fn abort_recording(&self) {
        let active = self.active.lock().take();
        self.stop_tap();
        if let Some(mut active) = active {
            active.writer_running.store(false, Ordering::SeqCst);
            if let Some(handle) = active.writer_handle.take() {
                let _ = handle.join();
            }
        }
        self.discard_sink();
    }

    fn stop_tap(&self) {
        if let Err(e) = self.tap.lock().stop() {
            log::warn!("Failed to stop tap: {}", e);
        }
    }

    fn discard_sink(&self) {
        if let Some(mut sink) = self.sink.lock().take() {
            sink.discard();
        }
        self.queue.lock().drain();
    }

    fn set_state(&self, state: SessionState) {
        self.shared.lock().state = state.clone();
        self.notify_state(&state);
    }

    fn delegate(&self) -> Option<Arc<dyn SessionDelegate>> {
        self.delegate.read().clone()
    }

    fn notify_state(&self, state: &SessionState) {
        log::debug!("Session state: {}", state.label());
        if let Some(d) = self.delegate() {
            d.on_state_changed(state);
        }
    }

    fn notify_error(&self, error: &CaptureError) {
        if let Some(d) = self.delegate() {
            d.on_error(error);
        }
    }

    fn notify_finished(&self, artifact: &RecordingArtifact) {
        if let Some(d) = self.delegate() {
            d.on_recording_finished(artifact);
        }
    }
}

impl<R: AudioDeviceRegistry, P: CaptureProvider> Drop for CaptureSession<R, P> {
    fn drop(&mut self) {
        if self.shared.lock().state.is_recording() {
            log::warn!("Capture session dropped while recording; stopping");
            if let Err(e) = self.stop() {
                log::error!("Stop on drop failed: {}", e);
            }
        }
    }
}

/// Move everything queued into the sink and update counters.
fn drain_queue(
    queue: &Mutex<FrameQueue>,
    sink: &Mutex<Option<Box<dyn RecordingSink>>>,
    shared: &Mutex<SharedState>,
    format: StreamFormat,
) {
    let samples = queue.lock().drain();
    if samples.is_empty() {
        return;
    }

    let (result, frames) = {
        let mut guard = sink.lock();
        let Some(sink) = guard.as_mut() else {
            return;
        };
        (sink.write(&samples), sink.frames_written())
    };

    let mut s = shared.lock();
    s.diagnostics.write_cycles += 1;
    match result {
        Ok(()) => {
            s.diagnostics.bytes_written += (samples.len() * format.sample_format.bytes_per_sample()) as u64;
        }
        Err(e) => {
            s.diagnostics.write_errors += 1;
            log::error!("Write failed: {}", e);
        }
    }
    let rate = s.detected_rate.unwrap_or(format.sample_rate).max(1);
    if let SessionState::Recording { duration_secs } = &mut s.state {
        *duration_secs = frames as f64 / rate as f64;
    }
}
