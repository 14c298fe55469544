use std::sync::Arc;

use parking_lot::Mutex;

use soundgrabber_core::{CaptureError, RecordingArtifact, SessionDelegate, SessionNotice, SessionState};

/// SessionDelegate that logs session events and keeps the finished artifact
/// for the `record` command to report.
#[derive(Default)]
pub struct ConsoleDelegate {
    finished: Mutex<Option<RecordingArtifact>>,
}

impl ConsoleDelegate {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn take_finished(&self) -> Option<RecordingArtifact> {
        self.finished.lock().take()
    }
}

impl SessionDelegate for ConsoleDelegate {
    fn on_state_changed(&self, state: &SessionState) {
        log::info!("Session {}", state.label());
    }

    fn on_notice(&self, notice: &SessionNotice) {
        match notice {
            SessionNotice::OrphanRoutingRepaired { restored_output, .. } => {
                println!("Restored audio output to \"{restored_output}\" after an interrupted recording.");
            }
        }
    }

    fn on_error(&self, error: &CaptureError) {
        log::error!("{}", error);
    }

    fn on_recording_finished(&self, artifact: &RecordingArtifact) {
        *self.finished.lock() = Some(artifact.clone());
    }
}
