use crate::models::artifact::RecordingArtifact;
use crate::models::error::CaptureError;
use crate::models::state::{SessionNotice, SessionState};

/// Event delegate for the shell (menu icon, labels, notifications).
///
/// Called from whichever thread drives the session; implementations marshal
/// to their UI thread if they have one.
pub trait SessionDelegate: Send + Sync {
    fn on_state_changed(&self, state: &SessionState);

    fn on_notice(&self, _notice: &SessionNotice) {}

    fn on_error(&self, _error: &CaptureError) {}

    fn on_recording_finished(&self, _artifact: &RecordingArtifact) {}
}
