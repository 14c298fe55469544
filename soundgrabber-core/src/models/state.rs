use super::error::CaptureError;

/// Capture session state machine.
///
/// ```text
/// idle → checking dependencies → routing → recording → stopping → idle
///   any non-terminal state ──────────────────────────────→ failed
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum SessionState {
    Idle,
    CheckingDependencies,
    Routing,
    Recording { duration_secs: f64 },
    Stopping,
    Failed(CaptureError),
}

impl SessionState {
    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }

    pub fn is_recording(&self) -> bool {
        matches!(self, Self::Recording { .. })
    }

    /// A `start` is in flight.
    pub fn is_starting(&self) -> bool {
        matches!(self, Self::CheckingDependencies | Self::Routing)
    }

    pub fn is_active(&self) -> bool {
        !matches!(self, Self::Idle | Self::Failed(_))
    }

    pub fn can_start(&self) -> bool {
        !self.is_active()
    }

    pub fn duration(&self) -> Option<f64> {
        match self {
            Self::Recording { duration_secs } => Some(*duration_secs),
            _ => None,
        }
    }

    /// Short name for status displays (menu labels, icon state).
    pub fn label(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::CheckingDependencies => "checking dependencies",
            Self::Routing => "routing",
            Self::Recording { .. } => "recording",
            Self::Stopping => "stopping",
            Self::Failed(_) => "failed",
        }
    }
}

/// One-time informational notices for the shell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionNotice {
    /// Routing left behind by a previous run was undone at startup.
    OrphanRoutingRepaired {
        plan_id: String,
        restored_output: String,
    },
}

/// Counters for debugging a capture session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionDiagnostics {
    pub callback_count: u64,
    pub samples_received: u64,
    pub samples_dropped: u64,
    pub write_cycles: u64,
    pub write_errors: u64,
    pub bytes_written: u64,
}
