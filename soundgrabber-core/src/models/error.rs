use std::path::PathBuf;

use thiserror::Error;

use super::dependency::Dependency;

/// Errors surfaced by SoundGrabber's capture and routing operations.
///
/// By the time one of these reaches a caller, any routing change made on the
/// way has already been undone.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CaptureError {
    #[error("required dependencies missing: {}", join_dependencies(.0))]
    DependencyMissing(Vec<Dependency>),

    #[error("dependency installation failed: {0}")]
    DependencyInstallFailed(String),

    #[error("device enumeration failed: {0}")]
    DeviceEnumerationFailed(String),

    #[error("routing failed: {0}")]
    RoutingFailed(String),

    #[error("permission denied")]
    PermissionDenied,

    #[error("cannot open recording file {}", .0.display())]
    SinkOpenFailed(PathBuf),

    #[error("a capture session is already active")]
    AlreadyActive,

    #[error("cancelled")]
    Cancelled,

    #[error("device not available")]
    DeviceNotAvailable,

    #[error("storage error: {0}")]
    StorageError(String),

    #[error("configuration failed: {0}")]
    ConfigurationFailed(String),
}

impl CaptureError {
    /// Errors the user has to act on (install something, grant access) before retrying.
    pub fn requires_user_action(&self) -> bool {
        matches!(
            self,
            Self::DependencyMissing(_) | Self::DependencyInstallFailed(_) | Self::PermissionDenied
        )
    }
}

fn join_dependencies(deps: &[Dependency]) -> String {
    deps.iter().map(|d| d.label()).collect::<Vec<_>>().join(", ")
}

/// Errors from an [`AudioDeviceRegistry`](crate::traits::device_registry::AudioDeviceRegistry).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DeviceError {
    /// Enumeration race or busy device; worth one retry.
    #[error("transient device failure: {0}")]
    Transient(String),

    #[error("device not found: {0}")]
    NotFound(String),

    #[error("device operation failed: {0}")]
    Failed(String),
}

impl DeviceError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }

    pub fn into_enumeration(self) -> CaptureError {
        CaptureError::DeviceEnumerationFailed(self.to_string())
    }

    pub fn into_routing(self) -> CaptureError {
        CaptureError::RoutingFailed(self.to_string())
    }
}
