use crate::models::dependency::{Dependency, InstallOutcome};

/// Installs a missing dependency by launching an external installer.
///
/// Installing something that is already present is a successful no-op.
/// Implementations never change audio routing.
pub trait DependencyInstaller: Send + Sync {
    fn install(&self, dependency: Dependency) -> InstallOutcome;
}
