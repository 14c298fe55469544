use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;

use super::simulated::SimulatedAudioSystem;
use crate::models::dependency::{Dependency, InstallOutcome};
use crate::traits::installer::DependencyInstaller;

/// Installer that "installs" into a [`SimulatedAudioSystem`] and a scratch directory.
///
/// The driver appears as the loopback device; the helper appears as an
/// executable stub at `helper_path`.
pub struct SimulatedInstaller {
    system: Arc<SimulatedAudioSystem>,
    helper_path: PathBuf,
    failures: Mutex<HashMap<Dependency, String>>,
    runs: Mutex<Vec<Dependency>>,
}

impl SimulatedInstaller {
    pub fn new(system: Arc<SimulatedAudioSystem>, helper_path: PathBuf) -> Self {
        Self {
            system,
            helper_path,
            failures: Mutex::new(HashMap::new()),
            runs: Mutex::new(Vec::new()),
        }
    }

    /// Make every install of `dependency` fail with `reason`.
    pub fn fail(&self, dependency: Dependency, reason: impl Into<String>) {
        self.failures.lock().insert(dependency, reason.into());
    }

    /// Dependencies an install was attempted for, in order.
    pub fn runs(&self) -> Vec<Dependency> {
        self.runs.lock().clone()
    }

    fn install_helper(&self) -> Result<(), String> {
        if let Some(parent) = self.helper_path.parent() {
            fs::create_dir_all(parent).map_err(|e| e.to_string())?;
        }
        fs::write(&self.helper_path, b"#!/bin/sh\nexit 0\n").map_err(|e| e.to_string())?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&self.helper_path, fs::Permissions::from_mode(0o755)).map_err(|e| e.to_string())?;
        }
        Ok(())
    }
}

impl DependencyInstaller for SimulatedInstaller {
    fn install(&self, dependency: Dependency) -> InstallOutcome {
        self.runs.lock().push(dependency);
        if let Some(reason) = self.failures.lock().get(&dependency) {
            return InstallOutcome::Failed(reason.clone());
        }
        match dependency {
            Dependency::LoopbackDriver => {
                self.system.add_loopback();
                InstallOutcome::Installed
            }
            Dependency::SwitchHelper => match self.install_helper() {
                Ok(()) => InstallOutcome::Installed,
                Err(e) => InstallOutcome::Failed(e),
            },
        }
    }
}
