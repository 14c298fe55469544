use std::fs;
use std::path::{Path, PathBuf};

use crate::models::config::{DependencySettings, Settings};
use crate::models::dependency::{Dependency, DependencyReport, DependencyStatus};
use crate::traits::device_registry::AudioDeviceRegistry;

/// Detects whether the loopback driver and the switch helper are installed.
///
/// Read-only: probing never installs, never switches devices, and reports
/// "not installed" as a status rather than an error.
#[derive(Debug, Clone)]
pub struct DependencyProbe {
    loopback_name: String,
    settings: DependencySettings,
}

impl DependencyProbe {
    pub fn new(loopback_name: impl Into<String>, settings: DependencySettings) -> Self {
        Self {
            loopback_name: loopback_name.into(),
            settings,
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(settings.loopback_device.clone(), settings.dependencies.clone())
    }

    pub fn settings(&self) -> &DependencySettings {
        &self.settings
    }

    pub fn check_all(&self, registry: &dyn AudioDeviceRegistry) -> DependencyReport {
        Dependency::ALL
            .iter()
            .map(|&dep| (dep, self.check(dep, registry)))
            .collect()
    }

    pub fn check(&self, dependency: Dependency, registry: &dyn AudioDeviceRegistry) -> DependencyStatus {
        match dependency {
            Dependency::LoopbackDriver => self.driver_status(registry),
            Dependency::SwitchHelper => self.helper_status(),
        }
    }

    /// Installed when the loopback device shows up in the device list.
    ///
    /// If the list cannot be read (the helper that enumerates devices may
    /// itself be missing) the driver bundle on disk decides.
    pub fn driver_status(&self, registry: &dyn AudioDeviceRegistry) -> DependencyStatus {
        let present = match registry.list_devices() {
            Ok(devices) => devices
                .iter()
                .any(|d| !d.is_aggregate && d.matches_name(&self.loopback_name)),
            Err(e) => {
                log::warn!(
                    "Device enumeration failed while probing for '{}': {}; checking {}",
                    self.loopback_name,
                    e,
                    self.settings.driver_bundle.display()
                );
                self.settings.driver_bundle.is_dir()
            }
        };
        if present {
            DependencyStatus::Installed {
                version: self.driver_version(),
            }
        } else {
            DependencyStatus::Missing
        }
    }

    pub fn helper_status(&self) -> DependencyStatus {
        match self.locate_helper() {
            Some(path) => {
                log::debug!("Found {} at {}", self.settings.helper_name, path.display());
                DependencyStatus::Installed { version: None }
            }
            None => DependencyStatus::Missing,
        }
    }

    /// First executable among the known install paths, then a `PATH` lookup.
    pub fn locate_helper(&self) -> Option<PathBuf> {
        locate_helper(&self.settings)
    }

    /// `CFBundleShortVersionString` from the driver bundle's `Info.plist`.
    pub fn driver_version(&self) -> Option<String> {
        bundle_version(&self.settings.driver_bundle.join("Contents/Info.plist"))
    }
}

pub fn locate_helper(settings: &DependencySettings) -> Option<PathBuf> {
    settings
        .helper_search_paths
        .iter()
        .find(|p| is_executable(p))
        .cloned()
        .or_else(|| which::which(&settings.helper_name).ok())
}

pub fn is_executable(path: &Path) -> bool {
    let Ok(metadata) = fs::metadata(path) else {
        return false;
    };
    if !metadata.is_file() {
        return false;
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        metadata.permissions().mode() & 0o111 != 0
    }
    #[cfg(not(unix))]
    {
        true
    }
}

/// `CFBundleShortVersionString` of an `Info.plist`, XML or binary.
fn bundle_version(info_plist: &Path) -> Option<String> {
    let info = match plist::Value::from_file(info_plist) {
        Ok(info) => info,
        Err(e) => {
            log::debug!("No readable bundle info at {}: {}", info_plist.display(), e);
            return None;
        }
    };
    info.as_dictionary()?
        .get("CFBundleShortVersionString")?
        .as_string()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}
