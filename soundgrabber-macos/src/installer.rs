//! Installs the loopback driver package and the switch helper binary.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;

use soundgrabber_core::dependencies::probe::DependencyProbe;
use soundgrabber_core::models::dependency::{Dependency, InstallOutcome};
use soundgrabber_core::traits::device_registry::AudioDeviceRegistry;
use soundgrabber_core::traits::installer::DependencyInstaller;

/// Installer for the packages shipped alongside the app.
///
/// Launches `installer`, `open` or `osascript` depending on the dependency
/// settings, then re-probes to confirm the dependency is actually present.
/// Only reads from the registry.
pub struct PackageInstaller {
    probe: DependencyProbe,
    registry: Arc<dyn AudioDeviceRegistry>,
}

impl PackageInstaller {
    pub fn new(probe: DependencyProbe, registry: Arc<dyn AudioDeviceRegistry>) -> Self {
        Self { probe, registry }
    }

    fn is_installed(&self, dependency: Dependency) -> bool {
        self.probe.check(dependency, self.registry.as_ref()).is_installed()
    }

    fn install_driver(&self) -> Result<(), String> {
        let settings = self.probe.settings();
        let package = existing(&settings.driver_package)?;

        if settings.interactive_driver_install {
            log::info!("Opening {} in Installer", package.display());
            return run(Command::new("open").arg("-W").arg(&package));
        }
        let package_arg = package.to_string_lossy();
        if settings.elevate {
            let script = format!("installer -pkg {} -target /", shell_quote(&package_arg));
            run(Command::new("osascript").arg("-e").arg(admin_script(&script)))
        } else {
            run(Command::new("installer").args(["-pkg", &package_arg, "-target", "/"]))
        }
    }

    fn install_helper(&self) -> Result<(), String> {
        let settings = self.probe.settings();
        let binary = existing(&settings.helper_binary)?;
        let target = settings.helper_install_dir.join(&settings.helper_name);

        if settings.elevate {
            let script = format!(
                "mkdir -p {dir} && cp {src} {dst} && chmod 755 {dst}",
                dir = shell_quote(&settings.helper_install_dir.to_string_lossy()),
                src = shell_quote(&binary.to_string_lossy()),
                dst = shell_quote(&target.to_string_lossy()),
            );
            run(Command::new("osascript").arg("-e").arg(admin_script(&script)))
        } else {
            copy_executable(&binary, &target)
        }
    }
}

impl DependencyInstaller for PackageInstaller {
    fn install(&self, dependency: Dependency) -> InstallOutcome {
        if self.is_installed(dependency) {
            log::info!("{} already installed", dependency);
            return InstallOutcome::Installed;
        }

        log::info!("Installing {}", dependency);
        let launched = match dependency {
            Dependency::LoopbackDriver => self.install_driver(),
            Dependency::SwitchHelper => self.install_helper(),
        };
        if let Err(reason) = launched {
            log::error!("Installing {} failed: {}", dependency, reason);
            return InstallOutcome::Failed(reason);
        }

        if self.is_installed(dependency) {
            log::info!("{} installed", dependency);
            InstallOutcome::Installed
        } else {
            InstallOutcome::Failed(format!("{dependency} still not detected after install"))
        }
    }
}

fn existing(path: &Path) -> Result<PathBuf, String> {
    if path.exists() {
        Ok(path.to_path_buf())
    } else {
        Err(format!("installer not found at {}", path.display()))
    }
}

fn copy_executable(source: &Path, target: &Path) -> Result<(), String> {
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent).map_err(|e| format!("cannot create {}: {e}", parent.display()))?;
    }
    fs::copy(source, target).map_err(|e| format!("cannot copy helper to {}: {e}", target.display()))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(target, fs::Permissions::from_mode(0o755))
            .map_err(|e| format!("cannot mark {} executable: {e}", target.display()))?;
    }
    Ok(())
}

fn run(command: &mut Command) -> Result<(), String> {
    let program = command.get_program().to_string_lossy().into_owned();
    let output = command.output().map_err(|e| format!("failed to launch {program}: {e}"))?;
    if output.status.success() {
        return Ok(());
    }
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    // osascript reports a dismissed password prompt as error -128.
    if stderr.contains("(-128)") {
        return Err("cancelled by user".into());
    }
    Err(format!("{program} exited with {}: {stderr}", output.status))
}

/// Single-quote `value` for /bin/sh.
fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

/// AppleScript running `script` through an administrator-privileges prompt.
fn admin_script(script: &str) -> String {
    let escaped = script.replace('\\', r"\\").replace('"', "\\\"");
    format!("do shell script \"{escaped}\" with administrator privileges")
}
