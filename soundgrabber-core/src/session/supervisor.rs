use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::Local;
use parking_lot::{Mutex, RwLock};

use super::capture::CaptureSession;
use crate::dependencies::probe::DependencyProbe;
use crate::models::artifact::RecordingArtifact;
use crate::models::config::Settings;
use crate::models::dependency::{Dependency, DependencyReport, DependencyStatus, InstallOutcome};
use crate::models::error::CaptureError;
use crate::models::routing_plan::RoutingPhase;
use crate::models::state::{SessionDiagnostics, SessionNotice, SessionState};
use crate::routing::controller::{RoutingController, RoutingOptions};
use crate::routing::plan_store::PlanStore;
use crate::storage::recordings;
use crate::traits::capture_provider::CaptureProvider;
use crate::traits::device_registry::AudioDeviceRegistry;
use crate::traits::installer::DependencyInstaller;
use crate::traits::recording_sink::SinkFactory;
use crate::traits::session_delegate::SessionDelegate;

/// Entry point for the shell.
///
/// Owns the single capture session, repairs routing left behind by a crash
/// before anything else happens, and tracks dependency installs.
pub struct SessionSupervisor<R: AudioDeviceRegistry, P: CaptureProvider> {
    settings: Settings,
    session: CaptureSession<R, P>,
    installer: Arc<dyn DependencyInstaller>,
    installs: Mutex<HashMap<Dependency, DependencyStatus>>,
    notice: Mutex<Option<SessionNotice>>,
    delegate: RwLock<Option<Arc<dyn SessionDelegate>>>,
}

impl<R: AudioDeviceRegistry, P: CaptureProvider> SessionSupervisor<R, P> {
    /// Build the session from `settings` and repair any orphaned routing.
    ///
    /// A failed repair is logged, not fatal; `start` retries it and refuses
    /// to record until it succeeds.
    pub fn new(
        settings: Settings,
        registry: R,
        tap: P,
        installer: Arc<dyn DependencyInstaller>,
        sink_factory: SinkFactory,
    ) -> Self {
        let routing = Arc::new(RoutingController::new(
            registry,
            PlanStore::in_dir(&settings.state_dir),
            RoutingOptions {
                loopback_name: settings.loopback_device.clone(),
                aggregate_name: settings.aggregate_name.clone(),
            },
        ));
        let session = CaptureSession::new(
            routing,
            DependencyProbe::from_settings(&settings),
            tap,
            sink_factory,
            settings.stream_format(),
            settings.buffer_secs,
        );

        let supervisor = Self {
            settings,
            session,
            installer,
            installs: Mutex::new(HashMap::new()),
            notice: Mutex::new(None),
            delegate: RwLock::new(None),
        };
        if let Err(e) = supervisor.repair() {
            log::error!("Could not restore routing from a previous run: {}", e);
        }
        supervisor
    }

    pub fn set_delegate(&self, delegate: Arc<dyn SessionDelegate>) {
        if let Some(notice) = self.notice.lock().as_ref() {
            delegate.on_notice(notice);
        }
        self.session.set_delegate(Arc::clone(&delegate));
        *self.delegate.write() = Some(delegate);
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn state(&self) -> SessionState {
        self.session.state()
    }

    pub fn diagnostics(&self) -> SessionDiagnostics {
        self.session.diagnostics()
    }

    pub fn routing_phase(&self) -> RoutingPhase {
        self.session.routing().phase()
    }

    /// Read-only device queries for the shell's device list.
    pub fn registry(&self) -> &R {
        self.session.routing().registry()
    }

    /// The startup repair notice, once.
    pub fn take_notice(&self) -> Option<SessionNotice> {
        self.notice.lock().take()
    }

    /// Restore routing persisted by an earlier run, if any.
    pub fn repair(&self) -> Result<Option<SessionNotice>, CaptureError> {
        let Some(plan) = self.session.routing().repair_orphaned()? else {
            return Ok(None);
        };
        let notice = SessionNotice::OrphanRoutingRepaired {
            plan_id: plan.id.clone(),
            restored_output: plan.original_output.name.clone(),
        };
        log::info!(
            "Repaired routing left by a previous run; output restored to '{}'",
            plan.original_output.name
        );
        *self.notice.lock() = Some(notice.clone());
        if let Some(d) = self.delegate.read().clone() {
            d.on_notice(&notice);
        }
        Ok(Some(notice))
    }

    /// Start recording to `path`, or to a timestamped file in the output folder.
    ///
    /// Returns the path being recorded.
    pub fn start(&self, path: Option<PathBuf>) -> Result<PathBuf, CaptureError> {
        if !self.session.state().can_start() {
            return Err(CaptureError::AlreadyActive);
        }
        if self.session.routing().has_persisted_plan() {
            self.repair().map_err(|e| {
                CaptureError::RoutingFailed(format!("routing from an earlier session is still applied: {}", e))
            })?;
        }

        let path = path.unwrap_or_else(|| self.default_recording_path());
        self.session.start(&path)?;
        Ok(path)
    }

    pub fn stop(&self) -> Result<Option<RecordingArtifact>, CaptureError> {
        self.session.stop()
    }

    pub fn check_health(&self) -> Result<(), CaptureError> {
        self.session.check_health()
    }

    pub fn default_recording_path(&self) -> PathBuf {
        recordings::default_recording_path(&self.settings.output_folder, &self.settings.file_prefix, &Local::now())
    }

    /// Newest recording in the output folder.
    pub fn last_recording(&self) -> Result<Option<PathBuf>, CaptureError> {
        recordings::last_recording(&self.settings.output_folder, &self.settings.file_prefix)
    }

    /// Probe every dependency, overlaying installs in progress or failed.
    pub fn check_dependencies(&self) -> DependencyReport {
        let mut report = self.session.probe().check_all(self.session.routing().registry());
        let installs = self.installs.lock();
        for (dep, status) in report.iter_mut() {
            if status.is_installed() {
                continue;
            }
            if let Some(tracked) = installs.get(dep) {
                *status = tracked.clone();
            }
        }
        report
    }

    /// Install `dependency` unless it is already present.
    pub fn install(&self, dependency: Dependency) -> InstallOutcome {
        let registry = self.session.routing().registry();
        if self.session.probe().check(dependency, registry).is_installed() {
            self.installs.lock().remove(&dependency);
            return InstallOutcome::Installed;
        }

        self.installs.lock().insert(dependency, DependencyStatus::Installing);
        log::info!("Installing {}", dependency);
        let outcome = match self.installer.install(dependency) {
            InstallOutcome::Installed if !self.session.probe().check(dependency, registry).is_installed() => {
                InstallOutcome::Failed(format!("{} still not detected after install", dependency))
            }
            outcome => outcome,
        };

        let mut installs = self.installs.lock();
        match &outcome {
            InstallOutcome::Installed => {
                log::info!("Installed {}", dependency);
                installs.remove(&dependency);
            }
            InstallOutcome::Failed(reason) => {
                log::error!("Installing {} failed: {}", dependency, reason);
                installs.insert(
                    dependency,
                    DependencyStatus::InstallFailed {
                        reason: reason.clone(),
                    },
                );
            }
        }
        outcome
    }

    /// Install every missing dependency, driver first.
    pub fn install_missing(&self) -> Vec<(Dependency, InstallOutcome)> {
        let report = self.session.probe().check_all(self.session.routing().registry());
        Dependency::ALL
            .iter()
            .copied()
            .filter(|dep| !report.get(dep).is_some_and(DependencyStatus::is_installed))
            .map(|dep| (dep, self.install(dep)))
            .collect()
    }

    /// Install whatever is missing so a recording can start.
    ///
    /// Stops at the first failed install and reports it as
    /// `CaptureError::DependencyInstallFailed`.
    pub fn ensure_dependencies(&self) -> Result<(), CaptureError> {
        let report = self.session.probe().check_all(self.session.routing().registry());
        for dep in Dependency::ALL {
            if report.get(&dep).is_some_and(DependencyStatus::is_installed) {
                continue;
            }
            if let InstallOutcome::Failed(reason) = self.install(dep) {
                let error = CaptureError::DependencyInstallFailed(format!("{}: {}", dep.label(), reason));
                if let Some(d) = self.delegate.read().clone() {
                    d.on_error(&error);
                }
                return Err(error);
            }
        }
        Ok(())
    }
}
