#![allow(dead_code)]

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;
use soundgrabber_core::sim::{SimulatedAudioSystem, SimulatedInstaller, SimulatedTap};
use soundgrabber_core::{
    CaptureError, PlanStore, RecordingArtifact, RecordingSink, RoutingController, RoutingOptions, SessionDelegate,
    SessionState, SessionSupervisor, Settings, SinkFactory, WavFileWriter,
};
use tempfile::TempDir;

pub type SimSupervisor = SessionSupervisor<Arc<SimulatedAudioSystem>, SimulatedTap>;

/// Scratch directory, simulated devices, an installed helper stub, and settings pointing at all of it.
pub struct Fixture {
    pub dir: TempDir,
    pub system: Arc<SimulatedAudioSystem>,
    pub tap: SimulatedTap,
    pub installer: Arc<SimulatedInstaller>,
    pub settings: Settings,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_tap(SimulatedTap::new(48000, 2))
    }

    pub fn with_tap(tap: SimulatedTap) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let system = Arc::new(SimulatedAudioSystem::with_standard_devices());

        let mut settings = Settings {
            output_folder: dir.path().join("recordings"),
            state_dir: dir.path().join("state"),
            ..Settings::default()
        };
        settings.dependencies.helper_name = "soundgrabber-test-helper-that-does-not-exist".into();
        settings.dependencies.helper_search_paths = vec![dir.path().join("bin/SwitchAudioSource")];
        settings.dependencies.driver_bundle = dir.path().join("BlackHole2ch.driver");

        let installer = Arc::new(SimulatedInstaller::new(
            system.clone(),
            dir.path().join("bin/SwitchAudioSource"),
        ));
        let fixture = Self {
            dir,
            system,
            tap,
            installer,
            settings,
        };
        fixture.install_helper();
        fixture
    }

    pub fn helper_path(&self) -> PathBuf {
        self.dir.path().join("bin/SwitchAudioSource")
    }

    pub fn install_helper(&self) {
        let path = self.helper_path();
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, b"#!/bin/sh\n").unwrap();
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        }
    }

    pub fn remove_helper(&self) {
        fs::remove_file(self.helper_path()).unwrap();
    }

    pub fn plan_store(&self) -> PlanStore {
        PlanStore::in_dir(&self.settings.state_dir)
    }

    pub fn controller(&self) -> RoutingController<Arc<SimulatedAudioSystem>> {
        RoutingController::new(self.system.clone(), self.plan_store(), RoutingOptions::default())
    }

    pub fn supervisor(&self) -> SimSupervisor {
        self.supervisor_with_sinks(wav_sinks())
    }

    pub fn supervisor_with_sinks(&self, sinks: SinkFactory) -> SimSupervisor {
        SessionSupervisor::new(
            self.settings.clone(),
            self.system.clone(),
            self.tap.clone(),
            self.installer.clone(),
            sinks,
        )
    }

    pub fn recordings(&self) -> Vec<PathBuf> {
        match fs::read_dir(&self.settings.output_folder) {
            Ok(entries) => entries.map(|e| e.unwrap().path()).collect(),
            Err(_) => Vec::new(),
        }
    }

    /// Defaults and topology are exactly what `with_standard_devices` set up.
    pub fn assert_routing_restored(&self) {
        assert_eq!(self.system.current_output().unwrap().name, "Speakers");
        assert_eq!(self.system.current_input().unwrap().name, "Built-in Microphone");
        assert!(self.system.aggregates().is_empty(), "aggregate left behind");
        assert!(!self.plan_store().exists(), "routing plan left behind");
    }
}

pub fn wav_sinks() -> SinkFactory {
    Arc::new(|| Box::new(WavFileWriter::new()) as Box<dyn RecordingSink>)
}

/// Records every delegate event.
#[derive(Default)]
pub struct RecordingDelegate {
    pub states: Mutex<Vec<SessionState>>,
    pub errors: Mutex<Vec<CaptureError>>,
    pub finished: Mutex<Vec<RecordingArtifact>>,
    pub notices: Mutex<Vec<soundgrabber_core::SessionNotice>>,
}

impl RecordingDelegate {
    pub fn labels(&self) -> Vec<&'static str> {
        self.states.lock().iter().map(|s| s.label()).collect()
    }
}

impl SessionDelegate for RecordingDelegate {
    fn on_state_changed(&self, state: &SessionState) {
        self.states.lock().push(state.clone());
    }

    fn on_notice(&self, notice: &soundgrabber_core::SessionNotice) {
        self.notices.lock().push(notice.clone());
    }

    fn on_error(&self, error: &CaptureError) {
        self.errors.lock().push(error.clone());
    }

    fn on_recording_finished(&self, artifact: &RecordingArtifact) {
        self.finished.lock().push(artifact.clone());
    }
}
