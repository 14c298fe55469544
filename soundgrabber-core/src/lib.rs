//! # soundgrabber-core
//!
//! Platform-agnostic core of SoundGrabber: records everything the Mac is
//! playing by routing system output through a virtual loopback device.
//!
//! Owns the parts that must be right regardless of platform: dependency
//! checks, the routing transaction and its crash repair, the capture session
//! state machine, and WAV output. The macOS backend implements
//! `AudioDeviceRegistry`, `CaptureProvider` and `DependencyInstaller` and plugs
//! into the generic `SessionSupervisor`.
//!
//! ## Architecture
//!
//! ```text
//! soundgrabber-core (this crate)
//! ├── traits/        ← AudioDeviceRegistry, CaptureProvider, RecordingSink, DependencyInstaller, SessionDelegate
//! ├── models/        ← CaptureError, SessionState, RoutingPlan, Settings, AudioDevice, etc.
//! ├── dependencies/  ← DependencyProbe
//! ├── routing/       ← RoutingController, PlanStore, RetryingRegistry, CancelToken
//! ├── processing/    ← FrameQueue, WAV header and sample encoding
//! ├── session/       ← CaptureSession, SessionSupervisor
//! ├── storage/       ← WavFileWriter, metadata sidecar, settings.toml, recordings folder
//! └── sim/           ← SimulatedAudioSystem, SimulatedTap, SimulatedInstaller
//! ```

pub mod dependencies;
pub mod models;
pub mod processing;
pub mod routing;
pub mod session;
pub mod sim;
pub mod storage;
pub mod traits;

// Re-export key types at crate root for convenience.
pub use dependencies::probe::DependencyProbe;
pub use models::artifact::RecordingArtifact;
pub use models::audio_format::{SampleFormat, StreamFormat};
pub use models::config::{DependencySettings, Settings};
pub use models::dependency::{Dependency, DependencyReport, DependencyStatus, InstallOutcome};
pub use models::device::{AudioDevice, DeviceDirection};
pub use models::error::{CaptureError, DeviceError};
pub use models::routing_plan::{RoutingPhase, RoutingPlan};
pub use models::state::{SessionDiagnostics, SessionNotice, SessionState};
pub use processing::frame_queue::FrameQueue;
pub use routing::cancel::CancelToken;
pub use routing::controller::{RoutingController, RoutingOptions};
pub use routing::plan_store::PlanStore;
pub use routing::retry::RetryingRegistry;
pub use session::capture::CaptureSession;
pub use session::supervisor::SessionSupervisor;
pub use storage::settings::ConfigError;
pub use storage::wav_writer::WavFileWriter;
pub use traits::capture_provider::{AudioFrameCallback, CaptureProvider};
pub use traits::device_registry::AudioDeviceRegistry;
pub use traits::installer::DependencyInstaller;
pub use traits::recording_sink::{RecordingSink, SinkFactory, SinkSummary};
pub use traits::session_delegate::SessionDelegate;
