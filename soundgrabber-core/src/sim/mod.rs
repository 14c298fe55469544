//! In-memory audio system for tests and `--simulate` runs.
//!
//! Mirrors the macOS behaviours the routing layer depends on: defaults fall
//! back when their device disappears, destroying a missing aggregate succeeds,
//! and every registry operation can be made to fail on demand.

mod installer;
mod simulated;
mod tap;

pub use installer::SimulatedInstaller;
pub use simulated::{RegistryOp, SimulatedAudioSystem};
pub use tap::SimulatedTap;
