//! # soundgrabber-macos
//!
//! macOS backend for SoundGrabber.
//!
//! - [`MacDeviceRegistry`]: device enumeration and default switching through
//!   the `SwitchAudioSource` helper, aggregate devices through Core Audio
//! - [`LoopbackTap`]: cpal input stream on the loopback device
//! - [`PackageInstaller`]: installs the bundled driver package and helper
//! - [`permissions`]: audio recording consent, checked before routing
//!
//! The helper wrapper and the installer build everywhere so they can be
//! tested off a Mac; Core Audio and cpal are only linked on macOS.

#[cfg(target_os = "macos")]
pub mod aggregate;
pub mod installer;
pub mod permissions;
pub mod registry;
pub mod switch_audio;
#[cfg(target_os = "macos")]
pub mod tap;

pub use installer::PackageInstaller;
pub use registry::MacDeviceRegistry;
pub use switch_audio::SwitchAudio;
#[cfg(target_os = "macos")]
pub use tap::LoopbackTap;
