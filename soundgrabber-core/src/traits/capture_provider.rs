use std::sync::Arc;

use crate::models::error::CaptureError;

/// Callback invoked when a batch of tapped audio is available.
///
/// Parameters:
/// - `samples`: Interleaved f32 samples.
/// - `sample_rate`: The actual sample rate of the delivered audio.
/// - `channels`: Number of interleaved channels.
///
/// Runs on the audio thread. Implementations of the receiving side must not
/// block on disk I/O.
pub type AudioFrameCallback = Arc<dyn Fn(&[f32], u32, u16) + Send + Sync + 'static>;

/// Source of the tapped system audio (the loopback device's input stream).
///
/// Implemented by:
/// - `LoopbackTap` (macOS, reads the loopback device through cpal)
/// - `SimulatedTap` (tests and dry runs)
pub trait CaptureProvider: Send + Sync {
    /// Whether the tap's device can currently be opened.
    fn is_available(&self) -> bool;

    /// Make sure this process may record from the tap's device, asking the
    /// user if they have not decided yet. Called before any routing change.
    ///
    /// Returns `CaptureError::PermissionDenied` when access is refused.
    fn check_permission(&self) -> Result<(), CaptureError> {
        Ok(())
    }

    /// Start delivering audio to `callback`.
    fn start(&mut self, callback: AudioFrameCallback) -> Result<(), CaptureError>;

    /// Stop delivering audio and release the device.
    fn stop(&mut self) -> Result<(), CaptureError>;

    /// False once the stream has stopped, including when it died on its own.
    fn is_running(&self) -> bool;

    /// Name of the device being tapped.
    fn device_name(&self) -> String;
}
