//! Audio recording authorization (TCC).
//!
//! Reading the loopback device is audio input as far as macOS is concerned,
//! so the process needs the same consent as a microphone. Opening a cpal
//! stream does not reliably raise the consent dialog, so access is checked
//! and requested through `AVCaptureDevice` before anything is routed.

use std::time::Duration;

use soundgrabber_core::models::error::CaptureError;

/// How long to wait for the user to answer the consent dialog.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// `AVAuthorizationStatus`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthorizationStatus {
    NotDetermined,
    Restricted,
    Denied,
    Authorized,
}

impl AuthorizationStatus {
    pub fn from_raw(raw: i64) -> Self {
        match raw {
            1 => Self::Restricted,
            2 => Self::Denied,
            3 => Self::Authorized,
            0 => Self::NotDetermined,
            other => {
                log::warn!("Unknown authorization status {}", other);
                Self::NotDetermined
            }
        }
    }

    /// Restricted and denied can only be changed in System Settings.
    pub fn is_final_refusal(self) -> bool {
        matches!(self, Self::Restricted | Self::Denied)
    }
}

/// Resolve the current status to a start decision, asking the user with
/// `request` when they have not decided yet.
pub fn resolve_access(
    status: AuthorizationStatus,
    request: impl FnOnce() -> bool,
) -> Result<(), CaptureError> {
    match status {
        AuthorizationStatus::Authorized => Ok(()),
        refused if refused.is_final_refusal() => {
            log::warn!("Audio recording access is {:?}; grant it in System Settings > Privacy & Security", refused);
            Err(CaptureError::PermissionDenied)
        }
        _ => {
            log::info!("Requesting audio recording access");
            if request() {
                Ok(())
            } else {
                Err(CaptureError::PermissionDenied)
            }
        }
    }
}

/// Check audio recording access, prompting once if undecided.
#[cfg(target_os = "macos")]
pub fn ensure_recording_access() -> Result<(), CaptureError> {
    resolve_access(native::authorization_status(), || native::request_access(REQUEST_TIMEOUT))
}

#[cfg(target_os = "macos")]
mod native {
    use std::sync::mpsc;
    use std::time::Duration;

    use block::ConcreteBlock;
    use objc::runtime::{Class, Object, BOOL, YES};
    use objc::{msg_send, sel, sel_impl};

    use super::AuthorizationStatus;

    #[link(name = "AVFoundation", kind = "framework")]
    extern "C" {}

    /// `AVMediaTypeAudio`.
    const MEDIA_TYPE_AUDIO: &[u8] = b"soun\0";

    fn media_type_audio() -> Option<*mut Object> {
        let ns_string = Class::get("NSString")?;
        let media_type: *mut Object =
            unsafe { msg_send![ns_string, stringWithUTF8String: MEDIA_TYPE_AUDIO.as_ptr()] };
        (!media_type.is_null()).then_some(media_type)
    }

    pub fn authorization_status() -> AuthorizationStatus {
        let (Some(capture_device), Some(media_type)) = (Class::get("AVCaptureDevice"), media_type_audio()) else {
            log::warn!("AVFoundation unavailable; treating access as undecided");
            return AuthorizationStatus::NotDetermined;
        };
        let raw: i64 = unsafe { msg_send![capture_device, authorizationStatusForMediaType: media_type] };
        AuthorizationStatus::from_raw(raw)
    }

    /// Show the consent dialog and wait for the answer.
    pub fn request_access(timeout: Duration) -> bool {
        let (Some(capture_device), Some(media_type)) = (Class::get("AVCaptureDevice"), media_type_audio()) else {
            return false;
        };

        let (tx, rx) = mpsc::channel();
        let handler = ConcreteBlock::new(move |granted: BOOL| {
            let _ = tx.send(granted == YES);
        })
        .copy();
        unsafe {
            let _: () = msg_send![capture_device, requestAccessForMediaType: media_type completionHandler: &*handler];
        }

        match rx.recv_timeout(timeout) {
            Ok(granted) => {
                log::info!("Audio recording access {}", if granted { "granted" } else { "refused" });
                granted
            }
            Err(_) => {
                log::warn!("No answer to the audio recording consent dialog");
                false
            }
        }
    }
}
