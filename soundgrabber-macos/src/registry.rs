//! `AudioDeviceRegistry` backed by `SwitchAudioSource` and Core Audio.

use parking_lot::Mutex;

use soundgrabber_core::models::device::{AudioDevice, DeviceDirection};
use soundgrabber_core::models::error::DeviceError;
use soundgrabber_core::traits::device_registry::AudioDeviceRegistry;

use crate::switch_audio::{merge_devices, DeviceType, HelperDevice, SwitchAudio};

/// UID prefix of aggregates created by SoundGrabber.
pub const AGGREGATE_UID_PREFIX: &str = "com.soundgrabber.aggregate";

pub fn is_soundgrabber_aggregate(uid: &str) -> bool {
    uid.starts_with(AGGREGATE_UID_PREFIX)
}

/// Description of the multi-output device handed to Core Audio.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregateLayout {
    pub name: String,
    pub uid: String,
    /// Clock source; always the original output.
    pub master_uid: String,
    /// Original output first, loopback second.
    pub subdevice_uids: Vec<String>,
    /// Private aggregates are hidden from other processes, which would then
    /// never play into the loopback device.
    pub private: bool,
    pub stacked: bool,
}

impl AggregateLayout {
    pub fn multi_output(name: &str, uid: String, original_output: &AudioDevice, loopback: &AudioDevice) -> Self {
        Self {
            name: name.to_string(),
            uid,
            master_uid: original_output.id.clone(),
            subdevice_uids: vec![original_output.id.clone(), loopback.id.clone()],
            private: false,
            stacked: true,
        }
    }
}

/// Live view of the Mac's audio devices.
///
/// Enumeration and default switching go through the helper binary; aggregate
/// devices are created and destroyed in-process. Aggregates created here are
/// remembered so they are reported as ours even before the helper lists them.
pub struct MacDeviceRegistry {
    helper: SwitchAudio,
    created: Mutex<Vec<AudioDevice>>,
}

impl MacDeviceRegistry {
    pub fn new(helper: SwitchAudio) -> Self {
        Self {
            helper,
            created: Mutex::new(Vec::new()),
        }
    }

    pub fn helper(&self) -> &SwitchAudio {
        &self.helper
    }

    fn current(&self, kind: DeviceType) -> Result<AudioDevice, DeviceError> {
        let entry = self.helper.current(kind)?;
        Ok(self.to_device(&entry, kind))
    }

    fn to_device(&self, entry: &HelperDevice, kind: DeviceType) -> AudioDevice {
        let id = entry.stable_id();
        if let Some(created) = self.created.lock().iter().find(|d| d.id == id || d.name == entry.name) {
            return created.clone();
        }
        let direction = match kind {
            DeviceType::Input => DeviceDirection::Input,
            DeviceType::Output => DeviceDirection::Output,
        };
        let mut device = AudioDevice::new(id.clone(), entry.name.clone(), direction);
        device.is_aggregate = is_soundgrabber_aggregate(&id);
        device
    }

    fn select(&self, device: &AudioDevice, kind: DeviceType) -> Result<(), DeviceError> {
        match self.helper.select(&device.name, kind) {
            Ok(()) => Ok(()),
            // Freshly created devices can take a moment to show up.
            Err(e) if device.is_aggregate => Err(DeviceError::Transient(e.to_string())),
            Err(e) => Err(e.into()),
        }
    }

    fn still_published(&self, device: &AudioDevice) -> bool {
        #[cfg(target_os = "macos")]
        {
            matches!(crate::aggregate::translate_uid(&device.id), Ok(Some(_)))
        }
        #[cfg(not(target_os = "macos"))]
        {
            let _ = device;
            false
        }
    }
}

impl AudioDeviceRegistry for MacDeviceRegistry {
    fn list_devices(&self) -> Result<Vec<AudioDevice>, DeviceError> {
        let entries = self.helper.list()?;
        let mut devices = merge_devices(&entries, is_soundgrabber_aggregate);

        let created = self.created.lock().clone();
        for aggregate in created {
            if !devices.iter().any(|d| d.is_same(&aggregate)) && self.still_published(&aggregate) {
                devices.push(aggregate);
            }
        }
        Ok(devices)
    }

    fn default_output(&self) -> Result<AudioDevice, DeviceError> {
        self.current(DeviceType::Output)
    }

    fn default_input(&self) -> Result<AudioDevice, DeviceError> {
        self.current(DeviceType::Input)
    }

    fn set_default_output(&self, device: &AudioDevice) -> Result<(), DeviceError> {
        #[cfg(target_os = "macos")]
        if device.is_aggregate {
            return crate::aggregate::set_default_output(&device.id);
        }
        self.select(device, DeviceType::Output)
    }

    fn set_default_input(&self, device: &AudioDevice) -> Result<(), DeviceError> {
        self.select(device, DeviceType::Input)
    }

    #[cfg(target_os = "macos")]
    fn create_aggregate_device(
        &self,
        loopback: &AudioDevice,
        original_output: &AudioDevice,
        name: &str,
    ) -> Result<AudioDevice, DeviceError> {
        let uid = format!("{}.{}", AGGREGATE_UID_PREFIX, uuid::Uuid::new_v4());
        let layout = AggregateLayout::multi_output(name, uid, original_output, loopback);
        crate::aggregate::create(&layout)?;
        let device = AudioDevice::aggregate(layout.uid, name);
        self.created.lock().push(device.clone());
        Ok(device)
    }

    #[cfg(not(target_os = "macos"))]
    fn create_aggregate_device(
        &self,
        _loopback: &AudioDevice,
        _original_output: &AudioDevice,
        _name: &str,
    ) -> Result<AudioDevice, DeviceError> {
        Err(DeviceError::Failed("aggregate devices require macOS".into()))
    }

    fn destroy_aggregate_device(&self, device: &AudioDevice) -> Result<(), DeviceError> {
        destroy_published(&device.id)?;
        self.created.lock().retain(|d| !d.is_same(device));
        Ok(())
    }
}

#[cfg(target_os = "macos")]
fn destroy_published(uid: &str) -> Result<(), DeviceError> {
    crate::aggregate::destroy(uid)
}

#[cfg(not(target_os = "macos"))]
fn destroy_published(uid: &str) -> Result<(), DeviceError> {
    Err(DeviceError::Failed(format!("cannot destroy aggregate {uid} without Core Audio")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizes_own_aggregates() {
        assert!(is_soundgrabber_aggregate(
            "com.soundgrabber.aggregate.0b6c7d0e-2f5f-4a57-9d0c-1b1d3b1a2c3d"
        ));
        assert!(!is_soundgrabber_aggregate("BlackHole2ch_UID"));
    }

    #[test]
    fn aggregate_is_public_and_mirrors_the_original_output() {
        let speakers = AudioDevice::new("BuiltInSpeakerDevice", "MacBook Pro Speakers", DeviceDirection::Output);
        let blackhole = AudioDevice::new("BlackHole2ch_UID", "BlackHole 2ch", DeviceDirection::Both);
        let uid = format!("{AGGREGATE_UID_PREFIX}.test");

        let layout = AggregateLayout::multi_output("SoundGrabber", uid.clone(), &speakers, &blackhole);

        assert!(!layout.private);
        assert!(layout.stacked);
        assert_eq!(layout.uid, uid);
        assert_eq!(layout.master_uid, "BuiltInSpeakerDevice");
        assert_eq!(layout.subdevice_uids, vec!["BuiltInSpeakerDevice".to_string(), "BlackHole2ch_UID".to_string()]);
    }

    #[test]
    fn helper_failures_surface_as_device_errors() {
        let registry = MacDeviceRegistry::new(SwitchAudio::new("/nonexistent/SwitchAudioSource"));
        assert!(matches!(registry.list_devices(), Err(DeviceError::Failed(_))));
        assert!(matches!(registry.default_output(), Err(DeviceError::Failed(_))));
    }

    #[test]
    fn aggregate_switch_failures_are_retryable() {
        let registry = MacDeviceRegistry::new(SwitchAudio::new("/nonexistent/SwitchAudioSource"));
        let speakers = AudioDevice::new("BuiltInSpeakerDevice", "MacBook Pro Speakers", DeviceDirection::Output);
        assert!(!registry.set_default_input(&speakers).unwrap_err().is_transient());

        #[cfg(not(target_os = "macos"))]
        {
            let aggregate = AudioDevice::aggregate(format!("{AGGREGATE_UID_PREFIX}.test"), "SoundGrabber");
            assert!(registry.set_default_output(&aggregate).unwrap_err().is_transient());
        }
    }
}
