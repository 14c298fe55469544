use std::sync::Arc;

use crate::models::device::AudioDevice;
use crate::models::error::DeviceError;

/// System audio device topology and default-device control.
///
/// Every call reflects the live system; implementations must not cache
/// enumeration results because devices come and go (headphones, Bluetooth).
pub trait AudioDeviceRegistry: Send + Sync {
    fn list_devices(&self) -> Result<Vec<AudioDevice>, DeviceError>;

    fn default_output(&self) -> Result<AudioDevice, DeviceError>;

    /// `DeviceError::NotFound` when the system has no input device.
    fn default_input(&self) -> Result<AudioDevice, DeviceError>;

    /// Either the default changes or it does not; no intermediate state is observable.
    fn set_default_output(&self, device: &AudioDevice) -> Result<(), DeviceError>;

    fn set_default_input(&self, device: &AudioDevice) -> Result<(), DeviceError>;

    /// Create a multi-output device that plays to `original_output` (clock
    /// source) and mirrors everything into `loopback`.
    fn create_aggregate_device(
        &self,
        loopback: &AudioDevice,
        original_output: &AudioDevice,
        name: &str,
    ) -> Result<AudioDevice, DeviceError>;

    /// Remove an aggregate. Succeeds if it is already gone.
    fn destroy_aggregate_device(&self, device: &AudioDevice) -> Result<(), DeviceError>;

    /// Find a device by name, preferring an exact match over a substring match.
    fn find_device(&self, name: &str) -> Result<Option<AudioDevice>, DeviceError> {
        let devices = self.list_devices()?;
        let exact = devices.iter().find(|d| d.name == name).cloned();
        Ok(exact.or_else(|| devices.into_iter().find(|d| d.matches_name(name))))
    }

    fn contains(&self, device: &AudioDevice) -> Result<bool, DeviceError> {
        Ok(self.list_devices()?.iter().any(|d| d.is_same(device)))
    }
}

impl<T: AudioDeviceRegistry + ?Sized> AudioDeviceRegistry for Arc<T> {
    fn list_devices(&self) -> Result<Vec<AudioDevice>, DeviceError> {
        (**self).list_devices()
    }

    fn default_output(&self) -> Result<AudioDevice, DeviceError> {
        (**self).default_output()
    }

    fn default_input(&self) -> Result<AudioDevice, DeviceError> {
        (**self).default_input()
    }

    fn set_default_output(&self, device: &AudioDevice) -> Result<(), DeviceError> {
        (**self).set_default_output(device)
    }

    fn set_default_input(&self, device: &AudioDevice) -> Result<(), DeviceError> {
        (**self).set_default_input(device)
    }

    fn create_aggregate_device(
        &self,
        loopback: &AudioDevice,
        original_output: &AudioDevice,
        name: &str,
    ) -> Result<AudioDevice, DeviceError> {
        (**self).create_aggregate_device(loopback, original_output, name)
    }

    fn destroy_aggregate_device(&self, device: &AudioDevice) -> Result<(), DeviceError> {
        (**self).destroy_aggregate_device(device)
    }
}
