use std::thread;
use std::time::Duration;

use crate::models::device::AudioDevice;
use crate::models::error::DeviceError;
use crate::traits::device_registry::AudioDeviceRegistry;

const DEFAULT_BACKOFF: Duration = Duration::from_millis(50);

/// Registry decorator that retries each operation once on a transient failure.
///
/// Device enumeration races (a Bluetooth headset connecting mid-call, the
/// HAL still publishing a new aggregate) usually clear within milliseconds.
pub struct RetryingRegistry<R> {
    inner: R,
    backoff: Duration,
}

impl<R: AudioDeviceRegistry> RetryingRegistry<R> {
    pub fn new(inner: R) -> Self {
        Self::with_backoff(inner, DEFAULT_BACKOFF)
    }

    pub fn with_backoff(inner: R, backoff: Duration) -> Self {
        Self { inner, backoff }
    }

    pub fn inner(&self) -> &R {
        &self.inner
    }

    fn retry<T>(&self, op: &str, f: impl Fn(&R) -> Result<T, DeviceError>) -> Result<T, DeviceError> {
        match f(&self.inner) {
            Err(e) if e.is_transient() => {
                log::warn!("{} failed transiently ({}), retrying once", op, e);
                thread::sleep(self.backoff);
                f(&self.inner)
            }
            other => other,
        }
    }
}

impl<R: AudioDeviceRegistry> AudioDeviceRegistry for RetryingRegistry<R> {
    fn list_devices(&self) -> Result<Vec<AudioDevice>, DeviceError> {
        self.retry("list_devices", |r| r.list_devices())
    }

    fn default_output(&self) -> Result<AudioDevice, DeviceError> {
        self.retry("default_output", |r| r.default_output())
    }

    fn default_input(&self) -> Result<AudioDevice, DeviceError> {
        self.retry("default_input", |r| r.default_input())
    }

    fn set_default_output(&self, device: &AudioDevice) -> Result<(), DeviceError> {
        self.retry("set_default_output", |r| r.set_default_output(device))
    }

    fn set_default_input(&self, device: &AudioDevice) -> Result<(), DeviceError> {
        self.retry("set_default_input", |r| r.set_default_input(device))
    }

    fn create_aggregate_device(
        &self,
        loopback: &AudioDevice,
        original_output: &AudioDevice,
        name: &str,
    ) -> Result<AudioDevice, DeviceError> {
        self.retry("create_aggregate_device", |r| {
            r.create_aggregate_device(loopback, original_output, name)
        })
    }

    fn destroy_aggregate_device(&self, device: &AudioDevice) -> Result<(), DeviceError> {
        self.retry("destroy_aggregate_device", |r| r.destroy_aggregate_device(device))
    }
}
