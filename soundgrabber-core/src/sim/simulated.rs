use std::collections::{HashMap, VecDeque};

use parking_lot::{Mutex, MutexGuard};

use crate::models::device::{AudioDevice, DeviceDirection};
use crate::models::error::DeviceError;
use crate::traits::device_registry::AudioDeviceRegistry;

pub const SIM_MICROPHONE: &str = "Built-in Microphone";
pub const SIM_SPEAKERS: &str = "Speakers";
pub const SIM_LOOPBACK: &str = "BlackHole 2ch";

/// Registry operations that faults can be attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegistryOp {
    ListDevices,
    DefaultOutput,
    DefaultInput,
    SetDefaultOutput,
    SetDefaultInput,
    CreateAggregate,
    DestroyAggregate,
}

#[derive(Debug, Default)]
struct SimState {
    devices: Vec<AudioDevice>,
    default_output: Option<String>,
    default_input: Option<String>,
    one_shot: HashMap<RegistryOp, VecDeque<DeviceError>>,
    persistent: HashMap<RegistryOp, DeviceError>,
    calls: Vec<RegistryOp>,
    aggregate_members: HashMap<String, Vec<String>>,
    next_aggregate: u32,
}

impl SimState {
    fn find(&self, id: &str) -> Option<&AudioDevice> {
        self.devices.iter().find(|d| d.id == id)
    }

    fn first_output(&self) -> Option<String> {
        self.devices
            .iter()
            .find(|d| d.direction.has_output() && !d.is_aggregate)
            .map(|d| d.id.clone())
    }

    fn first_input(&self) -> Option<String> {
        self.devices
            .iter()
            .find(|d| d.direction.has_input())
            .map(|d| d.id.clone())
    }

    /// Reassign defaults that point at a device that no longer exists.
    fn settle_defaults(&mut self) {
        if self.default_output.as_deref().is_some_and(|id| self.find(id).is_none()) {
            self.default_output = self.first_output();
        }
        if self.default_input.as_deref().is_some_and(|id| self.find(id).is_none()) {
            self.default_input = self.first_input();
        }
    }
}

/// Fake Core Audio device topology with fault injection.
#[derive(Debug, Default)]
pub struct SimulatedAudioSystem {
    state: Mutex<SimState>,
}

impl SimulatedAudioSystem {
    /// No devices at all.
    pub fn new() -> Self {
        Self::default()
    }

    /// A microphone, speakers (default output), and the loopback driver.
    pub fn with_standard_devices() -> Self {
        let system = Self::new();
        system.add_device(AudioDevice::new("BuiltInMicrophoneDevice", SIM_MICROPHONE, DeviceDirection::Input));
        system.add_device(AudioDevice::new("BuiltInSpeakerDevice", SIM_SPEAKERS, DeviceDirection::Output));
        system.add_loopback();
        {
            let mut state = system.state.lock();
            state.default_output = Some("BuiltInSpeakerDevice".into());
            state.default_input = Some("BuiltInMicrophoneDevice".into());
        }
        system
    }

    /// Plug in a device. The first output/input becomes the default if none is set.
    pub fn add_device(&self, device: AudioDevice) {
        let mut state = self.state.lock();
        state.devices.retain(|d| !d.is_same(&device));
        state.devices.push(device);
        if state.default_output.is_none() {
            state.default_output = state.first_output();
        }
        if state.default_input.is_none() {
            state.default_input = state.first_input();
        }
    }

    /// Install the loopback driver device.
    pub fn add_loopback(&self) {
        self.add_device(AudioDevice::new("BlackHole2ch_UID", SIM_LOOPBACK, DeviceDirection::Both));
    }

    /// Unplug a device; defaults pointing at it fall back like Core Audio does.
    pub fn remove_device(&self, id: &str) -> Option<AudioDevice> {
        let mut state = self.state.lock();
        let index = state.devices.iter().position(|d| d.id == id)?;
        let removed = state.devices.remove(index);
        state.settle_defaults();
        Some(removed)
    }

    /// Change the default output outside the registry API (user action).
    pub fn force_default_output(&self, id: &str) {
        self.state.lock().default_output = Some(id.to_string());
    }

    /// Fail the next call of `op` with `error`. Queued errors fire in order.
    pub fn fail_once(&self, op: RegistryOp, error: DeviceError) {
        self.state.lock().one_shot.entry(op).or_default().push_back(error);
    }

    /// Fail every call of `op` until [`clear_faults`](Self::clear_faults).
    pub fn fail_always(&self, op: RegistryOp, error: DeviceError) {
        self.state.lock().persistent.insert(op, error);
    }

    pub fn clear_faults(&self) {
        let mut state = self.state.lock();
        state.one_shot.clear();
        state.persistent.clear();
    }

    pub fn call_count(&self, op: RegistryOp) -> usize {
        self.state.lock().calls.iter().filter(|&&c| c == op).count()
    }

    pub fn calls(&self) -> Vec<RegistryOp> {
        self.state.lock().calls.clone()
    }

    pub fn device_named(&self, name: &str) -> Option<AudioDevice> {
        self.state.lock().devices.iter().find(|d| d.name == name).cloned()
    }

    /// Current default output, bypassing faults and the call log.
    pub fn current_output(&self) -> Option<AudioDevice> {
        let state = self.state.lock();
        let device = state.default_output.as_deref().and_then(|id| state.find(id)).cloned();
        device
    }

    pub fn current_input(&self) -> Option<AudioDevice> {
        let state = self.state.lock();
        let device = state.default_input.as_deref().and_then(|id| state.find(id)).cloned();
        device
    }

    pub fn aggregates(&self) -> Vec<AudioDevice> {
        self.state.lock().devices.iter().filter(|d| d.is_aggregate).cloned().collect()
    }

    /// Sub-device ids of an aggregate, clock master first.
    pub fn aggregate_members(&self, id: &str) -> Option<Vec<String>> {
        self.state.lock().aggregate_members.get(id).cloned()
    }

    fn begin(&self, op: RegistryOp) -> Result<MutexGuard<'_, SimState>, DeviceError> {
        let mut state = self.state.lock();
        state.calls.push(op);
        if let Some(error) = state.one_shot.get_mut(&op).and_then(VecDeque::pop_front) {
            return Err(error);
        }
        if let Some(error) = state.persistent.get(&op).cloned() {
            return Err(error);
        }
        Ok(state)
    }

    fn existing(state: &SimState, device: &AudioDevice) -> Result<AudioDevice, DeviceError> {
        state
            .find(&device.id)
            .cloned()
            .ok_or_else(|| DeviceError::NotFound(device.name.clone()))
    }
}

impl AudioDeviceRegistry for SimulatedAudioSystem {
    fn list_devices(&self) -> Result<Vec<AudioDevice>, DeviceError> {
        let state = self.begin(RegistryOp::ListDevices)?;
        Ok(state.devices.clone())
    }

    fn default_output(&self) -> Result<AudioDevice, DeviceError> {
        let state = self.begin(RegistryOp::DefaultOutput)?;
        let device = state.default_output.as_deref().and_then(|id| state.find(id)).cloned();
        device.ok_or_else(|| DeviceError::NotFound("no default output device".into()))
    }

    fn default_input(&self) -> Result<AudioDevice, DeviceError> {
        let state = self.begin(RegistryOp::DefaultInput)?;
        let device = state.default_input.as_deref().and_then(|id| state.find(id)).cloned();
        device.ok_or_else(|| DeviceError::NotFound("no default input device".into()))
    }

    fn set_default_output(&self, device: &AudioDevice) -> Result<(), DeviceError> {
        let mut state = self.begin(RegistryOp::SetDefaultOutput)?;
        let device = Self::existing(&state, device)?;
        if !device.direction.has_output() {
            return Err(DeviceError::Failed(format!("{} has no output streams", device.name)));
        }
        state.default_output = Some(device.id);
        Ok(())
    }

    fn set_default_input(&self, device: &AudioDevice) -> Result<(), DeviceError> {
        let mut state = self.begin(RegistryOp::SetDefaultInput)?;
        let device = Self::existing(&state, device)?;
        if !device.direction.has_input() {
            return Err(DeviceError::Failed(format!("{} has no input streams", device.name)));
        }
        state.default_input = Some(device.id);
        Ok(())
    }

    fn create_aggregate_device(
        &self,
        loopback: &AudioDevice,
        original_output: &AudioDevice,
        name: &str,
    ) -> Result<AudioDevice, DeviceError> {
        let mut state = self.begin(RegistryOp::CreateAggregate)?;
        let loopback = Self::existing(&state, loopback)?;
        let master = Self::existing(&state, original_output)?;

        state.next_aggregate += 1;
        let aggregate = AudioDevice::aggregate(format!("sim-aggregate-{}", state.next_aggregate), name);
        state
            .aggregate_members
            .insert(aggregate.id.clone(), vec![master.id, loopback.id]);
        state.devices.push(aggregate.clone());
        Ok(aggregate)
    }

    fn destroy_aggregate_device(&self, device: &AudioDevice) -> Result<(), DeviceError> {
        let mut state = self.begin(RegistryOp::DestroyAggregate)?;
        let Some(index) = state.devices.iter().position(|d| d.is_same(device)) else {
            return Ok(());
        };
        if !state.devices[index].is_aggregate {
            return Err(DeviceError::Failed(format!("{} is not an aggregate device", device.name)));
        }
        state.devices.remove(index);
        state.aggregate_members.remove(&device.id);
        state.settle_defaults();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_topology() {
        let system = SimulatedAudioSystem::with_standard_devices();
        assert_eq!(system.default_output().unwrap().name, SIM_SPEAKERS);
        assert_eq!(system.default_input().unwrap().name, SIM_MICROPHONE);
        assert_eq!(system.list_devices().unwrap().len(), 3);
    }

    #[test]
    fn aggregate_lifecycle() {
        let system = SimulatedAudioSystem::with_standard_devices();
        let loopback = system.device_named(SIM_LOOPBACK).unwrap();
        let speakers = system.device_named(SIM_SPEAKERS).unwrap();

        let aggregate = system.create_aggregate_device(&loopback, &speakers, "SoundGrabber").unwrap();
        assert!(aggregate.is_aggregate);
        assert_eq!(
            system.aggregate_members(&aggregate.id).unwrap(),
            vec![speakers.id.clone(), loopback.id.clone()]
        );

        system.set_default_output(&aggregate).unwrap();
        system.destroy_aggregate_device(&aggregate).unwrap();
        assert!(system.aggregates().is_empty());
        assert_eq!(system.current_output().unwrap(), speakers);

        system.destroy_aggregate_device(&aggregate).unwrap();
    }

    #[test]
    fn faults_fire_in_order_then_clear() {
        let system = SimulatedAudioSystem::with_standard_devices();
        system.fail_once(RegistryOp::DefaultOutput, DeviceError::Transient("a".into()));
        system.fail_once(RegistryOp::DefaultOutput, DeviceError::Failed("b".into()));

        assert_eq!(system.default_output(), Err(DeviceError::Transient("a".into())));
        assert_eq!(system.default_output(), Err(DeviceError::Failed("b".into())));
        assert!(system.default_output().is_ok());
        assert_eq!(system.call_count(RegistryOp::DefaultOutput), 3);
    }

    #[test]
    fn removing_default_falls_back() {
        let system = SimulatedAudioSystem::with_standard_devices();
        system.add_device(AudioDevice::new("usb", "USB Headset", DeviceDirection::Both));
        system.force_default_output("usb");

        system.remove_device("usb");
        assert_eq!(system.current_output().unwrap().name, SIM_SPEAKERS);
    }

    #[test]
    fn cannot_destroy_real_device() {
        let system = SimulatedAudioSystem::with_standard_devices();
        let speakers = system.device_named(SIM_SPEAKERS).unwrap();
        assert!(system.destroy_aggregate_device(&speakers).is_err());
    }
}
