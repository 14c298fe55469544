//! Core Audio aggregate (multi-output) devices.
//!
//! The aggregate plays to the original output, which is also its clock
//! master, and mirrors the same stream into the loopback device. The device
//! is public so every process's output lands in it once it is the default.
//! A public aggregate outlives a crash; the persisted routing plan and
//! startup repair destroy it on the next run.

use std::ffi::c_void;
use std::mem;

use core_foundation::array::CFArray;
use core_foundation::base::{CFType, TCFType};
use core_foundation::dictionary::CFDictionary;
use core_foundation::number::CFNumber;
use core_foundation::string::{CFString, CFStringRef};
use coreaudio_sys::{
    kAudioHardwarePropertyDefaultOutputDevice, kAudioHardwarePropertyTranslateUIDToDevice,
    kAudioObjectPropertyScopeGlobal, kAudioObjectSystemObject,
    kAudioObjectUnknown, AudioHardwareCreateAggregateDevice, AudioHardwareDestroyAggregateDevice, AudioObjectGetPropertyData,
    AudioObjectID, AudioObjectSetPropertyData, AudioObjectPropertyAddress, OSStatus,
};

use soundgrabber_core::models::error::DeviceError;

use crate::registry::AggregateLayout;

// Keys from AudioHardware.h (kAudioAggregateDevice*Key, kAudioSubDeviceUIDKey).
const KEY_NAME: &str = "name";
const KEY_UID: &str = "uid";
const KEY_PRIVATE: &str = "private";
const KEY_STACKED: &str = "stacked";
const KEY_MASTER: &str = "master";
const KEY_SUBDEVICES: &str = "subdevices";

/// `kAudioHardwareBadDeviceError` ('!dev').
const BAD_DEVICE: OSStatus = 0x2164_6576;

/// Create the aggregate and return its Core Audio object id.
pub fn create(layout: &AggregateLayout) -> Result<AudioObjectID, DeviceError> {
    let members: Vec<CFType> = layout.subdevice_uids.iter().map(|uid| subdevice(uid)).collect();
    let subdevices = CFArray::from_CFTypes(&members);
    let description = CFDictionary::from_CFType_pairs(&[
        (key(KEY_NAME), CFString::new(&layout.name).as_CFType()),
        (key(KEY_UID), CFString::new(&layout.uid).as_CFType()),
        (key(KEY_PRIVATE), flag(layout.private)),
        (key(KEY_STACKED), flag(layout.stacked)),
        (key(KEY_MASTER), CFString::new(&layout.master_uid).as_CFType()),
        (key(KEY_SUBDEVICES), subdevices.as_CFType()),
    ]);

    let mut device_id: AudioObjectID = 0;
    let status = unsafe { AudioHardwareCreateAggregateDevice(description.as_concrete_TypeRef() as _, &mut device_id) };
    if status != 0 {
        return Err(DeviceError::Failed(format!(
            "AudioHardwareCreateAggregateDevice failed (OSStatus {status})"
        )));
    }
    if device_id == kAudioObjectUnknown as AudioObjectID {
        return Err(DeviceError::Transient("aggregate device was not published".into()));
    }
    log::info!(
        "Created aggregate device \"{}\" ({}, object {})",
        layout.name,
        layout.uid,
        device_id
    );
    Ok(device_id)
}

/// Destroy the aggregate with `uid`. A device that no longer exists is success.
pub fn destroy(uid: &str) -> Result<(), DeviceError> {
    let Some(device_id) = translate_uid(uid)? else {
        log::info!("Aggregate {} already gone", uid);
        return Ok(());
    };

    let status = unsafe { AudioHardwareDestroyAggregateDevice(device_id) };
    match status {
        0 => {
            log::info!("Destroyed aggregate device {} (object {})", uid, device_id);
            Ok(())
        }
        BAD_DEVICE => Ok(()),
        _ => Err(DeviceError::Failed(format!(
            "AudioHardwareDestroyAggregateDevice failed (OSStatus {status})"
        ))),
    }
}

/// Map a device UID to its object id, `None` when no such device exists.
pub fn translate_uid(uid: &str) -> Result<Option<AudioObjectID>, DeviceError> {
    let address = global_address(kAudioHardwarePropertyTranslateUIDToDevice as _);
    let cf_uid = CFString::new(uid);
    let uid_ref: CFStringRef = cf_uid.as_concrete_TypeRef();
    let mut device_id = kAudioObjectUnknown as AudioObjectID;
    let mut size = mem::size_of::<AudioObjectID>() as u32;

    let status = unsafe {
        AudioObjectGetPropertyData(
            kAudioObjectSystemObject as AudioObjectID,
            &address,
            mem::size_of::<CFStringRef>() as u32,
            &uid_ref as *const CFStringRef as *const c_void,
            &mut size,
            &mut device_id as *mut AudioObjectID as *mut c_void,
        )
    };
    if status != 0 {
        return Err(DeviceError::Transient(format!("UID lookup failed (OSStatus {status})")));
    }
    Ok((device_id != kAudioObjectUnknown as AudioObjectID).then_some(device_id))
}

/// Make the device with `uid` the system default output.
pub fn set_default_output(uid: &str) -> Result<(), DeviceError> {
    let Some(device_id) = translate_uid(uid)? else {
        return Err(DeviceError::Transient(format!("aggregate {uid} not published yet")));
    };
    let address = global_address(kAudioHardwarePropertyDefaultOutputDevice as _);
    let status = unsafe {
        AudioObjectSetPropertyData(
            kAudioObjectSystemObject as AudioObjectID,
            &address,
            0,
            std::ptr::null(),
            mem::size_of::<AudioObjectID>() as u32,
            &device_id as *const AudioObjectID as *const c_void,
        )
    };
    if status != 0 {
        return Err(DeviceError::Failed(format!(
            "setting default output to {uid} failed (OSStatus {status})"
        )));
    }
    Ok(())
}

fn global_address(selector: u32) -> AudioObjectPropertyAddress {
    AudioObjectPropertyAddress {
        mSelector: selector,
        mScope: kAudioObjectPropertyScopeGlobal as _,
        mElement: 0,
    }
}

fn key(name: &'static str) -> CFString {
    CFString::from_static_string(name)
}

fn flag(on: bool) -> CFType {
    CFNumber::from(i32::from(on)).as_CFType()
}

fn subdevice(uid: &str) -> CFType {
    CFDictionary::from_CFType_pairs(&[(key(KEY_UID), CFString::new(uid).as_CFType())]).as_CFType()
}
