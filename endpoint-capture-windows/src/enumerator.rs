//! Windows endpoint enumeration via the MMDevice API.
//!
//! Wraps `IMMDeviceEnumerator` behind the core's `EndpointEnumerator` seam:
//! default/by-id resolution and direction-filtered listings with friendly
//! names, plus default-endpoint-changed notifications through an
//! `IMMNotificationClient` forwarding into the core's sink.

use std::sync::Arc;

use windows::core::{implement, PCWSTR};
use windows::Win32::Devices::FunctionDiscovery::PKEY_Device_FriendlyName;
use windows::Win32::Media::Audio::{
    eCapture, eCommunications, eConsole, eRender, EDataFlow, ERole, IMMDevice,
    IMMDeviceEnumerator, IMMNotificationClient, IMMNotificationClient_Impl, MMDeviceEnumerator,
    DEVICE_STATE, DEVICE_STATE_ACTIVE,
};
use windows::Win32::System::Com::StructuredStorage::{PropVariantClear, PROPVARIANT};
use windows::Win32::System::Com::{CoCreateInstance, CLSCTX_ALL, STGM_READ};
use windows::Win32::System::Variant::VT_LPWSTR;
use windows::Win32::UI::Shell::PropertiesSystem::PROPERTYKEY;

use endpoint_capture_core::{
    CaptureError, EndpointDirection, EndpointEnumerator, EndpointInfo, EndpointNotificationSink,
    EndpointRole, NotificationRegistration,
};

use crate::com::MtaGuard;

pub(crate) fn widen(value: &str) -> Vec<u16> {
    value.encode_utf16().chain(std::iter::once(0)).collect()
}

fn data_flow(direction: EndpointDirection) -> EDataFlow {
    match direction {
        EndpointDirection::Capture => eCapture,
        EndpointDirection::Render => eRender,
    }
}

fn endpoint_role(role: EndpointRole) -> ERole {
    match role {
        EndpointRole::Console => eConsole,
        EndpointRole::Communications => eCommunications,
    }
}

fn direction_of(flow: EDataFlow) -> EndpointDirection {
    if flow == eCapture {
        EndpointDirection::Capture
    } else {
        EndpointDirection::Render
    }
}

fn role_of(role: ERole) -> Option<EndpointRole> {
    if role == eConsole {
        Some(EndpointRole::Console)
    } else if role == eCommunications {
        Some(EndpointRole::Communications)
    } else {
        None
    }
}

/// Audio endpoint enumerator over the MMDevice API.
pub struct MmEndpointEnumerator {
    enumerator: IMMDeviceEnumerator,
    _mta: MtaGuard,
}

// SAFETY: the MMDevice enumerator is a free-threaded COM object; the MTA
// guard keeps every calling thread an implicit apartment member.
unsafe impl Send for MmEndpointEnumerator {}
unsafe impl Sync for MmEndpointEnumerator {}

impl MmEndpointEnumerator {
    pub fn new() -> Result<Self, CaptureError> {
        let mta = MtaGuard::new()?;
        let enumerator: IMMDeviceEnumerator =
            unsafe { CoCreateInstance(&MMDeviceEnumerator, None, CLSCTX_ALL) }.map_err(|e| {
                CaptureError::ResourceCreationFailed(format!("failed to create enumerator: {e}"))
            })?;
        Ok(Self {
            enumerator,
            _mta: mta,
        })
    }

    fn device_info(device: &IMMDevice) -> Result<EndpointInfo, CaptureError> {
        unsafe {
            let id = device
                .GetId()
                .map_err(|e| CaptureError::DeviceNotFound(format!("GetId failed: {e}")))?
                .to_string()
                .unwrap_or_default();
            let name = Self::friendly_name(device).unwrap_or_default();
            Ok(EndpointInfo { id, name })
        }
    }

    /// Read `PKEY_Device_FriendlyName` from the device's property store.
    fn friendly_name(device: &IMMDevice) -> Option<String> {
        unsafe {
            let store = device.OpenPropertyStore(STGM_READ).ok()?;

            let mut prop_variant = std::mem::zeroed::<PROPVARIANT>();
            store
                .GetValue(&PKEY_Device_FriendlyName, &mut prop_variant)
                .ok()?;

            let name = if prop_variant.Anonymous.Anonymous.vt == VT_LPWSTR {
                let pwsz = prop_variant.Anonymous.Anonymous.Anonymous.pwszVal;
                if pwsz.is_null() {
                    None
                } else {
                    pwsz.to_string().ok()
                }
            } else {
                None
            };

            PropVariantClear(&mut prop_variant).ok();
            name
        }
    }
}

impl EndpointEnumerator for MmEndpointEnumerator {
    fn default_endpoint(
        &self,
        direction: EndpointDirection,
        role: EndpointRole,
    ) -> Result<EndpointInfo, CaptureError> {
        unsafe {
            let device = self
                .enumerator
                .GetDefaultAudioEndpoint(data_flow(direction), endpoint_role(role))
                .map_err(|e| {
                    CaptureError::EndpointUnavailable(format!("GetDefaultAudioEndpoint failed: {e}"))
                })?;
            Self::device_info(&device)
        }
    }

    fn endpoint_by_id(&self, id: &str) -> Result<EndpointInfo, CaptureError> {
        let wide = widen(id);
        unsafe {
            let device = self
                .enumerator
                .GetDevice(PCWSTR(wide.as_ptr()))
                .map_err(|e| CaptureError::DeviceNotFound(format!("{id}: {e}")))?;
            Self::device_info(&device)
        }
    }

    fn endpoints(&self, direction: EndpointDirection) -> Result<Vec<EndpointInfo>, CaptureError> {
        unsafe {
            let collection = self
                .enumerator
                .EnumAudioEndpoints(data_flow(direction), DEVICE_STATE_ACTIVE)
                .map_err(|e| {
                    CaptureError::DeviceNotFound(format!("EnumAudioEndpoints failed: {e}"))
                })?;
            let count = collection
                .GetCount()
                .map_err(|e| CaptureError::DeviceNotFound(format!("GetCount failed: {e}")))?;

            let mut endpoints = Vec::with_capacity(count as usize);
            for i in 0..count {
                let Ok(device) = collection.Item(i) else {
                    continue;
                };
                if let Ok(info) = Self::device_info(&device) {
                    endpoints.push(info);
                }
            }
            Ok(endpoints)
        }
    }

    fn register_notifications(
        &self,
        sink: Arc<dyn EndpointNotificationSink>,
    ) -> Result<Box<dyn NotificationRegistration>, CaptureError> {
        let client: IMMNotificationClient = EndpointNotify { sink }.into();
        unsafe {
            self.enumerator
                .RegisterEndpointNotificationCallback(&client)
                .map_err(|e| {
                    CaptureError::ResourceCreationFailed(format!(
                        "failed to register endpoint callback: {e}"
                    ))
                })?;
        }
        Ok(Box::new(MmNotificationRegistration {
            enumerator: self.enumerator.clone(),
            client: Some(client),
        }))
    }
}

/// Notification sink shared between the enumerator and the session until
/// unregistered.
#[implement(IMMNotificationClient)]
struct EndpointNotify {
    sink: Arc<dyn EndpointNotificationSink>,
}

impl IMMNotificationClient_Impl for EndpointNotify_Impl {
    fn OnDeviceStateChanged(
        &self,
        _device_id: &PCWSTR,
        _new_state: DEVICE_STATE,
    ) -> windows::core::Result<()> {
        Ok(())
    }

    fn OnDeviceAdded(&self, _device_id: &PCWSTR) -> windows::core::Result<()> {
        Ok(())
    }

    fn OnDeviceRemoved(&self, _device_id: &PCWSTR) -> windows::core::Result<()> {
        Ok(())
    }

    fn OnDefaultDeviceChanged(
        &self,
        flow: EDataFlow,
        role: ERole,
        default_id: &PCWSTR,
    ) -> windows::core::Result<()> {
        let Some(role) = role_of(role) else {
            return Ok(());
        };
        let id = if default_id.is_null() {
            None
        } else {
            unsafe { default_id.to_string().ok() }
        };
        self.sink
            .default_endpoint_changed(direction_of(flow), role, id.as_deref());
        Ok(())
    }

    fn OnPropertyValueChanged(
        &self,
        _device_id: &PCWSTR,
        _key: &PROPERTYKEY,
    ) -> windows::core::Result<()> {
        Ok(())
    }
}

struct MmNotificationRegistration {
    enumerator: IMMDeviceEnumerator,
    client: Option<IMMNotificationClient>,
}

// SAFETY: both interfaces are free-threaded (see MmEndpointEnumerator).
unsafe impl Send for MmNotificationRegistration {}

impl NotificationRegistration for MmNotificationRegistration {
    fn unregister(&mut self) {
        if let Some(client) = self.client.take() {
            unsafe {
                let _ = self
                    .enumerator
                    .UnregisterEndpointNotificationCallback(&client);
            }
        }
    }
}

impl Drop for MmNotificationRegistration {
    fn drop(&mut self) {
        self.unregister();
    }
}
