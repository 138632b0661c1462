//! WASAPI client negotiation and the capture-client wrapper.
//!
//! Device path: activate an `IAudioClient` on the endpoint, take its native
//! mix format, initialize shared-mode event-driven (plus the loopback flag
//! for output capture), pre-roll one silent render buffer for loopback,
//! bind the data-ready event and start. Process path: synthesize a float
//! wire format from the host mix configuration and activate against the
//! process-loopback virtual device, blocking on the async completion.
//! Acquisition is all-or-nothing; every partially acquired handle drops
//! together on error.

use std::sync::mpsc;
use std::time::Duration;

use parking_lot::Mutex;
use windows::core::{implement, s, w, Interface, Ref, GUID};
use windows::Win32::Media::Audio::{
    ActivateAudioInterfaceAsync, IActivateAudioInterfaceAsyncOperation,
    IActivateAudioInterfaceCompletionHandler, IActivateAudioInterfaceCompletionHandler_Impl,
    IAudioCaptureClient, IAudioClient, IAudioRenderClient, IMMDevice, IMMDeviceEnumerator,
    MMDeviceEnumerator, AUDCLNT_E_DEVICE_INVALIDATED, AUDCLNT_SHAREMODE_SHARED,
    AUDCLNT_STREAMFLAGS_EVENTCALLBACK, AUDCLNT_STREAMFLAGS_LOOPBACK,
    AUDIOCLIENT_ACTIVATION_PARAMS, AUDIOCLIENT_ACTIVATION_PARAMS_0,
    AUDIOCLIENT_ACTIVATION_TYPE_PROCESS_LOOPBACK, AUDIOCLIENT_PROCESS_LOOPBACK_PARAMS,
    PROCESS_LOOPBACK_MODE_INCLUDE_TARGET_PROCESS_TREE, VIRTUAL_AUDIO_DEVICE_PROCESS_LOOPBACK,
    WAVEFORMATEX, WAVEFORMATEXTENSIBLE, WAVEFORMATEXTENSIBLE_0,
};
use windows::Win32::System::Com::StructuredStorage::PROPVARIANT;
use windows::Win32::System::Com::{
    CoCreateInstance, CoTaskMemFree, CLSCTX_ALL, BLOB,
};
use windows::Win32::System::LibraryLoader::{GetModuleHandleW, GetProcAddress, LoadLibraryW};
use windows::Win32::System::Variant::VT_BLOB;

use endpoint_capture_core::{
    AudioBackend, CaptureClient, CaptureError, HostMixProfile, OpenClient, Packet, SignalSetter,
    StreamFormat,
};

use crate::com::MtaGuard;
use crate::enumerator::widen;
use crate::event_relay::EventRelay;

/// Shared-mode buffer duration: 5 seconds in 100 ns units.
const BUFFER_TIME_100NS: i64 = 5 * 10_000_000;

const ACTIVATION_TIMEOUT: Duration = Duration::from_secs(5);

const WAVE_FORMAT_EXTENSIBLE_TAG: u16 = 0xFFFE;

// KSDATAFORMAT_SUBTYPE_IEEE_FLOAT
const SUBTYPE_IEEE_FLOAT: GUID = GUID::from_u128(0x00000003_0000_0010_8000_00aa00389b71);

/// WASAPI implementation of the core's negotiator seam.
pub struct WasapiBackend {
    enumerator: IMMDeviceEnumerator,
    host_mix: HostMixProfile,
    _mta: MtaGuard,
}

// SAFETY: the enumerator is free-threaded and the MTA guard keeps calling
// threads apartment members.
unsafe impl Send for WasapiBackend {}

impl WasapiBackend {
    /// `host_mix` describes the host's mix configuration, used to synthesize
    /// the wire format for process-loopback clients.
    pub fn new(host_mix: HostMixProfile) -> Result<Self, CaptureError> {
        let mta = MtaGuard::new()?;
        let enumerator: IMMDeviceEnumerator =
            unsafe { CoCreateInstance(&MMDeviceEnumerator, None, CLSCTX_ALL) }.map_err(|e| {
                CaptureError::ResourceCreationFailed(format!("failed to create enumerator: {e}"))
            })?;
        Ok(Self {
            enumerator,
            host_mix,
            _mta: mta,
        })
    }

    fn device(&self, endpoint_id: &str) -> Result<IMMDevice, CaptureError> {
        let wide = widen(endpoint_id);
        unsafe { self.enumerator.GetDevice(windows::core::PCWSTR(wide.as_ptr())) }
            .map_err(|e| CaptureError::DeviceNotFound(format!("{endpoint_id}: {e}")))
    }
}

impl AudioBackend for WasapiBackend {
    fn open_device_client(
        &mut self,
        endpoint_id: &str,
        loopback: bool,
        data_ready: &SignalSetter,
    ) -> Result<OpenClient, CaptureError> {
        unsafe {
            let device = self.device(endpoint_id)?;
            let client: IAudioClient = device.Activate(CLSCTX_ALL, None).map_err(|e| {
                CaptureError::ClientInitFailed(format!("Activate failed: {e}"))
            })?;

            let mix_ptr = client.GetMixFormat().map_err(|e| {
                CaptureError::ClientInitFailed(format!("GetMixFormat failed: {e}"))
            })?;
            let _mix = TaskMem(mix_ptr.cast());
            let format = stream_format_of(mix_ptr);
            let channels = (*mix_ptr).nChannels;

            let mut flags = AUDCLNT_STREAMFLAGS_EVENTCALLBACK;
            if loopback {
                flags |= AUDCLNT_STREAMFLAGS_LOOPBACK;
            }
            client
                .Initialize(
                    AUDCLNT_SHAREMODE_SHARED,
                    flags,
                    BUFFER_TIME_100NS,
                    0,
                    mix_ptr,
                    None,
                )
                .map_err(|e| CaptureError::ClientInitFailed(format!("Initialize failed: {e}")))?;

            if loopback {
                prime_silent_render(&device)?;
            }

            finish_client(client, format, channels, data_ready)
        }
    }

    fn open_process_client(
        &mut self,
        process_id: u32,
        data_ready: &SignalSetter,
    ) -> Result<OpenClient, CaptureError> {
        if !process_loopback_available() {
            return Err(CaptureError::UnsupportedPlatform);
        }

        unsafe {
            let wfx = process_wire_format(&self.host_mix);

            let loopback_params = AUDIOCLIENT_ACTIVATION_PARAMS {
                ActivationType: AUDIOCLIENT_ACTIVATION_TYPE_PROCESS_LOOPBACK,
                Anonymous: AUDIOCLIENT_ACTIVATION_PARAMS_0 {
                    ProcessLoopbackParams: AUDIOCLIENT_PROCESS_LOOPBACK_PARAMS {
                        TargetProcessId: process_id,
                        ProcessLoopbackMode: PROCESS_LOOPBACK_MODE_INCLUDE_TARGET_PROCESS_TREE,
                    },
                },
            };
            let mut activate_params = std::mem::zeroed::<PROPVARIANT>();
            activate_params.Anonymous.Anonymous.vt = VT_BLOB;
            activate_params.Anonymous.Anonymous.Anonymous.blob = BLOB {
                cbSize: std::mem::size_of::<AUDIOCLIENT_ACTIVATION_PARAMS>() as u32,
                pBlobData: &loopback_params as *const _ as *mut u8,
            };

            log::info!("activating process loopback for pid {process_id}");

            let (tx, rx) = mpsc::channel();
            let handler: IActivateAudioInterfaceCompletionHandler = ActivationHandler {
                result: Mutex::new(Some(tx)),
            }
            .into();
            let _operation = ActivateAudioInterfaceAsync(
                VIRTUAL_AUDIO_DEVICE_PROCESS_LOOPBACK,
                &IAudioClient::IID,
                Some(&activate_params),
                &handler,
            )
            .map_err(|e| {
                CaptureError::ActivationFailed(format!("ActivateAudioInterfaceAsync failed: {e}"))
            })?;

            let client = rx
                .recv_timeout(ACTIVATION_TIMEOUT)
                .map_err(|_| {
                    CaptureError::ActivationFailed("activation did not complete".into())
                })??;

            client
                .Initialize(
                    AUDCLNT_SHAREMODE_SHARED,
                    AUDCLNT_STREAMFLAGS_EVENTCALLBACK | AUDCLNT_STREAMFLAGS_LOOPBACK,
                    BUFFER_TIME_100NS,
                    0,
                    &wfx.Format,
                    None,
                )
                .map_err(|e| {
                    CaptureError::ClientInitFailed(format!(
                        "Initialize (process loopback) failed: {e}"
                    ))
                })?;

            let format = StreamFormat::from_wire(
                self.host_mix.channel_mask,
                self.host_mix.channels,
                self.host_mix.sample_rate,
            );
            finish_client(client, format, self.host_mix.channels, data_ready)
        }
    }
}

/// Whether the process-loopback activation entry point exists on this
/// platform.
fn process_loopback_available() -> bool {
    unsafe {
        let module = GetModuleHandleW(w!("Mmdevapi.dll"))
            .or_else(|_| LoadLibraryW(w!("Mmdevapi.dll")));
        match module {
            Ok(module) => GetProcAddress(module, s!("ActivateAudioInterfaceAsync")).is_some(),
            Err(_) => false,
        }
    }
}

/// Obtain the capture interface, bind the data-ready event and start the
/// client. Failure releases everything acquired so far as a unit.
unsafe fn finish_client(
    client: IAudioClient,
    format: StreamFormat,
    channels: u16,
    data_ready: &SignalSetter,
) -> Result<OpenClient, CaptureError> {
    let capture: IAudioCaptureClient = client
        .GetService()
        .map_err(|e| CaptureError::CaptureStartFailed(format!("GetService failed: {e}")))?;

    let relay = EventRelay::new(data_ready.clone())?;
    client
        .SetEventHandle(relay.handle())
        .map_err(|e| CaptureError::CaptureStartFailed(format!("SetEventHandle failed: {e}")))?;
    client
        .Start()
        .map_err(|e| CaptureError::CaptureStartFailed(format!("Start failed: {e}")))?;

    Ok(OpenClient {
        client: Box::new(WasapiCaptureClient {
            client,
            capture,
            _relay: relay,
            channels: channels as usize,
        }),
        format,
    })
}

/// Pre-roll one silent buffer through a render client on the same device.
/// Render-less loopback endpoints stop producing packets during true
/// silence, which stalls timestamps and capture events.
unsafe fn prime_silent_render(device: &IMMDevice) -> Result<(), CaptureError> {
    let client: IAudioClient = device.Activate(CLSCTX_ALL, None).map_err(|e| {
        CaptureError::ClientInitFailed(format!("render Activate failed: {e}"))
    })?;
    let mix_ptr = client.GetMixFormat().map_err(|e| {
        CaptureError::ClientInitFailed(format!("render GetMixFormat failed: {e}"))
    })?;
    let _mix = TaskMem(mix_ptr.cast());

    client
        .Initialize(AUDCLNT_SHAREMODE_SHARED, 0, BUFFER_TIME_100NS, 0, mix_ptr, None)
        .map_err(|e| CaptureError::ClientInitFailed(format!("render Initialize failed: {e}")))?;

    let frames = client
        .GetBufferSize()
        .map_err(|e| CaptureError::ClientInitFailed(format!("GetBufferSize failed: {e}")))?;
    let render: IAudioRenderClient = client
        .GetService()
        .map_err(|e| CaptureError::ClientInitFailed(format!("render GetService failed: {e}")))?;
    let buffer = render
        .GetBuffer(frames)
        .map_err(|e| CaptureError::ClientInitFailed(format!("render GetBuffer failed: {e}")))?;
    std::ptr::write_bytes(buffer, 0, frames as usize * (*mix_ptr).nBlockAlign as usize);
    render
        .ReleaseBuffer(frames, 0)
        .map_err(|e| CaptureError::ClientInitFailed(format!("render ReleaseBuffer failed: {e}")))?;

    Ok(())
}

unsafe fn stream_format_of(wfex: *const WAVEFORMATEX) -> StreamFormat {
    let base = &*wfex;
    let channel_mask = if base.wFormatTag == WAVE_FORMAT_EXTENSIBLE_TAG {
        let ext = wfex as *const WAVEFORMATEXTENSIBLE;
        // The extensible struct is packed; read unaligned.
        std::ptr::read_unaligned(std::ptr::addr_of!((*ext).dwChannelMask))
    } else {
        0
    };
    StreamFormat::from_wire(channel_mask, base.nChannels, base.nSamplesPerSec)
}

/// 32-bit float wire format matching the host mix configuration, for
/// process-loopback clients that have no device format to interrogate.
fn process_wire_format(mix: &HostMixProfile) -> WAVEFORMATEXTENSIBLE {
    const BITS_PER_SAMPLE: u16 = 32;
    let block_align = mix.channels * BITS_PER_SAMPLE / 8;
    WAVEFORMATEXTENSIBLE {
        Format: WAVEFORMATEX {
            wFormatTag: WAVE_FORMAT_EXTENSIBLE_TAG,
            nChannels: mix.channels,
            nSamplesPerSec: mix.sample_rate,
            nAvgBytesPerSec: mix.sample_rate * block_align as u32,
            nBlockAlign: block_align,
            wBitsPerSample: BITS_PER_SAMPLE,
            cbSize: (std::mem::size_of::<WAVEFORMATEXTENSIBLE>()
                - std::mem::size_of::<WAVEFORMATEX>()) as u16,
        },
        Samples: WAVEFORMATEXTENSIBLE_0 {
            wValidBitsPerSample: BITS_PER_SAMPLE,
        },
        dwChannelMask: mix.channel_mask,
        SubFormat: SUBTYPE_IEEE_FLOAT,
    }
}

/// Completion handler for the async process-loopback activation.
#[implement(IActivateAudioInterfaceCompletionHandler)]
struct ActivationHandler {
    result: Mutex<Option<mpsc::Sender<Result<IAudioClient, CaptureError>>>>,
}

impl IActivateAudioInterfaceCompletionHandler_Impl for ActivationHandler_Impl {
    fn ActivateCompleted(
        &self,
        operation: Ref<'_, IActivateAudioInterfaceAsyncOperation>,
    ) -> windows::core::Result<()> {
        let operation = operation.ok()?;
        let outcome = unsafe { activation_outcome(operation) };
        if let Some(tx) = self.result.lock().take() {
            let _ = tx.send(outcome);
        }
        Ok(())
    }
}

unsafe fn activation_outcome(
    operation: &IActivateAudioInterfaceAsyncOperation,
) -> Result<IAudioClient, CaptureError> {
    let mut activate_hr = windows::core::HRESULT(0);
    let mut unknown: Option<windows::core::IUnknown> = None;
    operation
        .GetActivateResult(&mut activate_hr, &mut unknown)
        .map_err(|e| CaptureError::ActivationFailed(format!("GetActivateResult failed: {e}")))?;
    if activate_hr.is_err() {
        return Err(CaptureError::ActivationFailed(format!(
            "async activation failed: 0x{:08X}",
            activate_hr.0 as u32
        )));
    }
    unknown
        .ok_or_else(|| CaptureError::ActivationFailed("activation returned no interface".into()))?
        .cast::<IAudioClient>()
        .map_err(|e| CaptureError::ActivationFailed(format!("unexpected interface: {e}")))
}

/// A running WASAPI capture interface. Dropping it stops the client and
/// releases the pair.
struct WasapiCaptureClient {
    client: IAudioClient,
    capture: IAudioCaptureClient,
    _relay: EventRelay,
    channels: usize,
}

// SAFETY: WASAPI clients are free-threaded; the core guarantees a single
// owner drives the pair at any time.
unsafe impl Send for WasapiCaptureClient {}

impl CaptureClient for WasapiCaptureClient {
    fn next_packet_size(&mut self) -> Result<u32, CaptureError> {
        unsafe { self.capture.GetNextPacketSize() }
            .map_err(|e| drain_error("GetNextPacketSize", e))
    }

    fn read_packet(&mut self) -> Result<Packet<'_>, CaptureError> {
        unsafe {
            let mut data: *mut u8 = std::ptr::null_mut();
            let mut frames = 0u32;
            let mut flags = 0u32;
            let mut device_position = 0u64;
            let mut device_time = 0u64;
            self.capture
                .GetBuffer(
                    &mut data,
                    &mut frames,
                    &mut flags,
                    Some(&mut device_position),
                    Some(&mut device_time),
                )
                .map_err(|e| drain_error("GetBuffer", e))?;

            // Shared-mode capture is always 32-bit float.
            let samples =
                std::slice::from_raw_parts(data as *const f32, frames as usize * self.channels);
            Ok(Packet {
                samples,
                frames,
                flags,
                device_position,
                device_time,
            })
        }
    }

    fn release_packet(&mut self, frames: u32) -> Result<(), CaptureError> {
        unsafe { self.capture.ReleaseBuffer(frames) }.map_err(|e| drain_error("ReleaseBuffer", e))
    }
}

impl Drop for WasapiCaptureClient {
    fn drop(&mut self) {
        unsafe {
            let _ = self.client.Stop();
        }
    }
}

fn drain_error(call: &str, err: windows::core::Error) -> CaptureError {
    if err.code() != AUDCLNT_E_DEVICE_INVALIDATED {
        log::warn!("{call} failed: 0x{:08X}", err.code().0 as u32);
    }
    CaptureError::DeviceInvalidated
}

/// CoTaskMemAlloc'd pointer released on drop.
struct TaskMem(*mut core::ffi::c_void);

impl Drop for TaskMem {
    fn drop(&mut self) {
        unsafe {
            CoTaskMemFree(Some(self.0));
        }
    }
}
