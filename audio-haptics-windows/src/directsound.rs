//! DirectSound capture of the default recording device.
//!
//! Last hardware fallback. DirectSound hands out a looping one-second
//! buffer and a capture cursor; `RingBufferBackend` decides when half a
//! buffer is ready and asks this driver to copy it out.

use std::ffi::c_void;

use windows::Win32::Media::Audio::DirectSound::*;
use windows::Win32::Media::Audio::WAVEFORMATEX;

use audio_haptics_core::capture::ring_buffer_backend::{RingBufferDriver, RingBufferLayout};
use audio_haptics_core::models::audio_models::{SampleFormat, StreamFormat};
use audio_haptics_core::models::error::CaptureError;
use audio_haptics_core::processing::capture_ring::ReadSpans;

use crate::convert::FORMAT_TAG_PCM;
use crate::error::PlatformError;
use crate::wasapi::ComApartment;

const SAMPLE_RATE: u32 = 44_100;
const CHANNELS: u16 = 2;
const BITS_PER_SAMPLE: u16 = 16;

struct Device {
    // Field order matters: the buffer must be released before its parent.
    buffer: IDirectSoundCaptureBuffer,
    _capture: IDirectSoundCapture,
    _com: ComApartment,
}

/// 44.1 kHz stereo 16-bit capture through `IDirectSoundCaptureBuffer`.
#[derive(Default)]
pub struct DirectSoundDriver {
    device: Option<Device>,
    running: bool,
}

// SAFETY: the capture objects are created in the multithreaded apartment,
// whose interfaces may be called from any thread. A host thread already in
// a single-threaded apartment is logged in `open`. The supervisor
// serializes every call through its backend mutex.
unsafe impl Send for DirectSoundDriver {}

impl DirectSoundDriver {
    pub fn new() -> Self {
        Self::default()
    }

    fn buffer(&self) -> Result<&IDirectSoundCaptureBuffer, CaptureError> {
        self.device
            .as_ref()
            .map(|d| &d.buffer)
            .ok_or_else(|| CaptureError::InvalidState("DirectSound not opened".into()))
    }

    fn wave_format() -> WAVEFORMATEX {
        let block_align = CHANNELS * BITS_PER_SAMPLE / 8;
        WAVEFORMATEX {
            wFormatTag: FORMAT_TAG_PCM,
            nChannels: CHANNELS,
            nSamplesPerSec: SAMPLE_RATE,
            nAvgBytesPerSec: SAMPLE_RATE * block_align as u32,
            nBlockAlign: block_align,
            wBitsPerSample: BITS_PER_SAMPLE,
            cbSize: 0,
        }
    }
}

impl RingBufferDriver for DirectSoundDriver {
    fn name(&self) -> &str {
        "DirectSound"
    }

    fn open(&mut self) -> Result<RingBufferLayout, CaptureError> {
        if self.device.is_some() {
            return Err(CaptureError::InvalidState("DirectSound already opened".into()));
        }
        let com = ComApartment::enter().map_err(PlatformError::into_setup_error)?;
        if !com.is_owned() {
            log::warn!("DirectSound opened on a single-threaded COM apartment");
        }

        let mut wave_format = Self::wave_format();
        // One second of audio.
        let buffer_bytes = wave_format.nAvgBytesPerSec;

        let mut capture: Option<IDirectSoundCapture> = None;
        unsafe { DirectSoundCaptureCreate(None, &mut capture, None) }
            .map_err(|_| CaptureError::DeviceNotAvailable)?;
        let capture = capture.ok_or(CaptureError::DeviceNotAvailable)?;

        let desc = DSCBUFFERDESC {
            dwSize: std::mem::size_of::<DSCBUFFERDESC>() as u32,
            dwFlags: 0,
            dwBufferBytes: buffer_bytes,
            dwReserved: 0,
            lpwfxFormat: &mut wave_format,
            dwFXCount: 0,
            lpDSCFXDesc: std::ptr::null_mut(),
        };
        let mut buffer: Option<IDirectSoundCaptureBuffer> = None;
        unsafe { capture.CreateCaptureBuffer(&desc, &mut buffer, None) }
            .map_err(|e| PlatformError::win("CreateCaptureBuffer", &e).into_setup_error())?;
        let buffer = buffer.ok_or_else(|| CaptureError::ConfigurationFailed("no capture buffer returned".into()))?;

        self.device = Some(Device {
            buffer,
            _capture: capture,
            _com: com,
        });

        let format = StreamFormat::new(SAMPLE_RATE, CHANNELS, SampleFormat::Int16);
        log::info!("DirectSound opened: {}, {} byte buffer", format, buffer_bytes);
        Ok(RingBufferLayout {
            format,
            buffer_bytes: buffer_bytes as usize,
        })
    }

    fn start(&mut self) -> Result<(), CaptureError> {
        let buffer = self.buffer()?;
        unsafe { buffer.Start(DSCBSTART_LOOPING) }
            .map_err(|e| CaptureError::from(PlatformError::win("IDirectSoundCaptureBuffer::Start", &e)))?;
        self.running = true;
        Ok(())
    }

    fn write_cursor(&mut self) -> Result<usize, CaptureError> {
        let buffer = self.buffer()?;
        let mut capture_pos = 0u32;
        let mut read_pos = 0u32;
        unsafe { buffer.GetCurrentPosition(Some(&mut capture_pos), Some(&mut read_pos)) }
            .map_err(|e| CaptureError::from(PlatformError::win("GetCurrentPosition", &e)))?;
        Ok(capture_pos as usize)
    }

    fn read_spans(&mut self, spans: &ReadSpans, out: &mut Vec<u8>) -> Result<(), CaptureError> {
        let buffer = self.buffer()?;
        let mut ptr1: *mut c_void = std::ptr::null_mut();
        let mut ptr2: *mut c_void = std::ptr::null_mut();
        let mut bytes1 = 0u32;
        let mut bytes2 = 0u32;

        unsafe {
            buffer
                .Lock(
                    spans.first.start as u32,
                    spans.len() as u32,
                    &mut ptr1,
                    &mut bytes1,
                    Some(&mut ptr2),
                    Some(&mut bytes2),
                    0,
                )
                .map_err(|e| CaptureError::from(PlatformError::win("IDirectSoundCaptureBuffer::Lock", &e)))?;

            // SAFETY: Lock returned up to two regions of the stated sizes,
            // valid until the matching Unlock.
            if !ptr1.is_null() && bytes1 > 0 {
                out.extend_from_slice(std::slice::from_raw_parts(ptr1 as *const u8, bytes1 as usize));
            }
            if !ptr2.is_null() && bytes2 > 0 {
                out.extend_from_slice(std::slice::from_raw_parts(ptr2 as *const u8, bytes2 as usize));
            }

            buffer
                .Unlock(ptr1, bytes1, Some(ptr2), bytes2)
                .map_err(|e| CaptureError::from(PlatformError::win("IDirectSoundCaptureBuffer::Unlock", &e)))?;
        }
        Ok(())
    }

    fn stop(&mut self) {
        if !self.running {
            return;
        }
        if let Some(device) = &self.device {
            if let Err(e) = unsafe { device.buffer.Stop() } {
                log::warn!("DirectSound stop failed: {}", e);
            }
        }
        self.running = false;
    }

    fn close(&mut self) {
        self.stop();
        self.device = None;
    }
}

impl Drop for DirectSoundDriver {
    fn drop(&mut self) {
        self.close();
    }
}
