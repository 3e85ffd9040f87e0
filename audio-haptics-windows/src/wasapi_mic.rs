//! WASAPI microphone capture.
//!
//! Opens a capture endpoint in shared mode. Used when loopback is
//! unavailable, or when the user asks for the microphone explicitly.

use std::time::Duration;

use audio_haptics_core::models::audio_models::{BackendKind, StreamFormat};
use audio_haptics_core::models::error::CaptureError;
use audio_haptics_core::traits::capture_backend::{CaptureBackend, RawBlock};

use crate::wasapi::{Endpoint, WasapiStream};

pub struct WasapiMicCapture {
    device_name: String,
    stream: WasapiStream,
}

impl WasapiMicCapture {
    /// Capture from the system default microphone.
    pub fn default_device() -> Self {
        Self {
            device_name: BackendKind::Microphone.display_name().into(),
            stream: WasapiStream::new(Endpoint::Microphone { device_id: None }),
        }
    }

    /// Capture from a specific endpoint by its MMDevice id.
    pub fn with_device(id: String, name: String) -> Self {
        Self {
            device_name: name,
            stream: WasapiStream::new(Endpoint::Microphone { device_id: Some(id) }),
        }
    }
}

impl Default for WasapiMicCapture {
    fn default() -> Self {
        Self::default_device()
    }
}

impl CaptureBackend for WasapiMicCapture {
    fn kind(&self) -> BackendKind {
        BackendKind::Microphone
    }

    fn name(&self) -> &str {
        &self.device_name
    }

    fn open(&mut self) -> Result<StreamFormat, CaptureError> {
        let format = self.stream.open()?;
        log::info!("WASAPI microphone '{}' opened: {}", self.device_name, format);
        Ok(format)
    }

    fn start(&mut self) -> Result<(), CaptureError> {
        self.stream.start()
    }

    fn poll_next_block(&mut self, timeout: Duration) -> Result<Option<RawBlock<'_>>, CaptureError> {
        self.stream.poll(timeout)
    }

    fn stop(&mut self) {
        self.stream.stop();
    }

    fn close(&mut self) {
        self.stream.close();
    }
}
