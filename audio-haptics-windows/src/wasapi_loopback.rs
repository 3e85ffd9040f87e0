//! WASAPI loopback capture of the default render endpoint.
//!
//! Captures whatever the system is playing, in the mix format of the
//! output device (usually 48 kHz stereo float).

use std::time::Duration;

use audio_haptics_core::models::audio_models::{BackendKind, StreamFormat};
use audio_haptics_core::models::error::CaptureError;
use audio_haptics_core::traits::capture_backend::{CaptureBackend, RawBlock};

use crate::wasapi::{Endpoint, WasapiStream};

/// System-audio capture. First choice in Auto mode.
pub struct WasapiLoopbackCapture {
    stream: WasapiStream,
}

impl WasapiLoopbackCapture {
    /// Capture from the default render device.
    pub fn default_device() -> Self {
        Self {
            stream: WasapiStream::new(Endpoint::Loopback),
        }
    }
}

impl Default for WasapiLoopbackCapture {
    fn default() -> Self {
        Self::default_device()
    }
}

impl CaptureBackend for WasapiLoopbackCapture {
    fn kind(&self) -> BackendKind {
        BackendKind::SystemLoopback
    }

    fn open(&mut self) -> Result<StreamFormat, CaptureError> {
        let format = self.stream.open()?;
        log::info!("WASAPI loopback opened: {}", format);
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
