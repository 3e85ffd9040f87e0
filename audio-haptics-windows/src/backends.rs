//! Registration helpers for the platform's backends.

use audio_haptics_core::capture::synthetic::SyntheticBackend;
use audio_haptics_core::traits::capture_backend::CaptureBackend;

/// Every capture backend this platform offers, in Auto fallback order.
///
/// The synthetic tone is always last so Auto mode can run without any
/// audio hardware.
pub fn default_backends() -> Vec<Box<dyn CaptureBackend>> {
    let mut backends: Vec<Box<dyn CaptureBackend>> = Vec::new();

    #[cfg(target_os = "windows")]
    {
        use audio_haptics_core::capture::ring_buffer_backend::RingBufferBackend;

        backends.push(Box::new(crate::wasapi_loopback::WasapiLoopbackCapture::default_device()));
        backends.push(Box::new(crate::wasapi_mic::WasapiMicCapture::default_device()));
        backends.push(Box::new(RingBufferBackend::new(crate::directsound::DirectSoundDriver::new())));
    }

    backends.push(Box::new(SyntheticBackend::new()));
    backends
}

/// The XInput rumble driver.
#[cfg(target_os = "windows")]
pub fn default_actuator() -> std::sync::Arc<dyn audio_haptics_core::traits::actuator::ActuatorBackend> {
    std::sync::Arc::new(crate::xinput::XInputActuator::new())
}
