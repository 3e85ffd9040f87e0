use thiserror::Error;

use audio_haptics_core::models::error::{ActuatorError, CaptureError};
use audio_haptics_core::models::gamepad::DeviceId;

/// Failures from Windows audio and controller APIs.
///
/// Kept free of `windows` types so the mapping into core errors builds and
/// tests on every platform.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PlatformError {
    /// A COM or Win32 call returned a failure code.
    #[error("{call} failed (0x{code:08X})")]
    Call { call: &'static str, code: u32 },

    #[error("no default {0} endpoint")]
    NoEndpoint(&'static str),

    #[error("unsupported stream format: {0}")]
    UnsupportedFormat(String),

    #[error("capture worker exited")]
    WorkerGone,

    #[error("controller slot {0} is not connected")]
    NotConnected(u32),
}

impl PlatformError {
    pub fn call(call: &'static str, code: u32) -> Self {
        Self::Call { call, code }
    }

    #[cfg(target_os = "windows")]
    pub fn win(call: &'static str, error: &windows::core::Error) -> Self {
        Self::Call {
            call,
            code: error.code().0 as u32,
        }
    }

    /// Error for a failure while a device is being opened or configured.
    pub fn into_setup_error(self) -> CaptureError {
        match self {
            Self::NoEndpoint(_) | Self::NotConnected(_) => CaptureError::DeviceNotAvailable,
            other => CaptureError::ConfigurationFailed(other.to_string()),
        }
    }
}

impl From<PlatformError> for CaptureError {
    fn from(error: PlatformError) -> Self {
        match error {
            PlatformError::NoEndpoint(_) | PlatformError::NotConnected(_) => CaptureError::DeviceNotAvailable,
            PlatformError::UnsupportedFormat(reason) => CaptureError::ConfigurationFailed(reason),
            other => CaptureError::StreamError(other.to_string()),
        }
    }
}

impl From<PlatformError> for ActuatorError {
    fn from(error: PlatformError) -> Self {
        match error {
            PlatformError::NotConnected(slot) => ActuatorError::DeviceNotFound(DeviceId(slot as u64)),
            PlatformError::Call { .. } => ActuatorError::ActuationFailed(error.to_string()),
            other => ActuatorError::DriverUnavailable(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn call_errors_format_hresult() {
        let err = PlatformError::call("IAudioClient::Start", 0x8889_0004);
        assert_eq!(err.to_string(), "IAudioClient::Start failed (0x88890004)");
    }

    #[test]
    fn maps_into_capture_errors() {
        assert_eq!(
            CaptureError::from(PlatformError::NoEndpoint("render")),
            CaptureError::DeviceNotAvailable
        );
        assert!(matches!(
            CaptureError::from(PlatformError::call("GetBuffer", 1)),
            CaptureError::StreamError(_)
        ));
        assert!(matches!(
            PlatformError::call("Activate", 1).into_setup_error(),
            CaptureError::ConfigurationFailed(_)
        ));
    }

    #[test]
    fn maps_into_actuator_errors() {
        assert_eq!(
            ActuatorError::from(PlatformError::NotConnected(2)),
            ActuatorError::DeviceNotFound(DeviceId(2))
        );
        assert!(matches!(
            ActuatorError::from(PlatformError::call("XInputSetState", 1167)),
            ActuatorError::ActuationFailed(_)
        ));
    }
}
