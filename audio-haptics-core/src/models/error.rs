use thiserror::Error;

use super::audio_models::BackendKind;
use super::gamepad::DeviceId;

/// Errors that can occur while selecting, opening or running a capture backend.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CaptureError {
    #[error("device not available")]
    DeviceNotAvailable,

    #[error("configuration failed: {0}")]
    ConfigurationFailed(String),

    #[error("no registered backend of kind {0}")]
    BackendUnavailable(BackendKind),

    #[error("all capture backends failed")]
    AllBackendsFailed,

    #[error("stream error: {0}")]
    StreamError(String),

    #[error("failed to spawn capture thread: {0}")]
    ThreadSpawnFailed(String),

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("unknown error: {0}")]
    Unknown(String),
}

/// Errors reported by an actuator backend.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ActuatorError {
    #[error("device {0} not found")]
    DeviceNotFound(DeviceId),

    #[error("capability query failed: {0}")]
    QueryFailed(String),

    #[error("actuation failed: {0}")]
    ActuationFailed(String),

    #[error("driver unavailable: {0}")]
    DriverUnavailable(String),
}
