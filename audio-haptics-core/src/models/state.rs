use super::audio_models::BackendKind;
use super::error::CaptureError;

/// Capture supervisor state machine.
///
/// State transitions:
/// ```text
/// idle → ready → capturing → stopped → capturing ...
///                    ↓
///                  failed
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum CaptureState {
    Idle,
    Ready(BackendKind),
    Capturing(BackendKind),
    Stopped(BackendKind),
    /// The capture loop ended on a backend error.
    Failed(CaptureError),
}

impl CaptureState {
    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }

    pub fn is_capturing(&self) -> bool {
        matches!(self, Self::Capturing(_))
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }

    /// The backend this state refers to, if any.
    pub fn backend(&self) -> Option<BackendKind> {
        match self {
            Self::Ready(kind) | Self::Capturing(kind) | Self::Stopped(kind) => Some(*kind),
            Self::Idle | Self::Failed(_) => None,
        }
    }
}
