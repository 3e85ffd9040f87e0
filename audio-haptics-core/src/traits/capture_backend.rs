use std::sync::Arc;
use std::time::Duration;

use crate::models::audio_models::{AudioBlock, BackendKind, StreamFormat};
use crate::models::error::CaptureError;

/// Callback invoked once per captured block, on the capture thread.
///
/// Must return promptly: the next block is not polled until it does.
pub type AudioBlockCallback = Arc<dyn Fn(&AudioBlock<'_>) + Send + Sync + 'static>;

/// Raw bytes of one captured block in the backend's native format.
///
/// Borrowed from the backend; the platform buffer has already been released
/// back to the driver by the time this is returned.
#[derive(Debug, Clone, Copy)]
pub struct RawBlock<'a> {
    pub data: &'a [u8],
    pub frames: usize,
    /// The driver flagged this packet as silence; `data` should be ignored.
    pub silent: bool,
}

/// Interface for a concrete audio source.
///
/// Implemented by:
/// - `WasapiLoopbackCapture`, `WasapiMicCapture` (Windows)
/// - `RingBufferBackend<DirectSoundDriver>` (Windows, legacy)
/// - `SyntheticBackend` (all platforms)
///
/// The supervisor calls `open` then `start` on the control thread and then
/// moves polling to its capture thread, so implementations must be `Send`.
pub trait CaptureBackend: Send {
    fn kind(&self) -> BackendKind;

    fn name(&self) -> &str {
        self.kind().display_name()
    }

    /// Acquire the device and report its native format.
    fn open(&mut self) -> Result<StreamFormat, CaptureError>;

    /// Begin streaming. Only called after a successful `open`.
    fn start(&mut self) -> Result<(), CaptureError>;

    /// Wait up to `timeout` for the next block.
    ///
    /// Returns `Ok(None)` when nothing arrived in time. Backends with an
    /// event or condition to wait on block on it; others sleep-poll in
    /// short intervals. Any error ends the capture session.
    fn poll_next_block(&mut self, timeout: Duration) -> Result<Option<RawBlock<'_>>, CaptureError>;

    /// Halt streaming. Must be safe to call when not started.
    fn stop(&mut self);

    /// Release every device handle. Must be safe to call at any point.
    fn close(&mut self);
}
