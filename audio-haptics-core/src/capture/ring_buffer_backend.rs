use std::thread;
use std::time::{Duration, Instant};

use crate::models::audio_models::{BackendKind, StreamFormat};
use crate::models::error::CaptureError;
use crate::processing::capture_ring::{ReadSpans, RingCursor};
use crate::traits::capture_backend::{CaptureBackend, RawBlock};

/// Geometry of a driver-owned circular capture buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RingBufferLayout {
    pub format: StreamFormat,
    /// Total size of the circular buffer in bytes.
    pub buffer_bytes: usize,
}

/// Platform half of a legacy circular-buffer capture device.
///
/// The driver only exposes its write cursor and lets us copy byte ranges
/// out; `RingBufferBackend` does the cursor bookkeeping.
pub trait RingBufferDriver: Send {
    fn name(&self) -> &str {
        BackendKind::LegacyRingBuffer.display_name()
    }

    fn open(&mut self) -> Result<RingBufferLayout, CaptureError>;

    fn start(&mut self) -> Result<(), CaptureError>;

    /// Current write position, in bytes from the start of the buffer.
    fn write_cursor(&mut self) -> Result<usize, CaptureError>;

    /// Append the bytes covered by `spans` to `out`, in order.
    fn read_spans(&mut self, spans: &ReadSpans, out: &mut Vec<u8>) -> Result<(), CaptureError>;

    fn stop(&mut self);

    fn close(&mut self);
}

/// `CaptureBackend` over any `RingBufferDriver`.
///
/// The device offers no notification, so polling sleeps in short intervals
/// until half the buffer has been written.
pub struct RingBufferBackend<D: RingBufferDriver> {
    driver: D,
    cursor: Option<RingCursor>,
    frame_bytes: usize,
    scratch: Vec<u8>,
    poll_interval: Duration,
    started: bool,
}

impl<D: RingBufferDriver> RingBufferBackend<D> {
    pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(10);

    pub fn new(driver: D) -> Self {
        Self {
            driver,
            cursor: None,
            frame_bytes: 0,
            scratch: Vec::new(),
            poll_interval: Self::DEFAULT_POLL_INTERVAL,
            started: false,
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }
}

impl<D: RingBufferDriver> CaptureBackend for RingBufferBackend<D> {
    fn kind(&self) -> BackendKind {
        BackendKind::LegacyRingBuffer
    }

    fn name(&self) -> &str {
        self.driver.name()
    }

    fn open(&mut self) -> Result<StreamFormat, CaptureError> {
        let layout = self.driver.open()?;
        if let Err(reason) = layout.format.validate() {
            self.driver.close();
            return Err(CaptureError::ConfigurationFailed(reason));
        }

        let frame_bytes = layout.format.bytes_per_frame();
        let cursor = RingCursor::new(layout.buffer_bytes, frame_bytes);
        if cursor.chunk_bytes() == 0 {
            self.driver.close();
            return Err(CaptureError::ConfigurationFailed(format!(
                "capture buffer too small: {} bytes",
                layout.buffer_bytes
            )));
        }

        self.scratch = Vec::with_capacity(cursor.chunk_bytes());
        self.frame_bytes = frame_bytes;
        self.cursor = Some(cursor);
        Ok(layout.format)
    }

    fn start(&mut self) -> Result<(), CaptureError> {
        let cursor = self
            .cursor
            .as_mut()
            .ok_or_else(|| CaptureError::InvalidState("ring buffer not opened".into()))?;
        cursor.reset();
        self.driver.start()?;
        self.started = true;
        Ok(())
    }

    fn poll_next_block(&mut self, timeout: Duration) -> Result<Option<RawBlock<'_>>, CaptureError> {
        if !self.started {
            return Err(CaptureError::InvalidState("ring buffer not started".into()));
        }
        let deadline = Instant::now() + timeout;

        loop {
            let write = self.driver.write_cursor()?;
            let spans = self.cursor.as_ref().and_then(|c| c.next_read(write));

            if let Some(spans) = spans {
                self.scratch.clear();
                self.driver.read_spans(&spans, &mut self.scratch)?;
                if let Some(cursor) = self.cursor.as_mut() {
                    cursor.advance();
                }
                return Ok(Some(RawBlock {
                    data: &self.scratch,
                    frames: self.scratch.len() / self.frame_bytes,
                    silent: false,
                }));
            }

            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            thread::sleep(self.poll_interval.min(deadline - now));
        }
    }

    fn stop(&mut self) {
        if self.started {
            self.driver.stop();
            self.started = false;
        }
    }

    fn close(&mut self) {
        self.stop();
        if self.cursor.take().is_some() {
            self.driver.close();
        }
        self.scratch = Vec::new();
    }
}
