use std::ops::Range;

/// Read-cursor bookkeeping for a driver-owned circular capture buffer.
///
/// The driver writes continuously and reports its write cursor; this type
/// tracks how far the consumer has read. Data is consumed in fixed chunks of
/// half the buffer, so a read never races the writer.
#[derive(Debug, Clone)]
pub struct RingCursor {
    buffer_bytes: usize,
    chunk_bytes: usize,
    read_cursor: usize,
}

/// Byte ranges to copy for one chunk. `second` is set when the chunk wraps
/// past the end of the buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadSpans {
    pub first: Range<usize>,
    pub second: Option<Range<usize>>,
}

impl ReadSpans {
    pub fn len(&self) -> usize {
        self.first.len() + self.second.as_ref().map_or(0, |r| r.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl RingCursor {
    /// `block_align` keeps chunks on frame boundaries.
    pub fn new(buffer_bytes: usize, block_align: usize) -> Self {
        let align = block_align.max(1);
        let chunk_bytes = (buffer_bytes / 2) / align * align;
        Self {
            buffer_bytes,
            chunk_bytes,
            read_cursor: 0,
        }
    }

    /// Bytes written since the read cursor, accounting for wraparound.
    pub fn bytes_available(&self, write_cursor: usize) -> usize {
        if self.buffer_bytes == 0 {
            return 0;
        }
        let write_cursor = write_cursor % self.buffer_bytes;
        if write_cursor >= self.read_cursor {
            write_cursor - self.read_cursor
        } else {
            self.buffer_bytes - self.read_cursor + write_cursor
        }
    }

    /// Spans for the next chunk, once at least half the buffer is available.
    pub fn next_read(&self, write_cursor: usize) -> Option<ReadSpans> {
        if self.chunk_bytes == 0 || self.bytes_available(write_cursor) < self.chunk_bytes {
            return None;
        }

        let end = self.read_cursor + self.chunk_bytes;
        if end <= self.buffer_bytes {
            Some(ReadSpans {
                first: self.read_cursor..end,
                second: None,
            })
        } else {
            Some(ReadSpans {
                first: self.read_cursor..self.buffer_bytes,
                second: Some(0..end - self.buffer_bytes),
            })
        }
    }

    /// Mark one chunk as consumed.
    pub fn advance(&mut self) {
        if self.buffer_bytes > 0 {
            self.read_cursor = (self.read_cursor + self.chunk_bytes) % self.buffer_bytes;
        }
    }

    pub fn reset(&mut self) {
        self.read_cursor = 0;
    }

    pub fn read_cursor(&self) -> usize {
        self.read_cursor
    }

    pub fn chunk_bytes(&self) -> usize {
        self.chunk_bytes
    }

    pub fn buffer_bytes(&self) -> usize {
        self.buffer_bytes
    }
}
