use std::f32::consts::PI;
use std::thread;
use std::time::{Duration, Instant};

use crate::models::audio_models::{BackendKind, SampleFormat, StreamFormat};
use crate::models::error::CaptureError;
use crate::traits::capture_backend::{CaptureBackend, RawBlock};

/// Deterministic test-tone source, always available.
///
/// Generates a stereo buffer on `open`: 440 Hz on the left, 880 Hz on the
/// right, both at 0.3 amplitude and modulated at 2 Hz. The buffer is played
/// in fixed chunks of interleaved samples, looping, and paced to real time.
pub struct SyntheticBackend {
    sample_rate: u32,
    duration_secs: f32,
    chunk_samples: usize,
    tone: Vec<f32>,
    position: usize,
    next_due: Option<Instant>,
    started: bool,
}

impl SyntheticBackend {
    pub const SAMPLE_RATE: u32 = 44100;
    pub const CHANNELS: u16 = 2;
    pub const DURATION_SECS: f32 = 5.0;
    /// Interleaved samples per delivered block.
    pub const CHUNK_SAMPLES: usize = 1024;

    pub fn new() -> Self {
        Self::with_tone(Self::SAMPLE_RATE, Self::DURATION_SECS)
    }

    /// A tone of custom length, mostly for tests that need to see the loop.
    pub fn with_tone(sample_rate: u32, duration_secs: f32) -> Self {
        Self {
            sample_rate,
            duration_secs,
            chunk_samples: Self::CHUNK_SAMPLES,
            tone: Vec::new(),
            position: 0,
            next_due: None,
            started: false,
        }
    }

    pub fn format(&self) -> StreamFormat {
        StreamFormat::new(self.sample_rate, Self::CHANNELS, SampleFormat::Float32)
    }

    /// Left/right sample of the test tone at `frame`.
    pub fn tone_frame(frame: usize, sample_rate: u32) -> (f32, f32) {
        let t = frame as f32 / sample_rate as f32;
        let modulation = 0.5 + 0.5 * (2.0 * PI * 2.0 * t).sin();
        let left = 0.3 * (2.0 * PI * 440.0 * t).sin() * modulation;
        let right = 0.3 * (2.0 * PI * 880.0 * t).sin() * modulation;
        (left, right)
    }

    fn generate(&mut self) {
        let frames = (self.sample_rate as f32 * self.duration_secs) as usize;
        self.tone.clear();
        self.tone.reserve(frames * Self::CHANNELS as usize);
        for frame in 0..frames {
            let (left, right) = Self::tone_frame(frame, self.sample_rate);
            self.tone.push(left);
            self.tone.push(right);
        }
    }

    fn chunk_duration(&self, samples: usize) -> Duration {
        let frames = samples / Self::CHANNELS as usize;
        Duration::from_secs_f64(frames as f64 / self.sample_rate as f64)
    }
}

impl Default for SyntheticBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl CaptureBackend for SyntheticBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Synthetic
    }

    fn open(&mut self) -> Result<StreamFormat, CaptureError> {
        let format = self.format();
        format.validate().map_err(CaptureError::ConfigurationFailed)?;

        self.generate();
        if self.tone.is_empty() {
            return Err(CaptureError::ConfigurationFailed("test tone is empty".into()));
        }
        self.position = 0;
        log::debug!(
            "Generated {} s test tone ({} samples)",
            self.duration_secs,
            self.tone.len()
        );
        Ok(format)
    }

    fn start(&mut self) -> Result<(), CaptureError> {
        if self.tone.is_empty() {
            return Err(CaptureError::InvalidState("test tone not opened".into()));
        }
        self.started = true;
        self.next_due = None;
        Ok(())
    }

    fn poll_next_block(&mut self, timeout: Duration) -> Result<Option<RawBlock<'_>>, CaptureError> {
        if !self.started {
            return Err(CaptureError::InvalidState("test tone not started".into()));
        }

        let now = Instant::now();
        let due = self.next_due.unwrap_or(now);
        if due > now {
            let wait = due - now;
            if wait > timeout {
                thread::sleep(timeout);
                return Ok(None);
            }
            thread::sleep(wait);
        }

        let start = self.position;
        let end = (start + self.chunk_samples).min(self.tone.len());
        self.position = if end >= self.tone.len() { 0 } else { end };

        // Pace from the nominal schedule, but never try to catch up a backlog.
        let after = Instant::now();
        let next = due + self.chunk_duration(end - start);
        self.next_due = Some(if next < after { after } else { next });

        let samples = &self.tone[start..end];
        Ok(Some(RawBlock {
            data: bytemuck::cast_slice(samples),
            frames: samples.len() / Self::CHANNELS as usize,
            silent: false,
        }))
    }

    fn stop(&mut self) {
        self.started = false;
        self.next_due = None;
    }

    fn close(&mut self) {
        self.stop();
        self.tone = Vec::new();
        self.position = 0;
    }
}
