use std::fmt;

use serde::{Deserialize, Serialize};

/// The family of audio source a capture backend draws from.
///
/// The declaration order is the Auto fallback priority: system loopback is
/// preferred, the synthetic tone is the last resort.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackendKind {
    SystemLoopback,
    Microphone,
    LegacyRingBuffer,
    Synthetic,
}

impl BackendKind {
    /// All kinds in Auto fallback order.
    pub const PRIORITY: [BackendKind; 4] = [
        BackendKind::SystemLoopback,
        BackendKind::Microphone,
        BackendKind::LegacyRingBuffer,
        BackendKind::Synthetic,
    ];

    /// Position in the Auto fallback order (0 = tried first).
    pub fn priority(&self) -> usize {
        match self {
            Self::SystemLoopback => 0,
            Self::Microphone => 1,
            Self::LegacyRingBuffer => 2,
            Self::Synthetic => 3,
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::SystemLoopback => "System Loopback",
            Self::Microphone => "Microphone",
            Self::LegacyRingBuffer => "Legacy Ring Buffer",
            Self::Synthetic => "Synthetic Test Tone",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Native sample encoding reported by a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SampleFormat {
    /// IEEE 754 32-bit float, already in `[-1.0, 1.0]`.
    Float32,
    /// Signed 16-bit PCM.
    Int16,
}

impl SampleFormat {
    pub fn bytes_per_sample(&self) -> usize {
        match self {
            Self::Float32 => 4,
            Self::Int16 => 2,
        }
    }
}

/// Stream format negotiated when a backend is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamFormat {
    pub sample_rate: u32,
    pub channels: u16,
    pub sample_format: SampleFormat,
}

impl StreamFormat {
    pub fn new(sample_rate: u32, channels: u16, sample_format: SampleFormat) -> Self {
        Self {
            sample_rate,
            channels,
            sample_format,
        }
    }

    /// Bytes occupied by one interleaved frame.
    pub fn bytes_per_frame(&self) -> usize {
        self.channels as usize * self.sample_format.bytes_per_sample()
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.sample_rate == 0 {
            return Err("sample rate must be positive".into());
        }
        if self.channels == 0 {
            return Err("channel count must be positive".into());
        }
        Ok(())
    }
}

impl fmt::Display for StreamFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} Hz, {} ch, {:?}",
            self.sample_rate, self.channels, self.sample_format
        )
    }
}

/// One delivery of normalized, interleaved samples.
///
/// Borrowed from the supervisor's scratch buffer and only valid for the
/// duration of the callback.
#[derive(Debug, Clone, Copy)]
pub struct AudioBlock<'a> {
    pub samples: &'a [f32],
    pub channels: u16,
    pub sample_rate: u32,
}

impl AudioBlock<'_> {
    pub fn frame_count(&self) -> usize {
        if self.channels == 0 {
            return 0;
        }
        self.samples.len() / self.channels as usize
    }
}

/// Clamp to `[0, 1]`, mapping NaN to zero.
pub fn clamp_unit(value: f32) -> f32 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// Per-block feature snapshot, every field in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct AudioFeatures {
    /// RMS of the mono signal.
    pub volume: f32,
    /// RMS of the low-passed signal.
    pub bass: f32,
    pub midrange: f32,
    /// RMS of the high-passed signal.
    pub treble: f32,
    /// Peak absolute sample.
    pub peak: f32,
    /// Peak minus RMS.
    pub dynamic_range: f32,
}

impl AudioFeatures {
    pub const SILENT: Self = Self {
        volume: 0.0,
        bass: 0.0,
        midrange: 0.0,
        treble: 0.0,
        peak: 0.0,
        dynamic_range: 0.0,
    };

    pub fn clamped(self) -> Self {
        Self {
            volume: clamp_unit(self.volume),
            bass: clamp_unit(self.bass),
            midrange: clamp_unit(self.midrange),
            treble: clamp_unit(self.treble),
            peak: clamp_unit(self.peak),
            dynamic_range: clamp_unit(self.dynamic_range),
        }
    }

    /// Multiply every field by `factor` without clamping.
    pub fn scaled(self, factor: f32) -> Self {
        Self {
            volume: self.volume * factor,
            bass: self.bass * factor,
            midrange: self.midrange * factor,
            treble: self.treble * factor,
            peak: self.peak * factor,
            dynamic_range: self.dynamic_range * factor,
        }
    }

    pub fn as_array(&self) -> [f32; 6] {
        [
            self.volume,
            self.bass,
            self.midrange,
            self.treble,
            self.peak,
            self.dynamic_range,
        ]
    }

    pub fn is_bounded(&self) -> bool {
        self.as_array().iter().all(|v| (0.0..=1.0).contains(v))
    }
}

/// Counters for debugging capture sessions.
#[derive(Debug, Clone, Default)]
pub struct CaptureDiagnostics {
    pub backend: Option<BackendKind>,
    pub format: Option<StreamFormat>,
    pub blocks_delivered: u64,
    pub samples_delivered: u64,
    pub silent_blocks: u64,
    pub empty_polls: u64,
    pub failed_candidates: Vec<BackendKind>,
}
