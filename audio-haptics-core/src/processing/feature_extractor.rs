use std::collections::VecDeque;

use crate::models::audio_models::AudioFeatures;
use crate::models::config::ExtractorConfig;

use super::filters::FilterState;
use super::levels::{downmix_into, peak_level, rms_level};

/// Band levels kept per block in `FeatureHistory`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct HistoryEntry {
    pub volume: f32,
    pub bass: f32,
    pub treble: f32,
}

/// Fixed-length rolling record of recent band levels, oldest first.
///
/// Written once per block by the extractor. Nothing in the pipeline reads it;
/// it is there for hosts that want beat detection or trend display.
#[derive(Debug, Clone)]
pub struct FeatureHistory {
    entries: VecDeque<HistoryEntry>,
    capacity: usize,
}

impl FeatureHistory {
    pub const DEFAULT_CAPACITY: usize = 10;

    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, entry: HistoryEntry) {
        if self.capacity == 0 {
            return;
        }
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    pub fn latest(&self) -> Option<&HistoryEntry> {
        self.entries.back()
    }

    pub fn iter(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl Default for FeatureHistory {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CAPACITY)
    }
}

/// Streaming time-domain feature extractor.
///
/// Turns interleaved float blocks into an `AudioFeatures` snapshot. Filter
/// memory persists across calls so a stream split into arbitrary block sizes
/// produces the same band energy as one long block. Only the capture thread
/// should own one of these.
#[derive(Debug, Clone)]
pub struct FeatureExtractor {
    sample_rate: u32,
    sensitivity: f32,
    bass_cutoff: f32,
    treble_cutoff: f32,
    /// Band edges in Hz, when set via `set_frequency_bands`. Re-applied on
    /// every sample rate change.
    bands_hz: Option<(f32, f32)>,
    filters: FilterState,
    history: FeatureHistory,
    mono: Vec<f32>,
}

impl FeatureExtractor {
    pub fn new(config: ExtractorConfig) -> Self {
        let defaults = ExtractorConfig::default();
        let sample_rate = if config.sample_rate > 0 {
            config.sample_rate
        } else {
            defaults.sample_rate
        };
        Self {
            sample_rate,
            sensitivity: clamp_sensitivity(config.sensitivity, defaults.sensitivity),
            bass_cutoff: clamp_cutoff(config.bass_cutoff, defaults.bass_cutoff),
            treble_cutoff: clamp_cutoff(config.treble_cutoff, defaults.treble_cutoff),
            bands_hz: None,
            filters: FilterState::default(),
            history: FeatureHistory::default(),
            mono: Vec::new(),
        }
    }

    /// Extract features from one interleaved block.
    ///
    /// Empty input yields all zeros and leaves the filters untouched.
    /// Non-finite samples are treated as silence.
    pub fn process_block(&mut self, samples: &[f32], channels: u16) -> AudioFeatures {
        downmix_into(samples, channels as usize, &mut self.mono);
        if self.mono.is_empty() {
            return AudioFeatures::SILENT;
        }
        for sample in self.mono.iter_mut() {
            if !sample.is_finite() {
                *sample = 0.0;
            }
        }

        let volume = rms_level(&self.mono);
        let peak = peak_level(&self.mono);

        let (bass_alpha, treble_alpha) = (self.bass_cutoff, self.treble_cutoff);
        let mut bass_sq = 0.0f32;
        let mut treble_sq = 0.0f32;
        for &sample in &self.mono {
            let low = self.filters.bass.process(sample, bass_alpha);
            let high = self.filters.treble.process(sample, treble_alpha);
            bass_sq += low * low;
            treble_sq += high * high;
        }
        let n = self.mono.len() as f32;
        let bass = (bass_sq / n).sqrt();
        let treble = (treble_sq / n).sqrt();

        let raw = AudioFeatures {
            volume,
            bass,
            midrange: (volume - (bass + treble) / 2.0).max(0.0),
            treble,
            peak,
            dynamic_range: peak - volume,
        };
        let features = raw.scaled(self.sensitivity).clamped();

        self.history.push(HistoryEntry {
            volume: features.volume,
            bass: features.bass,
            treble: features.treble,
        });
        features
    }

    /// Change the sample rate and reset filter memory.
    ///
    /// Band edges configured in Hz are re-converted for the new rate. A zero
    /// rate is ignored.
    pub fn set_sample_rate(&mut self, sample_rate: u32) {
        if sample_rate == 0 {
            log::warn!("Ignoring zero sample rate");
            return;
        }
        self.sample_rate = sample_rate;
        self.filters.reset();
        if let Some((bass_hz, treble_hz)) = self.bands_hz {
            self.apply_bands(bass_hz, treble_hz);
        }
        log::debug!("Feature extractor sample rate set to {} Hz", sample_rate);
    }

    /// Set band edges in Hz, converted to `hz / nyquist` and clamped.
    pub fn set_frequency_bands(&mut self, bass_hz: f32, treble_hz: f32) {
        self.bands_hz = Some((bass_hz, treble_hz));
        self.apply_bands(bass_hz, treble_hz);
    }

    fn apply_bands(&mut self, bass_hz: f32, treble_hz: f32) {
        let nyquist = self.sample_rate as f32 / 2.0;
        self.bass_cutoff = clamp_cutoff(bass_hz / nyquist, self.bass_cutoff);
        self.treble_cutoff = clamp_cutoff(treble_hz / nyquist, self.treble_cutoff);
    }

    /// Clamped to `[0.1, 6.0]`. Non-finite values are ignored.
    pub fn set_sensitivity(&mut self, sensitivity: f32) {
        self.sensitivity = clamp_sensitivity(sensitivity, self.sensitivity);
    }

    pub fn sensitivity(&self) -> f32 {
        self.sensitivity
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Normalized `(bass, treble)` filter coefficients.
    pub fn cutoffs(&self) -> (f32, f32) {
        (self.bass_cutoff, self.treble_cutoff)
    }

    pub fn filter_state(&self) -> &FilterState {
        &self.filters
    }

    pub fn history(&self) -> &FeatureHistory {
        &self.history
    }
}

impl Default for FeatureExtractor {
    fn default() -> Self {
        Self::new(ExtractorConfig::default())
    }
}

fn clamp_sensitivity(value: f32, fallback: f32) -> f32 {
    let value = if value.is_finite() { value } else { fallback };
    value.clamp(ExtractorConfig::MIN_SENSITIVITY, ExtractorConfig::MAX_SENSITIVITY)
}

fn clamp_cutoff(value: f32, fallback: f32) -> f32 {
    let value = if value.is_finite() { value } else { fallback };
    value.clamp(ExtractorConfig::MIN_CUTOFF, ExtractorConfig::MAX_CUTOFF)
}
