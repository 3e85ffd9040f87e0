use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::audio_models::BackendKind;

/// How the supervisor picks a capture backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CaptureMode {
    /// Try every registered backend in priority order.
    #[default]
    Auto,
    /// Use exactly this backend, with no fallback.
    Forced(BackendKind),
}

/// Preferred actuation family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HapticMode {
    /// Haptic where the device supports it, rumble otherwise.
    #[default]
    Auto,
    Rumble,
    Haptic,
    /// Rumble and haptic together where supported.
    Hybrid,
}

impl HapticMode {
    pub fn description(&self) -> &'static str {
        match self {
            Self::Auto => "Auto",
            Self::Rumble => "Rumble",
            Self::Haptic => "Haptic",
            Self::Hybrid => "Hybrid (Rumble + Haptic)",
        }
    }
}

/// Whether mapped levels are smoothed continuously or emitted as short bursts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActuationStyle {
    /// Rate-limited continuous rumble following the audio.
    #[default]
    Continuous,
    /// Strong short bursts alternating between motors, gated by volume.
    Burst,
}

/// Parameters for `ActuationStyle::Burst`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BurstSettings {
    /// Length of one burst in seconds (0.01 - 0.2).
    pub burst_duration_secs: f32,
    /// Minimum time between burst starts in seconds (0.05 - 0.5).
    pub min_interval_secs: f32,
    /// Multiplier applied to mapped levels during a burst.
    pub intensity: f32,
    /// No bursts while volume is below this.
    pub volume_threshold: f32,
}

impl BurstSettings {
    pub fn sanitized(self) -> Self {
        let defaults = Self::default();
        Self {
            burst_duration_secs: finite_or(self.burst_duration_secs, defaults.burst_duration_secs).clamp(0.01, 0.2),
            min_interval_secs: finite_or(self.min_interval_secs, defaults.min_interval_secs).clamp(0.05, 0.5),
            intensity: finite_or(self.intensity, defaults.intensity).clamp(0.0, 10.0),
            volume_threshold: finite_or(self.volume_threshold, defaults.volume_threshold).clamp(0.0, 1.0),
        }
    }

    pub fn burst_duration(&self) -> Duration {
        Duration::from_secs_f32(self.burst_duration_secs.max(0.0))
    }

    pub fn min_interval(&self) -> Duration {
        Duration::from_secs_f32(self.min_interval_secs.max(0.0))
    }
}

impl Default for BurstSettings {
    fn default() -> Self {
        Self {
            burst_duration_secs: 0.05,
            min_interval_secs: 0.1,
            intensity: 3.0,
            volume_threshold: 0.3,
        }
    }
}

/// Mapping from audio features to motor levels.
///
/// Replaced wholesale via `HapticMapper::set_settings` and read back by value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HapticSettings {
    /// Multiplier for bass on the low-frequency motor (0.0 - 2.0).
    pub bass_intensity: f32,
    /// Multiplier for treble on the high-frequency motor (0.0 - 2.0).
    pub treble_intensity: f32,
    /// Multiplier for volume on both motors (0.0 - 2.0).
    pub volume_intensity: f32,
    /// Multiplier for dynamic range on the triggers (0.0 - 2.0).
    pub dynamic_intensity: f32,

    pub use_low_frequency_motor: bool,
    pub use_high_frequency_motor: bool,
    /// Drive the impulse triggers from dynamics.
    pub use_impulse_motor: bool,
    /// Master switch for the low/high rumble motors.
    pub use_rumble_motors: bool,

    /// Minimum interval between automatic actuation pushes (0 = every block).
    pub update_rate_ms: u32,
    /// Time for a level to travel the full `[0, 1]` range (0 = snap).
    pub fade_time_ms: u32,

    pub preferred_mode: HapticMode,
    pub style: ActuationStyle,
    pub burst: BurstSettings,
}

impl HapticSettings {
    pub const MAX_INTENSITY: f32 = 2.0;

    /// Smooth continuous rumble.
    pub fn continuous() -> Self {
        Self {
            bass_intensity: 0.0,
            treble_intensity: 0.0,
            volume_intensity: 2.0,
            dynamic_intensity: 2.0,
            use_low_frequency_motor: true,
            use_high_frequency_motor: true,
            use_impulse_motor: true,
            use_rumble_motors: true,
            update_rate_ms: 16,
            fade_time_ms: 100,
            preferred_mode: HapticMode::Auto,
            style: ActuationStyle::Continuous,
            burst: BurstSettings::default(),
        }
    }

    /// Short bursts that emulate haptic clicks on rumble-only hardware.
    pub fn burst_emulation() -> Self {
        Self {
            style: ActuationStyle::Burst,
            ..Self::continuous()
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        let intensities = [
            ("bass", self.bass_intensity),
            ("treble", self.treble_intensity),
            ("volume", self.volume_intensity),
            ("dynamic", self.dynamic_intensity),
        ];
        for (name, value) in intensities {
            if !value.is_finite() || !(0.0..=Self::MAX_INTENSITY).contains(&value) {
                return Err(format!("{} intensity out of range: {}", name, value));
            }
        }
        if self.burst != self.burst.sanitized() {
            return Err("burst settings out of range".into());
        }
        Ok(())
    }

    /// Clamp every bounded field into range. Non-finite intensities become 0.
    pub fn sanitized(self) -> Self {
        let clamp_intensity = |v: f32| finite_or(v, 0.0).clamp(0.0, Self::MAX_INTENSITY);
        Self {
            bass_intensity: clamp_intensity(self.bass_intensity),
            treble_intensity: clamp_intensity(self.treble_intensity),
            volume_intensity: clamp_intensity(self.volume_intensity),
            dynamic_intensity: clamp_intensity(self.dynamic_intensity),
            burst: self.burst.sanitized(),
            ..self
        }
    }

    pub fn update_interval(&self) -> Duration {
        Duration::from_millis(self.update_rate_ms as u64)
    }
}

impl Default for HapticSettings {
    fn default() -> Self {
        Self::continuous()
    }
}

/// Initial state of a `FeatureExtractor`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExtractorConfig {
    pub sample_rate: u32,
    /// Gain applied to every feature before clamping (0.1 - 6.0).
    pub sensitivity: f32,
    /// Low-pass coefficient as a fraction of Nyquist.
    pub bass_cutoff: f32,
    /// High-pass coefficient as a fraction of Nyquist.
    pub treble_cutoff: f32,
}

impl ExtractorConfig {
    pub const MIN_SENSITIVITY: f32 = 0.1;
    pub const MAX_SENSITIVITY: f32 = 6.0;
    pub const MIN_CUTOFF: f32 = 0.01;
    pub const MAX_CUTOFF: f32 = 0.9;

    pub fn validate(&self) -> Result<(), String> {
        if self.sample_rate == 0 {
            return Err("sample rate must be positive".into());
        }
        if !(Self::MIN_SENSITIVITY..=Self::MAX_SENSITIVITY).contains(&self.sensitivity) {
            return Err(format!("sensitivity out of range: {}", self.sensitivity));
        }
        for cutoff in [self.bass_cutoff, self.treble_cutoff] {
            if !(Self::MIN_CUTOFF..=Self::MAX_CUTOFF).contains(&cutoff) {
                return Err(format!("cutoff out of range: {}", cutoff));
            }
        }
        Ok(())
    }
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44100,
            sensitivity: 1.5,
            bass_cutoff: 0.1,
            treble_cutoff: 0.3,
        }
    }
}

/// Device discovery and failure handling for `HapticMapper`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiscoveryConfig {
    /// Minimum time between periodic rescans.
    pub rescan_interval: Duration,
    /// Consecutive actuation failures before a device is excluded.
    pub failure_threshold: u32,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            rescan_interval: Duration::from_secs(5),
            failure_threshold: 5,
        }
    }
}

fn finite_or(value: f32, fallback: f32) -> f32 {
    if value.is_finite() {
        value
    } else {
        fallback
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presets_differ_only_in_style() {
        let continuous = HapticSettings::continuous();
        let burst = HapticSettings::burst_emulation();
        assert_eq!(continuous.style, ActuationStyle::Continuous);
        assert_eq!(burst.style, ActuationStyle::Burst);
        assert_eq!(HapticSettings { style: ActuationStyle::Continuous, ..burst }, continuous);
    }

    #[test]
    fn default_settings_are_valid() {
        assert!(HapticSettings::default().validate().is_ok());
        assert!(ExtractorConfig::default().validate().is_ok());
    }

    #[test]
    fn sanitize_clamps_intensities() {
        let settings = HapticSettings {
            bass_intensity: 5.0,
            treble_intensity: -1.0,
            volume_intensity: f32::NAN,
            dynamic_intensity: 1.25,
            ..HapticSettings::default()
        };
        assert!(settings.validate().is_err());

        let clean = settings.sanitized();
        assert_eq!(clean.bass_intensity, 2.0);
        assert_eq!(clean.treble_intensity, 0.0);
        assert_eq!(clean.volume_intensity, 0.0);
        assert_eq!(clean.dynamic_intensity, 1.25);
        assert!(clean.validate().is_ok());
    }

    #[test]
    fn sanitize_clamps_burst_ranges() {
        let burst = BurstSettings {
            burst_duration_secs: 1.0,
            min_interval_secs: 0.0,
            intensity: f32::INFINITY,
            volume_threshold: 2.0,
        }
        .sanitized();
        assert_eq!(burst.burst_duration_secs, 0.2);
        assert_eq!(burst.min_interval_secs, 0.05);
        assert_eq!(burst.intensity, 3.0);
        assert_eq!(burst.volume_threshold, 1.0);
    }

    #[test]
    fn settings_deserialize_from_host_json() {
        let json = r#"{
            "bass_intensity": 1.0,
            "treble_intensity": 0.5,
            "volume_intensity": 1.0,
            "dynamic_intensity": 0.0,
            "use_low_frequency_motor": true,
            "use_high_frequency_motor": false,
            "use_impulse_motor": false,
            "use_rumble_motors": true,
            "update_rate_ms": 0,
            "fade_time_ms": 50,
            "preferred_mode": "hybrid",
            "style": "burst",
            "burst": {
                "burst_duration_secs": 0.05,
                "min_interval_secs": 0.1,
                "intensity": 3.0,
                "volume_threshold": 0.3
            }
        }"#;
        let settings: HapticSettings = serde_json::from_str(json).unwrap();
        assert_eq!(settings.preferred_mode, HapticMode::Hybrid);
        assert_eq!(settings.style, ActuationStyle::Burst);
        assert!(!settings.use_high_frequency_motor);
        assert!(settings.validate().is_ok());
    }
}
