//! # audio-haptics-core
//!
//! Platform-agnostic core of the audio-to-haptics converter.
//!
//! Captured audio flows through three stages, all driven from the capture
//! thread, once per block:
//!
//! ```text
//! [CaptureBackend] → [CaptureSupervisor] → [FeatureExtractor] → [HapticMapper] → [ActuatorBackend]
//! ```
//!
//! Platform backends (Windows WASAPI, DirectSound, XInput) implement the
//! `CaptureBackend`, `RingBufferDriver` and `ActuatorBackend` traits and plug
//! into the generic supervisor and mapper.
//!
//! ## Architecture
//!
//! ```text
//! audio-haptics-core (this crate)
//! ├── traits/       ← CaptureBackend, ActuatorBackend
//! ├── models/       ← CaptureError, CaptureState, HapticSettings, AudioFeatures, GamepadRecord
//! ├── processing/   ← FeatureExtractor, one-pole filters, smoothing, sample normalization, ring cursor
//! ├── capture/      ← CaptureSupervisor, SyntheticBackend, RingBufferBackend
//! ├── haptics/      ← HapticMapper, discovery session, burst emulation
//! └── pipeline      ← HapticPipeline (wires capture → features → haptics)
//! ```

pub mod capture;
pub mod haptics;
pub mod models;
pub mod pipeline;
pub mod processing;
pub mod traits;

// Re-export key types at crate root for convenience.
pub use capture::ring_buffer_backend::{RingBufferBackend, RingBufferDriver, RingBufferLayout};
pub use capture::supervisor::CaptureSupervisor;
pub use capture::synthetic::SyntheticBackend;
pub use haptics::mapper::HapticMapper;
pub use models::audio_models::{AudioBlock, AudioFeatures, BackendKind, CaptureDiagnostics, SampleFormat, StreamFormat};
pub use models::config::{
    ActuationStyle, BurstSettings, CaptureMode, DiscoveryConfig, ExtractorConfig, HapticMode, HapticSettings,
};
pub use models::error::{ActuatorError, CaptureError};
pub use models::gamepad::{ActuationFamily, ActuatorLevels, DeviceId, GamepadCapabilities, GamepadRecord};
pub use models::state::CaptureState;
pub use pipeline::HapticPipeline;
pub use processing::feature_extractor::FeatureExtractor;
pub use traits::actuator::{ActuatorBackend, DeviceInfo, HapticInfo};
pub use traits::capture_backend::{AudioBlockCallback, CaptureBackend, RawBlock};
