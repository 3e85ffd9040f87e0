//! # audio-haptics-windows
//!
//! Windows backends for audio-haptics-core.
//!
//! Provides:
//! - `WasapiLoopbackCapture`: system audio via WASAPI loopback on the render endpoint
//! - `WasapiMicCapture`: microphone via a WASAPI capture endpoint
//! - `DirectSoundDriver`: legacy capture buffer behind `RingBufferBackend`
//! - `XInputActuator`: rumble on XInput controllers
//!
//! ## Platform Requirements
//! - Windows 10 1703+ (build 15063) for event-driven loopback
//! - Visual Studio Build Tools 2022 + Windows SDK for linking
//!
//! ## Usage
//! ```ignore
//! use audio_haptics_core::{CaptureMode, ExtractorConfig, HapticPipeline, HapticSettings};
//! use audio_haptics_windows::backends::{default_actuator, default_backends};
//!
//! let mut pipeline = HapticPipeline::new(
//!     default_backends(),
//!     default_actuator(),
//!     HapticSettings::default(),
//!     ExtractorConfig::default(),
//! );
//! pipeline.initialize(CaptureMode::Auto)?;
//! pipeline.start()?;
//! ```

pub mod backends;
pub mod convert;
pub mod error;
pub mod packet_queue;

#[cfg(target_os = "windows")]
pub mod directsound;
#[cfg(target_os = "windows")]
mod wasapi;
#[cfg(target_os = "windows")]
pub mod wasapi_loopback;
#[cfg(target_os = "windows")]
pub mod wasapi_mic;
#[cfg(target_os = "windows")]
pub mod xinput;

pub use error::PlatformError;

#[cfg(target_os = "windows")]
pub use directsound::DirectSoundDriver;
#[cfg(target_os = "windows")]
pub use wasapi_loopback::WasapiLoopbackCapture;
#[cfg(target_os = "windows")]
pub use wasapi_mic::WasapiMicCapture;
#[cfg(target_os = "windows")]
pub use xinput::XInputActuator;
