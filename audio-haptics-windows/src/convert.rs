//! Pure conversions between Windows wire formats and core types.

use audio_haptics_core::models::audio_models::{clamp_unit, SampleFormat};

use crate::error::PlatformError;

/// `WAVE_FORMAT_PCM`
pub const FORMAT_TAG_PCM: u16 = 0x0001;
/// `WAVE_FORMAT_IEEE_FLOAT`
pub const FORMAT_TAG_IEEE_FLOAT: u16 = 0x0003;
/// `WAVE_FORMAT_EXTENSIBLE`
pub const FORMAT_TAG_EXTENSIBLE: u16 = 0xFFFE;

/// Sample encoding for a `WAVEFORMATEX` header.
///
/// `float_subformat` is only consulted for `WAVE_FORMAT_EXTENSIBLE` and says
/// whether its `SubFormat` GUID is `KSDATAFORMAT_SUBTYPE_IEEE_FLOAT`.
pub fn sample_format_for(tag: u16, bits_per_sample: u16, float_subformat: bool) -> Result<SampleFormat, PlatformError> {
    match (tag, bits_per_sample) {
        (FORMAT_TAG_IEEE_FLOAT, 32) => Ok(SampleFormat::Float32),
        (FORMAT_TAG_EXTENSIBLE, 32) if float_subformat => Ok(SampleFormat::Float32),
        (FORMAT_TAG_PCM, 16) => Ok(SampleFormat::Int16),
        (FORMAT_TAG_EXTENSIBLE, 16) if !float_subformat => Ok(SampleFormat::Int16),
        _ => Err(PlatformError::UnsupportedFormat(format!(
            "tag 0x{:04X}, {} bits",
            tag, bits_per_sample
        ))),
    }
}

/// XInput motor speed (`0..=65535`) for a level in `[0, 1]`.
pub fn motor_speed(level: f32) -> u16 {
    (clamp_unit(level) * u16::MAX as f32).round() as u16
}
