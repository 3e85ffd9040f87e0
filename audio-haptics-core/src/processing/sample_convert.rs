use crate::models::audio_models::SampleFormat;

/// Converts a backend's native sample bytes to normalized `f32`.
///
/// Chosen once per capture session from the stream format; individual
/// blocks are never inspected to guess their encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleNormalizer {
    /// Native float samples pass through unchanged.
    PassThrough,
    /// Signed 16-bit PCM scaled by `1 / 32768`.
    Int16,
}

impl SampleNormalizer {
    pub fn for_format(format: SampleFormat) -> Self {
        match format {
            SampleFormat::Float32 => Self::PassThrough,
            SampleFormat::Int16 => Self::Int16,
        }
    }

    /// Decode `data` into `out`, replacing its previous contents.
    ///
    /// Bytes are in native endianness, as handed over by the driver. A
    /// trailing partial sample is ignored.
    pub fn normalize_into(&self, data: &[u8], out: &mut Vec<f32>) {
        out.clear();
        match self {
            Self::PassThrough => match bytemuck::try_cast_slice::<u8, f32>(data) {
                Ok(samples) => out.extend_from_slice(samples),
                Err(_) => {
                    // Misaligned or ragged buffer: decode sample by sample.
                    out.extend(
                        data.chunks_exact(4)
                            .map(|b| f32::from_ne_bytes([b[0], b[1], b[2], b[3]])),
                    );
                }
            },
            Self::Int16 => {
                out.extend(
                    data.chunks_exact(2)
                        .map(|b| i16::from_ne_bytes([b[0], b[1]]) as f32 / 32768.0),
                );
            }
        }
    }
}
