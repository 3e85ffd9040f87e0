//! Level metering and channel reduction on `&[f32]` buffers.

/// Downmix interleaved multi-channel audio to mono by averaging channels per frame.
///
/// A trailing partial frame is dropped.
pub fn downmix_to_mono(samples: &[f32], channels: usize) -> Vec<f32> {
    let mut mono = Vec::new();
    downmix_into(samples, channels, &mut mono);
    mono
}

/// Like `downmix_to_mono`, reusing `out` to avoid an allocation per block.
pub fn downmix_into(samples: &[f32], channels: usize, out: &mut Vec<f32>) {
    out.clear();
    if channels <= 1 {
        out.extend_from_slice(samples);
        return;
    }
    let scale = 1.0 / channels as f32;
    out.reserve(samples.len() / channels);
    for frame in samples.chunks_exact(channels) {
        let sum: f32 = frame.iter().sum();
        out.push(sum * scale);
    }
}

/// Compute RMS level of samples (0.0–1.0 range for normalized audio).
pub fn rms_level(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_sq: f32 = samples.iter().map(|s| s * s).sum();
    (sum_sq / samples.len() as f32).sqrt()
}

/// Compute peak absolute level of samples.
pub fn peak_level(samples: &[f32]) -> f32 {
    samples.iter().map(|s| s.abs()).fold(0.0f32, f32::max)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn downmix_stereo_to_mono() {
        let stereo = [0.2, 0.8, 0.4, 0.6];
        let mono = downmix_to_mono(&stereo, 2);
        assert_eq!(mono.len(), 2);
        assert!((mono[0] - 0.5).abs() < 1e-6);
        assert!((mono[1] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn downmix_identical_channels_is_lossless() {
        let stereo = [0.3, 0.3, -0.7, -0.7, 0.125, 0.125];
        assert_eq!(downmix_to_mono(&stereo, 2), vec![0.3, -0.7, 0.125]);
    }

    #[test]
    fn downmix_mono_passthrough() {
        let samples = vec![0.1, 0.2, 0.3];
        assert_eq!(downmix_to_mono(&samples, 1), samples);
        assert_eq!(downmix_to_mono(&samples, 0), samples);
    }

    #[test]
    fn downmix_drops_partial_frame() {
        let samples = [0.5, 0.5, 0.5, 1.0, 1.0];
        assert_eq!(downmix_to_mono(&samples, 3), vec![0.5]);
    }

    #[test]
    fn rms_level_silence() {
        assert_eq!(rms_level(&[0.0, 0.0, 0.0]), 0.0);
        assert_eq!(rms_level(&[]), 0.0);
    }

    #[test]
    fn rms_level_full_scale() {
        let rms = rms_level(&[1.0, -1.0, 1.0]);
        assert!((rms - 1.0).abs() < 1e-6);
    }

    #[test]
    fn peak_level_basic() {
        assert!((peak_level(&[0.1, -0.5, 0.3]) - 0.5).abs() < 1e-6);
    }
}
