//! First-order time-domain filters used for band energy estimation.
//!
//! Both filters take their coefficient as a fraction of Nyquist and keep
//! their state between calls, so a signal split across blocks filters the
//! same as if it arrived in one piece.

/// `y[n] = α·x[n] + (1 - α)·y[n-1]`
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct OnePoleLowPass {
    state: f32,
}

impl OnePoleLowPass {
    pub fn process(&mut self, sample: f32, alpha: f32) -> f32 {
        self.state = alpha * sample + (1.0 - alpha) * self.state;
        self.state
    }

    pub fn reset(&mut self) {
        self.state = 0.0;
    }

    pub fn state(&self) -> f32 {
        self.state
    }
}

/// `y[n] = (1 - α)·(y[n-1] + x[n] - x[n-1])`
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct OnePoleHighPass {
    prev_input: f32,
    prev_output: f32,
}

impl OnePoleHighPass {
    pub fn process(&mut self, sample: f32, alpha: f32) -> f32 {
        let output = (1.0 - alpha) * (self.prev_output + sample - self.prev_input);
        self.prev_input = sample;
        self.prev_output = output;
        output
    }

    pub fn reset(&mut self) {
        self.prev_input = 0.0;
        self.prev_output = 0.0;
    }
}

/// Filter memory carried across blocks by the feature extractor.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FilterState {
    pub bass: OnePoleLowPass,
    pub treble: OnePoleHighPass,
}

impl FilterState {
    pub fn reset(&mut self) {
        self.bass.reset();
        self.treble.reset();
    }

    pub fn is_reset(&self) -> bool {
        *self == Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn low_pass_converges_to_dc() {
        let mut lp = OnePoleLowPass::default();
        let mut out = 0.0;
        for _ in 0..500 {
            out = lp.process(1.0, 0.1);
        }
        assert_relative_eq!(out, 1.0, epsilon = 1e-4);
    }

    #[test]
    fn low_pass_first_step() {
        let mut lp = OnePoleLowPass::default();
        assert_relative_eq!(lp.process(1.0, 0.1), 0.1);
        assert_relative_eq!(lp.process(1.0, 0.1), 0.19, epsilon = 1e-6);
    }

    #[test]
    fn high_pass_blocks_dc() {
        let mut hp = OnePoleHighPass::default();
        let mut out = 1.0;
        for _ in 0..500 {
            out = hp.process(1.0, 0.3);
        }
        assert!(out.abs() < 1e-4);
    }

    #[test]
    fn high_pass_passes_alternating_signal() {
        let mut hp = OnePoleHighPass::default();
        let mut energy = 0.0;
        for i in 0..200 {
            let x = if i % 2 == 0 { 1.0 } else { -1.0 };
            let y = hp.process(x, 0.3);
            if i >= 100 {
                energy += y * y;
            }
        }
        assert!(energy / 100.0 > 0.5);
    }

    #[test]
    fn split_processing_matches_contiguous() {
        let signal: Vec<f32> = (0..64).map(|i| ((i * 7) % 11) as f32 / 11.0 - 0.5).collect();

        let mut whole = FilterState::default();
        let contiguous: Vec<f32> = signal.iter().map(|&x| whole.treble.process(x, 0.2)).collect();

        let mut split = FilterState::default();
        let (a, b) = signal.split_at(23);
        let mut pieces: Vec<f32> = a.iter().map(|&x| split.treble.process(x, 0.2)).collect();
        pieces.extend(b.iter().map(|&x| split.treble.process(x, 0.2)));

        assert_eq!(contiguous, pieces);
    }

    #[test]
    fn reset_clears_both_filters() {
        let mut state = FilterState::default();
        state.bass.process(0.8, 0.1);
        state.treble.process(0.8, 0.3);
        assert!(!state.is_reset());
        state.reset();
        assert!(state.is_reset());
    }
}
