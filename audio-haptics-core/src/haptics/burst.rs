use std::time::Instant;

use crate::models::audio_models::clamp_unit;
use crate::models::config::BurstSettings;
use crate::models::gamepad::ActuatorLevels;

/// Per-device state for burst emulation.
///
/// Rumble-only controllers cannot produce crisp haptic clicks, so loud
/// passages are rendered as short, strong pulses alternating between the
/// low and high motors.
#[derive(Debug, Clone, Default)]
pub struct BurstState {
    burst_start: Option<Instant>,
    last_burst: Option<Instant>,
    levels: ActuatorLevels,
    next_on_high: bool,
}

impl BurstState {
    /// Levels to output at `now` given this update's mapped `target`.
    ///
    /// A running burst holds its levels until `burst_duration` has passed.
    /// A new burst starts only when `volume` reaches the threshold and at
    /// least `min_interval` has passed since the previous burst started.
    pub fn next_levels(
        &mut self,
        target: ActuatorLevels,
        volume: f32,
        settings: &BurstSettings,
        now: Instant,
    ) -> ActuatorLevels {
        if let Some(start) = self.burst_start {
            if now.saturating_duration_since(start) < settings.burst_duration() {
                return self.levels;
            }
            self.burst_start = None;
            self.levels = ActuatorLevels::ZERO;
        }

        let interval_elapsed = self
            .last_burst
            .map_or(true, |last| now.saturating_duration_since(last) >= settings.min_interval());

        if volume >= settings.volume_threshold && interval_elapsed {
            let motor = clamp_unit(target.low.max(target.high) * settings.intensity);
            let trigger = clamp_unit(target.left_trigger.max(target.right_trigger) * settings.intensity);
            let (low, high) = if self.next_on_high { (0.0, motor) } else { (motor, 0.0) };

            self.next_on_high = !self.next_on_high;
            self.levels = ActuatorLevels::new(low, high, trigger, trigger);
            self.burst_start = Some(now);
            self.last_burst = Some(now);
            return self.levels;
        }

        ActuatorLevels::ZERO
    }

    pub fn is_bursting(&self) -> bool {
        self.burst_start.is_some()
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn ms(base: Instant, millis: u64) -> Instant {
        base + Duration::from_millis(millis)
    }

    #[test]
    fn quiet_audio_never_bursts() {
        let mut state = BurstState::default();
        let settings = BurstSettings::default();
        let out = state.next_levels(ActuatorLevels::new(0.5, 0.5, 0.1, 0.1), 0.29, &settings, Instant::now());
        assert!(out.is_zero());
        assert!(!state.is_bursting());
    }

    #[test]
    fn burst_is_amplified_and_held() {
        let mut state = BurstState::default();
        let settings = BurstSettings::default();
        let t0 = Instant::now();
        let target = ActuatorLevels::new(0.2, 0.1, 0.1, 0.0);

        let first = state.next_levels(target, 0.5, &settings, t0);
        assert!((first.low - 0.6).abs() < 1e-6);
        assert_eq!(first.high, 0.0);
        assert!((first.left_trigger - 0.3).abs() < 1e-6);
        assert_eq!(first.left_trigger, first.right_trigger);

        // Held for the burst duration regardless of the new target.
        let held = state.next_levels(ActuatorLevels::ZERO, 0.0, &settings, ms(t0, 30));
        assert_eq!(held, first);

        // Over, and too early for the next one.
        let gap = state.next_levels(target, 0.5, &settings, ms(t0, 60));
        assert!(gap.is_zero());
    }

    #[test]
    fn bursts_alternate_between_motors() {
        let mut state = BurstState::default();
        let settings = BurstSettings::default();
        let t0 = Instant::now();
        let target = ActuatorLevels::new(0.5, 0.5, 0.0, 0.0);

        let a = state.next_levels(target, 1.0, &settings, t0);
        let b = state.next_levels(target, 1.0, &settings, ms(t0, 150));
        let c = state.next_levels(target, 1.0, &settings, ms(t0, 300));

        assert_eq!((a.low, a.high), (1.0, 0.0));
        assert_eq!((b.low, b.high), (0.0, 1.0));
        assert_eq!((c.low, c.high), (1.0, 0.0));
    }

    #[test]
    fn reset_clears_running_burst() {
        let mut state = BurstState::default();
        state.next_levels(ActuatorLevels::new(0.5, 0.0, 0.0, 0.0), 1.0, &BurstSettings::default(), Instant::now());
        assert!(state.is_bursting());
        state.reset();
        assert!(!state.is_bursting());
    }
}
