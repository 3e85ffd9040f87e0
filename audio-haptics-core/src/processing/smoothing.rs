use crate::models::gamepad::ActuatorLevels;

/// Move `current` toward `target` by at most `(1000 / fade_time_ms) * delta_secs`.
///
/// `fade_time_ms == 0` snaps straight to the target. Never overshoots: when
/// the remaining distance fits inside one step the result is exactly `target`.
pub fn smooth_towards(current: f32, target: f32, fade_time_ms: u32, delta_secs: f32) -> f32 {
    if fade_time_ms == 0 {
        return target;
    }

    let fade_rate = 1000.0 / fade_time_ms as f32;
    let max_change = fade_rate * delta_secs.max(0.0);

    let difference = target - current;
    if difference.abs() <= max_change {
        return target;
    }

    if difference > 0.0 {
        current + max_change
    } else {
        current - max_change
    }
}

/// Apply `smooth_towards` to each of the four actuators.
pub fn smooth_levels(
    current: ActuatorLevels,
    target: ActuatorLevels,
    fade_time_ms: u32,
    delta_secs: f32,
) -> ActuatorLevels {
    ActuatorLevels {
        low: smooth_towards(current.low, target.low, fade_time_ms, delta_secs),
        high: smooth_towards(current.high, target.high, fade_time_ms, delta_secs),
        left_trigger: smooth_towards(current.left_trigger, target.left_trigger, fade_time_ms, delta_secs),
        right_trigger: smooth_towards(current.right_trigger, target.right_trigger, fade_time_ms, delta_secs),
    }
}
