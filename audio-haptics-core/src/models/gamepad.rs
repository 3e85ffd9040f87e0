use std::fmt;
use std::time::Instant;

use super::audio_models::clamp_unit;
use crate::haptics::burst::BurstState;

/// Opaque handle for a controller, issued by the actuator backend.
///
/// The backend owns the mapping from id to platform device; the mapper only
/// ever holds ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceId(pub u64);

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Output levels for the four actuators of a controller, each in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ActuatorLevels {
    /// Low-frequency (left, heavy) rumble motor.
    pub low: f32,
    /// High-frequency (right, light) rumble motor.
    pub high: f32,
    pub left_trigger: f32,
    pub right_trigger: f32,
}

impl ActuatorLevels {
    pub const ZERO: Self = Self {
        low: 0.0,
        high: 0.0,
        left_trigger: 0.0,
        right_trigger: 0.0,
    };

    pub fn new(low: f32, high: f32, left_trigger: f32, right_trigger: f32) -> Self {
        Self {
            low,
            high,
            left_trigger,
            right_trigger,
        }
    }

    pub fn clamped(self) -> Self {
        Self {
            low: clamp_unit(self.low),
            high: clamp_unit(self.high),
            left_trigger: clamp_unit(self.left_trigger),
            right_trigger: clamp_unit(self.right_trigger),
        }
    }

    pub fn is_zero(&self) -> bool {
        *self == Self::ZERO
    }

    pub fn as_array(&self) -> [f32; 4] {
        [self.low, self.high, self.left_trigger, self.right_trigger]
    }
}

/// What a controller can do, detected once at discovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GamepadCapabilities {
    pub supports_rumble: bool,
    pub supports_haptics: bool,
    /// Logical rumble channels: low, high, left trigger, right trigger.
    pub motor_count: u32,
    pub haptic_location_count: u32,
}

impl GamepadCapabilities {
    pub const RUMBLE_MOTOR_COUNT: u32 = 4;

    /// Conservative fallback when the device cannot be queried.
    pub fn rumble_only() -> Self {
        Self {
            supports_rumble: true,
            supports_haptics: false,
            motor_count: Self::RUMBLE_MOTOR_COUNT,
            haptic_location_count: 0,
        }
    }
}

/// Actuation API family used for a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActuationFamily {
    Rumble,
    Haptic,
    Hybrid,
}

/// A tracked controller and its current output state.
#[derive(Debug, Clone)]
pub struct GamepadRecord {
    pub id: DeviceId,
    pub name: String,
    pub capabilities: GamepadCapabilities,
    pub family: ActuationFamily,
    /// Last levels pushed (or attempted) to the device.
    pub levels: ActuatorLevels,
    pub last_update: Instant,
    pub consecutive_failures: u32,
    /// Set once `consecutive_failures` reaches the threshold.
    pub excluded: bool,
    pub(crate) burst: BurstState,
}

impl GamepadRecord {
    pub fn new(
        id: DeviceId,
        name: String,
        capabilities: GamepadCapabilities,
        family: ActuationFamily,
        now: Instant,
    ) -> Self {
        Self {
            id,
            name,
            capabilities,
            family,
            levels: ActuatorLevels::ZERO,
            last_update: now,
            consecutive_failures: 0,
            excluded: false,
            burst: BurstState::default(),
        }
    }

    pub fn is_active(&self) -> bool {
        !self.excluded
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn levels_clamp_into_unit_range() {
        let levels = ActuatorLevels::new(1.5, -0.5, f32::NAN, 0.4).clamped();
        assert_eq!(levels, ActuatorLevels::new(1.0, 0.0, 0.0, 0.4));
    }

    #[test]
    fn rumble_only_fallback() {
        let caps = GamepadCapabilities::rumble_only();
        assert!(caps.supports_rumble);
        assert!(!caps.supports_haptics);
        assert_eq!(caps.motor_count, 4);
    }

    #[test]
    fn new_record_starts_silent() {
        let record = GamepadRecord::new(
            DeviceId(3),
            "pad".into(),
            GamepadCapabilities::rumble_only(),
            ActuationFamily::Rumble,
            Instant::now(),
        );
        assert!(record.levels.is_zero());
        assert!(record.is_active());
        assert_eq!(record.id.to_string(), "#3");
    }
}
