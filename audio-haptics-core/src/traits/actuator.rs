use crate::models::error::ActuatorError;
use crate::models::gamepad::{ActuationFamily, ActuatorLevels, DeviceId};

/// Basic device information returned by a successful capability query.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DeviceInfo {
    pub name: String,
}

/// Result of the per-location haptic query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HapticInfo {
    pub location_count: u32,
}

/// Platform rumble/haptics driver consumed by `HapticMapper`.
///
/// The backend owns the table from `DeviceId` to platform handle. Ids must be
/// stable for as long as the device stays reachable, so repeated `enumerate`
/// calls report the same id for the same controller.
///
/// Methods take `&self`: the mapper calls `actuate` from the capture thread
/// while discovery runs on the control thread.
pub trait ActuatorBackend: Send + Sync {
    /// Ids of every currently reachable controller.
    fn enumerate(&self) -> Result<Vec<DeviceId>, ActuatorError>;

    fn device_info(&self, id: DeviceId) -> Result<DeviceInfo, ActuatorError>;

    /// Richer per-location haptic query. Fails on rumble-only drivers.
    fn haptic_info(&self, id: DeviceId) -> Result<HapticInfo, ActuatorError>;

    fn actuate(&self, id: DeviceId, family: ActuationFamily, levels: ActuatorLevels) -> Result<(), ActuatorError>;

    /// Drop the platform handle behind `id`.
    fn release(&self, id: DeviceId);
}
