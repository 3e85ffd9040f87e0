//! XInput rumble driver.
//!
//! Controllers live in four fixed user slots, so the slot index doubles as
//! the stable `DeviceId`. XInput has no per-location haptics and no trigger
//! motors; only the two rumble motors are driven.

use parking_lot::Mutex;
use windows::Win32::Foundation::{ERROR_DEVICE_NOT_CONNECTED, ERROR_SUCCESS};
use windows::Win32::UI::Input::XboxController::{
    XInputGetCapabilities, XInputGetState, XInputSetState, XINPUT_CAPABILITIES, XINPUT_FLAG_GAMEPAD, XINPUT_STATE,
    XINPUT_VIBRATION,
};

use audio_haptics_core::models::error::ActuatorError;
use audio_haptics_core::models::gamepad::{ActuationFamily, ActuatorLevels, DeviceId};
use audio_haptics_core::traits::actuator::{ActuatorBackend, DeviceInfo, HapticInfo};

use crate::convert::motor_speed;
use crate::error::PlatformError;

const SLOT_COUNT: u32 = 4;

#[derive(Default)]
pub struct XInputActuator {
    /// Slots handed out by the last `enumerate` and not yet released.
    owned: Mutex<[bool; SLOT_COUNT as usize]>,
}

impl XInputActuator {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(id: DeviceId) -> Result<u32, ActuatorError> {
        u32::try_from(id.0)
            .ok()
            .filter(|slot| *slot < SLOT_COUNT)
            .ok_or(ActuatorError::DeviceNotFound(id))
    }

    fn is_connected(slot: u32) -> bool {
        let mut state = XINPUT_STATE::default();
        unsafe { XInputGetState(slot, &mut state) == ERROR_SUCCESS.0 }
    }

    fn set_motors(slot: u32, low: u16, high: u16) -> Result<(), PlatformError> {
        let vibration = XINPUT_VIBRATION {
            wLeftMotorSpeed: low,
            wRightMotorSpeed: high,
        };
        match unsafe { XInputSetState(slot, &vibration) } {
            code if code == ERROR_SUCCESS.0 => Ok(()),
            code if code == ERROR_DEVICE_NOT_CONNECTED.0 => Err(PlatformError::NotConnected(slot)),
            code => Err(PlatformError::call("XInputSetState", code)),
        }
    }
}

impl ActuatorBackend for XInputActuator {
    fn enumerate(&self) -> Result<Vec<DeviceId>, ActuatorError> {
        let mut owned = self.owned.lock();
        let mut found = Vec::new();
        for slot in 0..SLOT_COUNT {
            let connected = Self::is_connected(slot);
            owned[slot as usize] = connected;
            if connected {
                found.push(DeviceId(slot as u64));
            }
        }
        log::debug!("XInput: {} controller(s) connected", found.len());
        Ok(found)
    }

    fn device_info(&self, id: DeviceId) -> Result<DeviceInfo, ActuatorError> {
        let slot = Self::slot(id)?;
        let mut caps = XINPUT_CAPABILITIES::default();
        let code = unsafe { XInputGetCapabilities(slot, XINPUT_FLAG_GAMEPAD, &mut caps) };
        if code == ERROR_DEVICE_NOT_CONNECTED.0 {
            return Err(PlatformError::NotConnected(slot).into());
        }
        if code != ERROR_SUCCESS.0 {
            return Err(ActuatorError::QueryFailed(
                PlatformError::call("XInputGetCapabilities", code).to_string(),
            ));
        }
        Ok(DeviceInfo {
            name: format!("XInput Controller {}", slot + 1),
        })
    }

    fn haptic_info(&self, id: DeviceId) -> Result<HapticInfo, ActuatorError> {
        Self::slot(id)?;
        Err(ActuatorError::QueryFailed("XInput exposes no haptic locations".into()))
    }

    fn actuate(&self, id: DeviceId, _family: ActuationFamily, levels: ActuatorLevels) -> Result<(), ActuatorError> {
        let slot = Self::slot(id)?;
        if !self.owned.lock()[slot as usize] {
            return Err(ActuatorError::DeviceNotFound(id));
        }
        Self::set_motors(slot, motor_speed(levels.low), motor_speed(levels.high))?;
        Ok(())
    }

    fn release(&self, id: DeviceId) {
        let Ok(slot) = Self::slot(id) else {
            return;
        };
        let mut owned = self.owned.lock();
        if owned[slot as usize] {
            if let Err(e) = Self::set_motors(slot, 0, 0) {
                log::debug!("XInput slot {} release: {}", slot, e);
            }
            owned[slot as usize] = false;
        }
    }
}
