use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;

use crate::models::audio_models::{clamp_unit, AudioFeatures};
use crate::models::config::{ActuationStyle, DiscoveryConfig, HapticMode, HapticSettings};
use crate::models::error::ActuatorError;
use crate::models::gamepad::{ActuationFamily, ActuatorLevels, DeviceId, GamepadCapabilities, GamepadRecord};
use crate::processing::smoothing::smooth_levels;
use crate::traits::actuator::ActuatorBackend;

use super::discovery::DiscoverySession;

/// Maps audio features to controller actuation and pushes it to every
/// tracked device.
///
/// Shared between the capture thread (`process_features`) and a control
/// thread (`update_devices`, `set_rumble`, `set_settings`). The registry and
/// settings are only locked long enough to copy or update values; device I/O
/// always happens after those locks are released. Output batches are
/// serialized end to end by a separate lock that guards no data.
pub struct HapticMapper {
    backend: Arc<dyn ActuatorBackend>,
    registry: Mutex<Vec<GamepadRecord>>,
    settings: Mutex<HapticSettings>,
    /// Serializes rescans with each other and with shutdown.
    discovery: Mutex<DiscoverySession>,
    /// Held from computing a batch until it has been sent, so batches reach
    /// the devices in the order their levels were recorded. Taken before
    /// `registry`.
    output: Mutex<()>,
    last_process: Mutex<Option<Instant>>,
    config: DiscoveryConfig,
}

impl HapticMapper {
    pub fn new(backend: Arc<dyn ActuatorBackend>, settings: HapticSettings) -> Self {
        Self::with_config(backend, settings, DiscoveryConfig::default())
    }

    pub fn with_config(backend: Arc<dyn ActuatorBackend>, settings: HapticSettings, config: DiscoveryConfig) -> Self {
        Self {
            backend,
            registry: Mutex::new(Vec::new()),
            settings: Mutex::new(settings.sanitized()),
            discovery: Mutex::new(DiscoverySession::default()),
            output: Mutex::new(()),
            last_process: Mutex::new(None),
            config,
        }
    }

    // MARK: - Discovery

    /// Scan for controllers now, appending any not yet tracked.
    ///
    /// Returns how many were added. Existing records are never touched.
    pub fn rediscover(&self) -> Result<usize, ActuatorError> {
        let mut session = self.discovery.lock();
        self.rediscover_locked(&mut session, Instant::now())
    }

    /// Rescan if the rescan interval has elapsed since the last scan.
    ///
    /// Returns whether a scan ran. Scan errors are logged, not returned.
    pub fn update_devices(&self, now: Instant) -> bool {
        let mut session = self.discovery.lock();
        if !session.is_due(now, self.config.rescan_interval) {
            return false;
        }
        if let Err(e) = self.rediscover_locked(&mut session, now) {
            log::warn!("Gamepad rescan failed: {}", e);
        }
        true
    }

    fn rediscover_locked(&self, session: &mut DiscoverySession, now: Instant) -> Result<usize, ActuatorError> {
        let ids = self.backend.enumerate()?;
        let first_scan = session.record_scan(now);

        let mut seen: HashSet<DeviceId> = self.registry.lock().iter().map(|r| r.id).collect();
        let fresh: Vec<DeviceId> = ids.into_iter().filter(|id| seen.insert(*id)).collect();

        let detected: Vec<(DeviceId, String, GamepadCapabilities)> = fresh
            .into_iter()
            .map(|id| {
                let (name, caps) = self.detect_capabilities(id);
                (id, name, caps)
            })
            .collect();

        let mode = self.settings.lock().preferred_mode;
        let mut registry = self.registry.lock();
        let mut added = 0;
        for (id, name, caps) in detected {
            if registry.iter().any(|r| r.id == id) {
                continue;
            }
            let family = resolve_family(mode, &caps);
            log::info!(
                "Found new gamepad {} ({}) - rumble: {}, haptics: {}, family: {:?}",
                id,
                name,
                caps.supports_rumble,
                caps.supports_haptics,
                family
            );
            registry.push(GamepadRecord::new(id, name, caps, family, now));
            added += 1;
        }

        if first_scan || added > 0 {
            log::info!("Total gamepads found: {}", registry.len());
        } else {
            log::debug!("Gamepad rescan: no new devices");
        }
        Ok(added)
    }

    /// Best-effort capability query. Never drops the device.
    fn detect_capabilities(&self, id: DeviceId) -> (String, GamepadCapabilities) {
        match self.backend.device_info(id) {
            Ok(info) => {
                let haptic_locations = match self.backend.haptic_info(id) {
                    Ok(haptic) => haptic.location_count,
                    Err(e) => {
                        log::debug!("Gamepad {} has no haptic support: {}", id, e);
                        0
                    }
                };
                let caps = GamepadCapabilities {
                    supports_rumble: true,
                    supports_haptics: haptic_locations > 0,
                    motor_count: GamepadCapabilities::RUMBLE_MOTOR_COUNT,
                    haptic_location_count: haptic_locations,
                };
                (info.name, caps)
            }
            Err(e) => {
                log::warn!("Failed to query gamepad {}: {}; assuming rumble only", id, e);
                (format!("Gamepad {}", id), GamepadCapabilities::rumble_only())
            }
        }
    }

    // MARK: - Actuation

    /// Map and push one feature snapshot, timestamped now.
    pub fn process_features(&self, features: &AudioFeatures) -> bool {
        self.process_features_at(features, Instant::now())
    }

    /// Map and push one feature snapshot as of `now`.
    ///
    /// Skipped (returning false) if less than `update_rate_ms` has passed
    /// since the last pushed update.
    pub fn process_features_at(&self, features: &AudioFeatures, now: Instant) -> bool {
        let settings = *self.settings.lock();
        {
            let mut last = self.last_process.lock();
            if let Some(previous) = *last {
                if now.saturating_duration_since(previous) < settings.update_interval() {
                    return false;
                }
            }
            *last = Some(now);
        }

        let target = map_features(features, &settings);
        let _order = self.output.lock();
        let batch: Vec<(DeviceId, ActuationFamily, ActuatorLevels)> = {
            let mut registry = self.registry.lock();
            registry
                .iter_mut()
                .filter(|r| r.is_active())
                .map(|record| {
                    let levels = match settings.style {
                        ActuationStyle::Continuous => {
                            let dt = now.saturating_duration_since(record.last_update).as_secs_f32();
                            smooth_levels(record.levels, target, settings.fade_time_ms, dt)
                        }
                        ActuationStyle::Burst => {
                            record.burst.next_levels(target, features.volume, &settings.burst, now)
                        }
                    };
                    record.levels = levels;
                    record.last_update = now;
                    (record.id, record.family, levels)
                })
                .collect()
        };

        self.push(batch);
        true
    }

    /// Drive every active controller directly, bypassing mapping and smoothing.
    ///
    /// Inputs are clamped to `[0, 1]`.
    pub fn set_rumble(&self, low: f32, high: f32, left_trigger: f32, right_trigger: f32) {
        let levels = ActuatorLevels::new(low, high, left_trigger, right_trigger).clamped();
        let _order = self.output.lock();
        let now = Instant::now();
        let batch: Vec<_> = {
            let mut registry = self.registry.lock();
            registry
                .iter_mut()
                .filter(|r| r.is_active())
                .map(|record| {
                    record.levels = levels;
                    record.last_update = now;
                    (record.id, record.family, levels)
                })
                .collect()
        };
        self.push(batch);
    }

    /// Zero every tracked actuator, excluded devices included.
    pub fn stop_all(&self) {
        let _order = self.output.lock();
        let now = Instant::now();
        let batch: Vec<_> = {
            let mut registry = self.registry.lock();
            registry
                .iter_mut()
                .map(|record| {
                    record.levels = ActuatorLevels::ZERO;
                    record.last_update = now;
                    record.burst.reset();
                    (record.id, record.family, ActuatorLevels::ZERO)
                })
                .collect()
        };
        self.push(batch);
    }

    /// Send a batch to the backend, then record per-device outcomes.
    ///
    /// Callers hold `output`.
    fn push(&self, batch: Vec<(DeviceId, ActuationFamily, ActuatorLevels)>) {
        if batch.is_empty() {
            return;
        }

        let results: Vec<(DeviceId, Result<(), ActuatorError>)> = batch
            .into_iter()
            .map(|(id, family, levels)| (id, self.backend.actuate(id, family, levels)))
            .collect();

        let threshold = self.config.failure_threshold;
        let mut registry = self.registry.lock();
        for (id, result) in results {
            let Some(record) = registry.iter_mut().find(|r| r.id == id) else {
                continue;
            };
            match result {
                Ok(()) => record.consecutive_failures = 0,
                Err(e) => {
                    record.consecutive_failures += 1;
                    if record.consecutive_failures == 1 {
                        log::warn!("Actuation failed on gamepad {}: {}", id, e);
                    }
                    if !record.excluded && record.consecutive_failures >= threshold {
                        record.excluded = true;
                        log::warn!(
                            "Gamepad {} excluded after {} consecutive failures",
                            id,
                            record.consecutive_failures
                        );
                    }
                }
            }
        }
    }

    // MARK: - Settings

    /// Replace the settings. Out-of-range values are clamped.
    pub fn set_settings(&self, settings: HapticSettings) {
        let settings = settings.sanitized();
        let previous = std::mem::replace(&mut *self.settings.lock(), settings);

        let mode_changed = previous.preferred_mode != settings.preferred_mode;
        let style_changed = previous.style != settings.style;
        if !mode_changed && !style_changed {
            return;
        }

        let mut registry = self.registry.lock();
        for record in registry.iter_mut() {
            if mode_changed {
                record.family = resolve_family(settings.preferred_mode, &record.capabilities);
            }
            if style_changed {
                record.burst.reset();
            }
        }
        if mode_changed {
            log::info!("Haptic mode set to {}", settings.preferred_mode.description());
        }
    }

    pub fn settings(&self) -> HapticSettings {
        *self.settings.lock()
    }

    // MARK: - Status

    /// The mode actually in effect across tracked devices.
    ///
    /// `Auto` resolves to `Haptic` when any device supports haptics. Modes
    /// that need haptics fall back to `Rumble` when none does.
    pub fn active_mode(&self) -> HapticMode {
        let preferred = self.settings.lock().preferred_mode;
        let any_haptics = self
            .registry
            .lock()
            .iter()
            .any(|r| r.is_active() && r.capabilities.supports_haptics);

        match (preferred, any_haptics) {
            (HapticMode::Rumble, _) | (_, false) => HapticMode::Rumble,
            (HapticMode::Auto, true) | (HapticMode::Haptic, true) => HapticMode::Haptic,
            (HapticMode::Hybrid, true) => HapticMode::Hybrid,
        }
    }

    /// Last levels pushed to `id`.
    pub fn levels(&self, id: DeviceId) -> Option<ActuatorLevels> {
        self.registry.lock().iter().find(|r| r.id == id).map(|r| r.levels)
    }

    /// Snapshot of every tracked controller.
    pub fn gamepads(&self) -> Vec<GamepadRecord> {
        self.registry.lock().clone()
    }

    pub fn gamepad_count(&self) -> usize {
        self.registry.lock().len()
    }

    /// One-line summary for status displays.
    pub fn device_status(&self) -> String {
        let (total, haptic, excluded) = {
            let registry = self.registry.lock();
            (
                registry.len(),
                registry.iter().filter(|r| r.capabilities.supports_haptics).count(),
                registry.iter().filter(|r| r.excluded).count(),
            )
        };
        if total == 0 {
            return "No gamepads connected".into();
        }
        let mut status = format!(
            "{} gamepad(s), {} haptic-capable, mode: {}",
            total,
            haptic,
            self.active_mode().description()
        );
        if excluded > 0 {
            status.push_str(&format!(", {} excluded", excluded));
        }
        status
    }

    // MARK: - Teardown

    /// Zero every actuator, then release every handle, then forget all devices.
    pub fn shutdown(&self) {
        let _session = self.discovery.lock();
        self.stop_all();

        let records = std::mem::take(&mut *self.registry.lock());
        for record in &records {
            self.backend.release(record.id);
        }
        if !records.is_empty() {
            log::info!("Released {} gamepad(s)", records.len());
        }
    }
}

impl Drop for HapticMapper {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Target levels for one snapshot, before smoothing or burst shaping.
///
/// Every output is clamped to `[0, 1]`.
pub fn map_features(features: &AudioFeatures, settings: &HapticSettings) -> ActuatorLevels {
    let mut levels = ActuatorLevels::ZERO;

    if settings.use_rumble_motors {
        if settings.use_low_frequency_motor {
            levels.low = features.bass * settings.bass_intensity;
        }
        if settings.use_high_frequency_motor {
            levels.high = features.treble * settings.treble_intensity;
        }
        let volume = features.volume * settings.volume_intensity * 0.5;
        levels.low += volume;
        levels.high += volume;
    }

    if settings.use_impulse_motor {
        let trigger = features.dynamic_range * settings.dynamic_intensity + features.peak * 0.3;
        levels.left_trigger = trigger;
        levels.right_trigger = trigger;
    }

    ActuatorLevels {
        low: clamp_unit(levels.low),
        high: clamp_unit(levels.high),
        left_trigger: clamp_unit(levels.left_trigger),
        right_trigger: clamp_unit(levels.right_trigger),
    }
}

/// Actuation family for a device under `mode`. Unsupported families
/// degrade to rumble.
pub fn resolve_family(mode: HapticMode, caps: &GamepadCapabilities) -> ActuationFamily {
    match mode {
        HapticMode::Rumble => ActuationFamily::Rumble,
        HapticMode::Auto | HapticMode::Haptic if caps.supports_haptics => ActuationFamily::Haptic,
        HapticMode::Hybrid if caps.supports_haptics => ActuationFamily::Hybrid,
        _ => ActuationFamily::Rumble,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Barrier;
    use std::thread;
    use std::time::Duration;

    use super::*;
    use crate::traits::actuator::{DeviceInfo, HapticInfo};
    use approx::assert_relative_eq;

    #[derive(Debug, Clone, PartialEq)]
    enum Event {
        Actuate(DeviceId, ActuationFamily, ActuatorLevels),
        Release(DeviceId),
    }

    /// In-memory driver that records every call.
    #[derive(Default)]
    struct RecordingActuator {
        devices: Mutex<Vec<DeviceId>>,
        info_fails: HashSet<DeviceId>,
        haptic_locations: HashMap<DeviceId, u32>,
        actuate_fails: Mutex<HashSet<DeviceId>>,
        enumerations: Mutex<usize>,
        events: Mutex<Vec<Event>>,
        /// Simulated device latency per actuation.
        latency: Option<Duration>,
    }

    impl RecordingActuator {
        fn with_devices(ids: &[u64]) -> Self {
            Self {
                devices: Mutex::new(ids.iter().map(|&i| DeviceId(i)).collect()),
                ..Self::default()
            }
        }

        fn actuations(&self, id: DeviceId) -> Vec<ActuatorLevels> {
            self.events
                .lock()
                .iter()
                .filter_map(|e| match e {
                    Event::Actuate(dev, _, levels) if *dev == id => Some(*levels),
                    _ => None,
                })
                .collect()
        }
    }

    impl ActuatorBackend for RecordingActuator {
        fn enumerate(&self) -> Result<Vec<DeviceId>, ActuatorError> {
            *self.enumerations.lock() += 1;
            Ok(self.devices.lock().clone())
        }

        fn device_info(&self, id: DeviceId) -> Result<DeviceInfo, ActuatorError> {
            if self.info_fails.contains(&id) {
                return Err(ActuatorError::QueryFailed("no info".into()));
            }
            Ok(DeviceInfo {
                name: format!("Pad {}", id.0),
            })
        }

        fn haptic_info(&self, id: DeviceId) -> Result<HapticInfo, ActuatorError> {
            self.haptic_locations
                .get(&id)
                .map(|&location_count| HapticInfo { location_count })
                .ok_or_else(|| ActuatorError::QueryFailed("rumble only".into()))
        }

        fn actuate(&self, id: DeviceId, family: ActuationFamily, levels: ActuatorLevels) -> Result<(), ActuatorError> {
            if let Some(latency) = self.latency {
                thread::sleep(latency);
            }
            self.events.lock().push(Event::Actuate(id, family, levels));
            if self.actuate_fails.lock().contains(&id) {
                return Err(ActuatorError::ActuationFailed("unplugged".into()));
            }
            Ok(())
        }

        fn release(&self, id: DeviceId) {
            self.events.lock().push(Event::Release(id));
        }
    }

    fn immediate_settings() -> HapticSettings {
        HapticSettings {
            update_rate_ms: 0,
            ..HapticSettings::default()
        }
    }

    fn mapper_with(actuator: RecordingActuator, settings: HapticSettings) -> (HapticMapper, Arc<RecordingActuator>) {
        let actuator = Arc::new(actuator);
        let backend: Arc<dyn ActuatorBackend> = actuator.clone();
        (HapticMapper::new(backend, settings), actuator)
    }

    fn loud() -> AudioFeatures {
        AudioFeatures {
            volume: 1.0,
            bass: 0.0,
            midrange: 0.0,
            treble: 0.0,
            peak: 0.0,
            dynamic_range: 0.0,
        }
    }

    #[test]
    fn set_rumble_reads_back_exactly() {
        let (mapper, actuator) = mapper_with(RecordingActuator::with_devices(&[1]), HapticSettings::default());
        mapper.rediscover().unwrap();

        mapper.set_rumble(0.3, 0.7, 0.0, 0.0);

        let expected = ActuatorLevels::new(0.3, 0.7, 0.0, 0.0);
        assert_eq!(mapper.levels(DeviceId(1)), Some(expected));
        assert_eq!(actuator.actuations(DeviceId(1)), vec![expected]);
    }

    #[test]
    fn set_rumble_clamps() {
        let (mapper, _) = mapper_with(RecordingActuator::with_devices(&[1]), HapticSettings::default());
        mapper.rediscover().unwrap();
        mapper.set_rumble(1.5, -0.2, f32::NAN, 0.5);
        assert_eq!(mapper.levels(DeviceId(1)), Some(ActuatorLevels::new(1.0, 0.0, 0.0, 0.5)));
    }

    #[test]
    fn rediscovery_never_duplicates() {
        let (mapper, actuator) = mapper_with(RecordingActuator::with_devices(&[1, 2, 2]), HapticSettings::default());
        assert_eq!(mapper.rediscover().unwrap(), 2);
        assert_eq!(mapper.rediscover().unwrap(), 0);
        assert_eq!(mapper.gamepad_count(), 2);

        mapper.set_rumble(0.4, 0.4, 0.0, 0.0);
        actuator.devices.lock().push(DeviceId(3));
        assert_eq!(mapper.rediscover().unwrap(), 1);

        // Existing records are left as they were.
        assert_eq!(mapper.levels(DeviceId(1)), Some(ActuatorLevels::new(0.4, 0.4, 0.0, 0.0)));
        assert_eq!(mapper.levels(DeviceId(3)), Some(ActuatorLevels::ZERO));
        let ids: Vec<u64> = mapper.gamepads().iter().map(|r| r.id.0).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[test]
    fn failed_query_degrades_to_rumble_only() {
        let mut actuator = RecordingActuator::with_devices(&[1, 2, 3]);
        actuator.info_fails.insert(DeviceId(1));
        actuator.haptic_locations.insert(DeviceId(2), 4);
        actuator.haptic_locations.insert(DeviceId(3), 0);
        let (mapper, _) = mapper_with(actuator, HapticSettings::default());
        mapper.rediscover().unwrap();

        let pads = mapper.gamepads();
        assert_eq!(pads[0].capabilities, GamepadCapabilities::rumble_only());
        assert_eq!(pads[0].name, "Gamepad #1");
        assert!(pads[1].capabilities.supports_haptics);
        assert_eq!(pads[1].capabilities.haptic_location_count, 4);
        assert!(!pads[2].capabilities.supports_haptics);
        assert_eq!(pads[2].capabilities.motor_count, 4);
    }

    #[test]
    fn mode_resolution_degrades_to_rumble() {
        let haptic = GamepadCapabilities {
            supports_haptics: true,
            haptic_location_count: 2,
            ..GamepadCapabilities::rumble_only()
        };
        let rumble = GamepadCapabilities::rumble_only();

        assert_eq!(resolve_family(HapticMode::Auto, &haptic), ActuationFamily::Haptic);
        assert_eq!(resolve_family(HapticMode::Auto, &rumble), ActuationFamily::Rumble);
        assert_eq!(resolve_family(HapticMode::Haptic, &rumble), ActuationFamily::Rumble);
        assert_eq!(resolve_family(HapticMode::Hybrid, &haptic), ActuationFamily::Hybrid);
        assert_eq!(resolve_family(HapticMode::Hybrid, &rumble), ActuationFamily::Rumble);
        assert_eq!(resolve_family(HapticMode::Rumble, &haptic), ActuationFamily::Rumble);
    }

    #[test]
    fn mode_change_reresolves_families() {
        let mut actuator = RecordingActuator::with_devices(&[1, 2]);
        actuator.haptic_locations.insert(DeviceId(1), 2);
        let (mapper, _) = mapper_with(actuator, HapticSettings::default());
        mapper.rediscover().unwrap();

        assert_eq!(mapper.active_mode(), HapticMode::Haptic);
        let families: Vec<_> = mapper.gamepads().iter().map(|r| r.family).collect();
        assert_eq!(families, vec![ActuationFamily::Haptic, ActuationFamily::Rumble]);

        mapper.set_settings(HapticSettings {
            preferred_mode: HapticMode::Hybrid,
            ..HapticSettings::default()
        });
        assert_eq!(mapper.active_mode(), HapticMode::Hybrid);
        let families: Vec<_> = mapper.gamepads().iter().map(|r| r.family).collect();
        assert_eq!(families, vec![ActuationFamily::Hybrid, ActuationFamily::Rumble]);
    }

    #[test]
    fn active_mode_without_haptics_is_rumble() {
        let (mapper, _) = mapper_with(RecordingActuator::with_devices(&[1]), HapticSettings::default());
        mapper.rediscover().unwrap();
        assert_eq!(mapper.active_mode(), HapticMode::Rumble);
    }

    #[test]
    fn mapping_formula() {
        let settings = HapticSettings {
            bass_intensity: 1.0,
            treble_intensity: 0.5,
            volume_intensity: 0.4,
            dynamic_intensity: 1.0,
            ..HapticSettings::default()
        };
        let features = AudioFeatures {
            volume: 0.5,
            bass: 0.6,
            midrange: 0.0,
            treble: 0.4,
            peak: 0.5,
            dynamic_range: 0.2,
        };
        let levels = map_features(&features, &settings);
        assert_relative_eq!(levels.low, 0.6 + 0.1, epsilon = 1e-6);
        assert_relative_eq!(levels.high, 0.2 + 0.1, epsilon = 1e-6);
        assert_relative_eq!(levels.left_trigger, 0.2 + 0.15, epsilon = 1e-6);
        assert_eq!(levels.left_trigger, levels.right_trigger);
    }

    #[test]
    fn mapping_respects_motor_switches() {
        let features = AudioFeatures {
            volume: 0.8,
            bass: 0.8,
            midrange: 0.0,
            treble: 0.8,
            peak: 0.9,
            dynamic_range: 0.1,
        };

        let no_rumble = HapticSettings {
            use_rumble_motors: false,
            ..HapticSettings::default()
        };
        let levels = map_features(&features, &no_rumble);
        assert_eq!((levels.low, levels.high), (0.0, 0.0));
        assert!(levels.left_trigger > 0.0);

        let no_low = HapticSettings {
            bass_intensity: 2.0,
            volume_intensity: 0.0,
            use_low_frequency_motor: false,
            use_impulse_motor: false,
            ..HapticSettings::default()
        };
        let levels = map_features(&features, &no_low);
        assert_eq!(levels.low, 0.0);
        assert_eq!(levels.left_trigger, 0.0);
        assert_eq!(levels.right_trigger, 0.0);

        // Volume alone saturates the motors at default settings.
        let levels = map_features(&features, &HapticSettings::default());
        assert_eq!((levels.low, levels.high), (0.8, 0.8));
        assert!(levels.as_array().iter().all(|v| (0.0..=1.0).contains(v)));
    }

    #[test]
    fn continuous_output_is_smoothed_over_time() {
        let (mapper, actuator) = mapper_with(RecordingActuator::with_devices(&[1]), immediate_settings());
        let t0 = Instant::now();
        assert!(mapper.update_devices(t0));

        // default fade 100 ms: 50 ms covers half the range
        assert!(mapper.process_features_at(&loud(), t0 + Duration::from_millis(50)));
        let half = mapper.levels(DeviceId(1)).unwrap();
        assert_relative_eq!(half.low, 0.5, epsilon = 1e-4);
        assert_relative_eq!(half.high, 0.5, epsilon = 1e-4);

        assert!(mapper.process_features_at(&loud(), t0 + Duration::from_millis(1050)));
        assert_eq!(mapper.levels(DeviceId(1)).unwrap().low, 1.0);
        assert_eq!(actuator.actuations(DeviceId(1)).len(), 2);
    }

    #[test]
    fn zero_fade_snaps_to_target() {
        let settings = HapticSettings {
            fade_time_ms: 0,
            ..immediate_settings()
        };
        let (mapper, _) = mapper_with(RecordingActuator::with_devices(&[1]), settings);
        let t0 = Instant::now();
        mapper.update_devices(t0);
        mapper.process_features_at(&loud(), t0);
        assert_eq!(mapper.levels(DeviceId(1)).unwrap().low, 1.0);
    }

    #[test]
    fn updates_are_rate_limited() {
        let (mapper, actuator) = mapper_with(RecordingActuator::with_devices(&[1]), HapticSettings::default());
        let t0 = Instant::now();
        mapper.update_devices(t0);

        assert!(mapper.process_features_at(&loud(), t0));
        assert!(!mapper.process_features_at(&loud(), t0 + Duration::from_millis(5)));
        assert!(mapper.process_features_at(&loud(), t0 + Duration::from_millis(20)));
        assert_eq!(actuator.actuations(DeviceId(1)).len(), 2);
    }

    #[test]
    fn burst_style_alternates_motors() {
        let settings = HapticSettings {
            update_rate_ms: 0,
            ..HapticSettings::burst_emulation()
        };
        let (mapper, _) = mapper_with(RecordingActuator::with_devices(&[1]), settings);
        let t0 = Instant::now();
        mapper.update_devices(t0);

        mapper.process_features_at(&loud(), t0);
        let first = mapper.levels(DeviceId(1)).unwrap();
        assert_eq!((first.low, first.high), (1.0, 0.0));

        mapper.process_features_at(&loud(), t0 + Duration::from_millis(200));
        let second = mapper.levels(DeviceId(1)).unwrap();
        assert_eq!((second.low, second.high), (0.0, 1.0));
    }

    #[test]
    fn failing_device_is_excluded_without_affecting_others() {
        let actuator = RecordingActuator::with_devices(&[1, 2]);
        actuator.actuate_fails.lock().insert(DeviceId(1));
        let (mapper, actuator) = mapper_with(actuator, immediate_settings());
        mapper.rediscover().unwrap();

        for _ in 0..4 {
            mapper.set_rumble(0.5, 0.5, 0.0, 0.0);
        }
        assert!(!mapper.gamepads()[0].excluded);
        mapper.set_rumble(0.5, 0.5, 0.0, 0.0);
        let pads = mapper.gamepads();
        assert!(pads[0].excluded);
        assert_eq!(pads[0].consecutive_failures, 5);
        assert!(!pads[1].excluded);

        // No further pushes to the excluded device; rediscovery keeps it out.
        mapper.rediscover().unwrap();
        mapper.set_rumble(0.1, 0.1, 0.0, 0.0);
        assert_eq!(actuator.actuations(DeviceId(1)).len(), 5);
        assert_eq!(actuator.actuations(DeviceId(2)).len(), 6);
        assert!(mapper.device_status().contains("1 excluded"));
    }

    #[test]
    fn success_resets_failure_count() {
        let actuator = RecordingActuator::with_devices(&[1]);
        actuator.actuate_fails.lock().insert(DeviceId(1));
        let (mapper, actuator) = mapper_with(actuator, immediate_settings());
        mapper.rediscover().unwrap();

        for _ in 0..3 {
            mapper.set_rumble(0.5, 0.5, 0.0, 0.0);
        }
        actuator.actuate_fails.lock().clear();
        mapper.set_rumble(0.5, 0.5, 0.0, 0.0);
        assert_eq!(mapper.gamepads()[0].consecutive_failures, 0);
    }

    #[test]
    fn stop_all_zeroes_every_device() {
        let (mapper, actuator) = mapper_with(RecordingActuator::with_devices(&[1, 2]), HapticSettings::default());
        mapper.rediscover().unwrap();
        mapper.set_rumble(0.9, 0.9, 0.9, 0.9);

        mapper.stop_all();
        for id in [DeviceId(1), DeviceId(2)] {
            assert_eq!(mapper.levels(id), Some(ActuatorLevels::ZERO));
            assert_eq!(actuator.actuations(id).last(), Some(&ActuatorLevels::ZERO));
        }
    }

    #[test]
    fn concurrent_stop_is_never_overtaken() {
        let actuator = RecordingActuator {
            latency: Some(Duration::from_millis(2)),
            ..RecordingActuator::with_devices(&[1, 2])
        };
        let (mapper, actuator) = mapper_with(actuator, immediate_settings());
        mapper.rediscover().unwrap();
        let mapper = Arc::new(mapper);

        for _ in 0..50 {
            let barrier = Arc::new(Barrier::new(2));
            let worker = {
                let mapper = Arc::clone(&mapper);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    mapper.process_features(&loud());
                })
            };
            barrier.wait();
            mapper.stop_all();
            worker.join().unwrap();

            // Whatever order the two ran in, each device holds what was recorded last.
            for id in [DeviceId(1), DeviceId(2)] {
                assert_eq!(actuator.actuations(id).last().copied(), mapper.levels(id));
            }
        }
    }

    #[test]
    fn shutdown_zeroes_before_release() {
        let (mapper, actuator) = mapper_with(RecordingActuator::with_devices(&[1, 2]), HapticSettings::default());
        mapper.rediscover().unwrap();
        mapper.set_rumble(0.6, 0.6, 0.0, 0.0);

        mapper.shutdown();
        assert_eq!(mapper.gamepad_count(), 0);

        let events = actuator.events.lock().clone();
        let tail = &events[events.len() - 4..];
        assert_eq!(
            tail,
            &[
                Event::Actuate(DeviceId(1), ActuationFamily::Rumble, ActuatorLevels::ZERO),
                Event::Actuate(DeviceId(2), ActuationFamily::Rumble, ActuatorLevels::ZERO),
                Event::Release(DeviceId(1)),
                Event::Release(DeviceId(2)),
            ]
        );

        // Nothing left to drive; a second shutdown is a no-op.
        mapper.set_rumble(1.0, 1.0, 1.0, 1.0);
        mapper.shutdown();
        assert_eq!(actuator.events.lock().len(), events.len());
    }

    #[test]
    fn periodic_rescan_respects_interval() {
        let (mapper, actuator) = mapper_with(RecordingActuator::with_devices(&[1]), HapticSettings::default());
        let t0 = Instant::now();

        assert!(mapper.update_devices(t0));
        assert!(!mapper.update_devices(t0 + Duration::from_secs(1)));
        assert!(mapper.update_devices(t0 + Duration::from_secs(6)));
        assert_eq!(*actuator.enumerations.lock(), 2);
    }

    #[test]
    fn settings_are_sanitized_and_read_back() {
        let (mapper, _) = mapper_with(RecordingActuator::default(), HapticSettings::default());
        mapper.set_settings(HapticSettings {
            bass_intensity: 9.0,
            ..HapticSettings::default()
        });
        assert_eq!(mapper.settings().bass_intensity, HapticSettings::MAX_INTENSITY);
        assert_eq!(mapper.device_status(), "No gamepads connected");
    }
}
