//! End-to-end wiring: capture → feature extraction → haptic mapping.

use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;

use crate::capture::supervisor::CaptureSupervisor;
use crate::haptics::mapper::HapticMapper;
use crate::models::audio_models::{AudioBlock, AudioFeatures, StreamFormat};
use crate::models::config::{CaptureMode, DiscoveryConfig, ExtractorConfig, HapticSettings};
use crate::models::error::CaptureError;
use crate::processing::feature_extractor::FeatureExtractor;
use crate::traits::actuator::ActuatorBackend;
use crate::traits::capture_backend::CaptureBackend;

/// Owns one capture supervisor, one feature extractor and one haptic mapper.
///
/// Extraction and mapping run synchronously inside the capture callback.
/// The host drives the control side: `tick` for periodic device rescans,
/// `latest_features` for display, settings changes at any time.
pub struct HapticPipeline {
    capture: CaptureSupervisor,
    extractor: Arc<Mutex<FeatureExtractor>>,
    mapper: Arc<HapticMapper>,
    latest: Arc<Mutex<AudioFeatures>>,
}

impl HapticPipeline {
    pub fn new(
        backends: Vec<Box<dyn CaptureBackend>>,
        actuator: Arc<dyn ActuatorBackend>,
        settings: HapticSettings,
        extractor: ExtractorConfig,
    ) -> Self {
        Self::with_discovery(backends, actuator, settings, extractor, DiscoveryConfig::default())
    }

    pub fn with_discovery(
        backends: Vec<Box<dyn CaptureBackend>>,
        actuator: Arc<dyn ActuatorBackend>,
        settings: HapticSettings,
        extractor: ExtractorConfig,
        discovery: DiscoveryConfig,
    ) -> Self {
        Self {
            capture: CaptureSupervisor::new(backends),
            extractor: Arc::new(Mutex::new(FeatureExtractor::new(extractor))),
            mapper: Arc::new(HapticMapper::with_config(actuator, settings, discovery)),
            latest: Arc::new(Mutex::new(AudioFeatures::SILENT)),
        }
    }

    /// Select a capture backend, match the extractor to its sample rate,
    /// install the processing callback and scan for controllers.
    ///
    /// A controller scan failure is logged; capture can run without pads.
    pub fn initialize(&mut self, mode: CaptureMode) -> Result<StreamFormat, CaptureError> {
        let format = self.capture.initialize(mode)?;
        self.extractor.lock().set_sample_rate(format.sample_rate);

        let extractor = Arc::clone(&self.extractor);
        let mapper = Arc::clone(&self.mapper);
        let latest = Arc::clone(&self.latest);
        self.capture.set_callback(Arc::new(move |block: &AudioBlock<'_>| {
            let features = {
                let mut fx = extractor.lock();
                if fx.sample_rate() != block.sample_rate {
                    fx.set_sample_rate(block.sample_rate);
                }
                fx.process_block(block.samples, block.channels)
            };
            *latest.lock() = features;
            mapper.process_features(&features);
        }));

        match self.mapper.rediscover() {
            Ok(count) => log::info!("Haptics ready: {} gamepad(s), mode {:?}", count, self.mapper.active_mode()),
            Err(e) => log::warn!("Gamepad discovery failed: {}", e),
        }
        Ok(format)
    }

    pub fn start(&mut self) -> Result<(), CaptureError> {
        self.capture.start_capture()
    }

    /// Stop capture, then zero every actuator.
    pub fn stop(&mut self) {
        self.capture.stop_capture();
        self.mapper.stop_all();
        *self.latest.lock() = AudioFeatures::SILENT;
    }

    /// Periodic control-thread work. Returns whether a device rescan ran.
    pub fn tick(&self, now: Instant) -> bool {
        self.mapper.update_devices(now)
    }

    /// Copy of the most recent feature snapshot.
    pub fn latest_features(&self) -> AudioFeatures {
        *self.latest.lock()
    }

    pub fn set_sensitivity(&self, sensitivity: f32) {
        self.extractor.lock().set_sensitivity(sensitivity);
    }

    pub fn sensitivity(&self) -> f32 {
        self.extractor.lock().sensitivity()
    }

    pub fn set_frequency_bands(&self, bass_hz: f32, treble_hz: f32) {
        self.extractor.lock().set_frequency_bands(bass_hz, treble_hz);
    }

    pub fn set_haptic_settings(&self, settings: HapticSettings) {
        self.mapper.set_settings(settings);
    }

    pub fn haptic_settings(&self) -> HapticSettings {
        self.mapper.settings()
    }

    pub fn is_capturing(&self) -> bool {
        self.capture.is_capturing()
    }

    pub fn capture(&self) -> &CaptureSupervisor {
        &self.capture
    }

    pub fn mapper(&self) -> &Arc<HapticMapper> {
        &self.mapper
    }

    /// Stop capture and release the backend, then quiet and release every
    /// controller.
    pub fn shutdown(&mut self) {
        self.capture.shutdown();
        self.capture.clear_callback();
        self.mapper.shutdown();
        *self.latest.lock() = AudioFeatures::SILENT;
    }
}

impl Drop for HapticPipeline {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use std::thread;
    use std::time::Duration;

    use super::*;
    use crate::capture::synthetic::SyntheticBackend;
    use crate::models::audio_models::BackendKind;
    use crate::models::error::ActuatorError;
    use crate::models::gamepad::{ActuationFamily, ActuatorLevels, DeviceId};
    use crate::traits::actuator::{DeviceInfo, HapticInfo};

    /// Single rumble pad that remembers what it was sent.
    #[derive(Default)]
    struct SinglePad {
        sent: Mutex<Vec<ActuatorLevels>>,
        released: Mutex<bool>,
    }

    impl ActuatorBackend for SinglePad {
        fn enumerate(&self) -> Result<Vec<DeviceId>, ActuatorError> {
            Ok(vec![DeviceId(0)])
        }

        fn device_info(&self, _id: DeviceId) -> Result<DeviceInfo, ActuatorError> {
            Ok(DeviceInfo { name: "Test Pad".into() })
        }

        fn haptic_info(&self, _id: DeviceId) -> Result<HapticInfo, ActuatorError> {
            Err(ActuatorError::QueryFailed("rumble only".into()))
        }

        fn actuate(&self, _id: DeviceId, _family: ActuationFamily, levels: ActuatorLevels) -> Result<(), ActuatorError> {
            self.sent.lock().push(levels);
            Ok(())
        }

        fn release(&self, _id: DeviceId) {
            *self.released.lock() = true;
        }
    }

    fn pipeline(pad: &Arc<SinglePad>) -> HapticPipeline {
        let _ = env_logger::builder().is_test(true).try_init();
        let actuator: Arc<dyn ActuatorBackend> = pad.clone();
        HapticPipeline::new(
            vec![Box::new(SyntheticBackend::new())],
            actuator,
            HapticSettings::default(),
            ExtractorConfig::default(),
        )
    }

    fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        condition()
    }

    #[test]
    fn synthetic_tone_drives_the_pad() {
        let pad = Arc::new(SinglePad::default());
        let mut pipeline = pipeline(&pad);

        let format = pipeline.initialize(CaptureMode::Auto).unwrap();
        assert_eq!(format.sample_rate, 44100);
        assert_eq!(pipeline.capture().active_backend(), Some(BackendKind::Synthetic));
        assert_eq!(pipeline.mapper().gamepad_count(), 1);

        pipeline.start().unwrap();
        assert!(wait_until(Duration::from_secs(3), || {
            pipeline.latest_features().volume > 0.0 && pad.sent.lock().iter().any(|l| !l.is_zero())
        }));
        assert!(pipeline.latest_features().is_bounded());

        pipeline.stop();
        assert!(!pipeline.is_capturing());
        assert_eq!(pad.sent.lock().last(), Some(&ActuatorLevels::ZERO));
        assert_eq!(pipeline.latest_features(), AudioFeatures::SILENT);

        pipeline.shutdown();
        assert!(*pad.released.lock());
        assert_eq!(pipeline.mapper().gamepad_count(), 0);
    }

    #[test]
    fn control_side_settings_pass_through() {
        let pad = Arc::new(SinglePad::default());
        let pipeline = pipeline(&pad);

        pipeline.set_sensitivity(10.0);
        assert_eq!(pipeline.sensitivity(), 6.0);

        let settings = HapticSettings::burst_emulation();
        pipeline.set_haptic_settings(settings);
        assert_eq!(pipeline.haptic_settings(), settings);

        // First tick always scans.
        assert!(pipeline.tick(Instant::now()));
        assert_eq!(pipeline.mapper().gamepad_count(), 1);
    }
}
