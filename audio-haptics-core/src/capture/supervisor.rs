use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;

use crate::models::audio_models::{AudioBlock, BackendKind, CaptureDiagnostics, StreamFormat};
use crate::models::config::CaptureMode;
use crate::models::error::CaptureError;
use crate::models::state::CaptureState;
use crate::processing::sample_convert::SampleNormalizer;
use crate::traits::capture_backend::{AudioBlockCallback, CaptureBackend};

type SharedBackend = Arc<Mutex<Box<dyn CaptureBackend>>>;

/// State shared between the control thread and the capture thread.
struct SupervisorState {
    state: CaptureState,
    diagnostics: CaptureDiagnostics,
}

impl SupervisorState {
    fn new() -> Self {
        Self {
            state: CaptureState::Idle,
            diagnostics: CaptureDiagnostics::default(),
        }
    }
}

/// Everything the capture thread needs, moved into it on start.
struct CaptureLoop {
    backend: SharedBackend,
    callback: Option<AudioBlockCallback>,
    format: StreamFormat,
    poll_timeout: Duration,
    running: Arc<AtomicBool>,
    shared: Arc<Mutex<SupervisorState>>,
}

/// Selects a capture backend, owns the capture thread and normalizes samples.
///
/// Backends are registered up front. Under `CaptureMode::Auto` they are tried
/// in `BackendKind` priority order (registration order breaks ties) until one
/// opens and starts; every failed candidate is stopped and closed before the
/// next one is tried.
///
/// ```text
/// [registry] --initialize--> [active backend] --start_capture--> "audio-capture" thread
///                                                                  poll → normalize → callback
/// ```
pub struct CaptureSupervisor {
    registry: Vec<Box<dyn CaptureBackend>>,
    active: Option<SharedBackend>,
    active_kind: Option<BackendKind>,
    active_name: Option<String>,
    format: Option<StreamFormat>,
    callback: Option<AudioBlockCallback>,
    poll_timeout: Duration,

    shared: Arc<Mutex<SupervisorState>>,

    // Capture thread control
    running: Arc<AtomicBool>,
    capturing: Arc<AtomicBool>,
    capture_handle: Option<thread::JoinHandle<()>>,
}

impl CaptureSupervisor {
    /// Upper bound on one poll; also bounds how long `stop_capture` waits.
    pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_millis(50);

    pub fn new(backends: Vec<Box<dyn CaptureBackend>>) -> Self {
        Self {
            registry: backends,
            active: None,
            active_kind: None,
            active_name: None,
            format: None,
            callback: None,
            poll_timeout: Self::DEFAULT_POLL_TIMEOUT,
            shared: Arc::new(Mutex::new(SupervisorState::new())),
            running: Arc::new(AtomicBool::new(false)),
            capturing: Arc::new(AtomicBool::new(false)),
            capture_handle: None,
        }
    }

    pub fn with_poll_timeout(mut self, timeout: Duration) -> Self {
        self.poll_timeout = timeout;
        self
    }

    /// Add a backend. Takes effect on the next `initialize`.
    pub fn register(&mut self, backend: Box<dyn CaptureBackend>) {
        self.registry.push(backend);
    }

    /// Kinds available for selection, in registration order. Excludes the
    /// active backend.
    pub fn registered_backends(&self) -> Vec<BackendKind> {
        self.registry.iter().map(|b| b.kind()).collect()
    }

    /// Install the host callback. Picked up by the next `start_capture`.
    pub fn set_callback(&mut self, callback: AudioBlockCallback) {
        self.callback = Some(callback);
    }

    pub fn clear_callback(&mut self) {
        self.callback = None;
    }

    /// Select, open and start a backend.
    ///
    /// Releases any previously active backend first. On success the
    /// supervisor is `Ready` and the negotiated format is returned.
    pub fn initialize(&mut self, mode: CaptureMode) -> Result<StreamFormat, CaptureError> {
        if self.is_capturing() {
            return Err(CaptureError::InvalidState("cannot initialize while capturing".into()));
        }
        self.shutdown();

        let candidates = self.candidates(mode)?;
        let mut failed = Vec::new();

        for index in candidates {
            let backend = &mut self.registry[index];
            let kind = backend.kind();
            log::debug!("Trying capture backend: {}", backend.name());

            match Self::activate(backend.as_mut()) {
                Ok(format) => {
                    let backend = self.registry.remove(index);
                    log::info!("Capture backend selected: {} ({})", backend.name(), format);

                    self.active_name = Some(backend.name().to_string());
                    self.active_kind = Some(kind);
                    self.active = Some(Arc::new(Mutex::new(backend)));
                    self.format = Some(format);

                    let mut s = self.shared.lock();
                    s.state = CaptureState::Ready(kind);
                    s.diagnostics = CaptureDiagnostics {
                        backend: Some(kind),
                        format: Some(format),
                        failed_candidates: failed,
                        ..CaptureDiagnostics::default()
                    };
                    return Ok(format);
                }
                Err(e) => {
                    log::warn!("Capture backend {} failed: {}", kind, e);
                    if let CaptureMode::Forced(_) = mode {
                        return Err(e);
                    }
                    failed.push(kind);
                }
            }
        }

        log::error!("All capture backends failed: {:?}", failed);
        self.shared.lock().diagnostics.failed_candidates = failed;
        Err(CaptureError::AllBackendsFailed)
    }

    /// Registry indices to try, in order.
    fn candidates(&self, mode: CaptureMode) -> Result<Vec<usize>, CaptureError> {
        match mode {
            CaptureMode::Auto => {
                let mut order: Vec<usize> = (0..self.registry.len()).collect();
                order.sort_by_key(|&i| self.registry[i].kind().priority());
                Ok(order)
            }
            CaptureMode::Forced(kind) => self
                .registry
                .iter()
                .position(|b| b.kind() == kind)
                .map(|i| vec![i])
                .ok_or(CaptureError::BackendUnavailable(kind)),
        }
    }

    /// Open then start. Any failure leaves the backend fully torn down.
    fn activate(backend: &mut dyn CaptureBackend) -> Result<StreamFormat, CaptureError> {
        let format = match backend.open() {
            Ok(format) => format,
            Err(e) => {
                backend.close();
                return Err(e);
            }
        };
        if let Err(reason) = format.validate() {
            backend.close();
            return Err(CaptureError::ConfigurationFailed(reason));
        }
        if let Err(e) = backend.start() {
            backend.stop();
            backend.close();
            return Err(e);
        }
        Ok(format)
    }

    /// Spawn the capture thread. Transitions: ready/stopped → capturing.
    pub fn start_capture(&mut self) -> Result<(), CaptureError> {
        let (backend, kind, format) = match (&self.active, self.active_kind, self.format) {
            (Some(backend), Some(kind), Some(format)) => (Arc::clone(backend), kind, format),
            _ => return Err(CaptureError::InvalidState("no active capture backend".into())),
        };

        let state = self.state();
        match state {
            CaptureState::Ready(_) => {}
            CaptureState::Stopped(_) => {
                self.join_capture_thread();
                backend.lock().start()?;
            }
            CaptureState::Capturing(_) if self.is_capturing() => {
                return Err(CaptureError::InvalidState("already capturing".into()));
            }
            other => {
                return Err(CaptureError::InvalidState(format!("cannot start from {:?}", other)));
            }
        }

        let ctx = CaptureLoop {
            backend,
            callback: self.callback.clone(),
            format,
            poll_timeout: self.poll_timeout,
            running: Arc::clone(&self.running),
            shared: Arc::clone(&self.shared),
        };
        let capturing = Arc::clone(&self.capturing);

        self.running.store(true, Ordering::SeqCst);
        self.capturing.store(true, Ordering::SeqCst);
        self.shared.lock().state = CaptureState::Capturing(kind);

        let spawned = thread::Builder::new()
            .name("audio-capture".into())
            .spawn(move || {
                let result = ctx.run();
                ctx.running.store(false, Ordering::SeqCst);
                capturing.store(false, Ordering::SeqCst);
                if let Err(e) = result {
                    log::error!("Capture loop terminated: {}", e);
                    ctx.shared.lock().state = CaptureState::Failed(e);
                }
            });

        match spawned {
            Ok(handle) => {
                self.capture_handle = Some(handle);
                Ok(())
            }
            Err(e) => {
                self.running.store(false, Ordering::SeqCst);
                self.capturing.store(false, Ordering::SeqCst);
                self.shared.lock().state = CaptureState::Ready(kind);
                Err(CaptureError::ThreadSpawnFailed(e.to_string()))
            }
        }
    }

    /// Signal the capture thread, join it, then halt the device stream.
    ///
    /// Safe to call at any time. A session that already ended on an error
    /// keeps its `Failed` state.
    pub fn stop_capture(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        self.join_capture_thread();

        let Some(backend) = &self.active else {
            return;
        };
        backend.lock().stop();

        let mut s = self.shared.lock();
        if let CaptureState::Capturing(kind) | CaptureState::Ready(kind) = s.state {
            s.state = CaptureState::Stopped(kind);
        }
    }

    fn join_capture_thread(&mut self) {
        if let Some(handle) = self.capture_handle.take() {
            if handle.join().is_err() {
                log::error!("Capture thread panicked");
            }
        }
        self.capturing.store(false, Ordering::SeqCst);
    }

    /// Stop capture, close the active backend and return it to the registry.
    pub fn shutdown(&mut self) {
        self.stop_capture();

        if let Some(active) = self.active.take() {
            active.lock().close();
            match Arc::try_unwrap(active) {
                Ok(backend) => self.registry.push(backend.into_inner()),
                Err(_) => log::warn!("Capture backend still referenced at shutdown; dropping it"),
            }
            log::info!("Capture backend released");
        }

        self.active_kind = None;
        self.active_name = None;
        self.format = None;
        self.shared.lock().state = CaptureState::Idle;
    }

    /// True while the capture thread is running its loop.
    pub fn is_capturing(&self) -> bool {
        self.capturing.load(Ordering::SeqCst)
    }

    pub fn state(&self) -> CaptureState {
        self.shared.lock().state.clone()
    }

    pub fn active_backend(&self) -> Option<BackendKind> {
        self.active_kind
    }

    pub fn backend_name(&self) -> Option<&str> {
        self.active_name.as_deref()
    }

    pub fn format(&self) -> Option<StreamFormat> {
        self.format
    }

    pub fn diagnostics(&self) -> CaptureDiagnostics {
        self.shared.lock().diagnostics.clone()
    }
}

impl Drop for CaptureSupervisor {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl CaptureLoop {
    /// Poll until `running` clears or the backend reports an error.
    ///
    /// The backend stays locked for the whole session.
    fn run(&self) -> Result<(), CaptureError> {
        let mut backend = self.backend.lock();
        let normalizer = SampleNormalizer::for_format(self.format.sample_format);
        let channels = self.format.channels;
        let mut samples: Vec<f32> = Vec::new();

        while self.running.load(Ordering::SeqCst) {
            let silent = match backend.poll_next_block(self.poll_timeout)? {
                None => {
                    self.shared.lock().diagnostics.empty_polls += 1;
                    continue;
                }
                Some(raw) if raw.silent => {
                    samples.clear();
                    samples.resize(raw.frames * channels as usize, 0.0);
                    true
                }
                Some(raw) => {
                    normalizer.normalize_into(raw.data, &mut samples);
                    false
                }
            };

            if let Some(ref callback) = self.callback {
                callback(&AudioBlock {
                    samples: &samples,
                    channels,
                    sample_rate: self.format.sample_rate,
                });
            }

            let mut s = self.shared.lock();
            s.diagnostics.blocks_delivered += 1;
            s.diagnostics.samples_delivered += samples.len() as u64;
            if silent {
                s.diagnostics.silent_blocks += 1;
            }
        }
        Ok(())
    }
}
