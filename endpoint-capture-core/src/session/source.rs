//! Capture session lifecycle.
//!
//! One [`CaptureSource`] per logical audio source. Construction wires the
//! platform collaborators, registers for default-endpoint notifications and
//! kicks off the first initialization attempt in the background; from then
//! on the session moves between initializing, capturing and reconnecting on
//! its own, driven entirely by signals. Initialization failures are never
//! surfaced to the caller; the session keeps retrying at the reconnect
//! interval until the endpoint (or target process) appears.
//!
//! Two execution strategies drive the same transitions:
//!
//! - a dedicated worker thread multiplexing on the signal hub (inactive set
//!   `{exit, stop, start}`, active set `{exit, stop, data-ready, restart}`),
//! - a chain of self-requeuing items on a shared work queue, where finishing
//!   one item arms the next against the data-ready/restart signals.
//!
//! The strategy is chosen once at construction (a queue in
//! [`SessionOptions::work_queue`] selects the second) and is not observable
//! from the outside: frame delivery, reconnect timing and shutdown ordering
//! are identical.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;

use crate::models::error::CaptureError;
use crate::models::frame::FrameSink;
use crate::models::settings::{
    MatchDescriptor, MatchPriority, SourceSettings, SourceType, NO_DEVICE_ID,
};
use crate::session::default_device::DefaultDeviceTracker;
use crate::session::dispatcher::{self, ActiveCapture};
use crate::session::endpoint::resolve_endpoint;
use crate::session::registry::{ProcessRegistry, RegistryHandle};
use crate::sync::clock::{Clock, MonotonicClock};
use crate::sync::signal::{SessionSignal, SignalHub};
use crate::traits::backend::AudioBackend;
use crate::traits::enumerator::{EndpointEnumerator, NotificationRegistration};
use crate::traits::locator::{ProcessLocator, ProcessTarget};
use crate::traits::work_queue::WorkQueue;

/// Backoff before retrying after a hard failure. Voluntary restarts retry
/// immediately.
pub const RECONNECT_INTERVAL: Duration = Duration::from_secs(3);

/// Fallback poll while capturing from a loopback interface. Event wake-up
/// is unreliable for some loopback devices, so the active wait never sleeps
/// longer than this.
pub const DEFAULT_CAPTURE_POLL: Duration = Duration::from_millis(10);

pub(crate) const PROCESS_LOOPBACK_NAME: &str = "[process loopback]";

/// Platform collaborators a session consumes.
pub struct SessionIo {
    pub enumerator: Arc<dyn EndpointEnumerator>,
    pub backend: Box<dyn AudioBackend>,
    pub locator: Arc<dyn ProcessLocator>,
    pub sink: Arc<dyn FrameSink>,
}

/// Session tuning. The defaults match production behavior; tests shrink the
/// intervals.
pub struct SessionOptions {
    pub reconnect_interval: Duration,
    /// Fallback poll while capturing. `None` selects the default policy:
    /// [`DEFAULT_CAPTURE_POLL`] for loopback sources, pure event waits for
    /// inputs.
    pub capture_poll: Option<Duration>,
    /// Handing a queue here selects the queued execution strategy.
    pub work_queue: Option<Arc<dyn WorkQueue>>,
    pub clock: Arc<dyn Clock>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            reconnect_interval: RECONNECT_INTERVAL,
            capture_poll: None,
            work_queue: None,
            clock: Arc::new(MonotonicClock),
        }
    }
}

struct ConfigState {
    device_id: String,
    descriptor: MatchDescriptor,
    priority: MatchPriority,
}

struct RuntimeState {
    device_name: String,
    active: Option<ActiveCapture>,
}

struct UpdateParams {
    device_id: String,
    use_device_timing: bool,
    is_default: bool,
    priority: MatchPriority,
    descriptor: MatchDescriptor,
}

fn build_update_params(source_type: SourceType, settings: &SourceSettings) -> UpdateParams {
    UpdateParams {
        device_id: settings.device_id.clone(),
        use_device_timing: settings.use_device_timing,
        is_default: settings.is_default_device(),
        priority: settings.priority,
        descriptor: if source_type == SourceType::ProcessOutput {
            MatchDescriptor::parse(&settings.window)
        } else {
            MatchDescriptor::None
        },
    }
}

pub(crate) struct SessionShared {
    source_type: SourceType,
    signals: Arc<SignalHub>,
    config: Mutex<ConfigState>,
    use_device_timing: AtomicBool,
    is_default: AtomicBool,
    runtime: Mutex<RuntimeState>,
    backend: Mutex<Box<dyn AudioBackend>>,
    enumerator: Arc<dyn EndpointEnumerator>,
    locator: Arc<dyn ProcessLocator>,
    sink: Arc<dyn FrameSink>,
    clock: Arc<dyn Clock>,
    registry: RegistryHandle,
    queue: Option<Arc<dyn WorkQueue>>,
    reconnect_interval: Duration,
    capture_poll: Option<Duration>,
    reconnect_delay_ms: AtomicU64,
}

impl SessionShared {
    pub(crate) fn source_type(&self) -> SourceType {
        self.source_type
    }

    pub(crate) fn is_default_device(&self) -> bool {
        self.is_default.load(Ordering::Acquire)
    }

    pub(crate) fn request_restart(&self) {
        self.signals.set(SessionSignal::Restart);
    }

    pub(crate) fn identity(&self) -> String {
        let name = self.runtime.lock().device_name.clone();
        if name.is_empty() {
            self.config.lock().device_id.clone()
        } else {
            name
        }
    }

    fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms.load(Ordering::Acquire))
    }

    fn set_reconnect_delay(&self, delay: Duration) {
        self.reconnect_delay_ms
            .store(delay.as_millis() as u64, Ordering::Release);
    }

    fn apply_settings(&self, params: UpdateParams) {
        {
            let mut config = self.config.lock();
            config.device_id = params.device_id;
            config.priority = params.priority;
            config.descriptor = params.descriptor;
        }
        self.use_device_timing
            .store(params.use_device_timing, Ordering::Release);
        self.is_default.store(params.is_default, Ordering::Release);

        let config = self.config.lock();
        if self.source_type == SourceType::ProcessOutput {
            log::info!(
                "settings: target={} priority={:?}",
                config.descriptor.encode(),
                config.priority
            );
        } else {
            log::info!(
                "settings: device id={} use device timing={}",
                config.device_id,
                self.use_device_timing.load(Ordering::Acquire)
            );
        }
    }

    /// Kick off an initialization attempt on the active execution strategy.
    fn start(self: &Arc<Self>) {
        match &self.queue {
            Some(queue) => {
                let shared = Arc::clone(self);
                queue.put(Box::new(move || shared.on_start_capture()));
            }
            None => self.signals.set(SessionSignal::Start),
        }
    }

    fn try_initialize(self: &Arc<Self>) -> bool {
        match self.initialize() {
            Ok(()) => true,
            Err(err) => {
                log::warn!("'{}' initialization failed: {err}", self.identity());
                false
            }
        }
    }

    fn initialize(self: &Arc<Self>) -> Result<(), CaptureError> {
        let (device_id, descriptor, priority) = {
            let config = self.config.lock();
            (
                config.device_id.clone(),
                config.descriptor.clone(),
                config.priority,
            )
        };
        let is_default = self.is_default.load(Ordering::Acquire);

        // A dead client may have left a stale data-ready set behind.
        self.signals.reset(SessionSignal::DataReady);
        let data_ready = self.signals.setter(SessionSignal::DataReady);

        let (open, target) = if self.source_type == SourceType::ProcessOutput {
            self.runtime.lock().device_name = PROCESS_LOOPBACK_NAME.into();
            let target = self.resolve_target(&descriptor, priority)?;
            let open = self
                .backend
                .lock()
                .open_process_client(target.process_id, &data_ready)?;
            (open, Some(target))
        } else {
            let known_name = self.runtime.lock().device_name.clone();
            let info = resolve_endpoint(
                &*self.enumerator,
                is_default,
                self.source_type,
                &device_id,
                &known_name,
            )?;
            if !is_default && info.id != device_id {
                self.config.lock().device_id = info.id.clone();
            }
            self.runtime.lock().device_name = info.name.clone();
            let open = self.backend.lock().open_device_client(
                &info.id,
                self.source_type.is_loopback(),
                &data_ready,
            )?;
            (open, None)
        };

        let sample_rate = open.format.sample_rate;
        self.runtime.lock().active = Some(ActiveCapture::new(open, target));

        if self.queue.is_some() {
            self.arm_sample_waiter();
            self.arm_restart_waiter();
        }

        log::info!("'{}' [{} Hz] initialized", self.identity(), sample_rate);
        Ok(())
    }

    fn resolve_target(
        &self,
        descriptor: &MatchDescriptor,
        priority: MatchPriority,
    ) -> Result<ProcessTarget, CaptureError> {
        match descriptor {
            MatchDescriptor::Session(token) => {
                let pid = self.registry.resolve(token).ok_or_else(|| {
                    CaptureError::ActivationFailed(format!(
                        "session token {token} does not resolve to a process"
                    ))
                })?;
                Ok(ProcessTarget::from_session(pid, token.clone()))
            }
            MatchDescriptor::Window(spec) => self.locator.locate(spec, priority),
            MatchDescriptor::None => {
                Err(CaptureError::DeviceNotFound("no capture target configured".into()))
            }
        }
    }

    fn teardown_client(&self) {
        self.runtime.lock().active = None;
    }

    /// Drain the capture interface. Returns false when the session should
    /// reconnect.
    fn process_capture(&self) -> bool {
        let use_device_timing = self.use_device_timing.load(Ordering::Acquire);
        let mut runtime = self.runtime.lock();
        let Some(active) = runtime.active.as_mut() else {
            return true;
        };
        dispatcher::drain(
            active,
            self.source_type,
            use_device_timing,
            &*self.locator,
            &*self.clock,
            &*self.sink,
        )
        .is_ok()
    }

    // --- queued execution strategy ---

    fn arm_sample_waiter(self: &Arc<Self>) {
        let Some(queue) = self.queue.clone() else {
            return;
        };
        let shared = Arc::clone(self);
        self.signals.on_set_once(
            SessionSignal::DataReady,
            Box::new(move || {
                let inner = Arc::clone(&shared);
                queue.put(Box::new(move || inner.on_sample_ready()));
            }),
        );
    }

    fn arm_restart_waiter(self: &Arc<Self>) {
        let Some(queue) = self.queue.clone() else {
            return;
        };
        let shared = Arc::clone(self);
        self.signals.on_set_once(
            SessionSignal::Restart,
            Box::new(move || {
                let inner = Arc::clone(&shared);
                queue.put(Box::new(move || inner.on_restart()));
            }),
        );
    }

    fn on_start_capture(self: &Arc<Self>) {
        if self.signals.is_set(SessionSignal::Stop) {
            self.signals.set(SessionSignal::Idle);
            return;
        }
        if !self.try_initialize() {
            log::info!("'{}' failed to start", self.identity());
            self.set_reconnect_delay(self.reconnect_interval);
            self.signals.set(SessionSignal::Reconnect);
            return;
        }
        // A stop that raced the initialization would otherwise wait on a
        // client that never delivers.
        if self.signals.is_set(SessionSignal::Stop) {
            self.teardown_client();
            self.signals.set(SessionSignal::Idle);
        }
    }

    fn on_sample_ready(self: &Arc<Self>) {
        let mut stop = false;
        let mut reconnect = false;

        if !self.process_capture() {
            stop = true;
            reconnect = true;
            self.set_reconnect_delay(self.reconnect_interval);
        }

        if self.signals.is_set(SessionSignal::Restart) {
            stop = true;
            reconnect = true;
            self.set_reconnect_delay(Duration::ZERO);
            self.signals.reset(SessionSignal::Restart);
            self.arm_restart_waiter();
        }

        if self.signals.is_set(SessionSignal::Stop) {
            stop = true;
            reconnect = false;
        }

        if !stop {
            self.arm_sample_waiter();
            return;
        }

        self.teardown_client();
        if reconnect {
            log::info!("'{}' invalidated, retrying", self.identity());
            self.signals.set(SessionSignal::Reconnect);
        } else {
            self.signals.set(SessionSignal::Idle);
        }
    }

    fn on_restart(&self) {
        // Wake the sample waiter; it observes the restart signal itself.
        self.signals.set(SessionSignal::DataReady);
    }
}

/// Worker-thread execution strategy.
fn capture_worker(shared: Arc<SessionShared>) {
    const INACTIVE: &[SessionSignal] = &[
        SessionSignal::Exit,
        SessionSignal::Stop,
        SessionSignal::Start,
    ];
    const ACTIVE: &[SessionSignal] = &[
        SessionSignal::Exit,
        SessionSignal::Stop,
        SessionSignal::DataReady,
        SessionSignal::Restart,
    ];

    let mut capturing = false;
    let mut exit = false;
    while !exit {
        let mut idle = false;
        let mut stop = false;
        let mut reconnect = false;
        while !stop {
            let (set, timeout) = if capturing {
                (ACTIVE, shared.capture_poll)
            } else {
                (INACTIVE, None)
            };
            match shared.signals.wait_any(set, timeout) {
                Some(SessionSignal::Exit) => {
                    exit = true;
                    stop = true;
                    idle = true;
                }
                Some(SessionSignal::Stop) => {
                    stop = true;
                    idle = true;
                }
                Some(SessionSignal::Start) => {
                    if shared.try_initialize() {
                        capturing = true;
                    } else {
                        log::info!("'{}' failed to start", shared.identity());
                        stop = true;
                        reconnect = true;
                        shared.set_reconnect_delay(shared.reconnect_interval);
                    }
                }
                Some(SessionSignal::DataReady) | None => {
                    if capturing && !shared.process_capture() {
                        stop = true;
                        reconnect = true;
                        shared.set_reconnect_delay(shared.reconnect_interval);
                    }
                }
                Some(SessionSignal::Restart) => {
                    stop = true;
                    reconnect = true;
                    shared.set_reconnect_delay(Duration::ZERO);
                    shared.signals.reset(SessionSignal::Restart);
                }
                _ => {}
            }
        }

        capturing = false;
        shared.teardown_client();

        if idle {
            shared.signals.set(SessionSignal::Idle);
        } else if reconnect {
            log::info!("'{}' invalidated, retrying", shared.identity());
            shared.signals.set(SessionSignal::Reconnect);
        }
    }
}

/// Reconnect watcher: waits out the backoff (interruptible by stop) and
/// re-triggers initialization.
fn reconnect_watcher(shared: Arc<SessionShared>) {
    loop {
        match shared
            .signals
            .wait_any(&[SessionSignal::Exit, SessionSignal::Reconnect], None)
        {
            Some(SessionSignal::Reconnect) => {
                let delay = shared.reconnect_delay();
                if !delay.is_zero() {
                    let _ = shared.signals.wait(SessionSignal::Stop, Some(delay));
                }
                shared.start();
            }
            _ => break,
        }
    }
}

/// One capture session. Dropping it (or calling [`stop`](Self::stop)) tears
/// everything down, blocking until the background activity has quiesced.
pub struct CaptureSource {
    shared: Option<Arc<SessionShared>>,
    registration: Option<Box<dyn NotificationRegistration>>,
    worker: Option<thread::JoinHandle<()>>,
    watcher: Option<thread::JoinHandle<()>>,
    stopped: bool,
}

impl CaptureSource {
    /// Construct a session and start capturing in the background.
    ///
    /// Only resource creation (threads, notification registration) can fail
    /// here. The endpoint being unavailable is not an error: the session
    /// reports success and keeps retrying until it appears.
    pub fn new(
        source_type: SourceType,
        settings: &SourceSettings,
        io: SessionIo,
        options: SessionOptions,
    ) -> Result<Self, CaptureError> {
        let params = build_update_params(source_type, settings);
        if params.device_id == NO_DEVICE_ID {
            log::info!("reserved device id '{NO_DEVICE_ID}', session stays idle");
            return Ok(Self {
                shared: None,
                registration: None,
                worker: None,
                watcher: None,
                stopped: false,
            });
        }

        let capture_poll = options.capture_poll.or(if source_type.is_loopback() {
            Some(DEFAULT_CAPTURE_POLL)
        } else {
            None
        });

        let shared = Arc::new(SessionShared {
            source_type,
            signals: Arc::new(SignalHub::new()),
            config: Mutex::new(ConfigState {
                device_id: String::new(),
                descriptor: MatchDescriptor::None,
                priority: MatchPriority::Executable,
            }),
            use_device_timing: AtomicBool::new(false),
            is_default: AtomicBool::new(false),
            runtime: Mutex::new(RuntimeState {
                device_name: String::new(),
                active: None,
            }),
            backend: Mutex::new(io.backend),
            enumerator: io.enumerator,
            locator: io.locator,
            sink: io.sink,
            clock: options.clock,
            registry: ProcessRegistry::acquire(),
            queue: options.work_queue,
            reconnect_interval: options.reconnect_interval,
            capture_poll,
            reconnect_delay_ms: AtomicU64::new(0),
        });
        shared.apply_settings(params);

        let watcher = thread::Builder::new()
            .name("endpoint-capture: reconnect".into())
            .spawn({
                let shared = Arc::clone(&shared);
                move || reconnect_watcher(shared)
            })
            .map_err(|e| {
                CaptureError::ResourceCreationFailed(format!(
                    "failed to spawn reconnect watcher: {e}"
                ))
            })?;

        let tracker = Arc::new(DefaultDeviceTracker::new(Arc::clone(&shared)));
        let mut registration = match shared.enumerator.register_notifications(tracker) {
            Ok(registration) => registration,
            Err(err) => {
                shared.signals.set(SessionSignal::Exit);
                let _ = watcher.join();
                return Err(err);
            }
        };

        let worker = if shared.queue.is_none() {
            let spawned = thread::Builder::new()
                .name("endpoint-capture: capture".into())
                .spawn({
                    let shared = Arc::clone(&shared);
                    move || capture_worker(shared)
                });
            match spawned {
                Ok(handle) => Some(handle),
                Err(e) => {
                    registration.unregister();
                    shared.signals.set(SessionSignal::Exit);
                    let _ = watcher.join();
                    return Err(CaptureError::ResourceCreationFailed(format!(
                        "failed to spawn capture worker: {e}"
                    )));
                }
            }
        } else {
            None
        };

        shared.start();

        Ok(Self {
            shared: Some(shared),
            registration: Some(registration),
            worker,
            watcher: Some(watcher),
            stopped: false,
        })
    }

    /// Whether this session was constructed against the reserved
    /// "no such device" id and will never capture.
    pub fn is_inert(&self) -> bool {
        self.shared.is_none()
    }

    /// Resolved display name of the bound endpoint, empty until the first
    /// successful initialization.
    pub fn device_name(&self) -> String {
        self.shared
            .as_ref()
            .map(|s| s.runtime.lock().device_name.clone())
            .unwrap_or_default()
    }

    /// Apply a settings update. Never fails and never interrupts capture
    /// unless a restart-gating value actually changed, in which case the
    /// session restarts exactly once (with zero backoff).
    pub fn update(&self, settings: &SourceSettings) {
        let Some(shared) = &self.shared else {
            return;
        };
        let params = build_update_params(shared.source_type, settings);
        let restart = {
            let config = shared.config.lock();
            if shared.source_type == SourceType::ProcessOutput {
                config.priority != params.priority || config.descriptor != params.descriptor
            } else {
                config.device_id != params.device_id
            }
        };
        shared.apply_settings(params);
        if restart {
            shared.request_restart();
        }
    }

    /// Stop the session and block until all background activity has
    /// quiesced. Idempotent; also runs on drop.
    pub fn stop(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;

        // Unregister first so no late notification races the teardown.
        if let Some(mut registration) = self.registration.take() {
            registration.unregister();
        }

        let Some(shared) = self.shared.clone() else {
            return;
        };
        log::info!("'{}' stop requested", shared.identity());

        shared.signals.set(SessionSignal::Stop);
        if shared.queue.is_some() {
            // Wake a waiting sample item so the chain can observe the stop.
            shared.signals.set(SessionSignal::DataReady);
        }
        shared.signals.wait(SessionSignal::Idle, None);
        shared.signals.set(SessionSignal::Exit);

        if let Some(watcher) = self.watcher.take() {
            let _ = watcher.join();
        }
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
        shared.signals.clear_hooks();

        log::info!("'{}' terminated", shared.identity());
    }
}

impl Drop for CaptureSource {
    fn drop(&mut self) {
        self.stop();
    }
}
