//! Scripted doubles for the platform seams, shared by the unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::models::error::CaptureError;
use crate::models::format::{SampleFormat, SpeakerLayout, StreamFormat};
use crate::models::frame::{CaptureFrame, FrameSink};
use crate::models::settings::{MatchPriority, WindowSpec};
use crate::sync::clock::Clock;
use crate::sync::signal::SignalSetter;
use crate::traits::backend::{AudioBackend, CaptureClient, OpenClient, Packet};
use crate::traits::enumerator::{
    EndpointDirection, EndpointEnumerator, EndpointInfo, EndpointNotificationSink, EndpointRole,
    NotificationRegistration,
};
use crate::traits::locator::{ProcessLocator, ProcessTarget};

pub(crate) fn wait_for(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    cond()
}

// --- enumerator ---

struct EnumInner {
    defaults: Mutex<HashMap<(EndpointDirection, EndpointRole), EndpointInfo>>,
    listing: Mutex<Vec<(EndpointDirection, EndpointInfo)>>,
    sink: Mutex<Option<Arc<dyn EndpointNotificationSink>>>,
    default_queries: AtomicUsize,
    unregistered: AtomicUsize,
}

#[derive(Clone)]
pub(crate) struct MockEnumerator {
    inner: Arc<EnumInner>,
}

impl MockEnumerator {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(EnumInner {
                defaults: Mutex::new(HashMap::new()),
                listing: Mutex::new(Vec::new()),
                sink: Mutex::new(None),
                default_queries: AtomicUsize::new(0),
                unregistered: AtomicUsize::new(0),
            }),
        }
    }

    pub fn set_default(&self, direction: EndpointDirection, role: EndpointRole, info: EndpointInfo) {
        self.inner.defaults.lock().insert((direction, role), info);
    }

    pub fn add_endpoint(&self, direction: EndpointDirection, info: EndpointInfo) {
        self.inner.listing.lock().push((direction, info));
    }

    pub fn remove_endpoint(&self, id: &str) {
        self.inner.listing.lock().retain(|(_, info)| info.id != id);
    }

    pub fn fire_default_changed(
        &self,
        direction: EndpointDirection,
        role: EndpointRole,
        new_id: Option<&str>,
    ) {
        let sink = self.inner.sink.lock().clone();
        if let Some(sink) = sink {
            sink.default_endpoint_changed(direction, role, new_id);
        }
    }

    pub fn default_queries(&self) -> usize {
        self.inner.default_queries.load(Ordering::SeqCst)
    }

    pub fn has_sink(&self) -> bool {
        self.inner.sink.lock().is_some()
    }

    pub fn unregister_count(&self) -> usize {
        self.inner.unregistered.load(Ordering::SeqCst)
    }
}

impl EndpointEnumerator for MockEnumerator {
    fn default_endpoint(
        &self,
        direction: EndpointDirection,
        role: EndpointRole,
    ) -> Result<EndpointInfo, CaptureError> {
        self.inner.default_queries.fetch_add(1, Ordering::SeqCst);
        self.inner
            .defaults
            .lock()
            .get(&(direction, role))
            .cloned()
            .ok_or_else(|| CaptureError::EndpointUnavailable("no default endpoint".into()))
    }

    fn endpoint_by_id(&self, id: &str) -> Result<EndpointInfo, CaptureError> {
        self.inner
            .listing
            .lock()
            .iter()
            .find(|(_, info)| info.id == id)
            .map(|(_, info)| info.clone())
            .ok_or_else(|| CaptureError::DeviceNotFound(id.into()))
    }

    fn endpoints(&self, direction: EndpointDirection) -> Result<Vec<EndpointInfo>, CaptureError> {
        Ok(self
            .inner
            .listing
            .lock()
            .iter()
            .filter(|(d, _)| *d == direction)
            .map(|(_, info)| info.clone())
            .collect())
    }

    fn register_notifications(
        &self,
        sink: Arc<dyn EndpointNotificationSink>,
    ) -> Result<Box<dyn NotificationRegistration>, CaptureError> {
        *self.inner.sink.lock() = Some(sink);
        Ok(Box::new(MockRegistration {
            inner: Arc::clone(&self.inner),
            done: false,
        }))
    }
}

struct MockRegistration {
    inner: Arc<EnumInner>,
    done: bool,
}

impl NotificationRegistration for MockRegistration {
    fn unregister(&mut self) {
        if !self.done {
            self.done = true;
            self.inner.sink.lock().take();
            self.inner.unregistered.fetch_add(1, Ordering::SeqCst);
        }
    }
}

impl Drop for MockRegistration {
    fn drop(&mut self) {
        self.unregister();
    }
}

// --- capture client / backend ---

#[derive(Debug, Clone, Copy)]
pub(crate) struct MockPacket {
    pub frames: u32,
    pub flags: u32,
    pub device_position: u64,
    pub device_time: u64,
}

impl MockPacket {
    pub fn frames(frames: u32) -> Self {
        Self {
            frames,
            flags: 0,
            device_position: 0,
            device_time: 0,
        }
    }

    pub fn device_time(mut self, ticks: u64) -> Self {
        self.device_time = ticks;
        self
    }
}

/// Tracks concurrently live mock clients so tests can assert the
/// one-live-pair invariant.
#[derive(Default)]
pub(crate) struct LiveCounter {
    current: AtomicUsize,
    peak: AtomicUsize,
}

impl LiveCounter {
    fn inc(&self) {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
    }

    fn dec(&self) {
        self.current.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

/// Packet source shared between a test and the clients it hands out.
#[derive(Clone, Default)]
pub(crate) struct ClientFeed {
    packets: Arc<Mutex<VecDeque<MockPacket>>>,
    fail: Arc<Mutex<Option<CaptureError>>>,
}

impl ClientFeed {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, packet: MockPacket) {
        self.packets.lock().push_back(packet);
    }

    /// Fail the next drain query once the queued packets are exhausted.
    pub fn fail_next(&self, err: CaptureError) {
        *self.fail.lock() = Some(err);
    }
}

pub(crate) struct MockClient {
    feed: ClientFeed,
    channels: usize,
    pending: Option<MockPacket>,
    buf: Vec<f32>,
    live: Option<Arc<LiveCounter>>,
}

impl MockClient {
    pub fn with_packets(packets: Vec<MockPacket>) -> Self {
        let feed = ClientFeed::new();
        for p in packets {
            feed.push(p);
        }
        Self::from_feed(feed, None)
    }

    pub fn then_fail(self, err: CaptureError) -> Self {
        self.feed.fail_next(err);
        self
    }

    fn from_feed(feed: ClientFeed, live: Option<Arc<LiveCounter>>) -> Self {
        if let Some(live) = &live {
            live.inc();
        }
        Self {
            feed,
            channels: 2,
            pending: None,
            buf: Vec::new(),
            live,
        }
    }
}

impl Drop for MockClient {
    fn drop(&mut self) {
        if let Some(live) = &self.live {
            live.dec();
        }
    }
}

impl CaptureClient for MockClient {
    fn next_packet_size(&mut self) -> Result<u32, CaptureError> {
        if let Some(packet) = self.feed.packets.lock().front() {
            return Ok(packet.frames);
        }
        if let Some(err) = self.feed.fail.lock().take() {
            return Err(err);
        }
        Ok(0)
    }

    fn read_packet(&mut self) -> Result<Packet<'_>, CaptureError> {
        let packet = self
            .feed
            .packets
            .lock()
            .pop_front()
            .ok_or(CaptureError::DeviceInvalidated)?;
        self.buf.clear();
        self.buf.resize(packet.frames as usize * self.channels, 0.0);
        self.pending = Some(packet);
        let packet = self.pending.as_ref().expect("pending packet");
        Ok(Packet {
            samples: &self.buf,
            frames: packet.frames,
            flags: packet.flags,
            device_position: packet.device_position,
            device_time: packet.device_time,
        })
    }

    fn release_packet(&mut self, _frames: u32) -> Result<(), CaptureError> {
        self.pending = None;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct OpenRecord {
    pub endpoint_id: Option<String>,
    pub loopback: bool,
    pub process_id: Option<u32>,
}

struct BackendInner {
    script: Mutex<VecDeque<Result<ClientFeed, CaptureError>>>,
    fallback: Mutex<Option<ClientFeed>>,
    opens: Mutex<Vec<OpenRecord>>,
    live: Arc<LiveCounter>,
    data_ready: Mutex<Option<SignalSetter>>,
    current_feed: Mutex<Option<ClientFeed>>,
    format: Mutex<StreamFormat>,
}

#[derive(Clone)]
pub(crate) struct MockBackend {
    inner: Arc<BackendInner>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(BackendInner {
                script: Mutex::new(VecDeque::new()),
                fallback: Mutex::new(None),
                opens: Mutex::new(Vec::new()),
                live: Arc::new(LiveCounter::default()),
                data_ready: Mutex::new(None),
                current_feed: Mutex::new(None),
                format: Mutex::new(StreamFormat {
                    layout: SpeakerLayout::Stereo,
                    format: SampleFormat::Float32,
                    sample_rate: 48000,
                    channels: 2,
                }),
            }),
        }
    }

    /// Script the next open outcome.
    pub fn script_failure(&self, err: CaptureError) {
        self.inner.script.lock().push_back(Err(err));
    }

    /// Every unscripted open succeeds with a fresh feed.
    pub fn succeed_by_default(&self) {
        *self.inner.fallback.lock() = Some(ClientFeed::new());
    }

    pub fn opens(&self) -> Vec<OpenRecord> {
        self.inner.opens.lock().clone()
    }

    pub fn open_count(&self) -> usize {
        self.inner.opens.lock().len()
    }

    pub fn peak_live_clients(&self) -> usize {
        self.inner.live.peak()
    }

    /// Feed one packet to the currently open client and signal data-ready.
    pub fn push_packet(&self, packet: MockPacket) {
        if let Some(feed) = self.inner.current_feed.lock().clone() {
            feed.push(packet);
        }
        let setter = self.inner.data_ready.lock().clone();
        if let Some(setter) = setter {
            setter.set();
        }
    }

    /// Make the current client fail its next drain query.
    pub fn fail_current(&self, err: CaptureError) {
        if let Some(feed) = self.inner.current_feed.lock().clone() {
            feed.fail_next(err);
        }
        let setter = self.inner.data_ready.lock().clone();
        if let Some(setter) = setter {
            setter.set();
        }
    }

    fn open(&self, record: OpenRecord, data_ready: &SignalSetter) -> Result<OpenClient, CaptureError> {
        self.inner.opens.lock().push(record);
        let scripted = self.inner.script.lock().pop_front();
        let feed = match scripted {
            Some(Ok(feed)) => feed,
            Some(Err(err)) => return Err(err),
            None => match self.inner.fallback.lock().as_ref() {
                // Fresh feed per open so stale packets don't leak across
                // reconnects.
                Some(_) => ClientFeed::new(),
                None => {
                    return Err(CaptureError::EndpointUnavailable(
                        "backend script exhausted".into(),
                    ))
                }
            },
        };
        *self.inner.data_ready.lock() = Some(data_ready.clone());
        *self.inner.current_feed.lock() = Some(feed.clone());
        Ok(OpenClient {
            client: Box::new(MockClient::from_feed(feed, Some(Arc::clone(&self.inner.live)))),
            format: *self.inner.format.lock(),
        })
    }
}

impl AudioBackend for MockBackend {
    fn open_device_client(
        &mut self,
        endpoint_id: &str,
        loopback: bool,
        data_ready: &SignalSetter,
    ) -> Result<OpenClient, CaptureError> {
        self.open(
            OpenRecord {
                endpoint_id: Some(endpoint_id.into()),
                loopback,
                process_id: None,
            },
            data_ready,
        )
    }

    fn open_process_client(
        &mut self,
        process_id: u32,
        data_ready: &SignalSetter,
    ) -> Result<OpenClient, CaptureError> {
        self.open(
            OpenRecord {
                endpoint_id: None,
                loopback: true,
                process_id: Some(process_id),
            },
            data_ready,
        )
    }
}

// --- locator ---

struct LocatorInner {
    alive: AtomicBool,
    target: Mutex<Option<ProcessTarget>>,
    locate_count: AtomicUsize,
}

#[derive(Clone)]
pub(crate) struct MockLocator {
    inner: Arc<LocatorInner>,
}

impl MockLocator {
    pub fn always_alive() -> Self {
        Self {
            inner: Arc::new(LocatorInner {
                alive: AtomicBool::new(true),
                target: Mutex::new(None),
                locate_count: AtomicUsize::new(0),
            }),
        }
    }

    pub fn dead() -> Self {
        let locator = Self::always_alive();
        locator.set_alive(false);
        locator
    }

    pub fn set_alive(&self, alive: bool) {
        self.inner.alive.store(alive, Ordering::SeqCst);
    }

    pub fn set_target(&self, target: ProcessTarget) {
        *self.inner.target.lock() = Some(target);
    }

    pub fn locate_count(&self) -> usize {
        self.inner.locate_count.load(Ordering::SeqCst)
    }
}

impl ProcessLocator for MockLocator {
    fn locate(
        &self,
        _spec: &WindowSpec,
        _priority: MatchPriority,
    ) -> Result<ProcessTarget, CaptureError> {
        self.inner.locate_count.fetch_add(1, Ordering::SeqCst);
        self.inner
            .target
            .lock()
            .clone()
            .ok_or_else(|| CaptureError::DeviceNotFound("no matching window".into()))
    }

    fn target_alive(&self, _target: &ProcessTarget) -> bool {
        self.inner.alive.load(Ordering::SeqCst)
    }
}

// --- sink / clock ---

#[derive(Debug, Clone)]
pub(crate) struct FrameRecord {
    pub samples: usize,
    pub frames: u32,
    pub layout: SpeakerLayout,
    pub channels: u16,
    pub sample_rate: u32,
    pub format: SampleFormat,
    pub timestamp_ns: u64,
}

#[derive(Clone, Default)]
pub(crate) struct CollectSink {
    frames: Arc<Mutex<Vec<FrameRecord>>>,
}

impl CollectSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frames(&self) -> Vec<FrameRecord> {
        self.frames.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.frames.lock().len()
    }
}

impl FrameSink for CollectSink {
    fn push(&self, frame: &CaptureFrame<'_>) {
        self.frames.lock().push(FrameRecord {
            samples: frame.samples.len(),
            frames: frame.frames,
            layout: frame.layout,
            channels: frame.channels,
            sample_rate: frame.sample_rate,
            format: frame.format,
            timestamp_ns: frame.timestamp_ns,
        });
    }
}

pub(crate) struct TestClock {
    ns: AtomicU64,
}

impl TestClock {
    pub fn at(ns: u64) -> Self {
        Self {
            ns: AtomicU64::new(ns),
        }
    }
}

impl Clock for TestClock {
    fn now_ns(&self) -> u64 {
        self.ns.load(Ordering::SeqCst)
    }
}
