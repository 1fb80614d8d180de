//! Scripted reader and engine doubles shared by the coordinator test suites.

#![allow(dead_code)]

use async_trait::async_trait;
use bridge_traits::engine::{
    EngineEvent, EngineFactory, EngineListener, EngineNotification, PlaybackEngine,
};
use bridge_traits::error::{EngineError, ReaderError, SeekRejection};
use bridge_traits::media::{
    AudioSample, AudioTrackInfo, CdmProxy, DisplaySize, InitFlags, MediaInfo, MediaSample,
    SeekTarget, TrackSet, TrackType, VideoSample, VideoTrackInfo,
};
use bridge_traits::reader::MediaReader;
use bytes::Bytes;
use core_playback::{CoordinatorConfig, CrashMonitor, PlaybackCoordinator, StateKind};
use core_runtime::events::{CoordinatorEvent, EventBus, EventStream};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;

pub const TIMEOUT: Duration = Duration::from_secs(2);

// ============================================================================
// Scripted Replies
// ============================================================================

/// Replies for one async method. A queued reply is returned immediately;
/// otherwise the call parks until the test releases it.
pub struct Scripted<T> {
    inner: Mutex<ScriptedInner<T>>,
}

struct ScriptedInner<T> {
    queued: VecDeque<T>,
    parked: VecDeque<oneshot::Sender<T>>,
    default: Option<T>,
    calls: usize,
}

impl<T: Clone + Send + 'static> Scripted<T> {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(ScriptedInner {
                queued: VecDeque::new(),
                parked: VecDeque::new(),
                default: None,
                calls: 0,
            }),
        }
    }

    /// Reply returned when nothing is queued, instead of parking.
    pub fn with_default(value: T) -> Self {
        let scripted = Self::new();
        scripted.set_default(Some(value));
        scripted
    }

    pub fn set_default(&self, value: Option<T>) {
        self.inner.lock().default = value;
    }

    pub fn queue(&self, value: T) {
        self.inner.lock().queued.push_back(value);
    }

    /// Resolves the oldest parked call that is still being awaited.
    pub fn release(&self, value: T) -> bool {
        let mut inner = self.inner.lock();
        let mut value = value;
        while let Some(sender) = inner.parked.pop_front() {
            match sender.send(value) {
                Ok(()) => return true,
                Err(returned) => value = returned,
            }
        }
        false
    }

    pub fn calls(&self) -> usize {
        self.inner.lock().calls
    }

    /// Calls currently parked and still awaited (not aborted).
    pub fn outstanding(&self) -> usize {
        self.inner
            .lock()
            .parked
            .iter()
            .filter(|sender| !sender.is_closed())
            .count()
    }

    pub async fn call(&self) -> T {
        let rx = {
            let mut inner = self.inner.lock();
            inner.calls += 1;
            if let Some(value) = inner.queued.pop_front() {
                return value;
            }
            if let Some(value) = inner.default.clone() {
                return value;
            }
            let (tx, rx) = oneshot::channel();
            inner.parked.push_back(tx);
            rx
        };
        match rx.await {
            Ok(value) => value,
            Err(_) => std::future::pending().await,
        }
    }
}

// ============================================================================
// Fake Reader
// ============================================================================

pub struct FakeReader {
    pub metadata: Scripted<Result<MediaInfo, ReaderError>>,
    pub audio: Scripted<Result<AudioSample, ReaderError>>,
    pub video: Scripted<Result<VideoSample, ReaderError>>,
    pub seeks: Scripted<Result<Duration, SeekRejection>>,
    pub waits: Scripted<Result<TrackType, ReaderError>>,
    pub shutdown: Scripted<()>,
    pub seek_targets: Mutex<Vec<SeekTarget>>,
    pub video_thresholds: Mutex<Vec<Duration>>,
    pub waited_tracks: Mutex<Vec<TrackType>>,
    pub resets: Mutex<Vec<TrackSet>>,
    pub releases: AtomicUsize,
    pub engine_ids: Mutex<Vec<u64>>,
    pub custom_ident: AtomicBool,
}

impl FakeReader {
    pub fn new(info: MediaInfo) -> Arc<Self> {
        let reader = Self::without_metadata();
        reader.metadata.queue(Ok(info));
        reader
    }

    /// Metadata reads park until released through `metadata`.
    pub fn without_metadata() -> Arc<Self> {
        Arc::new(Self {
            metadata: Scripted::new(),
            audio: Scripted::new(),
            video: Scripted::new(),
            seeks: Scripted::new(),
            waits: Scripted::new(),
            shutdown: Scripted::with_default(()),
            seek_targets: Mutex::new(Vec::new()),
            video_thresholds: Mutex::new(Vec::new()),
            waited_tracks: Mutex::new(Vec::new()),
            resets: Mutex::new(Vec::new()),
            releases: AtomicUsize::new(0),
            engine_ids: Mutex::new(Vec::new()),
            custom_ident: AtomicBool::new(false),
        })
    }
}

#[async_trait]
impl MediaReader for FakeReader {
    async fn read_metadata(&self) -> Result<MediaInfo, ReaderError> {
        self.metadata.call().await
    }

    async fn request_audio_data(&self) -> Result<AudioSample, ReaderError> {
        self.audio.call().await
    }

    async fn request_video_data(&self, threshold: Duration) -> Result<VideoSample, ReaderError> {
        self.video_thresholds.lock().push(threshold);
        self.video.call().await
    }

    async fn seek(&self, target: SeekTarget) -> Result<Duration, SeekRejection> {
        self.seek_targets.lock().push(target);
        self.seeks.call().await
    }

    async fn wait_for_data(&self, track: TrackType) -> Result<TrackType, ReaderError> {
        self.waited_tracks.lock().push(track);
        self.waits.call().await
    }

    fn reset_decode(&self, tracks: TrackSet) {
        self.resets.lock().push(tracks);
    }

    fn release_resources(&self) {
        self.releases.fetch_add(1, Ordering::SeqCst);
    }

    async fn shutdown(&self) {
        self.shutdown.call().await
    }

    fn is_encrypted_custom_ident(&self) -> bool {
        self.custom_ident.load(Ordering::SeqCst)
    }

    fn set_encrypted_custom_ident(&self) {
        self.custom_ident.store(true, Ordering::SeqCst);
    }

    fn update_media_engine_id(&self, engine_id: u64) {
        self.engine_ids.lock().push(engine_id);
    }
}

// ============================================================================
// Fake Engine
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum EngineCall {
    Play,
    Pause,
    SetPlaybackRate(f64),
    SetVolume(f64),
    SetLooping(bool),
    SetPreservesPitch(bool),
    Seek(Duration),
    PushSample(TrackType, Duration),
    EndOfStream(TrackType),
    SetCdmProxy(String),
    Shutdown,
}

pub struct FakeEngine {
    id: u64,
    listener: EngineListener,
    init: Arc<Scripted<Result<(), EngineError>>>,
    accept_cdm: Arc<AtomicBool>,
    position: Mutex<Duration>,
    calls: Mutex<Vec<EngineCall>>,
    pub init_flags: Mutex<Option<InitFlags>>,
}

impl FakeEngine {
    pub fn calls(&self) -> Vec<EngineCall> {
        self.calls.lock().clone()
    }

    pub fn pushed(&self, track: TrackType) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|call| matches!(call, EngineCall::PushSample(t, _) if *t == track))
            .count()
    }

    pub fn set_position(&self, position: Duration) {
        *self.position.lock() = position;
    }

    pub fn emit(&self, event: EngineEvent) {
        self.listener.event(event);
    }

    pub fn fail(&self, error: EngineError) {
        self.listener.error(error);
    }

    pub fn crash(&self) {
        self.listener.host_process_crashed();
    }

    pub fn resize(&self, width: u32, height: u32) {
        self.listener
            .notify(EngineNotification::Resized { width, height });
    }

    fn record(&self, call: EngineCall) {
        self.calls.lock().push(call);
    }
}

#[async_trait]
impl PlaybackEngine for FakeEngine {
    async fn init(&self, _info: MediaInfo, flags: InitFlags) -> Result<(), EngineError> {
        *self.init_flags.lock() = Some(flags);
        self.init.call().await
    }

    fn id(&self) -> u64 {
        self.id
    }

    fn play(&self) {
        self.record(EngineCall::Play);
    }

    fn pause(&self) {
        self.record(EngineCall::Pause);
    }

    fn set_playback_rate(&self, rate: f64) {
        self.record(EngineCall::SetPlaybackRate(rate));
    }

    fn set_volume(&self, volume: f64) {
        self.record(EngineCall::SetVolume(volume));
    }

    fn set_looping(&self, looping: bool) {
        self.record(EngineCall::SetLooping(looping));
    }

    fn set_preserves_pitch(&self, preserves_pitch: bool) {
        self.record(EngineCall::SetPreservesPitch(preserves_pitch));
    }

    fn seek(&self, time: Duration) {
        self.record(EngineCall::Seek(time));
    }

    fn current_position(&self) -> Duration {
        *self.position.lock()
    }

    fn push_sample(&self, sample: MediaSample) {
        self.record(EngineCall::PushSample(sample.track(), sample.time()));
    }

    fn notify_end_of_stream(&self, track: TrackType) {
        self.record(EngineCall::EndOfStream(track));
    }

    fn set_cdm_proxy(&self, proxy: &CdmProxy) -> bool {
        self.record(EngineCall::SetCdmProxy(proxy.key_system.clone()));
        self.accept_cdm.load(Ordering::SeqCst)
    }

    fn shutdown(&self) {
        self.record(EngineCall::Shutdown);
    }
}

/// Creates [`FakeEngine`]s and keeps every one of them for inspection.
pub struct FakeEngineFactory {
    pub init: Arc<Scripted<Result<(), EngineError>>>,
    pub accept_cdm: Arc<AtomicBool>,
    engines: Mutex<Vec<Arc<FakeEngine>>>,
}

impl FakeEngineFactory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            init: Arc::new(Scripted::with_default(Ok(()))),
            accept_cdm: Arc::new(AtomicBool::new(true)),
            engines: Mutex::new(Vec::new()),
        })
    }

    /// Engine inits park until released through `init`.
    pub fn holding_init() -> Arc<Self> {
        let factory = Self::new();
        factory.init.set_default(None);
        factory
    }

    pub fn created(&self) -> usize {
        self.engines.lock().len()
    }

    pub fn engine(&self, index: usize) -> Arc<FakeEngine> {
        self.engines.lock()[index].clone()
    }

    pub fn latest(&self) -> Arc<FakeEngine> {
        self.engines
            .lock()
            .last()
            .cloned()
            .expect("no engine created yet")
    }
}

impl EngineFactory for FakeEngineFactory {
    fn create(&self, listener: EngineListener) -> Result<Arc<dyn PlaybackEngine>, EngineError> {
        let engine = Arc::new(FakeEngine {
            id: 100 + listener.generation(),
            listener,
            init: self.init.clone(),
            accept_cdm: self.accept_cdm.clone(),
            position: Mutex::new(Duration::ZERO),
            calls: Mutex::new(Vec::new()),
            init_flags: Mutex::new(None),
        });
        self.engines.lock().push(engine.clone());
        Ok(engine)
    }
}

// ============================================================================
// Media Fixtures
// ============================================================================

pub fn audio_track(mime: &str) -> AudioTrackInfo {
    AudioTrackInfo {
        mime_type: mime.to_string(),
        channels: 2,
        sample_rate: 48000,
        encrypted: false,
    }
}

pub fn video_track(mime: &str) -> VideoTrackInfo {
    VideoTrackInfo {
        mime_type: mime.to_string(),
        image: DisplaySize::new(1280, 720),
        display: DisplaySize::new(1280, 720),
        encrypted: false,
    }
}

pub fn audio_only() -> MediaInfo {
    MediaInfo {
        audio: Some(audio_track("audio/aac")),
        metadata_duration: Some(Duration::from_secs(60)),
        seekable: true,
        ..Default::default()
    }
}

pub fn audio_video() -> MediaInfo {
    MediaInfo {
        audio: Some(audio_track("audio/aac")),
        video: Some(video_track("video/avc")),
        metadata_duration: Some(Duration::from_secs(60)),
        seekable: true,
        ..Default::default()
    }
}

pub fn audio_sample(millis: u64) -> AudioSample {
    AudioSample {
        time: Duration::from_millis(millis),
        duration: Duration::from_millis(20),
        keyframe: true,
        data: Bytes::from_static(&[0u8; 4]),
    }
}

pub fn video_sample(millis: u64) -> VideoSample {
    VideoSample {
        time: Duration::from_millis(millis),
        duration: Duration::from_millis(33),
        keyframe: true,
        data: Bytes::from_static(&[0u8; 4]),
    }
}

// ============================================================================
// Harness
// ============================================================================

pub struct Harness {
    pub coordinator: PlaybackCoordinator,
    pub reader: Arc<FakeReader>,
    pub factory: Arc<FakeEngineFactory>,
    pub monitor: Arc<CrashMonitor>,
    pub events: EventStream,
}

impl Harness {
    pub fn start(reader: Arc<FakeReader>, factory: Arc<FakeEngineFactory>) -> Self {
        Self::with_config(reader, factory, CoordinatorConfig::default())
    }

    pub fn with_config(
        reader: Arc<FakeReader>,
        factory: Arc<FakeEngineFactory>,
        config: CoordinatorConfig,
    ) -> Self {
        let bus = EventBus::new(256);
        let events = EventStream::new(bus.subscribe());
        let monitor = Arc::new(CrashMonitor::new());
        let coordinator = PlaybackCoordinator::builder()
            .reader(reader.clone())
            .engine_factory(factory.clone())
            .config(config)
            .event_bus(bus)
            .crash_monitor(monitor.clone())
            .build()
            .expect("coordinator builds");
        Self {
            coordinator,
            reader,
            factory,
            monitor,
            events,
        }
    }

    pub async fn wait_for_state(&self, state: StateKind) {
        let coordinator = self.coordinator.clone();
        eventually(move || coordinator.snapshot().state == state).await;
    }

    /// Next event matching `predicate`, skipping everything else.
    pub async fn next_event<F>(&mut self, predicate: F) -> CoordinatorEvent
    where
        F: Fn(&CoordinatorEvent) -> bool,
    {
        tokio::time::timeout(TIMEOUT, async {
            loop {
                let event = self.events.recv().await.expect("event bus open");
                if predicate(&event) {
                    return event;
                }
            }
        })
        .await
        .expect("expected event was not emitted")
    }
}

/// Polls `condition` until it holds or [`TIMEOUT`] elapses.
pub async fn eventually<F>(condition: F)
where
    F: Fn() -> bool,
{
    tokio::time::timeout(TIMEOUT, async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

/// Lets the coordinator task drain its mailbox.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(30)).await;
}
