//! # Playback Coordinator
//!
//! Owner-facing handle of the playback state machine.
//!
//! The state machine runs on its own tokio task and is only reachable through
//! this handle's mailbox, so every call is applied in order and never races
//! with reader or engine completions.
//!
//! ## Usage
//!
//! ```no_run
//! use bridge_traits::media::SeekTarget;
//! use core_playback::{CoordinatorConfig, PlaybackCoordinator, PlayState};
//! # use std::sync::Arc;
//! # use std::time::Duration;
//! # async fn run(
//! #     reader: Arc<dyn bridge_traits::MediaReader>,
//! #     engines: Arc<dyn bridge_traits::EngineFactory>,
//! # ) -> core_runtime::Result<()> {
//! let coordinator = PlaybackCoordinator::builder()
//!     .reader(reader)
//!     .engine_factory(engines)
//!     .config(CoordinatorConfig::default())
//!     .build()?;
//!
//! let mut events = coordinator.subscribe();
//! coordinator.set_play_state(PlayState::Playing);
//! coordinator
//!     .seek(SeekTarget::accurate(Duration::from_secs(5)))
//!     .await
//!     .ok();
//!
//! coordinator.shutdown().await;
//! # Ok(())
//! # }
//! ```

use crate::config::CoordinatorConfig;
use crate::crash_monitor::CrashMonitor;
use crate::error::{DrmError, SeekError};
use crate::machine::{Command, Message, StateMachine};
use crate::snapshot::{PlayState, PlaybackSnapshot};
use crate::state::ShutdownFuture;
use bridge_traits::engine::EngineFactory;
use bridge_traits::media::{CdmProxy, SeekTarget};
use bridge_traits::reader::MediaReader;
use core_runtime::events::{EventBus, EventStream};
use core_runtime::{Error, Result};
use futures::future::{BoxFuture, FutureExt};
use parking_lot::{Mutex, RwLock};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info_span, Instrument};
use uuid::Uuid;

/// Unique identifier of a coordinator instance, attached to its log span.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CoordinatorId(Uuid);

impl CoordinatorId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for CoordinatorId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CoordinatorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Coordinator Handle
// ============================================================================

/// Cheap-to-clone handle. The coordinator shuts down once the last handle is
/// dropped, if it was not shut down explicitly before.
#[derive(Clone)]
pub struct PlaybackCoordinator {
    inner: Arc<Inner>,
}

struct Inner {
    id: CoordinatorId,
    config: CoordinatorConfig,
    mailbox: mpsc::UnboundedSender<Message>,
    snapshot: Arc<RwLock<PlaybackSnapshot>>,
    events: EventBus,
    shutdown: Mutex<Option<ShutdownFuture>>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        if self.shutdown.get_mut().is_none() {
            let _ = self
                .mailbox
                .send(Message::Command(Command::Shutdown { reply: None }));
        }
    }
}

impl PlaybackCoordinator {
    pub fn builder() -> PlaybackCoordinatorBuilder {
        PlaybackCoordinatorBuilder::default()
    }

    pub fn id(&self) -> CoordinatorId {
        self.inner.id
    }

    /// Latest observable state.
    pub fn snapshot(&self) -> PlaybackSnapshot {
        self.inner.snapshot.read().clone()
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.inner.events
    }

    /// Subscribes to events emitted from now on.
    pub fn subscribe(&self) -> EventStream {
        EventStream::new(self.inner.events.subscribe())
    }

    /// Accurate seek to `target`.
    ///
    /// Resolves once both the engine and the reader reached the target. A
    /// newer seek rejects this one with [`SeekError::Superseded`];
    /// next-frame and video-only targets are rejected with
    /// [`SeekError::Unsupported`].
    pub fn seek(&self, target: SeekTarget) -> BoxFuture<'static, std::result::Result<(), SeekError>> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Seek { target, reply });
        async move { rx.await.unwrap_or(Err(SeekError::Aborted)) }.boxed()
    }

    pub fn set_playback_rate(&self, rate: f64) {
        self.send(Command::SetPlaybackRate(rate));
    }

    pub fn set_volume(&self, volume: f64) {
        self.send(Command::SetVolume(volume));
    }

    pub fn set_looping(&self, looping: bool) {
        self.send(Command::SetLooping(looping));
    }

    pub fn set_preserves_pitch(&self, preserves_pitch: bool) {
        self.send(Command::SetPreservesPitch(preserves_pitch));
    }

    pub fn set_play_state(&self, play_state: PlayState) {
        self.send(Command::SetPlayState(play_state));
    }

    /// New end of the buffered ranges; may extend an unknown or shorter
    /// duration.
    pub fn buffered_end_updated(&self, end: Duration) {
        self.send(Command::BufferedEndUpdated(end));
    }

    /// Whether `proxy` could be bound to the external engine.
    pub fn is_drm_supported(&self, proxy: &CdmProxy) -> std::result::Result<(), DrmError> {
        self.inner.config.is_drm_supported(proxy)
    }

    /// Binds a CDM session. Before the engine is initialized the binding is
    /// queued and applied right after init.
    pub fn bind_drm_session(
        &self,
        proxy: CdmProxy,
    ) -> BoxFuture<'static, std::result::Result<(), DrmError>> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::BindDrm { proxy, reply });
        async move { rx.await.unwrap_or(Err(DrmError::ShutDown)) }.boxed()
    }

    /// Shuts the coordinator down. Every call returns the same future, which
    /// resolves once the reader confirmed its shutdown.
    pub fn shutdown(&self) -> ShutdownFuture {
        let mut cached = self.inner.shutdown.lock();
        if let Some(future) = cached.as_ref() {
            return future.clone();
        }

        let (reply, rx) = oneshot::channel::<ShutdownFuture>();
        self.send(Command::Shutdown { reply: Some(reply) });
        let future = async move {
            if let Ok(shutdown) = rx.await {
                shutdown.await;
            }
        }
        .boxed()
        .shared();
        *cached = Some(future.clone());
        future
    }

    fn send(&self, command: Command) {
        if self.inner.mailbox.send(Message::Command(command)).is_err() {
            debug!(coordinator = %self.inner.id, "coordinator task already finished");
        }
    }
}

impl fmt::Debug for PlaybackCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlaybackCoordinator")
            .field("id", &self.inner.id)
            .field("snapshot", &*self.inner.snapshot.read())
            .finish()
    }
}

// ============================================================================
// Builder
// ============================================================================

#[derive(Default)]
pub struct PlaybackCoordinatorBuilder {
    reader: Option<Arc<dyn MediaReader>>,
    engine_factory: Option<Arc<dyn EngineFactory>>,
    config: Option<CoordinatorConfig>,
    event_bus: Option<EventBus>,
    crash_monitor: Option<Arc<CrashMonitor>>,
}

impl PlaybackCoordinatorBuilder {
    pub fn reader(mut self, reader: Arc<dyn MediaReader>) -> Self {
        self.reader = Some(reader);
        self
    }

    pub fn engine_factory(mut self, factory: Arc<dyn EngineFactory>) -> Self {
        self.engine_factory = Some(factory);
        self
    }

    pub fn config(mut self, config: CoordinatorConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Publishes to an existing bus instead of creating one.
    pub fn event_bus(mut self, bus: EventBus) -> Self {
        self.event_bus = Some(bus);
        self
    }

    /// Uses `monitor` instead of the process-wide [`CrashMonitor::global`].
    pub fn crash_monitor(mut self, monitor: Arc<CrashMonitor>) -> Self {
        self.crash_monitor = Some(monitor);
        self
    }

    /// Validates the wiring and starts the coordinator task, which begins by
    /// reading metadata.
    ///
    /// Must be called from within a tokio runtime.
    pub fn build(self) -> Result<PlaybackCoordinator> {
        let config = self.config.unwrap_or_default();
        config.validate()?;

        let reader = self.reader.ok_or_else(|| {
            Error::capability_missing(
                "MediaReader",
                "A MediaReader implementation is required to demux media for the engine.",
            )
        })?;
        let engine_factory = self.engine_factory.ok_or_else(|| {
            Error::capability_missing(
                "EngineFactory",
                "An EngineFactory implementation is required to create external engine sessions.",
            )
        })?;
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| Error::Internal(format!("coordinator requires a tokio runtime: {e}")))?;

        let events = self
            .event_bus
            .unwrap_or_else(|| EventBus::new(config.event_buffer_size));
        let crash_monitor = self.crash_monitor.unwrap_or_else(CrashMonitor::global);
        let snapshot = Arc::new(RwLock::new(PlaybackSnapshot::default()));
        let id = CoordinatorId::new();

        let (mailbox, receiver) = mpsc::unbounded_channel();
        let machine = StateMachine::new(
            config.clone(),
            reader,
            engine_factory,
            crash_monitor,
            events.clone(),
            snapshot.clone(),
            mailbox.clone(),
        );
        runtime.spawn(run(machine, receiver).instrument(info_span!("coordinator", id = %id)));

        Ok(PlaybackCoordinator {
            inner: Arc::new(Inner {
                id,
                config,
                mailbox,
                snapshot,
                events,
                shutdown: Mutex::new(None),
            }),
        })
    }
}

async fn run(mut machine: StateMachine, mut mailbox: mpsc::UnboundedReceiver<Message>) {
    machine.start();
    while let Some(message) = mailbox.recv().await {
        machine.handle(message);
        if machine.is_finished() {
            break;
        }
    }
    debug!("coordinator task finished");
}
