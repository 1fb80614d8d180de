//! # Event Bus System
//!
//! Owner-facing notifications emitted by the playback coordinator, delivered
//! over `tokio::sync::broadcast`.
//!
//! ## Overview
//!
//! - [`CoordinatorEvent`]: everything the owning media pipeline can observe
//! - [`EventBus`]: broadcast channel the coordinator publishes to
//! - [`EventStream`]: receiver wrapper with optional filtering
//!
//! ```text
//! ┌─────────────┐   emit    ┌──────────┐  subscribe  ┌──────────────┐
//! │ Coordinator ├──────────>│ EventBus ├────────────>│ Media element│
//! └─────────────┘           └────┬─────┘             └──────────────┘
//!                                │        subscribe  ┌──────────────┐
//!                                └──────────────────>│ Diagnostics  │
//!                                                    └──────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::events::{CoordinatorEvent, EventBus, EventStream, NextFrameStatus};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let bus = EventBus::new(100);
//! let mut stream = EventStream::new(bus.subscribe())
//!     .filter(|event| matches!(event, CoordinatorEvent::NextFrameStatus { .. }));
//!
//! bus.emit(CoordinatorEvent::FirstFrameLoaded).ok();
//! bus.emit(CoordinatorEvent::NextFrameStatus {
//!     status: NextFrameStatus::Available,
//! })
//! .ok();
//!
//! let event = stream.recv().await.unwrap();
//! assert!(matches!(event, CoordinatorEvent::NextFrameStatus { .. }));
//! # }
//! ```
//!
//! ## Error Handling
//!
//! Slow subscribers receive `RecvError::Lagged(n)` and may continue; a
//! `RecvError::Closed` means the coordinator and every other publisher are
//! gone. Emitting with no subscribers is not an error for the coordinator; it
//! ignores the returned `SendError`.

use bridge_traits::media::{MediaDuration, MediaInfo};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tokio::sync::broadcast;

pub use tokio::sync::broadcast::error::{RecvError, SendError};
pub use tokio::sync::broadcast::Receiver;

/// Default buffer size for the event bus channel.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 100;

// ============================================================================
// Coordinator Events
// ============================================================================

/// Whether the next video frame can be presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NextFrameStatus {
    Available,
    UnavailableBuffering,
    UnavailableSeeking,
    Unavailable,
}

/// How the owner must react to a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorSeverity {
    /// Retry through a different (non-external) playback pipeline
    Fallback,
    /// Terminal media error; only shutdown is accepted afterwards
    Fatal,
}

/// Observable notifications for the owning media pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum CoordinatorEvent {
    /// Metadata was read and the external engine can play it.
    MetadataLoaded { info: MediaInfo },
    /// First frame is ready for presentation. Emitted at most once.
    FirstFrameLoaded,
    NextFrameStatus { status: NextFrameStatus },
    /// Playback reached the end of every track.
    PlaybackEnded,
    SeekStarted { target: Duration },
    /// An accurate seek finished; `position` equals the requested target.
    SeekCompleted { position: Duration },
    DurationChanged { duration: MediaDuration },
    PositionChanged { position: Duration },
    AudibleChanged { audible: bool },
    Resized { width: u32, height: u32 },
    /// The engine host crashed and a new engine is being initialized.
    EngineRecovering { crashes: u32 },
    Error {
        severity: ErrorSeverity,
        /// Stable error name, e.g. `NOT_SUPPORTED_ERR`
        name: String,
        message: String,
    },
}

impl CoordinatorEvent {
    /// Returns a human-readable description of the event.
    pub fn description(&self) -> &str {
        match self {
            CoordinatorEvent::MetadataLoaded { .. } => "Metadata loaded",
            CoordinatorEvent::FirstFrameLoaded => "First frame loaded",
            CoordinatorEvent::NextFrameStatus { status } => match status {
                NextFrameStatus::Available => "Next frame available",
                NextFrameStatus::UnavailableBuffering => "Next frame unavailable (buffering)",
                NextFrameStatus::UnavailableSeeking => "Next frame unavailable (seeking)",
                NextFrameStatus::Unavailable => "Next frame unavailable",
            },
            CoordinatorEvent::PlaybackEnded => "Playback ended",
            CoordinatorEvent::SeekStarted { .. } => "Seek started",
            CoordinatorEvent::SeekCompleted { .. } => "Seek completed",
            CoordinatorEvent::DurationChanged { .. } => "Duration changed",
            CoordinatorEvent::PositionChanged { .. } => "Position changed",
            CoordinatorEvent::AudibleChanged { .. } => "Audible state changed",
            CoordinatorEvent::Resized { .. } => "Video resized",
            CoordinatorEvent::EngineRecovering { .. } => "Recovering external engine",
            CoordinatorEvent::Error {
                severity: ErrorSeverity::Fallback,
                ..
            } => "External engine not supported",
            CoordinatorEvent::Error { .. } => "Playback error",
        }
    }

    /// Returns the severity level of the event.
    pub fn severity(&self) -> EventSeverity {
        match self {
            CoordinatorEvent::Error {
                severity: ErrorSeverity::Fatal,
                ..
            } => EventSeverity::Error,
            CoordinatorEvent::Error { .. } | CoordinatorEvent::EngineRecovering { .. } => {
                EventSeverity::Warning
            }
            CoordinatorEvent::MetadataLoaded { .. }
            | CoordinatorEvent::FirstFrameLoaded
            | CoordinatorEvent::PlaybackEnded => EventSeverity::Info,
            _ => EventSeverity::Debug,
        }
    }
}

/// Event severity levels for filtering and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventSeverity {
    Debug,
    Info,
    Warning,
    Error,
}

// ============================================================================
// Event Bus
// ============================================================================

/// Broadcast channel for [`CoordinatorEvent`]s. Cheap to clone.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CoordinatorEvent>,
}

impl EventBus {
    /// Creates a bus buffering at most `capacity` events per subscriber.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publishes an event. Fails only when nobody is subscribed.
    pub fn emit(&self, event: CoordinatorEvent) -> Result<usize, SendError<CoordinatorEvent>> {
        self.sender.send(event)
    }

    /// Each subscriber receives every event emitted after it subscribed.
    pub fn subscribe(&self) -> Receiver<CoordinatorEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

// ============================================================================
// Event Stream Wrapper
// ============================================================================

type EventFilter = Box<dyn Fn(&CoordinatorEvent) -> bool + Send + Sync>;

/// A `broadcast::Receiver` with an optional filter.
pub struct EventStream {
    receiver: Receiver<CoordinatorEvent>,
    filter: Option<EventFilter>,
}

impl EventStream {
    pub fn new(receiver: Receiver<CoordinatorEvent>) -> Self {
        Self {
            receiver,
            filter: None,
        }
    }

    /// Only events matching `predicate` are returned by `recv()`.
    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&CoordinatorEvent) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Box::new(predicate));
        self
    }

    fn accepts(&self, event: &CoordinatorEvent) -> bool {
        self.filter.as_ref().map_or(true, |f| f(event))
    }

    /// Receives the next event that passes the filter.
    ///
    /// # Errors
    ///
    /// `RecvError::Lagged(n)` if the subscriber fell behind by `n` events,
    /// `RecvError::Closed` once every sender is dropped.
    pub async fn recv(&mut self) -> Result<CoordinatorEvent, RecvError> {
        loop {
            let event = self.receiver.recv().await?;
            if self.accepts(&event) {
                return Ok(event);
            }
        }
    }

    /// Non-blocking receive. Returns `None` when nothing is queued.
    pub fn try_recv(&mut self) -> Option<Result<CoordinatorEvent, RecvError>> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => {
                    if self.accepts(&event) {
                        return Some(Ok(event));
                    }
                }
                Err(broadcast::error::TryRecvError::Empty) => return None,
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    return Some(Err(RecvError::Lagged(n)))
                }
                Err(broadcast::error::TryRecvError::Closed) => return Some(Err(RecvError::Closed)),
            }
        }
    }
}

impl fmt::Debug for EventStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStream")
            .field("has_filter", &self.filter.is_some())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
