//! Engine Adapter
//!
//! The external engine performs decode and render of already-demuxed
//! samples, usually in a separate host process. It accepts commands and pushes
//! lifecycle notifications back through an [`EngineListener`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::error::EngineError;
use crate::media::{CdmProxy, InitFlags, MediaInfo, MediaSample, TrackType};

/// Lifecycle event pushed by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EngineEvent {
    LoadedMetaData,
    LoadedFirstFrame,
    LoadedData,
    Waiting,
    Playing,
    Seeked,
    BufferingStarted,
    BufferingEnded,
    Timeupdate,
    Ended,
    RequestForAudio,
    RequestForVideo,
    AudioEnough,
    VideoEnough,
}

impl EngineEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            EngineEvent::LoadedMetaData => "LoadedMetaData",
            EngineEvent::LoadedFirstFrame => "LoadedFirstFrame",
            EngineEvent::LoadedData => "LoadedData",
            EngineEvent::Waiting => "Waiting",
            EngineEvent::Playing => "Playing",
            EngineEvent::Seeked => "Seeked",
            EngineEvent::BufferingStarted => "BufferingStarted",
            EngineEvent::BufferingEnded => "BufferingEnded",
            EngineEvent::Timeupdate => "Timeupdate",
            EngineEvent::Ended => "Ended",
            EngineEvent::RequestForAudio => "RequestForAudio",
            EngineEvent::RequestForVideo => "RequestForVideo",
            EngineEvent::AudioEnough => "AudioEnough",
            EngineEvent::VideoEnough => "VideoEnough",
        }
    }

    /// Track a backpressure event refers to, if any.
    pub fn track(&self) -> Option<TrackType> {
        match self {
            EngineEvent::RequestForAudio | EngineEvent::AudioEnough => Some(TrackType::Audio),
            EngineEvent::RequestForVideo | EngineEvent::VideoEnough => Some(TrackType::Video),
            _ => None,
        }
    }
}

impl fmt::Display for EngineEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything an engine can report asynchronously.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineNotification {
    Event(EngineEvent),
    Error(EngineError),
    /// The engine host process died. Delivered out of band from `Error`.
    HostProcessCrashed,
    /// The rendered video size changed.
    Resized { width: u32, height: u32 },
}

type NotifyFn = dyn Fn(u64, EngineNotification) + Send + Sync;

/// Callback handed to an engine at creation.
///
/// Each engine instance gets a listener stamped with its own generation so
/// that notifications from a replaced engine can be told apart.
#[derive(Clone)]
pub struct EngineListener {
    generation: u64,
    notify: Arc<NotifyFn>,
}

impl EngineListener {
    pub fn new<F>(generation: u64, notify: F) -> Self
    where
        F: Fn(u64, EngineNotification) + Send + Sync + 'static,
    {
        Self {
            generation,
            notify: Arc::new(notify),
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn notify(&self, notification: EngineNotification) {
        (self.notify)(self.generation, notification);
    }

    pub fn event(&self, event: EngineEvent) {
        self.notify(EngineNotification::Event(event));
    }

    pub fn error(&self, error: EngineError) {
        self.notify(EngineNotification::Error(error));
    }

    pub fn host_process_crashed(&self) {
        self.notify(EngineNotification::HostProcessCrashed);
    }
}

impl fmt::Debug for EngineListener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineListener")
            .field("generation", &self.generation)
            .finish()
    }
}

/// An external engine session.
///
/// Commands are fire-and-forget; their outcome is observed through the
/// listener. Only `init` is awaited by the coordinator.
#[async_trait]
pub trait PlaybackEngine: Send + Sync {
    async fn init(&self, info: MediaInfo, flags: InitFlags) -> Result<(), EngineError>;

    /// Identifier of the engine session, valid after `init` succeeds.
    fn id(&self) -> u64;

    fn play(&self);

    fn pause(&self);

    fn set_playback_rate(&self, rate: f64);

    fn set_volume(&self, volume: f64);

    fn set_looping(&self, looping: bool);

    fn set_preserves_pitch(&self, preserves_pitch: bool);

    /// Start an engine seek; completion is reported via [`EngineEvent::Seeked`].
    fn seek(&self, time: Duration);

    fn current_position(&self) -> Duration;

    fn push_sample(&self, sample: MediaSample);

    fn notify_end_of_stream(&self, track: TrackType);

    /// Bind a CDM session. Returns false if the engine refuses it.
    fn set_cdm_proxy(&self, proxy: &CdmProxy) -> bool;

    /// Release the engine session and every resource it holds.
    fn shutdown(&self);
}

/// Creates engine sessions. Called once at init and once per crash recovery.
pub trait EngineFactory: Send + Sync {
    fn create(&self, listener: EngineListener) -> Result<Arc<dyn PlaybackEngine>, EngineError>;
}
