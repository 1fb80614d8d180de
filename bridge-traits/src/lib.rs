//! # Engine Bridge Traits
//!
//! Contracts between the playback coordinator and the collaborators it
//! orchestrates but does not implement.
//!
//! ## Overview
//!
//! The coordinator reconciles two independently asynchronous subsystems:
//!
//! - [`MediaReader`](reader::MediaReader) - pull-based local demuxer producing
//!   timed audio/video samples, seek and reset operations
//! - [`PlaybackEngine`](engine::PlaybackEngine) - external (out-of-process,
//!   hardware or DRM backed) decode-and-render session, created per attempt by
//!   an [`EngineFactory`](engine::EngineFactory) and reporting back through an
//!   [`EngineListener`](engine::EngineListener)
//!
//! Host applications also supply an optional
//! [`LoggerSink`](logger::LoggerSink) to receive structured logs.
//!
//! ## Error Handling
//!
//! Reader requests fail with [`ReaderError`](error::ReaderError); several of its
//! variants (`WaitingForData`, `EndOfStream`, `Canceled`) are flow-control
//! signals rather than failures. Engine failures use
//! [`EngineError`](error::EngineError). Host plumbing uses
//! [`BridgeError`](error::BridgeError).
//!
//! ## Thread Safety
//!
//! All traits require `Send + Sync`. Adapter futures are spawned onto the
//! coordinator's runtime and may be dropped before completion.
//!
//! ## Example
//!
//! ```ignore
//! use bridge_traits::engine::{EngineFactory, EngineListener, PlaybackEngine};
//! use bridge_traits::error::EngineError;
//! use std::sync::Arc;
//!
//! struct HostEngineFactory;
//!
//! impl EngineFactory for HostEngineFactory {
//!     fn create(&self, listener: EngineListener) -> Result<Arc<dyn PlaybackEngine>, EngineError> {
//!         Ok(Arc::new(HostEngine::launch(listener)?))
//!     }
//! }
//! ```

pub mod engine;
pub mod error;
pub mod logger;
pub mod media;
pub mod reader;

pub use error::{BridgeError, EngineError, ReaderError, SeekRejection};

// Re-export commonly used types
pub use engine::{EngineEvent, EngineFactory, EngineListener, EngineNotification, PlaybackEngine};
pub use logger::{ConsoleLogger, LogEntry, LogLevel, LoggerSink};
pub use media::{
    AudioSample, AudioTrackInfo, CdmProxy, DisplaySize, InitFlags, MediaDuration, MediaInfo,
    MediaSample, SeekKind, SeekTarget, TrackSet, TrackType, VideoSample, VideoTrackInfo,
};
pub use reader::MediaReader;
