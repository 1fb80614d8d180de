//! # External Engine Playback
//!
//! Coordinates media playback through an external decode/render engine.
//!
//! ## Overview
//!
//! The coordinator sits between three parties:
//! - the owning media pipeline, which issues commands and observes events
//! - a [`MediaReader`](bridge_traits::MediaReader) that demuxes samples
//! - a [`PlaybackEngine`](bridge_traits::PlaybackEngine) created per session
//!   by an [`EngineFactory`](bridge_traits::EngineFactory)
//!
//! It pumps samples from reader to engine on demand, coordinates two-party
//! seeks, defers commands until the engine is ready, binds DRM sessions and
//! recovers from engine host crashes within a process-wide budget. Errors are
//! classified as fallback-eligible or fatal for the owner.

pub mod config;
pub mod coordinator;
pub mod crash_monitor;
pub mod error;
pub mod snapshot;
pub mod state;

mod machine;
mod pending;
mod requests;
mod seek;

pub use config::{CoordinatorConfig, EngineMode};
pub use coordinator::{CoordinatorId, PlaybackCoordinator, PlaybackCoordinatorBuilder};
pub use crash_monitor::CrashMonitor;
pub use error::{DrmError, ErrorSeverity, PlaybackError, Result, SeekError};
pub use snapshot::{PlayState, PlaybackSnapshot};
pub use state::{ShutdownFuture, StateKind};
