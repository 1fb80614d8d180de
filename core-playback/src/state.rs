//! Coordinator states.
//!
//! ```text
//!  ReadingMetadata ──> InitEngine ──> RunningEngine <──> SeekingData
//!                                        │               ^    │
//!                                        v               │    │
//!                                     RecoverEngine ─────┘    │
//!                                        ^                    │
//!                                        └────────────────────┘
//!
//!  any state ──> ShutdownEngine (terminal)
//! ```
//!
//! Each state owns the requests that only make sense while it is current, so
//! replacing the state disconnects them.

use crate::requests::Request;
use crate::seek::SeekJob;
use futures::future::{BoxFuture, FutureExt, Shared};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::error;

/// Future resolving once the coordinator and its reader have shut down.
/// Every clone resolves together.
pub type ShutdownFuture = Shared<BoxFuture<'static, ()>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StateKind {
    ReadingMetadata,
    InitEngine,
    RunningEngine,
    SeekingData,
    RecoverEngine,
    ShutdownEngine,
}

impl StateKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StateKind::ReadingMetadata => "ReadingMetadata",
            StateKind::InitEngine => "InitEngine",
            StateKind::RunningEngine => "RunningEngine",
            StateKind::SeekingData => "SeekingData",
            StateKind::RecoverEngine => "RecoverEngine",
            StateKind::ShutdownEngine => "ShutdownEngine",
        }
    }

    pub fn can_transition_to(self, next: StateKind) -> bool {
        use StateKind::*;
        match (self, next) {
            (ShutdownEngine, _) => false,
            (_, ShutdownEngine) => true,
            (ReadingMetadata, InitEngine) => true,
            (InitEngine, RunningEngine) => true,
            (RunningEngine, SeekingData) | (RunningEngine, RecoverEngine) => true,
            (SeekingData, RunningEngine) | (SeekingData, RecoverEngine) => true,
            (RecoverEngine, SeekingData) => true,
            _ => false,
        }
    }
}

impl fmt::Display for StateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// State Data
// ============================================================================

#[derive(Debug, Default)]
pub(crate) struct ReadingMetadata {
    pub request: Option<Request>,
}

/// Shared by `InitEngine` and `RecoverEngine`.
#[derive(Debug, Default)]
pub(crate) struct EngineInit {
    pub request: Option<Request>,
}

#[derive(Debug)]
pub(crate) struct SeekingData {
    pub job: SeekJob,
    pub waiting_engine_seeked: bool,
    pub waiting_reader_seeked: bool,
    pub reader_seek: Option<Request>,
}

impl SeekingData {
    pub fn new(job: SeekJob) -> Self {
        Self {
            job,
            waiting_engine_seeked: false,
            waiting_reader_seeked: false,
            reader_seek: None,
        }
    }

    pub fn target_time(&self) -> Duration {
        self.job.time()
    }
}

pub(crate) struct ShutdownEngine {
    future: ShutdownFuture,
    done: Option<oneshot::Sender<()>>,
}

impl ShutdownEngine {
    pub fn new() -> Self {
        let (done, rx) = oneshot::channel::<()>();
        let future = async move {
            let _ = rx.await;
        }
        .boxed()
        .shared();
        Self {
            future,
            done: Some(done),
        }
    }

    pub fn future(&self) -> ShutdownFuture {
        self.future.clone()
    }

    /// Resolves the shutdown future.
    pub fn complete(&mut self) {
        if let Some(done) = self.done.take() {
            let _ = done.send(());
        }
    }
}

impl fmt::Debug for ShutdownEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShutdownEngine")
            .field("completed", &self.done.is_none())
            .finish()
    }
}

#[derive(Debug)]
pub(crate) enum PlaybackState {
    ReadingMetadata(ReadingMetadata),
    InitEngine(EngineInit),
    RunningEngine,
    SeekingData(SeekingData),
    RecoverEngine(EngineInit),
    ShutdownEngine(ShutdownEngine),
}

impl PlaybackState {
    pub fn kind(&self) -> StateKind {
        match self {
            PlaybackState::ReadingMetadata(_) => StateKind::ReadingMetadata,
            PlaybackState::InitEngine(_) => StateKind::InitEngine,
            PlaybackState::RunningEngine => StateKind::RunningEngine,
            PlaybackState::SeekingData(_) => StateKind::SeekingData,
            PlaybackState::RecoverEngine(_) => StateKind::RecoverEngine,
            PlaybackState::ShutdownEngine(_) => StateKind::ShutdownEngine,
        }
    }

    /// Replaces the current state with `next` and returns the previous one.
    ///
    /// # Panics
    ///
    /// Panics on a transition outside the state diagram.
    pub fn transition(&mut self, next: PlaybackState) -> PlaybackState {
        let (from, to) = (self.kind(), next.kind());
        if !from.can_transition_to(to) {
            error!(from = %from, to = %to, "illegal state transition");
            panic!("illegal state transition: {from} -> {to}");
        }
        std::mem::replace(self, next)
    }

    pub fn is_shutdown(&self) -> bool {
        matches!(self, PlaybackState::ShutdownEngine(_))
    }

    pub fn seeking(&self) -> Option<&SeekingData> {
        match self {
            PlaybackState::SeekingData(state) => Some(state),
            _ => None,
        }
    }

    pub fn seeking_mut(&mut self) -> Option<&mut SeekingData> {
        match self {
            PlaybackState::SeekingData(state) => Some(state),
            _ => None,
        }
    }

    /// Init data of `InitEngine` or `RecoverEngine`.
    pub fn engine_init_mut(&mut self) -> Option<&mut EngineInit> {
        match self {
            PlaybackState::InitEngine(state) | PlaybackState::RecoverEngine(state) => Some(state),
            _ => None,
        }
    }
}
