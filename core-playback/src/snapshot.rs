//! Owner-visible view of the coordinator, readable without a round trip
//! through the mailbox.

use crate::error::ErrorSeverity;
use crate::state::StateKind;
use bridge_traits::media::{DisplaySize, MediaDuration};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Play/pause intent requested by the owner.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlayState {
    #[default]
    Paused,
    Playing,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaybackSnapshot {
    pub state: StateKind,
    pub play_state: PlayState,
    pub position: Duration,
    pub duration: Option<MediaDuration>,
    pub display_size: Option<DisplaySize>,
    pub audible: bool,
    /// Severity of the first reported error. Latched.
    pub error: Option<ErrorSeverity>,
}

impl PlaybackSnapshot {
    pub fn has_error(&self) -> bool {
        self.error.is_some()
    }

    pub fn has_fatal_error(&self) -> bool {
        self.error == Some(ErrorSeverity::Fatal)
    }
}

impl Default for PlaybackSnapshot {
    fn default() -> Self {
        Self {
            state: StateKind::ReadingMetadata,
            play_state: PlayState::Paused,
            position: Duration::ZERO,
            duration: None,
            display_size: None,
            audible: false,
            error: None,
        }
    }
}
