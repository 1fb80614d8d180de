//! # Playback Error Types
//!
//! Error taxonomy of the coordinator. Every failure reported to the owner is
//! either *fallback-eligible* (retry through another playback pipeline) or
//! *fatal* (terminal media error). Which one is decided from the error kind and
//! whether a DRM key system has been committed, never from timing.

use bridge_traits::error::{EngineError, ReaderError};
use thiserror::Error;

pub use core_runtime::events::ErrorSeverity;

/// Errors reported to the owning media pipeline.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlaybackError {
    // ========================================================================
    // Fallback-eligible
    // ========================================================================
    /// Codec, container or deployment policy rules out the external engine.
    #[error("External engine not supported: {reason}")]
    EngineNotSupported { reason: String },

    // ========================================================================
    // Fallback unless a key system is committed
    // ========================================================================
    /// Engine creation or initialization failed.
    #[error("External engine initialization failed: {error}")]
    EngineInitFailed {
        #[source]
        error: EngineError,
        drm_bound: bool,
    },

    /// The engine host process crashed more often than the configured budget.
    #[error("Engine host process crashed {crashes} times, recovery abandoned")]
    CrashBudgetExhausted { crashes: u32, drm_bound: bool },

    /// The engine host crashed again before (re)initialization finished.
    #[error("Engine host process crashed during initialization")]
    CrashedDuringInit { drm_bound: bool },

    // ========================================================================
    // Fatal
    // ========================================================================
    #[error("Failed to read metadata: {0}")]
    Metadata(#[source] ReaderError),

    /// A reader data or seek request failed.
    #[error("Media decode error: {0}")]
    Decode(#[source] ReaderError),

    /// The reader could not wait for more data.
    #[error("Waiting for data failed: {0}")]
    WaitForData(#[source] ReaderError),

    /// Any other error reported by the engine.
    #[error("External engine error: {0}")]
    Engine(#[source] EngineError),
}

impl PlaybackError {
    /// How the owner must react to this error.
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            PlaybackError::EngineNotSupported { .. } => ErrorSeverity::Fallback,
            PlaybackError::EngineInitFailed { drm_bound, .. }
            | PlaybackError::CrashBudgetExhausted { drm_bound, .. }
            | PlaybackError::CrashedDuringInit { drm_bound } => {
                if *drm_bound {
                    ErrorSeverity::Fatal
                } else {
                    ErrorSeverity::Fallback
                }
            }
            PlaybackError::Metadata(_)
            | PlaybackError::Decode(_)
            | PlaybackError::WaitForData(_)
            | PlaybackError::Engine(_) => ErrorSeverity::Fatal,
        }
    }

    /// Returns `true` if the owner should retry with a different pipeline.
    pub fn is_fallback(&self) -> bool {
        self.severity() == ErrorSeverity::Fallback
    }

    pub fn is_fatal(&self) -> bool {
        self.severity() == ErrorSeverity::Fatal
    }

    /// Stable name used in events and structured error logs.
    pub fn name(&self) -> &'static str {
        match self.severity() {
            ErrorSeverity::Fallback => "EXTERNAL_ENGINE_NOT_SUPPORTED_ERR",
            ErrorSeverity::Fatal => match self {
                PlaybackError::EngineInitFailed { .. } => "MEDIA_ENGINE_INITIALIZATION_ERR",
                PlaybackError::CrashBudgetExhausted { .. }
                | PlaybackError::CrashedDuringInit { .. } => "REMOTE_CRASHED_ERR",
                PlaybackError::Metadata(e)
                | PlaybackError::Decode(e)
                | PlaybackError::WaitForData(e) => e.name(),
                PlaybackError::Engine(e) => e.name(),
                PlaybackError::EngineNotSupported { .. } => "EXTERNAL_ENGINE_NOT_SUPPORTED_ERR",
            },
        }
    }

    /// Native platform error code carried by engine failures.
    pub fn platform_code(&self) -> Option<i32> {
        match self {
            PlaybackError::EngineInitFailed { error, .. } | PlaybackError::Engine(error) => {
                error.platform_code()
            }
            _ => None,
        }
    }
}

/// Rejection of a seek future.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SeekError {
    /// A newer seek replaced this one before it completed.
    #[error("Seek superseded by a newer request")]
    Superseded,

    /// Next-frame and video-only seeks are not supported.
    #[error("Unsupported seek type")]
    Unsupported,

    /// The coordinator shut down or hit a fatal error.
    #[error("Seek aborted")]
    Aborted,

    /// The reader failed to reposition.
    #[error("Seek failed: {0}")]
    Failed(String),
}

/// Rejection of a DRM session binding.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DrmError {
    /// The CDM is not hosted in the engine's process.
    #[error("DRM system not supported by the external engine")]
    NotSupported,

    /// The external engine is disabled by configuration.
    #[error("DRM playback through the external engine is not allowed")]
    NotAllowed,

    /// The engine refused the CDM proxy.
    #[error("Engine rejected the CDM proxy")]
    Rejected,

    #[error("Coordinator is shut down")]
    ShutDown,

    /// Shutdown or a fatal error happened before the binding was applied.
    #[error("DRM binding aborted")]
    Aborted,
}

/// Result type for playback operations.
pub type Result<T> = std::result::Result<T, PlaybackError>;
