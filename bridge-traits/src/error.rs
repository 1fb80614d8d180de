use crate::media::TrackType;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Bridge capability not available: {0}")]
    NotAvailable(String),

    #[error("Bridge operation failed: {0}")]
    OperationFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, BridgeError>;

/// Failure reported by a [`MediaReader`](crate::reader::MediaReader) request.
///
/// The first four variants are part of normal operation and are handled by the
/// coordinator without surfacing an error to the owner.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReaderError {
    /// The demuxer has no data buffered yet for this track.
    #[error("Waiting for data")]
    WaitingForData,

    /// No more samples for this track.
    #[error("End of stream")]
    EndOfStream,

    /// The request was superseded (e.g. by a reset) and can be re-issued.
    #[error("Request canceled")]
    Canceled,

    /// The remote decoder lives in the engine host process, which crashed.
    #[error("Remote decoder process crashed")]
    RemoteCrashed,

    /// Metadata could not be parsed or the container is broken.
    #[error("Demux error: {0}")]
    Demux(String),

    /// A sample failed to decode.
    #[error("Decode error: {0}")]
    Decode(String),

    /// The reader was shut down while the request was outstanding.
    #[error("Reader aborted")]
    Aborted,
}

impl ReaderError {
    /// Short, stable name used in structured logs.
    pub fn name(&self) -> &'static str {
        match self {
            ReaderError::WaitingForData => "WAITING_FOR_DATA",
            ReaderError::EndOfStream => "END_OF_STREAM",
            ReaderError::Canceled => "CANCELED",
            ReaderError::RemoteCrashed => "REMOTE_CRASHED",
            ReaderError::Demux(_) => "DEMUX_ERR",
            ReaderError::Decode(_) => "DECODE_ERR",
            ReaderError::Aborted => "ABORT_ERR",
        }
    }
}

/// Reader seek failure, tagged with the track that rejected the seek.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Seek rejected on {track} track: {error}")]
pub struct SeekRejection {
    pub track: TrackType,
    pub error: ReaderError,
}

impl SeekRejection {
    pub fn new(track: TrackType, error: ReaderError) -> Self {
        Self { track, error }
    }
}

/// Failure reported by a [`PlaybackEngine`](crate::engine::PlaybackEngine).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// The engine cannot play this content or configuration.
    #[error("Not supported by the external engine: {0}")]
    NotSupported(String),

    /// Engine session setup failed.
    #[error("Engine initialization failed: {0}")]
    InitializationFailed(String),

    /// The process hosting the engine died.
    #[error("Engine host process crashed")]
    HostProcessCrashed,

    /// Platform-level failure with an optional native error code (e.g. HRESULT).
    #[error("Engine platform error: {message}")]
    Platform {
        message: String,
        platform_code: Option<i32>,
    },
}

impl EngineError {
    pub fn name(&self) -> &'static str {
        match self {
            EngineError::NotSupported(_) => "NOT_SUPPORTED_ERR",
            EngineError::InitializationFailed(_) => "MEDIA_ENGINE_INITIALIZATION_ERR",
            EngineError::HostProcessCrashed => "REMOTE_CRASHED_ERR",
            EngineError::Platform { .. } => "PLATFORM_ERR",
        }
    }

    pub fn platform_code(&self) -> Option<i32> {
        match self {
            EngineError::Platform { platform_code, .. } => *platform_code,
            _ => None,
        }
    }
}
