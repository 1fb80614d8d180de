//! Reader Adapter
//!
//! Pull-based source of demuxed samples. The coordinator issues at most one
//! outstanding data request per track and only when the engine asks for more.

use async_trait::async_trait;
use std::time::Duration;

use crate::error::{ReaderError, SeekRejection};
use crate::media::{AudioSample, MediaInfo, SeekTarget, TrackSet, TrackType, VideoSample};

/// Local demux/decode pipeline consumed by the coordinator.
///
/// Futures returned by the async methods may be dropped at any time; a dropped
/// request must not leave the reader in a state that prevents the next one.
///
/// # Example
///
/// ```ignore
/// use bridge_traits::reader::MediaReader;
///
/// async fn first_audio(reader: &dyn MediaReader) {
///     match reader.request_audio_data().await {
///         Ok(sample) => println!("audio at {:?}", sample.time),
///         Err(e) => println!("no audio: {}", e),
///     }
/// }
/// ```
#[async_trait]
pub trait MediaReader: Send + Sync {
    /// Read container metadata and select tracks.
    async fn read_metadata(&self) -> Result<MediaInfo, ReaderError>;

    async fn request_audio_data(&self) -> Result<AudioSample, ReaderError>;

    /// Request the next video sample, skipping samples before `threshold`
    /// where the decoder allows it.
    async fn request_video_data(&self, threshold: Duration) -> Result<VideoSample, ReaderError>;

    /// Reposition the demux cursor. Resolves with the actual position.
    async fn seek(&self, target: SeekTarget) -> Result<Duration, SeekRejection>;

    /// Resolve once data is available again for `track`.
    async fn wait_for_data(&self, track: TrackType) -> Result<TrackType, ReaderError>;

    /// Flush in-flight decode state for the given tracks.
    fn reset_decode(&self, tracks: TrackSet);

    /// Drop decoder handles that live in the engine host process.
    fn release_resources(&self);

    async fn shutdown(&self);

    fn is_encrypted_custom_ident(&self) -> bool {
        false
    }

    fn set_encrypted_custom_ident(&self) {}

    /// Called with the engine id after each successful engine init.
    fn update_media_engine_id(&self, _engine_id: u64) {}
}
