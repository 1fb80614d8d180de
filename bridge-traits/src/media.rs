//! Media Data Model
//!
//! Types shared between the coordinator and its Reader / Engine adapters:
//! track descriptions produced by metadata reading, seek targets, demuxed
//! samples and DRM binding descriptors.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Elementary stream kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackType {
    Audio,
    Video,
}

impl TrackType {
    pub const ALL: [TrackType; 2] = [TrackType::Audio, TrackType::Video];

    pub fn as_str(&self) -> &'static str {
        match self {
            TrackType::Audio => "audio",
            TrackType::Video => "video",
        }
    }
}

impl fmt::Display for TrackType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Set of track types, used for decoder resets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackSet {
    pub audio: bool,
    pub video: bool,
}

impl TrackSet {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn contains(&self, track: TrackType) -> bool {
        match track {
            TrackType::Audio => self.audio,
            TrackType::Video => self.video,
        }
    }

    pub fn insert(&mut self, track: TrackType) {
        match track {
            TrackType::Audio => self.audio = true,
            TrackType::Video => self.video = true,
        }
    }

    pub fn is_empty(&self) -> bool {
        !self.audio && !self.video
    }

    pub fn iter(&self) -> impl Iterator<Item = TrackType> + '_ {
        TrackType::ALL.into_iter().filter(|t| self.contains(*t))
    }
}

impl FromIterator<TrackType> for TrackSet {
    fn from_iter<I: IntoIterator<Item = TrackType>>(iter: I) -> Self {
        let mut set = TrackSet::empty();
        for track in iter {
            set.insert(track);
        }
        set
    }
}

/// Picture or display size in pixels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplaySize {
    pub width: u32,
    pub height: u32,
}

impl DisplaySize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioTrackInfo {
    /// Codec mime type, e.g. `audio/mp4a-latm`
    pub mime_type: String,
    pub channels: u32,
    pub sample_rate: u32,
    pub encrypted: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoTrackInfo {
    /// Codec mime type, e.g. `video/avc`
    pub mime_type: String,
    /// Coded picture size
    pub image: DisplaySize,
    /// Size the picture should be presented at
    pub display: DisplaySize,
    pub encrypted: bool,
}

/// Description of the selected tracks, produced once by metadata reading.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaInfo {
    pub audio: Option<AudioTrackInfo>,
    pub video: Option<VideoTrackInfo>,
    /// Duration declared by the container, if any
    pub metadata_duration: Option<Duration>,
    /// End time of the last demuxed sample before start-time adjustment
    pub unadjusted_end_time: Option<Duration>,
    pub start_time: Duration,
    pub seekable: bool,
}

impl MediaInfo {
    pub fn has_audio(&self) -> bool {
        self.audio.is_some()
    }

    pub fn has_video(&self) -> bool {
        self.video.is_some()
    }

    pub fn has_track(&self, track: TrackType) -> bool {
        match track {
            TrackType::Audio => self.has_audio(),
            TrackType::Video => self.has_video(),
        }
    }

    /// True when any selected track is encrypted.
    pub fn is_encrypted(&self) -> bool {
        self.audio.as_ref().is_some_and(|a| a.encrypted)
            || self.video.as_ref().is_some_and(|v| v.encrypted)
    }

    /// Tracks present in this media.
    pub fn tracks(&self) -> TrackSet {
        TrackType::ALL
            .into_iter()
            .filter(|t| self.has_track(*t))
            .collect()
    }
}

/// Total media duration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MediaDuration {
    Finite(Duration),
    /// Live or unknown length
    Infinite,
}

impl MediaDuration {
    pub fn as_finite(&self) -> Option<Duration> {
        match self {
            MediaDuration::Finite(d) => Some(*d),
            MediaDuration::Infinite => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SeekKind {
    /// Land exactly on the requested time
    Accurate,
    /// Step to the next decodable frame
    NextFrame,
}

/// Requested seek position and accuracy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeekTarget {
    pub time: Duration,
    pub kind: SeekKind,
    /// Seek only the video track (used by some track-switching paths)
    pub video_only: bool,
}

impl SeekTarget {
    pub fn accurate(time: Duration) -> Self {
        Self {
            time,
            kind: SeekKind::Accurate,
            video_only: false,
        }
    }

    pub fn next_frame(time: Duration) -> Self {
        Self {
            time,
            kind: SeekKind::NextFrame,
            video_only: false,
        }
    }

    pub fn with_video_only(mut self, video_only: bool) -> Self {
        self.video_only = video_only;
        self
    }

    pub fn is_accurate(&self) -> bool {
        self.kind == SeekKind::Accurate
    }
}

/// Demuxed audio sample.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioSample {
    pub time: Duration,
    pub duration: Duration,
    pub keyframe: bool,
    pub data: Bytes,
}

/// Demuxed video sample.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoSample {
    pub time: Duration,
    pub duration: Duration,
    pub keyframe: bool,
    pub data: Bytes,
}

/// A sample of either track, as pushed to the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaSample {
    Audio(AudioSample),
    Video(VideoSample),
}

impl MediaSample {
    pub fn track(&self) -> TrackType {
        match self {
            MediaSample::Audio(_) => TrackType::Audio,
            MediaSample::Video(_) => TrackType::Video,
        }
    }

    pub fn time(&self) -> Duration {
        match self {
            MediaSample::Audio(s) => s.time,
            MediaSample::Video(s) => s.time,
        }
    }
}

/// Handle to a content-decryption-module session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CdmProxy {
    /// e.g. `com.microsoft.playready.recommendation`
    pub key_system: String,
    /// Whether the CDM runs inside the engine host process
    pub hosted_in_engine_process: bool,
}

impl CdmProxy {
    pub fn new(key_system: impl Into<String>, hosted_in_engine_process: bool) -> Self {
        Self {
            key_system: key_system.into(),
            hosted_in_engine_process,
        }
    }
}

/// Flags passed to [`PlaybackEngine::init`](crate::engine::PlaybackEngine::init).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitFlags {
    /// Preload data before playback starts (inverse of preroll minimisation)
    pub should_preload: bool,
    /// Content is encrypted with a custom identity scheme
    pub encrypted_custom_ident: bool,
}
