//! # Coordinator Configuration
//!
//! Deployment knobs for the playback coordinator: crash budget, engine policy,
//! preroll behavior and the codec allow-list used to decide whether the
//! external engine can play a given media at all.

use crate::error::DrmError;
use bridge_traits::media::{CdmProxy, MediaInfo};
use core_runtime::{Error, Result};
use serde::{Deserialize, Serialize};

/// When the external engine may be used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineMode {
    /// Never use the external engine; every media falls back.
    Disabled,
    /// Use the external engine for clear and encrypted media.
    Enabled,
    /// Use the external engine for encrypted media only.
    EncryptedOnly,
}

/// Coordinator configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    /// Engine host crashes tolerated per process before recovery is abandoned.
    ///
    /// Default: 2.
    #[serde(default = "default_max_engine_crashes")]
    pub max_engine_crashes: u32,

    /// Default: [`EngineMode::Enabled`].
    #[serde(default = "default_engine_mode")]
    pub engine_mode: EngineMode,

    /// Passed to the engine as its preload flag.
    ///
    /// Default: false.
    #[serde(default)]
    pub minimize_preroll: bool,

    /// Audio codec mime types the engine can decode.
    #[serde(default = "default_supported_audio_codecs")]
    pub supported_audio_codecs: Vec<String>,

    /// Video codec mime types the engine can decode.
    #[serde(default = "default_supported_video_codecs")]
    pub supported_video_codecs: Vec<String>,

    /// Per-subscriber capacity of the event bus created by the builder.
    ///
    /// Default: 100.
    #[serde(default = "default_event_buffer_size")]
    pub event_buffer_size: usize,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            max_engine_crashes: default_max_engine_crashes(),
            engine_mode: default_engine_mode(),
            minimize_preroll: false,
            supported_audio_codecs: default_supported_audio_codecs(),
            supported_video_codecs: default_supported_video_codecs(),
            event_buffer_size: default_event_buffer_size(),
        }
    }
}

impl CoordinatorConfig {
    pub fn with_max_engine_crashes(mut self, max: u32) -> Self {
        self.max_engine_crashes = max;
        self
    }

    pub fn with_engine_mode(mut self, mode: EngineMode) -> Self {
        self.engine_mode = mode;
        self
    }

    pub fn with_minimize_preroll(mut self, minimize: bool) -> Self {
        self.minimize_preroll = minimize;
        self
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<()> {
        if self.event_buffer_size == 0 {
            return Err(Error::Config("event_buffer_size must be > 0".to_string()));
        }

        let codecs = self
            .supported_audio_codecs
            .iter()
            .chain(self.supported_video_codecs.iter());
        for codec in codecs {
            if codec.trim().is_empty() {
                return Err(Error::Config(
                    "supported codec entries must not be empty".to_string(),
                ));
            }
        }

        Ok(())
    }

    /// Whether every selected track uses a codec from the allow-list.
    pub fn is_format_supported(&self, info: &MediaInfo) -> bool {
        if !info.has_audio() && !info.has_video() {
            return false;
        }
        let audio_ok = info.audio.as_ref().map_or(true, |audio| {
            self.supported_audio_codecs
                .iter()
                .any(|c| c.eq_ignore_ascii_case(&audio.mime_type))
        });
        let video_ok = info.video.as_ref().map_or(true, |video| {
            self.supported_video_codecs
                .iter()
                .any(|c| c.eq_ignore_ascii_case(&video.mime_type))
        });
        audio_ok && video_ok
    }

    /// Whether a CDM session can be bound to the external engine.
    ///
    /// The CDM must live inside the engine host process, and the engine must
    /// not be disabled.
    pub fn is_drm_supported(&self, proxy: &CdmProxy) -> std::result::Result<(), DrmError> {
        if !proxy.hosted_in_engine_process {
            return Err(DrmError::NotSupported);
        }
        if self.engine_mode == EngineMode::Disabled {
            return Err(DrmError::NotAllowed);
        }
        Ok(())
    }
}

// ============================================================================
// Default Functions (for serde)
// ============================================================================

fn default_max_engine_crashes() -> u32 {
    2
}

fn default_engine_mode() -> EngineMode {
    EngineMode::Enabled
}

fn default_supported_audio_codecs() -> Vec<String> {
    ["audio/mp4a-latm", "audio/aac", "audio/mpeg", "audio/opus", "audio/flac"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_supported_video_codecs() -> Vec<String> {
    ["video/avc", "video/hevc", "video/vp9", "video/av1"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_event_buffer_size() -> usize {
    core_runtime::events::DEFAULT_EVENT_BUFFER_SIZE
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_traits::media::{AudioTrackInfo, DisplaySize, VideoTrackInfo};

    fn info(audio: Option<&str>, video: Option<&str>) -> MediaInfo {
        MediaInfo {
            audio: audio.map(|mime| AudioTrackInfo {
                mime_type: mime.to_string(),
                channels: 2,
                sample_rate: 48000,
                encrypted: false,
            }),
            video: video.map(|mime| VideoTrackInfo {
                mime_type: mime.to_string(),
                image: DisplaySize::new(1280, 720),
                display: DisplaySize::new(1280, 720),
                encrypted: false,
            }),
            ..Default::default()
        }
    }

    #[test]
    fn test_default_config() {
        let config = CoordinatorConfig::default();
        assert_eq!(config.max_engine_crashes, 2);
        assert_eq!(config.engine_mode, EngineMode::Enabled);
        assert!(!config.minimize_preroll);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation() {
        let mut config = CoordinatorConfig::default();
        config.event_buffer_size = 0;
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        let mut config = CoordinatorConfig::default();
        config.supported_video_codecs.push("  ".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_format_support() {
        let config = CoordinatorConfig::default();
        assert!(config.is_format_supported(&info(Some("audio/aac"), Some("video/avc"))));
        assert!(config.is_format_supported(&info(Some("audio/opus"), None)));
        assert!(!config.is_format_supported(&info(Some("audio/aac"), Some("video/theora"))));
        assert!(!config.is_format_supported(&info(None, None)));
    }

    #[test]
    fn test_drm_support() {
        let config = CoordinatorConfig::default();
        assert_eq!(
            config.is_drm_supported(&CdmProxy::new("com.example.drm", true)),
            Ok(())
        );
        assert_eq!(
            config.is_drm_supported(&CdmProxy::new("com.example.drm", false)),
            Err(DrmError::NotSupported)
        );

        let disabled = CoordinatorConfig::default().with_engine_mode(EngineMode::Disabled);
        assert_eq!(
            disabled.is_drm_supported(&CdmProxy::new("com.example.drm", true)),
            Err(DrmError::NotAllowed)
        );
    }

    #[test]
    fn test_serde_defaults() {
        let config: CoordinatorConfig =
            serde_json::from_str(r#"{"engine_mode":"encrypted_only"}"#).unwrap();
        assert_eq!(config.engine_mode, EngineMode::EncryptedOnly);
        assert_eq!(config.max_engine_crashes, 2);
        assert_eq!(config.event_buffer_size, 100);
    }
}
