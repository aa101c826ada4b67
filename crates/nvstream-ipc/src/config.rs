//! Session configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{CodecFamily, QualityTier};

/// Highest accepted frame rate.
pub const MAX_FPS: u32 = 240;

/// Errors raised while loading or validating a [`SessionConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("Failed to read configuration: {0}")]
    Io(#[from] std::io::Error),

    /// The configuration is not valid JSON for this schema.
    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),

    /// A field holds an unusable value.
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Configuration for one capture session.
///
/// Frame geometry is not configured here; it comes from the frame source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Where the muxer writes (file path or any URL the container accepts).
    pub output_url: String,

    /// Container format name. `None` guesses it from the URL.
    pub output_format: Option<String>,

    /// Encoding quality tier.
    pub quality: QualityTier,

    /// Video codec family.
    pub codec: CodecFamily,

    /// Target frames per second.
    pub fps: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            output_url: "capture.mp4".to_string(),
            output_format: None,
            quality: QualityTier::Medium,
            codec: CodecFamily::Avc,
            fps: 60,
        }
    }
}

impl SessionConfig {
    /// Parse and validate a JSON document. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Check that every field is usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.output_url.trim().is_empty() {
            return Err(ConfigError::Invalid("output_url is empty".into()));
        }
        if self.fps == 0 || self.fps > MAX_FPS {
            return Err(ConfigError::Invalid(format!(
                "fps must be between 1 and {MAX_FPS}, got {}",
                self.fps
            )));
        }
        if let Some(format) = &self.output_format {
            if format.trim().is_empty() {
                return Err(ConfigError::Invalid("output_format is empty".into()));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = SessionConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.quality, QualityTier::Medium);
        assert_eq!(config.codec, CodecFamily::Avc);
        assert_eq!(config.fps, 60);
    }

    #[test]
    fn test_from_json_fills_missing_fields() {
        let config =
            SessionConfig::from_json(r#"{ "quality": "high", "codec": "hevc", "fps": 30 }"#)
                .unwrap();

        assert_eq!(config.quality, QualityTier::High);
        assert_eq!(config.codec, CodecFamily::Hevc);
        assert_eq!(config.fps, 30);
        assert_eq!(config.output_url, "capture.mp4");
        assert_eq!(config.output_format, None);
    }

    #[test]
    fn test_from_json_rejects_zero_fps() {
        let err = SessionConfig::from_json(r#"{ "fps": 0 }"#).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_from_json_rejects_unknown_tier() {
        let err = SessionConfig::from_json(r#"{ "quality": "ultra" }"#).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_validate_rejects_blank_url() {
        let config = SessionConfig {
            output_url: "  ".into(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_reads_file() {
        let path = std::env::temp_dir().join(format!(
            "nvstream-config-{}.json",
            std::process::id()
        ));
        std::fs::write(
            &path,
            r#"{ "output_url": "out.mkv", "output_format": "matroska" }"#,
        )
        .unwrap();

        let config = SessionConfig::load(&path).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(config.output_url, "out.mkv");
        assert_eq!(config.output_format.as_deref(), Some("matroska"));
    }

    #[test]
    fn test_load_missing_file() {
        let err = SessionConfig::load("/nonexistent/nvstream.json").unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
