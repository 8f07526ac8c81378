//! Configuration types and defaults

use framesync_media::{
    MediaError, MediaResult, MediaStreamParams, SessionOptions, TimestampPolicy, VideoClockPacer,
};
use serde::{Deserialize, Serialize};

/// Global framesync configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GlobalConfig {
    /// Install a `tracing` subscriber on init
    pub debug_logging: bool,
    /// Filter directive for the subscriber (`RUST_LOG` overrides it)
    pub log_filter: String,
    /// Stream parameters used when a session config does not override them
    pub default_params: MediaStreamParams,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            debug_logging: false,
            log_filter: "info".to_string(),
            default_params: MediaStreamParams::default(),
        }
    }
}

impl GlobalConfig {
    /// Enable or disable logging setup
    pub fn with_debug_logging(mut self, enabled: bool) -> Self {
        self.debug_logging = enabled;
        self
    }

    /// Set the log filter directive
    pub fn with_log_filter(mut self, filter: impl Into<String>) -> Self {
        self.log_filter = filter.into();
        self
    }

    /// Set the default stream parameters
    pub fn with_default_params(mut self, params: MediaStreamParams) -> Self {
        self.default_params = params;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> MediaResult<()> {
        if self.debug_logging && self.log_filter.trim().is_empty() {
            return Err(MediaError::InvalidConfiguration {
                message: "log_filter must not be empty when debug_logging is enabled".to_string(),
            });
        }
        self.default_params.validate()
    }

    /// Parse from JSON
    pub fn from_json(json: &str) -> MediaResult<Self> {
        serde_json::from_str(json).map_err(json_error)
    }

    /// Serialize to JSON
    pub fn to_json(&self) -> MediaResult<String> {
        serde_json::to_string_pretty(self).map_err(json_error)
    }
}

/// Session-specific configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Stream parameters
    pub params: MediaStreamParams,
    /// Video timestamp source
    pub policy: TimestampPolicy,
    /// Duration of one audio unit in milliseconds
    pub audio_unit_ms: u64,
    /// Bytes per raw audio unit in encode mode
    pub audio_unit_bytes: usize,
    /// Largest logical unit accepted from the wire
    pub max_unit_size: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        let options = SessionOptions::default();
        Self {
            params: MediaStreamParams::default(),
            policy: options.policy,
            audio_unit_ms: VideoClockPacer::DEFAULT_UNIT_MS,
            audio_unit_bytes: options.audio_unit_bytes,
            max_unit_size: options.reassembler.max_unit_size,
        }
    }
}

impl SessionConfig {
    /// Create a session config around the given parameters
    pub fn new(params: MediaStreamParams) -> Self {
        Self {
            params,
            ..Default::default()
        }
    }

    /// Set the video timestamp source
    pub fn with_policy(mut self, policy: TimestampPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Set the audio unit geometry
    pub fn with_audio_unit(mut self, unit_ms: u64, unit_bytes: usize) -> Self {
        self.audio_unit_ms = unit_ms;
        self.audio_unit_bytes = unit_bytes;
        self
    }

    /// Set the largest accepted logical unit
    pub fn with_max_unit_size(mut self, max_unit_size: usize) -> Self {
        self.max_unit_size = max_unit_size;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> MediaResult<()> {
        self.params.validate()?;
        if self.audio_unit_ms == 0 || self.audio_unit_bytes == 0 {
            return Err(MediaError::InvalidConfiguration {
                message: format!(
                    "audio unit must be non-empty, got {}ms / {} bytes",
                    self.audio_unit_ms, self.audio_unit_bytes
                ),
            });
        }
        if self.max_unit_size == 0 {
            return Err(MediaError::InvalidConfiguration {
                message: "max_unit_size must be positive".to_string(),
            });
        }
        Ok(())
    }

    /// Session options with this config applied
    pub fn to_options(&self) -> SessionOptions {
        SessionOptions::default()
            .with_policy(self.policy)
            .with_audio_unit_ms(self.audio_unit_ms)
            .with_audio_unit_bytes(self.audio_unit_bytes)
            .with_max_unit_size(self.max_unit_size)
    }

    /// Parse from JSON
    pub fn from_json(json: &str) -> MediaResult<Self> {
        serde_json::from_str(json).map_err(json_error)
    }

    /// Serialize to JSON
    pub fn to_json(&self) -> MediaResult<String> {
        serde_json::to_string_pretty(self).map_err(json_error)
    }
}

fn json_error(error: serde_json::Error) -> MediaError {
    MediaError::InvalidConfiguration {
        message: format!("invalid JSON configuration: {}", error),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        assert!(GlobalConfig::default().validate().is_ok());
        let config = SessionConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.audio_unit_ms, 125);
        assert_eq!(config.audio_unit_bytes, 2048);
        assert_eq!(config.policy, TimestampPolicy::RemoteClock);
    }

    #[test]
    fn test_invalid_configs() {
        let config = GlobalConfig::default()
            .with_debug_logging(true)
            .with_log_filter("  ");
        assert!(config.validate().is_err());

        assert!(SessionConfig::default()
            .with_audio_unit(0, 2048)
            .validate()
            .is_err());
        assert!(SessionConfig::default()
            .with_max_unit_size(0)
            .validate()
            .is_err());
    }

    #[test]
    fn test_partial_json() {
        let config = SessionConfig::from_json(r#"{"policy": "frame_index", "audio_unit_ms": 20}"#)
            .unwrap();
        assert_eq!(config.policy, TimestampPolicy::FrameIndex);
        assert_eq!(config.audio_unit_ms, 20);
        assert_eq!(config.audio_unit_bytes, 2048);

        let round_trip = SessionConfig::from_json(&config.to_json().unwrap()).unwrap();
        assert_eq!(round_trip, config);

        assert!(matches!(
            GlobalConfig::from_json("{not json"),
            Err(MediaError::InvalidConfiguration { .. })
        ));
    }

    #[test]
    fn test_options_carry_config() {
        let options = SessionConfig::default()
            .with_policy(TimestampPolicy::LocalClock)
            .with_max_unit_size(1024)
            .to_options();
        assert_eq!(options.policy, TimestampPolicy::LocalClock);
        assert_eq!(options.reassembler.max_unit_size, 1024);
    }
}
