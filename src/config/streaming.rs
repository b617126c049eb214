//! Stream delivery and resumption configuration

use serde::Deserialize;
use std::time::Duration;

use super::error::ValidationError;

/// Where emitted stream frames are buffered for resumption.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ResumableBackend {
    /// Shared buffer in Redis; survives across server instances.
    Redis,
    /// Buffer inside this process only.
    #[default]
    Memory,
    /// No buffering; reconnecting clients re-fetch persisted messages.
    Disabled,
}

/// Stream delivery configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StreamingConfig {
    /// Resumable stream backend
    #[serde(default)]
    pub resumable: ResumableBackend,

    /// How long buffered frames are kept after the last write, in seconds
    #[serde(default = "default_buffer_ttl")]
    pub buffer_ttl_secs: u64,

    /// Poll interval while following a live stream from Redis, in milliseconds
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    /// Delay between smoothed word chunks, in milliseconds (0 disables)
    #[serde(default = "default_smoothing_delay")]
    pub smoothing_delay_ms: u64,

    /// Maximum model steps per invocation
    #[serde(default = "default_max_steps")]
    pub max_steps: u32,
}

impl StreamingConfig {
    pub fn buffer_ttl(&self) -> Duration {
        Duration::from_secs(self.buffer_ttl_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn smoothing_delay(&self) -> Duration {
        Duration::from_millis(self.smoothing_delay_ms)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.max_steps == 0 || self.max_steps > 20 {
            return Err(ValidationError::InvalidStepLimit);
        }
        if self.buffer_ttl_secs == 0 {
            return Err(ValidationError::InvalidBufferTtl);
        }
        Ok(())
    }
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            resumable: ResumableBackend::default(),
            buffer_ttl_secs: default_buffer_ttl(),
            poll_interval_ms: default_poll_interval(),
            smoothing_delay_ms: default_smoothing_delay(),
            max_steps: default_max_steps(),
        }
    }
}

fn default_buffer_ttl() -> u64 {
    600
}

fn default_poll_interval() -> u64 {
    100
}

fn default_smoothing_delay() -> u64 {
    10
}

fn default_max_steps() -> u32 {
    5
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_streaming_defaults() {
        let config = StreamingConfig::default();
        assert_eq!(config.resumable, ResumableBackend::Memory);
        assert_eq!(config.max_steps, 5);
        assert_eq!(config.smoothing_delay(), Duration::from_millis(10));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_step_limit_bounds() {
        let config = StreamingConfig {
            max_steps: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ValidationError::InvalidStepLimit)));

        let config = StreamingConfig {
            max_steps: 21,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_backend_deserialization() {
        let config: StreamingConfig =
            serde_json::from_str(r#"{ "resumable": "disabled" }"#).unwrap();
        assert_eq!(config.resumable, ResumableBackend::Disabled);
    }
}
