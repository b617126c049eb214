//! Redis connection used by the resumable stream buffer.

use serde::Deserialize;
use std::time::Duration;

use super::error::ValidationError;

/// Only needed when `streaming.resumable = "redis"`.
#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    /// `redis://` or `rediss://` URL.
    pub url: String,

    /// Seconds allowed for the initial multiplexed connection.
    #[serde(default = "default_connect_timeout")]
    pub timeout_secs: u64,

    /// Namespace for stream keys, e.g. `<prefix>:stream:<id>:frames`.
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
}

impl RedisConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.url.is_empty() {
            return Err(ValidationError::MissingRequired("REDIS_URL"));
        }
        let scheme = self.url.split_once("://").map(|(scheme, _)| scheme);
        if !matches!(scheme, Some("redis" | "rediss")) {
            return Err(ValidationError::InvalidRedisUrl);
        }
        Ok(())
    }
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            timeout_secs: default_connect_timeout(),
            key_prefix: default_key_prefix(),
        }
    }
}

fn default_connect_timeout() -> u64 {
    5
}

fn default_key_prefix() -> String {
    "chat-relay".to_string()
}
