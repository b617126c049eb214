//! Configuration error types

use thiserror::Error;

/// Errors that can occur during configuration loading
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration loading failed: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Validation failed: {0}")]
    ValidationFailed(#[from] ValidationError),
}

/// Errors that can occur during configuration validation
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Required configuration missing: {0}")]
    MissingRequired(&'static str),

    #[error("Invalid port number")]
    InvalidPort,

    #[error("Invalid request timeout")]
    InvalidTimeout,

    #[error("Invalid database URL format")]
    InvalidDatabaseUrl,

    #[error("Invalid Redis URL format")]
    InvalidRedisUrl,

    #[error("Pool min_connections exceeds max_connections")]
    InvalidPoolSize,

    #[error("Pool size exceeds maximum allowed (100)")]
    PoolSizeTooLarge,

    #[error("Session secret must be at least 32 characters")]
    SessionSecretTooShort,

    #[error("Auth provider URL must use HTTPS in production")]
    AuthProviderMustBeHttps,

    #[error("Invalid model provider base URL")]
    InvalidProviderUrl,

    #[error("max_steps must be between 1 and 20")]
    InvalidStepLimit,

    #[error("Stream buffer TTL must be positive")]
    InvalidBufferTtl,

    #[error("Daily message quota must be positive")]
    InvalidMessageQuota,
}
