//! Feature flags configuration

use serde::Deserialize;

use super::error::ValidationError;

/// Feature flags for enabling/disabling functionality
#[derive(Debug, Clone, Deserialize)]
pub struct FeatureFlags {
    /// Maximum user messages per user in a rolling 24h window. Unset disables the check.
    #[serde(default)]
    pub daily_message_quota: Option<u32>,

    /// Forward reasoning deltas to clients
    #[serde(default = "default_send_reasoning")]
    pub send_reasoning: bool,
}

impl FeatureFlags {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.daily_message_quota == Some(0) {
            return Err(ValidationError::InvalidMessageQuota);
        }
        Ok(())
    }
}

impl Default for FeatureFlags {
    fn default() -> Self {
        Self {
            daily_message_quota: None,
            send_reasoning: default_send_reasoning(),
        }
    }
}

fn default_send_reasoning() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feature_flags_defaults() {
        let flags = FeatureFlags::default();
        assert!(flags.daily_message_quota.is_none());
        assert!(flags.send_reasoning);
    }

    #[test]
    fn test_feature_flags_deserialization() {
        let json = r#"{ "daily_message_quota": 100, "send_reasoning": false }"#;

        let flags: FeatureFlags = serde_json::from_str(json).unwrap();
        assert_eq!(flags.daily_message_quota, Some(100));
        assert!(!flags.send_reasoning);
    }

    #[test]
    fn test_zero_quota_is_invalid() {
        let flags = FeatureFlags {
            daily_message_quota: Some(0),
            ..Default::default()
        };
        assert!(flags.validate().is_err());
    }
}
