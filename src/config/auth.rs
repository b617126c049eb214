//! Session provider configuration

use serde::Deserialize;

use super::error::ValidationError;
use super::server::Environment;

/// Session provider configuration
///
/// Sessions are issued by an external auth service that shares this
/// database. The service signs its session cookie with `secret`.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// Secret used by the session provider to sign cookies
    pub secret: String,

    /// Name of the session cookie
    #[serde(default = "default_cookie_name")]
    pub session_cookie_name: String,

    /// Base URL of the session provider, target of `/api/auth/*`
    pub provider_url: Option<String>,
}

impl AuthConfig {
    /// Cookie names accepted for the session token.
    ///
    /// Secure deployments prefix the cookie with `__Secure-`; that name is
    /// checked first.
    pub fn cookie_names(&self) -> [String; 2] {
        [
            format!("__Secure-{}", self.session_cookie_name),
            self.session_cookie_name.clone(),
        ]
    }

    /// Validate authentication configuration
    ///
    /// In production, requires HTTPS for the provider URL.
    pub fn validate(&self, environment: &Environment) -> Result<(), ValidationError> {
        if self.secret.is_empty() {
            return Err(ValidationError::MissingRequired("AUTH_SECRET"));
        }
        if self.secret.len() < 32 {
            return Err(ValidationError::SessionSecretTooShort);
        }
        if let Some(url) = &self.provider_url {
            if *environment == Environment::Production && !url.starts_with("https://") {
                return Err(ValidationError::AuthProviderMustBeHttps);
            }
        }
        Ok(())
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            secret: String::new(),
            session_cookie_name: default_cookie_name(),
            provider_url: None,
        }
    }
}

fn default_cookie_name() -> String {
    "better-auth.session_token".to_string()
}
