//! Error types for the domain layer.
//!
//! Every error that reaches a client carries an [`ErrorCode`] of the form
//! `category:subject`, e.g. `forbidden:chat`. The category decides the HTTP
//! status; the subject decides the user-facing message and whether the
//! cause may be shown.

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Errors that occur during value object construction.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Field '{field}' cannot be empty")]
    EmptyField { field: String },

    #[error("Field '{field}' must be at most {max}, got {actual}")]
    TooLong {
        field: String,
        max: usize,
        actual: usize,
    },

    #[error("Field '{field}' has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },
}

impl ValidationError {
    /// Creates an empty field validation error.
    pub fn empty_field(field: impl Into<String>) -> Self {
        ValidationError::EmptyField { field: field.into() }
    }

    /// Creates a length validation error.
    pub fn too_long(field: impl Into<String>, max: usize, actual: usize) -> Self {
        ValidationError::TooLong {
            field: field.into(),
            max,
            actual,
        }
    }

    /// Creates an invalid format validation error.
    pub fn invalid_format(field: impl Into<String>, reason: impl Into<String>) -> Self {
        ValidationError::InvalidFormat {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Error category; determines the HTTP status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    BadRequest,
    Unauthorized,
    Forbidden,
    NotFound,
    RateLimit,
    Offline,
}

impl ErrorKind {
    /// HTTP status code for this category.
    pub fn status_code(&self) -> u16 {
        match self {
            ErrorKind::BadRequest => 400,
            ErrorKind::Unauthorized => 401,
            ErrorKind::Forbidden => 403,
            ErrorKind::NotFound => 404,
            ErrorKind::RateLimit => 429,
            ErrorKind::Offline => 503,
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::BadRequest => "bad_request",
            ErrorKind::Unauthorized => "unauthorized",
            ErrorKind::Forbidden => "forbidden",
            ErrorKind::NotFound => "not_found",
            ErrorKind::RateLimit => "rate_limit",
            ErrorKind::Offline => "offline",
        }
    }
}

/// Error subject; the part of the system the error is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Surface {
    Chat,
    Auth,
    Api,
    Stream,
    Database,
    History,
    ActivateGateway,
}

impl Surface {
    fn as_str(&self) -> &'static str {
        match self {
            Surface::Chat => "chat",
            Surface::Auth => "auth",
            Surface::Api => "api",
            Surface::Stream => "stream",
            Surface::Database => "database",
            Surface::History => "history",
            Surface::ActivateGateway => "activate_gateway",
        }
    }

    /// Whether the cause of an error on this surface may be sent to clients.
    pub fn exposes_cause(&self) -> bool {
        !matches!(self, Surface::Database)
    }
}

/// Stable `category:subject` error code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ErrorCode {
    pub kind: ErrorKind,
    pub surface: Surface,
}

impl ErrorCode {
    pub const fn new(kind: ErrorKind, surface: Surface) -> Self {
        Self { kind, surface }
    }

    pub const BAD_REQUEST_API: ErrorCode = ErrorCode::new(ErrorKind::BadRequest, Surface::Api);
    pub const BAD_REQUEST_DATABASE: ErrorCode =
        ErrorCode::new(ErrorKind::BadRequest, Surface::Database);
    pub const ACTIVATE_GATEWAY: ErrorCode =
        ErrorCode::new(ErrorKind::BadRequest, Surface::ActivateGateway);
    pub const UNAUTHORIZED_CHAT: ErrorCode = ErrorCode::new(ErrorKind::Unauthorized, Surface::Chat);
    pub const FORBIDDEN_CHAT: ErrorCode = ErrorCode::new(ErrorKind::Forbidden, Surface::Chat);
    pub const NOT_FOUND_CHAT: ErrorCode = ErrorCode::new(ErrorKind::NotFound, Surface::Chat);
    pub const NOT_FOUND_STREAM: ErrorCode = ErrorCode::new(ErrorKind::NotFound, Surface::Stream);
    pub const RATE_LIMIT_CHAT: ErrorCode = ErrorCode::new(ErrorKind::RateLimit, Surface::Chat);
    pub const OFFLINE_CHAT: ErrorCode = ErrorCode::new(ErrorKind::Offline, Surface::Chat);
    pub const OFFLINE_AUTH: ErrorCode = ErrorCode::new(ErrorKind::Offline, Surface::Auth);

    /// HTTP status code derived from the category.
    pub fn status_code(&self) -> u16 {
        self.kind.status_code()
    }

    /// User-facing message for this code.
    pub fn message(&self) -> &'static str {
        if self.surface == Surface::Database {
            return "An error occurred while executing a database query.";
        }

        match (self.kind, self.surface) {
            (ErrorKind::BadRequest, Surface::Api) => {
                "The request couldn't be processed. Please check your input and try again."
            }
            (ErrorKind::BadRequest, Surface::ActivateGateway) => {
                "The AI provider requires a valid payment method on file before it can service requests."
            }
            (ErrorKind::Unauthorized, Surface::Auth) => "You need to sign in before continuing.",
            (ErrorKind::Forbidden, Surface::Auth) => {
                "Your account does not have access to this feature."
            }
            (ErrorKind::Offline, Surface::Auth) => {
                "The sign-in service is unavailable. Please try again later."
            }
            (ErrorKind::RateLimit, Surface::Chat) => {
                "You have exceeded your maximum number of messages for the day. Please try again later."
            }
            (ErrorKind::NotFound, Surface::Chat) => {
                "The requested chat was not found. Please check the chat ID and try again."
            }
            (ErrorKind::Forbidden, Surface::Chat) => {
                "This chat belongs to another user. Please check the chat ID and try again."
            }
            (ErrorKind::Unauthorized, Surface::Chat) => {
                "You need to sign in to view this chat. Please sign in and try again."
            }
            (ErrorKind::Offline, Surface::Chat) => {
                "We're having trouble sending your message. Please check your internet connection and try again."
            }
            (ErrorKind::NotFound, Surface::Stream) => {
                "There is no stream to resume for this chat."
            }
            _ => "Something went wrong. Please try again later.",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind.as_str(), self.surface.as_str())
    }
}

impl FromStr for ErrorCode {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (kind, surface) = s
            .split_once(':')
            .ok_or_else(|| ValidationError::invalid_format("error_code", "missing ':'"))?;

        let kind = match kind {
            "bad_request" => ErrorKind::BadRequest,
            "unauthorized" => ErrorKind::Unauthorized,
            "forbidden" => ErrorKind::Forbidden,
            "not_found" => ErrorKind::NotFound,
            "rate_limit" => ErrorKind::RateLimit,
            "offline" => ErrorKind::Offline,
            other => {
                return Err(ValidationError::invalid_format(
                    "error_code",
                    format!("unknown category '{}'", other),
                ))
            }
        };
        let surface = match surface {
            "chat" => Surface::Chat,
            "auth" => Surface::Auth,
            "api" => Surface::Api,
            "stream" => Surface::Stream,
            "database" => Surface::Database,
            "history" => Surface::History,
            "activate_gateway" => Surface::ActivateGateway,
            other => {
                return Err(ValidationError::invalid_format(
                    "error_code",
                    format!("unknown subject '{}'", other),
                ))
            }
        };

        Ok(ErrorCode::new(kind, surface))
    }
}

/// Application error carrying a stable code and an optional cause.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("[{code}] {}", .cause.as_deref().unwrap_or_else(|| .code.message()))]
pub struct DomainError {
    pub code: ErrorCode,
    pub cause: Option<String>,
}

impl DomainError {
    /// Creates an error without a cause.
    pub fn new(code: ErrorCode) -> Self {
        Self { code, cause: None }
    }

    /// Creates an error with a cause.
    pub fn with_cause(code: ErrorCode, cause: impl Into<String>) -> Self {
        Self {
            code,
            cause: Some(cause.into()),
        }
    }

    /// Malformed request input.
    pub fn bad_request(cause: impl Into<String>) -> Self {
        Self::with_cause(ErrorCode::BAD_REQUEST_API, cause)
    }

    /// Persistence failure with an opaque, operation-level cause.
    pub fn database(cause: impl Into<String>) -> Self {
        Self::with_cause(ErrorCode::BAD_REQUEST_DATABASE, cause)
    }

    pub fn unauthorized() -> Self {
        Self::new(ErrorCode::UNAUTHORIZED_CHAT)
    }

    pub fn forbidden() -> Self {
        Self::new(ErrorCode::FORBIDDEN_CHAT)
    }

    pub fn offline() -> Self {
        Self::new(ErrorCode::OFFLINE_CHAT)
    }

    /// Cause safe to return to clients.
    pub fn public_cause(&self) -> Option<&str> {
        if self.code.surface.exposes_cause() {
            self.cause.as_deref()
        } else {
            None
        }
    }
}

impl From<ValidationError> for DomainError {
    fn from(err: ValidationError) -> Self {
        DomainError::bad_request(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_error_empty_field_displays_correctly() {
        let err = ValidationError::empty_field("id");
        assert_eq!(format!("{}", err), "Field 'id' cannot be empty");
    }

    #[test]
    fn validation_error_too_long_displays_correctly() {
        let err = ValidationError::too_long("text", 2000, 2500);
        assert_eq!(format!("{}", err), "Field 'text' must be at most 2000, got 2500");
    }

    #[test]
    fn error_code_displays_category_and_subject() {
        assert_eq!(ErrorCode::UNAUTHORIZED_CHAT.to_string(), "unauthorized:chat");
        assert_eq!(ErrorCode::BAD_REQUEST_DATABASE.to_string(), "bad_request:database");
        assert_eq!(ErrorCode::ACTIVATE_GATEWAY.to_string(), "bad_request:activate_gateway");
        assert_eq!(ErrorCode::RATE_LIMIT_CHAT.to_string(), "rate_limit:chat");
    }

    #[test]
    fn error_code_parses_from_string() {
        let code: ErrorCode = "forbidden:chat".parse().unwrap();
        assert_eq!(code, ErrorCode::FORBIDDEN_CHAT);

        let code: ErrorCode = "offline:auth".parse().unwrap();
        assert_eq!(code, ErrorCode::OFFLINE_AUTH);

        assert!("forbidden".parse::<ErrorCode>().is_err());
        assert!("teapot:chat".parse::<ErrorCode>().is_err());
        assert!("forbidden:kitchen".parse::<ErrorCode>().is_err());
    }

    #[test]
    fn status_follows_category() {
        assert_eq!(ErrorCode::BAD_REQUEST_API.status_code(), 400);
        assert_eq!(ErrorCode::UNAUTHORIZED_CHAT.status_code(), 401);
        assert_eq!(ErrorCode::FORBIDDEN_CHAT.status_code(), 403);
        assert_eq!(ErrorCode::NOT_FOUND_STREAM.status_code(), 404);
        assert_eq!(ErrorCode::RATE_LIMIT_CHAT.status_code(), 429);
        assert_eq!(ErrorCode::OFFLINE_CHAT.status_code(), 503);
    }

    #[test]
    fn database_errors_hide_their_cause() {
        let err = DomainError::database("Failed to save chat");
        assert_eq!(err.public_cause(), None);
        assert_eq!(
            err.code.message(),
            "An error occurred while executing a database query."
        );

        let err = DomainError::bad_request("missing field `id`");
        assert_eq!(err.public_cause(), Some("missing field `id`"));
    }

    #[test]
    fn domain_error_display_prefers_cause() {
        let err = DomainError::database("Failed to get chat by id");
        assert_eq!(err.to_string(), "[bad_request:database] Failed to get chat by id");

        let err = DomainError::forbidden();
        assert!(err.to_string().starts_with("[forbidden:chat] This chat belongs"));
    }

    #[test]
    fn validation_error_converts_to_bad_request_api() {
        let err: DomainError = ValidationError::empty_field("id").into();
        assert_eq!(err.code, ErrorCode::BAD_REQUEST_API);
    }
}
