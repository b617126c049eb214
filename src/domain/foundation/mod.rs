//! Foundation module - Shared domain primitives.
//!
//! Identifiers, timestamps, authentication types and the error taxonomy
//! used across the chat domain.

mod auth;
mod errors;
mod ids;
mod timestamp;

pub use auth::{AuthError, AuthenticatedUser, SessionToken};
pub use errors::{DomainError, ErrorCode, ErrorKind, Surface, ValidationError};
pub use ids::{ChatId, MessageId, ProjectId, StreamId, UserId, MAX_ID_LEN};
pub use timestamp::Timestamp;
