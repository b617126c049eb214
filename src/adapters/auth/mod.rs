//! Authentication adapters.
//!
//! Implementations of the `SessionValidator` port:
//!
//! - `mock` - Test implementation that doesn't require a session store
//! - `session_store` - Signed cookies checked against the shared session table

mod mock;
mod session_store;

pub use mock::MockSessionValidator;
pub use session_store::{sign_value, verify_signed_value, PostgresSessionValidator};
