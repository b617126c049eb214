//! HTTP adapters - axum routes, middleware and error mapping.

pub mod auth_proxy;
pub mod chat;
pub mod error;
pub mod middleware;
pub mod router;

pub use auth_proxy::{auth_proxy_router, AuthProxyState};
pub use chat::{chat_router, ChatAppState};
pub use error::ErrorResponse;
pub use middleware::{auth_middleware, AuthState, OptionalAuth, RequireAuth};
pub use router::{build_router, AppState};
