//! Adapters - Implementations of port interfaces.
//!
//! Adapters connect the domain to external systems:
//! - `postgres` - Chat persistence and the session store
//! - `memory` - In-memory chat repository for tests
//! - `ai` - Model providers and the multi-step invoker
//! - `auth` - Session cookie verification
//! - `stream_store` - Resumable stream buffers (Redis, in-memory)
//! - `http` - axum routes and middleware

pub mod ai;
pub mod auth;
pub mod http;
pub mod memory;
pub mod postgres;
pub mod stream_store;
