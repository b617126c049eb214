//! Resumable stream store implementations.
//!
//! - `InMemoryStreamStore` - single-process buffer, also used in tests
//! - `RedisStreamStore` - shared buffer for multi-server deployments

mod in_memory;
mod redis;

pub use in_memory::InMemoryStreamStore;
pub use self::redis::RedisStreamStore;
