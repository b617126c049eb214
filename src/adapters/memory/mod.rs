//! In-memory adapters for tests and single-process development.

mod chat_repository;

pub use chat_repository::InMemoryChatRepository;
