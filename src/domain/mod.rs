//! Domain layer - pure types and rules with no I/O.

pub mod chat;
pub mod foundation;
