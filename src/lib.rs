//! Chat Relay - chat backend with persisted conversations and resumable
//! model output streams.
//!
//! A user message is stored, the model's reply is streamed to the client as
//! Server-Sent Events, and the reply is persisted once the model finishes,
//! whether or not the client is still connected. A reconnecting client can
//! pick the stream up again from its last received frame.

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;
