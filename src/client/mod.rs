//! The engine's application facing surface: configuration, and the client that wires connection,
//!  handshake, dispatcher and watchdog together.

pub mod client;
pub mod client_config;
