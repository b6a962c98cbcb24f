//! Ownership and lifecycle of the single TCP stream an engine talks over

pub mod connection;
pub mod connection_state;
