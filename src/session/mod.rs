//! Correlation of rendezvous notifications into long-lived sessions keyed by session id and peer

pub mod rendezvous;
pub mod session_registry;
