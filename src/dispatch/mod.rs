//! Steady state processing of server commands: parsing, interpretation and the application
//!  event surface

pub mod dispatcher;
pub mod interpreters;
pub mod toc_events;
