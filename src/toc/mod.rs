//! The TOC text protocol on top of FLAP framing: command syntax, sign-on and server errors

pub mod command_line;
pub mod commands;
pub mod error_catalog;
pub mod handshake;
pub mod roasting;
