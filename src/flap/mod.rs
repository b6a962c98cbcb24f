//! FLAP is the binary envelope the text protocol is carried in: every unit on the TCP stream
//!  is a frame with a marker byte, a frame kind, a sequence number and a length-prefixed
//!  payload. The only exception is the literal preamble the client sends when it connects.

pub mod frame;
pub mod frame_io;
