use std::io;

use thiserror::Error;

use crate::connection::connection_state::ConnectionState;


/// Errors surfaced by the connection engine.
///
/// An idle read (no data within the read timeout) is deliberately *not* part of this enum: it is
///  a normal outcome of polling the stream, see [crate::flap::frame_io::ReadOutcome].
#[derive(Debug, Error)]
pub enum TocError {
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
    #[error("connection attempt rejected, engine is in state {0:?}")]
    AlreadyConnecting(ConnectionState),
    #[error("could not resolve {host}: {source}")]
    Resolution {
        host: String,
        #[source]
        source: io::Error,
    },
    #[error("could not connect: {0}")]
    Connect(#[source] io::Error),
    #[error("sign-on rejected by server ({code}): {message}")]
    Handshake {
        code: u32,
        message: String,
    },
    #[error("timed out waiting for {0} during sign-on")]
    HandshakeTimeout(&'static str),
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),
    #[error("i/o error: {0}")]
    TerminalIo(#[source] io::Error),
    #[error("connection closed by the server")]
    ClosedRemotely,
    #[error("connection was closed locally")]
    ConnectionClosed,
    #[error("not connected")]
    NotConnected,
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),
}

impl TocError {
    /// Terminal errors must never be followed by an automatic reconnect attempt
    pub fn is_authentication_failure(&self) -> bool {
        match self {
            TocError::AuthenticationFailed(_) => true,
            TocError::Handshake { code, .. } => *code == crate::toc::error_catalog::AUTHENTICATION_FAILED,
            _ => false,
        }
    }
}

pub type TocResult<T> = Result<T, TocError>;


#[cfg(test)]
mod test {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case::auth(TocError::AuthenticationFailed("x".to_string()), true)]
    #[case::handshake_980(TocError::Handshake { code: 980, message: "x".to_string() }, true)]
    #[case::handshake_other(TocError::Handshake { code: 989, message: "x".to_string() }, false)]
    #[case::closed(TocError::ClosedRemotely, false)]
    fn test_is_authentication_failure(#[case] error: TocError, #[case] expected: bool) {
        assert_eq!(error.is_authentication_failure(), expected);
    }
}
