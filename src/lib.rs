//! A client engine for the TOC instant messaging protocol over FLAP framing.
//!
//! [client::client::TocClient] is the entry point. The building blocks it wires together are
//!  usable on their own: frame codec ([flap]), connection state machine ([connection]), rate
//!  limited sender ([sender]), sign-on ([toc::handshake]), command dispatch ([dispatch]), liveness
//!  watchdog ([watchdog]) and rendezvous session registry ([session]).

pub mod buddy;
pub mod client;
pub mod connection;
pub mod dispatch;
pub mod error;
pub mod flap;
pub mod sender;
pub mod session;
pub mod test_util;
pub mod toc;
pub mod util;
pub mod watchdog;
