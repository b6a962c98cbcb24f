use std::fmt::{Debug, Formatter};
use std::time::Duration;

use crate::connection::connection::Endpoint;
use crate::sender::rate_limited_sender::RateLimits;
use crate::toc::commands::{DEFAULT_MAX_BUDDY_BATCH, DEFAULT_MAX_MESSAGE_CHUNK};


pub struct ClientConfig {
    pub screen_name: String,
    pub password: String,

    /// the TOC server to connect to
    pub server: Endpoint,
    /// passed on to the TOC server in the sign-on command, never connected to by the client
    pub auth_host: String,
    pub auth_port: u16,
    pub language: String,
    pub revision: String,
    pub profile: String,

    /// read timeout while signing on: running into it aborts the sign-on
    pub handshake_timeout: Duration,
    /// read timeout after signing on: running into it is normal, it bounds how long the read loop
    ///  waits before it checks whether it should stop
    pub read_timeout: Duration,

    pub rate_limits: RateLimits,

    /// period of the liveness probes
    pub watchdog_interval: Duration,
    /// how long after a probe its echo must have arrived
    pub watchdog_verify_delay: Duration,

    /// add senders of incoming messages to the buddy list if they are not on it
    pub auto_add_unknown_senders: bool,
    pub auto_add_group: String,
    /// auto-reply to messages from unknown senders if they are not auto-added
    pub unknown_sender_reply: Option<String>,

    pub max_message_chunk: usize,
    pub max_buddy_batch: usize,
}
impl Debug for ClientConfig {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("screen_name", &self.screen_name)
            .field("server", &self.server)
            .field("auth_host", &self.auth_host)
            .field("auth_port", &self.auth_port)
            .field("handshake_timeout", &self.handshake_timeout)
            .field("read_timeout", &self.read_timeout)
            .field("rate_limits", &self.rate_limits)
            .field("watchdog_interval", &self.watchdog_interval)
            .finish_non_exhaustive()
    }
}

impl ClientConfig {
    pub fn new(screen_name: impl Into<String>, password: impl Into<String>) -> ClientConfig {
        ClientConfig {
            screen_name: screen_name.into(),
            password: password.into(),
            server: Endpoint::host("toc.oscar.aol.com", 9898),
            auth_host: "login.oscar.aol.com".to_string(),
            auth_port: 29999,
            language: "english".to_string(),
            revision: "TIC:TOC2".to_string(),
            profile: "".to_string(),
            handshake_timeout: Duration::from_secs(10),
            read_timeout: Duration::from_secs(1),
            rate_limits: RateLimits::default(),
            watchdog_interval: Duration::from_secs(5 * 60),
            watchdog_verify_delay: Duration::from_secs(5),
            auto_add_unknown_senders: true,
            auto_add_group: "Buddies".to_string(),
            unknown_sender_reply: None,
            max_message_chunk: DEFAULT_MAX_MESSAGE_CHUNK,
            max_buddy_batch: DEFAULT_MAX_BUDDY_BATCH,
        }
    }
}
