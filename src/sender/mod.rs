pub mod rate_limited_sender;
