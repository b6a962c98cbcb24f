pub mod fake_server;
pub mod recording;
