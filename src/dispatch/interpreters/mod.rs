use std::sync::Arc;

use crate::dispatch::dispatcher::CommandInterpreter;
use crate::dispatch::interpreters::config::ConfigInterpreter;
use crate::dispatch::interpreters::eviled::EviledInterpreter;
use crate::dispatch::interpreters::im_in::ImInInterpreter;
use crate::dispatch::interpreters::misc::{NickInterpreter, PauseInterpreter, SignOnInterpreter};
use crate::dispatch::interpreters::rendezvous::RendezvousInterpreter;
use crate::dispatch::interpreters::server_error::ServerErrorInterpreter;
use crate::dispatch::interpreters::update_buddy::UpdateBuddyInterpreter;

pub mod config;
pub mod eviled;
pub mod im_in;
pub mod misc;
pub mod rendezvous;
pub mod server_error;
pub mod update_buddy;


/// The interpreters every dispatcher starts with, by command name. Both protocol revisions'
///  variants are understood where they differ.
pub fn builtin_interpreters() -> Vec<(&'static str, Arc<dyn CommandInterpreter>)> {
    let config: Arc<dyn CommandInterpreter> = Arc::new(ConfigInterpreter {});
    let update_buddy: Arc<dyn CommandInterpreter> = Arc::new(UpdateBuddyInterpreter {});

    let mut result: Vec<(&'static str, Arc<dyn CommandInterpreter>)> = Vec::new();
    result.push(("IM_IN2", Arc::new(ImInInterpreter::toc2())));
    result.push(("IM_IN", Arc::new(ImInInterpreter::toc1())));
    result.push(("CONFIG2", config.clone()));
    result.push(("CONFIG", config));
    result.push(("EVILED", Arc::new(EviledInterpreter {})));
    result.push(("UPDATE_BUDDY2", update_buddy.clone()));
    result.push(("UPDATE_BUDDY", update_buddy));
    result.push(("ERROR", Arc::new(ServerErrorInterpreter {})));
    result.push(("RVOUS_PROPOSE", Arc::new(RendezvousInterpreter {})));
    result.push(("SIGN_ON", Arc::new(SignOnInterpreter {})));
    result.push(("NICK", Arc::new(NickInterpreter {})));
    result.push(("PAUSE", Arc::new(PauseInterpreter {})));
    result
}
