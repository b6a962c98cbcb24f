use async_trait::async_trait;
use tracing::{debug, info};

use crate::dispatch::dispatcher::{CommandInterpreter, DispatchContext, Disposition};
use crate::dispatch::toc_events::TocEvent;
use crate::toc::command_line::CommandLine;


/// `SIGN_ON:<version>` is consumed by the handshake. A repetition later on carries no information.
pub struct SignOnInterpreter {}

#[async_trait]
impl CommandInterpreter for SignOnInterpreter {
    async fn interpret(&self, line: &CommandLine, _ctx: &DispatchContext) -> anyhow::Result<Disposition> {
        debug!("server repeated SIGN_ON, protocol version {:?}", line.arg(0));
        Ok(Disposition::Continue)
    }
}


/// `NICK:<display name>`
pub struct NickInterpreter {}

#[async_trait]
impl CommandInterpreter for NickInterpreter {
    async fn interpret(&self, line: &CommandLine, ctx: &DispatchContext) -> anyhow::Result<Disposition> {
        ctx.emit(TocEvent::DisplayName(line.tail(0)));
        Ok(Disposition::Continue)
    }
}


/// The server pauses the session, e.g. for a server migration. Commands sent while paused are
///  dropped by the server, which is the application's business.
pub struct PauseInterpreter {}

#[async_trait]
impl CommandInterpreter for PauseInterpreter {
    async fn interpret(&self, _line: &CommandLine, _ctx: &DispatchContext) -> anyhow::Result<Disposition> {
        info!("server paused the session");
        Ok(Disposition::Continue)
    }
}
