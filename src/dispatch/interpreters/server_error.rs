use anyhow::anyhow;
use async_trait::async_trait;
use tracing::{error, warn};

use crate::dispatch::dispatcher::{CommandInterpreter, DispatchContext, Disposition};
use crate::dispatch::toc_events::TocEvent;
use crate::error::TocError;
use crate::toc::command_line::CommandLine;
use crate::toc::error_catalog::ServerError;


/// `ERROR:<code>[:<argument>]`. Errors are surfaced, and an authentication failure ends the
///  connection for good.
pub struct ServerErrorInterpreter {}

#[async_trait]
impl CommandInterpreter for ServerErrorInterpreter {
    async fn interpret(&self, line: &CommandLine, ctx: &DispatchContext) -> anyhow::Result<Disposition> {
        let server_error = ServerError::from_command(line)
            .ok_or_else(|| anyhow!("malformed server error {:?}", line))?;

        ctx.emit(TocEvent::ServerError(server_error.clone()));

        if server_error.is_authentication_failure() {
            error!("server reports an authentication failure: {}", server_error.message);
            return Ok(Disposition::Terminate(TocError::AuthenticationFailed(server_error.message)));
        }

        warn!(code = server_error.code, "server error: {}", server_error.message);
        Ok(Disposition::Continue)
    }
}
