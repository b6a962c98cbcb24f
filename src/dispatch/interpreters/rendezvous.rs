use async_trait::async_trait;
use tracing::debug;

use crate::dispatch::dispatcher::{CommandInterpreter, DispatchContext, Disposition};
use crate::session::rendezvous::RendezvousProposal;
use crate::session::session_registry::SessionEvent;
use crate::toc::command_line::CommandLine;


/// Routes rendezvous proposals to their session, creating it if this is the first reference
pub struct RendezvousInterpreter {}

#[async_trait]
impl CommandInterpreter for RendezvousInterpreter {
    async fn interpret(&self, line: &CommandLine, ctx: &DispatchContext) -> anyhow::Result<Disposition> {
        let proposal = RendezvousProposal::parse(&line.args())?;
        debug!(peer = proposal.peer.as_str(), session_id = proposal.session_id, service = proposal.service.as_str(), "rendezvous proposal");

        let session = ctx.sessions.get_or_create(proposal.session_id, &proposal.peer);
        session.deliver(&SessionEvent::Proposal(proposal));
        Ok(Disposition::Continue)
    }
}
