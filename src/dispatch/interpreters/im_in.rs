use anyhow::anyhow;
use async_trait::async_trait;
use tracing::{debug, trace};

use crate::dispatch::dispatcher::{CommandInterpreter, DispatchContext, Disposition};
use crate::dispatch::toc_events::{MessageReceivedData, TocEvent};
use crate::toc::command_line::CommandLine;
use crate::toc::commands;
use crate::util::markup::strip_markup;
use crate::util::normalize::same_identity;


/// Incoming instant messages: `IM_IN2:<sender>:<auto>:<unused>:<message>` and the older
///  `IM_IN:<sender>:<auto>:<message>`
pub struct ImInInterpreter {
    message_index: usize,
}
impl ImInInterpreter {
    pub fn toc2() -> ImInInterpreter {
        ImInInterpreter { message_index: 3 }
    }

    pub fn toc1() -> ImInInterpreter {
        ImInInterpreter { message_index: 2 }
    }
}

#[async_trait]
impl CommandInterpreter for ImInInterpreter {
    async fn interpret(&self, line: &CommandLine, ctx: &DispatchContext) -> anyhow::Result<Disposition> {
        let from = line.arg(0)
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| anyhow!("{} without sender", line.name()))?;
        let auto_response = line.arg(1) == Some("T");
        let raw_message = line.tail(self.message_index);
        let message = strip_markup(&raw_message);

        if same_identity(from, &ctx.config.screen_name) && ctx.liveness.confirm(&message) {
            trace!("received liveness probe echo");
            return Ok(Disposition::Continue);
        }

        let is_known = {
            let mut buddies = ctx.buddies();
            if buddies.contains(from) {
                true
            }
            else if ctx.config.auto_add_unknown_senders {
                debug!(from, "adding unknown sender to group {:?}", ctx.config.auto_add_group);
                buddies.add_to_group(from, &ctx.config.auto_add_group);
                true
            }
            else {
                false
            }
        };

        if !is_known {
            if let (Some(reply), false) = (&ctx.config.unknown_sender_reply, auto_response) {
                for command in commands::send_im(from, reply, true, ctx.config.max_message_chunk) {
                    ctx.sender.send_command(&command).await?;
                }
            }
            debug!(from, "dropping message from unknown sender");
            return Ok(Disposition::Continue);
        }

        ctx.emit(TocEvent::MessageReceived(MessageReceivedData {
            from: from.to_string(),
            message,
            raw_message,
            auto_response,
        }));
        Ok(Disposition::Continue)
    }
}
