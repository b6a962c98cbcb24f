use anyhow::anyhow;
use async_trait::async_trait;
use tracing::info;

use crate::dispatch::dispatcher::{CommandInterpreter, DispatchContext, Disposition};
use crate::dispatch::toc_events::{TocEvent, WarningChangedData};
use crate::toc::command_line::CommandLine;


/// The local identity's warning level changed: `EVILED:<new level>:<warned by, empty if anonymous>`.
///  The level is always passed on to the rate limiter since it affects the cost of sending.
pub struct EviledInterpreter {}

#[async_trait]
impl CommandInterpreter for EviledInterpreter {
    async fn interpret(&self, line: &CommandLine, ctx: &DispatchContext) -> anyhow::Result<Disposition> {
        let new_level = line.arg(0)
            .and_then(|l| l.trim().parse::<u32>().ok())
            .ok_or_else(|| anyhow!("invalid warning level in {:?}", line))?;
        let warned_by = line.arg(1)
            .filter(|s| !s.trim().is_empty())
            .map(|s| s.to_string());

        let old_level = ctx.sender.local_warning();
        ctx.sender.set_local_warning(new_level);

        if new_level > old_level {
            info!(old_level, new_level, ?warned_by, "local identity was warned");
            ctx.emit(TocEvent::WarningChanged(WarningChangedData {
                screen_name: ctx.config.screen_name.clone(),
                old_level,
                new_level,
                warned_by,
            }));
        }
        Ok(Disposition::Continue)
    }
}


#[cfg(test)]
mod test {
    use crate::client::client_config::ClientConfig;
    use crate::dispatch::dispatcher::test::fixture;

    use super::*;

    #[tokio::test]
    async fn test_warning_increase_is_surfaced() {
        let f = fixture(ClientConfig::new("alice", "pw"));

        EviledInterpreter {}.interpret(&CommandLine::parse("EVILED:20:mallory"), &f.ctx).await.unwrap();
        EviledInterpreter {}.interpret(&CommandLine::parse("EVILED:35:"), &f.ctx).await.unwrap();

        assert_eq!(f.ctx.sender.local_warning(), 35);
        let events = f.events.events();
        assert_eq!(events.len(), 2);
        match &events[1] {
            TocEvent::WarningChanged(data) => assert_eq!(data, &WarningChangedData {
                screen_name: "alice".to_string(),
                old_level: 20,
                new_level: 35,
                warned_by: None,
            }),
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_warning_decrease_is_silent() {
        let f = fixture(ClientConfig::new("alice", "pw"));
        f.ctx.sender.set_local_warning(50);

        EviledInterpreter {}.interpret(&CommandLine::parse("EVILED:45:"), &f.ctx).await.unwrap();

        assert_eq!(f.ctx.sender.local_warning(), 45);
        assert!(f.events.events().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_level() {
        let f = fixture(ClientConfig::new("alice", "pw"));
        assert!(EviledInterpreter {}.interpret(&CommandLine::parse("EVILED:lots:"), &f.ctx).await.is_err());
        assert_eq!(f.ctx.sender.local_warning(), 0);
    }
}
