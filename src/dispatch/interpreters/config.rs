use async_trait::async_trait;
use tracing::info;

use crate::dispatch::dispatcher::{CommandInterpreter, DispatchContext, Disposition};
use crate::dispatch::toc_events::{BuddyListLoadedData, TocEvent};
use crate::toc::command_line::CommandLine;


/// The stored buddy list configuration, `CONFIG2:<lines>`
pub struct ConfigInterpreter {}

#[async_trait]
impl CommandInterpreter for ConfigInterpreter {
    async fn interpret(&self, line: &CommandLine, ctx: &DispatchContext) -> anyhow::Result<Disposition> {
        let data = {
            let mut buddies = ctx.buddies();
            buddies.apply_config(&line.tail(0));
            BuddyListLoadedData {
                num_groups: buddies.groups().len(),
                num_buddies: buddies.len(),
            }
        };

        info!(groups = data.num_groups, buddies = data.num_buddies, "buddy list loaded");
        ctx.emit(TocEvent::BuddyListLoaded(data));
        Ok(Disposition::Continue)
    }
}


#[cfg(test)]
mod test {
    use crate::buddy::buddy_list::PermitMode;
    use crate::client::client_config::ClientConfig;
    use crate::dispatch::dispatcher::test::fixture;

    use super::*;

    #[tokio::test]
    async fn test_config() {
        let f = fixture(ClientConfig::new("alice", "pw"));
        let line = CommandLine::parse("CONFIG2:m:3\ng:Friends\nb:bob\nb:carol:Caro\np:bob\ndone:\n");

        ConfigInterpreter {}.interpret(&line, &f.ctx).await.unwrap();

        {
            let buddies = f.ctx.buddies();
            assert_eq!(buddies.permit_mode(), PermitMode::PermitSome);
            assert_eq!(buddies.get("carol").unwrap().alias.as_deref(), Some("Caro"));
        }
        match f.events.events().as_slice() {
            [TocEvent::BuddyListLoaded(data)] => assert_eq!(data, &BuddyListLoadedData { num_groups: 1, num_buddies: 2 }),
            other => panic!("unexpected events {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_without_config_everybody_is_permitted() {
        let f = fixture(ClientConfig::new("alice", "pw"));
        ConfigInterpreter {}.interpret(&CommandLine::parse("CONFIG2:"), &f.ctx).await.unwrap();
        assert_eq!(f.ctx.buddies().permit_mode(), PermitMode::PermitAll);
    }
}
