use anyhow::anyhow;
use async_trait::async_trait;
use tracing::debug;

use crate::dispatch::dispatcher::{CommandInterpreter, DispatchContext, Disposition};
use crate::dispatch::toc_events::{BuddyData, TocEvent, WarningChangedData};
use crate::toc::command_line::CommandLine;


/// Presence updates: `UPDATE_BUDDY2:<buddy>:<online T/F>:<warning>:<signon time>:<idle minutes>:<user class>`.
///  The third character of the user class is `U` while the buddy is away.
pub struct UpdateBuddyInterpreter {}

fn is_away(user_class: &str) -> bool {
    user_class.chars().nth(2) == Some('U')
}

#[async_trait]
impl CommandInterpreter for UpdateBuddyInterpreter {
    async fn interpret(&self, line: &CommandLine, ctx: &DispatchContext) -> anyhow::Result<Disposition> {
        let screen_name = line.arg(0)
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| anyhow!("{} without buddy", line.name()))?;
        let online = line.arg(1) == Some("T");
        let warning = line.arg(2).and_then(|s| s.trim().parse::<u32>().ok()).unwrap_or(0);
        let signon_time = line.arg(3).and_then(|s| s.trim().parse::<u64>().ok()).unwrap_or(0);
        let idle_minutes = line.arg(4).and_then(|s| s.trim().parse::<u32>().ok()).unwrap_or(0);
        let user_class = line.arg(5).unwrap_or("");
        let away = online && is_away(user_class);

        let events = {
            let mut buddies = ctx.buddies();
            let buddy = buddies.get_or_create(screen_name);

            let was_online = buddy.online;
            let was_away = buddy.away;
            let old_warning = buddy.warning;

            buddy.online = online;
            buddy.away = away;
            buddy.warning = warning;
            buddy.signon_time = signon_time;
            buddy.idle_minutes = idle_minutes;
            buddy.user_class = user_class.to_string();

            let data = BuddyData { screen_name: screen_name.to_string() };
            let mut events = Vec::new();
            if online != was_online {
                events.push(if online { TocEvent::BuddySignedOn(data.clone()) } else { TocEvent::BuddySignedOff(data.clone()) });
            }
            if online && away != was_away {
                events.push(if away { TocEvent::BuddyUnavailable(data) } else { TocEvent::BuddyAvailable(data) });
            }
            if warning > old_warning {
                events.push(TocEvent::WarningChanged(WarningChangedData {
                    screen_name: screen_name.to_string(),
                    old_level: old_warning,
                    new_level: warning,
                    warned_by: None,
                }));
            }
            events
        };

        debug!(screen_name, online, away, warning, "buddy update");
        for event in events {
            ctx.emit(event);
        }
        Ok(Disposition::Continue)
    }
}
