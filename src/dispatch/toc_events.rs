use crate::connection::connection_state::StateChangeReason;
use crate::toc::command_line::CommandLine;
use crate::toc::error_catalog::ServerError;


/// Application level events of an engine
#[derive(Clone, Debug)]
pub enum TocEvent {
    SignedOn(SignedOnData),
    Disconnected(DisconnectedData),
    MessageReceived(MessageReceivedData),
    /// the warning level of the local identity or of a buddy increased
    WarningChanged(WarningChangedData),
    BuddySignedOn(BuddyData),
    BuddySignedOff(BuddyData),
    BuddyAvailable(BuddyData),
    BuddyUnavailable(BuddyData),
    /// the server sent the stored buddy list configuration
    BuddyListLoaded(BuddyListLoadedData),
    ServerError(ServerError),
    /// a local problem while processing server input
    Error(ErrorData),
    /// the server's formatting of the local screen name
    DisplayName(String),
    /// a server command no interpreter is registered for
    Command(CommandLine),
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SignedOnData {
    pub screen_name: String,
    pub display_name: Option<String>,
}

#[derive(Clone, Debug)]
pub struct DisconnectedData {
    pub reason: Option<StateChangeReason>,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct MessageReceivedData {
    pub from: String,
    /// markup stripped
    pub message: String,
    pub raw_message: String,
    pub auto_response: bool,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct WarningChangedData {
    pub screen_name: String,
    pub old_level: u32,
    pub new_level: u32,
    /// `None` for anonymous warnings and for buddies' levels
    pub warned_by: Option<String>,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct BuddyData {
    pub screen_name: String,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct BuddyListLoadedData {
    pub num_groups: usize,
    pub num_buddies: usize,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ErrorData {
    pub message: String,
}
