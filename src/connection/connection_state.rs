use std::sync::Arc;

use crate::error::TocError;


#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum ConnectionState {
    NotConnected,
    /// `connect()` was accepted, the connection attempt is about to start
    Initiating,
    /// resolving the configured host name
    Resolving,
    /// opening the TCP stream
    Connecting,
    Connected,
    /// the last connection attempt failed - the reason is part of the state change that led here
    Failed,
}
impl ConnectionState {
    pub fn is_connecting(&self) -> bool {
        matches!(self, ConnectionState::Initiating | ConnectionState::Resolving | ConnectionState::Connecting)
    }

    /// states from which a new connection attempt may be started
    pub fn accepts_connect(&self) -> bool {
        matches!(self, ConnectionState::NotConnected | ConnectionState::Failed)
    }

    pub fn is_valid_transition(&self, to: ConnectionState) -> bool {
        use ConnectionState::*;

        match to {
            NotConnected => true,
            Initiating => self.accepts_connect(),
            Resolving => *self == Initiating,
            Connecting => matches!(self, Initiating | Resolving),
            Connected => *self == Connecting,
            Failed => self.is_connecting(),
        }
    }
}


#[derive(Clone, Debug)]
pub enum StateChangeReason {
    /// the application (or the engine on its behalf) closed the connection
    ClosedOnPurpose,
    ClosedRemotely,
    /// the liveness watchdog gave up on a connection that stopped responding
    Dropped,
    Error(Arc<TocError>),
}
impl StateChangeReason {
    pub fn error(error: TocError) -> StateChangeReason {
        StateChangeReason::Error(Arc::new(error))
    }

    pub fn as_error(&self) -> Option<&TocError> {
        match self {
            StateChangeReason::Error(e) => Some(e.as_ref()),
            _ => None,
        }
    }
}


#[derive(Clone, Debug)]
pub struct StateChange {
    pub old_state: ConnectionState,
    pub new_state: ConnectionState,
    pub reason: Option<StateChangeReason>,
}


#[cfg(test)]
mod test {
    use rstest::rstest;

    use ConnectionState::*;

    use super::*;

    #[rstest]
    #[case(NotConnected, Initiating, true)]
    #[case(Failed,       Initiating, true)]
    #[case(Connected,    Initiating, false)]
    #[case(Connecting,   Initiating, false)]
    #[case(Initiating,   Resolving,  true)]
    #[case(Connecting,   Resolving,  false)]
    #[case(Initiating,   Connecting, true)]
    #[case(Resolving,    Connecting, true)]
    #[case(NotConnected, Connecting, false)]
    #[case(Connecting,   Connected,  true)]
    #[case(Resolving,    Connected,  false)]
    #[case(Initiating,   Failed,     true)]
    #[case(Resolving,    Failed,     true)]
    #[case(Connecting,   Failed,     true)]
    #[case(Connected,    Failed,     false)]
    #[case(NotConnected, Failed,     false)]
    #[case(Connected,    NotConnected, true)]
    #[case(Resolving,    NotConnected, true)]
    #[case(Failed,       NotConnected, true)]
    fn test_is_valid_transition(#[case] from: ConnectionState, #[case] to: ConnectionState, #[case] expected: bool) {
        assert_eq!(from.is_valid_transition(to), expected);
    }
}
