use std::fmt::{Debug, Formatter};
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::net::{lookup_host, TcpStream};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

use crate::connection::connection_state::{ConnectionState, StateChange, StateChangeReason};
use crate::error::{TocError, TocResult};
use crate::util::observers::{Observer, Observers};


/// Where to connect to: exactly one of `host` and `address` must be set.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Endpoint {
    pub host: Option<String>,
    pub address: Option<IpAddr>,
    pub port: u16,
}
impl Endpoint {
    pub fn host(host: impl Into<String>, port: u16) -> Endpoint {
        Endpoint {
            host: Some(host.into()),
            address: None,
            port,
        }
    }

    pub fn address(address: SocketAddr) -> Endpoint {
        Endpoint {
            host: None,
            address: Some(address.ip()),
            port: address.port(),
        }
    }

    pub fn target(&self) -> TocResult<ConnectTarget> {
        if self.port == 0 {
            return Err(TocError::InvalidConfiguration("port must not be 0".to_string()));
        }

        match (&self.host, &self.address) {
            (Some(host), None) if !host.trim().is_empty() => Ok(ConnectTarget::Host(host.trim().to_string(), self.port)),
            (None, Some(address)) => Ok(ConnectTarget::Address(SocketAddr::new(*address, self.port))),
            (Some(_), Some(_)) => Err(TocError::InvalidConfiguration("both a host name and an address are configured".to_string())),
            _ => Err(TocError::InvalidConfiguration("neither a host name nor an address is configured".to_string())),
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ConnectTarget {
    Host(String, u16),
    Address(SocketAddr),
}


/// Identifies one TCP stream over the lifetime of a [Connection], so that a reader of a stream
///  that was replaced in the meantime cannot affect the current one
pub type StreamId = u64;

/// A connected stream handed out to its reader. `closed` switches to `true` when the
///  connection closes the stream, which readers and writers use to stop promptly.
#[derive(Debug)]
pub struct ConnectedStream {
    pub id: StreamId,
    pub stream: TcpStream,
    pub closed: watch::Receiver<bool>,
}

struct ActiveStream {
    id: StreamId,
    /// `None` after it was handed out to the reader
    stream: Option<TcpStream>,
    closed: watch::Sender<bool>,
}
impl ActiveStream {
    fn close(mut self) {
        self.closed.send_replace(true);
        drop(self.stream.take());
    }
}

struct ConnectionInner {
    state: ConnectionState,
    /// incremented for every connect and every close, so that connection attempts can tell if
    ///  they were superseded. Doubles as the [StreamId] of the stream an attempt opens.
    attempt: u64,
    attempt_task: Option<JoinHandle<()>>,
    active: Option<ActiveStream>,
}


/// The connection state machine. It owns the TCP stream and its lifecycle, and nothing else:
///  what is sent over the stream is none of its business.
///
/// All operations and the notification of state change observers run under a single lock per
///  connection. Observers are therefore notified in exactly the order of the transitions, but
///  they must not call back into the same [Connection] synchronously.
pub struct Connection {
    endpoint: Endpoint,
    inner: Mutex<ConnectionInner>,
    observers: Observers<StateChange>,
}
impl Debug for Connection {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Connection{{{:?}: {:?}}}", self.endpoint, self.get_state())
    }
}

impl Connection {
    pub fn new(endpoint: Endpoint) -> Arc<Connection> {
        Arc::new(Connection {
            endpoint,
            inner: Mutex::new(ConnectionInner {
                state: ConnectionState::NotConnected,
                attempt: 0,
                attempt_task: None,
                active: None,
            }),
            observers: Observers::new("connection state"),
        })
    }

    fn lock(&self) -> MutexGuard<'_, ConnectionInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn get_state(&self) -> ConnectionState {
        self.lock().state
    }

    pub fn subscribe(&self, observer: Arc<dyn Observer<StateChange>>) -> bool {
        self.observers.add(observer)
    }

    pub fn unsubscribe(&self, observer: &Arc<dyn Observer<StateChange>>) -> bool {
        self.observers.remove(observer)
    }

    /// Starts a connection attempt in the background. Configuration problems and calls in a
    ///  state other than `NotConnected` / `Failed` are rejected synchronously without any state
    ///  change; everything else is reported through state changes.
    pub fn connect(self: &Arc<Self>) -> TocResult<()> {
        let target = self.endpoint.target()?;

        let mut inner = self.lock();
        if !inner.state.accepts_connect() {
            return Err(TocError::AlreadyConnecting(inner.state));
        }

        inner.attempt += 1;
        let attempt = inner.attempt;
        debug!(attempt, ?target, "starting connection attempt");
        self.transition(&mut inner, ConnectionState::Initiating, None);

        let connection = self.clone();
        inner.attempt_task = Some(tokio::spawn(async move {
            connection.run_attempt(attempt, target).await
        }));
        Ok(())
    }

    /// Cancels a connection attempt in progress or closes the connected stream. This is a
    ///  no-op if there is neither.
    pub fn disconnect(&self) -> bool {
        self.close(StateChangeReason::ClosedOnPurpose)
    }

    /// Same as [Connection::disconnect], but reports the connection as dropped rather than
    ///  closed on purpose
    pub fn drop_connection(&self) -> bool {
        self.close(StateChangeReason::Dropped)
    }

    fn close(&self, reason: StateChangeReason) -> bool {
        let mut inner = self.lock();
        if matches!(inner.state, ConnectionState::NotConnected | ConnectionState::Failed) {
            trace!("close requested while not connected - ignoring");
            return false;
        }

        inner.attempt += 1;
        if let Some(task) = inner.attempt_task.take() {
            task.abort();
        }
        if let Some(active) = inner.active.take() {
            active.close();
        }
        self.transition(&mut inner, ConnectionState::NotConnected, Some(reason));
        true
    }

    /// Called by the reader of a stream when it fails. It is ignored unless `stream_id` refers
    ///  to the current connected stream.
    pub fn on_io_error(&self, stream_id: StreamId, error: TocError) -> bool {
        let reason = match error {
            TocError::ClosedRemotely => StateChangeReason::ClosedRemotely,
            e => StateChangeReason::error(e),
        };
        self.close_stream(stream_id, reason)
    }

    /// Closes a specific stream, e.g. after a failed handshake
    pub fn close_stream(&self, stream_id: StreamId, reason: StateChangeReason) -> bool {
        let mut inner = self.lock();
        if inner.state != ConnectionState::Connected || inner.active.as_ref().map(|a| a.id) != Some(stream_id) {
            debug!(stream_id, "stream is not current any more - ignoring close request");
            return false;
        }

        inner.attempt += 1;
        if let Some(active) = inner.active.take() {
            active.close();
        }
        self.transition(&mut inner, ConnectionState::NotConnected, Some(reason));
        true
    }

    /// Hands out the connected stream to its reader. This returns `Some` at most once per stream.
    pub fn take_stream(&self) -> Option<ConnectedStream> {
        let mut inner = self.lock();
        if inner.state != ConnectionState::Connected {
            return None;
        }

        let active = inner.active.as_mut()?;
        let stream = active.stream.take()?;
        Some(ConnectedStream {
            id: active.id,
            stream,
            closed: active.closed.subscribe(),
        })
    }

    async fn run_attempt(self: Arc<Self>, attempt: u64, target: ConnectTarget) {
        let addr = match target {
            ConnectTarget::Address(addr) => addr,
            ConnectTarget::Host(host, port) => {
                if !self.advance(attempt, ConnectionState::Resolving) {
                    return;
                }
                match lookup_host((host.clone(), port)).await {
                    Ok(mut addrs) => match addrs.next() {
                        Some(addr) => addr,
                        None => {
                            let source = io::Error::new(io::ErrorKind::NotFound, "no addresses found");
                            self.fail(attempt, TocError::Resolution { host, source });
                            return;
                        }
                    },
                    Err(source) => {
                        self.fail(attempt, TocError::Resolution { host, source });
                        return;
                    }
                }
            }
        };

        if !self.advance(attempt, ConnectionState::Connecting) {
            return;
        }

        match TcpStream::connect(addr).await {
            Ok(stream) => self.on_stream_opened(attempt, stream),
            Err(e) => self.fail(attempt, TocError::Connect(e)),
        }
    }

    /// returns `false` if the attempt was cancelled in the meantime
    fn advance(&self, attempt: u64, new_state: ConnectionState) -> bool {
        let mut inner = self.lock();
        if inner.attempt != attempt || !inner.state.is_connecting() {
            debug!(attempt, "connection attempt was cancelled before {:?}", new_state);
            return false;
        }
        self.transition(&mut inner, new_state, None);
        true
    }

    fn fail(&self, attempt: u64, error: TocError) {
        let mut inner = self.lock();
        if inner.attempt != attempt || !inner.state.is_connecting() {
            debug!(attempt, "cancelled connection attempt failed - ignoring: {}", error);
            return;
        }

        warn!(attempt, "connection attempt failed: {}", error);
        inner.attempt_task = None;
        self.transition(&mut inner, ConnectionState::Failed, Some(StateChangeReason::error(error)));
    }

    fn on_stream_opened(&self, attempt: u64, stream: TcpStream) {
        let mut inner = self.lock();
        if inner.attempt != attempt || !inner.state.is_connecting() {
            debug!(attempt, "connection attempt was cancelled after the stream was opened - closing it");
            drop(stream);
            return;
        }

        if let Err(e) = stream.set_nodelay(true) {
            debug!("could not set TCP_NODELAY: {}", e);
        }

        let (closed, _) = watch::channel(false);
        inner.active = Some(ActiveStream {
            id: attempt,
            stream: Some(stream),
            closed,
        });
        inner.attempt_task = None;
        self.transition(&mut inner, ConnectionState::Connected, None);
    }

    fn transition(&self, inner: &mut ConnectionInner, new_state: ConnectionState, reason: Option<StateChangeReason>) {
        let old_state = inner.state;
        if old_state == new_state {
            trace!("already in state {:?} - not reporting again", new_state);
            return;
        }
        if !old_state.is_valid_transition(new_state) {
            error!("refusing invalid state transition {:?} -> {:?}", old_state, new_state);
            return;
        }

        inner.state = new_state;
        match &reason {
            Some(reason) => info!("connection state {:?} -> {:?} ({:?})", old_state, new_state, reason),
            None => info!("connection state {:?} -> {:?}", old_state, new_state),
        }

        self.observers.notify(&StateChange {
            old_state,
            new_state,
            reason,
        });
    }
}


#[cfg(test)]
mod test {
    use std::net::SocketAddr;
    use std::sync::Arc;
    use std::time::Duration;

    use rstest::rstest;
    use tokio::net::TcpListener;
    use tokio::time::sleep;

    use ConnectionState::*;

    use crate::test_util::recording::{wait_until, RecordingObserver};

    use super::*;

    fn recorded(connection: &Connection) -> Arc<RecordingObserver<StateChange>> {
        let observer = RecordingObserver::new();
        connection.subscribe(observer.clone());
        observer
    }

    fn states(observer: &RecordingObserver<StateChange>) -> Vec<ConnectionState> {
        observer.events().iter()
            .map(|c| c.new_state)
            .collect()
    }

    async fn listener() -> (TcpListener, SocketAddr) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        (listener, addr)
    }

    async fn unused_port_addr() -> SocketAddr {
        let (listener, addr) = listener().await;
        drop(listener);
        addr
    }

    #[rstest]
    #[case::nothing(Endpoint { host: None, address: None, port: 9898 })]
    #[case::both(Endpoint { host: Some("localhost".to_string()), address: Some("127.0.0.1".parse().unwrap()), port: 9898 })]
    #[case::blank_host(Endpoint { host: Some("  ".to_string()), address: None, port: 9898 })]
    #[case::port_zero(Endpoint { host: Some("localhost".to_string()), address: None, port: 0 })]
    #[tokio::test]
    async fn test_connect_rejects_invalid_configuration(#[case] endpoint: Endpoint) {
        let connection = Connection::new(endpoint);
        let observer = recorded(&connection);

        assert!(matches!(connection.connect(), Err(TocError::InvalidConfiguration(_))));
        assert_eq!(connection.get_state(), NotConnected);
        assert!(observer.events().is_empty());
    }

    #[tokio::test]
    async fn test_connect_to_address() {
        let (_listener, addr) = listener().await;
        let connection = Connection::new(Endpoint::address(addr));
        let observer = recorded(&connection);

        connection.connect().unwrap();
        wait_until(|| connection.get_state() == Connected).await;

        assert_eq!(states(&observer), vec![Initiating, Connecting, Connected]);
        assert!(observer.events().iter().all(|c| c.reason.is_none()));
    }

    #[tokio::test]
    async fn test_connect_to_host_resolves_first() {
        let (_listener, addr) = listener().await;
        let connection = Connection::new(Endpoint::host("127.0.0.1", addr.port()));
        let observer = recorded(&connection);

        connection.connect().unwrap();
        wait_until(|| connection.get_state() == Connected).await;

        assert_eq!(states(&observer), vec![Initiating, Resolving, Connecting, Connected]);
    }

    #[tokio::test]
    async fn test_unresolvable_host_fails() {
        let connection = Connection::new(Endpoint::host("nonexistent.invalid", 1));
        let observer = recorded(&connection);

        connection.connect().unwrap();
        wait_until(|| connection.get_state() == Failed).await;

        let events = observer.events();
        assert_eq!(states(&observer), vec![Initiating, Resolving, Failed]);
        assert!(matches!(events.last().unwrap().reason.as_ref().and_then(|r| r.as_error()), Some(TocError::Resolution { .. })));
    }

    #[tokio::test]
    async fn test_connect_failure_and_retry() {
        let addr = unused_port_addr().await;
        let connection = Connection::new(Endpoint::address(addr));
        let observer = recorded(&connection);

        connection.connect().unwrap();
        wait_until(|| connection.get_state() == Failed).await;

        let events = observer.events();
        assert_eq!(states(&observer), vec![Initiating, Connecting, Failed]);
        assert!(matches!(events.last().unwrap().reason.as_ref().and_then(|r| r.as_error()), Some(TocError::Connect(_))));

        // 'Failed' accepts a new attempt, and a no-op disconnect does not report anything
        assert!(!connection.disconnect());
        connection.connect().unwrap();
        wait_until(|| connection.get_state() == Failed).await;
        assert_eq!(states(&observer), vec![Initiating, Connecting, Failed, Initiating, Connecting, Failed]);
    }

    #[tokio::test]
    async fn test_connect_while_connected_is_rejected() {
        let (_listener, addr) = listener().await;
        let connection = Connection::new(Endpoint::address(addr));

        connection.connect().unwrap();
        assert!(matches!(connection.connect(), Err(TocError::AlreadyConnecting(Initiating))));

        wait_until(|| connection.get_state() == Connected).await;
        assert!(matches!(connection.connect(), Err(TocError::AlreadyConnecting(Connected))));
    }

    #[tokio::test]
    async fn test_disconnect_is_idempotent() {
        let (_listener, addr) = listener().await;
        let connection = Connection::new(Endpoint::address(addr));
        connection.connect().unwrap();
        wait_until(|| connection.get_state() == Connected).await;

        let observer = recorded(&connection);
        assert!(connection.disconnect());
        assert!(!connection.disconnect());

        let events = observer.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].new_state, NotConnected);
        assert!(matches!(events[0].reason, Some(StateChangeReason::ClosedOnPurpose)));
    }

    #[tokio::test]
    async fn test_disconnect_cancels_attempt_in_progress() {
        let (_listener, addr) = listener().await;
        let connection = Connection::new(Endpoint::address(addr));
        let observer = recorded(&connection);

        connection.connect().unwrap();
        connection.disconnect();

        sleep(Duration::from_millis(200)).await;
        assert_eq!(connection.get_state(), NotConnected);
        assert_eq!(states(&observer), vec![Initiating, NotConnected]);
        assert!(connection.take_stream().is_none());
    }

    #[tokio::test]
    async fn test_take_stream_once() {
        let (_listener, addr) = listener().await;
        let connection = Connection::new(Endpoint::address(addr));
        connection.connect().unwrap();
        wait_until(|| connection.get_state() == Connected).await;

        let stream = connection.take_stream().unwrap();
        assert!(!*stream.closed.borrow());
        assert!(connection.take_stream().is_none());

        connection.disconnect();
        assert!(*stream.closed.borrow());
    }

    #[tokio::test]
    async fn test_on_io_error_ignores_stale_streams() {
        let (_listener, addr) = listener().await;
        let connection = Connection::new(Endpoint::address(addr));
        connection.connect().unwrap();
        wait_until(|| connection.get_state() == Connected).await;
        let stream = connection.take_stream().unwrap();

        let observer = recorded(&connection);
        assert!(!connection.on_io_error(stream.id + 1, TocError::ClosedRemotely));
        assert_eq!(connection.get_state(), Connected);

        assert!(connection.on_io_error(stream.id, TocError::TerminalIo(io::Error::new(io::ErrorKind::ConnectionReset, "reset"))));
        assert!(!connection.on_io_error(stream.id, TocError::ClosedRemotely));

        let events = observer.events();
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0].reason.as_ref().and_then(|r| r.as_error()), Some(TocError::TerminalIo(_))));
    }

    #[tokio::test]
    async fn test_remote_close_reason() {
        let (_listener, addr) = listener().await;
        let connection = Connection::new(Endpoint::address(addr));
        connection.connect().unwrap();
        wait_until(|| connection.get_state() == Connected).await;
        let stream = connection.take_stream().unwrap();

        let observer = recorded(&connection);
        connection.on_io_error(stream.id, TocError::ClosedRemotely);
        assert!(matches!(observer.events()[0].reason, Some(StateChangeReason::ClosedRemotely)));
    }

    #[tokio::test]
    async fn test_state_sequences_are_well_formed() {
        let (_listener, addr) = listener().await;
        let connection = Connection::new(Endpoint::address(addr));
        let observer = recorded(&connection);

        for round in 0..6 {
            connection.connect().unwrap();
            if round % 2 == 0 {
                wait_until(|| connection.get_state() == Connected).await;
            }
            connection.disconnect();
            connection.disconnect();
        }
        connection.drop_connection();

        let events = observer.events();
        for pair in events.windows(2) {
            assert_ne!(pair[0].new_state, pair[1].new_state);
            assert_eq!(pair[0].new_state, pair[1].old_state);
        }
        for (i, change) in events.iter().enumerate() {
            if change.new_state == Connected {
                assert!(i > 0 && events[i - 1].new_state == Connecting);
            }
        }
        assert_eq!(events.iter().filter(|c| c.new_state == Connected).count(), 3);
    }
}
