use std::fmt::{Debug, Formatter};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use anyhow::anyhow;
use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::buddy::buddy_list::{BuddyList, PermitMode};
use crate::client::client_config::ClientConfig;
use crate::connection::connection::{ConnectedStream, Connection};
use crate::connection::connection_state::{ConnectionState, StateChange, StateChangeReason};
use crate::dispatch::dispatcher::{CommandInterpreter, DispatchContext, Dispatcher};
use crate::dispatch::toc_events::{DisconnectedData, SignedOnData, TocEvent};
use crate::error::TocResult;
use crate::flap::frame_io::{FrameReader, FrameWriter};
use crate::sender::rate_limited_sender::RateLimitedSender;
use crate::session::rendezvous::RendezvousProposal;
use crate::session::session_registry::{Session, SessionEvent, SessionRegistry};
use crate::toc::commands;
use crate::toc::handshake;
use crate::util::observers::{Observer, Observers};
use crate::watchdog::liveness::LivenessState;
use crate::watchdog::{LivenessTarget, Watchdog};


/// A TOC client engine for a single identity.
///
/// [TocClient::sign_on] connects in the background; progress is reported through state changes
///  (see [TocClient::subscribe_state]) and application events (see [TocClient::subscribe]). Once
///  signed on, the engine keeps the connection alive with its liveness watchdog until
///  [TocClient::sign_off] is called or the server rejects the credentials.
///
/// The client must be created inside a tokio runtime. Tasks it spawns hold no strong reference to
///  it, so dropping the last reference shuts it down.
pub struct TocClient {
    config: Arc<ClientConfig>,
    connection: Arc<Connection>,
    dispatcher: Arc<Dispatcher>,
    watchdog: Watchdog,
    online: Arc<AtomicBool>,
    /// set when the server rejected the credentials, cleared by the next explicit sign-on
    auth_failed: Arc<AtomicBool>,
    stream_task: Mutex<Option<JoinHandle<()>>>,
    state_pump: Mutex<Option<JoinHandle<()>>>,
}
impl Debug for TocClient {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "TocClient{{{}: {:?}}}", self.config.screen_name, self.connection.get_state())
    }
}

impl TocClient {
    pub fn new(config: ClientConfig) -> Arc<TocClient> {
        let config = Arc::new(config);
        let connection = Connection::new(config.server.clone());

        let ctx = Arc::new(DispatchContext {
            config: config.clone(),
            sender: Arc::new(RateLimitedSender::new(config.rate_limits)),
            buddies: Arc::new(Mutex::new(BuddyList::new())),
            sessions: Arc::new(SessionRegistry::new()),
            liveness: Arc::new(LivenessState::new()),
            events: Arc::new(Observers::new("toc events")),
        });

        // connection observers run under the connection's lock, so state changes are handled
        //  on a separate task
        let (changes_tx, changes) = mpsc::unbounded_channel();
        let forward_changes: Arc<dyn Observer<StateChange>> = Arc::new(move |change: &StateChange| -> anyhow::Result<()> {
            changes_tx.send(change.clone())
                .map_err(|_| anyhow!("client was dropped"))
        });
        connection.subscribe(forward_changes);

        let client = Arc::new(TocClient {
            config,
            connection,
            dispatcher: Arc::new(Dispatcher::new(ctx)),
            watchdog: Watchdog::new(),
            online: Arc::new(AtomicBool::new(false)),
            auth_failed: Arc::new(AtomicBool::new(false)),
            stream_task: Mutex::new(None),
            state_pump: Mutex::new(None),
        });

        let pump = tokio::spawn(pump_state_changes(Arc::downgrade(&client), changes));
        *client.state_pump.lock().unwrap_or_else(|e| e.into_inner()) = Some(pump);
        client
    }

    fn ctx(&self) -> &Arc<DispatchContext> {
        self.dispatcher.context()
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn state(&self) -> ConnectionState {
        self.connection.get_state()
    }

    /// `true` between a successful sign-on and the end of its connection
    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::Acquire)
    }

    /// Starts connecting and signing on, and starts the liveness watchdog. Fails without side
    ///  effects if the configuration is invalid or a connection is already in progress.
    pub fn sign_on(self: &Arc<Self>) -> TocResult<()> {
        self.connection.connect()?;
        self.auth_failed.store(false, Ordering::Release);
        self.ctx().liveness.reset();

        let target: Weak<TocClient> = Arc::downgrade(self);
        let target: Weak<dyn LivenessTarget> = target;
        self.watchdog.start(self.config.watchdog_interval, self.config.watchdog_verify_delay, self.ctx().liveness.clone(), target);
        Ok(())
    }

    /// Stops the watchdog and closes the connection. Returns `false` if there was nothing to close.
    pub fn sign_off(&self) -> bool {
        self.watchdog.stop();
        self.connection.disconnect()
    }

    pub fn subscribe(&self, observer: Arc<dyn Observer<TocEvent>>) -> bool {
        self.ctx().events.add(observer)
    }

    pub fn unsubscribe(&self, observer: &Arc<dyn Observer<TocEvent>>) -> bool {
        self.ctx().events.remove(observer)
    }

    pub fn subscribe_state(&self, observer: Arc<dyn Observer<StateChange>>) -> bool {
        self.connection.subscribe(observer)
    }

    pub fn unsubscribe_state(&self, observer: &Arc<dyn Observer<StateChange>>) -> bool {
        self.connection.unsubscribe(observer)
    }

    pub async fn register_interpreter(&self, command: &str, interpreter: Arc<dyn CommandInterpreter>) -> anyhow::Result<()> {
        self.dispatcher.register_interpreter(command, interpreter).await
    }

    pub async fn deregister_interpreter(&self, command: &str) -> anyhow::Result<()> {
        self.dispatcher.deregister_interpreter(command).await
    }

    pub fn buddies(&self) -> MutexGuard<'_, BuddyList> {
        self.ctx().buddies()
    }

    pub fn sessions(&self) -> &Arc<SessionRegistry> {
        &self.ctx().sessions
    }

    pub fn sender(&self) -> &Arc<RateLimitedSender> {
        &self.ctx().sender
    }

    async fn send_all(&self, commands: Vec<String>) -> TocResult<()> {
        for command in commands {
            self.ctx().sender.send_command(&command).await?;
        }
        Ok(())
    }

    /// Sends a message, split into several if it exceeds the maximum message size
    pub async fn send_im(&self, recipient: &str, message: &str) -> TocResult<()> {
        self.send_all(commands::send_im(recipient, message, false, self.config.max_message_chunk)).await
    }

    /// Marks the local identity as away with the given message, or back with `None`
    pub async fn set_away(&self, message: Option<&str>) -> TocResult<()> {
        self.ctx().sender.send_command(&commands::set_away(message)).await
    }

    pub async fn set_info(&self, profile: &str) -> TocResult<()> {
        self.ctx().sender.send_command(&commands::set_info(profile)).await
    }

    pub async fn warn_user(&self, screen_name: &str, anonymous: bool) -> TocResult<()> {
        self.ctx().sender.send_command(&commands::evil(screen_name, anonymous)).await
    }

    /// Adds buddies to a group on the server and in the local buddy list
    pub async fn add_buddies(&self, group: &str, screen_names: &[&str]) -> TocResult<()> {
        {
            let mut buddies = self.buddies();
            for screen_name in screen_names {
                buddies.add_to_group(screen_name, group);
            }
        }
        self.send_all(commands::new_buddies(group, screen_names.iter().copied(), self.config.max_buddy_batch)).await
    }

    pub async fn remove_buddies(&self, group: &str, screen_names: &[&str]) -> TocResult<()> {
        {
            let mut buddies = self.buddies();
            for screen_name in screen_names {
                buddies.remove(screen_name);
            }
        }
        self.send_all(commands::remove_buddies(group, screen_names.iter().copied(), self.config.max_buddy_batch)).await
    }

    pub async fn add_permit(&self, screen_names: &[&str]) -> TocResult<()> {
        {
            let mut buddies = self.buddies();
            for screen_name in screen_names {
                buddies.add_permit(screen_name);
            }
        }
        self.send_all(commands::add_permit(screen_names.iter().copied(), self.config.max_buddy_batch)).await
    }

    pub async fn add_deny(&self, screen_names: &[&str]) -> TocResult<()> {
        {
            let mut buddies = self.buddies();
            for screen_name in screen_names {
                buddies.add_deny(screen_name);
            }
        }
        self.send_all(commands::add_deny(screen_names.iter().copied(), self.config.max_buddy_batch)).await
    }

    pub async fn set_permit_mode(&self, mode: PermitMode) -> TocResult<()> {
        self.buddies().set_permit_mode(mode);
        self.ctx().sender.send_command(&commands::set_pdmode(mode)).await
    }

    /// Starts a new outgoing rendezvous session with `peer`
    pub fn create_session(&self, peer: &str) -> Arc<Session> {
        self.ctx().sessions.create_session(peer)
    }

    pub async fn accept_rendezvous(&self, proposal: &RendezvousProposal) -> TocResult<()> {
        self.ctx().sender.send_command(&commands::rvous_accept(&proposal.peer, &proposal.cookie, &proposal.service)).await
    }

    /// Declines a proposal and notifies the session's listeners
    pub async fn cancel_rendezvous(&self, proposal: &RendezvousProposal) -> TocResult<()> {
        let sent = self.ctx().sender.send_command(&commands::rvous_cancel(&proposal.peer, &proposal.cookie, &proposal.service)).await;
        self.ctx().sessions.route(proposal.session_id, &proposal.peer, &SessionEvent::Cancelled);
        sent
    }

    fn on_state_change(&self, change: StateChange) {
        match change.new_state {
            ConnectionState::Connected => {
                let driver = StreamDriver {
                    config: self.config.clone(),
                    connection: self.connection.clone(),
                    dispatcher: self.dispatcher.clone(),
                    online: self.online.clone(),
                    auth_failed: self.auth_failed.clone(),
                };
                let task = tokio::spawn(driver.run());
                *self.stream_task.lock().unwrap_or_else(|e| e.into_inner()) = Some(task);
            }
            ConnectionState::NotConnected | ConnectionState::Failed => {
                self.online.store(false, Ordering::Release);
                self.ctx().sender.detach();
                self.ctx().liveness.reset();

                if self.auth_failed.load(Ordering::Acquire) {
                    warn!("credentials were rejected - not reconnecting");
                    self.watchdog.stop();
                }
                self.ctx().emit(TocEvent::Disconnected(DisconnectedData { reason: change.reason }));
            }
            _ => {}
        }
    }
}

impl Drop for TocClient {
    fn drop(&mut self) {
        self.watchdog.stop();
        self.connection.disconnect();
        if let Some(task) = self.stream_task.lock().unwrap_or_else(|e| e.into_inner()).take() {
            task.abort();
        }
        if let Some(task) = self.state_pump.lock().unwrap_or_else(|e| e.into_inner()).take() {
            task.abort();
        }
    }
}

#[async_trait]
impl LivenessTarget for TocClient {
    fn is_online(&self) -> bool {
        TocClient::is_online(self)
    }

    async fn send_probe(&self, token: &str) -> anyhow::Result<()> {
        self.send_im(&self.config.screen_name, token).await?;
        Ok(())
    }

    async fn reconnect(&self) -> anyhow::Result<()> {
        if self.auth_failed.load(Ordering::Acquire) {
            debug!("credentials were rejected - not reconnecting");
            return Ok(());
        }

        info!("reconnecting");
        self.connection.drop_connection();
        self.connection.connect()?;
        Ok(())
    }
}


async fn pump_state_changes(client: Weak<TocClient>, mut changes: mpsc::UnboundedReceiver<StateChange>) {
    while let Some(change) = changes.recv().await {
        let Some(client) = client.upgrade() else { break };
        client.on_state_change(change);
    }
}


/// Serves one connected stream: sign-on, then the read loop until the stream ends
struct StreamDriver {
    config: Arc<ClientConfig>,
    connection: Arc<Connection>,
    dispatcher: Arc<Dispatcher>,
    online: Arc<AtomicBool>,
    auth_failed: Arc<AtomicBool>,
}
impl StreamDriver {
    async fn run(self) {
        let Some(ConnectedStream { id, stream, closed }) = self.connection.take_stream() else {
            debug!("connected stream is gone already");
            return;
        };

        let (read, write) = stream.into_split();
        let writer = Arc::new(FrameWriter::new(write, closed.clone()));
        let mut reader = FrameReader::new(read, closed, self.config.handshake_timeout);

        let ctx = self.dispatcher.context().clone();
        ctx.sender.attach(writer.clone());

        let signed_on = handshake::sign_on(&self.config, &mut reader, &*writer, &ctx.sender, |outcome| {
            self.online.store(true, Ordering::Release);
            ctx.emit(TocEvent::SignedOn(SignedOnData {
                screen_name: self.config.screen_name.clone(),
                display_name: outcome.display_name.clone(),
            }));
        }).await;

        if let Err(e) = signed_on {
            warn!("sign-on failed: {}", e);
            if e.is_authentication_failure() {
                self.auth_failed.store(true, Ordering::Release);
            }
            self.connection.close_stream(id, StateChangeReason::error(e));
            return;
        }

        let reason = self.dispatcher.run(&mut reader).await;
        if reason.is_authentication_failure() {
            self.auth_failed.store(true, Ordering::Release);
        }
        self.connection.on_io_error(id, reason);
    }
}
