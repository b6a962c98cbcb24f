use std::collections::hash_map::Entry;
use std::fmt::{Debug, Formatter};
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::anyhow;
use async_trait::async_trait;
#[cfg(test)] use mockall::automock;
use rustc_hash::FxHashMap;
use tokio::io::AsyncRead;
use tokio::sync::RwLock;
use tracing::{debug, error, info, trace, warn};

use crate::buddy::buddy_list::BuddyList;
use crate::client::client_config::ClientConfig;
use crate::dispatch::interpreters::builtin_interpreters;
use crate::dispatch::toc_events::{ErrorData, TocEvent};
use crate::error::TocError;
use crate::flap::frame::{Frame, FrameKind};
use crate::flap::frame_io::{FrameReader, ReadOutcome};
use crate::sender::rate_limited_sender::RateLimitedSender;
use crate::session::session_registry::SessionRegistry;
use crate::toc::command_line::CommandLine;
use crate::util::observers::Observers;
use crate::watchdog::liveness::LivenessState;


/// What the read loop does after a command was interpreted
#[derive(Debug)]
pub enum Disposition {
    Continue,
    /// close the connection for the given reason
    Terminate(TocError),
}


/// Handles one server command, selected by the command's name
#[cfg_attr(test, automock)]
#[async_trait]
pub trait CommandInterpreter: Send + Sync + 'static {
    async fn interpret(&self, line: &CommandLine, ctx: &DispatchContext) -> anyhow::Result<Disposition>;
}


/// Everything interpreters may act on
pub struct DispatchContext {
    pub config: Arc<ClientConfig>,
    pub sender: Arc<RateLimitedSender>,
    pub buddies: Arc<Mutex<BuddyList>>,
    pub sessions: Arc<SessionRegistry>,
    pub liveness: Arc<LivenessState>,
    pub events: Arc<Observers<TocEvent>>,
}
impl Debug for DispatchContext {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "DispatchContext{{{}}}", self.config.screen_name)
    }
}
impl DispatchContext {
    pub fn buddies(&self) -> MutexGuard<'_, BuddyList> {
        self.buddies.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn emit(&self, event: TocEvent) {
        trace!("emitting {:?}", event);
        self.events.notify(&event);
    }
}


/// Routes incoming frames to command interpreters.
///
/// Frames are processed strictly in order: the next frame is read only after the previous one's
///  interpreter finished. Interpreters run as separate tasks though, so a failing or panicking
///  interpreter is logged and reported as an [TocEvent::Error] without affecting the connection.
pub struct Dispatcher {
    ctx: Arc<DispatchContext>,
    interpreters: RwLock<FxHashMap<String, Arc<dyn CommandInterpreter>>>,
}
impl Debug for Dispatcher {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Dispatcher{{{:?}}}", self.ctx)
    }
}

impl Dispatcher {
    pub fn new(ctx: Arc<DispatchContext>) -> Dispatcher {
        let interpreters = builtin_interpreters().into_iter()
            .map(|(name, interpreter)| (name.to_string(), interpreter))
            .collect();

        Dispatcher {
            ctx,
            interpreters: RwLock::new(interpreters),
        }
    }

    pub fn context(&self) -> &Arc<DispatchContext> {
        &self.ctx
    }

    pub async fn register_interpreter(&self, command: &str, interpreter: Arc<dyn CommandInterpreter>) -> anyhow::Result<()> {
        match self.interpreters.write().await
            .entry(command.to_string())
        {
            Entry::Occupied(_) => {
                Err(anyhow!("registering a second interpreter for command {:?}", command))
            }
            Entry::Vacant(e) => {
                e.insert(interpreter);
                Ok(())
            }
        }
    }

    pub async fn deregister_interpreter(&self, command: &str) -> anyhow::Result<()> {
        let prev = self.interpreters.write().await
            .remove(command);
        if prev.is_none() {
            return Err(anyhow!("deregistering an interpreter that was not previously registered: {:?}", command));
        }
        Ok(())
    }

    /// The steady state read loop. It returns the reason for terminating, which is always an
    ///  error: the loop only ends when the connection does.
    pub async fn run<R: AsyncRead + Unpin>(&self, reader: &mut FrameReader<R>) -> TocError {
        loop {
            match reader.read_frame().await {
                Ok(ReadOutcome::Idle) => {}
                Ok(ReadOutcome::Frame(frame)) => {
                    if let Disposition::Terminate(reason) = self.dispatch(frame).await {
                        info!("terminating connection: {}", reason);
                        return reason;
                    }
                }
                Err(e) => {
                    debug!("read loop ends: {}", e);
                    return e;
                }
            }
        }
    }

    pub async fn dispatch(&self, frame: Frame) -> Disposition {
        match frame.kind {
            FrameKind::Data => {}
            FrameKind::KeepAlive => {
                trace!("keep-alive");
                return Disposition::Continue;
            }
            FrameKind::Signoff => return Disposition::Terminate(TocError::ClosedRemotely),
            FrameKind::Error => return Disposition::Terminate(TocError::ProtocolViolation(format!("server sent an error frame: {:?}", frame))),
            FrameKind::Signon => {
                warn!("unexpected signon frame after sign-on - ignoring");
                return Disposition::Continue;
            }
        }

        let line = CommandLine::from_frame(&frame);
        let interpreter = self.interpreters.read().await
            .get(line.name())
            .cloned();

        let Some(interpreter) = interpreter else {
            debug!("no interpreter for {:?}", line.name());
            self.ctx.emit(TocEvent::Command(line));
            return Disposition::Continue;
        };

        let name = line.name().to_string();
        let ctx = self.ctx.clone();
        let result = tokio::spawn(async move {
            interpreter.interpret(&line, &ctx).await
        }).await;

        match result {
            Ok(Ok(disposition)) => disposition,
            Ok(Err(e)) => {
                warn!("failed to interpret {} - skipping: {}", name, e);
                self.ctx.emit(TocEvent::Error(ErrorData { message: format!("{}: {}", name, e) }));
                Disposition::Continue
            }
            Err(e) => {
                error!("interpreter for {} panicked - skipping: {}", name, e);
                self.ctx.emit(TocEvent::Error(ErrorData { message: format!("{}: interpreter panicked", name) }));
                Disposition::Continue
            }
        }
    }
}
