use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, bail};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};
use tokio::task::{AbortHandle, JoinHandle};
use tracing::{debug, warn};

use crate::connection::connection::Endpoint;
use crate::flap::frame::FrameKind;
use crate::flap::frame_io::{FrameReader, FrameSink, FrameWriter, ReadOutcome};
use crate::toc::command_line::CommandLine;
use crate::toc::error_catalog::AUTHENTICATION_FAILED;
use crate::toc::handshake::FLAPON_PREAMBLE;
use crate::toc::roasting::{challenge_code, unroast_password};
use crate::util::normalize::normalize;


/// A minimal TOC server on a local port. It accepts every sign-on (unless told otherwise),
///  records the commands it receives and sends whatever it is told to.
pub struct FakeTocServer {
    addr: SocketAddr,
    state: Arc<ServerState>,
    accept_task: JoinHandle<()>,
}

#[derive(Default)]
struct ServerState {
    reject_code: Mutex<Option<u32>>,
    echo_probes: AtomicBool,
    commands: Mutex<Vec<String>>,
    connections: AtomicUsize,
    current: Mutex<Option<mpsc::UnboundedSender<String>>>,
    tasks: Mutex<Vec<AbortHandle>>,
}

impl FakeTocServer {
    pub async fn start() -> anyhow::Result<FakeTocServer> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let state = Arc::new(ServerState::default());

        let accept_task = {
            let state = state.clone();
            tokio::spawn(async move {
                while let Ok((stream, peer)) = listener.accept().await {
                    debug!("fake server: accepted connection from {:?}", peer);
                    state.connections.fetch_add(1, Ordering::SeqCst);

                    let (outbox_tx, outbox) = mpsc::unbounded_channel();
                    *state.current.lock().unwrap_or_else(|e| e.into_inner()) = Some(outbox_tx);

                    let conn_state = state.clone();
                    let task = tokio::spawn(async move {
                        if let Err(e) = serve(&conn_state, stream, outbox).await {
                            debug!("fake server: connection ended: {}", e);
                        }
                    });
                    state.tasks.lock().unwrap_or_else(|e| e.into_inner()).push(task.abort_handle());
                }
            })
        };

        Ok(FakeTocServer {
            addr,
            state,
            accept_task,
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn endpoint(&self) -> Endpoint {
        Endpoint::address(self.addr)
    }

    /// answer sign-on commands with `ERROR:<code>` instead of accepting them
    pub fn set_reject_code(&self, code: Option<u32>) {
        *self.state.reject_code.lock().unwrap_or_else(|e| e.into_inner()) = code;
    }

    /// send messages a client sends to itself back to it, which is what keeps its liveness
    ///  watchdog happy
    pub fn set_echo_probes(&self, echo: bool) {
        self.state.echo_probes.store(echo, Ordering::SeqCst);
    }

    /// the commands received on all connections, without the NUL terminator
    pub fn commands(&self) -> Vec<String> {
        self.state.commands.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn connections(&self) -> usize {
        self.state.connections.load(Ordering::SeqCst)
    }

    /// sends a command on the most recent connection
    pub fn push(&self, line: &str) {
        if let Some(outbox) = self.state.current.lock().unwrap_or_else(|e| e.into_inner()).as_ref() {
            let _ = outbox.send(line.to_string());
        }
    }

    /// closes all connections from the server side
    pub fn drop_connections(&self) {
        *self.state.current.lock().unwrap_or_else(|e| e.into_inner()) = None;
        for task in self.state.tasks.lock().unwrap_or_else(|e| e.into_inner()).drain(..) {
            task.abort();
        }
    }
}
impl Drop for FakeTocServer {
    fn drop(&mut self) {
        self.accept_task.abort();
        self.drop_connections();
    }
}

async fn serve(state: &ServerState, stream: TcpStream, mut outbox: mpsc::UnboundedReceiver<String>) -> anyhow::Result<()> {
    let (read, write) = stream.into_split();
    let (_closed_tx, closed) = watch::channel(false);
    let mut reader = FrameReader::new(read, closed.clone(), Duration::from_secs(5));
    let writer = FrameWriter::with_initial_sequence(write, closed, 1);

    let preamble = reader.read_block(FLAPON_PREAMBLE.len()).await?
        .ok_or_else(|| anyhow!("no preamble"))?;
    if preamble.as_ref() != FLAPON_PREAMBLE {
        bail!("unexpected preamble {:?}", preamble);
    }
    writer.write_frame(FrameKind::Signon, &1u32.to_be_bytes()).await?;

    match reader.read_frame().await? {
        ReadOutcome::Frame(frame) if frame.kind == FrameKind::Signon => {}
        other => bail!("expected signon frame, got {:?}", other),
    }
    let signon = next_command(state, &mut reader).await?;
    let fields = signon.split(' ').collect::<Vec<_>>();
    let (Some(&identity), Some(password), Some(&challenge)) = (fields.get(3), fields.get(4).and_then(|p| unroast_password(p)), fields.last()) else {
        bail!("malformed signon command {:?}", signon);
    };
    let screen_name = normalize(identity);

    let reject_code = *state.reject_code.lock().unwrap_or_else(|e| e.into_inner());
    let reject_code = match reject_code {
        Some(code) => Some(code),
        None if challenge != challenge_code(identity, &password).to_string() => {
            warn!("fake server: wrong challenge response {} for {:?}", challenge, identity);
            Some(AUTHENTICATION_FAILED)
        }
        None => None,
    };
    if let Some(code) = reject_code {
        writer.write_frame(FrameKind::Data, format!("ERROR:{}:", code).as_bytes()).await?;
        return Ok(());
    }
    writer.write_frame(FrameKind::Data, b"SIGN_ON:TOC2.0").await?;
    writer.write_frame(FrameKind::Data, format!("NICK:{}", screen_name).as_bytes()).await?;

    reader.set_timeout(Duration::from_millis(50));
    loop {
        while let Ok(line) = outbox.try_recv() {
            writer.write_frame(FrameKind::Data, line.as_bytes()).await?;
        }

        let ReadOutcome::Frame(frame) = reader.read_frame().await? else { continue };
        if frame.kind != FrameKind::Data {
            continue;
        }
        let command = record(state, &CommandLine::from_frame(&frame).text());

        if state.echo_probes.load(Ordering::SeqCst) {
            if let Some(message) = message_to(&screen_name, &command) {
                writer.write_frame(FrameKind::Data, format!("IM_IN2:{}:F:F:{}", screen_name, message).as_bytes()).await?;
            }
        }
    }
}

async fn next_command(state: &ServerState, reader: &mut FrameReader) -> anyhow::Result<String> {
    match reader.read_frame().await? {
        ReadOutcome::Frame(frame) if frame.kind == FrameKind::Data => Ok(record(state, &CommandLine::from_frame(&frame).text())),
        other => bail!("expected a command, got {:?}", other),
    }
}

fn record(state: &ServerState, command: &str) -> String {
    debug!("fake server: received {:?}", command);
    state.commands.lock().unwrap_or_else(|e| e.into_inner()).push(command.to_string());
    command.to_string()
}

/// the unescaped message body if `command` sends a message to `recipient`
fn message_to(recipient: &str, command: &str) -> Option<String> {
    let quoted = command.strip_prefix(&format!("toc2_send_im {} ", recipient))?;
    let quoted = quoted.strip_suffix(" auto").unwrap_or(quoted);
    let body = quoted.strip_prefix('"')?.strip_suffix('"')?;

    let mut result = String::with_capacity(body.len());
    let mut escaped = false;
    for ch in body.chars() {
        if ch == '\\' && !escaped {
            escaped = true;
            continue;
        }
        escaped = false;
        result.push(ch);
    }
    if escaped {
        warn!("fake server: dangling escape in {:?}", command);
    }
    Some(result)
}
