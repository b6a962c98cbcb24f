use bytes::{BufMut, BytesMut};
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, info, warn};

use crate::client::client_config::ClientConfig;
use crate::error::{TocError, TocResult};
use crate::flap::frame::{Frame, FrameKind};
use crate::flap::frame_io::{FrameReader, FrameWriter, ReadOutcome};
use crate::sender::rate_limited_sender::RateLimitedSender;
use crate::toc::command_line::CommandLine;
use crate::toc::commands;
use crate::toc::error_catalog::{ServerError, UNKNOWN_ERROR};
use crate::util::normalize::normalize;


pub const FLAPON_PREAMBLE: &[u8] = b"FLAPON\r\n\r\n";

/// The server's signon frame: header plus a four byte FLAP version
pub const SIGNON_ACK_LEN: usize = 10;

const FLAP_VERSION: u32 = 1;
const TLV_SCREEN_NAME: u16 = 1;


#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct SignonOutcome {
    /// the screen name as formatted by the server, if it sent one
    pub display_name: Option<String>,
}


/// Payload of the client's signon frame: FLAP version, then the screen name as a TLV
pub fn signon_frame_payload(screen_name: &str) -> TocResult<BytesMut> {
    let normalized = normalize(screen_name);
    let len: u16 = normalized.len().try_into()
        .map_err(|_| TocError::InvalidConfiguration(format!("screen name of {} bytes is too long", normalized.len())))?;

    let mut buf = BytesMut::with_capacity(8 + normalized.len());
    buf.put_u32(FLAP_VERSION);
    buf.put_u16(TLV_SCREEN_NAME);
    buf.put_u16(len);
    buf.put_slice(normalized.as_bytes());
    Ok(buf)
}


/// Signs on over a freshly connected stream. Every step must succeed in order, any deviation
///  aborts the sign-on.
///
/// `on_online` is called after the server accepted the sign-on and `toc_init_done` was sent, but
///  before the profile is sent. On success, the reader is left with the steady state read timeout.
pub async fn sign_on<R, W>(
    config: &ClientConfig,
    reader: &mut FrameReader<R>,
    writer: &FrameWriter<W>,
    sender: &RateLimitedSender,
    on_online: impl FnOnce(&SignonOutcome),
) -> TocResult<SignonOutcome>
where R: AsyncRead + Unpin,
      W: AsyncWrite + Unpin + Send,
{
    reader.set_timeout(config.handshake_timeout);

    debug!("sending FLAP preamble");
    writer.write_raw(FLAPON_PREAMBLE).await?;

    let ack = reader.read_block(SIGNON_ACK_LEN).await?
        .ok_or(TocError::HandshakeTimeout("signon acknowledgement"))?;
    let mut ack = BytesMut::from(ack.as_ref());
    match Frame::try_decode(&mut ack)? {
        Some(frame) if frame.kind == FrameKind::Signon => {
            debug!("server acknowledged FLAP signon: {:?}", frame);
        }
        other => {
            return Err(TocError::ProtocolViolation(format!("expected signon acknowledgement, got {:?}", other)));
        }
    }

    sender.send_frame(FrameKind::Signon, &signon_frame_payload(&config.screen_name)?).await?;
    sender.send_command(&commands::signon(&commands::SignonParams {
        auth_host: &config.auth_host,
        auth_port: config.auth_port,
        screen_name: &config.screen_name,
        password: &config.password,
        language: &config.language,
        revision: &config.revision,
    })).await?;

    let response = read_command(reader, "sign-on response").await?;
    if response.name() != "SIGN_ON" {
        return Err(TocError::ProtocolViolation(format!("expected SIGN_ON, got {:?}", response)));
    }
    debug!("server accepted sign-on: {}", response.tail(0));

    let mut outcome = SignonOutcome::default();
    let second = read_command(reader, "post sign-on message").await?;
    match second.name() {
        "NICK" => outcome.display_name = Some(second.tail(0)),
        _ => debug!("ignoring post sign-on message {:?}", second),
    }

    sender.send_command(commands::INIT_DONE).await?;
    info!(screen_name = config.screen_name.as_str(), display_name = ?outcome.display_name, "signed on");
    on_online(&outcome);

    sender.send_command(&commands::set_info(&config.profile)).await?;

    reader.set_timeout(config.read_timeout);
    Ok(outcome)
}

/// Reads the next data frame as a command, turning server errors into errors
async fn read_command<R: AsyncRead + Unpin>(reader: &mut FrameReader<R>, expected: &'static str) -> TocResult<CommandLine> {
    let frame = match reader.read_frame().await? {
        ReadOutcome::Frame(frame) => frame,
        ReadOutcome::Idle => return Err(TocError::HandshakeTimeout(expected)),
    };

    match frame.kind {
        FrameKind::Data => {}
        FrameKind::Signoff => return Err(TocError::ClosedRemotely),
        kind => return Err(TocError::ProtocolViolation(format!("expected a data frame as {}, got {:?}", expected, kind))),
    }

    let line = CommandLine::from_frame(&frame);
    if let Some(error) = ServerError::from_command(&line) {
        warn!(code = error.code, "server rejected sign-on: {}", error.message);
        return Err(TocError::Handshake {
            code: error.code,
            message: error.message,
        });
    }
    if line.name() == "ERROR" {
        warn!("server rejected sign-on with an unreadable error: {:?}", line.text());
        return Err(TocError::Handshake {
            code: 0,
            message: UNKNOWN_ERROR.to_string(),
        });
    }
    Ok(line)
}
