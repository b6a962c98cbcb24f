use std::fmt::{Debug, Formatter};

use bytes::{Buf, BufMut, Bytes, BytesMut};
use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::error::{TocError, TocResult};


/// Every frame starts with this marker byte
pub const FLAP_MARKER: u8 = b'*';

/// marker, kind, sequence number, payload length
pub const FRAME_HEADER_LEN: usize = 6;

pub const MAX_PAYLOAD_LEN: usize = u16::MAX as usize;

#[derive(Copy, Clone, Debug, Eq, PartialEq, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum FrameKind {
    Signon = 1,
    Data = 2,
    Error = 3,
    Signoff = 4,
    KeepAlive = 5,
}


/// A single FLAP frame:
///
/// ```ascii
///  0       1       2       3       4       5       6
/// +-------+-------+-------+-------+-------+-------+------------...
/// |  '*'  | kind  | sequence (BE) | length (BE)   | payload
/// +-------+-------+-------+-------+-------+-------+------------...
/// ```
///
/// The sequence number is assigned by the sending side and wraps around. The server does not
///  reorder or validate sequence numbers on a single TCP stream, and neither does the receiving
///  side here - it is decoded for diagnostics only.
#[derive(Clone, Eq, PartialEq)]
pub struct Frame {
    pub kind: FrameKind,
    pub sequence: u16,
    pub payload: Bytes,
}
impl Debug for Frame {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.kind {
            FrameKind::Data => write!(f, "Frame{{{:?}#{}: {:?}}}", self.kind, self.sequence, String::from_utf8_lossy(&self.payload)),
            _ => write!(f, "Frame{{{:?}#{}: {:02x?}}}", self.kind, self.sequence, self.payload.as_ref()),
        }
    }
}

impl Frame {
    pub fn new(kind: FrameKind, sequence: u16, payload: impl Into<Bytes>) -> Frame {
        Frame {
            kind,
            sequence,
            payload: payload.into(),
        }
    }

    pub fn encoded_len(&self) -> usize {
        FRAME_HEADER_LEN + self.payload.len()
    }

    pub fn encode(&self, buf: &mut BytesMut) -> TocResult<()> {
        Self::encode_parts(self.kind, self.sequence, &self.payload, buf)
    }

    pub fn encode_parts(kind: FrameKind, sequence: u16, payload: &[u8], buf: &mut BytesMut) -> TocResult<()> {
        let len: u16 = payload.len().try_into()
            .map_err(|_| TocError::ProtocolViolation(format!("frame payload of {} bytes exceeds the maximum of {} bytes", payload.len(), MAX_PAYLOAD_LEN)))?;

        buf.reserve(FRAME_HEADER_LEN + payload.len());
        buf.put_u8(FLAP_MARKER);
        buf.put_u8(kind.into());
        buf.put_u16(sequence);
        buf.put_u16(len);
        buf.put_slice(payload);
        Ok(())
    }

    /// Decodes the first frame in the buffer, consuming it. Returns `None` without consuming
    ///  anything if the buffer does not yet contain a complete frame.
    pub fn try_decode(buf: &mut BytesMut) -> TocResult<Option<Frame>> {
        if buf.is_empty() {
            return Ok(None);
        }
        if buf[0] != FLAP_MARKER {
            return Err(TocError::ProtocolViolation(format!("expected frame marker, got 0x{:02x}", buf[0])));
        }
        if buf.len() < FRAME_HEADER_LEN {
            return Ok(None);
        }

        let kind = FrameKind::try_from(buf[1])
            .map_err(|e| TocError::ProtocolViolation(format!("invalid frame kind: {}", e)))?;
        let payload_len = u16::from_be_bytes([buf[4], buf[5]]) as usize;
        if buf.len() < FRAME_HEADER_LEN + payload_len {
            return Ok(None);
        }

        let mut header = buf.split_to(FRAME_HEADER_LEN);
        header.advance(2);
        let sequence = header.get_u16();
        let payload = buf.split_to(payload_len).freeze();

        Ok(Some(Frame {
            kind,
            sequence,
            payload,
        }))
    }
}
