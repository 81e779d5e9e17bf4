// Length-delimited message framing over any byte stream.
//
// Wire format: a 4-byte big-endian length prefix followed by the payload.
// `write_frame` / `read_frame` move raw bytes; `send_message` /
// `recv_message` layer JSON encoding of `PeerMessage` on top, which is what
// the TCP transport uses.
//
// `MAX_MESSAGE_SIZE` (16 MB) bounds the allocation a malformed prefix can
// cause. Control events are tiny, so hitting it means the stream is corrupt.

use std::io::{self, Read, Write};

use thiserror::Error;

use crate::message::PeerMessage;

/// Maximum allowed frame payload size (16 MB).
pub const MAX_MESSAGE_SIZE: u32 = 16 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("frame too large: {len} bytes (max {max})", max = MAX_MESSAGE_SIZE)]
    TooLarge { len: usize },
    #[error("stream closed")]
    Closed,
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
    #[error("malformed message: {0}")]
    Json(#[from] serde_json::Error),
}

impl FrameError {
    /// True when the peer went away rather than sending garbage.
    pub fn is_closed(&self) -> bool {
        match self {
            FrameError::Closed => true,
            FrameError::Io(e) => matches!(
                e.kind(),
                io::ErrorKind::UnexpectedEof
                    | io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::BrokenPipe
            ),
            _ => false,
        }
    }
}

/// Write one frame: 4-byte big-endian length, then payload.
pub fn write_frame<W: Write>(writer: &mut W, payload: &[u8]) -> Result<(), FrameError> {
    let len = u32::try_from(payload.len())
        .ok()
        .filter(|&len| len <= MAX_MESSAGE_SIZE)
        .ok_or(FrameError::TooLarge { len: payload.len() })?;
    writer.write_all(&len.to_be_bytes())?;
    writer.write_all(payload)?;
    writer.flush()?;
    Ok(())
}

/// Read one frame.
///
/// A stream that ends cleanly on a frame boundary yields `Closed`; one that
/// ends mid-frame yields an `UnexpectedEof` I/O error.
pub fn read_frame<R: Read>(reader: &mut R) -> Result<Vec<u8>, FrameError> {
    let mut len_buf = [0u8; 4];
    let mut filled = 0;
    while filled < len_buf.len() {
        match reader.read(&mut len_buf[filled..]) {
            Ok(0) if filled == 0 => return Err(FrameError::Closed),
            Ok(0) => return Err(io::Error::from(io::ErrorKind::UnexpectedEof).into()),
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e.into()),
        }
    }
    let len = u32::from_be_bytes(len_buf);
    if len > MAX_MESSAGE_SIZE {
        return Err(FrameError::TooLarge { len: len as usize });
    }
    let mut buf = vec![0u8; len as usize];
    reader.read_exact(&mut buf)?;
    Ok(buf)
}

/// Encode `msg` as JSON and write it as one frame.
pub fn send_message<W: Write>(writer: &mut W, msg: &PeerMessage) -> Result<(), FrameError> {
    let json = serde_json::to_vec(msg)?;
    write_frame(writer, &json)
}

/// Read one frame and decode it as a `PeerMessage`.
pub fn recv_message<R: Read>(reader: &mut R) -> Result<PeerMessage, FrameError> {
    let buf = read_frame(reader)?;
    Ok(serde_json::from_slice(&buf)?)
}
