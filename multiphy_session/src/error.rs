// Error types for transports and the session loop.
//
// `TransportError::Closed` is the one condition every transport must report
// the same way: the peer is gone and nothing more will arrive. The session
// turns it (and a received `Goodbye`) into `SessionError::Ended`, which is a
// normal way for a session to stop, not a fault.
//
// A peer message that cannot be decoded or applied is a fault. The session
// returns the underlying error once and stays ended with
// `EndReason::Faulted` afterwards, since its confirmed timeline can no
// longer match the peer's.

use std::fmt;

use multiphy_protocol::{FrameError, PeerSlot};
use multiphy_rollback::RollbackError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("peer connection closed")]
    Closed,
    #[error("peer speaks protocol version {theirs}, we speak {ours}")]
    VersionMismatch { ours: u32, theirs: u32 },
    #[error("peer config hash {theirs:#018x} does not match ours {ours:#018x}")]
    ConfigMismatch { ours: u64, theirs: u64 },
    #[error("peer claims slot {theirs}, expected {expected}")]
    SlotMismatch {
        expected: PeerSlot,
        theirs: PeerSlot,
    },
    #[error("expected Hello, got {0}")]
    UnexpectedMessage(String),
    #[error(transparent)]
    Frame(FrameError),
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<FrameError> for TransportError {
    fn from(err: FrameError) -> Self {
        if err.is_closed() {
            TransportError::Closed
        } else {
            TransportError::Frame(err)
        }
    }
}

/// Why a session stopped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EndReason {
    /// The peer sent `Goodbye`.
    PeerLeft,
    /// The transport closed without a `Goodbye`.
    Disconnected,
    /// A peer message could not be decoded or applied.
    Faulted,
}

impl fmt::Display for EndReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EndReason::PeerLeft => f.write_str("peer left"),
            EndReason::Disconnected => f.write_str("peer disconnected"),
            EndReason::Faulted => f.write_str("peer message rejected"),
        }
    }
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session ended: {0}")]
    Ended(EndReason),
    #[error("rollback failed: {0}")]
    Rollback(#[from] RollbackError),
    #[error("transport failed: {0}")]
    Transport(TransportError),
    #[error("peer did not confirm frame {frame} in time (confirmed {confirmed})")]
    ConfirmTimeout { frame: u64, confirmed: u64 },
}

impl From<TransportError> for SessionError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Closed => SessionError::Ended(EndReason::Disconnected),
            other => SessionError::Transport(other),
        }
    }
}
