// Protocol messages exchanged between the two peers.
//
// The protocol is symmetric: both sides send the same `PeerMessage` enum.
// A session is one `Hello` each way, then any number of `Event`s, then
// `Finished` (possibly repeated at a later frame), then an optional
// `Goodbye`. Events carry `RemoteEvent` straight from the rollback crate; a
// missing diff is a heartbeat.

use multiphy_rollback::{Frame, RemoteEvent};
use serde::{Deserialize, Serialize};

use crate::types::PeerSlot;

/// Messages sent by either peer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum PeerMessage {
    /// Handshake. Both sides must agree on version and sandbox config.
    Hello {
        protocol_version: u32,
        slot: PeerSlot,
        config_hash: u64,
    },
    /// A control diff (or heartbeat) at a frame.
    Event(RemoteEvent),
    /// Sender stopped predicting at `frame`: a heartbeat there, plus the
    /// promise that no diff will follow unless a later `Finished` does.
    Finished { frame: Frame },
    /// Peer is leaving gracefully.
    Goodbye,
}

impl From<RemoteEvent> for PeerMessage {
    fn from(ev: RemoteEvent) -> Self {
        PeerMessage::Event(ev)
    }
}
