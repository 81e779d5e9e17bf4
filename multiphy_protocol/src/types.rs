// Core ID types for the peer protocol.
//
// `PeerSlot` is the only identity a peer has: slot 0 hosts, slot 1 joins.
// It doubles as the control-key namespace, so that both peers feed the same
// keys (`"p0.speed"`, `"p1.speed"`) into the shared world regardless of which
// side produced them.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Bumped whenever `PeerMessage` changes shape.
pub const PROTOCOL_VERSION: u32 = 1;

/// Which side of a two-peer session this is.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PeerSlot(pub u8);

impl PeerSlot {
    pub const HOST: PeerSlot = PeerSlot(0);
    pub const JOINER: PeerSlot = PeerSlot(1);

    /// The other side of a two-peer session.
    pub fn other(self) -> PeerSlot {
        if self == Self::HOST { Self::JOINER } else { Self::HOST }
    }

    /// Prefix applied to this peer's control keys.
    pub fn namespace(self) -> String {
        format!("p{}", self.0)
    }
}

impl fmt::Display for PeerSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "p{}", self.0)
    }
}
