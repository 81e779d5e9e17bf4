// Session tuning.
//
// Unlike `SandboxConfig`, nothing here has to match between peers: each side
// picks its own heartbeat cadence and tick rate. Only the slot must be
// complementary, which the handshake checks.

use std::time::Duration;

use multiphy_protocol::PeerSlot;

#[derive(Clone, Debug, PartialEq)]
pub struct SessionConfig {
    /// Which side of the session this peer plays.
    pub slot: PeerSlot,
    /// Send a heartbeat once more than this many ticks pass without any
    /// outgoing message.
    pub heartbeat_after_ticks: u32,
    /// Wall-clock duration of one tick for fixed-rate loops.
    pub tick_duration: Duration,
    /// How long `wait_confirmed` waits for the peer's final confirmation.
    pub confirm_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            slot: PeerSlot::HOST,
            heartbeat_after_ticks: 20,
            tick_duration: Duration::from_millis(16),
            confirm_timeout: Duration::from_secs(10),
        }
    }
}

impl SessionConfig {
    pub fn for_slot(slot: PeerSlot) -> Self {
        Self {
            slot,
            ..Self::default()
        }
    }
}
