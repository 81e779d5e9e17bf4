// multiphy_session — runs a rollback coordinator against a live peer.
//
// This crate sits between `multiphy_rollback` (pure reconciliation logic)
// and the network. It owns the per-tick loop, the heartbeat policy, and the
// transports that carry `multiphy_protocol` messages.
//
// Module overview:
// - `session.rs`:    `PeerSession` — drain remote events, step local input,
//                    send diffs and heartbeats, two-phase shutdown.
// - `transport.rs`:  `Transport` trait, in-memory `LoopbackTransport`, and
//                    `TcpTransport` (handshake + reader thread + mpsc).
// - `config.rs`:     `SessionConfig` — slot, heartbeat cadence, tick rate.
// - `error.rs`:      `TransportError`, `SessionError`, `EndReason`.
// - `main.rs`:       `multiphy-peer` CLI running the sandbox headless.

pub mod config;
pub mod error;
pub mod session;
pub mod transport;

pub use config::SessionConfig;
pub use error::{EndReason, SessionError, TransportError};
pub use session::{PeerSession, SessionStats, TickReport};
pub use transport::{Handshake, LoopbackTransport, TcpTransport, Transport};
