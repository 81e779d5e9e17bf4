// Test-only peer for multiplayer integration tests.
//
// Wraps a real `PeerSession` over a real `TcpTransport` and a real
// `SandboxWorld` to provide a synchronous, test-friendly API for exercising
// the full pipeline: handshake → scripted input → diffs over TCP → rollback
// → final confirmation → identical confirmed worlds.
//
// The only test-specific code here is the blocking wrappers (polling loops
// with timeouts) and the offline reference replay. All networking and
// rollback logic uses the same code paths as `multiphy-peer`.
//
// See also: `tests/full_pipeline.rs` for the integration test scenarios.

use std::net::TcpListener;
use std::thread;
use std::time::{Duration, Instant};

use multiphy_protocol::PeerSlot;
use multiphy_rollback::{ControlState, Frame, SimWorld};
use multiphy_sandbox::{
    CartStepper, SandboxConfig, SandboxCoordinator, SandboxWorld, ScriptedInput, sandbox_handle,
};
use multiphy_session::{
    EndReason, Handshake, PeerSession, SessionConfig, SessionError, TcpTransport, TransportError,
};

/// Default timeout for blocking operations.
pub const POLL_TIMEOUT: Duration = Duration::from_secs(5);

/// Sleep duration between poll attempts.
const POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Scripted input holds each setting for this many ticks, inclusive.
const HOLD_TICKS: (u32, u32) = (3, 20);

pub fn script(seed: u64) -> ScriptedInput {
    ScriptedInput::new(seed, HOLD_TICKS.0, HOLD_TICKS.1)
}

/// Connect a host and a joiner over loopback TCP. Each side announces its
/// own config hash; the results are whatever each handshake produced.
pub fn tcp_pair(
    host_hash: u64,
    joiner_hash: u64,
) -> (
    Result<TcpTransport, TransportError>,
    Result<TcpTransport, TransportError>,
) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind loopback listener");
    let addr = listener.local_addr().expect("listener address");
    let joiner = thread::spawn(move || {
        TcpTransport::connect(
            addr,
            Handshake {
                slot: PeerSlot::JOINER,
                config_hash: joiner_hash,
            },
        )
    });
    let host = TcpTransport::host(
        &listener,
        Handshake {
            slot: PeerSlot::HOST,
            config_hash: host_hash,
        },
    );
    (host, joiner.join().expect("joiner thread panicked"))
}

/// A sandbox peer with its own input script.
pub struct TestPeer {
    session: PeerSession<SandboxWorld, CartStepper, TcpTransport>,
    script: ScriptedInput,
}

impl TestPeer {
    pub fn new(transport: TcpTransport, config: SessionConfig, seed: u64) -> Self {
        let handle = sandbox_handle(SandboxConfig::default()).expect("default sandbox config");
        let coordinator = SandboxCoordinator::new(handle).expect("fresh sandbox world");
        Self {
            session: PeerSession::new(coordinator, transport, config),
            script: script(seed),
        }
    }

    /// Host and joiner already connected, with distinct input seeds and the
    /// default heartbeat cadence.
    pub fn connected_pair(host_seed: u64, joiner_seed: u64) -> (TestPeer, TestPeer) {
        Self::connected_pair_with_heartbeat(
            host_seed,
            joiner_seed,
            SessionConfig::default().heartbeat_after_ticks,
        )
    }

    pub fn connected_pair_with_heartbeat(
        host_seed: u64,
        joiner_seed: u64,
        heartbeat_after_ticks: u32,
    ) -> (TestPeer, TestPeer) {
        let hash = SandboxConfig::default().config_hash();
        let (host, joiner) = tcp_pair(hash, hash);
        let config = |slot| SessionConfig {
            heartbeat_after_ticks,
            ..SessionConfig::for_slot(slot)
        };
        (
            TestPeer::new(host.expect("host handshake"), config(PeerSlot::HOST), host_seed),
            TestPeer::new(
                joiner.expect("joiner handshake"),
                config(PeerSlot::JOINER),
                joiner_seed,
            ),
        )
    }

    pub fn session(&self) -> &PeerSession<SandboxWorld, CartStepper, TcpTransport> {
        &self.session
    }

    /// One tick with the next scripted input.
    pub fn tick(&mut self) -> Result<(), SessionError> {
        let input = self.script.next_input();
        self.session.tick(&input).map(|_| ())
    }

    /// One tick with explicit input.
    pub fn tick_with(&mut self, input: &ControlState) -> Result<(), SessionError> {
        self.session.tick(input).map(|_| ())
    }

    /// Tick with idle input until the session ends.
    pub fn tick_until_ended(&mut self) -> EndReason {
        let start = Instant::now();
        loop {
            assert!(start.elapsed() < POLL_TIMEOUT, "session never ended");
            match self.session.tick(&ControlState::new()) {
                Ok(_) => thread::sleep(POLL_INTERVAL),
                Err(SessionError::Ended(reason)) => return reason,
                Err(other) => panic!("unexpected session error: {other}"),
            }
        }
    }

    /// Send our final confirmation without waiting for the peer's.
    pub fn flush(&mut self) {
        self.session
            .flush_confirmation()
            .expect("flush final confirmation");
    }

    /// Say goodbye without waiting for anything.
    pub fn leave(self) {
        self.session.close();
    }

    /// Wait for the peer's final confirmation, say goodbye, and report the
    /// confirmed frame and world checksum.
    pub fn finish(mut self) -> (Frame, u64) {
        let frame = self.session.wait_confirmed().expect("final confirmation");
        let coordinator = self.session.close();
        let checksum = coordinator
            .sure_world()
            .checksum()
            .expect("sandbox worlds always checksum");
        (frame, checksum)
    }
}

/// Checksum of a world stepped offline with both scripts merged, no
/// prediction or network involved. What every confirmed timeline should
/// reach when neither peer ran ahead of the other.
pub fn straight_replay(ticks: u64, host_seed: u64, joiner_seed: u64) -> u64 {
    let mut handle = sandbox_handle(SandboxConfig::default()).expect("default sandbox config");
    let mut host = script(host_seed);
    let mut joiner = script(joiner_seed);
    let host_ns = PeerSlot::HOST.namespace();
    let joiner_ns = PeerSlot::JOINER.namespace();
    for _ in 0..ticks {
        let mut controls = host.next_input().namespaced(&host_ns);
        controls.apply(&joiner.next_input().namespaced(&joiner_ns));
        handle.step(&controls);
    }
    handle
        .world()
        .checksum()
        .expect("sandbox worlds always checksum")
}
