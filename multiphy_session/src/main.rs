// CLI entry point for a headless multiphy peer.
//
// Runs the sandbox at a fixed tick rate against one remote peer over TCP,
// driving this peer's cart from a seeded input script. At the end both
// peers exchange final confirmations, and each prints its confirmed frame
// and world checksum; two terminals showing the same line is the whole
// point of the exercise.
//
// Usage:
//   multiphy-peer host [--port 7979] [OPTIONS]
//   multiphy-peer join --addr 127.0.0.1:7979 [OPTIONS]
//
// Logging goes through `tracing`; `RUST_LOG=multiphy_rollback=debug` shows
// every rollback.

use std::net::TcpListener;
use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use multiphy_protocol::PeerSlot;
use multiphy_rollback::SimWorld;
use multiphy_sandbox::{
    CartStepper, SandboxConfig, SandboxCoordinator, SandboxWorld, ScriptedInput, sandbox_handle,
};
use multiphy_session::{
    Handshake, PeerSession, SessionConfig, SessionError, TcpTransport, Transport,
};
use tracing::{debug, info, warn};

/// Headless two-peer rollback sandbox
#[derive(Parser, Debug)]
#[command(name = "multiphy-peer")]
#[command(about = "Run the multiphy sandbox against one remote peer", long_about = None)]
struct Args {
    #[command(subcommand)]
    mode: Mode,

    /// Ticks to simulate before shutting down
    #[arg(long, global = true, default_value = "600")]
    ticks: u64,

    /// Wall-clock milliseconds per tick
    #[arg(long, global = true, default_value = "16")]
    tick_ms: u64,

    /// Seed for the scripted input (defaults to the slot number)
    #[arg(long, global = true)]
    seed: Option<u64>,

    /// Sandbox config JSON; both peers must use the same one
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Heartbeat after this many ticks without sending
    #[arg(long, global = true, default_value = "20")]
    heartbeat_ticks: u32,
}

#[derive(Subcommand, Debug)]
enum Mode {
    /// Wait for a peer to connect
    Host {
        #[arg(long, default_value = "7979")]
        port: u16,
    },
    /// Connect to a hosting peer
    Join {
        #[arg(long)]
        addr: String,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("multiphy_session=info".parse()?)
                .add_directive("multiphy_peer=info".parse()?),
        )
        .init();

    let args = Args::parse();

    let sandbox = match &args.config {
        Some(path) => SandboxConfig::load(path)
            .with_context(|| format!("loading sandbox config {}", path.display()))?,
        None => SandboxConfig::default(),
    };

    let slot = match args.mode {
        Mode::Host { .. } => PeerSlot::HOST,
        Mode::Join { .. } => PeerSlot::JOINER,
    };
    let handshake = Handshake {
        slot,
        config_hash: sandbox.config_hash(),
    };

    let transport = match &args.mode {
        Mode::Host { port } => {
            let listener = TcpListener::bind(("0.0.0.0", *port))
                .with_context(|| format!("binding port {port}"))?;
            info!(addr = %listener.local_addr()?, "waiting for peer");
            TcpTransport::host(&listener, handshake).context("accepting peer")?
        }
        Mode::Join { addr } => TcpTransport::connect(addr.as_str(), handshake)
            .with_context(|| format!("joining {addr}"))?,
    };

    let config = SessionConfig {
        slot,
        heartbeat_after_ticks: args.heartbeat_ticks,
        tick_duration: Duration::from_millis(args.tick_ms),
        ..SessionConfig::default()
    };
    let handle = sandbox_handle(sandbox).context("building sandbox world")?;
    let coordinator = SandboxCoordinator::new(handle).context("snapshotting sandbox world")?;
    let mut session = PeerSession::new(coordinator, transport, config);
    let mut input = ScriptedInput::new(args.seed.unwrap_or(u64::from(slot.0)), 10, 90);

    run(&mut session, &mut input, args.ticks)?;

    let confirmed = match session.flush_confirmation().and_then(|()| session.wait_confirmed()) {
        Ok(frame) => frame,
        Err(SessionError::Ended(reason)) => {
            warn!(%reason, "peer gone before final confirmation");
            session.coordinator().sure_frame()
        }
        Err(err) => return Err(err).context("waiting for final confirmation"),
    };

    let stats = session.stats();
    let coordinator = session.close();
    let checksum = coordinator.sure_world().checksum().unwrap_or_default();
    info!(
        events = stats.events_sent,
        heartbeats = stats.heartbeats_sent,
        rollbacks = stats.rollbacks,
        max_depth = stats.max_depth,
        "done"
    );
    println!("confirmed frame {confirmed} checksum {checksum:016x}");
    Ok(())
}

/// Fixed-rate tick loop. Ends early, without error, if the peer leaves.
fn run<T: Transport>(
    session: &mut PeerSession<SandboxWorld, CartStepper, T>,
    input: &mut ScriptedInput,
    ticks: u64,
) -> Result<()> {
    let tick_duration = session.config().tick_duration;
    let mut next_tick = Instant::now();
    for _ in 0..ticks {
        match session.tick(&input.next_input()) {
            Ok(report) if report.rollbacks > 0 => {
                debug!(
                    frame = report.frame,
                    confirmed = report.confirmed,
                    depth = report.max_depth,
                    "rolled back"
                );
            }
            Ok(_) => {}
            Err(SessionError::Ended(reason)) => {
                warn!(%reason, "session ended early");
                return Ok(());
            }
            Err(err) => return Err(err).context("tick failed"),
        }

        next_tick += tick_duration;
        if let Some(wait) = next_tick.checked_duration_since(Instant::now()) {
            thread::sleep(wait);
        }
    }
    Ok(())
}
