// Peer session — the per-tick loop that joins the coordinator to a
// transport.
//
// Each `tick(local_input)`:
//   1. Drain the transport and fold every remote event into the coordinator,
//      in arrival order. Events are applied before any local stepping, so
//      the coordinator is never entered from two places at once.
//   2. Namespace the local input under this peer's slot (`p0.` / `p1.`).
//      Non-finite values become 0; JSON cannot carry them to the peer.
//   3. `step_local`. A produced event is sent right away.
//   4. Heartbeat policy: once nothing has been sent for more than
//      `heartbeat_after_ticks` ticks, send a heartbeat at the current frame
//      so the peer's confirmed timeline keeps moving while input is idle.
//
// A received `Goodbye` or a closed transport ends the session with
// `SessionError::Ended`. Messages that arrived before the Goodbye are still
// applied. The coordinator itself takes no corrective action on loss.
//
// A message the coordinator refuses (or the transport cannot decode) ends
// the session too: the error is returned once, and every later call reports
// `EndReason::Faulted`. Nothing after a rejected message is applied, so the
// confirmed timeline is never silently missing a diff while ticking on.
//
// Shutdown is two-phase so both peers finish on the same confirmed world:
// `flush_confirmation()` sends `Finished` at our current frame,
// `wait_confirmed()` waits until the peer has sent `Finished` at that same
// frame, and only then `close()` sends Goodbye. Whichever peer stopped
// earlier idles forward to the later frame and re-sends `Finished`.

use std::thread;
use std::time::{Duration, Instant};

use multiphy_protocol::{PeerMessage, PeerSlot};
use multiphy_rollback::{
    ControlState, Frame, RemoteEvent, RemoteOutcome, RollbackCoordinator, SimWorld, Stepper,
};
use tracing::{debug, error, info, warn};

use crate::config::SessionConfig;
use crate::error::{EndReason, SessionError, TransportError};
use crate::transport::Transport;

/// What happened during one `tick`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Predicted frame after the tick.
    pub frame: Frame,
    /// Confirmed frame after the tick.
    pub confirmed: Frame,
    /// Remote diffs folded in (each one a rollback).
    pub rollbacks: u32,
    /// Deepest resimulation this tick.
    pub max_depth: Frame,
    pub sent_event: bool,
    pub sent_heartbeat: bool,
}

/// Running totals over the whole session.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub ticks: u64,
    pub events_sent: u64,
    pub heartbeats_sent: u64,
    pub rollbacks: u64,
    pub max_depth: Frame,
}

pub struct PeerSession<W: SimWorld, S: Stepper<W>, T: Transport> {
    coordinator: RollbackCoordinator<W, S>,
    transport: T,
    config: SessionConfig,
    namespace: String,
    ticks_since_send: u32,
    stats: SessionStats,
    peer_finished: Option<Frame>,
    ended: Option<EndReason>,
}

impl<W: SimWorld, S: Stepper<W>, T: Transport> PeerSession<W, S, T> {
    pub fn new(
        coordinator: RollbackCoordinator<W, S>,
        transport: T,
        config: SessionConfig,
    ) -> Self {
        let namespace = config.slot.namespace();
        Self {
            coordinator,
            transport,
            config,
            namespace,
            ticks_since_send: 0,
            stats: SessionStats::default(),
            peer_finished: None,
            ended: None,
        }
    }

    pub fn slot(&self) -> PeerSlot {
        self.config.slot
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn coordinator(&self) -> &RollbackCoordinator<W, S> {
        &self.coordinator
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    /// Why the session stopped, once it has.
    pub fn ended(&self) -> Option<EndReason> {
        self.ended
    }

    /// Predicted and confirmed frames have met.
    pub fn fully_confirmed(&self) -> bool {
        self.coordinator.sure_frame() >= self.coordinator.current_frame()
    }

    /// Latest frame the peer announced it stopped at.
    pub fn peer_finished(&self) -> Option<Frame> {
        self.peer_finished
    }

    /// One local tick. `local_input` is the full, un-namespaced input.
    pub fn tick(&mut self, local_input: &ControlState) -> Result<TickReport, SessionError> {
        let mut report = self.receive()?;

        let mut input = local_input.namespaced(&self.namespace);
        if !input.is_finite() {
            warn!(frame = self.coordinator.current_frame(), "non-finite input treated as 0");
            input = input.finite_or_zero();
        }
        if let Some(event) = self.coordinator.step_local(&input) {
            debug!(frame = event.frame, keys = event.diff.len(), "sending input change");
            self.send(RemoteEvent::from(event).into())?;
            self.stats.events_sent += 1;
            self.ticks_since_send = 0;
            report.sent_event = true;
        } else {
            self.ticks_since_send = self.ticks_since_send.saturating_add(1);
            if self.ticks_since_send > self.config.heartbeat_after_ticks {
                self.send_heartbeat()?;
                report.sent_heartbeat = true;
            }
        }

        self.stats.ticks += 1;
        report.frame = self.coordinator.current_frame();
        report.confirmed = self.coordinator.sure_frame();
        Ok(report)
    }

    /// Drain the transport into the coordinator without stepping.
    pub fn receive(&mut self) -> Result<TickReport, SessionError> {
        if let Some(reason) = self.ended {
            return Err(SessionError::Ended(reason));
        }

        let mut report = TickReport::default();
        let messages = match self.transport.poll() {
            Ok(messages) => messages,
            Err(TransportError::Closed) => return Err(self.end(EndReason::Disconnected)),
            Err(other) => return Err(self.fault(other)),
        };

        for msg in messages {
            match msg {
                PeerMessage::Event(event) => {
                    let outcome = self
                        .coordinator
                        .got_remote_event(event)
                        .map_err(|err| self.fault(err))?;
                    if let RemoteOutcome::RolledBack { depth, .. } = outcome {
                        report.rollbacks += 1;
                        report.max_depth = report.max_depth.max(depth);
                        self.stats.rollbacks += 1;
                        self.stats.max_depth = self.stats.max_depth.max(depth);
                    }
                }
                PeerMessage::Finished { frame } => {
                    debug!(frame, "peer finished");
                    self.coordinator
                        .got_remote_diff(frame, None)
                        .map_err(|err| self.fault(err))?;
                    self.peer_finished = Some(frame);
                }
                PeerMessage::Goodbye => return Err(self.end(EndReason::PeerLeft)),
                PeerMessage::Hello { .. } => warn!("ignoring Hello after handshake"),
            }
        }

        report.frame = self.coordinator.current_frame();
        report.confirmed = self.coordinator.sure_frame();
        Ok(report)
    }

    /// Stop predicting: tell the peer nothing more will arrive before our
    /// current frame.
    pub fn flush_confirmation(&mut self) -> Result<(), SessionError> {
        self.send_finished()
    }

    /// Poll until both peers have finished on the same frame and it is
    /// confirmed.
    ///
    /// If the peer finished further ahead, this peer idles forward (input
    /// held) to meet it and announces the new frame. A session that ends
    /// after the final confirmation arrived still counts as confirmed.
    pub fn wait_confirmed(&mut self) -> Result<Frame, SessionError> {
        let deadline = Instant::now() + self.config.confirm_timeout;
        loop {
            let received = self.receive();
            if self.peer_finished.is_some()
                && self.coordinator.sure_frame() > self.coordinator.current_frame()
            {
                self.catch_up()?;
            }
            if self.peer_finished == Some(self.coordinator.current_frame())
                && self.fully_confirmed()
            {
                return Ok(self.coordinator.sure_frame());
            }
            received?;
            if Instant::now() >= deadline {
                return Err(SessionError::ConfirmTimeout {
                    frame: self.coordinator.current_frame(),
                    confirmed: self.coordinator.sure_frame(),
                });
            }
            thread::sleep(Duration::from_millis(1));
        }
    }

    /// Step prediction with unchanged input up to the confirmed frame, then
    /// announce the new final frame.
    fn catch_up(&mut self) -> Result<(), SessionError> {
        let held = self.coordinator.current_state().clone();
        let target = self.coordinator.sure_frame();
        debug!(from = self.coordinator.current_frame(), to = target, "idling forward to peer");
        while self.coordinator.current_frame() < target {
            self.coordinator.step_local(&held);
        }
        match self.send_finished() {
            Err(SessionError::Ended(_)) | Ok(()) => Ok(()),
            Err(other) => Err(other),
        }
    }

    fn send_finished(&mut self) -> Result<(), SessionError> {
        let frame = self.coordinator.current_frame();
        self.send(PeerMessage::Finished { frame })?;
        self.ticks_since_send = 0;
        Ok(())
    }

    /// Say goodbye. A peer that already left is not an error.
    pub fn close(mut self) -> RollbackCoordinator<W, S> {
        let goodbye = match self.ended {
            None => self.transport.send(&PeerMessage::Goodbye),
            Some(_) => Ok(()),
        };
        if let Err(err) = goodbye {
            debug!(%err, "goodbye not delivered");
        }
        info!(
            slot = %self.config.slot,
            ticks = self.stats.ticks,
            rollbacks = self.stats.rollbacks,
            "session closed"
        );
        self.coordinator
    }

    fn send_heartbeat(&mut self) -> Result<(), SessionError> {
        let frame = self.coordinator.current_frame();
        self.send(RemoteEvent::heartbeat(frame).into())?;
        self.stats.heartbeats_sent += 1;
        self.ticks_since_send = 0;
        Ok(())
    }

    fn send(&mut self, msg: PeerMessage) -> Result<(), SessionError> {
        match self.transport.send(&msg) {
            Ok(()) => Ok(()),
            Err(TransportError::Closed) => Err(self.end(EndReason::Disconnected)),
            Err(other) => Err(other.into()),
        }
    }

    /// End the session over a rejected message, handing back the cause.
    fn fault(&mut self, err: impl Into<SessionError>) -> SessionError {
        let err = err.into();
        if self.ended.is_none() {
            error!(slot = %self.config.slot, %err, "peer message rejected; session ended");
        }
        self.ended = Some(EndReason::Faulted);
        err
    }

    fn end(&mut self, reason: EndReason) -> SessionError {
        if self.ended.is_none() {
            info!(slot = %self.config.slot, %reason, "session ended");
        }
        self.ended = Some(reason);
        SessionError::Ended(reason)
    }
}
