// Transports: how `PeerMessage`s get from one peer to the other.
//
// The session only needs two operations, captured by `Transport`: send a
// message, and drain whatever has arrived. Both are non-blocking from the
// session's point of view, so the tick loop never stalls on the network.
//
// Two implementations:
// - `LoopbackTransport`: an in-memory pair over `mpsc`, with an optional
//   delivery delay counted in polls. Deterministic, so tests can script
//   exactly how late each event lands.
// - `TcpTransport`: length-delimited JSON over TCP. Architecture:
//   - `host()` / `connect()` perform the Hello exchange on the calling
//     thread, then spawn a background reader thread.
//   - The reader thread calls `recv_message()` in a loop and pushes into an
//     `mpsc` channel. On EOF it exits, dropping the sender. Any other read
//     failure (e.g. an undecodable message) is pushed through the channel
//     first, so the session sees a fault rather than a plain disconnect.
//   - The session thread holds a `BufWriter<TcpStream>` for sending.
//   - `poll()` drains the channel without blocking.
//
// Closure contract: `poll()` keeps returning messages that arrived before
// the peer went away, and reports `TransportError::Closed` only once none
// are left.

use std::collections::VecDeque;
use std::io::{BufReader, BufWriter};
use std::net::{Shutdown, TcpListener, TcpStream, ToSocketAddrs};
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use multiphy_protocol::{
    FrameError, PROTOCOL_VERSION, PeerMessage, PeerSlot, recv_message, send_message,
};
use tracing::{debug, info, warn};

use crate::error::TransportError;

/// Bidirectional, ordered message pipe to the other peer.
pub trait Transport {
    fn send(&mut self, msg: &PeerMessage) -> Result<(), TransportError>;

    /// Everything received since the last poll, oldest first.
    fn poll(&mut self) -> Result<Vec<PeerMessage>, TransportError>;
}

/// Drain a channel without blocking. `Closed` only when it is both empty and
/// disconnected.
fn drain_channel<T>(inbox: &Receiver<T>) -> Result<Vec<T>, TransportError> {
    let mut messages = Vec::new();
    loop {
        match inbox.try_recv() {
            Ok(msg) => messages.push(msg),
            Err(TryRecvError::Empty) => return Ok(messages),
            Err(TryRecvError::Disconnected) if messages.is_empty() => {
                return Err(TransportError::Closed);
            }
            Err(TryRecvError::Disconnected) => return Ok(messages),
        }
    }
}

// ---------------------------------------------------------------------------
// Loopback
// ---------------------------------------------------------------------------

/// One end of an in-memory transport pair.
pub struct LoopbackTransport {
    tx: Sender<PeerMessage>,
    rx: Receiver<PeerMessage>,
    /// Arrived but not yet delivered, tagged with the poll that releases them.
    delayed: VecDeque<(u64, PeerMessage)>,
    latency_polls: u64,
    polls: u64,
    disconnected: bool,
}

impl LoopbackTransport {
    /// Two connected ends. A message sent on one end is returned by the
    /// other end's `latency_polls + 1`-th poll after it was sent (so with
    /// zero latency, the very next poll).
    pub fn pair(latency_polls: u64) -> (Self, Self) {
        let (a_tx, b_rx) = mpsc::channel();
        let (b_tx, a_rx) = mpsc::channel();
        (
            Self::new(a_tx, a_rx, latency_polls),
            Self::new(b_tx, b_rx, latency_polls),
        )
    }

    fn new(tx: Sender<PeerMessage>, rx: Receiver<PeerMessage>, latency_polls: u64) -> Self {
        Self {
            tx,
            rx,
            delayed: VecDeque::new(),
            latency_polls,
            polls: 0,
            disconnected: false,
        }
    }

    /// Messages still held back by the artificial latency.
    pub fn in_flight(&self) -> usize {
        self.delayed.len()
    }
}

impl Transport for LoopbackTransport {
    fn send(&mut self, msg: &PeerMessage) -> Result<(), TransportError> {
        self.tx.send(msg.clone()).map_err(|_| TransportError::Closed)
    }

    fn poll(&mut self) -> Result<Vec<PeerMessage>, TransportError> {
        if !self.disconnected {
            match drain_channel(&self.rx) {
                Ok(arrived) => {
                    let due = self.polls + self.latency_polls;
                    self.delayed.extend(arrived.into_iter().map(|msg| (due, msg)));
                }
                Err(TransportError::Closed) => self.disconnected = true,
                Err(other) => return Err(other),
            }
        }

        let mut ready = Vec::new();
        while self.delayed.front().is_some_and(|(due, _)| *due <= self.polls) {
            if let Some((_, msg)) = self.delayed.pop_front() {
                ready.push(msg);
            }
        }
        self.polls += 1;

        if ready.is_empty() && self.disconnected && self.delayed.is_empty() {
            return Err(TransportError::Closed);
        }
        Ok(ready)
    }
}

// ---------------------------------------------------------------------------
// TCP
// ---------------------------------------------------------------------------

/// What this peer announces in its Hello.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Handshake {
    pub slot: PeerSlot,
    pub config_hash: u64,
}

impl Handshake {
    fn hello(self) -> PeerMessage {
        PeerMessage::Hello {
            protocol_version: PROTOCOL_VERSION,
            slot: self.slot,
            config_hash: self.config_hash,
        }
    }

    /// Check the peer's Hello against ours.
    fn accept(self, theirs: PeerMessage) -> Result<PeerSlot, TransportError> {
        let PeerMessage::Hello {
            protocol_version,
            slot,
            config_hash,
        } = theirs
        else {
            return Err(TransportError::UnexpectedMessage(format!("{theirs:?}")));
        };
        if protocol_version != PROTOCOL_VERSION {
            return Err(TransportError::VersionMismatch {
                ours: PROTOCOL_VERSION,
                theirs: protocol_version,
            });
        }
        if config_hash != self.config_hash {
            return Err(TransportError::ConfigMismatch {
                ours: self.config_hash,
                theirs: config_hash,
            });
        }
        if slot != self.slot.other() {
            return Err(TransportError::SlotMismatch {
                expected: self.slot.other(),
                theirs: slot,
            });
        }
        Ok(slot)
    }
}

const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

/// TCP connection to the other peer.
pub struct TcpTransport {
    writer: BufWriter<TcpStream>,
    inbox: Receiver<Result<PeerMessage, FrameError>>,
    /// Read failure held back until the messages before it are delivered.
    fault: Option<TransportError>,
    peer_slot: PeerSlot,
    _reader_thread: JoinHandle<()>,
}

impl TcpTransport {
    /// Accept one peer on `listener` and complete the handshake.
    pub fn host(listener: &TcpListener, ours: Handshake) -> Result<Self, TransportError> {
        let (stream, addr) = listener.accept()?;
        info!(%addr, "peer connected");
        Self::handshake(stream, ours)
    }

    /// Connect to a hosting peer and complete the handshake.
    pub fn connect(addr: impl ToSocketAddrs, ours: Handshake) -> Result<Self, TransportError> {
        let stream = TcpStream::connect(addr)?;
        info!(addr = ?stream.peer_addr().ok(), "connected to host");
        Self::handshake(stream, ours)
    }

    /// Both sides send Hello first, then read the other's. Neither waits
    /// on the other before writing, so the exchange cannot deadlock.
    fn handshake(stream: TcpStream, ours: Handshake) -> Result<Self, TransportError> {
        stream.set_nodelay(true)?;
        stream.set_read_timeout(Some(HANDSHAKE_TIMEOUT))?;

        let mut reader = BufReader::new(stream.try_clone()?);
        let mut writer = BufWriter::new(stream);

        send_message(&mut writer, &ours.hello())?;
        let peer_slot = ours.accept(recv_message(&mut reader)?)?;
        debug!(peer = %peer_slot, "handshake complete");

        // The long-lived reader loop blocks indefinitely.
        reader.get_ref().set_read_timeout(None)?;

        let (tx, rx) = mpsc::channel();
        let reader_thread = thread::spawn(move || reader_loop(reader, tx));

        Ok(Self {
            writer,
            inbox: rx,
            fault: None,
            peer_slot,
            _reader_thread: reader_thread,
        })
    }

    pub fn peer_slot(&self) -> PeerSlot {
        self.peer_slot
    }
}

impl Transport for TcpTransport {
    fn send(&mut self, msg: &PeerMessage) -> Result<(), TransportError> {
        Ok(send_message(&mut self.writer, msg)?)
    }

    fn poll(&mut self) -> Result<Vec<PeerMessage>, TransportError> {
        if let Some(fault) = self.fault.take() {
            return Err(fault);
        }
        let mut messages = Vec::new();
        for item in drain_channel(&self.inbox)? {
            match item {
                Ok(msg) => messages.push(msg),
                Err(err) if messages.is_empty() => return Err(err.into()),
                Err(err) => {
                    self.fault = Some(err.into());
                    break;
                }
            }
        }
        Ok(messages)
    }
}

impl Drop for TcpTransport {
    fn drop(&mut self) {
        // Unblocks the reader thread so it exits.
        let _ = self.writer.get_ref().shutdown(Shutdown::Both);
    }
}

/// Reader thread: read framed messages in a loop, push to channel. Stops
/// after the first read failure.
fn reader_loop(
    mut reader: BufReader<TcpStream>,
    tx: Sender<Result<PeerMessage, FrameError>>,
) {
    loop {
        match recv_message(&mut reader) {
            Ok(msg) => {
                if tx.send(Ok(msg)).is_err() {
                    break; // Session dropped the transport.
                }
            }
            Err(err) if err.is_closed() => {
                debug!(%err, "peer closed the connection");
                break;
            }
            Err(err) => {
                warn!(%err, "unreadable message from peer");
                let _ = tx.send(Err(err));
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use multiphy_protocol::write_frame;
    use multiphy_rollback::RemoteEvent;

    use super::*;

    fn heartbeat(frame: u64) -> PeerMessage {
        PeerMessage::Event(RemoteEvent::heartbeat(frame))
    }

    #[test]
    fn loopback_without_latency_delivers_next_poll() {
        let (mut a, mut b) = LoopbackTransport::pair(0);
        a.send(&heartbeat(1)).unwrap();
        a.send(&heartbeat(2)).unwrap();
        assert_eq!(b.poll().unwrap(), vec![heartbeat(1), heartbeat(2)]);
        assert!(b.poll().unwrap().is_empty());
        assert!(a.poll().unwrap().is_empty());
    }

    #[test]
    fn loopback_latency_holds_messages_back() {
        let (mut a, mut b) = LoopbackTransport::pair(2);
        a.send(&heartbeat(1)).unwrap();
        assert!(b.poll().unwrap().is_empty());
        assert_eq!(b.in_flight(), 1);
        a.send(&heartbeat(2)).unwrap();
        assert!(b.poll().unwrap().is_empty());
        assert_eq!(b.poll().unwrap(), vec![heartbeat(1)]);
        assert_eq!(b.poll().unwrap(), vec![heartbeat(2)]);
    }

    #[test]
    fn loopback_drains_before_reporting_closed() {
        let (mut a, mut b) = LoopbackTransport::pair(1);
        a.send(&heartbeat(1)).unwrap();
        drop(a);

        assert!(b.poll().unwrap().is_empty());
        assert_eq!(b.poll().unwrap(), vec![heartbeat(1)]);
        assert!(matches!(b.poll(), Err(TransportError::Closed)));
        assert!(matches!(b.send(&heartbeat(2)), Err(TransportError::Closed)));
    }

    #[test]
    fn handshake_rejects_mismatches() {
        let ours = Handshake {
            slot: PeerSlot::HOST,
            config_hash: 7,
        };
        let hello = |version, slot, hash| PeerMessage::Hello {
            protocol_version: version,
            slot,
            config_hash: hash,
        };

        assert_eq!(
            ours.accept(hello(PROTOCOL_VERSION, PeerSlot::JOINER, 7)).unwrap(),
            PeerSlot::JOINER
        );
        assert!(matches!(
            ours.accept(hello(PROTOCOL_VERSION + 1, PeerSlot::JOINER, 7)),
            Err(TransportError::VersionMismatch { .. })
        ));
        assert!(matches!(
            ours.accept(hello(PROTOCOL_VERSION, PeerSlot::JOINER, 8)),
            Err(TransportError::ConfigMismatch { ours: 7, theirs: 8 })
        ));
        assert!(matches!(
            ours.accept(hello(PROTOCOL_VERSION, PeerSlot::HOST, 7)),
            Err(TransportError::SlotMismatch { .. })
        ));
        assert!(matches!(
            ours.accept(PeerMessage::Goodbye),
            Err(TransportError::UnexpectedMessage(_))
        ));
    }

    #[test]
    fn undecodable_message_is_a_fault_not_a_disconnect() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let raw_peer = thread::spawn(move || {
            let mut stream = TcpStream::connect(addr).unwrap();
            let hello = Handshake {
                slot: PeerSlot::JOINER,
                config_hash: 42,
            }
            .hello();
            send_message(&mut stream, &hello).unwrap();
            recv_message(&mut stream).unwrap();
            send_message(&mut stream, &heartbeat(3)).unwrap();
            // What a NaN control value turns into on the JSON wire.
            let bad = br#"{"Event":{"frame":4,"diff":{"p1.speed":null}}}"#;
            write_frame(&mut stream, bad).unwrap();
            stream
        });
        let mut host = TcpTransport::host(
            &listener,
            Handshake {
                slot: PeerSlot::HOST,
                config_hash: 42,
            },
        )
        .unwrap();
        let _stream = raw_peer.join().unwrap();

        let mut received = Vec::new();
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        let err = loop {
            match host.poll() {
                Ok(batch) => received.extend(batch),
                Err(err) => break err,
            }
            assert!(std::time::Instant::now() < deadline, "fault never surfaced");
            thread::sleep(Duration::from_millis(1));
        };
        assert_eq!(received, vec![heartbeat(3)]);
        assert!(matches!(err, TransportError::Frame(FrameError::Json(_))));
    }

    #[test]
    fn tcp_pair_exchanges_messages() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let joiner = thread::spawn(move || {
            TcpTransport::connect(
                addr,
                Handshake {
                    slot: PeerSlot::JOINER,
                    config_hash: 42,
                },
            )
            .unwrap()
        });
        let mut host = TcpTransport::host(
            &listener,
            Handshake {
                slot: PeerSlot::HOST,
                config_hash: 42,
            },
        )
        .unwrap();
        let mut joiner = joiner.join().unwrap();
        assert_eq!(host.peer_slot(), PeerSlot::JOINER);
        assert_eq!(joiner.peer_slot(), PeerSlot::HOST);

        host.send(&heartbeat(5)).unwrap();
        host.send(&PeerMessage::Goodbye).unwrap();
        drop(host);

        let mut received = Vec::new();
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        loop {
            match joiner.poll() {
                Ok(batch) => received.extend(batch),
                Err(TransportError::Closed) => break,
                Err(other) => panic!("unexpected transport error: {other}"),
            }
            assert!(std::time::Instant::now() < deadline, "peer never closed");
            thread::sleep(Duration::from_millis(1));
        }
        assert_eq!(received, vec![heartbeat(5), PeerMessage::Goodbye]);
    }
}
