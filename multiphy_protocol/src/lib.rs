// multiphy_protocol — wire protocol between two multiphy peers.
//
// This crate defines the message enum and framing that `multiphy_session`
// uses to ship control events across TCP. It depends on the rollback crate
// only for the `RemoteEvent` payload type and knows nothing about worlds.
//
// Module overview:
// - `types.rs`:    `PeerSlot` (host/joiner, doubles as control-key namespace)
//                  and `PROTOCOL_VERSION`.
// - `message.rs`:  `PeerMessage` — `Hello`, `Event`, `Finished`, `Goodbye`.
// - `framing.rs`:  Length-delimited framing over any `Read`/`Write` stream:
//                  4-byte big-endian length prefix, then JSON payload.
//
// Design decisions:
// - **JSON serialization.** Events are a handful of floats; readability on
//   the wire beats compactness.
// - **No async runtime.** Uses `std::io::Read`/`Write`, so the same framing
//   works over blocking sockets and in-memory buffers.

pub mod framing;
pub mod message;
pub mod types;

pub use framing::{
    FrameError, MAX_MESSAGE_SIZE, read_frame, recv_message, send_message, write_frame,
};
pub use message::PeerMessage;
pub use types::{PROTOCOL_VERSION, PeerSlot};

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use multiphy_rollback::{ControlState, RemoteEvent};

    use super::*;

    /// Frame a message, read it back, and compare.
    fn roundtrip(msg: &PeerMessage) {
        let mut wire = Vec::new();
        send_message(&mut wire, msg).unwrap();
        let recovered = recv_message(&mut Cursor::new(&wire)).unwrap();
        assert_eq!(&recovered, msg);
    }

    #[test]
    fn roundtrip_each_variant() {
        roundtrip(&PeerMessage::Hello {
            protocol_version: PROTOCOL_VERSION,
            slot: PeerSlot::JOINER,
            config_hash: 0xCAFE_BABE,
        });
        roundtrip(&PeerMessage::Event(RemoteEvent {
            frame: 12,
            diff: Some(ControlState::new().with("p1.speed", -1.0)),
        }));
        roundtrip(&PeerMessage::Event(RemoteEvent::heartbeat(40)));
        roundtrip(&PeerMessage::Finished { frame: 600 });
        roundtrip(&PeerMessage::Goodbye);
    }

    #[test]
    fn heartbeat_payload_has_no_diff_field() {
        let json = serde_json::to_string(&PeerMessage::from(RemoteEvent::heartbeat(40))).unwrap();
        assert_eq!(json, r#"{"Event":{"frame":40}}"#);
    }

    #[test]
    fn messages_stream_in_order() {
        let sent = vec![
            PeerMessage::Hello {
                protocol_version: PROTOCOL_VERSION,
                slot: PeerSlot::HOST,
                config_hash: 1,
            },
            PeerMessage::Event(RemoteEvent::heartbeat(20)),
            PeerMessage::Goodbye,
        ];
        let mut wire = Vec::new();
        for msg in &sent {
            send_message(&mut wire, msg).unwrap();
        }

        let mut cursor = Cursor::new(&wire);
        for expected in &sent {
            assert_eq!(&recv_message(&mut cursor).unwrap(), expected);
        }
        assert!(recv_message(&mut cursor).unwrap_err().is_closed());
    }
}
