//! Wire envelopes and gap-recovery request types.
//!
//! Every unit of mailbox traffic is a tagged [`Envelope`]. Payload messages
//! carry a monotonically increasing sequence number assigned by the sender;
//! keepalives carry the sender's current sequence number so the receiver can
//! detect gaps even during periods with no payload traffic.
//!
//! Gap recovery uses the substrate's request/response channel with its own
//! pair of types, [`ResendRequest`] and [`ResendReply`].

use serde::{Deserialize, Serialize};

/// A tagged unit of wire traffic between two endpoints.
///
/// # Wire shape (JSON codec)
///
/// ```text
/// { "type": "msg",  "seq": 3, "body": [...] }
/// { "type": "ka",   "seq": 3 }
/// { "type": "stop" }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Envelope {
    /// A payload message with its sequence number. Bodies are opaque bytes;
    /// typed encoding happens in the stream adapters.
    Msg {
        /// Sequence number assigned by the sender, starting at 0.
        seq: i64,
        /// Opaque payload bytes.
        body: Vec<u8>,
    },

    /// Keepalive carrying the sender's current sequence number
    /// (-1 if nothing has been sent yet).
    Ka {
        /// The sender's highest assigned sequence number.
        seq: i64,
    },

    /// Graceful termination notice. Best-effort, unacknowledged; the
    /// receiver's liveness timeout is the fallback detector.
    Stop,
}

/// Request for a single missed payload, sent to the peer's mailbox via the
/// substrate's point-to-point request channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResendRequest {
    /// The missing sequence number.
    pub seq: i64,
}

/// Reply to a [`ResendRequest`], served from the peer's retained send
/// history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResendReply {
    /// The requested sequence number.
    pub seq: i64,
    /// The payload originally sent under that sequence number.
    pub body: Vec<u8>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_msg_wire_shape() {
        let env = Envelope::Msg {
            seq: 3,
            body: vec![1, 2],
        };
        let json = serde_json::to_string(&env).expect("serialize");
        assert_eq!(json, r#"{"type":"msg","seq":3,"body":[1,2]}"#);
    }

    #[test]
    fn test_ka_wire_shape() {
        let env = Envelope::Ka { seq: -1 };
        let json = serde_json::to_string(&env).expect("serialize");
        assert_eq!(json, r#"{"type":"ka","seq":-1}"#);
    }

    #[test]
    fn test_stop_wire_shape() {
        let json = serde_json::to_string(&Envelope::Stop).expect("serialize");
        assert_eq!(json, r#"{"type":"stop"}"#);
    }

    #[test]
    fn test_envelope_roundtrip() {
        for env in [
            Envelope::Msg {
                seq: 0,
                body: b"x".to_vec(),
            },
            Envelope::Ka { seq: 7 },
            Envelope::Stop,
        ] {
            let json = serde_json::to_vec(&env).expect("serialize");
            let decoded: Envelope = serde_json::from_slice(&json).expect("deserialize");
            assert_eq!(env, decoded);
        }
    }

    #[test]
    fn test_resend_roundtrip() {
        let request = ResendRequest { seq: 5 };
        let json = serde_json::to_vec(&request).expect("serialize");
        let decoded: ResendRequest = serde_json::from_slice(&json).expect("deserialize");
        assert_eq!(request, decoded);

        let reply = ResendReply {
            seq: 5,
            body: b"y".to_vec(),
        };
        let json = serde_json::to_vec(&reply).expect("serialize");
        let decoded: ResendReply = serde_json::from_slice(&json).expect("deserialize");
        assert_eq!(reply, decoded);
    }
}
