//! Funding wire messages
//!
//! Fixed-layout encoding of the four funding handshake messages. Every
//! message is one identifier byte followed by its payload:
//!
//! | message     | id     | payload                                              |
//! |-------------|--------|------------------------------------------------------|
//! | `PUBREQ`    | `0x30` | empty                                                |
//! | `PUBRESP`   | `0x31` | compressed public key (33)                           |
//! | `MULTIDESC` | `0x32` | outpoint (36) ‖ public key (33) ‖ capacity (8, i64)  |
//! | `MULTIACK`  | `0x33` | outpoint (36)                                        |
//!
//! Integers are big-endian. The transport hands over complete payloads, so
//! nothing here buffers partial input.

use std::fmt;

use secp256k1::PublicKey;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::{OutPoint, OUTPOINT_SIZE};
use crate::crypto::{parse_public_key, PUBLIC_KEY_SIZE};

/// Transport greeting carrying the sender's node key
pub const MSGID_HELLO: u8 = 0x01;
pub const MSGID_PUBREQ: u8 = 0x30;
pub const MSGID_PUBRESP: u8 = 0x31;
pub const MSGID_MULTIDESC: u8 = 0x32;
pub const MSGID_MULTIACK: u8 = 0x33;

pub const PUBRESP_PAYLOAD_SIZE: usize = PUBLIC_KEY_SIZE;
pub const MULTIDESC_PAYLOAD_SIZE: usize = OUTPOINT_SIZE + PUBLIC_KEY_SIZE + 8;
pub const MULTIACK_PAYLOAD_SIZE: usize = OUTPOINT_SIZE;

/// Wire decoding errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WireError {
    #[error("Malformed {kind} message: {reason}")]
    MalformedMessage { kind: MessageKind, reason: String },
    #[error("Unknown message id 0x{0:02x}")]
    UnknownMessageId(u8),
    #[error("Empty message")]
    Empty,
}

impl WireError {
    fn malformed(kind: MessageKind, reason: impl Into<String>) -> Self {
        WireError::MalformedMessage {
            kind,
            reason: reason.into(),
        }
    }

    fn wrong_length(kind: MessageKind, expected: usize, got: usize) -> Self {
        Self::malformed(kind, format!("got {} byte payload, expect {}", got, expected))
    }
}

/// The four funding message kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    PubReq,
    PubResp,
    MultiDesc,
    MultiAck,
}

impl MessageKind {
    pub fn id(&self) -> u8 {
        match self {
            MessageKind::PubReq => MSGID_PUBREQ,
            MessageKind::PubResp => MSGID_PUBRESP,
            MessageKind::MultiDesc => MSGID_MULTIDESC,
            MessageKind::MultiAck => MSGID_MULTIACK,
        }
    }

    pub fn from_id(id: u8) -> Option<Self> {
        match id {
            MSGID_PUBREQ => Some(MessageKind::PubReq),
            MSGID_PUBRESP => Some(MessageKind::PubResp),
            MSGID_MULTIDESC => Some(MessageKind::MultiDesc),
            MSGID_MULTIACK => Some(MessageKind::MultiAck),
            _ => None,
        }
    }

    /// Name used in logs
    pub fn name(&self) -> &'static str {
        match self {
            MessageKind::PubReq => "PUBREQ",
            MessageKind::PubResp => "PUBRESP",
            MessageKind::MultiDesc => "MULTIDESC",
            MessageKind::MultiAck => "MULTIACK",
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The shared record of a pending funding output.
///
/// Carried by `MULTIDESC`; `counterparty` is the key of the peer that sent it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelDescriptor {
    pub outpoint: OutPoint,
    pub counterparty: PublicKey,
    /// Satoshis locked in the multisig output
    pub capacity: i64,
}

impl ChannelDescriptor {
    pub fn to_bytes(&self) -> [u8; MULTIDESC_PAYLOAD_SIZE] {
        let mut out = [0u8; MULTIDESC_PAYLOAD_SIZE];
        out[..OUTPOINT_SIZE].copy_from_slice(&self.outpoint.to_bytes());
        out[OUTPOINT_SIZE..OUTPOINT_SIZE + PUBLIC_KEY_SIZE]
            .copy_from_slice(&self.counterparty.serialize());
        out[OUTPOINT_SIZE + PUBLIC_KEY_SIZE..].copy_from_slice(&self.capacity.to_be_bytes());
        out
    }
}

/// A decoded funding message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// Ask the peer for a fresh channel public key
    PubReq,
    /// The responder's channel public key
    PubResp(PublicKey),
    /// Description of the funding output the initiator allocated
    MultiDesc(ChannelDescriptor),
    /// Responder saved the descriptor; initiator may sign and broadcast
    MultiAck(OutPoint),
}

impl Message {
    pub fn kind(&self) -> MessageKind {
        match self {
            Message::PubReq => MessageKind::PubReq,
            Message::PubResp(_) => MessageKind::PubResp,
            Message::MultiDesc(_) => MessageKind::MultiDesc,
            Message::MultiAck(_) => MessageKind::MultiAck,
        }
    }

    /// Identifier byte followed by the payload
    pub fn encode(&self) -> Vec<u8> {
        let mut out = vec![self.kind().id()];
        match self {
            Message::PubReq => out.extend_from_slice(&encode_pub_req()),
            Message::PubResp(key) => out.extend_from_slice(&encode_pub_resp(key)),
            Message::MultiDesc(desc) => out.extend_from_slice(&encode_multi_desc(desc)),
            Message::MultiAck(op) => out.extend_from_slice(&encode_multi_ack(op)),
        }
        out
    }

    /// Decode identifier byte plus payload
    pub fn decode(bytes: &[u8]) -> Result<Self, WireError> {
        let (&id, payload) = bytes.split_first().ok_or(WireError::Empty)?;
        let kind = MessageKind::from_id(id).ok_or(WireError::UnknownMessageId(id))?;
        Self::decode_payload(kind, payload)
    }

    /// Decode a payload whose identifier was already read by the dispatcher
    pub fn decode_payload(kind: MessageKind, payload: &[u8]) -> Result<Self, WireError> {
        match kind {
            MessageKind::PubReq => decode_pub_req(payload).map(|_| Message::PubReq),
            MessageKind::PubResp => decode_pub_resp(payload).map(Message::PubResp),
            MessageKind::MultiDesc => decode_multi_desc(payload).map(Message::MultiDesc),
            MessageKind::MultiAck => decode_multi_ack(payload).map(Message::MultiAck),
        }
    }
}

pub fn encode_pub_req() -> [u8; 0] {
    []
}

pub fn decode_pub_req(payload: &[u8]) -> Result<(), WireError> {
    if !payload.is_empty() {
        return Err(WireError::wrong_length(MessageKind::PubReq, 0, payload.len()));
    }
    Ok(())
}

pub fn encode_pub_resp(key: &PublicKey) -> [u8; PUBRESP_PAYLOAD_SIZE] {
    key.serialize()
}

pub fn decode_pub_resp(payload: &[u8]) -> Result<PublicKey, WireError> {
    if payload.len() != PUBRESP_PAYLOAD_SIZE {
        return Err(WireError::wrong_length(
            MessageKind::PubResp,
            PUBRESP_PAYLOAD_SIZE,
            payload.len(),
        ));
    }
    parse_public_key(payload)
        .map_err(|e| WireError::malformed(MessageKind::PubResp, e.to_string()))
}

pub fn encode_multi_desc(desc: &ChannelDescriptor) -> [u8; MULTIDESC_PAYLOAD_SIZE] {
    desc.to_bytes()
}

pub fn decode_multi_desc(payload: &[u8]) -> Result<ChannelDescriptor, WireError> {
    let kind = MessageKind::MultiDesc;
    if payload.len() != MULTIDESC_PAYLOAD_SIZE {
        return Err(WireError::wrong_length(kind, MULTIDESC_PAYLOAD_SIZE, payload.len()));
    }
    let (op_bytes, rest) = payload.split_at(OUTPOINT_SIZE);
    let (key_bytes, cap_bytes) = rest.split_at(PUBLIC_KEY_SIZE);

    let outpoint =
        OutPoint::from_bytes(op_bytes).map_err(|e| WireError::malformed(kind, e.to_string()))?;
    let counterparty =
        parse_public_key(key_bytes).map_err(|e| WireError::malformed(kind, e.to_string()))?;

    let mut cap = [0u8; 8];
    cap.copy_from_slice(cap_bytes);
    let capacity = i64::from_be_bytes(cap);
    if capacity <= 0 {
        return Err(WireError::malformed(
            kind,
            format!("non-positive capacity {}", capacity),
        ));
    }

    Ok(ChannelDescriptor {
        outpoint,
        counterparty,
        capacity,
    })
}

pub fn encode_multi_ack(outpoint: &OutPoint) -> [u8; MULTIACK_PAYLOAD_SIZE] {
    outpoint.to_bytes()
}

pub fn decode_multi_ack(payload: &[u8]) -> Result<OutPoint, WireError> {
    if payload.len() != MULTIACK_PAYLOAD_SIZE {
        return Err(WireError::wrong_length(
            MessageKind::MultiAck,
            MULTIACK_PAYLOAD_SIZE,
            payload.len(),
        ));
    }
    OutPoint::from_bytes(payload)
        .map_err(|e| WireError::malformed(MessageKind::MultiAck, e.to_string()))
}
