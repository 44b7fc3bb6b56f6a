//! Peer networking for the funding handshake
//!
//! - `message`: funding message wire codec
//! - `server`: framing, hello exchange and per-connection tasks
//! - `peer`: live sessions keyed by node identity
//! - `node`: listener, dialer and dispatch loop

pub mod message;
pub mod node;
pub mod peer;
pub mod server;

pub use message::{ChannelDescriptor, Message, MessageKind, WireError};
pub use node::{Node, NodeConfig, NodeStatus};
pub use peer::{PeerError, PeerHandle, PeerInfo, PeerManager, MAX_PEERS, PEER_QUEUE_SIZE};
pub use server::{
    connect_to_peer, start_session, FrameCodec, InboundFrame, Server, MAGIC, MAX_FRAME_SIZE,
};
