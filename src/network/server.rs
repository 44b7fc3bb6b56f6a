//! TCP server and connection handling
//!
//! Frames are `MAGIC || u32 length (big-endian) || body`. The first body on
//! every connection is a HELLO carrying the sender's node key; every later
//! body is one funding message handed to the dispatcher untouched.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::{Buf, BufMut, BytesMut};
use futures::sink::SinkExt;
use futures::stream::StreamExt;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_util::codec::{Decoder, Encoder, Framed};

use crate::crypto::{PeerIdentity, PUBLIC_KEY_SIZE};
use crate::network::message::MSGID_HELLO;
use crate::network::peer::{PeerError, PeerHandle, PeerManager, PEER_QUEUE_SIZE};

/// Network magic bytes
pub const MAGIC: [u8; 4] = *b"QCHN";

/// Largest frame body accepted from a peer
pub const MAX_FRAME_SIZE: usize = 4096;

const HEADER_SIZE: usize = 8;

/// How long a new connection may take to send its hello
pub const HELLO_TIMEOUT: Duration = Duration::from_secs(10);

/// A complete frame body received from an identified peer
pub type InboundFrame = (PeerIdentity, Vec<u8>);

// =============================================================================
// Framing
// =============================================================================

/// Length-prefixed framing codec
#[derive(Debug, Default, Clone, Copy)]
pub struct FrameCodec;

impl Encoder<Vec<u8>> for FrameCodec {
    type Error = std::io::Error;

    fn encode(&mut self, item: Vec<u8>, dst: &mut BytesMut) -> Result<(), Self::Error> {
        if item.len() > MAX_FRAME_SIZE {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("frame of {} bytes exceeds {}", item.len(), MAX_FRAME_SIZE),
            ));
        }

        dst.reserve(HEADER_SIZE + item.len());
        dst.put_slice(&MAGIC);
        dst.put_u32(item.len() as u32);
        dst.put_slice(&item);
        Ok(())
    }
}

impl Decoder for FrameCodec {
    type Item = Vec<u8>;
    type Error = std::io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < HEADER_SIZE {
            return Ok(None);
        }

        if src[..4] != MAGIC {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                "Invalid magic bytes",
            ));
        }

        let len = u32::from_be_bytes([src[4], src[5], src[6], src[7]]) as usize;
        if len > MAX_FRAME_SIZE {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("frame of {} bytes exceeds {}", len, MAX_FRAME_SIZE),
            ));
        }

        if src.len() < HEADER_SIZE + len {
            src.reserve(HEADER_SIZE + len - src.len());
            return Ok(None);
        }

        src.advance(HEADER_SIZE);
        Ok(Some(src.split_to(len).to_vec()))
    }
}

// =============================================================================
// Hello
// =============================================================================

pub fn encode_hello(identity: &PeerIdentity) -> Vec<u8> {
    let mut out = Vec::with_capacity(1 + PUBLIC_KEY_SIZE);
    out.push(MSGID_HELLO);
    out.extend_from_slice(identity.as_bytes());
    out
}

pub fn decode_hello(frame: &[u8]) -> Result<PeerIdentity, PeerError> {
    match frame.split_first() {
        Some((&MSGID_HELLO, key)) if key.len() == PUBLIC_KEY_SIZE => {
            PeerIdentity::from_slice(key).map_err(|e| PeerError::InvalidHello(e.to_string()))
        }
        Some((&MSGID_HELLO, key)) => Err(PeerError::InvalidHello(format!(
            "{} byte key",
            key.len()
        ))),
        Some((id, _)) => Err(PeerError::InvalidHello(format!(
            "expected hello, got id 0x{:02x}",
            id
        ))),
        None => Err(PeerError::InvalidHello("empty frame".into())),
    }
}

async fn exchange_hello<S>(
    framed: &mut Framed<S, FrameCodec>,
    our_identity: &PeerIdentity,
) -> Result<PeerIdentity, PeerError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    framed.send(encode_hello(our_identity)).await?;
    match framed.next().await {
        Some(Ok(frame)) => decode_hello(&frame),
        Some(Err(e)) => Err(PeerError::IoError(e)),
        None => Err(PeerError::Disconnected),
    }
}

// =============================================================================
// Server
// =============================================================================

/// TCP server for accepting peer connections
pub struct Server {
    listener: TcpListener,
}

impl Server {
    /// Bind to a port; port 0 picks a free one
    pub async fn bind(port: u16) -> Result<Self, std::io::Error> {
        let addr = format!("0.0.0.0:{}", port);
        let listener = TcpListener::bind(&addr).await?;
        log::info!("Server listening on {}", listener.local_addr()?);
        Ok(Self { listener })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, std::io::Error> {
        self.listener.local_addr()
    }

    pub async fn accept(&self) -> Result<(TcpStream, SocketAddr), std::io::Error> {
        self.listener.accept().await
    }
}

/// Connect to a peer
pub async fn connect_to_peer(addr: &str) -> Result<(TcpStream, SocketAddr), PeerError> {
    let stream = TcpStream::connect(addr)
        .await
        .map_err(|e| PeerError::ConnectionFailed(e.to_string()))?;

    let peer_addr = stream
        .peer_addr()
        .map_err(|e| PeerError::ConnectionFailed(e.to_string()))?;

    Ok((stream, peer_addr))
}

/// Exchange hellos, register the peer and spawn its reader and writer.
///
/// Returns the remote identity once the peer can be sent to.
pub async fn start_session<S>(
    stream: S,
    addr: SocketAddr,
    peer_manager: Arc<PeerManager>,
    our_identity: PeerIdentity,
    inbound_tx: mpsc::Sender<InboundFrame>,
    outbound: bool,
) -> Result<PeerIdentity, PeerError>
where
    S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    let mut framed = Framed::new(stream, FrameCodec);
    let identity = tokio::time::timeout(HELLO_TIMEOUT, exchange_hello(&mut framed, &our_identity))
        .await
        .map_err(|_| PeerError::Timeout)??;
    if identity == our_identity {
        return Err(PeerError::SelfConnection);
    }

    let (tx, rx) = mpsc::channel::<Vec<u8>>(PEER_QUEUE_SIZE);
    peer_manager.add_peer(PeerHandle::new(identity, addr, outbound, tx))?;

    tokio::spawn(run_session(framed, identity, rx, inbound_tx, peer_manager));
    Ok(identity)
}

async fn run_session<S>(
    framed: Framed<S, FrameCodec>,
    identity: PeerIdentity,
    mut rx: mpsc::Receiver<Vec<u8>>,
    inbound_tx: mpsc::Sender<InboundFrame>,
    peer_manager: Arc<PeerManager>,
) where
    S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    let (mut writer, mut reader) = framed.split();

    let write_handle = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if let Err(e) = writer.send(frame).await {
                log::warn!("Write to {} failed: {}", identity, e);
                break;
            }
        }
    });

    loop {
        match reader.next().await {
            Some(Ok(frame)) => {
                log::debug!("Frame of {} bytes from {}", frame.len(), identity);
                if inbound_tx.send((identity, frame)).await.is_err() {
                    break;
                }
            }
            Some(Err(e)) => {
                log::warn!("Error reading from {}: {}", identity, e);
                break;
            }
            None => {
                log::info!("Peer {} disconnected", identity);
                break;
            }
        }
    }

    write_handle.abort();
    peer_manager.remove_peer(&identity);
}
