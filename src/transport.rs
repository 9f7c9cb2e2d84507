//! In-memory duplex channel fabric.
//!
//! Stand-in for the external peer-to-peer transport: named endpoints, a
//! `bind`/`connect` rendezvous, and bidirectional FIFO message pipes. There
//! is no acknowledgment, retry, or timeout on send; a dropped endpoint
//! simply closes the channel and the survivor sees it on its next send or
//! receive.

use crate::protocol::Message;
use crate::types::PeerAddress;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use ulid::Ulid;

pub type Result<T> = std::result::Result<T, TransportError>;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Address already in use: {0}")]
    AddressInUse(String),

    #[error("No endpoint listening at {0}")]
    UnknownAddress(String),

    #[error("Channel closed")]
    Closed,
}

/// Cloneable send side of one duplex channel. The hub keeps one of these
/// per connected player in its broadcast list.
#[derive(Debug, Clone)]
pub struct ChannelHandle {
    id: Ulid,
    peer: PeerAddress,
    tx: UnboundedSender<Message>,
}

impl ChannelHandle {
    /// Identity of the underlying channel; equal on both ends
    pub fn id(&self) -> Ulid {
        self.id
    }

    /// Address of the endpoint on the other side
    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// Fire-and-forget send. Fails only when the other end is gone.
    pub fn send(&self, msg: Message) -> Result<()> {
        self.tx.send(msg).map_err(|_| TransportError::Closed)
    }

    pub fn same_channel(&self, other: &ChannelHandle) -> bool {
        self.id == other.id
    }
}

/// One end of an established duplex channel
pub struct Connection {
    pub handle: ChannelHandle,
    pub rx: UnboundedReceiver<Message>,
}

impl Connection {
    /// Next inbound message, `None` once the peer hung up
    pub async fn recv(&mut self) -> Option<Message> {
        self.rx.recv().await
    }

    /// Non-blocking receive, for deterministic test pumps
    pub fn try_recv(&mut self) -> Option<Message> {
        self.rx.try_recv().ok()
    }
}

/// Accept side of a bound address
pub struct Listener {
    address: PeerAddress,
    rx: UnboundedReceiver<Connection>,
}

impl Listener {
    pub fn address(&self) -> &str {
        &self.address
    }

    pub async fn accept(&mut self) -> Option<Connection> {
        self.rx.recv().await
    }

    pub fn try_accept(&mut self) -> Option<Connection> {
        self.rx.try_recv().ok()
    }
}

/// Address → listener registry. Cloning shares the same fabric, so every
/// participant of a test or in-process session holds the same switchboard.
#[derive(Clone, Default)]
pub struct Switchboard {
    endpoints: Arc<Mutex<HashMap<PeerAddress, UnboundedSender<Connection>>>>,
}

impl Switchboard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim an address and start accepting connections on it
    pub fn bind(&self, address: &str) -> Result<Listener> {
        let mut endpoints = self.endpoints.lock().expect("switchboard poisoned");
        if let Some(existing) = endpoints.get(address) {
            if !existing.is_closed() {
                return Err(TransportError::AddressInUse(address.to_string()));
            }
            // Previous listener dropped; the address can be reclaimed
        }
        let (tx, rx) = mpsc::unbounded_channel();
        endpoints.insert(address.to_string(), tx);
        tracing::debug!("Endpoint bound: {}", address);
        Ok(Listener {
            address: address.to_string(),
            rx,
        })
    }

    /// Open a duplex channel from `local` to the endpoint bound at `remote`
    pub fn connect(&self, local: &str, remote: &str) -> Result<Connection> {
        let endpoints = self.endpoints.lock().expect("switchboard poisoned");
        let acceptor = endpoints
            .get(remote)
            .ok_or_else(|| TransportError::UnknownAddress(remote.to_string()))?;

        let (ours, theirs) = pair(local, remote);
        acceptor
            .send(theirs)
            .map_err(|_| TransportError::UnknownAddress(remote.to_string()))?;
        tracing::debug!("Channel opened: {} -> {}", local, remote);
        Ok(ours)
    }
}

/// Build both ends of a duplex channel directly, bypassing the rendezvous.
/// The first connection is the end held by `local`.
pub fn pair(local: &str, remote: &str) -> (Connection, Connection) {
    let id = Ulid::new();
    let (to_remote_tx, to_remote_rx) = mpsc::unbounded_channel();
    let (to_local_tx, to_local_rx) = mpsc::unbounded_channel();

    let ours = Connection {
        handle: ChannelHandle {
            id,
            peer: remote.to_string(),
            tx: to_remote_tx,
        },
        rx: to_local_rx,
    };
    let theirs = Connection {
        handle: ChannelHandle {
            id,
            peer: local.to_string(),
            tx: to_local_tx,
        },
        rx: to_remote_rx,
    };
    (ours, theirs)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chat(text: &str) -> Message {
        Message::Chat {
            from: "test".to_string(),
            text: text.to_string(),
        }
    }

    #[tokio::test]
    async fn test_connect_delivers_in_order() {
        let board = Switchboard::new();
        let mut listener = board.bind("hub").unwrap();

        let player = board.connect("player-1", "hub").unwrap();
        let mut accepted = listener.try_accept().expect("connection should arrive");
        assert_eq!(accepted.handle.peer(), "player-1");
        assert_eq!(player.handle.peer(), "hub");
        assert!(player.handle.same_channel(&accepted.handle));

        player.handle.send(chat("one")).unwrap();
        player.handle.send(chat("two")).unwrap();
        assert_eq!(accepted.recv().await, Some(chat("one")));
        assert_eq!(accepted.recv().await, Some(chat("two")));
    }

    #[tokio::test]
    async fn test_bind_conflicts_until_listener_drops() {
        let board = Switchboard::new();
        let listener = board.bind("hub").unwrap();
        assert!(matches!(
            board.bind("hub"),
            Err(TransportError::AddressInUse(_))
        ));

        drop(listener);
        assert!(board.bind("hub").is_ok());
    }

    #[tokio::test]
    async fn test_connect_to_unknown_address_fails() {
        let board = Switchboard::new();
        assert!(matches!(
            board.connect("player-1", "nowhere"),
            Err(TransportError::UnknownAddress(_))
        ));
    }

    #[tokio::test]
    async fn test_dropped_peer_closes_channel() {
        let (a, b) = pair("a", "b");
        drop(b);
        assert!(matches!(a.handle.send(chat("hello")), Err(TransportError::Closed)));
    }

    #[tokio::test]
    async fn test_recv_ends_when_peer_drops() {
        let (a, mut b) = pair("a", "b");
        a.handle.send(chat("bye")).unwrap();
        drop(a);
        assert_eq!(b.recv().await, Some(chat("bye")));
        assert_eq!(b.recv().await, None);
    }
}
