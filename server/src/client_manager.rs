//! Live connection registry for the game server
//!
//! This module tracks every connected session and the outbound queue of its
//! writer task. It handles:
//! - Session id assignment and capacity limits
//! - Connection lifecycle (connect, disconnect)
//! - Non-blocking fan-out of pushes to other sessions
//!
//! Pushes never wait for a slow peer: a full or closed queue is logged and
//! that peer is skipped, the remaining recipients still get the message.

use crate::session::SessionId;
use log::{info, warn};
use shared::ServerMessage;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc::{self, error::TrySendError};

/// Items consumed by a connection's writer task
#[derive(Debug, Clone)]
pub enum Outbound {
    /// A framed protocol message
    Message(ServerMessage),
    /// Unframed bytes, used for the catalog transfer
    Raw(Arc<[u8]>),
    /// Flush what is queued and shut the connection down
    Close,
}

/// A connected session as seen by the broadcaster
#[derive(Debug)]
pub struct Client {
    /// Session id assigned on accept
    pub id: SessionId,
    /// Peer address, for logs
    pub addr: SocketAddr,
    /// When the connection was accepted
    pub connected_at: Instant,
    outbound: mpsc::Sender<Outbound>,
}

impl Client {
    pub fn new(id: SessionId, addr: SocketAddr, outbound: mpsc::Sender<Outbound>) -> Self {
        Self {
            id,
            addr,
            connected_at: Instant::now(),
            outbound,
        }
    }

    /// Queues a push without waiting
    ///
    /// Returns false if the queue is full or the writer is gone.
    pub fn push(&self, message: ServerMessage) -> bool {
        match self.outbound.try_send(Outbound::Message(message)) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!("Session {} ({}) is not keeping up, push dropped", self.id, self.addr);
                false
            }
            Err(TrySendError::Closed(_)) => {
                warn!("Session {} ({}) already closed, push dropped", self.id, self.addr);
                false
            }
        }
    }
}

/// Manages all connected sessions
///
/// Session ids start from 1 and are never reused while the server runs.
pub struct ClientManager {
    /// Connected sessions indexed by their id
    clients: HashMap<SessionId, Client>,
    /// Next available session id
    next_client_id: SessionId,
    /// Maximum number of concurrent sessions allowed
    max_clients: usize,
}

impl ClientManager {
    pub fn new(max_clients: usize) -> Self {
        Self {
            clients: HashMap::new(),
            next_client_id: 1,
            max_clients,
        }
    }

    /// Registers a new connection
    ///
    /// Returns `None` if the server is at capacity.
    pub fn add_client(
        &mut self,
        addr: SocketAddr,
        outbound: mpsc::Sender<Outbound>,
    ) -> Option<SessionId> {
        if self.clients.len() >= self.max_clients {
            return None;
        }

        let client_id = self.next_client_id;
        self.next_client_id += 1;

        info!("Session {} connected from {}", client_id, addr);
        self.clients
            .insert(client_id, Client::new(client_id, addr, outbound));

        Some(client_id)
    }

    /// Removes a session, returning false if it was already gone
    pub fn remove_client(&mut self, client_id: &SessionId) -> bool {
        if let Some(client) = self.clients.remove(client_id) {
            info!(
                "Session {} disconnected after {:.1}s",
                client.id,
                client.connected_at.elapsed().as_secs_f32()
            );
            true
        } else {
            false
        }
    }

    pub fn get(&self, client_id: &SessionId) -> Option<&Client> {
        self.clients.get(client_id)
    }

    /// Pushes a message to one session
    pub fn send_to(&self, client_id: SessionId, message: ServerMessage) -> bool {
        match self.clients.get(&client_id) {
            Some(client) => client.push(message),
            None => false,
        }
    }

    /// Pushes a message to every listed session, returning how many accepted it
    pub fn broadcast<I>(&self, recipients: I, message: &ServerMessage) -> usize
    where
        I: IntoIterator<Item = SessionId>,
    {
        recipients
            .into_iter()
            .filter(|id| self.send_to(*id, message.clone()))
            .count()
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}
