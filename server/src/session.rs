//! Per-connection protocol state machine
//!
//! A session walks through the modes `ClientAuth → UserAuth → InitialSync →
//! FreeToJoin → InGame`, one step at a time and never backwards. Each mode
//! accepts a fixed set of message kinds; anything else is rejected here,
//! before the orchestrator touches shared state.

use crate::client_manager::Outbound;
use log::warn;
use shared::{MessageKind, ServerMessage, UserId};
use std::fmt;
use std::net::SocketAddr;
use tokio::sync::mpsc;

pub type SessionId = u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Mode {
    ClientAuth,
    UserAuth,
    InitialSync,
    FreeToJoin,
    InGame,
}

impl Mode {
    /// Message kinds accepted in this mode, `Disconnect` aside
    pub const fn legal(self) -> &'static [MessageKind] {
        match self {
            Mode::ClientAuth => &[MessageKind::ClientAuth],
            Mode::UserAuth => &[MessageKind::UserAuth],
            Mode::InitialSync => &[
                MessageKind::CatalogQuery,
                MessageKind::CatalogPull,
                MessageKind::CatalogKnown,
            ],
            Mode::FreeToJoin => &[MessageKind::CreateGame, MessageKind::JoinGame],
            Mode::InGame => &[MessageKind::StartGame],
        }
    }

    pub fn permits(self, kind: MessageKind) -> bool {
        kind == MessageKind::Disconnect || self.legal().contains(&kind)
    }

    pub const fn next(self) -> Option<Mode> {
        match self {
            Mode::ClientAuth => Some(Mode::UserAuth),
            Mode::UserAuth => Some(Mode::InitialSync),
            Mode::InitialSync => Some(Mode::FreeToJoin),
            Mode::FreeToJoin => Some(Mode::InGame),
            Mode::InGame => None,
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    IllegalMessage { kind: MessageKind, mode: Mode },
    IllegalTransition { from: Mode, to: Mode },
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::IllegalMessage { kind, mode } => {
                write!(f, "message {} is not allowed in mode {}", kind, mode)
            }
            SessionError::IllegalTransition { from, to } => {
                write!(f, "cannot move from mode {} to mode {}", from, to)
            }
        }
    }
}

impl std::error::Error for SessionError {}

/// State of one client connection
///
/// The session owns a sender into its connection's outbound queue, so
/// replies to the caller never go through the shared client manager.
#[derive(Debug)]
pub struct Session {
    pub id: SessionId,
    pub addr: SocketAddr,
    mode: Mode,
    user: Option<UserId>,
    identification: String,
    outbound: mpsc::Sender<Outbound>,
}

impl Session {
    pub fn new(id: SessionId, addr: SocketAddr, outbound: mpsc::Sender<Outbound>) -> Self {
        Self {
            id,
            addr,
            mode: Mode::ClientAuth,
            user: None,
            identification: addr.to_string(),
            outbound,
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn user(&self) -> Option<UserId> {
        self.user
    }

    /// Name used in log lines: the peer address until login, then the user name
    pub fn identification(&self) -> &str {
        &self.identification
    }

    /// Rejects message kinds the current mode does not accept
    pub fn check(&self, kind: MessageKind) -> Result<(), SessionError> {
        if self.mode.permits(kind) {
            Ok(())
        } else {
            Err(SessionError::IllegalMessage {
                kind,
                mode: self.mode,
            })
        }
    }

    /// Moves to `to`, which must be the mode directly after the current one
    pub fn advance(&mut self, to: Mode) -> Result<(), SessionError> {
        if self.mode.next() != Some(to) {
            return Err(SessionError::IllegalTransition {
                from: self.mode,
                to,
            });
        }
        self.mode = to;
        Ok(())
    }

    /// Records a successful login and moves on to the initial sync
    pub fn log_in(&mut self, user: UserId, name: &str) -> Result<(), SessionError> {
        self.advance(Mode::InitialSync)?;
        self.user = Some(user);
        self.identification = name.to_string();
        Ok(())
    }

    /// Forgets the bound user, returning it
    pub fn take_user(&mut self) -> Option<UserId> {
        self.user.take()
    }

    /// Queues a reply for this connection
    ///
    /// Waits for room in the queue; the caller's own writer drains it.
    pub async fn send(&self, message: ServerMessage) {
        if self.outbound.send(Outbound::Message(message)).await.is_err() {
            warn!("{} outbound queue closed, reply dropped", self.identification);
        }
    }

    /// Queues unframed bytes for this connection
    pub async fn send_raw(&self, data: std::sync::Arc<[u8]>) {
        if self.outbound.send(Outbound::Raw(data)).await.is_err() {
            warn!("{} outbound queue closed, raw data dropped", self.identification);
        }
    }
}
