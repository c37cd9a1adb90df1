//! Wire protocol between the game server and its clients
//!
//! Every message travels as one frame: a 4-byte big-endian length followed by
//! the bincode encoding of the message. The only exception is the catalog
//! transfer, whose raw bytes follow a `CatalogPush` frame unframed so the
//! client can read exactly `size` bytes.

use crate::card::CardId;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Largest frame either side accepts
pub const MAX_FRAME_LEN: usize = 1 << 20;

pub type UserId = u32;
pub type GameId = u32;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSummary {
    pub id: UserId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameSummary {
    pub id: GameId,
    pub name: String,
}

/// Messages sent by clients
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClientMessage {
    ClientAuth {
        major: u32,
        minor: u32,
        revision: u32,
    },
    UserAuth {
        username: String,
        token: String,
    },
    CatalogQuery,
    CatalogPull,
    CatalogKnown,
    CreateGame {
        name: String,
        password: Option<String>,
    },
    JoinGame {
        id: GameId,
        password: Option<String>,
    },
    StartGame,
    Disconnect,
}

/// Payload-free tag of a [`ClientMessage`], used by the mode legality table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    ClientAuth,
    UserAuth,
    CatalogQuery,
    CatalogPull,
    CatalogKnown,
    CreateGame,
    JoinGame,
    StartGame,
    Disconnect,
}

impl ClientMessage {
    pub fn kind(&self) -> MessageKind {
        match self {
            ClientMessage::ClientAuth { .. } => MessageKind::ClientAuth,
            ClientMessage::UserAuth { .. } => MessageKind::UserAuth,
            ClientMessage::CatalogQuery => MessageKind::CatalogQuery,
            ClientMessage::CatalogPull => MessageKind::CatalogPull,
            ClientMessage::CatalogKnown => MessageKind::CatalogKnown,
            ClientMessage::CreateGame { .. } => MessageKind::CreateGame,
            ClientMessage::JoinGame { .. } => MessageKind::JoinGame,
            ClientMessage::StartGame => MessageKind::StartGame,
            ClientMessage::Disconnect => MessageKind::Disconnect,
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Messages sent by the server, either as replies or as pushes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServerMessage {
    ClientAccepted,
    ClientRefused {
        reason: String,
    },
    Registration {
        success: bool,
        message: String,
    },
    Login {
        success: bool,
        message: String,
    },
    CurrentUsers {
        users: Vec<UserSummary>,
    },
    CurrentGames {
        games: Vec<GameSummary>,
    },
    LoggedIn {
        user_id: UserId,
        user_name: String,
    },
    LoggedOff {
        user_id: UserId,
    },
    CatalogHash {
        hash: String,
    },
    CatalogPush {
        size: u64,
    },
    SyncFinished,
    CreateGame {
        success: bool,
        message: Option<String>,
        game_id: Option<GameId>,
    },
    JoinGame {
        success: bool,
        message: Option<String>,
    },
    JoinedGame {
        user_id: UserId,
        game_id: GameId,
    },
    LeftGame {
        user_id: UserId,
        game_id: GameId,
    },
    StartGame {
        success: bool,
        message: Option<String>,
    },
    StartedGame {
        user_id: UserId,
    },
    DrawCards {
        cards: Vec<CardId>,
    },
    CzarChange {
        user_id: UserId,
        card: CardId,
    },
    ProtocolError {
        reason: String,
    },
}

#[derive(Debug)]
pub enum FrameError {
    Io(std::io::Error),
    Encoding(bincode::Error),
    TooLarge(usize),
}

impl fmt::Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameError::Io(e) => write!(f, "connection error: {}", e),
            FrameError::Encoding(e) => write!(f, "malformed message: {}", e),
            FrameError::TooLarge(len) => {
                write!(f, "frame of {} bytes exceeds limit of {}", len, MAX_FRAME_LEN)
            }
        }
    }
}

impl std::error::Error for FrameError {}

impl From<std::io::Error> for FrameError {
    fn from(e: std::io::Error) -> Self {
        FrameError::Io(e)
    }
}

impl From<bincode::Error> for FrameError {
    fn from(e: bincode::Error) -> Self {
        FrameError::Encoding(e)
    }
}

/// Writes one length-prefixed message
pub async fn write_frame<W, T>(writer: &mut W, message: &T) -> Result<(), FrameError>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let data = bincode::serialize(message)?;
    if data.len() > MAX_FRAME_LEN {
        return Err(FrameError::TooLarge(data.len()));
    }

    writer.write_u32(data.len() as u32).await?;
    writer.write_all(&data).await?;
    Ok(())
}

/// Reads one length-prefixed message
///
/// Returns `Ok(None)` when the peer closed the connection cleanly between
/// frames.
pub async fn read_frame<R, T>(reader: &mut R) -> Result<Option<T>, FrameError>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    let len = match reader.read_u32().await {
        Ok(len) => len as usize,
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    if len > MAX_FRAME_LEN {
        return Err(FrameError::TooLarge(len));
    }

    let mut data = vec![0u8; len];
    reader.read_exact(&mut data).await?;
    Ok(Some(bincode::deserialize(&data)?))
}

/// Reads exactly `size` unframed bytes, as sent after a `CatalogPush`
pub async fn read_raw<R>(reader: &mut R, size: u64) -> Result<Vec<u8>, FrameError>
where
    R: AsyncRead + Unpin,
{
    let mut data = vec![0u8; size as usize];
    reader.read_exact(&mut data).await?;
    Ok(data)
}
