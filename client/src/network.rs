use crate::cache::CatalogCache;
use crate::error::ClientError;
use crate::game::Lobby;
use log::{debug, info, warn};
use shared::protocol::{read_frame, read_raw, write_frame};
use shared::{ClientMessage, GameId, ServerMessage, VERSION_MAJOR, VERSION_MINOR, VERSION_REVISION};
use std::time::Duration;
use tokio::io::{AsyncWriteExt, BufReader, BufWriter};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::time::timeout;

/// How the catalog was brought up to date
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// The cached copy matched the server's digest
    Cached,
    /// The catalog was pulled, `size` bytes
    Pulled { size: u64 },
}

/// A framed connection to the card game server
///
/// Request helpers send one message and wait for its reply. Pushes arriving
/// in between are applied to the [`Lobby`] view on the way.
pub struct Client {
    reader: BufReader<OwnedReadHalf>,
    writer: BufWriter<OwnedWriteHalf>,
    lobby: Lobby,
    reply_timeout: Duration,
}

impl Client {
    pub async fn connect(addr: &str) -> Result<Self, ClientError> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        let (reader, writer) = stream.into_split();
        info!("Connected to {}", addr);

        Ok(Client {
            reader: BufReader::new(reader),
            writer: BufWriter::new(writer),
            lobby: Lobby::new(),
            reply_timeout: Duration::from_secs(10),
        })
    }

    pub fn with_reply_timeout(mut self, reply_timeout: Duration) -> Self {
        self.reply_timeout = reply_timeout;
        self
    }

    pub fn lobby(&self) -> &Lobby {
        &self.lobby
    }

    pub async fn send(&mut self, message: &ClientMessage) -> Result<(), ClientError> {
        debug!("Sending {:?}", message.kind());
        write_frame(&mut self.writer, message).await?;
        self.writer.flush().await?;
        Ok(())
    }

    /// Reads the next message, whatever it is
    pub async fn recv(&mut self) -> Result<ServerMessage, ClientError> {
        let message = read_frame::<_, ServerMessage>(&mut self.reader)
            .await?
            .ok_or(ClientError::Closed)?;
        self.lobby.apply(&message);
        Ok(message)
    }

    /// Reads until `pick` accepts a message
    ///
    /// A `ProtocolError` ends the wait with an error.
    pub async fn wait_for<T, F>(&mut self, mut pick: F) -> Result<T, ClientError>
    where
        F: FnMut(ServerMessage) -> Option<T>,
    {
        let reply_timeout = self.reply_timeout;
        let wait = async {
            loop {
                let message = match self.recv().await {
                    Ok(message) => message,
                    Err(e) => return Err(e),
                };
                if let ServerMessage::ProtocolError { reason } = message {
                    return Err(ClientError::Protocol(reason));
                }
                if let Some(picked) = pick(message) {
                    return Ok(picked);
                }
            }
        };
        timeout(reply_timeout, wait)
            .await
            .map_err(|_| ClientError::Timeout)?
    }

    /// Sends the client version, the first message of every connection
    pub async fn announce_version(&mut self) -> Result<(), ClientError> {
        self.send(&ClientMessage::ClientAuth {
            major: VERSION_MAJOR,
            minor: VERSION_MINOR,
            revision: VERSION_REVISION,
        })
        .await?;

        self.wait_for(|message| match message {
            ServerMessage::ClientAccepted => Some(Ok(())),
            ServerMessage::ClientRefused { reason } => Some(Err(ClientError::Refused(reason))),
            _ => None,
        })
        .await?
    }

    /// Logs in, registering the name first if the server does not know it
    ///
    /// Returns once the user and game lists have arrived.
    pub async fn authenticate(&mut self, username: &str, token: &str) -> Result<(), ClientError> {
        self.send(&ClientMessage::UserAuth {
            username: username.to_string(),
            token: token.to_string(),
        })
        .await?;

        self.wait_for(|message| match message {
            ServerMessage::Registration { success, message } => {
                info!("{}", message);
                (!success).then_some(Err(ClientError::Rejected(message)))
            }
            ServerMessage::Login { success: false, message } => {
                Some(Err(ClientError::Rejected(message)))
            }
            ServerMessage::Login { message, .. } => {
                info!("{}", message);
                None
            }
            ServerMessage::CurrentGames { .. } => Some(Ok(())),
            _ => None,
        })
        .await?
    }

    /// Brings `cache` up to date with the server's catalog
    pub async fn sync_catalog(&mut self, cache: &mut CatalogCache) -> Result<SyncOutcome, ClientError> {
        self.send(&ClientMessage::CatalogQuery).await?;
        let hash = self
            .wait_for(|message| match message {
                ServerMessage::CatalogHash { hash } => Some(hash),
                _ => None,
            })
            .await?;

        let outcome = if cache.digest() == Some(hash.as_str()) {
            info!("Cached catalog is current");
            self.send(&ClientMessage::CatalogKnown).await?;
            SyncOutcome::Cached
        } else {
            self.send(&ClientMessage::CatalogPull).await?;
            let size = self
                .wait_for(|message| match message {
                    ServerMessage::CatalogPush { size } => Some(size),
                    _ => None,
                })
                .await?;
            let payload = timeout(self.reply_timeout, read_raw(&mut self.reader, size))
                .await
                .map_err(|_| ClientError::Timeout)??;
            cache.store(payload, &hash)?;
            info!("Pulled {} cards ({} bytes)", cache.len(), size);
            SyncOutcome::Pulled { size }
        };

        self.wait_for(|message| match message {
            ServerMessage::SyncFinished => Some(()),
            _ => None,
        })
        .await?;
        Ok(outcome)
    }

    pub async fn create_game(&mut self, name: &str, password: Option<&str>) -> Result<GameId, ClientError> {
        self.send(&ClientMessage::CreateGame {
            name: name.to_string(),
            password: password.map(str::to_string),
        })
        .await?;

        let id = self
            .wait_for(|message| match message {
                ServerMessage::CreateGame {
                    success: true,
                    game_id: Some(id),
                    ..
                } => Some(Ok(id)),
                ServerMessage::CreateGame { message, .. } => Some(Err(ClientError::Rejected(
                    message.unwrap_or_default(),
                ))),
                _ => None,
            })
            .await??;
        self.lobby.games.insert(id, name.to_string());
        Ok(id)
    }

    pub async fn join_game(&mut self, id: GameId, password: Option<&str>) -> Result<(), ClientError> {
        self.send(&ClientMessage::JoinGame {
            id,
            password: password.map(str::to_string),
        })
        .await?;

        self.wait_for(|message| match message {
            ServerMessage::JoinGame { success: true, .. } => Some(Ok(())),
            ServerMessage::JoinGame { message, .. } => {
                Some(Err(ClientError::Rejected(message.unwrap_or_default())))
            }
            _ => None,
        })
        .await??;
        self.lobby.game = Some(id);
        Ok(())
    }

    pub async fn start_game(&mut self) -> Result<(), ClientError> {
        self.send(&ClientMessage::StartGame).await?;

        self.wait_for(|message| match message {
            ServerMessage::StartGame { success: true, .. } => Some(Ok(())),
            ServerMessage::StartGame { message, .. } => {
                Some(Err(ClientError::Rejected(message.unwrap_or_default())))
            }
            _ => None,
        })
        .await?
    }

    /// Says goodbye and waits for the server to close the connection
    ///
    /// The server closes only after the session is cleaned up, so the same
    /// user may log in again as soon as this returns.
    pub async fn disconnect(mut self) -> Result<(), ClientError> {
        self.send(&ClientMessage::Disconnect).await?;
        match self.wait_for(|message| {
            warn!("Ignoring {:?} while disconnecting", message);
            None::<()>
        })
        .await
        {
            Ok(()) | Err(ClientError::Closed) => Ok(()),
            Err(e) => Err(e),
        }
    }
}
