//! Server network layer handling TCP connections
//!
//! Each accepted connection gets two tasks: a reader that decodes frames and
//! hands them to the [`Orchestrator`], and a writer that drains the
//! connection's outbound queue onto the socket. The writer is the only task
//! that ever writes to a given socket, so replies and pushes never interleave
//! inside a frame.

use crate::client_manager::Outbound;
use crate::orchestrator::{Flow, Orchestrator};
use crate::session::{Session, SessionId};
use crate::state::ServerState;
use log::{debug, error, info, warn};
use shared::protocol::{read_frame, write_frame};
use shared::{ClientMessage, FrameError, ServerMessage};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncWriteExt, BufReader, BufWriter};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

/// Accepts connections and runs one worker per session
pub struct Server {
    listener: TcpListener,
    orchestrator: Orchestrator,
}

impl Server {
    pub async fn bind(addr: &str, state: Arc<ServerState>) -> Result<Self, std::io::Error> {
        let listener = TcpListener::bind(addr).await?;
        info!("Server listening on {}", listener.local_addr()?);

        Ok(Server {
            listener,
            orchestrator: Orchestrator::new(state),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, std::io::Error> {
        self.listener.local_addr()
    }

    /// Accept loop, runs until the listener fails
    pub async fn run(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        info!("Server started successfully");

        loop {
            let (stream, addr) = match self.listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    error!("Error accepting connection: {}", e);
                    continue;
                }
            };
            if let Err(e) = stream.set_nodelay(true) {
                debug!("Could not disable Nagle for {}: {}", addr, e);
            }

            let orchestrator = self.orchestrator.clone();
            tokio::spawn(async move {
                handle_connection(orchestrator, stream, addr).await;
            });
        }
    }
}

async fn handle_connection(orchestrator: Orchestrator, stream: TcpStream, addr: SocketAddr) {
    let capacity = orchestrator.state().config.outbound_capacity;
    let (outbound_tx, outbound_rx) = mpsc::channel(capacity);
    let (reader, writer) = stream.into_split();

    let session_id = orchestrator
        .state()
        .clients
        .write()
        .await
        .add_client(addr, outbound_tx.clone());
    let Some(session_id) = session_id else {
        warn!("Rejecting {}: server full", addr);
        let mut writer = BufWriter::new(writer);
        let refusal = ServerMessage::ProtocolError {
            reason: "server full".to_string(),
        };
        if write_frame(&mut writer, &refusal).await.is_ok() {
            let _ = writer.flush().await;
        }
        return;
    };

    let writer_task = tokio::spawn(write_loop(writer, outbound_rx, session_id));
    let mut session = Session::new(session_id, addr, outbound_tx.clone());

    read_loop(&orchestrator, &mut session, reader).await;

    orchestrator.disconnect(&mut session).await;
    orchestrator
        .state()
        .clients
        .write()
        .await
        .remove_client(&session_id);

    // pushes queued before this point are still written
    let _ = outbound_tx.send(Outbound::Close).await;
    drop(session);
    drop(outbound_tx);
    if let Err(e) = writer_task.await {
        error!("Writer task for session {} panicked: {}", session_id, e);
    }
    info!("Connection from {} closed", addr);
}

async fn read_loop(orchestrator: &Orchestrator, session: &mut Session, reader: OwnedReadHalf) {
    let mut reader = BufReader::new(reader);

    loop {
        match read_frame::<_, ClientMessage>(&mut reader).await {
            Ok(Some(message)) => {
                if orchestrator.dispatch(session, message).await == Flow::Close {
                    break;
                }
            }
            Ok(None) => {
                info!("{} closed the connection", session.identification());
                break;
            }
            Err(FrameError::Io(e)) => {
                error!("{} connection error: {}", session.identification(), e);
                break;
            }
            Err(e) => {
                warn!("{} sent a bad frame: {}", session.identification(), e);
                session
                    .send(ServerMessage::ProtocolError {
                        reason: e.to_string(),
                    })
                    .await;
                break;
            }
        }
    }
}

async fn write_loop(
    writer: OwnedWriteHalf,
    mut outbound: mpsc::Receiver<Outbound>,
    session_id: SessionId,
) {
    let mut writer = BufWriter::new(writer);

    while let Some(item) = outbound.recv().await {
        let result = match item {
            Outbound::Message(message) => write_frame(&mut writer, &message).await,
            Outbound::Raw(bytes) => writer.write_all(&bytes).await.map_err(FrameError::Io),
            Outbound::Close => break,
        };
        let result = match result {
            Ok(()) => writer.flush().await.map_err(FrameError::Io),
            err => err,
        };
        if let Err(e) = result {
            error!("Failed to write to session {}: {}", session_id, e);
            return;
        }
    }

    if let Err(e) = writer.flush().await {
        debug!("Final flush for session {} failed: {}", session_id, e);
    }
    let _ = writer.shutdown().await;
}
