//! Message dispatch for connected sessions
//!
//! The orchestrator is the only place where client messages turn into
//! mutations of shared state. Every message is first checked against the
//! session's mode; an illegal one is answered with `ProtocolError` and the
//! connection is closed without touching any registry.

use crate::credentials;
use crate::games::{self, Departure, RoundStart};
use crate::session::{Mode, Session, SessionError, SessionId};
use crate::state::ServerState;
use crate::users::AuthError;
use log::{debug, error, info, warn};
use shared::{
    ClientMessage, GameId, ServerMessage, UserId, VERSION_MAJOR, VERSION_MINOR, VERSION_REVISION,
};
use std::sync::Arc;

/// What the connection worker should do after a message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Close,
}

#[derive(Clone)]
pub struct Orchestrator {
    state: Arc<ServerState>,
}

impl Orchestrator {
    pub fn new(state: Arc<ServerState>) -> Self {
        Self { state }
    }

    pub fn state(&self) -> &Arc<ServerState> {
        &self.state
    }

    /// Handles one message from `session`
    pub async fn dispatch(&self, session: &mut Session, message: ClientMessage) -> Flow {
        if let Err(e) = session.check(message.kind()) {
            warn!("{}: {}", session.identification(), e);
            return self.protocol_error(session, e).await;
        }
        debug!("{} -> {:?}", session.identification(), message.kind());

        match message {
            ClientMessage::ClientAuth {
                major,
                minor,
                revision,
            } => self.client_auth(session, major, minor, revision).await,
            ClientMessage::UserAuth { username, token } => {
                self.user_auth(session, username, token).await
            }
            ClientMessage::CatalogQuery => {
                session
                    .send(ServerMessage::CatalogHash {
                        hash: self.state.catalog.digest().to_string(),
                    })
                    .await;
                Flow::Continue
            }
            ClientMessage::CatalogPull => self.catalog_pull(session).await,
            ClientMessage::CatalogKnown => {
                info!("{} already knows the catalog", session.identification());
                self.finish_sync(session).await
            }
            ClientMessage::CreateGame { name, password } => {
                self.create_game(session, name, password).await
            }
            ClientMessage::JoinGame { id, password } => {
                self.join_game(session, id, password).await
            }
            ClientMessage::StartGame => self.start_game(session).await,
            ClientMessage::Disconnect => {
                info!("{} disconnecting", session.identification());
                Flow::Close
            }
        }
    }

    /// Cleans up after a connection, however it ended
    ///
    /// Safe to call more than once; only the first call finds a bound user.
    pub async fn disconnect(&self, session: &mut Session) {
        let Some(user) = session.take_user() else {
            debug!("{} left before logging in", session.identification());
            return;
        };

        let departure = {
            let mut users = self.state.users.write().await;
            users.unbind(session.id);
            let departure = self.state.games.lock().await.leave(user);
            users.set_game(user, None);
            departure
        };

        if let Some(departure) = departure {
            self.announce_departure(user, departure).await;
        }

        let others = self.state.users.read().await.online_sessions(Some(user));
        self.push(others, ServerMessage::LoggedOff { user_id: user })
            .await;
        info!("{} logged off", session.identification());
    }

    async fn client_auth(&self, session: &mut Session, major: u32, minor: u32, revision: u32) -> Flow {
        info!(
            "{} announced client version {}.{}.{}",
            session.identification(),
            major,
            minor,
            revision
        );

        if major < VERSION_MAJOR || minor < VERSION_MINOR {
            let reason = format!(
                "client version {}.{}.{} is too old, server requires {}.{}.{}",
                major, minor, revision, VERSION_MAJOR, VERSION_MINOR, VERSION_REVISION
            );
            session.send(ServerMessage::ClientRefused { reason }).await;
            return Flow::Close;
        }

        if let Err(e) = session.advance(Mode::UserAuth) {
            return self.protocol_error(session, e).await;
        }
        session.send(ServerMessage::ClientAccepted).await;
        Flow::Continue
    }

    async fn user_auth(&self, session: &mut Session, username: String, token: String) -> Flow {
        if !shared::valid_credentials(&username, &token) {
            warn!("{} sent malformed credentials", session.identification());
            session
                .send(ServerMessage::Login {
                    success: false,
                    message: "invalid username or password".to_string(),
                })
                .await;
            return Flow::Close;
        }

        let known = self.state.users.read().await.exists(&username);
        if !known {
            let outcome = match hash_token(token.clone()).await {
                Some(hashword) => self
                    .state
                    .users
                    .write()
                    .await
                    .register(&username, hashword)
                    .map(|_| format!("user {} registered", username))
                    .map_err(|e| e.to_string()),
                None => Err(format!("could not register user {}", username)),
            };

            let success = outcome.is_ok();
            let message = outcome.unwrap_or_else(|e| e);
            info!("{}: {}", session.identification(), message);
            session
                .send(ServerMessage::Registration { success, message })
                .await;
            if !success {
                return Flow::Close;
            }
        }

        let lookup = self.state.users.read().await.credentials_of(&username);
        let login = match lookup {
            Ok((user, hashword)) => {
                if verify_blocking(move || credentials::verify(&token, &hashword)).await {
                    Ok(user)
                } else {
                    Err(AuthError::WrongCredentials)
                }
            }
            Err(e) => Err(e),
        };

        // The bind, the list snapshot and every resulting message share one
        // critical section, so a concurrent login sees this user either in
        // its CurrentUsers or as a LoggedIn push after its own Login reply.
        let mut users = self.state.users.write().await;
        let user = match login.and_then(|user| users.bind(user, session.id).map(|()| user)) {
            Ok(user) => user,
            Err(e) => {
                drop(users);
                info!("{} failed to log in: {}", session.identification(), e);
                session
                    .send(ServerMessage::Login {
                        success: false,
                        message: e.to_string(),
                    })
                    .await;
                return Flow::Close;
            }
        };

        if let Err(e) = session.log_in(user, &username) {
            users.unbind(session.id);
            drop(users);
            return self.protocol_error(session, e).await;
        }
        info!("{} logged in as user {}", session.identification(), user);

        let others = users.online_sessions(Some(user));
        let online = users.online_users(Some(user));
        let games = self.state.games.lock().await.summaries();
        session
            .send(ServerMessage::Login {
                success: true,
                message: format!("logged in as {}", username),
            })
            .await;
        session
            .send(ServerMessage::CurrentUsers { users: online })
            .await;
        session.send(ServerMessage::CurrentGames { games }).await;
        self.push(
            others,
            ServerMessage::LoggedIn {
                user_id: user,
                user_name: username,
            },
        )
        .await;
        Flow::Continue
    }

    async fn catalog_pull(&self, session: &mut Session) -> Flow {
        let catalog = &self.state.catalog;
        info!(
            "{} pulls the catalog ({} bytes)",
            session.identification(),
            catalog.size()
        );
        session
            .send(ServerMessage::CatalogPush {
                size: catalog.size(),
            })
            .await;
        session.send_raw(catalog.payload()).await;
        self.finish_sync(session).await
    }

    async fn finish_sync(&self, session: &mut Session) -> Flow {
        if let Err(e) = session.advance(Mode::FreeToJoin) {
            return self.protocol_error(session, e).await;
        }
        session.send(ServerMessage::SyncFinished).await;
        Flow::Continue
    }

    async fn create_game(
        &self,
        session: &mut Session,
        name: String,
        password: Option<String>,
    ) -> Flow {
        let Some(user) = session.user() else {
            return Flow::Close;
        };

        let reply = |result: Result<GameId, String>| match result {
            Ok(id) => ServerMessage::CreateGame {
                success: true,
                message: None,
                game_id: Some(id),
            },
            Err(message) => ServerMessage::CreateGame {
                success: false,
                message: Some(message),
                game_id: None,
            },
        };

        if let Err(e) = games::validate_request(&name, password.as_deref()) {
            info!("{} sent an invalid game request", session.identification());
            session.send(reply(Err(e.to_string()))).await;
            return Flow::Continue;
        }

        let password_hash = match password {
            Some(password) => match hash_token(password).await {
                Some(hashword) => Some(hashword),
                None => {
                    session
                        .send(reply(Err("could not create game".to_string())))
                        .await;
                    return Flow::Continue;
                }
            },
            None => None,
        };

        let result = self
            .state
            .games
            .lock()
            .await
            .create(&name, password_hash, user, &self.state.catalog);
        match &result {
            Ok(id) => info!("{} created game {} ({})", session.identification(), id, name),
            Err(e) => info!("{} could not create game: {}", session.identification(), e),
        }
        session.send(reply(result.map_err(|e| e.to_string()))).await;
        Flow::Continue
    }

    async fn join_game(&self, session: &mut Session, id: GameId, password: Option<String>) -> Flow {
        let Some(user) = session.user() else {
            return Flow::Close;
        };

        let stored = self.state.games.lock().await.password_hash(id);
        let verified = match stored {
            Ok(Some(hashword)) => {
                verify_blocking(move || games::password_matches(password.as_deref(), &hashword))
                    .await
            }
            _ => false,
        };
        let result = self.state.games.lock().await.join(id, user, verified);

        let others = match result {
            Ok(others) => others,
            Err(e) => {
                info!("{} could not join game {}: {}", session.identification(), id, e);
                session
                    .send(ServerMessage::JoinGame {
                        success: false,
                        message: Some(e.to_string()),
                    })
                    .await;
                return Flow::Continue;
            }
        };

        if let Err(e) = session.advance(Mode::InGame) {
            return self.protocol_error(session, e).await;
        }
        let recipients = {
            let mut users = self.state.users.write().await;
            users.set_game(user, Some(id));
            sessions_of(&users, &others)
        };
        info!("{} joined game {}", session.identification(), id);

        self.push(recipients, ServerMessage::JoinedGame { user_id: user, game_id: id })
            .await;
        session
            .send(ServerMessage::JoinGame {
                success: true,
                message: None,
            })
            .await;
        Flow::Continue
    }

    async fn start_game(&self, session: &mut Session) -> Flow {
        let Some(user) = session.user() else {
            return Flow::Close;
        };

        let game = self
            .state
            .users
            .read()
            .await
            .get(user)
            .and_then(|record| record.game);
        let Some(game) = game else {
            session
                .send(ServerMessage::StartGame {
                    success: false,
                    message: Some("not a member of any game".to_string()),
                })
                .await;
            return Flow::Continue;
        };

        let result = {
            let mut games = self.state.games.lock().await;
            let mut rng = rand::thread_rng();
            games.start(game, user, &self.state.catalog, &mut rng)
        };

        match result {
            Ok(round) => {
                info!("{} started game {}", session.identification(), game);
                session
                    .send(ServerMessage::StartGame {
                        success: true,
                        message: None,
                    })
                    .await;
                self.deal(user, round).await;
            }
            Err(e) => {
                info!("{} could not start game {}: {}", session.identification(), game, e);
                session
                    .send(ServerMessage::StartGame {
                        success: false,
                        message: Some(e.to_string()),
                    })
                    .await;
            }
        }
        Flow::Continue
    }

    /// Sends every member its share of a freshly started round
    async fn deal(&self, starter: UserId, round: RoundStart) {
        let members: Vec<(SessionId, Vec<shared::CardId>)> = {
            let users = self.state.users.read().await;
            round
                .hands
                .into_iter()
                .filter_map(|(member, hand)| users.session_of(member).map(|s| (s, hand)))
                .collect()
        };

        let clients = self.state.clients.read().await;
        for (session, hand) in members {
            clients.send_to(session, ServerMessage::StartedGame { user_id: starter });
            clients.send_to(session, ServerMessage::DrawCards { cards: hand });
            clients.send_to(
                session,
                ServerMessage::CzarChange {
                    user_id: round.czar,
                    card: round.black_card,
                },
            );
        }
    }

    async fn announce_departure(&self, user: UserId, departure: Departure) {
        if departure.closed {
            return;
        }

        let recipients = sessions_of(&*self.state.users.read().await, &departure.remaining);
        self.push(
            recipients.clone(),
            ServerMessage::LeftGame {
                user_id: user,
                game_id: departure.game_id,
            },
        )
        .await;

        if let Some((czar, card)) = departure.czar_change {
            self.push(recipients, ServerMessage::CzarChange { user_id: czar, card })
                .await;
        }
    }

    /// Pushes `message` to other sessions without waiting on any of them
    async fn push(&self, recipients: Vec<SessionId>, message: ServerMessage) {
        if recipients.is_empty() {
            return;
        }
        let wanted = recipients.len();
        let delivered = self.state.clients.read().await.broadcast(recipients, &message);
        if delivered < wanted {
            warn!("Push delivered to {} of {} sessions", delivered, wanted);
        }
    }

    async fn protocol_error(&self, session: &Session, e: SessionError) -> Flow {
        session
            .send(ServerMessage::ProtocolError {
                reason: e.to_string(),
            })
            .await;
        Flow::Close
    }
}

fn sessions_of(users: &crate::users::UserRegistry, members: &[UserId]) -> Vec<SessionId> {
    members
        .iter()
        .filter_map(|member| users.session_of(*member))
        .collect()
}

/// Runs an argon2 check off the async workers
async fn verify_blocking<F>(check: F) -> bool
where
    F: FnOnce() -> bool + Send + 'static,
{
    match tokio::task::spawn_blocking(check).await {
        Ok(matches) => matches,
        Err(e) => {
            error!("Verification task failed: {}", e);
            false
        }
    }
}

/// Hashes a token off the async workers
async fn hash_token(token: String) -> Option<String> {
    match tokio::task::spawn_blocking(move || credentials::hash(&token)).await {
        Ok(Ok(hashword)) => Some(hashword),
        Ok(Err(e)) => {
            error!("{}", e);
            None
        }
        Err(e) => {
            error!("Hashing task failed: {}", e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::tests::sample_catalog;
    use crate::client_manager::Outbound;
    use crate::config::ServerConfig;
    use std::net::{IpAddr, Ipv4Addr, SocketAddr};
    use tokio::sync::mpsc;

    struct Peer {
        session: Session,
        rx: mpsc::Receiver<Outbound>,
    }

    impl Peer {
        fn next(&mut self) -> ServerMessage {
            match self.rx.try_recv() {
                Ok(Outbound::Message(message)) => message,
                other => panic!("Expected a message, got {:?}", other),
            }
        }

        fn drain(&mut self) -> Vec<ServerMessage> {
            let mut messages = Vec::new();
            while let Ok(outbound) = self.rx.try_recv() {
                if let Outbound::Message(message) = outbound {
                    messages.push(message);
                }
            }
            messages
        }
    }

    fn orchestrator(whites: u32) -> Orchestrator {
        let config = ServerConfig {
            hand_size: 2,
            ..ServerConfig::default()
        };
        let catalog = Arc::new(sample_catalog(whites, 3, config.hand_size));
        Orchestrator::new(Arc::new(ServerState::new(config, catalog)))
    }

    async fn connect(orchestrator: &Orchestrator, port: u16) -> Peer {
        let (tx, rx) = mpsc::channel(64);
        let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), port);
        let id = orchestrator
            .state()
            .clients
            .write()
            .await
            .add_client(addr, tx.clone())
            .unwrap();
        Peer {
            session: Session::new(id, addr, tx),
            rx,
        }
    }

    fn token(c: char) -> String {
        c.to_string().repeat(shared::TOKEN_LEN)
    }

    async fn send(orchestrator: &Orchestrator, peer: &mut Peer, message: ClientMessage) -> Flow {
        orchestrator.dispatch(&mut peer.session, message).await
    }

    async fn logged_in(orchestrator: &Orchestrator, port: u16, name: &str) -> Peer {
        let mut peer = connect(orchestrator, port).await;
        let hello = ClientMessage::ClientAuth {
            major: VERSION_MAJOR,
            minor: VERSION_MINOR,
            revision: VERSION_REVISION,
        };
        assert_eq!(send(orchestrator, &mut peer, hello).await, Flow::Continue);
        let auth = ClientMessage::UserAuth {
            username: name.to_string(),
            token: token(name.chars().next().unwrap()),
        };
        assert_eq!(send(orchestrator, &mut peer, auth).await, Flow::Continue);
        assert_eq!(
            send(orchestrator, &mut peer, ClientMessage::CatalogKnown).await,
            Flow::Continue
        );
        peer.drain();
        peer
    }

    #[tokio::test]
    async fn test_illegal_message_closes_without_mutation() {
        let orchestrator = orchestrator(20);
        let mut peer = connect(&orchestrator, 1).await;

        let flow = send(
            &orchestrator,
            &mut peer,
            ClientMessage::CreateGame {
                name: "Party".to_string(),
                password: None,
            },
        )
        .await;

        assert_eq!(flow, Flow::Close);
        assert!(matches!(peer.next(), ServerMessage::ProtocolError { .. }));
        assert!(orchestrator.state().games.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_old_client_is_refused() {
        let orchestrator = orchestrator(20);
        let mut peer = connect(&orchestrator, 1).await;

        let flow = send(
            &orchestrator,
            &mut peer,
            ClientMessage::ClientAuth {
                major: 0,
                minor: 0,
                revision: 9,
            },
        )
        .await;

        assert_eq!(flow, Flow::Close);
        assert!(matches!(peer.next(), ServerMessage::ClientRefused { .. }));
        assert_eq!(peer.session.mode(), Mode::ClientAuth);
    }

    #[tokio::test]
    async fn test_first_login_registers_and_syncs_lists() {
        let orchestrator = orchestrator(20);
        let mut first = logged_in(&orchestrator, 1, "alice_party").await;

        let mut second = connect(&orchestrator, 2).await;
        send(
            &orchestrator,
            &mut second,
            ClientMessage::ClientAuth {
                major: VERSION_MAJOR,
                minor: VERSION_MINOR,
                revision: 0,
            },
        )
        .await;
        send(
            &orchestrator,
            &mut second,
            ClientMessage::UserAuth {
                username: "bobby_party".to_string(),
                token: token('b'),
            },
        )
        .await;

        let replies = second.drain();
        assert_eq!(replies[0], ServerMessage::ClientAccepted);
        assert!(matches!(
            replies[1],
            ServerMessage::Registration { success: true, .. }
        ));
        assert!(matches!(replies[2], ServerMessage::Login { success: true, .. }));
        match &replies[3] {
            ServerMessage::CurrentUsers { users } => {
                assert_eq!(users.len(), 1);
                assert_eq!(users[0].name, "alice_party");
            }
            other => panic!("Unexpected reply: {:?}", other),
        }
        assert_eq!(replies[4], ServerMessage::CurrentGames { games: vec![] });
        assert_eq!(second.session.mode(), Mode::InitialSync);

        match first.next() {
            ServerMessage::LoggedIn { user_name, .. } => assert_eq!(user_name, "bobby_party"),
            other => panic!("Unexpected push: {:?}", other),
        }
    }

    async fn announced(orchestrator: &Orchestrator, port: u16) -> Peer {
        let mut peer = connect(orchestrator, port).await;
        let hello = ClientMessage::ClientAuth {
            major: VERSION_MAJOR,
            minor: VERSION_MINOR,
            revision: VERSION_REVISION,
        };
        assert_eq!(send(orchestrator, &mut peer, hello).await, Flow::Continue);
        peer.drain();
        peer
    }

    #[tokio::test]
    async fn test_login_verifies_without_holding_users_lock() {
        let orchestrator = orchestrator(20);
        let mut alice = logged_in(&orchestrator, 1, "alice_party").await;
        let alice_id = alice.session.user().unwrap();
        orchestrator.disconnect(&mut alice.session).await;

        let mut peer = announced(&orchestrator, 2).await;
        let login = tokio::spawn({
            let orchestrator = orchestrator.clone();
            async move {
                let auth = ClientMessage::UserAuth {
                    username: "alice_party".to_string(),
                    token: token('a'),
                };
                let flow = orchestrator.dispatch(&mut peer.session, auth).await;
                (flow, peer)
            }
        });
        // runs while the login waits for its argon2 check
        let observer = tokio::spawn({
            let orchestrator = orchestrator.clone();
            async move {
                let users = orchestrator.state().users.try_write().ok()?;
                Some(users.session_of(alice_id))
            }
        });

        assert_eq!(observer.await.unwrap(), Some(None));
        let (flow, peer) = login.await.unwrap();
        assert_eq!(flow, Flow::Continue);
        assert_eq!(peer.session.user(), Some(alice_id));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_logins_see_each_other_once() {
        let orchestrator = orchestrator(20);
        for (port, name) in [(1, "alice_party"), (2, "bobby_party")] {
            let mut peer = logged_in(&orchestrator, port, name).await;
            orchestrator.disconnect(&mut peer.session).await;
        }

        let mut logins = Vec::new();
        let pairs = [(3, "alice_party", "bobby_party"), (4, "bobby_party", "alice_party")];
        for (port, name, other) in pairs {
            let mut peer = announced(&orchestrator, port).await;
            let orchestrator = orchestrator.clone();
            logins.push(tokio::spawn(async move {
                let auth = ClientMessage::UserAuth {
                    username: name.to_string(),
                    token: token(name.chars().next().unwrap()),
                };
                let flow = orchestrator.dispatch(&mut peer.session, auth).await;
                assert_eq!(flow, Flow::Continue);
                (peer, other)
            }));
        }

        for login in logins {
            let (mut peer, other) = login.await.unwrap();
            let messages = peer.drain();
            let own_login = messages
                .iter()
                .position(|m| matches!(m, ServerMessage::Login { success: true, .. }))
                .unwrap();
            let listed = messages.iter().any(|m| match m {
                ServerMessage::CurrentUsers { users } => users.iter().any(|u| u.name == other),
                _ => false,
            });
            let pushed = messages.iter().position(|m| match m {
                ServerMessage::LoggedIn { user_name, .. } => user_name == other,
                _ => false,
            });

            assert!(listed != pushed.is_some(), "{:?}", messages);
            assert!(pushed.map_or(true, |at| at > own_login));
        }
    }

    #[tokio::test]
    async fn test_short_username_is_rejected() {
        let orchestrator = orchestrator(20);
        let mut peer = connect(&orchestrator, 1).await;
        send(
            &orchestrator,
            &mut peer,
            ClientMessage::ClientAuth {
                major: VERSION_MAJOR,
                minor: VERSION_MINOR,
                revision: 0,
            },
        )
        .await;
        peer.drain();

        let flow = send(
            &orchestrator,
            &mut peer,
            ClientMessage::UserAuth {
                username: "alice".to_string(),
                token: token('a'),
            },
        )
        .await;

        assert_eq!(flow, Flow::Close);
        assert!(matches!(peer.next(), ServerMessage::Login { success: false, .. }));
        assert!(orchestrator.state().users.read().await.is_empty());
    }

    #[tokio::test]
    async fn test_catalog_pull_sends_size_then_bytes() {
        let orchestrator = orchestrator(20);
        let mut peer = connect(&orchestrator, 1).await;
        send(
            &orchestrator,
            &mut peer,
            ClientMessage::ClientAuth {
                major: VERSION_MAJOR,
                minor: VERSION_MINOR,
                revision: 0,
            },
        )
        .await;
        send(
            &orchestrator,
            &mut peer,
            ClientMessage::UserAuth {
                username: "alice_party".to_string(),
                token: token('a'),
            },
        )
        .await;
        peer.drain();

        send(&orchestrator, &mut peer, ClientMessage::CatalogPull).await;

        let size = match peer.next() {
            ServerMessage::CatalogPush { size } => size,
            other => panic!("Unexpected reply: {:?}", other),
        };
        match peer.rx.try_recv() {
            Ok(Outbound::Raw(bytes)) => assert_eq!(bytes.len() as u64, size),
            other => panic!("Expected raw bytes, got {:?}", other),
        }
        assert_eq!(peer.next(), ServerMessage::SyncFinished);
        assert_eq!(peer.session.mode(), Mode::FreeToJoin);
    }

    #[tokio::test]
    async fn test_join_pushes_to_existing_members() {
        let orchestrator = orchestrator(20);
        let mut alice = logged_in(&orchestrator, 1, "alice_party").await;
        let mut bob = logged_in(&orchestrator, 2, "bobby_party").await;
        alice.drain();

        send(
            &orchestrator,
            &mut alice,
            ClientMessage::CreateGame {
                name: "Party".to_string(),
                password: None,
            },
        )
        .await;
        let game_id = match alice.next() {
            ServerMessage::CreateGame {
                success: true,
                game_id: Some(id),
                ..
            } => id,
            other => panic!("Unexpected reply: {:?}", other),
        };
        assert_eq!(alice.session.mode(), Mode::FreeToJoin);

        send(&orchestrator, &mut alice, ClientMessage::JoinGame { id: game_id, password: None }).await;
        assert!(matches!(alice.next(), ServerMessage::JoinGame { success: true, .. }));
        assert_eq!(alice.session.mode(), Mode::InGame);

        send(&orchestrator, &mut bob, ClientMessage::JoinGame { id: game_id, password: None }).await;
        assert!(matches!(bob.next(), ServerMessage::JoinGame { success: true, .. }));

        let bob_id = bob.session.user().unwrap();
        assert_eq!(
            alice.next(),
            ServerMessage::JoinedGame {
                user_id: bob_id,
                game_id
            }
        );
    }

    #[tokio::test]
    async fn test_game_password_verifies_without_holding_games_lock() {
        let orchestrator = orchestrator(20);
        let mut alice = logged_in(&orchestrator, 1, "alice_party").await;
        let mut bob = logged_in(&orchestrator, 2, "bobby_party").await;
        let secret = token('s');
        alice.drain();

        send(
            &orchestrator,
            &mut alice,
            ClientMessage::CreateGame {
                name: "Private".to_string(),
                password: Some(secret.clone()),
            },
        )
        .await;
        assert!(matches!(alice.next(), ServerMessage::CreateGame { success: true, .. }));

        send(
            &orchestrator,
            &mut bob,
            ClientMessage::JoinGame {
                id: 1,
                password: Some(token('x')),
            },
        )
        .await;
        assert_eq!(
            bob.next(),
            ServerMessage::JoinGame {
                success: false,
                message: Some("wrong password".to_string()),
            }
        );
        assert_eq!(bob.session.mode(), Mode::FreeToJoin);

        let join = tokio::spawn({
            let orchestrator = orchestrator.clone();
            async move {
                let message = ClientMessage::JoinGame {
                    id: 1,
                    password: Some(secret),
                };
                orchestrator.dispatch(&mut bob.session, message).await;
                bob
            }
        });
        // runs while the join waits for its argon2 check
        let observer = tokio::spawn({
            let orchestrator = orchestrator.clone();
            async move {
                let games = orchestrator.state().games.try_lock().ok()?;
                games.get(1).map(|game| game.members().len())
            }
        });

        assert_eq!(observer.await.unwrap(), Some(0));
        let mut bob = join.await.unwrap();
        assert!(matches!(bob.next(), ServerMessage::JoinGame { success: true, .. }));
        assert_eq!(bob.session.mode(), Mode::InGame);
    }

    #[tokio::test]
    async fn test_start_deals_to_every_member() {
        let orchestrator = orchestrator(20);
        let mut peers = Vec::new();
        for (port, name) in [(1, "alice_party"), (2, "bobby_party"), (3, "carol_party")] {
            peers.push(logged_in(&orchestrator, port, name).await);
        }

        send(
            &orchestrator,
            &mut peers[0],
            ClientMessage::CreateGame {
                name: "Party".to_string(),
                password: None,
            },
        )
        .await;
        for peer in peers.iter_mut() {
            send(&orchestrator, peer, ClientMessage::JoinGame { id: 1, password: None }).await;
        }
        for peer in peers.iter_mut() {
            peer.drain();
        }

        send(&orchestrator, &mut peers[1], ClientMessage::StartGame).await;
        let starter = peers[1].session.user().unwrap();
        let czar = peers[0].session.user().unwrap();

        assert!(matches!(
            peers[1].next(),
            ServerMessage::StartGame { success: true, .. }
        ));
        for peer in peers.iter_mut() {
            assert_eq!(peer.next(), ServerMessage::StartedGame { user_id: starter });
            match peer.next() {
                ServerMessage::DrawCards { cards } => assert_eq!(cards.len(), 2),
                other => panic!("Unexpected push: {:?}", other),
            }
            match peer.next() {
                ServerMessage::CzarChange { user_id, card } => {
                    assert_eq!(user_id, czar);
                    assert!(card >= 1000);
                }
                other => panic!("Unexpected push: {:?}", other),
            }
        }
    }

    #[tokio::test]
    async fn test_disconnect_leaves_game_and_logs_off() {
        let orchestrator = orchestrator(20);
        let mut alice = logged_in(&orchestrator, 1, "alice_party").await;
        let mut bob = logged_in(&orchestrator, 2, "bobby_party").await;

        send(
            &orchestrator,
            &mut alice,
            ClientMessage::CreateGame {
                name: "Party".to_string(),
                password: None,
            },
        )
        .await;
        send(&orchestrator, &mut alice, ClientMessage::JoinGame { id: 1, password: None }).await;
        send(&orchestrator, &mut bob, ClientMessage::JoinGame { id: 1, password: None }).await;
        alice.drain();

        let bob_id = bob.session.user().unwrap();
        orchestrator.disconnect(&mut bob.session).await;
        orchestrator.disconnect(&mut bob.session).await;

        assert_eq!(
            alice.drain(),
            vec![
                ServerMessage::LeftGame {
                    user_id: bob_id,
                    game_id: 1
                },
                ServerMessage::LoggedOff { user_id: bob_id },
            ]
        );
        let games = orchestrator.state().games.lock().await;
        assert_eq!(games.get(1).unwrap().members().len(), 1);
    }
}
