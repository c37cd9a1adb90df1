use log::debug;
use shared::{CardId, GameId, ServerMessage, UserId};
use std::collections::BTreeMap;

/// What the client knows about the server's lobby and its own game
///
/// Built purely from server messages; the server stays authoritative.
#[derive(Debug, Clone, Default)]
pub struct Lobby {
    /// Other online users
    pub users: BTreeMap<UserId, String>,
    pub games: BTreeMap<GameId, String>,
    /// Game this client joined
    pub game: Option<GameId>,
    /// Other members of `game` that joined after this client
    pub members: Vec<UserId>,
    pub started_by: Option<UserId>,
    pub hand: Vec<CardId>,
    pub czar: Option<UserId>,
    pub black_card: Option<CardId>,
}

impl Lobby {
    pub fn new() -> Self {
        Self::default()
    }

    /// Updates the view from one server message
    pub fn apply(&mut self, message: &ServerMessage) {
        match message {
            ServerMessage::CurrentUsers { users } => {
                self.users = users
                    .iter()
                    .map(|user| (user.id, user.name.clone()))
                    .collect();
            }
            ServerMessage::CurrentGames { games } => {
                self.games = games
                    .iter()
                    .map(|game| (game.id, game.name.clone()))
                    .collect();
            }
            ServerMessage::LoggedIn { user_id, user_name } => {
                self.users.insert(*user_id, user_name.clone());
            }
            ServerMessage::LoggedOff { user_id } => {
                self.users.remove(user_id);
                self.members.retain(|member| member != user_id);
            }
            ServerMessage::JoinedGame { user_id, game_id } if Some(*game_id) == self.game => {
                if !self.members.contains(user_id) {
                    self.members.push(*user_id);
                }
            }
            ServerMessage::LeftGame { user_id, game_id } if Some(*game_id) == self.game => {
                self.members.retain(|member| member != user_id);
            }
            ServerMessage::StartedGame { user_id } => {
                self.started_by = Some(*user_id);
            }
            ServerMessage::DrawCards { cards } => {
                self.hand.extend(cards.iter().copied());
            }
            ServerMessage::CzarChange { user_id, card } => {
                self.czar = Some(*user_id);
                self.black_card = Some(*card);
            }
            other => debug!("Lobby ignores {:?}", other),
        }
    }

    pub fn user_name(&self, id: UserId) -> Option<&str> {
        self.users.get(&id).map(String::as_str)
    }

    pub fn is_started(&self) -> bool {
        self.started_by.is_some()
    }
}
