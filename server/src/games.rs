//! Game lobbies and round dealing
//!
//! A game starts in the lobby, collects members and moves to `InProgress`
//! when one of them starts it. Starting deals every member a hand of white
//! cards from a shuffled pile and picks a black card; cards leave the piles
//! for good, so nothing is dealt twice within one game.
//!
//! The registry is kept behind a single mutex by the server. Every operation
//! here is synchronous and completes inside one critical section, which makes
//! join and start all-or-nothing for concurrent connection workers. Game
//! passwords are verified with [`password_matches`] before taking the lock;
//! `join` only learns the outcome.

use crate::catalog::CardCatalog;
use crate::credentials;
use log::{debug, info};
use rand::seq::SliceRandom;
use rand::Rng;
use shared::{Card, CardId, CardKind, GameId, GameSummary, UserId, GAME_NAME_MAX_LEN, TOKEN_LEN};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameState {
    Lobby,
    InProgress,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GameError {
    InvalidRequest,
    NotEnoughCards,
    NotFound(GameId),
    WrongPassword,
    Full,
    InProgress,
    AlreadyMember,
    NotAMember,
    NotEnoughMembers { present: usize, required: usize },
}

impl fmt::Display for GameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GameError::InvalidRequest => write!(f, "invalid name or password"),
            GameError::NotEnoughCards => {
                write!(f, "not enough cards available to create a game")
            }
            GameError::NotFound(_) => write!(f, "game not found"),
            GameError::WrongPassword => write!(f, "wrong password"),
            GameError::Full => write!(f, "game is full"),
            GameError::InProgress => write!(f, "game already in progress"),
            GameError::AlreadyMember => write!(f, "already a member of this game"),
            GameError::NotAMember => write!(f, "not a member of this game"),
            GameError::NotEnoughMembers { present, required } => write!(
                f,
                "not enough members ({} of at least {})",
                present, required
            ),
        }
    }
}

impl std::error::Error for GameError {}

/// Checks a create request before any password hashing happens
pub fn validate_request(name: &str, password: Option<&str>) -> Result<(), GameError> {
    let name_len = name.chars().count();
    let password_ok = password.map_or(true, |p| p.chars().count() == TOKEN_LEN);

    if name_len == 0 || name_len > GAME_NAME_MAX_LEN || !password_ok {
        return Err(GameError::InvalidRequest);
    }
    Ok(())
}

/// Checks a join password against a game's stored hash
///
/// Runs argon2, so callers keep it off the async workers.
pub fn password_matches(password: Option<&str>, hashword: &str) -> bool {
    password.is_some_and(|p| credentials::verify(p, hashword))
}

/// Everything the members need to hear about a freshly started round
#[derive(Debug, Clone)]
pub struct RoundStart {
    pub game_id: GameId,
    pub black_card: CardId,
    pub czar: UserId,
    pub hands: Vec<(UserId, Vec<CardId>)>,
}

/// Result of a member leaving its game
#[derive(Debug, Clone)]
pub struct Departure {
    pub game_id: GameId,
    pub remaining: Vec<UserId>,
    /// New czar and the active black card when the czar left a running game
    pub czar_change: Option<(UserId, CardId)>,
    /// The game had no members left and was removed
    pub closed: bool,
}

#[derive(Debug)]
pub struct Game {
    pub id: GameId,
    pub name: String,
    pub creator: UserId,
    password_hash: Option<String>,
    members: Vec<UserId>,
    capacity: usize,
    state: GameState,
    round_card: Option<Card>,
    hands: HashMap<UserId, Vec<CardId>>,
    czar: Option<UserId>,
    white_pile: Vec<CardId>,
    black_pile: Vec<CardId>,
}

impl Game {
    fn new(
        id: GameId,
        name: &str,
        password_hash: Option<String>,
        creator: UserId,
        capacity: usize,
    ) -> Self {
        Self {
            id,
            name: name.to_string(),
            creator,
            password_hash,
            members: Vec::new(),
            capacity,
            state: GameState::Lobby,
            round_card: None,
            hands: HashMap::new(),
            czar: None,
            white_pile: Vec::new(),
            black_pile: Vec::new(),
        }
    }

    pub fn state(&self) -> GameState {
        self.state
    }

    pub fn members(&self) -> &[UserId] {
        &self.members
    }

    pub fn is_member(&self, user: UserId) -> bool {
        self.members.contains(&user)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn has_password(&self) -> bool {
        self.password_hash.is_some()
    }

    pub fn czar(&self) -> Option<UserId> {
        self.czar
    }

    pub fn hand(&self, user: UserId) -> Option<&[CardId]> {
        self.hands.get(&user).map(Vec::as_slice)
    }

    /// This game's copy of the active black card
    pub fn round_card(&self) -> Option<&Card> {
        self.round_card.as_ref()
    }

    pub fn round_card_mut(&mut self) -> Option<&mut Card> {
        self.round_card.as_mut()
    }

    pub fn summary(&self) -> GameSummary {
        GameSummary {
            id: self.id,
            name: self.name.clone(),
        }
    }

    fn join(&mut self, user: UserId, password_verified: bool) -> Result<(), GameError> {
        if self.state == GameState::InProgress {
            return Err(GameError::InProgress);
        }
        if self.is_member(user) {
            return Err(GameError::AlreadyMember);
        }
        if self.members.len() >= self.capacity {
            return Err(GameError::Full);
        }
        if self.has_password() && !password_verified {
            return Err(GameError::WrongPassword);
        }

        self.members.push(user);
        Ok(())
    }

    fn start<R: Rng + ?Sized>(
        &mut self,
        user: UserId,
        catalog: &CardCatalog,
        min_players: usize,
        rng: &mut R,
    ) -> Result<RoundStart, GameError> {
        if !self.is_member(user) {
            return Err(GameError::NotAMember);
        }
        if self.state == GameState::InProgress {
            return Err(GameError::InProgress);
        }
        if self.members.len() < min_players {
            return Err(GameError::NotEnoughMembers {
                present: self.members.len(),
                required: min_players,
            });
        }

        let hand_size = catalog.hand_size();
        let mut whites = catalog.ids(CardKind::White);
        let mut blacks = catalog.ids(CardKind::Black);
        if blacks.is_empty() || whites.len() < self.members.len() * hand_size {
            return Err(GameError::NotEnoughCards);
        }

        whites.shuffle(rng);
        blacks.shuffle(rng);

        let black_card = blacks.pop().ok_or(GameError::NotEnoughCards)?;
        let mut round_card = catalog
            .get(black_card)
            .cloned()
            .ok_or(GameError::NotEnoughCards)?;
        round_card.unlink_all();

        let mut hands = Vec::with_capacity(self.members.len());
        for member in &self.members {
            let hand = whites.split_off(whites.len() - hand_size);
            hands.push((*member, hand));
        }

        let czar = self.members[0];

        self.state = GameState::InProgress;
        self.round_card = Some(round_card);
        self.hands = hands.iter().cloned().collect();
        self.czar = Some(czar);
        self.white_pile = whites;
        self.black_pile = blacks;
        debug!(
            "Game {} dealt, {} white and {} black cards left",
            self.id,
            self.white_pile.len(),
            self.black_pile.len()
        );

        Ok(RoundStart {
            game_id: self.id,
            black_card,
            czar,
            hands,
        })
    }

    fn leave(&mut self, user: UserId) -> Option<Departure> {
        let position = self.members.iter().position(|member| *member == user)?;
        self.members.remove(position);
        self.hands.remove(&user);

        let mut czar_change = None;
        if self.czar == Some(user) {
            self.czar = self.members.first().copied();
            if let (Some(czar), Some(card)) = (self.czar, &self.round_card) {
                czar_change = Some((czar, card.id()));
            }
        }

        Some(Departure {
            game_id: self.id,
            remaining: self.members.clone(),
            czar_change,
            closed: self.members.is_empty(),
        })
    }
}

pub struct GameRegistry {
    games: BTreeMap<GameId, Game>,
    next_game_id: GameId,
    min_players: usize,
}

impl GameRegistry {
    pub fn new(min_players: usize) -> Self {
        Self {
            games: BTreeMap::new(),
            next_game_id: 1,
            min_players,
        }
    }

    /// Creates a lobby with no members
    ///
    /// `password_hash` is the argon2 hash of an already validated password
    /// token, see [`validate_request`].
    pub fn create(
        &mut self,
        name: &str,
        password_hash: Option<String>,
        creator: UserId,
        catalog: &CardCatalog,
    ) -> Result<GameId, GameError> {
        validate_request(name, None)?;

        let capacity = catalog.max_players_per_game();
        if capacity < self.min_players {
            return Err(GameError::NotEnoughCards);
        }

        let id = self.next_game_id;
        self.next_game_id += 1;
        self.games
            .insert(id, Game::new(id, name, password_hash, creator, capacity));
        info!("Created game {} ({}) for {} players", id, name, capacity);
        Ok(id)
    }

    /// Password hash of a game, or `None` for an open game
    pub fn password_hash(&self, id: GameId) -> Result<Option<String>, GameError> {
        let game = self.games.get(&id).ok_or(GameError::NotFound(id))?;
        Ok(game.password_hash.clone())
    }

    /// Adds `user` to the game, returning the members that were already there
    ///
    /// `password_verified` is the outcome of [`password_matches`] against
    /// [`GameRegistry::password_hash`]; it is ignored for open games.
    pub fn join(
        &mut self,
        id: GameId,
        user: UserId,
        password_verified: bool,
    ) -> Result<Vec<UserId>, GameError> {
        let game = self.games.get_mut(&id).ok_or(GameError::NotFound(id))?;
        let others = game.members.clone();
        game.join(user, password_verified)?;
        debug!("User {} joined game {}", user, id);
        Ok(others)
    }

    /// Starts the game on behalf of `user` and deals the first round
    pub fn start<R: Rng + ?Sized>(
        &mut self,
        id: GameId,
        user: UserId,
        catalog: &CardCatalog,
        rng: &mut R,
    ) -> Result<RoundStart, GameError> {
        let min_players = self.min_players;
        let game = self.games.get_mut(&id).ok_or(GameError::NotFound(id))?;
        game.start(user, catalog, min_players, rng)
    }

    /// Removes `user` from whichever game it belongs to
    pub fn leave(&mut self, user: UserId) -> Option<Departure> {
        let game = self.games.values_mut().find(|game| game.is_member(user))?;
        let departure = game.leave(user)?;

        if departure.closed {
            self.games.remove(&departure.game_id);
            info!("Closed game {} after its last member left", departure.game_id);
        }
        Some(departure)
    }

    pub fn get(&self, id: GameId) -> Option<&Game> {
        self.games.get(&id)
    }

    pub fn get_mut(&mut self, id: GameId) -> Option<&mut Game> {
        self.games.get_mut(&id)
    }

    pub fn summaries(&self) -> Vec<GameSummary> {
        self.games.values().map(Game::summary).collect()
    }

    pub fn len(&self) -> usize {
        self.games.len()
    }

    pub fn is_empty(&self) -> bool {
        self.games.is_empty()
    }
}
