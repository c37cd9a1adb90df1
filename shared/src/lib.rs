//! Types shared by the card game server and its clients: the card model, the
//! canonical catalog encoding and the framed wire protocol.

pub mod card;
pub mod catalog;
pub mod protocol;

pub use card::{Card, CardError, CardId, CardKind};
pub use protocol::{
    ClientMessage, FrameError, GameId, GameSummary, MessageKind, ServerMessage, UserId,
    UserSummary,
};

pub const VERSION_MAJOR: u32 = 0;
pub const VERSION_MINOR: u32 = 1;
pub const VERSION_REVISION: u32 = 0;

pub const USERNAME_MIN_LEN: usize = 6;
pub const USERNAME_MAX_LEN: usize = 30;
/// Exact length of user and game credential tokens (hex SHA-512)
pub const TOKEN_LEN: usize = 128;
pub const GAME_NAME_MAX_LEN: usize = 30;

pub const MIN_PLAYERS: usize = 3;
pub const DEFAULT_HAND_SIZE: usize = 10;

/// Rendered in place of an empty placeholder
pub const PLACEHOLDER_FILLER: &str = "___";

/// Checks the length rules for a username and its credential token
pub fn valid_credentials(username: &str, token: &str) -> bool {
    let name_len = username.chars().count();
    (USERNAME_MIN_LEN..=USERNAME_MAX_LEN).contains(&name_len) && token.chars().count() == TOKEN_LEN
}
