//! Runtime configuration of the game server

use shared::{DEFAULT_HAND_SIZE, MIN_PLAYERS};

/// Settings shared by every connection worker
///
/// Built from the command line in `main`; tests construct it directly.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Maximum number of simultaneously connected sessions
    pub max_clients: usize,
    /// White cards dealt to every member when a game starts
    pub hand_size: usize,
    /// Members required before a game may start
    pub min_players: usize,
    /// Queued outbound messages per session before broadcasts are dropped
    pub outbound_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            max_clients: 64,
            hand_size: DEFAULT_HAND_SIZE,
            min_players: MIN_PLAYERS,
            outbound_capacity: 256,
        }
    }
}
