//! Server-wide shared state
//!
//! Holds the card catalog and the guarded registries every connection worker
//! operates on. When more than one lock is needed they are taken in the order
//! users → games → clients, and never held across a reply to the caller.

use crate::catalog::CardCatalog;
use crate::client_manager::ClientManager;
use crate::config::ServerConfig;
use crate::games::GameRegistry;
use crate::users::UserRegistry;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

pub struct ServerState {
    pub config: ServerConfig,
    /// Read-only after startup, no lock needed
    pub catalog: Arc<CardCatalog>,
    pub users: RwLock<UserRegistry>,
    pub games: Mutex<GameRegistry>,
    pub clients: RwLock<ClientManager>,
}

impl ServerState {
    pub fn new(config: ServerConfig, catalog: Arc<CardCatalog>) -> Self {
        Self {
            users: RwLock::new(UserRegistry::new()),
            games: Mutex::new(GameRegistry::new(config.min_players)),
            clients: RwLock::new(ClientManager::new(config.max_clients)),
            catalog,
            config,
        }
    }
}
