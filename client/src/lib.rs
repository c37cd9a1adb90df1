//! # Card Game Client Library
//!
//! This library provides a headless client for the party card game server.
//! It speaks the framed protocol, walks a connection through the server's
//! handshake and keeps a local view of the lobby up to date.
//!
//! ## Architecture Overview
//!
//! The server is authoritative for everything. The client sends requests,
//! waits for the matching reply and applies every push it reads along the way
//! to its [`game::Lobby`], so the view is current whenever a request returns.
//!
//! ## Module Organization
//!
//! ### Network Module (`network`)
//! The TCP connection and one helper per protocol step:
//! - Version announcement and login (registering unknown names)
//! - Catalog sync against the local cache
//! - Game creation, joining and starting
//!
//! ### Cache Module (`cache`)
//! The on-disk copy of the card catalog, keyed by its digest so a returning
//! client skips the transfer.
//!
//! ### Game Module (`game`)
//! The lobby view: online users, open games, own hand and the round's czar.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use client::cache::CatalogCache;
//! use client::network::Client;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut client = Client::connect("127.0.0.1:8080").await?;
//!     client.announce_version().await?;
//!     client
//!         .authenticate("alice_party", &client::password_token("hunter22"))
//!         .await?;
//!
//!     let mut cache = CatalogCache::open("catalog.cache");
//!     client.sync_catalog(&mut cache).await?;
//!
//!     let game = client.create_game("Party", None).await?;
//!     client.join_game(game, None).await?;
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod error;
pub mod game;
pub mod network;

use sha2::{Digest, Sha512};

pub use error::ClientError;

/// Credential token sent in place of a password: lower-case hex SHA-512
pub fn password_token(password: &str) -> String {
    let mut hasher = Sha512::new();
    hasher.update(password.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_password_token_has_protocol_length() {
        let token = password_token("hunter22");
        assert_eq!(token.len(), shared::TOKEN_LEN);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        assert_eq!(token, password_token("hunter22"));
        assert_ne!(token, password_token("hunter23"));
    }
}
