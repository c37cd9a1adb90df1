//! # Card Game Server Library
//!
//! This library provides the authoritative session server for the party card
//! game. It authenticates clients, keeps them in sync with the card catalog,
//! and runs game lobbies and the dealing of each round.
//!
//! ## Core Responsibilities
//!
//! ### Protocol State Machine
//! Every connection is a [`session::Session`] that moves forward through a
//! fixed sequence of modes. A mode declares which client messages it accepts;
//! anything else ends the connection with a protocol error.
//!
//! ### Users and Games
//! Registered users live in the [`users::UserRegistry`] for the lifetime of
//! the process. Games live in the [`games::GameRegistry`] until their last
//! member leaves.
//!
//! ### Catalog Sync
//! The [`catalog::CardCatalog`] is loaded once at startup. Clients compare its
//! digest against their cached copy and pull the raw bytes only when needed.
//!
//! ## Architecture Design
//!
//! ### Task per Connection
//! Each connection runs a reader task and a writer task. Shared state sits in
//! [`state::ServerState`] behind `tokio::sync` locks, and every multi-step
//! check-then-act operation runs inside a single critical section.
//!
//! ### Non-blocking Pushes
//! Notifications to other sessions go through [`client_manager::ClientManager`]
//! with `try_send`, so a slow peer never stalls the session that triggered
//! the push.
//!
//! ## Module Organization
//!
//! - `catalog`: card file loading, digest and sync payload
//! - `client_manager`: live connections and outbound queues
//! - `config`: server tunables
//! - `credentials`: argon2 hashing of credential tokens
//! - `games`: lobbies, rounds and dealing
//! - `network`: TCP accept loop and per-connection tasks
//! - `orchestrator`: message dispatch
//! - `session`: per-connection mode machine
//! - `state`: shared registries
//! - `users`: registration and login
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::catalog::CardCatalog;
//! use server::config::ServerConfig;
//! use server::network::Server;
//! use server::state::ServerState;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//!     let config = ServerConfig::default();
//!     let catalog = CardCatalog::load("cards.json", config.hand_size)?;
//!     let state = Arc::new(ServerState::new(config, Arc::new(catalog)));
//!
//!     let server = Server::bind("127.0.0.1:8080", state).await?;
//!     server.run().await
//! }
//! ```

pub mod catalog;
pub mod client_manager;
pub mod config;
pub mod credentials;
pub mod games;
pub mod network;
pub mod orchestrator;
pub mod session;
pub mod state;
pub mod users;
