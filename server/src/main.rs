use clap::Parser;
use log::{error, info};
use server::catalog::CardCatalog;
use server::config::ServerConfig;
use server::network::Server;
use server::state::ServerState;
use std::sync::Arc;

/// Main-method of the server.
/// Parses command-line arguments, loads the card catalog and runs the accept loop
/// until it fails or Ctrl+C is received.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    // Command line arguments
    #[derive(Parser, Debug)]
    #[clap(author, version, about)]
    struct Args {
        /// Server IP address to bind to
        #[clap(short = 'H', long, default_value = "127.0.0.1")]
        host: String,
        /// Server port to listen on
        #[clap(short, long, default_value = "8080")]
        port: u16,
        /// JSON file holding the card catalog
        #[clap(short, long, default_value = "cards.json")]
        cards: String,
        /// Maximum number of connected clients
        #[clap(short, long, default_value = "64")]
        max_clients: usize,
        /// White cards dealt to every player
        #[clap(long, default_value = "10")]
        hand_size: usize,
    }

    let args = Args::parse();

    let config = ServerConfig {
        max_clients: args.max_clients,
        hand_size: args.hand_size,
        ..ServerConfig::default()
    };

    let catalog = match CardCatalog::load(&args.cards, config.hand_size) {
        Ok(catalog) => catalog,
        Err(e) => {
            error!("Failed to load {}: {}", args.cards, e);
            return Err(e.into());
        }
    };
    info!(
        "Games may hold up to {} players with a hand of {}",
        catalog.max_players_per_game(),
        catalog.hand_size()
    );

    let state = Arc::new(ServerState::new(config, Arc::new(catalog)));
    let address = format!("{}:{}", args.host, args.port);
    let server = Server::bind(&address, state).await?;

    // Handle shutdown gracefully
    tokio::select! {
        result = server.run() => {
            if let Err(e) = result {
                error!("Server stopped: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down gracefully...");
        }
    }

    Ok(())
}
