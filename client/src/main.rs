use clap::Parser;
use client::cache::CatalogCache;
use client::network::Client;
use client::password_token;
use log::{info, warn};
use shared::ServerMessage;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server address to connect to
    #[arg(short = 's', long, default_value = "127.0.0.1:8080")]
    server: String,

    /// User name, registered on first login
    #[arg(short = 'u', long)]
    username: String,

    /// Plain password, digested into a credential token before sending
    #[arg(short = 'p', long, conflicts_with = "token")]
    password: Option<String>,

    /// Ready-made 128 character credential token
    #[arg(short = 't', long)]
    token: Option<String>,

    /// Catalog cache file
    #[arg(short = 'c', long, default_value = "catalog.cache")]
    cache: String,

    /// Create a game with this name and join it
    #[arg(long, conflicts_with = "join")]
    create: Option<String>,

    /// Join the game with this id
    #[arg(long)]
    join: Option<u32>,

    /// Password of the game to create or join
    #[arg(long)]
    game_password: Option<String>,

    /// Start the game once joined
    #[arg(long)]
    start: bool,

    /// Seconds to wait for each server reply
    #[arg(long, default_value_t = 10)]
    timeout: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();
    let token = match (&args.token, &args.password) {
        (Some(token), _) => token.clone(),
        (None, Some(password)) => password_token(password),
        (None, None) => return Err("either --password or --token is required".into()),
    };
    let game_token = args.game_password.as_deref().map(password_token);

    info!("Connecting to: {}", args.server);
    let mut client = Client::connect(&args.server)
        .await?
        .with_reply_timeout(Duration::from_secs(args.timeout));
    client.announce_version().await?;
    client.authenticate(&args.username, &token).await?;

    let mut cache = CatalogCache::open(&args.cache);
    let outcome = client.sync_catalog(&mut cache).await?;
    info!("Catalog ready ({:?}, {} cards)", outcome, cache.len());

    for (id, name) in &client.lobby().users {
        println!("online: {} ({})", name, id);
    }
    for (id, name) in &client.lobby().games {
        println!("game {}: {}", id, name);
    }

    let game = match (&args.create, args.join) {
        (Some(name), _) => Some(client.create_game(name, game_token.as_deref()).await?),
        (None, Some(id)) => Some(id),
        (None, None) => None,
    };
    if let Some(id) = game {
        client.join_game(id, game_token.as_deref()).await?;
        println!("joined game {}", id);
    }
    if args.start {
        if let Err(e) = client.start_game().await {
            warn!("{}", e);
        }
    }

    loop {
        tokio::select! {
            message = client.recv() => match message {
                Ok(message) => show(&client, &cache, &message),
                Err(e) => {
                    warn!("{}", e);
                    break;
                }
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, disconnecting...");
                client.disconnect().await?;
                break;
            }
        }
    }

    Ok(())
}

fn show(client: &Client, cache: &CatalogCache, message: &ServerMessage) {
    let lobby = client.lobby();
    let name = |id| lobby.user_name(id).unwrap_or("you").to_string();

    match message {
        ServerMessage::LoggedIn { user_name, .. } => println!("{} is online", user_name),
        ServerMessage::LoggedOff { user_id } => println!("user {} went offline", user_id),
        ServerMessage::JoinedGame { user_id, .. } => println!("{} joined", name(*user_id)),
        ServerMessage::LeftGame { user_id, .. } => println!("user {} left", user_id),
        ServerMessage::StartedGame { user_id } => println!("{} started the game", name(*user_id)),
        ServerMessage::DrawCards { cards } => {
            for id in cards {
                let text = cache.render(*id).unwrap_or_else(|| format!("card {}", id));
                println!("hand: {}", text);
            }
        }
        ServerMessage::CzarChange { user_id, card } => {
            let text = cache.render(*card).unwrap_or_else(|| format!("card {}", card));
            println!("{} is czar for: {}", name(*user_id), text);
        }
        other => println!("{:?}", other),
    }
}
