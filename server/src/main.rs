use clap::Parser;
use log::{error, info};
use server::config::Config;
use server::dictionary::Dictionary;
use server::network::Server;
use server::storage::{SqliteStorage, Storage};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;

/// Main-method of the application.
/// Loads the configuration, dictionary and database, then serves players until Ctrl+C.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Command line arguments
    #[derive(Parser, Debug)]
    #[clap(author, version, about)]
    struct Args {
        /// JSON configuration file
        #[clap(short, long)]
        config: Option<PathBuf>,
        /// Server IP address to bind to
        #[clap(short = 'H', long)]
        host: Option<String>,
        /// Server port to listen on
        #[clap(short, long)]
        port: Option<u16>,
        /// Dictionary file, one word per line
        #[clap(long)]
        dictionary: Option<PathBuf>,
        /// SQLite database file
        #[clap(long)]
        database: Option<PathBuf>,
        /// Number of game slots
        #[clap(short, long)]
        games: Option<usize>,
        /// Players per game
        #[clap(long)]
        players: Option<usize>,
        /// Side length of the board
        #[clap(short, long)]
        area_size: Option<usize>,
        /// Maximum number of connections served at once
        #[clap(long)]
        concurrency: Option<usize>,
        /// Log at debug level unless RUST_LOG says otherwise
        #[clap(short, long)]
        debug: bool,
    }

    let args = Args::parse();

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(if args.debug { "debug" } else { "info" }),
    )
    .init();

    let mut config = match &args.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };
    if let Some(host) = args.host {
        config.host = host;
    }
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(path) = args.dictionary {
        config.dictionary_path = path;
    }
    if let Some(path) = args.database {
        config.database_path = Some(path);
    }
    if let Some(games) = args.games {
        config.games = games;
    }
    if let Some(players) = args.players {
        config.players_per_game = players;
    }
    if let Some(size) = args.area_size {
        config.area_size = size;
    }
    if let Some(concurrency) = args.concurrency {
        config.concurrency = concurrency;
    }
    config.validate()?;

    let dictionary = Arc::new(Dictionary::load(&config.dictionary_path)?);
    let database_path = match &config.database_path {
        Some(path) => path.clone(),
        None => SqliteStorage::default_path()?,
    };
    info!("Using database {}", database_path.display());
    let storage: Arc<dyn Storage> = Arc::new(SqliteStorage::open(&database_path)?);

    let server = Server::bind(config, dictionary, storage).await?;
    let (shutdown_tx, shutdown) = watch::channel(false);
    let mut server_handle = tokio::spawn(server.run(shutdown));

    // Handle shutdown gracefully
    tokio::select! {
        result = &mut server_handle => {
            match result {
                Ok(Err(e)) => error!("Server stopped: {}", e),
                Err(e) => error!("Server task panicked: {}", e),
                Ok(Ok(())) => {}
            }
            return Ok(());
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down gracefully...");
        }
    }

    let _ = shutdown_tx.send(true);
    match server_handle.await {
        Ok(result) => result?,
        Err(e) => error!("Server task panicked: {}", e),
    }
    info!("Bye");
    Ok(())
}
