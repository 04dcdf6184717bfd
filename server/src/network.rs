//! TCP listener and connection worker pool

use crate::config::Config;
use crate::connection::{handle_connection, ConnectionContext};
use crate::dictionary::Dictionary;
use crate::error::ServerError;
use crate::lobby::Lobby;
use crate::storage::Storage;
use log::{debug, error, info, warn};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{watch, OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinSet;
use tokio::time::timeout;

/// Accepts players and runs one worker per connection.
///
/// At most `config.concurrency` connections are served at once; further
/// clients wait in the listen backlog until a worker finishes.
pub struct Server {
    listener: TcpListener,
    lobby: Arc<Lobby>,
    workers: Arc<Semaphore>,
}

impl Server {
    pub async fn bind(
        config: Config,
        dictionary: Arc<Dictionary>,
        storage: Arc<dyn Storage>,
    ) -> Result<Self, ServerError> {
        config.validate()?;
        let listener = TcpListener::bind(config.address()).await?;
        info!("Server listening on {}", listener.local_addr()?);

        let workers = Arc::new(Semaphore::new(config.concurrency));
        let lobby = Arc::new(Lobby::new(config, dictionary, storage)?);
        Ok(Self {
            listener,
            lobby,
            workers,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.listener.local_addr()?)
    }

    pub fn lobby(&self) -> Arc<Lobby> {
        Arc::clone(&self.lobby)
    }

    /// Serves connections until `shutdown` turns true, then waits for the
    /// workers up to the configured grace period.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> Result<(), ServerError> {
        let mut tasks = JoinSet::new();
        info!("Server started successfully");

        loop {
            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                Some(finished) = tasks.join_next(), if !tasks.is_empty() => {
                    if let Err(e) = finished {
                        error!("Connection worker panicked: {}", e);
                    }
                }
                admitted = self.admit() => match admitted {
                    Ok((stream, peer, permit)) => {
                        info!("New connection from {}", peer);
                        let ctx = ConnectionContext {
                            peer: peer.to_string(),
                            lobby: Arc::clone(&self.lobby),
                            shutdown: shutdown.clone(),
                        };
                        tasks.spawn(serve(stream, ctx, permit));
                    }
                    Err(e) => {
                        warn!("Failed to accept connection: {}", e);
                    }
                },
            }
        }

        info!("Server shutting down, {} connections open", tasks.len());
        self.workers.close();
        let grace = self.lobby.config().shutdown_grace();
        let drained = timeout(grace, async {
            while let Some(finished) = tasks.join_next().await {
                if let Err(e) = finished {
                    error!("Connection worker panicked: {}", e);
                }
            }
        })
        .await;

        if drained.is_err() {
            warn!("Workers still running after {:?}, aborting them", grace);
            tasks.abort_all();
        }
        Ok(())
    }

    /// Waits for a free worker slot, then for the next client.
    async fn admit(&self) -> std::io::Result<(TcpStream, SocketAddr, OwnedSemaphorePermit)> {
        let permit = Arc::clone(&self.workers)
            .acquire_owned()
            .await
            .map_err(|_| std::io::Error::new(std::io::ErrorKind::Other, "worker pool closed"))?;
        let (stream, peer) = self.listener.accept().await?;
        Ok((stream, peer, permit))
    }
}

async fn serve(stream: TcpStream, ctx: ConnectionContext, _permit: OwnedSemaphorePermit) {
    let peer = ctx.peer.clone();
    if let Err(e) = stream.set_nodelay(true) {
        debug!("Can't set TCP_NODELAY for {}: {}", peer, e);
    }
    let (reader, writer) = stream.into_split();
    if let Err(e) = handle_connection(reader, writer, ctx).await {
        debug!("{} left during login: {}", peer, e);
    }
}
