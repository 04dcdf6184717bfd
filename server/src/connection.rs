//! Per-connection worker
//!
//! A worker owns one client from the first prompt to the final goodbye:
//! login under the login timeout, then a loop that feeds every line to the
//! session's game and fans the reply out to all members. All writes to the
//! client go through an outbox drained by a dedicated writer task, so a slow
//! or dead peer never blocks the player who is broadcasting.

use crate::error::{LoginError, TimeoutKind};
use crate::game::GameState;
use crate::lobby::{Lobby, NameReservation, SharedSession};
use crate::session::{Audience, DeliveryErrors, Outbox};
use log::{debug, info, warn};
use shared::{frame_line, strip_line_ending};
use std::io;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, Lines};
use tokio::sync::{mpsc, watch};
use tokio::time::timeout;

/// Everything a worker needs besides its byte stream.
pub struct ConnectionContext {
    pub peer: String,
    pub lobby: Arc<Lobby>,
    pub shutdown: watch::Receiver<bool>,
}

/// Why the command loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Exit {
    Disconnected,
    GameOver,
    WriteFailed,
    Shutdown,
}

/// Serves one client until it disconnects, its game ends or the server
/// shuts down. Login failures are returned after the client was told why.
pub async fn handle_connection<R, W>(
    reader: R,
    writer: W,
    mut ctx: ConnectionContext,
) -> Result<(), LoginError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let lobby = Arc::clone(&ctx.lobby);
    let config = lobby.config();
    let (outbox, outbox_rx) = mpsc::unbounded_channel();
    let mut writer_task = tokio::spawn(write_lines(writer, outbox_rx));
    let (errors, mut errors_rx) = mpsc::unbounded_channel();
    let mut lines = BufReader::new(reader).lines();

    let login = tokio::select! {
        result = timeout(config.login_timeout(), log_in(&lobby, &mut lines, &outbox, &errors)) => {
            result.unwrap_or(Err(LoginError::TimedOut))
        }
        _ = wait_for_shutdown(&mut ctx.shutdown) => Err(LoginError::Shutdown),
    };

    let result = match login {
        Ok((reservation, session, closed)) => {
            let name = reservation.name().to_string();
            info!("{} logged in as {}", ctx.peer, name);
            let exit = play(
                &name,
                &session,
                closed,
                &mut lines,
                &outbox,
                &errors,
                &mut errors_rx,
                &mut ctx,
            )
            .await;
            debug!("{} stopped playing: {:?}", name, exit);

            if exit == Exit::Shutdown {
                send(&outbox, &format!("{}> Server is shutting down. Bye!", config.system_login));
            }
            let mut guard = session.lock().await;
            if guard.leave(&name) {
                guard.broadcast(
                    &config.system_login,
                    &format!("{} left the game. Game over.", name),
                    Audience::All,
                    &errors,
                );
            }
            drop(guard);
            drop(reservation);
            Ok(())
        }
        Err(err) => {
            warn!("Login from {} failed: {}", ctx.peer, err);
            match &err {
                LoginError::TimedOut => send(&outbox, TimeoutKind::Login.message()),
                LoginError::Shutdown => send(&outbox, "Server is shutting down. Bye!"),
                LoginError::Closed | LoginError::Io(_) => {}
                other => send(&outbox, &format!("{}. Bye", other)),
            }
            Err(err)
        }
    };

    // The writer ends once every outbox handle is gone; give it a moment
    // to flush the last lines, then hang up regardless.
    drop(outbox);
    if timeout(config.farewell_delay(), &mut writer_task).await.is_err() {
        writer_task.abort();
    }
    info!("Connection from {} closed", ctx.peer);
    result
}

/// What a successful login hands to the command loop. The closed watch is
/// subscribed under the same lock as the join, so no close can slip between.
type Login<'a> = (NameReservation<'a>, SharedSession, watch::Receiver<bool>);

async fn log_in<'a, R>(
    lobby: &'a Lobby,
    lines: &mut Lines<BufReader<R>>,
    outbox: &Outbox,
    errors: &DeliveryErrors,
) -> Result<Login<'a>, LoginError>
where
    R: AsyncRead + Unpin,
{
    send(outbox, "Welcome to balda game!\nPlease, enter your name to log in:");
    let raw_name = read_line(lines).await?;
    let reservation = lobby.reserve_name(&raw_name)?;
    let name = reservation.name().to_string();

    send(
        outbox,
        &format!(
            "Please, enter the number of game you want to join (0..{}):",
            lobby.game_count()
        ),
    );
    let choice = read_line(lines).await?;
    let session = lobby.session(&choice).await?;

    let closed = {
        let mut guard = session.lock().await;
        let started = guard.join(&name, outbox.clone())?;
        info!(
            "{} joined game {} ({}/{})",
            name,
            guard.id(),
            guard.member_count(),
            lobby.config().players_per_game
        );
        guard.broadcast(
            &name,
            &format!("Welcome {}!\nPlease, wait other players...", name),
            Audience::All,
            errors,
        );
        if started {
            let game = guard.game();
            let announcement = format!(
                "Game started!\n{}\nStep: {}",
                game.board().render(),
                game.current_player().unwrap_or_default()
            );
            guard.broadcast(
                &lobby.config().system_login,
                &announcement,
                Audience::All,
                errors,
            );
        }
        guard.subscribe_closed()
    };

    Ok((reservation, session, closed))
}

#[allow(clippy::too_many_arguments)]
async fn play<R>(
    name: &str,
    session: &SharedSession,
    mut closed: watch::Receiver<bool>,
    lines: &mut Lines<BufReader<R>>,
    outbox: &Outbox,
    errors: &DeliveryErrors,
    errors_rx: &mut mpsc::UnboundedReceiver<String>,
    ctx: &mut ConnectionContext,
) -> Exit
where
    R: AsyncRead + Unpin,
{
    let config = ctx.lobby.config().clone();

    loop {
        if *ctx.shutdown.borrow() {
            return Exit::Shutdown;
        }
        if *closed.borrow_and_update() {
            return Exit::GameOver;
        }

        tokio::select! {
            _ = ctx.shutdown.changed() => return Exit::Shutdown,
            _ = closed.changed() => return Exit::GameOver,
            Some(failed) = errors_rx.recv() => {
                if failed == name {
                    warn!("Lost connection to {}", name);
                    return Exit::WriteFailed;
                }
                debug!("{} could not deliver to {}", name, failed);
            }
            read = timeout(config.turn_timeout(), lines.next_line()) => match read {
                Err(_) => {
                    let guard = session.lock().await;
                    let game = guard.game();
                    let active = game.current_player() == Some(name);
                    if *game.state() == GameState::InProgress && active {
                        debug!("{} did not move within {:?}", name, config.turn_timeout());
                        guard.broadcast(
                            name,
                            &format!("{} did not make a move in time.", name),
                            Audience::Except(name),
                            errors,
                        );
                        guard.broadcast(
                            &config.system_login,
                            TimeoutKind::Turn.message(),
                            Audience::Only(name),
                            errors,
                        );
                    }
                }
                Ok(Ok(Some(line))) => {
                    let line = strip_line_ending(&line);
                    if line.trim().is_empty() {
                        continue;
                    }
                    debug!("{} sent '{}'", name, line);

                    let mut guard = session.lock().await;
                    let reply = guard.game_mut().process_command(name, line);
                    guard.broadcast(name, &reply.message, Audience::All, errors);
                    if !reply.keep_playing {
                        info!("Game {} is over", guard.id());
                        guard.close();
                        return Exit::GameOver;
                    }
                }
                Ok(Ok(None)) => {
                    info!("{} disconnected", name);
                    return Exit::Disconnected;
                }
                Ok(Err(err)) => {
                    warn!("Can't read from {}: {}", name, err);
                    let _ = outbox.send(frame_line("Can't read your input. Bye"));
                    return Exit::Disconnected;
                }
            },
        }
    }
}

async fn read_line<R>(lines: &mut Lines<BufReader<R>>) -> Result<String, LoginError>
where
    R: AsyncRead + Unpin,
{
    match lines.next_line().await? {
        Some(line) => Ok(strip_line_ending(&line).to_string()),
        None => Err(LoginError::Closed),
    }
}

async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    while !*shutdown.borrow() {
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}

fn send(outbox: &Outbox, text: &str) {
    let _ = outbox.send(frame_line(text));
}

/// Drains the outbox into the connection until every sender is gone.
async fn write_lines<W>(
    mut writer: W,
    mut outbox: mpsc::UnboundedReceiver<String>,
) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(line) = outbox.recv().await {
        writer.write_all(line.as_bytes()).await?;
        writer.flush().await?;
    }
    writer.shutdown().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::dictionary::Dictionary;
    use crate::storage::SqliteStorage;
    use std::time::Duration;
    use tokio::io::{DuplexStream, ReadHalf, WriteHalf};
    use tokio::task::JoinHandle;

    fn lobby(players: usize) -> Arc<Lobby> {
        let config = Config {
            games: 1,
            area_size: 3,
            players_per_game: players,
            turn_timeout_secs: 1,
            login_timeout_secs: 1,
            farewell_delay_ms: 100,
            ..Config::default()
        };
        let dictionary = Arc::new(Dictionary::from_words(["cat"]));
        let storage = Arc::new(SqliteStorage::open_in_memory().unwrap());
        Arc::new(Lobby::new(config, dictionary, storage).unwrap())
    }

    struct TestClient {
        lines: Lines<BufReader<ReadHalf<DuplexStream>>>,
        writer: WriteHalf<DuplexStream>,
        worker: JoinHandle<Result<(), LoginError>>,
    }

    impl TestClient {
        fn connect(lobby: &Arc<Lobby>, shutdown: watch::Receiver<bool>) -> Self {
            let (client, server) = tokio::io::duplex(8192);
            let (server_reader, server_writer) = tokio::io::split(server);
            let ctx = ConnectionContext {
                peer: "test".to_string(),
                lobby: Arc::clone(lobby),
                shutdown,
            };
            let worker = tokio::spawn(handle_connection(server_reader, server_writer, ctx));
            let (reader, writer) = tokio::io::split(client);
            Self {
                lines: BufReader::new(reader).lines(),
                writer,
                worker,
            }
        }

        async fn say(&mut self, line: &str) {
            self.writer
                .write_all(format!("{}\r\n", line).as_bytes())
                .await
                .unwrap();
        }

        /// Reads lines until one contains `needle`.
        async fn expect(&mut self, needle: &str) -> String {
            loop {
                let line = tokio::time::timeout(Duration::from_secs(5), self.lines.next_line())
                    .await
                    .expect("timed out waiting for server")
                    .unwrap()
                    .unwrap_or_else(|| panic!("connection closed before '{}'", needle));
                if line.contains(needle) {
                    return line;
                }
            }
        }

        async fn expect_closed(&mut self) {
            loop {
                let next = tokio::time::timeout(Duration::from_secs(5), self.lines.next_line())
                    .await
                    .expect("connection stayed open");
                if !matches!(next, Ok(Some(_))) {
                    return;
                }
            }
        }
    }

    #[tokio::test]
    async fn test_login_and_game_start() {
        let lobby = lobby(2);
        let (_shutdown_tx, shutdown) = watch::channel(false);

        let mut alice = TestClient::connect(&lobby, shutdown.clone());
        alice.expect("Welcome to balda game!").await;
        alice.say("alice").await;
        alice.expect("number of game").await;
        alice.say("0").await;
        alice.expect("alice> Welcome alice!").await;

        let mut bob = TestClient::connect(&lobby, shutdown);
        bob.expect("enter your name").await;
        bob.say("bob").await;
        bob.say("0").await;
        bob.expect("bob> Welcome bob!").await;
        bob.expect("balda> Game started!").await;
        alice.expect("bob> Welcome bob!").await;
        alice.expect("balda> Game started!").await;

        bob.say("put").await;
        alice.expect("bob> Not your step is now.").await;
        alice.say("step").await;
        bob.expect("alice> alice").await;
    }

    #[tokio::test]
    async fn test_invalid_game_number_disconnects() {
        let lobby = lobby(2);
        let (_shutdown_tx, shutdown) = watch::channel(false);
        let mut client = TestClient::connect(&lobby, shutdown);
        client.say("alice").await;
        client.say("7").await;
        client.expect("There is no game 7").await;
        client.expect_closed().await;
        assert!(matches!(
            client.worker.await.unwrap(),
            Err(LoginError::InvalidGame(_))
        ));
        // the name is free again
        assert!(lobby.reserve_name("alice").is_ok());
    }

    #[tokio::test]
    async fn test_login_timeout() {
        let lobby = lobby(2);
        let (_shutdown_tx, shutdown) = watch::channel(false);
        let (client, server_writer) = tokio::io::duplex(8192);
        let reader = tokio_test::io::Builder::new()
            .read(b"alice\r\n")
            .wait(Duration::from_secs(3))
            .build();
        let ctx = ConnectionContext {
            peer: "slow".to_string(),
            lobby: Arc::clone(&lobby),
            shutdown,
        };

        let result = handle_connection(reader, server_writer, ctx).await;
        assert!(matches!(result, Err(LoginError::TimedOut)));

        let mut lines = BufReader::new(client).lines();
        let mut seen = Vec::new();
        while let Ok(Some(line)) = lines.next_line().await {
            seen.push(line);
        }
        assert_eq!(seen.last().map(String::as_str), Some("You're too slow! Sorry... Bye"));
        assert!(lobby.reserve_name("alice").is_ok());
    }

    #[tokio::test]
    async fn test_turn_timeout_warns_only_active_player() {
        let lobby = lobby(2);
        let (_shutdown_tx, shutdown) = watch::channel(false);
        let mut alice = TestClient::connect(&lobby, shutdown.clone());
        alice.say("alice").await;
        alice.say("0").await;
        let mut bob = TestClient::connect(&lobby, shutdown);
        bob.say("bob").await;
        bob.say("0").await;
        alice.expect("Game started!").await;
        bob.expect("Game started!").await;

        bob.expect("alice> alice did not make a move in time.").await;
        alice.expect("balda> You're too slow!").await;

        // no automatic skip: it is still alice's turn
        bob.say("step").await;
        alice.expect("bob> alice").await;
    }

    #[tokio::test]
    async fn test_shutdown_reaches_players() {
        let lobby = lobby(2);
        let (shutdown_tx, shutdown) = watch::channel(false);
        let mut alice = TestClient::connect(&lobby, shutdown);
        alice.say("alice").await;
        alice.say("0").await;
        alice.expect("Welcome alice!").await;

        shutdown_tx.send(true).unwrap();
        alice.expect("Server is shutting down").await;
        alice.expect_closed().await;
        assert!(alice.worker.await.unwrap().is_ok());

        let slot = lobby.session("0").await.unwrap();
        assert!(slot.lock().await.game().players().is_empty());
    }

    #[tokio::test]
    async fn test_play_stops_when_session_already_closed() {
        let lobby = lobby(2);
        let (_shutdown_tx, shutdown) = watch::channel(false);
        let session = lobby.session("0").await.unwrap();
        let (outbox, _outbox_rx) = mpsc::unbounded_channel();
        let (errors, mut errors_rx) = mpsc::unbounded_channel();

        // the game ends before this worker's loop gets to subscribe
        let closed = {
            let mut guard = session.lock().await;
            guard.join("alice", outbox.clone()).unwrap();
            guard.close();
            guard.subscribe_closed()
        };

        let (_client, server) = tokio::io::duplex(64);
        let mut lines = BufReader::new(server).lines();
        let mut ctx = ConnectionContext {
            peer: "test".to_string(),
            lobby: Arc::clone(&lobby),
            shutdown,
        };
        let exit = tokio::time::timeout(
            Duration::from_secs(2),
            play(
                "alice",
                &session,
                closed,
                &mut lines,
                &outbox,
                &errors,
                &mut errors_rx,
                &mut ctx,
            ),
        )
        .await
        .expect("worker kept waiting on a closed session");
        assert_eq!(exit, Exit::GameOver);
    }

    #[tokio::test]
    async fn test_disconnect_ends_running_game() {
        let lobby = lobby(2);
        let (_shutdown_tx, shutdown) = watch::channel(false);
        let mut alice = TestClient::connect(&lobby, shutdown.clone());
        alice.say("alice").await;
        alice.say("0").await;
        let mut bob = TestClient::connect(&lobby, shutdown);
        bob.say("bob").await;
        bob.say("0").await;
        alice.expect("Game started!").await;

        drop(bob.writer);
        alice.expect("bob left the game. Game over.").await;
        alice.expect_closed().await;
        assert!(alice.worker.await.unwrap().is_ok());
    }
}
