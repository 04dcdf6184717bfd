//! # Balda Game Server Library
//!
//! This library implements the server side of balda, a turn-based word game
//! played over plain text lines. Players take turns adding one letter to a
//! shared square grid and must name a dictionary word that can be traced
//! through neighbouring cells and passes through the new letter.
//!
//! ## Core Responsibilities
//!
//! ### Move Validation
//! The board checks every proposed move with a backtracking path search
//! over the grid. A word is accepted only if it is in the dictionary, was
//! not claimed before in the same game, and some trace of it crosses the
//! freshly placed letter.
//!
//! ### Turn Sequencing
//! Each game is a small state machine: players join until the roster is
//! full, then move in roster order. A move is entered in steps (`put`, row,
//! column, letter, word); informational commands can be used at any time
//! and never consume a turn. The game ends when the board is full or when
//! every player has skipped.
//!
//! ### Session Management
//! Connected players are bound to one of a fixed number of game slots.
//! Every line a player sends is applied to that slot's game under a single
//! lock, and the reply is fanned out to all players of the game.
//!
//! ## Architecture Design
//!
//! ### One Worker Per Connection
//! The listener admits at most `concurrency` connections at a time. Each
//! connection gets its own task that logs the player in, reads lines under
//! a turn timeout and reacts to the global shutdown signal.
//!
//! ### Non-Blocking Fan-Out
//! Writes go through a per-connection outbox drained by a writer task.
//! Broadcasting a reply only queues lines, so a stalled client can't hold
//! up the game; a recipient whose connection is gone is reported back to
//! the broadcasting worker.
//!
//! ### Best-Effort Statistics
//! Games, moves and results are stored in SQLite. Storage failures are
//! logged and never change the outcome of a move.
//!
//! ## Module Organization
//!
//! - `dictionary`: allowed words and random seed words
//! - `board`: letter grid, used words and path search
//! - `game`: turn state machine, scoring and statistics replies
//! - `storage`: the storage trait and its SQLite implementation
//! - `session`: members of one game and broadcasting
//! - `lobby`: game slots and reserved login names
//! - `connection`: the per-connection worker
//! - `network`: TCP listener, worker pool and shutdown
//! - `config`: JSON configuration with defaults
//! - `error`: error types
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::config::Config;
//! use server::dictionary::Dictionary;
//! use server::network::Server;
//! use server::storage::SqliteStorage;
//! use std::sync::Arc;
//! use tokio::sync::watch;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::default();
//!     let dictionary = Arc::new(Dictionary::load(&config.dictionary_path)?);
//!     let storage = Arc::new(SqliteStorage::open_in_memory()?);
//!
//!     let server = Server::bind(config, dictionary, storage).await?;
//!     let (_shutdown_tx, shutdown) = watch::channel(false);
//!     server.run(shutdown).await?;
//!     Ok(())
//! }
//! ```

pub mod board;
pub mod config;
pub mod connection;
pub mod dictionary;
pub mod error;
pub mod game;
pub mod lobby;
pub mod network;
pub mod session;
pub mod storage;
