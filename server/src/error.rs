//! Error types for the game server

use crate::storage::StorageError;
use std::path::PathBuf;
use thiserror::Error;

/// Failures that stop the server from starting.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("can't read dictionary {path}: {source}")]
    Dictionary {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("dictionary has no words of length {length} to seed a board")]
    NoSeedWords { length: usize },

    #[error(transparent)]
    Board(#[from] BoardError),

    #[error("invalid configuration: {reason}")]
    Config { reason: String },

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Board construction errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BoardError {
    #[error("seed word has {found} letters, board needs {expected}")]
    SeedLength { expected: usize, found: usize },
}

/// Join-time rejections raised by a game roster.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GameError {
    #[error("Sorry, this game is full")]
    SessionFull,

    #[error("Sorry, this game is already started")]
    AlreadyStarted,

    #[error("Player {0} is already in this game")]
    DuplicatePlayer(String),
}

/// Reasons a connection fails to log in.
#[derive(Debug, Error)]
pub enum LoginError {
    #[error("Empty name")]
    EmptyName,

    #[error("Too long name, at most {max} letters allowed")]
    NameTooLong { max: usize },

    #[error("Name {0} is already taken")]
    NameTaken(String),

    #[error("{0}")]
    InvalidGame(String),

    #[error(transparent)]
    Join(#[from] GameError),

    #[error("Can't start a new game: {0}")]
    Provision(#[from] ServerError),

    #[error("connection closed during login")]
    Closed,

    #[error("login timed out")]
    TimedOut,

    #[error("server is shutting down")]
    Shutdown,

    #[error("communication error: {0}")]
    Io(#[from] std::io::Error),
}

/// The two inactivity limits of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutKind {
    Login,
    Turn,
}

impl TimeoutKind {
    /// Text sent to the player who ran out of time.
    pub fn message(self) -> &'static str {
        match self {
            TimeoutKind::Login => "You're too slow! Sorry... Bye",
            TimeoutKind::Turn => "You're too slow!",
        }
    }
}
