//! Server configuration
//!
//! Every field has a default, so a JSON file only needs the keys it changes.
//! Command-line flags are applied on top by the binary.

use crate::error::ServerError;
use crate::game::GameSettings;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub host: String,
    pub port: u16,
    /// Maximum number of simultaneously served connections.
    pub concurrency: usize,
    /// Number of game slots players can choose from.
    pub games: usize,
    pub area_size: usize,
    pub players_per_game: usize,
    pub max_username_length: usize,
    pub turn_timeout_secs: u64,
    pub login_timeout_secs: u64,
    /// Pause between a goodbye message and closing the connection.
    pub farewell_delay_ms: u64,
    /// How long shutdown waits for workers before aborting them.
    pub shutdown_grace_ms: u64,
    pub dictionary_path: PathBuf,
    /// SQLite file; the platform data directory is used when unset.
    pub database_path: Option<PathBuf>,
    /// Sender label of server announcements.
    pub system_login: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: shared::DEFAULT_PORT,
            concurrency: 64,
            games: 10,
            area_size: 5,
            players_per_game: 2,
            max_username_length: 20,
            turn_timeout_secs: 30,
            login_timeout_secs: 300,
            farewell_delay_ms: 500,
            shutdown_grace_ms: 2000,
            dictionary_path: PathBuf::from("dict/words.txt"),
            database_path: None,
            system_login: "balda".to_string(),
        }
    }
}

impl Config {
    pub fn from_file(path: &Path) -> Result<Self, ServerError> {
        let text = std::fs::read_to_string(path).map_err(|e| ServerError::Config {
            reason: format!("can't read {}: {}", path.display(), e),
        })?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self, ServerError> {
        serde_json::from_str(text).map_err(|e| ServerError::Config {
            reason: e.to_string(),
        })
    }

    /// Rejects settings the server can't run with.
    pub fn validate(&self) -> Result<(), ServerError> {
        let fail = |reason: &str| {
            Err(ServerError::Config {
                reason: reason.to_string(),
            })
        };

        if self.area_size < 2 {
            return fail("area_size must be at least 2");
        }
        if self.players_per_game == 0 {
            return fail("players_per_game must be at least 1");
        }
        if self.games == 0 {
            return fail("games must be at least 1");
        }
        if self.concurrency == 0 {
            return fail("concurrency must be at least 1");
        }
        if self.max_username_length == 0 {
            return fail("max_username_length must be at least 1");
        }
        if self.turn_timeout_secs == 0 || self.login_timeout_secs == 0 {
            return fail("timeouts must be positive");
        }
        Ok(())
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn game_settings(&self) -> GameSettings {
        GameSettings {
            area_size: self.area_size,
            max_players: self.players_per_game,
        }
    }

    pub fn turn_timeout(&self) -> Duration {
        Duration::from_secs(self.turn_timeout_secs)
    }

    pub fn login_timeout(&self) -> Duration {
        Duration::from_secs(self.login_timeout_secs)
    }

    pub fn farewell_delay(&self) -> Duration {
        Duration::from_millis(self.farewell_delay_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}
