//! Game slots and logged-in names shared by all connections

use crate::config::Config;
use crate::dictionary::Dictionary;
use crate::error::{LoginError, ServerError};
use crate::game::Game;
use crate::session::Session;
use crate::storage::Storage;
use log::{info, warn};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Mutex;

pub type SharedSession = Arc<Mutex<Session>>;

pub struct Lobby {
    config: Config,
    dictionary: Arc<Dictionary>,
    storage: Arc<dyn Storage>,
    slots: Vec<SharedSession>,
    logins: std::sync::Mutex<HashSet<String>>,
}

impl Lobby {
    /// Provisions `config.games` fresh sessions.
    pub fn new(
        config: Config,
        dictionary: Arc<Dictionary>,
        storage: Arc<dyn Storage>,
    ) -> Result<Self, ServerError> {
        if !dictionary.has_words_of_length(config.area_size) {
            return Err(ServerError::NoSeedWords {
                length: config.area_size,
            });
        }
        let mut lobby = Self {
            config,
            dictionary,
            storage,
            slots: Vec::new(),
            logins: std::sync::Mutex::new(HashSet::new()),
        };
        for id in 0..lobby.config.games {
            let session = lobby.new_session(id)?;
            lobby.slots.push(Arc::new(Mutex::new(session)));
        }
        info!("Prepared {} game slots", lobby.slots.len());
        Ok(lobby)
    }

    fn new_session(&self, id: usize) -> Result<Session, ServerError> {
        let game = Game::new(
            self.config.game_settings(),
            Arc::clone(&self.dictionary),
            Arc::clone(&self.storage),
            &mut rand::thread_rng(),
        )?;
        Ok(Session::new(id, game))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn game_count(&self) -> usize {
        self.slots.len()
    }

    /// Claims `raw` as a login until the returned guard is dropped.
    pub fn reserve_name(&self, raw: &str) -> Result<NameReservation<'_>, LoginError> {
        let name = raw.trim();
        if name.is_empty() {
            return Err(LoginError::EmptyName);
        }
        let max = self.config.max_username_length;
        if name.chars().count() > max {
            return Err(LoginError::NameTooLong { max });
        }
        if name == self.config.system_login {
            return Err(LoginError::NameTaken(name.to_string()));
        }

        let mut logins = self.logins.lock().map_err(|_| LoginError::Closed)?;
        if !logins.insert(name.to_string()) {
            return Err(LoginError::NameTaken(name.to_string()));
        }
        Ok(NameReservation {
            lobby: self,
            name: name.to_string(),
        })
    }

    fn release_name(&self, name: &str) {
        match self.logins.lock() {
            Ok(mut logins) => {
                logins.remove(name);
            }
            Err(_) => warn!("Login registry poisoned, {} not released", name),
        }
    }

    /// Session in slot `input`, re-provisioning it if its last game is over
    /// and everyone has left.
    pub async fn session(&self, input: &str) -> Result<SharedSession, LoginError> {
        let index: usize = input.trim().parse().map_err(|_| {
            LoginError::InvalidGame("Game number must be a non-negative integer".to_string())
        })?;
        let slot = self.slots.get(index).ok_or_else(|| {
            LoginError::InvalidGame(format!(
                "There is no game {}, choose one of 0..{}",
                index,
                self.slots.len()
            ))
        })?;

        let mut session = slot.lock().await;
        if session.is_retired() {
            *session = self.new_session(index)?;
            info!("Game slot {} re-provisioned", index);
        }
        Ok(Arc::clone(slot))
    }
}

/// A login held by a connection. Dropping it frees the name.
pub struct NameReservation<'a> {
    lobby: &'a Lobby,
    name: String,
}

impl NameReservation<'_> {
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for NameReservation<'_> {
    fn drop(&mut self) {
        self.lobby.release_name(&self.name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::SqliteStorage;
    use tokio::sync::mpsc;

    fn lobby() -> Lobby {
        let config = Config {
            games: 2,
            area_size: 3,
            players_per_game: 2,
            max_username_length: 5,
            ..Config::default()
        };
        let dictionary = Arc::new(Dictionary::from_words(["cat", "dog"]));
        let storage = Arc::new(SqliteStorage::open_in_memory().unwrap());
        Lobby::new(config, dictionary, storage).unwrap()
    }

    #[test]
    fn test_lobby_requires_seed_words() {
        let config = Config {
            area_size: 4,
            ..Config::default()
        };
        let dictionary = Arc::new(Dictionary::from_words(["cat"]));
        let storage = Arc::new(SqliteStorage::open_in_memory().unwrap());
        assert!(matches!(
            Lobby::new(config, dictionary, storage),
            Err(ServerError::NoSeedWords { length: 4 })
        ));
    }

    #[test]
    fn test_name_rules() {
        let lobby = lobby();
        assert!(matches!(lobby.reserve_name("  "), Err(LoginError::EmptyName)));
        assert!(matches!(
            lobby.reserve_name("abcdef"),
            Err(LoginError::NameTooLong { max: 5 })
        ));
        assert!(matches!(lobby.reserve_name("balda"), Err(LoginError::NameTaken(_))));
        // five letters, ten bytes
        assert!(lobby.reserve_name("антон").is_ok());
    }

    #[test]
    fn test_name_released_on_drop() {
        let lobby = lobby();
        let first = lobby.reserve_name("alice").unwrap();
        assert_eq!(first.name(), "alice");
        assert!(matches!(lobby.reserve_name("alice"), Err(LoginError::NameTaken(_))));
        drop(first);
        assert!(lobby.reserve_name("alice").is_ok());
    }

    #[tokio::test]
    async fn test_session_selection() {
        let lobby = lobby();
        assert_eq!(lobby.game_count(), 2);
        assert!(lobby.session("1").await.is_ok());
        assert!(matches!(lobby.session("2").await, Err(LoginError::InvalidGame(_))));
        assert!(matches!(lobby.session("-1").await, Err(LoginError::InvalidGame(_))));
        assert!(matches!(lobby.session("one").await, Err(LoginError::InvalidGame(_))));
    }

    #[tokio::test]
    async fn test_retired_slot_gets_new_game() {
        let lobby = lobby();
        let (tx, _rx) = mpsc::unbounded_channel();
        let slot = lobby.session("0").await.unwrap();
        {
            let mut session = slot.lock().await;
            session.join("alice", tx.clone()).unwrap();
            session.join("bob", tx).unwrap();
            session.game_mut().finish(None);
            session.leave("alice");
            session.leave("bob");
            assert!(session.is_retired());
        }

        let again = lobby.session("0").await.unwrap();
        assert!(Arc::ptr_eq(&slot, &again));
        let session = again.lock().await;
        assert!(!session.is_retired());
        assert!(session.game().players().is_empty());
    }
}
