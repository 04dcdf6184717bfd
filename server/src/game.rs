//! Turn state machine of one balda game
//!
//! A [`Game`] owns its [`Board`], the roster and the scores. Every line a
//! player sends ends up in [`Game::process_command`], which answers with a
//! [`Reply`] for the whole session and tells the caller whether play goes on.

use crate::board::Board;
use crate::dictionary::Dictionary;
use crate::error::{GameError, ServerError};
use crate::storage::{GameRecordId, Storage, StorageError};
use log::{debug, error, info, warn};
use rand::Rng;
use shared::{help_text, parse_request, Command, Page, Request, StatQuery};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::runtime::{Handle, RuntimeFlavor};
use tokio::task::block_in_place;

/// Reply sent instead of statistics when the database fails.
pub const DATABASE_ERROR: &str = "DATABASE_ERROR";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GameSettings {
    pub area_size: usize,
    pub max_players: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GameState {
    NotStarted,
    InProgress,
    Finished { winner: Option<String> },
}

/// Progress of a `put`; each variant names the value expected next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PutStep {
    Row,
    Col { row: usize },
    Letter { row: usize, col: usize },
    Word { row: usize, col: usize, letter: char },
}

/// Answer to one line of input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub keep_playing: bool,
    pub message: String,
}

impl Reply {
    fn keep(message: impl Into<String>) -> Self {
        Self {
            keep_playing: true,
            message: message.into(),
        }
    }

    fn end(message: impl Into<String>) -> Self {
        Self {
            keep_playing: false,
            message: message.into(),
        }
    }
}

pub struct Game {
    board: Board,
    dictionary: Arc<Dictionary>,
    storage: Arc<dyn Storage>,
    max_players: usize,
    players: Vec<String>,
    scores: HashMap<String, u32>,
    turn: usize,
    skips: usize,
    state: GameState,
    pending: Option<PutStep>,
    record_id: Option<GameRecordId>,
    result_reported: bool,
}

impl Game {
    /// Creates a game seeded with a random dictionary word of
    /// `settings.area_size` letters.
    pub fn new<R: Rng + ?Sized>(
        settings: GameSettings,
        dictionary: Arc<Dictionary>,
        storage: Arc<dyn Storage>,
        rng: &mut R,
    ) -> Result<Self, ServerError> {
        let seed = dictionary
            .random_word_of_length(settings.area_size, rng)
            .ok_or(ServerError::NoSeedWords {
                length: settings.area_size,
            })?;
        let board = Board::new(settings.area_size, seed)?;
        debug!("New board seeded with '{}'", seed);
        Ok(Self::with_board(
            board,
            settings.max_players,
            dictionary,
            storage,
        ))
    }

    /// Creates a game around an existing board.
    pub fn with_board(
        board: Board,
        max_players: usize,
        dictionary: Arc<Dictionary>,
        storage: Arc<dyn Storage>,
    ) -> Self {
        let record_id = log_storage_error(
            "record game start",
            blocking(|| storage.record_game_started()),
        );
        Self {
            board,
            dictionary,
            storage,
            max_players,
            players: Vec::new(),
            scores: HashMap::new(),
            turn: 0,
            skips: 0,
            state: GameState::NotStarted,
            pending: None,
            record_id,
            result_reported: false,
        }
    }

    pub fn add_player(&mut self, name: &str) -> Result<(), GameError> {
        if self.state != GameState::NotStarted {
            return Err(GameError::AlreadyStarted);
        }
        if self.players.len() >= self.max_players {
            return Err(GameError::SessionFull);
        }
        if self.players.iter().any(|player| player == name) {
            return Err(GameError::DuplicatePlayer(name.to_string()));
        }

        self.players.push(name.to_string());
        self.scores.insert(name.to_string(), 0);
        if let Some(id) = self.record_id {
            log_storage_error(
                "record join",
                blocking(|| self.storage.record_player_joined(id, name)),
            );
        }
        info!(
            "Player {} joined ({}/{})",
            name,
            self.players.len(),
            self.max_players
        );
        Ok(())
    }

    /// Drops a player who leaves before the game starts. Once the game is
    /// running the roster is fixed and this returns false.
    pub fn remove_player(&mut self, name: &str) -> bool {
        if self.state != GameState::NotStarted {
            return false;
        }
        let Some(position) = self.players.iter().position(|player| player == name) else {
            return false;
        };
        self.players.remove(position);
        self.scores.remove(name);
        if let Some(id) = self.record_id {
            log_storage_error(
                "record leave",
                blocking(|| self.storage.record_player_left(id, name)),
            );
        }
        info!("Player {} left before the start", name);
        true
    }

    pub fn start(&mut self) {
        if self.state == GameState::NotStarted {
            self.state = GameState::InProgress;
            info!("Game started with players {:?}", self.players);
        }
    }

    pub fn roster_full(&self) -> bool {
        self.players.len() >= self.max_players
    }

    pub fn state(&self) -> &GameState {
        &self.state
    }

    pub fn is_finished(&self) -> bool {
        matches!(self.state, GameState::Finished { .. })
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    pub fn players(&self) -> &[String] {
        &self.players
    }

    pub fn score_of(&self, player: &str) -> Option<u32> {
        self.scores.get(player).copied()
    }

    /// Player whose turn it is, if anyone has joined.
    pub fn current_player(&self) -> Option<&str> {
        if self.players.is_empty() {
            return None;
        }
        Some(self.players[self.turn % self.players.len()].as_str())
    }

    /// Scores in roster order.
    pub fn standings(&self) -> Vec<(String, u32)> {
        self.players
            .iter()
            .map(|player| (player.clone(), self.scores.get(player).copied().unwrap_or(0)))
            .collect()
    }

    /// Handles one line from `player`.
    pub fn process_command(&mut self, player: &str, line: &str) -> Reply {
        let request = match parse_request(line) {
            Ok(request) => request,
            Err(err) => return Reply::keep(err.to_string()),
        };

        if let Request::Stats(query) = &request {
            return Reply::keep(self.statistics(query));
        }

        match self.state {
            GameState::NotStarted => return Reply::keep("Game didn't start."),
            GameState::Finished { .. } => return Reply::keep("Game is over."),
            GameState::InProgress => {}
        }

        if let Request::Command(command) = &request {
            if command.is_informational() {
                return Reply::keep(self.describe(*command));
            }
        }

        if self.current_player() != Some(player) {
            return Reply::keep("Not your step is now.");
        }

        match request {
            Request::Command(Command::Skip) => self.skip(player),
            Request::Command(Command::Put) => {
                self.pending = Some(PutStep::Row);
                Reply::keep("Entering row")
            }
            Request::Text(text) => match self.pending.take() {
                Some(step) => self.advance_put(step, &text),
                None => Reply::keep("Don't understand you."),
            },
            _ => Reply::keep("Don't understand you."),
        }
    }

    fn describe(&self, command: Command) -> String {
        match command {
            Command::Area => self.board.render(),
            Command::Words => self.board.render_words(),
            Command::Step => self.current_player().unwrap_or_default().to_string(),
            Command::Score => self.render_scores(),
            _ => help_text(),
        }
    }

    fn render_scores(&self) -> String {
        self.standings()
            .iter()
            .map(|(player, score)| format!("{} : {}", player, score))
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn skip(&mut self, player: &str) -> Reply {
        self.pending = None;
        self.skips += 1;
        debug!("{} skipped ({}/{})", player, self.skips, self.players.len());

        if self.skips >= self.players.len() {
            self.finish(None);
            return Reply::end("Game over. No winner. All users skipped.");
        }
        self.advance_turn();
        Reply::keep("You skipped.")
    }

    fn advance_put(&mut self, step: PutStep, text: &str) -> Reply {
        let (next, prompt) = match step {
            PutStep::Row => match self.coordinate(text) {
                Some(row) => (PutStep::Col { row }, "Entering column"),
                None => (step, "Invalid. Try again."),
            },
            PutStep::Col { row } => match self.coordinate(text) {
                Some(col) => (PutStep::Letter { row, col }, "Entering letter"),
                None => (step, "Invalid. Try again."),
            },
            PutStep::Letter { row, col } => {
                let mut chars = text.chars();
                match (chars.next(), chars.next()) {
                    (Some(letter), None) => (PutStep::Word { row, col, letter }, "Entering word"),
                    _ => (step, "Invalid. Try again."),
                }
            }
            PutStep::Word { row, col, letter } => return self.place(row, col, letter, text),
        };
        self.pending = Some(next);
        Reply::keep(prompt)
    }

    fn coordinate(&self, text: &str) -> Option<usize> {
        text.trim()
            .parse::<usize>()
            .ok()
            .filter(|value| *value < self.board.size())
    }

    fn place(&mut self, row: usize, col: usize, letter: char, word: &str) -> Reply {
        if !self.board.validate(row, col, letter, word, &self.dictionary) {
            return Reply::keep("You can't add this word. Try again.");
        }

        let word = word.trim().to_lowercase();
        let points = word.chars().count() as u32;
        let mover = self.players[self.turn % self.players.len()].clone();
        *self.scores.entry(mover.clone()).or_insert(0) += points;
        self.skips = 0;
        info!("{} added '{}' for {} points", mover, word, points);

        if let Some(id) = self.record_id {
            log_storage_error(
                "record move",
                blocking(|| self.storage.record_move(id, &mover, &word)),
            );
        }

        if self.board.is_full() {
            let winner = winner_of(&self.standings());
            self.finish(winner.clone());
            return Reply::end(format!(
                "Game over.\n{}\nOur winner: {}\n{}",
                self.render_scores(),
                winner.as_deref().unwrap_or("nobody"),
                self.board.render()
            ));
        }

        self.advance_turn();
        Reply::keep(format!("Success\n{}", self.board.render()))
    }

    fn advance_turn(&mut self) {
        self.turn = (self.turn + 1) % self.players.len().max(1);
    }

    /// Moves the game to `Finished`. Later calls change nothing and the
    /// result reaches storage only once.
    pub fn finish(&mut self, winner: Option<String>) {
        if self.is_finished() {
            return;
        }
        info!(
            "Game finished, winner: {}",
            winner.as_deref().unwrap_or("nobody")
        );
        self.pending = None;
        self.state = GameState::Finished {
            winner: winner.clone(),
        };

        if self.result_reported {
            return;
        }
        self.result_reported = true;
        if let Some(id) = self.record_id {
            let standings = self.standings();
            log_storage_error(
                "record result",
                blocking(|| {
                    self.storage
                        .record_game_result(id, &standings, winner.as_deref())
                }),
            );
        }
    }

    fn statistics(&self, query: &StatQuery) -> String {
        let rendered = blocking(|| self.query_statistics(query));

        match rendered {
            Ok(lines) if lines.is_empty() => "No data.".to_string(),
            Ok(lines) => lines.join("\n"),
            Err(err) => {
                error!("Statistics query failed: {}", err);
                DATABASE_ERROR.to_string()
            }
        }
    }

    fn query_statistics(&self, query: &StatQuery) -> Result<Vec<String>, StorageError> {
        match query {
            StatQuery::TopUsers { order, page } => {
                self.storage.top_players(*order, *page).map(|rows| {
                    rows.iter()
                        .map(|row| {
                            format!(
                                "Login: {}, Scores: {}, Games: {}, Wins: {}, Average: {:.1}",
                                row.name,
                                row.score,
                                row.games,
                                row.wins,
                                row.average_score()
                            )
                        })
                        .collect::<Vec<_>>()
                })
            }
            StatQuery::TopWords { page } => self.storage.top_words(*page).map(|rows| {
                rows.iter()
                    .map(|row| format!("Word: {}, Usage count: {}", row.word, row.uses))
                    .collect::<Vec<_>>()
            }),
            StatQuery::WordTopUsers { word, page } => {
                self.storage.word_top_players(word, *page).map(|rows| {
                    rows.iter()
                        .map(|row| format!("User: {}, Usage count: {}", row.name, row.uses))
                        .collect::<Vec<_>>()
                })
            }
            StatQuery::UserGames { name, page } => self.user_games(name, *page),
        }
    }

    fn user_games(&self, name: &str, page: Page) -> Result<Vec<String>, StorageError> {
        let games = self.storage.player_games(name, page)?;
        Ok(games
            .iter()
            .map(|game| {
                let players = game
                    .players
                    .iter()
                    .map(|(player, score)| format!("\t\tUser: {}, Scores: {}", player, score))
                    .collect::<Vec<_>>()
                    .join("\n");
                format!(
                    "GameID: {}, Winner: {}\nAnother players:\n{}",
                    game.id,
                    game.winner.as_deref().unwrap_or("nobody"),
                    players
                )
            })
            .collect())
    }
}

/// Sole holder of the highest score. Any tie at the top means no winner.
pub fn winner_of(scores: &[(String, u32)]) -> Option<String> {
    let mut best: Option<u32> = None;
    let mut holder: Option<&str> = None;
    for (player, score) in scores {
        match best {
            Some(max) if *score < max => {}
            Some(max) if *score == max => holder = None,
            _ => {
                best = Some(*score);
                holder = Some(player.as_str());
            }
        }
    }
    holder.map(str::to_string)
}

/// Runs a database call. On a multi-threaded runtime the worker thread is
/// handed off first, so other connections keep running while SQLite blocks.
fn blocking<T>(call: impl FnOnce() -> T) -> T {
    match Handle::try_current() {
        Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
            block_in_place(call)
        }
        _ => call(),
    }
}

fn log_storage_error<T>(action: &str, result: Result<T, StorageError>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(err) => {
            warn!("Failed to {}: {}", action, err);
            None
        }
    }
}
