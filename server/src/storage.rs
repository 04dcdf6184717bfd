//! Persistent statistics using SQLite (rusqlite)
//!
//! The game reports what happens (games started, players joining, accepted
//! words, final results) through the [`Storage`] trait and reads leaderboards
//! back through it. Every failure surfaces as a [`StorageError`]; callers log
//! it and carry on, a broken database never stops a game.

use directories::ProjectDirs;
use log::debug;
use rusqlite::{params, Connection};
use shared::{Page, RankOrder};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

/// Current schema version, kept in `PRAGMA user_version`.
const SCHEMA_VERSION: i32 = 1;

/// Identifier of a game row.
pub type GameRecordId = i64;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("database connection lock poisoned")]
    Poisoned,

    #[error("could not determine data directory")]
    NoDataDirectory,

    #[error("failed to create data directory: {0}")]
    CreateDirFailed(std::io::Error),

    #[error("database schema version {found} is newer than supported version {supported}")]
    FutureSchemaVersion { found: i32, supported: i32 },
}

/// Aggregated results of one player over all finished games.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerStanding {
    pub name: String,
    pub score: i64,
    pub games: i64,
    pub wins: i64,
}

impl PlayerStanding {
    /// Mean score per finished game, 0 for players without one.
    pub fn average_score(&self) -> f64 {
        if self.games == 0 {
            0.0
        } else {
            self.score as f64 / self.games as f64
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WordUsage {
    pub word: String,
    pub uses: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerUsage {
    pub name: String,
    pub uses: i64,
}

/// One finished game as seen from the statistics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameSummary {
    pub id: GameRecordId,
    pub winner: Option<String>,
    pub players: Vec<(String, i64)>,
}

/// Operations the game needs from persistent storage.
pub trait Storage: Send + Sync {
    fn record_game_started(&self) -> Result<GameRecordId, StorageError>;

    fn record_player_joined(&self, game: GameRecordId, player: &str) -> Result<(), StorageError>;

    fn record_player_left(&self, game: GameRecordId, player: &str) -> Result<(), StorageError>;

    fn record_move(
        &self,
        game: GameRecordId,
        player: &str,
        word: &str,
    ) -> Result<(), StorageError>;

    fn record_game_result(
        &self,
        game: GameRecordId,
        scores: &[(String, u32)],
        winner: Option<&str>,
    ) -> Result<(), StorageError>;

    fn top_players(
        &self,
        order: RankOrder,
        page: Page,
    ) -> Result<Vec<PlayerStanding>, StorageError>;

    fn top_words(&self, page: Page) -> Result<Vec<WordUsage>, StorageError>;

    fn word_top_players(&self, word: &str, page: Page) -> Result<Vec<PlayerUsage>, StorageError>;

    fn player_games(&self, player: &str, page: Page) -> Result<Vec<GameSummary>, StorageError>;
}

/// SQLite implementation of [`Storage`].
///
/// The connection sits behind a mutex so one handle can be shared by every
/// game; each call holds the lock only for its own statements.
pub struct SqliteStorage {
    conn: Mutex<Connection>,
}

impl SqliteStorage {
    /// Open or create the database file at `path`.
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(StorageError::CreateDirFailed)?;
        }
        let conn = Connection::open(path)?;
        Self::with_connection(conn)
    }

    /// Open a private in-memory database.
    pub fn open_in_memory() -> Result<Self, StorageError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    /// Default database location in the OS-standard data directory.
    ///
    /// - Linux: `$XDG_DATA_HOME/balda/` or `~/.local/share/balda/`
    /// - macOS: `~/Library/Application Support/balda/`
    pub fn default_path() -> Result<PathBuf, StorageError> {
        ProjectDirs::from("", "", "balda")
            .map(|dirs| dirs.data_dir().join("balda.db"))
            .ok_or(StorageError::NoDataDirectory)
    }

    fn with_connection(conn: Connection) -> Result<Self, StorageError> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        let storage = Self {
            conn: Mutex::new(conn),
        };
        storage.initialize_schema()?;
        Ok(storage)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StorageError> {
        self.conn.lock().map_err(|_| StorageError::Poisoned)
    }

    fn initialize_schema(&self) -> Result<(), StorageError> {
        let conn = self.lock()?;
        let version: i32 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;

        if version > SCHEMA_VERSION {
            return Err(StorageError::FutureSchemaVersion {
                found: version,
                supported: SCHEMA_VERSION,
            });
        }

        if version < 1 {
            conn.execute_batch(
                "
                CREATE TABLE IF NOT EXISTS players (
                    name TEXT PRIMARY KEY,
                    created_at INTEGER NOT NULL
                );

                CREATE TABLE IF NOT EXISTS games (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    started_at INTEGER NOT NULL,
                    finished_at INTEGER,
                    winner TEXT
                );

                CREATE TABLE IF NOT EXISTS game_players (
                    game_id INTEGER NOT NULL REFERENCES games(id),
                    player TEXT NOT NULL REFERENCES players(name),
                    score INTEGER NOT NULL DEFAULT 0,
                    PRIMARY KEY (game_id, player)
                );

                CREATE TABLE IF NOT EXISTS moves (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    game_id INTEGER NOT NULL REFERENCES games(id),
                    player TEXT NOT NULL REFERENCES players(name),
                    word TEXT NOT NULL,
                    created_at INTEGER NOT NULL
                );

                CREATE INDEX IF NOT EXISTS idx_moves_word ON moves(word);
                ",
            )?;
            conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
            debug!("Created storage schema v{}", SCHEMA_VERSION);
        }

        Ok(())
    }
}

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

impl Storage for SqliteStorage {
    fn record_game_started(&self) -> Result<GameRecordId, StorageError> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO games (started_at) VALUES (?1)",
            params![now_millis()],
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn record_player_joined(&self, game: GameRecordId, player: &str) -> Result<(), StorageError> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT OR IGNORE INTO players (name, created_at) VALUES (?1, ?2)",
            params![player, now_millis()],
        )?;
        conn.execute(
            "INSERT OR IGNORE INTO game_players (game_id, player) VALUES (?1, ?2)",
            params![game, player],
        )?;
        Ok(())
    }

    fn record_player_left(&self, game: GameRecordId, player: &str) -> Result<(), StorageError> {
        let conn = self.lock()?;
        conn.execute(
            "DELETE FROM game_players WHERE game_id = ?1 AND player = ?2",
            params![game, player],
        )?;
        Ok(())
    }

    fn record_move(
        &self,
        game: GameRecordId,
        player: &str,
        word: &str,
    ) -> Result<(), StorageError> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO moves (game_id, player, word, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![game, player, word, now_millis()],
        )?;
        Ok(())
    }

    fn record_game_result(
        &self,
        game: GameRecordId,
        scores: &[(String, u32)],
        winner: Option<&str>,
    ) -> Result<(), StorageError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        tx.execute(
            "UPDATE games SET finished_at = ?1, winner = ?2 WHERE id = ?3",
            params![now_millis(), winner, game],
        )?;
        for (player, score) in scores {
            tx.execute(
                "UPDATE game_players SET score = ?1 WHERE game_id = ?2 AND player = ?3",
                params![score, game, player],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    fn top_players(
        &self,
        order: RankOrder,
        page: Page,
    ) -> Result<Vec<PlayerStanding>, StorageError> {
        let column = match order {
            RankOrder::Score => "score",
            RankOrder::Games => "games",
            RankOrder::Wins => "wins",
        };
        let sql = format!(
            "SELECT p.name,
                    COALESCE(SUM(CASE WHEN g.id IS NULL THEN 0 ELSE gp.score END), 0) AS score,
                    COUNT(g.id) AS games,
                    COALESCE(SUM(CASE WHEN g.winner = p.name THEN 1 ELSE 0 END), 0) AS wins
             FROM players p
             LEFT JOIN game_players gp ON gp.player = p.name
             LEFT JOIN games g ON g.id = gp.game_id AND g.finished_at IS NOT NULL
             GROUP BY p.name
             ORDER BY {} DESC, p.name ASC
             LIMIT ?1 OFFSET ?2",
            column
        );

        let conn = self.lock()?;
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![page.limit, page.offset], |row| {
            Ok(PlayerStanding {
                name: row.get(0)?,
                score: row.get(1)?,
                games: row.get(2)?,
                wins: row.get(3)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    fn top_words(&self, page: Page) -> Result<Vec<WordUsage>, StorageError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT word, COUNT(*) AS uses FROM moves
             GROUP BY word
             ORDER BY uses DESC, word ASC
             LIMIT ?1 OFFSET ?2",
        )?;
        let rows = stmt.query_map(params![page.limit, page.offset], |row| {
            Ok(WordUsage {
                word: row.get(0)?,
                uses: row.get(1)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    fn word_top_players(&self, word: &str, page: Page) -> Result<Vec<PlayerUsage>, StorageError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT player, COUNT(*) AS uses FROM moves
             WHERE word = ?1
             GROUP BY player
             ORDER BY uses DESC, player ASC
             LIMIT ?2 OFFSET ?3",
        )?;
        let rows = stmt.query_map(params![word, page.limit, page.offset], |row| {
            Ok(PlayerUsage {
                name: row.get(0)?,
                uses: row.get(1)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    fn player_games(&self, player: &str, page: Page) -> Result<Vec<GameSummary>, StorageError> {
        let conn = self.lock()?;
        let mut games_stmt = conn.prepare(
            "SELECT g.id, g.winner FROM games g
             JOIN game_players gp ON gp.game_id = g.id
             WHERE gp.player = ?1 AND g.finished_at IS NOT NULL
             ORDER BY g.id DESC
             LIMIT ?2 OFFSET ?3",
        )?;
        let games = games_stmt
            .query_map(params![player, page.limit, page.offset], |row| {
                Ok((row.get::<_, GameRecordId>(0)?, row.get::<_, Option<String>>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut players_stmt = conn.prepare(
            "SELECT player, score FROM game_players
             WHERE game_id = ?1
             ORDER BY score DESC, player ASC",
        )?;

        let mut summaries = Vec::with_capacity(games.len());
        for (id, winner) in games {
            let players = players_stmt
                .query_map(params![id], |row| Ok((row.get(0)?, row.get(1)?)))?
                .collect::<Result<Vec<_>, _>>()?;
            summaries.push(GameSummary {
                id,
                winner,
                players,
            });
        }
        Ok(summaries)
    }
}
