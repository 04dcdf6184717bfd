//! Performance benchmarks for move validation and command handling

use server::board::Board;
use server::dictionary::Dictionary;
use server::game::Game;
use server::storage::SqliteStorage;
use std::sync::Arc;
use std::time::Instant;

/// Seven `a`s across the middle of a 7x7 board: every cell of the seed
/// matches, so the search branches as much as a row allows.
fn seeded_board() -> Board {
    Board::new(7, "aaaaaaa").unwrap()
}

/// Benchmarks an accepted move, including the trial grid copy
#[test]
fn benchmark_accepted_move() {
    let dictionary = Dictionary::from_words(["aaaaaaa", "aaab"]);
    let board = seeded_board();

    let iterations = 10_000;
    let start = Instant::now();

    for _ in 0..iterations {
        let mut board = board.clone();
        assert!(board.validate(2, 3, 'b', "aaab", &dictionary));
    }

    let duration = start.elapsed();
    println!(
        "Accepted move: {} iterations in {:?} ({:.2} μs/iter)",
        iterations,
        duration,
        duration.as_micros() as f64 / iterations as f64
    );

    // Should complete in under 1s for 10k iterations
    assert!(duration.as_millis() < 1000);
}

/// Benchmarks a search that explores every start and finds nothing
#[test]
fn benchmark_exhaustive_rejection() {
    let dictionary = Dictionary::from_words(["aaaaaaa", "aaaaaaab"]);
    let mut board = seeded_board();

    let iterations = 10_000;
    let start = Instant::now();

    for _ in 0..iterations {
        assert!(!board.validate(2, 3, 'b', "aaaaaaab", &dictionary));
    }

    let duration = start.elapsed();
    println!(
        "Exhaustive rejection: {} iterations in {:?} ({:.2} μs/iter)",
        iterations,
        duration,
        duration.as_micros() as f64 / iterations as f64
    );

    assert!(board.used_words().len() == 1);
    assert!(duration.as_millis() < 1000);
}

/// Benchmarks rejections that never reach the search
#[test]
fn benchmark_early_rejection() {
    let dictionary = Dictionary::from_words(["aaaaaaa"]);
    let mut board = seeded_board();

    let iterations = 100_000;
    let start = Instant::now();

    for _ in 0..iterations {
        assert!(!board.validate(2, 3, 'b', "zzzz", &dictionary));
        assert!(!board.validate(3, 3, 'b', "aaaaaaa", &dictionary));
    }

    let duration = start.elapsed();
    println!(
        "Early rejection: {} iterations in {:?} ({:.2} ns/iter)",
        iterations,
        duration,
        duration.as_nanos() as f64 / iterations as f64
    );

    assert!(duration.as_millis() < 1000);
}

/// Benchmarks read-only commands through the game state machine
#[test]
fn benchmark_informational_commands() {
    let dictionary = Arc::new(Dictionary::from_words(["aaaaaaa"]));
    let storage = Arc::new(SqliteStorage::open_in_memory().unwrap());
    let mut game = Game::with_board(seeded_board(), 2, dictionary, storage);
    game.add_player("alice").unwrap();
    game.add_player("bob").unwrap();
    game.start();

    let iterations = 10_000;
    let start = Instant::now();

    for i in 0..iterations {
        let line = match i % 4 {
            0 => "area",
            1 => "score",
            2 => "step",
            _ => "put",
        };
        let reply = game.process_command("bob", line);
        assert!(reply.keep_playing);
    }

    let duration = start.elapsed();
    println!(
        "Informational commands: {} iterations in {:?} ({:.2} μs/iter)",
        iterations,
        duration,
        duration.as_micros() as f64 / iterations as f64
    );

    assert_eq!(game.current_player(), Some("alice"));
    assert!(duration.as_millis() < 1000);
}
