//! Letter grid and move validation
//!
//! A board is a square grid of cells that are either empty or hold one
//! letter. It starts with a seed word written across the middle row. A move
//! places one letter in an empty cell and names a word; the move is accepted
//! only if the word can be traced through orthogonally adjacent cells of the
//! grid *and* the trace passes through the new letter.

use crate::dictionary::Dictionary;
use crate::error::BoardError;
use log::debug;

/// Character used for empty cells when the board is rendered.
pub const EMPTY_CELL: char = '-';

#[derive(Debug, Clone)]
pub struct Board {
    size: usize,
    cells: Vec<Option<char>>,
    used_words: Vec<String>,
}

impl Board {
    /// Creates a board with `seed` across the middle row.
    ///
    /// The seed must have exactly `size` letters. It is registered as used
    /// so nobody can claim it again.
    pub fn new(size: usize, seed: &str) -> Result<Self, BoardError> {
        let seed = seed.to_lowercase();
        let letters: Vec<char> = seed.chars().collect();
        if size == 0 || letters.len() != size {
            return Err(BoardError::SeedLength {
                expected: size,
                found: letters.len(),
            });
        }

        let mut cells = vec![None; size * size];
        let middle = (size - 1) / 2;
        for (col, letter) in letters.into_iter().enumerate() {
            cells[middle * size + col] = Some(letter);
        }

        Ok(Self {
            size,
            cells,
            used_words: vec![seed],
        })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Letter at `(row, col)`, `None` for empty or out-of-range cells.
    pub fn cell(&self, row: usize, col: usize) -> Option<char> {
        self.index(row, col).and_then(|index| self.cells[index])
    }

    pub fn used_words(&self) -> &[String] {
        &self.used_words
    }

    pub fn is_used(&self, word: &str) -> bool {
        let word = word.to_lowercase();
        self.used_words.iter().any(|used| *used == word)
    }

    pub fn empty_cells(&self) -> usize {
        self.cells.iter().filter(|cell| cell.is_none()).count()
    }

    pub fn is_full(&self) -> bool {
        self.cells.iter().all(Option::is_some)
    }

    fn index(&self, row: usize, col: usize) -> Option<usize> {
        (row < self.size && col < self.size).then(|| row * self.size + col)
    }

    /// Validates a move and applies it on success.
    ///
    /// Rejected without searching if the word was already claimed, the cell
    /// is out of range or occupied, or the word is not in the dictionary.
    /// Otherwise the letter is tried at `(row, col)` and kept, together with
    /// the word, only if some trace of the word crosses that cell.
    pub fn validate(
        &mut self,
        row: usize,
        col: usize,
        letter: char,
        candidate: &str,
        dictionary: &Dictionary,
    ) -> bool {
        let word = candidate.trim().to_lowercase();
        let letters: Vec<char> = word.chars().collect();
        if letters.is_empty() {
            return false;
        }

        if self.is_used(&word) {
            debug!("Word '{}' used already in this game", word);
            return false;
        }

        let Some(target) = self.index(row, col) else {
            return false;
        };
        if self.cells[target].is_some() {
            debug!("Cell ({}, {}) is already taken", row, col);
            return false;
        }

        if !dictionary.contains(&word) {
            debug!("Word '{}' is not in the dictionary", word);
            return false;
        }

        let mut trial = self.cells.clone();
        trial[target] = letter.to_lowercase().next();

        if !traces_through(&trial, self.size, &letters, target, 0..trial.len()) {
            debug!("Word '{}' can't be traced through ({}, {})", word, row, col);
            return false;
        }

        self.cells = trial;
        debug!("New word '{}' added", word);
        self.used_words.push(word);
        true
    }

    /// The grid with column indices on top and row indices on the left.
    pub fn render(&self) -> String {
        let mut out = String::from("  ");
        let header: Vec<String> = (0..self.size).map(|col| col.to_string()).collect();
        out.push_str(&header.join(" "));

        for row in 0..self.size {
            let line: Vec<String> = (0..self.size)
                .map(|col| self.cell(row, col).unwrap_or(EMPTY_CELL).to_string())
                .collect();
            out.push_str(&format!("\n{}[{}]", row, line.join(" ")));
        }
        out
    }

    /// Claimed words in claim order, one per line.
    pub fn render_words(&self) -> String {
        self.used_words.join("\n")
    }
}

/// Searches for a trace of `word` over `cells` that passes through `target`.
///
/// Every cell yielded by `starts` whose letter matches the first letter of
/// the word begins an independent attempt with its own visited markers.
pub(crate) fn traces_through<I>(
    cells: &[Option<char>],
    size: usize,
    word: &[char],
    target: usize,
    starts: I,
) -> bool
where
    I: IntoIterator<Item = usize>,
{
    let Some(&first) = word.first() else {
        return false;
    };

    starts.into_iter().any(|start| {
        if cells.get(start).copied().flatten() != Some(first) {
            return false;
        }
        let mut visited = vec![false; cells.len()];
        walk(cells, size, word, target, start, 0, false, &mut visited)
    })
}

#[allow(clippy::too_many_arguments)]
fn walk(
    cells: &[Option<char>],
    size: usize,
    word: &[char],
    target: usize,
    position: usize,
    depth: usize,
    crossed: bool,
    visited: &mut [bool],
) -> bool {
    if cells[position] != Some(word[depth]) {
        return false;
    }

    let crossed = crossed || position == target;
    if depth + 1 == word.len() {
        return crossed;
    }

    visited[position] = true;
    let mut found = false;
    for next in neighbours(position, size).into_iter().flatten() {
        if !visited[next] && walk(cells, size, word, target, next, depth + 1, crossed, visited) {
            found = true;
            break;
        }
    }
    visited[position] = false;

    found
}

/// Left, right, up and down neighbours of a cell.
fn neighbours(position: usize, size: usize) -> [Option<usize>; 4] {
    let row = position / size;
    let col = position % size;
    [
        (col > 0).then(|| position - 1),
        (col + 1 < size).then(|| position + 1),
        (row > 0).then(|| position - size),
        (row + 1 < size).then(|| position + size),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::seq::SliceRandom;
    use rand::SeedableRng;

    fn dictionary() -> Dictionary {
        Dictionary::from_words([
            "table", "at", "tab", "bat", "tables", "able", "lab", "slab", "a", "б", "стол", "ток",
        ])
    }

    #[test]
    fn test_new_board_places_seed_in_middle_row() {
        let board = Board::new(5, "Table").unwrap();
        assert_eq!(board.size(), 5);
        assert_eq!(board.cell(2, 0), Some('t'));
        assert_eq!(board.cell(2, 4), Some('e'));
        assert_eq!(board.cell(1, 0), None);
        assert_eq!(board.empty_cells(), 20);
        assert_eq!(board.used_words(), &["table".to_string()]);
        assert!(board.is_used("TABLE"));
    }

    #[test]
    fn test_even_board_uses_upper_middle_row() {
        let board = Board::new(4, "стол").unwrap();
        assert_eq!(board.cell(1, 0), Some('с'));
        assert_eq!(board.cell(1, 3), Some('л'));
    }

    #[test]
    fn test_seed_length_must_match_size() {
        assert_eq!(
            Board::new(5, "cat").unwrap_err(),
            BoardError::SeedLength {
                expected: 5,
                found: 3
            }
        );
        assert!(Board::new(0, "").is_err());
    }

    #[test]
    fn test_connecting_letter_forms_new_word() {
        let dictionary = dictionary();
        let mut board = Board::new(5, "table").unwrap();

        // 'a' at (2, 1), new 't' just above it
        assert!(board.validate(1, 1, 't', "at", &dictionary));
        assert_eq!(board.cell(1, 1), Some('t'));
        assert!(board.is_used("at"));
        assert_eq!(board.empty_cells(), 19);
    }

    #[test]
    fn test_seed_word_cannot_be_claimed_again() {
        let dictionary = dictionary();
        let mut board = Board::new(5, "table").unwrap();
        assert!(!board.validate(1, 0, 't', "table", &dictionary));
        assert_eq!(board.cell(1, 0), None);
    }

    #[test]
    fn test_used_word_rejected_even_with_valid_path() {
        let dictionary = dictionary();
        let mut board = Board::new(5, "table").unwrap();
        assert!(board.validate(1, 1, 't', "at", &dictionary));
        // 'a' (2, 1) then new 't' at (3, 1) would be a valid second trace
        assert!(!board.validate(3, 1, 't', "at", &dictionary));
        assert_eq!(board.cell(3, 1), None);
    }

    #[test]
    fn test_occupied_or_out_of_range_cell_rejected() {
        let dictionary = dictionary();
        let mut board = Board::new(5, "table").unwrap();
        assert!(!board.validate(2, 1, 't', "at", &dictionary));
        assert!(!board.validate(5, 1, 't', "at", &dictionary));
        assert!(!board.validate(1, 9, 't', "at", &dictionary));
    }

    #[test]
    fn test_word_outside_dictionary_rejected() {
        let dictionary = dictionary();
        let mut board = Board::new(5, "table").unwrap();
        assert!(!board.validate(1, 1, 'x', "ax", &dictionary));
        assert_eq!(board.cell(1, 1), None);
    }

    #[test]
    fn test_trace_must_cross_new_letter() {
        let dictionary = dictionary();
        let mut board = Board::new(5, "table").unwrap();
        // "tab" exists in the seed row but the new letter is not on the trace
        assert!(!board.validate(0, 0, 'x', "tab", &dictionary));
        assert_eq!(board.cell(0, 0), None);
        assert!(!board.is_used("tab"));
    }

    #[test]
    fn test_trace_cannot_revisit_a_cell() {
        let dictionary = Dictionary::from_words(["abab", "aba"]);
        let mut board = Board::new(2, "ab").unwrap();
        // Grid: row 0 "ab", row 1 empty. Placing 'a' below 'b' only allows
        // a-b-a; "abab" would need to revisit a cell.
        assert!(!board.validate(1, 1, 'a', "abab", &dictionary));
        assert!(board.validate(1, 1, 'a', "aba", &dictionary));
    }

    #[test]
    fn test_longer_word_along_seed_and_new_cell() {
        let dictionary = dictionary();
        let mut board = Board::new(5, "table").unwrap();
        assert!(board.validate(1, 4, 's', "tables", &dictionary));
        // s (1, 4) has no 'l' neighbour, so "slab" can't start there
        assert!(!board.validate(1, 3, 'l', "slab", &dictionary));
    }

    #[test]
    fn test_single_letter_word_must_be_the_new_cell() {
        let dictionary = dictionary();
        let mut board = Board::new(5, "table").unwrap();
        // An 'a' already on the board does not make "a" playable elsewhere
        assert!(!board.validate(0, 0, 'b', "a", &dictionary));
        assert!(board.validate(0, 0, 'a', "a", &dictionary));
    }

    #[test]
    fn test_letter_and_word_are_case_normalised() {
        let dictionary = dictionary();
        let mut board = Board::new(5, "table").unwrap();
        assert!(board.validate(1, 1, 'T', "AT", &dictionary));
        assert_eq!(board.cell(1, 1), Some('t'));
        assert!(board.is_used("at"));
    }

    #[test]
    fn test_cyrillic_words() {
        let dictionary = dictionary();
        let mut board = Board::new(4, "стол").unwrap();
        // т (1, 1) -> о (1, 2) -> new к at (0, 2)
        assert!(board.validate(0, 2, 'к', "ток", &dictionary));
        assert_eq!(board.cell(0, 2), Some('к'));
    }

    #[test]
    fn test_is_full_exactly_at_last_cell() {
        let dictionary = Dictionary::from_words(["ab", "ba", "bb", "aa"]);
        let mut board = Board::new(2, "ab").unwrap();
        assert!(!board.is_full());
        assert!(!board.validate(1, 0, 'b', "ab", &dictionary));
        // (1, 0) below 'a': trace a(0, 0) -> a(1, 0)
        assert!(board.validate(1, 0, 'a', "aa", &dictionary));
        assert!(!board.is_full());
        assert!(board.validate(1, 1, 'b', "bb", &dictionary));
        assert!(board.is_full());
        assert_eq!(board.empty_cells(), 0);
    }

    #[test]
    fn test_search_independent_of_start_order() {
        let cells: Vec<Option<char>> = "abcaba-ab"
            .chars()
            .map(|c| (c != '-').then_some(c))
            .collect();
        let size = 3;
        let words: [&[char]; 4] = [
            &['a', 'b', 'a'],
            &['c', 'a', 'b'],
            &['b', 'a', 'b', 'a'],
            &['a', 'c'],
        ];
        let mut rng = StdRng::seed_from_u64(42);

        for word in words {
            for target in 0..cells.len() {
                let expected = traces_through(&cells, size, word, target, 0..cells.len());
                for _ in 0..10 {
                    let mut order: Vec<usize> = (0..cells.len()).collect();
                    order.shuffle(&mut rng);
                    assert_eq!(
                        traces_through(&cells, size, word, target, order),
                        expected,
                        "word {:?} target {}",
                        word,
                        target
                    );
                }
            }
        }
    }

    #[test]
    fn test_render_layout() {
        let board = Board::new(3, "cat").unwrap();
        assert_eq!(board.render(), "  0 1 2\n0[- - -]\n1[c a t]\n2[- - -]");
        assert_eq!(board.render_words(), "cat");
    }
}
