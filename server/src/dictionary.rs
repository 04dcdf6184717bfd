//! Dictionary of allowed words
//!
//! Loaded once at startup from a UTF-8 file with one word per line and shared
//! read-only by every game. Words are stored lower-cased; lookups normalise
//! their input the same way.

use crate::error::ServerError;
use log::info;
use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;

#[derive(Debug, Default)]
pub struct Dictionary {
    words: HashSet<String>,
    by_length: HashMap<usize, Vec<String>>,
}

impl Dictionary {
    /// Reads the dictionary file at `path`.
    pub fn load(path: &Path) -> Result<Self, ServerError> {
        let file = File::open(path).map_err(|source| ServerError::Dictionary {
            path: path.to_path_buf(),
            source,
        })?;
        let dictionary =
            Self::from_reader(BufReader::new(file)).map_err(|source| ServerError::Dictionary {
                path: path.to_path_buf(),
                source,
            })?;
        info!(
            "Loaded {} words from {}",
            dictionary.len(),
            path.display()
        );
        Ok(dictionary)
    }

    pub fn from_reader<R: BufRead>(reader: R) -> io::Result<Self> {
        let mut dictionary = Self::default();
        for line in reader.lines() {
            dictionary.insert(&line?);
        }
        Ok(dictionary)
    }

    pub fn from_words<I, S>(words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut dictionary = Self::default();
        for word in words {
            dictionary.insert(word.as_ref());
        }
        dictionary
    }

    fn insert(&mut self, raw: &str) {
        let word = raw.trim().to_lowercase();
        if word.is_empty() || self.words.contains(&word) {
            return;
        }
        self.by_length
            .entry(word.chars().count())
            .or_default()
            .push(word.clone());
        self.words.insert(word);
    }

    /// Case-insensitive membership test.
    pub fn contains(&self, word: &str) -> bool {
        self.words.contains(&word.trim().to_lowercase())
    }

    /// Picks a random word with exactly `length` letters.
    pub fn random_word_of_length<R: Rng + ?Sized>(
        &self,
        length: usize,
        rng: &mut R,
    ) -> Option<&str> {
        self.by_length
            .get(&length)
            .and_then(|words| words.choose(rng))
            .map(String::as_str)
    }

    /// Returns true if at least one word has `length` letters.
    pub fn has_words_of_length(&self, length: usize) -> bool {
        self.by_length
            .get(&length)
            .map_or(false, |words| !words.is_empty())
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }
}
