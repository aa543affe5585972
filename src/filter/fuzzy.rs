//! Edit distance and typo-tolerant matching over song titles and artists.

use crate::cache::normalize_key;
use crate::models::Song;
use std::collections::{HashMap, HashSet};

/// Songs match a fuzzy query while the edit distance stays below this.
pub const FUZZY_THRESHOLD: usize = 3;

/// Levenshtein distance between two strings, counted in chars.
pub fn levenshtein_distance(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut previous: Vec<usize> = (0..=b.len()).collect();
    let mut current = vec![0; b.len() + 1];
    for (i, ca) in a.iter().enumerate() {
        current[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let substitution = previous[j] + usize::from(ca != cb);
            current[j + 1] = substitution
                .min(previous[j + 1] + 1)
                .min(current[j] + 1);
        }
        std::mem::swap(&mut previous, &mut current);
    }
    previous[b.len()]
}

/// True when the normalized title or artist is within the fuzzy threshold
/// of `normalized_query`.
pub fn fuzzy_matches(song: &Song, normalized_query: &str) -> bool {
    levenshtein_distance(&normalize_key(&song.title), normalized_query) < FUZZY_THRESHOLD
        || levenshtein_distance(&normalize_key(&song.artist_name), normalized_query)
            < FUZZY_THRESHOLD
}

/// Keep the songs whose title or artist is close to `text`.
pub fn fuzzy_filter(songs: &[Song], text: &str) -> Vec<Song> {
    let query = normalize_key(text);
    if query.is_empty() {
        return Vec::new();
    }
    songs
        .iter()
        .filter(|song| fuzzy_matches(song, &query))
        .cloned()
        .collect()
}

/// Words seen in the catalog, used to correct misspelled queries word by
/// word.
#[derive(Debug, Clone, Default)]
pub struct Vocabulary {
    words: Vec<String>,
    known: HashSet<String>,
    by_length: HashMap<usize, Vec<usize>>,
}

impl Vocabulary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_word(&mut self, word: &str) {
        let word = word.to_lowercase();
        let length = word.chars().count();
        if length < 2 || self.known.contains(&word) {
            return;
        }
        self.by_length.entry(length).or_default().push(self.words.len());
        self.known.insert(word.clone());
        self.words.push(word);
    }

    /// Add every word of `text`, splitting on whitespace and punctuation.
    pub fn add_text(&mut self, text: &str) {
        text.split(|c: char| c.is_whitespace() || c.is_ascii_punctuation())
            .filter(|w| !w.is_empty())
            .for_each(|w| self.add_word(w));
    }

    /// Closest known word within `max_distance`. Equal distances prefer the
    /// candidate whose length is closest to the query's.
    pub fn find_best_match(&self, query: &str, max_distance: usize) -> Option<&str> {
        let query = query.to_lowercase();
        if let Some(word) = self.known.get(&query) {
            return Some(word.as_str());
        }

        let length = query.chars().count();
        let lengths = length.saturating_sub(max_distance)..=length + max_distance;
        lengths
            .filter_map(|len| self.by_length.get(&len))
            .flatten()
            .map(|&index| {
                let word = &self.words[index];
                let distance = levenshtein_distance(&query, word);
                let length_gap = word.chars().count().abs_diff(length);
                (distance, length_gap, index)
            })
            .filter(|(distance, _, _)| *distance <= max_distance)
            .min()
            .map(|(_, _, index)| self.words[index].as_str())
    }

    /// Replace each word of `query` by its best match, keeping unknown words.
    pub fn correct_query(&self, query: &str, max_distance: usize) -> String {
        query
            .split_whitespace()
            .map(|word| self.find_best_match(word, max_distance).unwrap_or(word))
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_levenshtein_distance() {
        assert_eq!(levenshtein_distance("radiohead", "radiohead"), 0);
        assert_eq!(levenshtein_distance("radiohead", "radiohed"), 1);
        assert_eq!(levenshtein_distance("karma", "karmapolice"), 6);
        assert_eq!(levenshtein_distance("", "abc"), 3);
        assert_eq!(levenshtein_distance("abc", ""), 3);
        assert_eq!(levenshtein_distance("björk", "bjork"), 1);
    }

    #[test]
    fn test_fuzzy_filter_threshold() {
        let songs = vec![
            Song::new("Creep", "Radiohead"),
            Song::new("Karma Police", "Radiohead"),
            Song::new("Crepe Recipe", "Chef Boyardee"),
        ];

        let hits = fuzzy_filter(&songs, "crep");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].title, "Creep");

        // one letter off on the artist name, punctuation ignored
        let hits = fuzzy_filter(&songs, "Radiohed!!");
        assert_eq!(hits.len(), 2);

        // distance exactly 3 is rejected
        assert!(fuzzy_filter(&songs, "cr").is_empty());
        assert!(fuzzy_filter(&songs, "  ").is_empty());
    }

    #[test]
    fn test_vocabulary_correction() {
        let mut vocab = Vocabulary::new();
        vocab.add_text("Karma Police");
        vocab.add_text("Radiohead - Paranoid Android");
        assert_eq!(vocab.len(), 5);

        assert_eq!(vocab.find_best_match("Polise", 2), Some("police"));
        assert_eq!(vocab.find_best_match("zzz", 1), None);
        assert_eq!(
            vocab.correct_query("paranid andriod xyz", 2),
            "paranoid android xyz"
        );
    }

    #[test]
    fn test_tie_prefers_same_length() {
        let mut vocab = Vocabulary::new();
        vocab.add_word("ode");
        vocab.add_word("code");
        assert_eq!(vocab.find_best_match("mode", 1), Some("code"));
    }
}
