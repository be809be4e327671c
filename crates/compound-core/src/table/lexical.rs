use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::TranslationTable;

/// In-memory translation table for one direction.
///
/// Inner maps are ordered so that candidate enumeration is deterministic.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LexicalTable {
    pub(super) entries: BTreeMap<String, BTreeMap<String, f64>>,
}

impl LexicalTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from `(source, target, score)` triples. Later duplicates win.
    pub fn from_entries<S, T>(entries: impl IntoIterator<Item = (S, T, f64)>) -> Self
    where
        S: Into<String>,
        T: Into<String>,
    {
        let mut table = Self::new();
        for (source, target, score) in entries {
            table.insert(source, target, score);
        }
        table
    }

    pub fn insert(&mut self, source: impl Into<String>, target: impl Into<String>, score: f64) {
        self.entries
            .entry(source.into())
            .or_default()
            .insert(target.into(), score);
    }

    /// Iterate over all `(source, target, score)` triples in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str, f64)> {
        self.entries.iter().flat_map(|(source, targets)| {
            targets
                .iter()
                .map(move |(target, &score)| (source.as_str(), target.as_str(), score))
        })
    }

    /// Returns (source_count, pair_count).
    pub fn stats(&self) -> (usize, usize) {
        let sources = self.entries.len();
        let pairs: usize = self.entries.values().map(|v| v.len()).sum();
        (sources, pairs)
    }

    /// The same pairs with source and target swapped.
    pub fn inverted(&self) -> Self {
        Self::from_entries(self.iter().map(|(s, t, score)| (t, s, score)))
    }
}

impl TranslationTable for LexicalTable {
    fn translations(&self, word: &str) -> Vec<(&str, f64)> {
        self.entries
            .get(word)
            .map(|targets| {
                targets
                    .iter()
                    .map(|(target, &score)| (target.as_str(), score))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn score(&self, source: &str, target: &str) -> Option<f64> {
        self.entries.get(source)?.get(target).copied()
    }
}
