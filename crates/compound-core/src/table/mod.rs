//! Translation-table storage.
//!
//! `LexicalTable` stores source → (target, log-probability) mappings for one
//! translation direction. A forward table maps source words to compound
//! stems; a reverse table maps stems back to source words.

mod lexical;
mod lexical_io;

pub use lexical::LexicalTable;

use std::io;

/// Error type for translation-table text parsing and binary I/O.
#[derive(Debug, thiserror::Error)]
pub enum TableError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("invalid header (too short)")]
    InvalidHeader,

    #[error("invalid magic bytes (expected CPTT)")]
    InvalidMagic,

    #[error("unsupported version: {0}")]
    UnsupportedVersion(u8),

    #[error("checksum mismatch (expected {expected:08x}, found {found:08x})")]
    Checksum { expected: u32, found: u32 },

    #[error("serialization error: {0}")]
    Serialize(bincode::Error),

    #[error("deserialization error: {0}")]
    Deserialize(bincode::Error),

    #[error("parse error at line {line}: {reason}")]
    Parse { line: usize, reason: String },
}

/// Word-level translation lookups with log-probability scores.
pub trait TranslationTable: Send + Sync {
    /// All known translations of `word`, sorted by target string.
    ///
    /// Empty when the word is not in the table.
    fn translations(&self, word: &str) -> Vec<(&str, f64)>;

    /// Score of a single pair; `None` means out of vocabulary.
    fn score(&self, source: &str, target: &str) -> Option<f64>;
}
