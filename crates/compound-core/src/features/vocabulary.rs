use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::derivation::Derivation;

/// Every suffix the model knows about.
///
/// Built once from the enumerated training derivations and then shared by
/// reference with the partition functions and the decoder, which sum or
/// search over all known suffixes. The empty suffix is always present since
/// null positions and unsuffixed pieces use it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuffixVocabulary {
    suffixes: BTreeSet<String>,
}

impl Default for SuffixVocabulary {
    fn default() -> Self {
        Self::new()
    }
}

impl SuffixVocabulary {
    pub fn new() -> Self {
        let mut suffixes = BTreeSet::new();
        suffixes.insert(String::new());
        Self { suffixes }
    }

    pub fn from_derivations<'d>(derivations: impl IntoIterator<Item = &'d Derivation>) -> Self {
        let mut vocab = Self::new();
        for d in derivations {
            for suffix in &d.suffixes {
                vocab.insert(suffix);
            }
        }
        vocab
    }

    pub fn insert(&mut self, suffix: &str) -> bool {
        if self.suffixes.contains(suffix) {
            return false;
        }
        self.suffixes.insert(suffix.to_string())
    }

    pub fn contains(&self, suffix: &str) -> bool {
        self.suffixes.contains(suffix)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.suffixes.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.suffixes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.suffixes.is_empty()
    }
}

impl<S: Into<String>> FromIterator<S> for SuffixVocabulary {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut vocab = Self::new();
        vocab.suffixes.extend(iter.into_iter().map(Into::into));
        vocab
    }
}
