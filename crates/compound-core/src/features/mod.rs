//! Sparse features of a derivation.
//!
//! Every sub-score is additive over source positions: translation features
//! (null markers, forward and reverse lexical scores), a one-hot suffix
//! feature, and a single permutation feature.

mod index;
mod vocabulary;

pub use index::FeatureIndex;
pub use vocabulary::SuffixVocabulary;

use std::collections::BTreeMap;

use crate::derivation::{is_monotone, Derivation, DerivationError};
use crate::settings::settings;
use crate::table::TranslationTable;

pub const TGT_NULL: &str = "tgt_null";
pub const FWD_SCORE: &str = "fwd_score";
pub const REV_SCORE: &str = "rev_score";
pub const MONOTONE: &str = "monotone";

/// Name of the one-hot feature for `suffix`.
pub fn suffix_feature(suffix: &str) -> String {
    format!("suffix_{suffix}")
}

/// Name of the feature that fires when `source` is left unaligned.
pub fn source_null_feature(source: &str) -> String {
    format!("src_null_{source}")
}

/// Feature name → value, ordered by name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureVector(BTreeMap<String, f64>);

impl FeatureVector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `value` to the feature `name`.
    pub fn add(&mut self, name: impl Into<String>, value: f64) {
        *self.0.entry(name.into()).or_insert(0.0) += value;
    }

    pub fn merge(&mut self, other: FeatureVector) {
        for (name, value) in other.0 {
            self.add(name, value);
        }
    }

    pub fn get(&self, name: &str) -> f64 {
        self.0.get(name).copied().unwrap_or(0.0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.0.iter().map(|(k, &v)| (k.as_str(), v))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, f64)> for FeatureVector {
    fn from_iter<I: IntoIterator<Item = (String, f64)>>(iter: I) -> Self {
        let mut v = Self::new();
        for (name, value) in iter {
            v.add(name, value);
        }
        v
    }
}

/// Maps derivations to feature vectors using a forward and a reverse table.
pub struct FeatureScorer<'a> {
    fwd: &'a dyn TranslationTable,
    rev: &'a dyn TranslationTable,
    oov_score: f64,
}

impl<'a> FeatureScorer<'a> {
    pub fn new(fwd: &'a dyn TranslationTable, rev: &'a dyn TranslationTable) -> Self {
        Self {
            fwd,
            rev,
            oov_score: settings().features.oov_score,
        }
    }

    pub fn with_oov_score(mut self, oov_score: f64) -> Self {
        self.oov_score = oov_score;
        self
    }

    pub fn forward_table(&self) -> &'a dyn TranslationTable {
        self.fwd
    }

    /// Table score of a pair, 0 when either side is empty, the OOV floor when unknown.
    pub fn lexical_score(&self, table: &dyn TranslationTable, source: &str, target: &str) -> f64 {
        if source.is_empty() || target.is_empty() {
            return 0.0;
        }
        table.score(source, target).unwrap_or(self.oov_score)
    }

    pub fn score_translation(&self, source: &str, target: &str) -> FeatureVector {
        let mut features = FeatureVector::new();
        let is_null = target.is_empty();
        features.add(TGT_NULL, if is_null { 1.0 } else { 0.0 });
        if is_null {
            features.add(source_null_feature(source), 1.0);
        }
        features.add(FWD_SCORE, self.lexical_score(self.fwd, source, target));
        features.add(REV_SCORE, self.lexical_score(self.rev, target, source));
        features
    }

    /// One-hot suffix identity. The stem does not influence the feature.
    pub fn score_suffix(&self, _translation: &str, suffix: &str) -> FeatureVector {
        let mut features = FeatureVector::new();
        features.add(suffix_feature(suffix), 1.0);
        features
    }

    pub fn score_permutation(&self, _source: &[String], permutation: &[usize]) -> FeatureVector {
        let mut features = FeatureVector::new();
        features.add(MONOTONE, if is_monotone(permutation) { 1.0 } else { 0.0 });
        features
    }

    /// Full feature vector of a derivation.
    pub fn score(
        &self,
        source: &[String],
        derivation: &Derivation,
    ) -> Result<FeatureVector, DerivationError> {
        derivation.validate(source.len())?;

        let mut features = self.score_permutation(source, &derivation.permutation);
        for (i, word) in source.iter().enumerate() {
            let translation = &derivation.translations[i];
            features.merge(self.score_translation(word, translation));
            features.merge(self.score_suffix(translation, &derivation.suffixes[i]));
        }

        debug_assert_eq!(
            features.get(TGT_NULL) as usize,
            source.len() - derivation.permutation.len()
        );
        debug_assert!({
            let fwd: f64 = derivation
                .permutation
                .iter()
                .map(|&i| self.lexical_score(self.fwd, &source[i], &derivation.translations[i]))
                .sum();
            (features.get(FWD_SCORE) - fwd).abs() < 1e-5
        });
        Ok(features)
    }
}
