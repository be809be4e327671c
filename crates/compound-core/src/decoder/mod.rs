//! k-best decoding.
//!
//! Every feature is additive over source positions except `monotone`, which
//! is constant for source-order output. The decoder therefore keeps a short
//! sorted list of the best (translation, suffix) choices per position and
//! walks the product of those lists best-first, expanding one position by one
//! rank at a time.

#[cfg(test)]
mod tests;

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashSet};

use serde::Serialize;
use tracing::{debug, debug_span};

use crate::crf::CrfModel;
use crate::derivation::{non_null_positions, Derivation};
use crate::features::MONOTONE;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredDerivation {
    pub score: f64,
    pub derivation: Derivation,
}

#[derive(Debug, Clone)]
struct LocalChoice {
    score: f64,
    translation: String,
    suffix: String,
}

/// Insert into a list kept sorted by descending score, capped at `k` entries.
/// Equal scores keep their insertion order.
fn insert_top_k(list: &mut Vec<LocalChoice>, k: usize, entry: LocalChoice) {
    let pos = list.partition_point(|e| e.score >= entry.score);
    if pos >= k {
        return;
    }
    list.insert(pos, entry);
    if list.len() > k {
        list.pop();
    }
}

/// A point in the product of the local lists: one rank per position.
#[derive(Debug)]
struct Hypothesis {
    score: f64,
    ranks: Vec<usize>,
}

impl Ord for Hypothesis {
    fn cmp(&self, other: &Self) -> Ordering {
        self.score
            .total_cmp(&other.score)
            // lower ranks first among ties, for a stable output order
            .then_with(|| other.ranks.cmp(&self.ranks))
    }
}

impl PartialOrd for Hypothesis {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Hypothesis {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Hypothesis {}

pub struct KBestDecoder<'m, 'a> {
    model: &'m CrfModel<'a>,
}

impl<'m, 'a> KBestDecoder<'m, 'a> {
    pub fn new(model: &'m CrfModel<'a>) -> Self {
        Self { model }
    }

    /// Best `k` choices per position over every forward-table translation
    /// (plus null) and every known suffix. Null takes only the empty suffix.
    fn local_choices(&self, source: &[String], k: usize) -> Vec<Vec<LocalChoice>> {
        let scorer = self.model.scorer();
        let fwd = scorer.forward_table();
        source
            .iter()
            .map(|word| {
                let mut targets = vec![String::new()];
                targets.extend(
                    fwd.translations(word)
                        .into_iter()
                        .filter(|(t, _)| !t.is_empty())
                        .map(|(t, _)| t.to_string()),
                );

                let mut list = Vec::new();
                for target in targets {
                    let translation_score = self
                        .model
                        .lenient_value(&scorer.score_translation(word, &target));
                    for suffix in self.model.suffixes().iter() {
                        if target.is_empty() && !suffix.is_empty() {
                            continue;
                        }
                        let score = translation_score
                            + self
                                .model
                                .lenient_value(&scorer.score_suffix(&target, suffix));
                        insert_top_k(
                            &mut list,
                            k,
                            LocalChoice {
                                score,
                                translation: target.clone(),
                                suffix: suffix.to_string(),
                            },
                        );
                    }
                }
                list
            })
            .collect()
    }

    /// Top `k` derivations of `source`, best first, never all-null.
    ///
    /// Pieces are placed in source order. Nothing checks that they tile any
    /// particular compound; callers holding a reference compound compare
    /// [`Derivation::reconstruct`] against it.
    pub fn decode(&self, source: &[String], k: usize) -> Vec<ScoredDerivation> {
        if k == 0 || source.is_empty() {
            return Vec::new();
        }
        let _span = debug_span!("decode", words = source.len(), k).entered();

        // One extra rank per position: the all-null hypothesis is skipped, so
        // a k-th result may sit one rank deeper than k-1.
        let local = self.local_choices(source, k.saturating_add(1));
        let monotone = self.model.weight(MONOTONE).unwrap_or(0.0);
        let total = |ranks: &[usize]| -> f64 {
            ranks
                .iter()
                .zip(&local)
                .map(|(&r, choices)| choices[r].score)
                .sum()
        };

        let start = vec![0usize; source.len()];
        let mut seen: HashSet<Vec<usize>> = HashSet::new();
        seen.insert(start.clone());
        let mut frontier = BinaryHeap::new();
        frontier.push(Hypothesis {
            score: total(&start),
            ranks: start,
        });

        let mut results = Vec::new();
        let mut popped = 0usize;
        while let Some(hypothesis) = frontier.pop() {
            popped += 1;
            if let Some(derivation) = build(&local, &hypothesis.ranks) {
                results.push(ScoredDerivation {
                    score: hypothesis.score + monotone,
                    derivation,
                });
                if results.len() == k {
                    break;
                }
            }

            for i in 0..hypothesis.ranks.len() {
                if hypothesis.ranks[i] + 1 >= local[i].len() {
                    continue;
                }
                let mut ranks = hypothesis.ranks.clone();
                ranks[i] += 1;
                if seen.insert(ranks.clone()) {
                    frontier.push(Hypothesis {
                        score: total(&ranks),
                        ranks,
                    });
                }
            }
        }

        debug!(
            popped,
            results = results.len(),
            best = results.first().map(|r| r.score),
            "decoded"
        );
        results
    }
}

/// The derivation selected by `ranks`, or `None` when every position is null.
fn build(local: &[Vec<LocalChoice>], ranks: &[usize]) -> Option<Derivation> {
    let (translations, suffixes): (Vec<String>, Vec<String>) = ranks
        .iter()
        .zip(local)
        .map(|(&r, choices)| (choices[r].translation.clone(), choices[r].suffix.clone()))
        .unzip();
    let permutation = non_null_positions(&translations);
    if permutation.is_empty() {
        return None;
    }
    Some(Derivation::new(translations, suffixes, permutation))
}
