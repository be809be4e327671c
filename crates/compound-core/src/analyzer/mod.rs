//! Compound analysis: tiling a compound with stem pieces, and enumerating
//! every derivation of a compound from a source sentence.

#[cfg(test)]
mod tests;

use tracing::{debug, debug_span, trace};

use crate::derivation::{cross, next_permutation, non_null_positions, Derivation};
use crate::table::TranslationTable;

/// Tile `compound` with `pieces` taken in `permutation` order.
///
/// Each piece is matched at its leftmost occurrence in the unconsumed
/// remainder. The first piece must start the compound. Text skipped before a
/// later piece becomes the suffix of the previous piece, and whatever is left
/// after the last piece becomes its suffix. Returns one suffix per piece
/// position (empty for positions outside `permutation`), or `None` when the
/// pieces cannot tile the compound in this order.
pub fn decompose(compound: &str, pieces: &[String], permutation: &[usize]) -> Option<Vec<String>> {
    let mut suffixes = vec![String::new(); pieces.len()];
    let mut remainder = compound;
    let mut previous: Option<usize> = None;

    for &j in permutation {
        let piece = pieces[j].as_str();
        debug_assert!(!piece.is_empty(), "null pieces are never placed");
        let location = remainder.find(piece)?;
        let (gap, rest) = remainder.split_at(location);
        match previous {
            None if !gap.is_empty() => return None,
            None => {}
            Some(prev) => suffixes[prev] = gap.to_string(),
        }
        remainder = &rest[piece.len()..];
        previous = Some(j);
    }

    if let Some(last) = previous {
        suffixes[last] = remainder.to_string();
    }
    Some(suffixes)
}

/// Enumerates the derivations of a compound against a forward translation table.
pub struct CompoundAnalyzer<'a> {
    table: &'a dyn TranslationTable,
}

impl<'a> CompoundAnalyzer<'a> {
    pub fn new(table: &'a dyn TranslationTable) -> Self {
        Self { table }
    }

    /// Per source word: the null option followed by every translation that
    /// occurs somewhere in `compound`.
    pub fn candidate_translations(&self, source: &[String], compound: &str) -> Vec<Vec<String>> {
        source
            .iter()
            .map(|word| {
                let mut candidates = vec![String::new()];
                candidates.extend(
                    self.table
                        .translations(word)
                        .into_iter()
                        .filter(|(t, _)| !t.is_empty() && compound.contains(t))
                        .map(|(t, _)| t.to_string()),
                );
                candidates
            })
            .collect()
    }

    /// Every derivation that reconstructs `compound` from `source`.
    ///
    /// Combinations where every word is null are skipped. The number of
    /// orderings tried per combination is factorial in the number of
    /// non-null words, so callers bound the source length.
    pub fn analyze(&self, source: &[String], compound: &str) -> Vec<Derivation> {
        let _span = debug_span!("analyze", words = source.len(), compound).entered();
        let candidates = self.candidate_translations(source, compound);

        let mut derivations = Vec::new();
        let mut attempts = 0usize;
        for translations in cross(&candidates) {
            let mut indices = non_null_positions(&translations);
            if indices.is_empty() {
                continue;
            }
            loop {
                attempts += 1;
                if let Some(suffixes) = decompose(compound, &translations, &indices) {
                    trace!(?translations, ?indices, "decomposed");
                    derivations.push(Derivation::new(
                        translations.clone(),
                        suffixes,
                        indices.clone(),
                    ));
                }
                if !next_permutation(&mut indices) {
                    break;
                }
            }
        }

        debug!(attempts, derivation_count = derivations.len());
        derivations
    }
}
