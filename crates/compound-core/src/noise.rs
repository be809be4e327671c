//! Background distributions over derivations, used as NCE negatives.

use rand::distributions::{Distribution, WeightedIndex};
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::derivation::{non_null_positions, Derivation};
use crate::features::SuffixVocabulary;
use crate::settings::settings;
use crate::table::TranslationTable;

/// Draws derivations independently of the trainable weights.
pub trait NoiseModel {
    fn sample(&mut self, source: &[String]) -> Derivation;

    fn sample_n(&mut self, source: &[String], n: usize) -> Vec<Derivation> {
        (0..n).map(|_| self.sample(source)).collect()
    }
}

/// Per-word independent choices from the forward table.
///
/// A word is null with probability `null_probability` (always, when it has no
/// translations); otherwise its translation is drawn in proportion to
/// `exp(forward score)`. Placed words get a uniformly drawn known suffix and
/// a uniformly shuffled order. At least one word is placed whenever any word
/// can be.
pub struct UnigramNoise<'a> {
    table: &'a dyn TranslationTable,
    suffixes: Vec<String>,
    null_probability: f64,
    rng: ChaCha8Rng,
}

impl<'a> UnigramNoise<'a> {
    pub fn new(table: &'a dyn TranslationTable, suffixes: &SuffixVocabulary) -> Self {
        let s = &settings().noise;
        Self {
            table,
            suffixes: suffixes.iter().map(str::to_string).collect(),
            null_probability: s.null_probability,
            rng: ChaCha8Rng::seed_from_u64(s.seed),
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = ChaCha8Rng::seed_from_u64(seed);
        self
    }

    pub fn with_null_probability(mut self, p: f64) -> Self {
        self.null_probability = p.clamp(0.0, 1.0);
        self
    }
}

impl NoiseModel for UnigramNoise<'_> {
    fn sample(&mut self, source: &[String]) -> Derivation {
        let table = self.table;
        let options: Vec<Vec<(&str, f64)>> = source
            .iter()
            .map(|word| {
                table
                    .translations(word)
                    .into_iter()
                    .filter(|(t, _)| !t.is_empty())
                    .collect()
            })
            .collect();

        let mut translations = vec![String::new(); source.len()];
        for (i, choices) in options.iter().enumerate() {
            if choices.is_empty() || self.rng.gen_bool(self.null_probability) {
                continue;
            }
            translations[i] = draw(&mut self.rng, choices);
        }

        if translations.iter().all(String::is_empty) {
            let translatable: Vec<usize> = (0..source.len())
                .filter(|&i| !options[i].is_empty())
                .collect();
            if let Some(&i) = translatable.choose(&mut self.rng) {
                translations[i] = draw(&mut self.rng, &options[i]);
            }
        }

        let mut permutation = non_null_positions(&translations);
        let mut suffixes = vec![String::new(); source.len()];
        for &i in &permutation {
            if let Some(suffix) = self.suffixes.choose(&mut self.rng) {
                suffixes[i] = suffix.clone();
            }
        }
        permutation.shuffle(&mut self.rng);

        Derivation::new(translations, suffixes, permutation)
    }
}

/// A target drawn in proportion to `exp(score)`.
fn draw(rng: &mut ChaCha8Rng, choices: &[(&str, f64)]) -> String {
    let max = choices
        .iter()
        .map(|&(_, s)| s)
        .fold(f64::NEG_INFINITY, f64::max);
    let weights: Vec<f64> = choices.iter().map(|&(_, s)| (s - max).exp()).collect();
    let i = match WeightedIndex::new(&weights) {
        Ok(dist) => dist.sample(rng),
        Err(_) => rng.gen_range(0..choices.len()),
    };
    choices[i].0.to_string()
}
