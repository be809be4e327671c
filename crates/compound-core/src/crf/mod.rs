//! Log-linear model over derivations.
//!
//! Weights live in a dense vector indexed by [`FeatureIndex`]; every feature a
//! computation touches must be registered first. Scores are plain `f64`
//! evaluations outside training. Inside a training step the same quantities
//! are recorded on a [`Tape`] so the loss can be differentiated.

mod persistence;
mod tape;
mod update;

pub use persistence::ModelSnapshot;
pub use update::UpdateRule;

use std::iter;

use candle_core::Tensor;
use tracing::{debug, debug_span};

use crate::decoder::{KBestDecoder, ScoredDerivation};
use crate::derivation::{cross, non_null_positions, permutations, Derivation, DerivationError};
use crate::features::{
    source_null_feature, suffix_feature, FeatureIndex, FeatureScorer, FeatureVector,
    SuffixVocabulary, FWD_SCORE, MONOTONE, REV_SCORE, TGT_NULL,
};
use crate::settings::settings;
use tape::{log_sum_exp, SparseRow, Tape};
use update::Optimizer;

/// Largest `|p(D=0) + p(D=1) - 1|` tolerated by the NCE check.
const NCE_TOLERANCE: f64 = 1e-4;

#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("feature '{0}' used before it was registered")]
    UnknownFeature(String),

    #[error("gold score {gold} is not below the partition function {partition}")]
    GoldExceedsPartition { gold: f64, partition: f64 },

    #[error("NCE probabilities of sample {index} sum to {total} (model {model}, noise {noise})")]
    NceInconsistent {
        index: usize,
        total: f64,
        model: f64,
        noise: f64,
    },

    #[error("{what} is not finite: {value}")]
    NonFinite { what: &'static str, value: f64 },

    #[error("source has {len} words but the exact partition function supports at most {max}")]
    SourceTooLong { len: usize, max: usize },

    #[error("batch has {sources} sources but {targets} targets")]
    BatchMismatch { sources: usize, targets: usize },

    #[error("NCE needs at least one noise sample")]
    NoNoiseSamples,

    #[error("expected {expected} weights, got {found}")]
    WeightCount { expected: usize, found: usize },

    #[error("invalid model file: {0}")]
    Snapshot(String),

    #[error(transparent)]
    Derivation(#[from] DerivationError),

    #[error("differentiation engine error: {0}")]
    Tensor(#[from] candle_core::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Bincode(#[from] bincode::Error),
}

pub struct CrfModel<'a> {
    scorer: FeatureScorer<'a>,
    suffixes: SuffixVocabulary,
    index: FeatureIndex,
    weights: Vec<f64>,
    optimizer: Optimizer,
    initial_weight: f64,
    max_source_len: usize,
    noise_oov_score: f64,
}

impl<'a> CrfModel<'a> {
    /// A model over `suffixes`, with the fixed features and one feature per
    /// known suffix registered.
    pub fn new(scorer: FeatureScorer<'a>, suffixes: SuffixVocabulary) -> Self {
        let s = settings();
        let mut model = Self {
            scorer,
            suffixes,
            index: FeatureIndex::new(),
            weights: Vec::new(),
            optimizer: Optimizer::from_settings(),
            initial_weight: s.training.initial_weight,
            max_source_len: s.training.max_source_len,
            noise_oov_score: s.noise.oov_score,
        };
        for name in [TGT_NULL, FWD_SCORE, REV_SCORE, MONOTONE] {
            model.add_feature(name);
        }
        let suffix_names: Vec<String> = model.suffixes.iter().map(suffix_feature).collect();
        for name in &suffix_names {
            model.add_feature(name);
        }
        model
    }

    pub fn with_update_rule(mut self, rule: UpdateRule) -> Self {
        self.optimizer.set_rule(rule);
        self
    }

    pub fn update_rule(&self) -> UpdateRule {
        self.optimizer.rule()
    }

    /// Register `name` with the initial weight. Returns false if it was known.
    pub fn add_feature(&mut self, name: &str) -> bool {
        let (_, is_new) = self.index.register(name);
        if is_new {
            self.weights.push(self.initial_weight);
            self.optimizer.register();
        }
        is_new
    }

    /// Register the per-word null features of `source`.
    pub fn register_source(&mut self, source: &[String]) {
        for word in source {
            self.add_feature(&source_null_feature(word));
        }
    }

    /// Register every feature `derivation` fires.
    pub fn register_derivation(
        &mut self,
        source: &[String],
        derivation: &Derivation,
    ) -> Result<(), ModelError> {
        let features = self.scorer.score(source, derivation)?;
        for name in features.names() {
            self.add_feature(name);
        }
        Ok(())
    }

    pub fn feature_id(&self, name: &str) -> Result<usize, ModelError> {
        self.index
            .id(name)
            .ok_or_else(|| ModelError::UnknownFeature(name.to_string()))
    }

    pub fn weight(&self, name: &str) -> Option<f64> {
        self.index.id(name).map(|id| self.weights[id])
    }

    pub fn set_weight(&mut self, name: &str, value: f64) -> Result<(), ModelError> {
        let id = self.feature_id(name)?;
        self.weights[id] = value;
        Ok(())
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    pub fn feature_names(&self) -> &[String] {
        self.index.names()
    }

    pub fn feature_count(&self) -> usize {
        self.index.len()
    }

    /// `(name, weight)` pairs with a non-zero weight, in registration order.
    pub fn nonzero_weights(&self) -> impl Iterator<Item = (&str, f64)> {
        self.index
            .names()
            .iter()
            .zip(&self.weights)
            .filter(|(_, &w)| w != 0.0)
            .map(|(name, &w)| (name.as_str(), w))
    }

    pub fn suffixes(&self) -> &SuffixVocabulary {
        &self.suffixes
    }

    pub fn scorer(&self) -> &FeatureScorer<'a> {
        &self.scorer
    }

    /// Resolve names to dense ids, failing on the first unregistered one.
    fn resolve(&self, features: &FeatureVector) -> Result<SparseRow, ModelError> {
        let mut row = Vec::with_capacity(features.len());
        for (name, value) in features.iter() {
            let id = self.feature_id(name)?;
            if value != 0.0 {
                row.push((id, value));
            }
        }
        Ok(row)
    }

    fn value_with(&self, weights: &[f64], features: &FeatureVector) -> Result<f64, ModelError> {
        Ok(self
            .resolve(features)?
            .into_iter()
            .map(|(id, value)| weights[id] * value)
            .sum())
    }

    /// Weighted sum where unregistered features count as weight zero.
    pub fn lenient_value(&self, features: &FeatureVector) -> f64 {
        features
            .iter()
            .filter_map(|(name, value)| self.index.id(name).map(|id| self.weights[id] * value))
            .sum()
    }

    /// `w · f(source, derivation)` under the current weights.
    pub fn score(&self, source: &[String], derivation: &Derivation) -> Result<f64, ModelError> {
        let features = self.scorer.score(source, derivation)?;
        self.value_with(&self.weights, &features)
    }

    /// Fixed background score: the forward table score of every position.
    ///
    /// A null position is an unknown pair and takes the noise OOV floor.
    pub fn score_noise(
        &self,
        source: &[String],
        derivation: &Derivation,
    ) -> Result<f64, ModelError> {
        derivation.validate(source.len())?;
        let fwd = self.scorer.forward_table();
        Ok(source
            .iter()
            .zip(&derivation.translations)
            .map(|(word, translation)| {
                fwd.score(word, translation)
                    .unwrap_or(self.noise_oov_score)
            })
            .sum())
    }

    /// `lambda * Σ w²` over every registered weight.
    pub fn l2penalty(&self, lambda: f64) -> f64 {
        lambda * self.weights.iter().map(|w| w * w).sum::<f64>()
    }

    /// Candidate targets of every source word: the null option first, then
    /// every forward-table translation.
    fn candidate_targets(&self, source: &[String]) -> Vec<Vec<String>> {
        let fwd = self.scorer.forward_table();
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
                targets
            })
            .collect()
    }

    fn check_source_len(&self, source: &[String]) -> Result<(), ModelError> {
        if source.len() > self.max_source_len {
            return Err(ModelError::SourceTooLong {
                len: source.len(),
                max: self.max_source_len,
            });
        }
        Ok(())
    }

    /// Log partition function over every derivation of `source`, including
    /// the one where every word is null.
    pub fn partition_function(&self, source: &[String]) -> Result<f64, ModelError> {
        let tape = Tape::record(&self.weights)?;
        let z = self.partition_tensor(&tape, source)?;
        Ok(z.to_scalar::<f64>()?)
    }

    /// Exact log partition function without enumerating derivations.
    ///
    /// A position contributes either its null score or the log-sum over all
    /// its (translation, suffix) pairs, and the two factor since suffix
    /// features do not depend on the translation. A subset of `k` placed
    /// positions has `k!` orderings of which exactly one is monotone, so its
    /// ordering mass is `exp(w_monotone) + k! - 1`. The result is the
    /// log-sum over all `2^n` subsets, computed as one matrix product.
    fn partition_tensor(&self, tape: &Tape, source: &[String]) -> Result<Tensor, ModelError> {
        self.check_source_len(source)?;
        let _span = debug_span!("partition", words = source.len()).entered();

        let targets = self.candidate_targets(source);
        let suffix_count = self.suffixes.len();

        // [suffixes..., null suffix, per word: (null, translations...)]
        let mut rows: Vec<SparseRow> = Vec::new();
        for suffix in self.suffixes.iter() {
            rows.push(self.resolve(&self.scorer.score_suffix("", suffix))?);
        }
        rows.push(self.resolve(&self.scorer.score_suffix("", ""))?);
        for (word, candidates) in source.iter().zip(&targets) {
            for target in candidates {
                rows.push(self.resolve(&self.scorer.score_translation(word, target))?);
            }
        }
        let scores = tape.dot_batch(&rows)?;

        let suffix_mass = log_sum_exp(&scores.narrow(0, 0, suffix_count)?)?;
        let null_suffix = scores.get(suffix_count)?;

        let mut forced = Vec::new();
        let mut included = Vec::new();
        let mut excluded = Vec::new();
        let mut offset = suffix_count + 1;
        for candidates in &targets {
            let null = scores.get(offset)?.add(&null_suffix)?;
            let translations = candidates.len() - 1;
            if translations == 0 {
                forced.push(null);
            } else {
                let word = log_sum_exp(&scores.narrow(0, offset + 1, translations)?)?
                    .add(&suffix_mass)?;
                included.push(word);
                excluded.push(null);
            }
            offset += candidates.len();
        }

        let base = if forced.is_empty() {
            tape.constant(0.0)?
        } else {
            Tensor::stack(&forced, 0)?.sum_all()?
        };

        let m = included.len();
        let monotone = tape.weight(self.feature_id(MONOTONE)?)?;
        let extra: Vec<f64> = (0..=m).map(|k| factorial(k) - 1.0).collect();
        let orderings = tape
            .constants(extra)?
            .broadcast_add(&monotone.exp()?)?
            .log()?;
        if m == 0 {
            return Ok(base.add(&orderings.get(0)?)?);
        }

        let subsets = 1usize << m;
        let mut incl = vec![0.0; subsets * m];
        let mut excl = vec![0.0; subsets * m];
        let mut count = vec![0.0; subsets * (m + 1)];
        for mask in 0..subsets {
            for j in 0..m {
                if mask >> j & 1 == 1 {
                    incl[mask * m + j] = 1.0;
                } else {
                    excl[mask * m + j] = 1.0;
                }
            }
            count[mask * (m + 1) + mask.count_ones() as usize] = 1.0;
        }

        let word = Tensor::stack(&included, 0)?.reshape((m, 1))?;
        let null = Tensor::stack(&excluded, 0)?.reshape((m, 1))?;
        let totals = tape
            .matrix(incl, subsets, m)?
            .matmul(&word)?
            .add(&tape.matrix(excl, subsets, m)?.matmul(&null)?)?
            .add(
                &tape
                    .matrix(count, subsets, m + 1)?
                    .matmul(&orderings.reshape((m + 1, 1))?)?,
            )?
            .reshape(subsets)?;

        let z = log_sum_exp(&totals)?.add(&base)?;
        debug!(open = m, forced = forced.len(), "partition computed");
        Ok(z)
    }

    /// Log partition function by explicit enumeration, scored with `weights`.
    ///
    /// Every candidate combination, every suffix assignment of the placed
    /// positions and every ordering is built as a [`Derivation`] and scored.
    /// Only practical for tiny inputs; used to check [`Self::partition_function`].
    pub fn slow_partition_function(
        &self,
        source: &[String],
        weights: &[f64],
    ) -> Result<f64, ModelError> {
        if weights.len() != self.weights.len() {
            return Err(ModelError::WeightCount {
                expected: self.weights.len(),
                found: weights.len(),
            });
        }
        let vocabulary: Vec<String> = self.suffixes.iter().map(str::to_string).collect();
        let mut scores = Vec::new();
        for translations in cross(&self.candidate_targets(source)) {
            let placed = non_null_positions(&translations);
            let choices: Vec<Vec<String>> = placed.iter().map(|_| vocabulary.clone()).collect();
            for choice in cross(&choices) {
                let mut suffixes = vec![String::new(); source.len()];
                for (&i, suffix) in placed.iter().zip(choice) {
                    suffixes[i] = suffix;
                }
                for permutation in permutations(&placed) {
                    let derivation =
                        Derivation::new(translations.clone(), suffixes.clone(), permutation);
                    let features = self.scorer.score(source, &derivation)?;
                    scores.push(self.value_with(weights, &features)?);
                }
            }
        }
        debug!(derivations = scores.len(), "brute-force partition");
        Ok(log_sum_exp_values(&scores))
    }

    /// Negated NCE log-likelihood of one gold derivation against its noise samples.
    pub fn nce_loss(
        &self,
        source: &[String],
        gold: &Derivation,
        noise: &[Derivation],
    ) -> Result<f64, ModelError> {
        let tape = Tape::record(&self.weights)?;
        Ok(self.nce_tensor(&tape, source, gold, noise)?.to_scalar::<f64>()?)
    }

    fn nce_tensor(
        &self,
        tape: &Tape,
        source: &[String],
        gold: &Derivation,
        noise: &[Derivation],
    ) -> Result<Tensor, ModelError> {
        if noise.is_empty() {
            return Err(ModelError::NoNoiseSamples);
        }
        let log_k = (noise.len() as f64).ln();

        let mut rows = Vec::with_capacity(noise.len() + 1);
        let mut offsets = Vec::with_capacity(noise.len() + 1);
        for derivation in iter::once(gold).chain(noise) {
            rows.push(self.resolve(&self.scorer.score(source, derivation)?)?);
            offsets.push(self.score_noise(source, derivation)? + log_k);
        }
        let model = tape.dot_batch(&rows)?;
        let model_values = model.to_vec1::<f64>()?;
        if let Some(&value) = model_values.iter().find(|v| !v.is_finite()) {
            return Err(ModelError::NonFinite {
                what: "model score",
                value,
            });
        }

        // log(exp(s) + exp(c)), shifted per sample by max(s, c)
        let shift: Vec<f64> = model_values
            .iter()
            .zip(&offsets)
            .map(|(&s, &c)| s.max(c))
            .collect();
        let shift = tape.constants(shift)?;
        let background = tape.constants(offsets.clone())?;
        let denominator = model
            .sub(&shift)?
            .exp()?
            .add(&background.sub(&shift)?.exp()?)?
            .log()?
            .add(&shift)?;
        let positive = model.sub(&denominator)?;
        let negative = background.sub(&denominator)?;

        let p1 = positive.to_vec1::<f64>()?;
        let p0 = negative.to_vec1::<f64>()?;
        for (index, (&a, &b)) in p1.iter().zip(&p0).enumerate() {
            let total = a.exp() + b.exp();
            if !((total - 1.0).abs() < NCE_TOLERANCE) {
                return Err(ModelError::NceInconsistent {
                    index,
                    total,
                    model: model_values[index],
                    noise: offsets[index],
                });
            }
        }

        let log_likelihood = positive
            .narrow(0, 0, 1)?
            .sum_all()?
            .add(&negative.narrow(0, 1, noise.len())?.sum_all()?)?;
        Ok(log_likelihood.neg()?)
    }

    fn likelihood_objective(
        &self,
        tape: &Tape,
        sources: &[Vec<String>],
        golds: &[Derivation],
        l2_strength: f64,
    ) -> Result<Tensor, ModelError> {
        check_batch(sources.len(), golds.len())?;
        let mut terms = Vec::with_capacity(sources.len());
        for (source, gold) in sources.iter().zip(golds) {
            let row = self.resolve(&self.scorer.score(source, gold)?)?;
            let gold_score = tape.dot_batch(&[row])?.sum_all()?;
            let partition = self.partition_tensor(tape, source)?;

            let g = gold_score.to_scalar::<f64>()?;
            let z = partition.to_scalar::<f64>()?;
            if !z.is_finite() {
                return Err(ModelError::NonFinite {
                    what: "partition function",
                    value: z,
                });
            }
            if g >= z {
                return Err(ModelError::GoldExceedsPartition {
                    gold: g,
                    partition: z,
                });
            }
            terms.push(partition.sub(&gold_score)?);
        }
        self.regularized_total(tape, terms, l2_strength)
    }

    fn nce_objective(
        &self,
        tape: &Tape,
        sources: &[Vec<String>],
        golds: &[Derivation],
        noise: &[Vec<Derivation>],
        l2_strength: f64,
    ) -> Result<Tensor, ModelError> {
        check_batch(sources.len(), golds.len())?;
        check_batch(sources.len(), noise.len())?;
        let mut terms = Vec::with_capacity(sources.len());
        for ((source, gold), samples) in sources.iter().zip(golds).zip(noise) {
            terms.push(self.nce_tensor(tape, source, gold, samples)?);
        }
        self.regularized_total(tape, terms, l2_strength)
    }

    fn regularized_total(
        &self,
        tape: &Tape,
        terms: Vec<Tensor>,
        l2_strength: f64,
    ) -> Result<Tensor, ModelError> {
        // One stacked sum keeps the backward graph shallow.
        let data = if terms.is_empty() {
            tape.constant(0.0)?
        } else {
            Tensor::stack(&terms, 0)?.sum_all()?
        };
        Ok(data.add(&tape.squared_norm()?.affine(l2_strength, 0.0)?)?)
    }

    /// Full-batch maximum-likelihood loss `Σ (Z(x) - score(gold)) + L2`.
    pub fn likelihood_loss(
        &self,
        sources: &[Vec<String>],
        golds: &[Derivation],
        l2_strength: f64,
    ) -> Result<f64, ModelError> {
        let tape = Tape::record(&self.weights)?;
        let loss = self.likelihood_objective(&tape, sources, golds, l2_strength)?;
        Ok(loss.to_scalar::<f64>()?)
    }

    /// Full-batch NCE loss `Σ nce_loss + L2`.
    pub fn nce_batch_loss(
        &self,
        sources: &[Vec<String>],
        golds: &[Derivation],
        noise: &[Vec<Derivation>],
        l2_strength: f64,
    ) -> Result<f64, ModelError> {
        let tape = Tape::record(&self.weights)?;
        let loss = self.nce_objective(&tape, sources, golds, noise, l2_strength)?;
        Ok(loss.to_scalar::<f64>()?)
    }

    /// One maximum-likelihood step. Returns the loss before the update.
    pub fn train_likelihood(
        &mut self,
        sources: &[Vec<String>],
        golds: &[Derivation],
        learning_rate: f64,
        l2_strength: f64,
    ) -> Result<f64, ModelError> {
        let _span = debug_span!("train_likelihood", examples = sources.len()).entered();
        let tape = Tape::record(&self.weights)?;
        let loss = self.likelihood_objective(&tape, sources, golds, l2_strength)?;
        self.apply(tape, &loss, learning_rate)
    }

    /// One NCE step with precomputed noise samples. Returns the loss before the update.
    pub fn train_nce(
        &mut self,
        sources: &[Vec<String>],
        golds: &[Derivation],
        noise: &[Vec<Derivation>],
        learning_rate: f64,
        l2_strength: f64,
    ) -> Result<f64, ModelError> {
        let _span = debug_span!("train_nce", examples = sources.len()).entered();
        let tape = Tape::record(&self.weights)?;
        let loss = self.nce_objective(&tape, sources, golds, noise, l2_strength)?;
        self.apply(tape, &loss, learning_rate)
    }

    fn apply(&mut self, tape: Tape, loss: &Tensor, learning_rate: f64) -> Result<f64, ModelError> {
        let value = loss.to_scalar::<f64>()?;
        if !value.is_finite() {
            return Err(ModelError::NonFinite { what: "loss", value });
        }
        let gradients = tape.gradients(loss)?;
        self.optimizer
            .step(&mut self.weights, &gradients, learning_rate);
        debug!(loss = value, rule = ?self.optimizer.rule(), "weights updated");
        Ok(value)
    }

    /// Top `k` derivations of `source`, best first.
    pub fn predict(&self, source: &[String], k: usize) -> Vec<ScoredDerivation> {
        KBestDecoder::new(self).decode(source, k)
    }
}

fn check_batch(sources: usize, targets: usize) -> Result<(), ModelError> {
    if sources != targets {
        return Err(ModelError::BatchMismatch { sources, targets });
    }
    Ok(())
}

fn factorial(k: usize) -> f64 {
    (1..=k).map(|x| x as f64).product()
}

/// `log Σ exp(v)`; negative infinity for an empty slice.
pub(crate) fn log_sum_exp_values(values: &[f64]) -> f64 {
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if !max.is_finite() {
        return max;
    }
    max + values.iter().map(|v| (v - max).exp()).sum::<f64>().ln()
}
