//! Training-set preparation and the full-batch training loop.
//!
//! Preparation enumerates every example once, drops the ones no derivation
//! can explain, builds the suffix vocabulary and registers every feature the
//! loop will touch. The loop itself then runs over a fixed feature set.

use rand::distributions::{Distribution, WeightedError, WeightedIndex};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::{debug, info, warn};

use crate::analyzer::CompoundAnalyzer;
use crate::crf::{CrfModel, ModelError, UpdateRule};
use crate::derivation::Derivation;
use crate::features::{FeatureScorer, SuffixVocabulary};
use crate::noise::{NoiseModel, UnigramNoise};
use crate::settings::{settings, Objective};

#[derive(Debug, thiserror::Error)]
pub enum TrainError {
    #[error(transparent)]
    Model(#[from] ModelError),

    #[error("no reachable training examples")]
    NoExamples,

    #[error("cannot sample a gold derivation: {0}")]
    Sampling(#[from] WeightedError),
}

/// One source sentence, its compound, and every derivation explaining it.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingExample {
    pub source: Vec<String>,
    pub compound: String,
    pub derivations: Vec<Derivation>,
}

/// Enumerate derivations for every `(source, compound)` pair.
///
/// Pairs with an empty source or more than `max_source_len` words are
/// dropped, as are pairs with no derivation at all.
pub fn prepare_examples<I>(
    analyzer: &CompoundAnalyzer<'_>,
    pairs: I,
    max_source_len: usize,
) -> Vec<TrainingExample>
where
    I: IntoIterator<Item = (Vec<String>, String)>,
{
    let mut examples = Vec::new();
    let mut too_long = 0usize;
    let mut unreachable = 0usize;
    for (source, compound) in pairs {
        if source.is_empty() || source.len() > max_source_len {
            warn!(words = source.len(), %compound, "source length out of range, skipped");
            too_long += 1;
            continue;
        }
        let derivations = analyzer.analyze(&source, &compound);
        if derivations.is_empty() {
            debug!(?source, %compound, "unreachable example removed");
            unreachable += 1;
            continue;
        }
        examples.push(TrainingExample {
            source,
            compound,
            derivations,
        });
    }
    info!(
        reachable = examples.len(),
        unreachable, too_long, "training data analyzed"
    );
    examples
}

/// Index of a derivation drawn with probability proportional to `exp(score)`.
pub fn sample_derivation<R: Rng + ?Sized>(
    model: &CrfModel<'_>,
    source: &[String],
    derivations: &[Derivation],
    rng: &mut R,
) -> Result<usize, TrainError> {
    let scores = derivations
        .iter()
        .map(|d| model.score(source, d))
        .collect::<Result<Vec<f64>, _>>()?;
    let max = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if let Some(&value) = scores.iter().find(|s| !s.is_finite()) {
        return Err(ModelError::NonFinite {
            what: "derivation score",
            value,
        }
        .into());
    }
    let weights: Vec<f64> = scores.iter().map(|s| (s - max).exp()).collect();
    Ok(WeightedIndex::new(&weights)?.sample(rng))
}

#[derive(Debug, Clone)]
pub struct TrainerConfig {
    pub objective: Objective,
    pub update: UpdateRule,
    pub learning_rate: f64,
    pub l2_strength: f64,
    pub iterations: usize,
    pub seed: u64,
    pub noise_samples: usize,
    pub noise_seed: u64,
}

impl TrainerConfig {
    pub fn from_settings() -> Self {
        let s = settings();
        Self {
            objective: s.training.objective,
            update: s.training.update,
            learning_rate: s.training.learning_rate,
            l2_strength: s.training.l2_strength,
            iterations: s.training.iterations,
            seed: s.training.seed,
            noise_samples: s.noise.samples,
            noise_seed: s.noise.seed,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrainingReport {
    /// Loss under the initial weights.
    pub initial_loss: f64,
    /// Loss of each iteration, evaluated before its update.
    pub losses: Vec<f64>,
}

pub struct Trainer<'a> {
    model: CrfModel<'a>,
    sources: Vec<Vec<String>>,
    golds: Vec<Derivation>,
    noise: Vec<Vec<Derivation>>,
    config: TrainerConfig,
}

impl<'a> Trainer<'a> {
    /// Build the model over `examples` and fix its gold and noise derivations.
    pub fn new(
        scorer: FeatureScorer<'a>,
        examples: &[TrainingExample],
        config: TrainerConfig,
    ) -> Result<Self, TrainError> {
        if examples.is_empty() {
            return Err(TrainError::NoExamples);
        }
        let fwd = scorer.forward_table();
        let vocabulary =
            SuffixVocabulary::from_derivations(examples.iter().flat_map(|e| &e.derivations));
        let mut model = CrfModel::new(scorer, vocabulary).with_update_rule(config.update);
        for example in examples {
            model.register_source(&example.source);
            for d in &example.derivations {
                model.register_derivation(&example.source, d)?;
            }
        }

        let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
        let mut golds = Vec::with_capacity(examples.len());
        for example in examples {
            let i = sample_derivation(&model, &example.source, &example.derivations, &mut rng)?;
            golds.push(example.derivations[i].clone());
        }

        let mut noise = Vec::new();
        if config.objective == Objective::Nce {
            let mut sampler = UnigramNoise::new(fwd, model.suffixes()).with_seed(config.noise_seed);
            for example in examples {
                let samples = sampler.sample_n(&example.source, config.noise_samples);
                for d in &samples {
                    model.register_derivation(&example.source, d)?;
                }
                noise.push(samples);
            }
        }

        info!(
            examples = examples.len(),
            features = model.feature_count(),
            suffixes = model.suffixes().len(),
            objective = ?config.objective,
            "model prepared"
        );
        Ok(Self {
            model,
            sources: examples.iter().map(|e| e.source.clone()).collect(),
            golds,
            noise,
            config,
        })
    }

    pub fn model(&self) -> &CrfModel<'a> {
        &self.model
    }

    pub fn into_model(self) -> CrfModel<'a> {
        self.model
    }

    pub fn golds(&self) -> &[Derivation] {
        &self.golds
    }

    pub fn noise(&self) -> &[Vec<Derivation>] {
        &self.noise
    }

    /// Objective value under the current weights, without updating.
    pub fn loss(&self) -> Result<f64, ModelError> {
        let l2 = self.config.l2_strength;
        match self.config.objective {
            Objective::Likelihood => self.model.likelihood_loss(&self.sources, &self.golds, l2),
            Objective::Nce => {
                self.model
                    .nce_batch_loss(&self.sources, &self.golds, &self.noise, l2)
            }
        }
    }

    /// One full-batch update. Returns the loss before it.
    pub fn step(&mut self) -> Result<f64, ModelError> {
        let lr = self.config.learning_rate;
        let l2 = self.config.l2_strength;
        match self.config.objective {
            Objective::Likelihood => self
                .model
                .train_likelihood(&self.sources, &self.golds, lr, l2),
            Objective::Nce => self
                .model
                .train_nce(&self.sources, &self.golds, &self.noise, lr, l2),
        }
    }

    pub fn run(&mut self) -> Result<TrainingReport, ModelError> {
        let initial_loss = self.loss()?;
        info!(iteration = 0, loss = initial_loss);

        let mut losses = Vec::with_capacity(self.config.iterations);
        for iteration in 1..=self.config.iterations {
            let loss = self.step()?;
            info!(iteration, loss);
            losses.push(loss);
        }
        if let Some(last) = losses.last() {
            info!(loss = last, "training finished");
        }
        Ok(TrainingReport {
            initial_loss,
            losses,
        })
    }
}
