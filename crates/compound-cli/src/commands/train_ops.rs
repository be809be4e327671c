use std::path::Path;
use std::process;
use std::time::Instant;

use compound_core::analyzer::CompoundAnalyzer;
use compound_core::features::FeatureScorer;
use compound_core::settings::settings;
use compound_core::trainer::{prepare_examples, Trainer, TrainerConfig};

use super::load_tables;
use crate::corpus;

/// Train on `corpus_file` and write the model snapshot to `output`.
pub fn train(
    corpus_file: &str,
    fwd_file: &str,
    rev_file: &str,
    output: &str,
    iterations: Option<usize>,
) {
    let pairs = die!(
        corpus::read_corpus(Path::new(corpus_file)),
        "Error reading {corpus_file}: {}"
    );
    let (fwd, rev) = load_tables(fwd_file, rev_file);
    eprintln!("{} training pairs", pairs.len());

    let start = Instant::now();
    let analyzer = CompoundAnalyzer::new(&fwd);
    let examples = prepare_examples(&analyzer, pairs, settings().training.max_source_len);
    let derivations: usize = examples.iter().map(|e| e.derivations.len()).sum();
    eprintln!(
        "{} reachable examples, {derivations} derivations ({:.1?})",
        examples.len(),
        start.elapsed()
    );

    let mut config = TrainerConfig::from_settings();
    if let Some(n) = iterations {
        config.iterations = n;
    }
    let mut trainer = die!(
        Trainer::new(FeatureScorer::new(&fwd, &rev), &examples, config),
        "Error preparing training: {}"
    );
    let report = die!(trainer.run(), "Error during training: {}");
    let final_loss = die!(trainer.loss(), "Error evaluating final loss: {}");

    let model = trainer.into_model();
    eprintln!(
        "loss {:.6} -> {final_loss:.6} after {} iterations ({:.1?})",
        report.initial_loss,
        report.losses.len(),
        start.elapsed()
    );
    for (name, weight) in model.nonzero_weights() {
        eprintln!("  {name}\t{weight:.6}");
    }

    die!(
        model.snapshot().save(Path::new(output)),
        "Error writing {output}: {}"
    );
    eprintln!("Wrote {output} ({} features)", model.feature_count());
}
