use std::process;

use compound_core::crf::CrfModel;
use compound_core::features::{FeatureScorer, SuffixVocabulary};

use super::load_tables;

/// Largest allowed gap between the exact and the brute-force log partition.
const TOLERANCE: f64 = 1e-6;

/// Compare the exact and brute-force partition functions for one sentence.
pub fn check_partition(fwd_file: &str, rev_file: &str, words: &[String], suffixes: &[String]) {
    let (fwd, rev) = load_tables(fwd_file, rev_file);
    let source: Vec<String> = words.iter().map(|w| w.to_lowercase()).collect();
    let vocabulary: SuffixVocabulary = suffixes.iter().map(String::as_str).collect();

    let mut model = CrfModel::new(FeatureScorer::new(&fwd, &rev), vocabulary);
    model.register_source(&source);
    eprintln!(
        "{} words, {} suffixes, {} features",
        source.len(),
        model.suffixes().len(),
        model.feature_count()
    );

    eprintln!("Computing fast partition function...");
    let fast = die!(
        model.partition_function(&source),
        "Error computing partition function: {}"
    );
    eprintln!("Computing slow partition function...");
    let slow = die!(
        model.slow_partition_function(&source, model.weights()),
        "Error computing brute-force partition function: {}"
    );

    let diff = (fast - slow).abs();
    println!("fast={fast} slow={slow} diff={diff:e}");
    if !(diff < TOLERANCE) {
        eprintln!("Error: partition functions disagree by {diff:e}");
        process::exit(1);
    }
}
