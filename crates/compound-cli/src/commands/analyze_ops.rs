use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::process;

use compound_core::analyzer::CompoundAnalyzer;
use compound_core::features::FeatureScorer;

use super::load_tables;
use crate::corpus;
use crate::output::format_hypothesis;

/// Print every derivation of every `source... compound` line with its features.
pub fn analyze(fwd_file: &str, rev_file: &str, input: Option<&str>) {
    let lines = match input {
        Some(path) => {
            let file = die!(File::open(path), "Error opening {path}: {}");
            die!(corpus::read_lines(BufReader::new(file)), "Error reading {path}: {}")
        }
        None => die!(corpus::read_lines(io::stdin().lock()), "Error reading stdin: {}"),
    };

    let (fwd, rev) = load_tables(fwd_file, rev_file);
    let analyzer = CompoundAnalyzer::new(&fwd);
    let scorer = FeatureScorer::new(&fwd, &rev);

    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    for line in &lines {
        let Some((source, compound)) = corpus::parse_pair(line) else {
            eprintln!("Skipping line without source words: {line}");
            continue;
        };
        let derivations = analyzer.analyze(&source, &compound);
        if derivations.is_empty() {
            eprintln!("No derivation for {compound}");
        }
        for (rank, derivation) in derivations.iter().enumerate() {
            let features = die!(
                scorer.score(&source, derivation),
                "Error scoring derivation: {}"
            );
            die!(
                writeln!(out, "{}", format_hypothesis(rank, derivation, &features)),
                "Error writing output: {}"
            );
        }
    }
    die!(out.flush(), "Error writing output: {}");
}
