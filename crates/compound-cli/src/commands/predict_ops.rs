use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::Path;
use std::process;

use compound_core::crf::{CrfModel, ModelSnapshot};
use compound_core::derivation::DerivationError;
use compound_core::features::FeatureScorer;
use compound_core::settings::settings;

use super::load_tables;
use crate::corpus;
use crate::output::{HypothesisRecord, PredictionRecord};

pub struct PredictOptions {
    /// Hypotheses per sentence; the configured `decoder.kbest` when unset.
    pub k: Option<usize>,
    pub json: bool,
    /// Input lines end with the reference compound.
    pub with_target: bool,
}

/// Decode one sentence and describe each hypothesis.
pub fn predict_line(
    model: &CrfModel<'_>,
    source: Vec<String>,
    target: Option<String>,
    k: usize,
) -> Result<PredictionRecord, DerivationError> {
    let mut hypotheses = Vec::new();
    for (rank, scored) in model.predict(&source, k).into_iter().enumerate() {
        let features = model.scorer().score(&source, &scored.derivation)?;
        let reconstruction = scored.derivation.reconstruct();
        hypotheses.push(HypothesisRecord {
            rank,
            score: scored.score,
            matches_target: target.as_ref().map(|t| *t == reconstruction),
            reconstruction,
            derivation: scored.derivation,
            features: features
                .iter()
                .map(|(name, value)| (name.to_string(), value))
                .collect(),
        });
    }
    Ok(PredictionRecord {
        source,
        target,
        hypotheses,
    })
}

/// Decode every line of `input` (stdin when unset) with a trained model.
pub fn predict(
    model_file: &str,
    fwd_file: &str,
    rev_file: &str,
    input: Option<&str>,
    options: &PredictOptions,
) {
    let snapshot = die!(
        ModelSnapshot::load(Path::new(model_file)),
        "Error loading model {model_file}: {}"
    );
    let (fwd, rev) = load_tables(fwd_file, rev_file);
    let model = die!(
        CrfModel::from_snapshot(FeatureScorer::new(&fwd, &rev), snapshot),
        "Error restoring model: {}"
    );
    let k = options.k.unwrap_or(settings().decoder.kbest);

    let lines = match input {
        Some(path) => {
            let file = die!(File::open(path), "Error opening {path}: {}");
            die!(corpus::read_lines(BufReader::new(file)), "Error reading {path}: {}")
        }
        None => die!(corpus::read_lines(io::stdin().lock()), "Error reading stdin: {}"),
    };

    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    let mut evaluated = 0usize;
    let mut correct = 0usize;
    for line in &lines {
        let (source, target) = if options.with_target {
            match corpus::parse_pair(line) {
                Some((source, compound)) => (source, Some(compound)),
                None => {
                    eprintln!("Skipping line without source words: {line}");
                    continue;
                }
            }
        } else {
            (corpus::tokenize(line), None)
        };

        let record = die!(
            predict_line(&model, source, target, k),
            "Error scoring hypothesis: {}"
        );
        if let Some(matched) = record.top_matches() {
            evaluated += 1;
            correct += usize::from(matched);
        }

        if options.json {
            let json = die!(serde_json::to_string(&record), "Error encoding JSON: {}");
            die!(writeln!(out, "{json}"), "Error writing output: {}");
        } else {
            for line in record.text_lines() {
                die!(writeln!(out, "{line}"), "Error writing output: {}");
            }
            die!(writeln!(out), "Error writing output: {}");
        }
    }
    die!(out.flush(), "Error writing output: {}");

    if evaluated > 0 {
        eprintln!(
            "top-1 accuracy: {correct}/{evaluated} ({:.1}%)",
            correct as f64 * 100.0 / evaluated as f64
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use compound_core::features::{SuffixVocabulary, FWD_SCORE, MONOTONE, TGT_NULL};
    use compound_core::table::LexicalTable;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn tables() -> (LexicalTable, LexicalTable) {
        let fwd = LexicalTable::from_entries([
            ("tomato", "tomate", -0.2),
            ("tomato", "paradeiser", -2.0),
            ("processing", "verarbeitung", -0.1),
        ]);
        let rev = fwd.inverted();
        (fwd, rev)
    }

    fn model<'a>(fwd: &'a LexicalTable, rev: &'a LexicalTable) -> CrfModel<'a> {
        let vocab: SuffixVocabulary = ["", "n"].into_iter().collect();
        let mut model = CrfModel::new(FeatureScorer::new(fwd, rev), vocab);
        model.register_source(&strings(&["tomato", "processing"]));
        for name in model.feature_names().to_vec() {
            model.set_weight(&name, 0.0).unwrap();
        }
        model.set_weight(FWD_SCORE, 1.0).unwrap();
        model.set_weight(TGT_NULL, -5.0).unwrap();
        model.set_weight(MONOTONE, 0.5).unwrap();
        model
    }

    #[test]
    fn test_predict_line_ranks_and_features() {
        let (fwd, rev) = tables();
        let model = model(&fwd, &rev);
        let record = predict_line(&model, strings(&["tomato", "processing"]), None, 3).unwrap();

        assert_eq!(record.hypotheses.len(), 3);
        assert_eq!(record.top_matches(), None);
        let best = &record.hypotheses[0];
        assert_eq!(best.rank, 0);
        assert_eq!(best.reconstruction, "tomateverarbeitung");
        assert!(best.matches_target.is_none());
        assert!(best
            .features
            .iter()
            .any(|(name, value)| name == MONOTONE && *value == 1.0));
        for pair in record.hypotheses.windows(2) {
            assert!(pair[0].score >= pair[1].score);
            assert_eq!(pair[0].rank + 1, pair[1].rank);
        }
    }

    #[test]
    fn test_predict_line_checks_target() {
        let (fwd, rev) = tables();
        let model = model(&fwd, &rev);
        let source = strings(&["tomato", "processing"]);

        let hit = predict_line(&model, source.clone(), Some("tomateverarbeitung".into()), 2).unwrap();
        assert_eq!(hit.top_matches(), Some(true));
        assert_eq!(hit.hypotheses[1].matches_target, Some(false));

        let miss = predict_line(&model, source, Some("tomatenverarbeitung".into()), 1).unwrap();
        assert_eq!(miss.top_matches(), Some(false));
    }

    #[test]
    fn test_predict_line_without_translations() {
        let (fwd, rev) = tables();
        let model = model(&fwd, &rev);
        let record = predict_line(&model, strings(&["sauce"]), Some("sauce".into()), 5).unwrap();
        assert!(record.hypotheses.is_empty());
        assert_eq!(record.top_matches(), Some(false));
    }
}
