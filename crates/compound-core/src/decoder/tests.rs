use crate::crf::CrfModel;
use crate::derivation::{cross, non_null_positions, Derivation};
use crate::features::{FeatureScorer, SuffixVocabulary, FWD_SCORE, MONOTONE, TGT_NULL};
use crate::table::{LexicalTable, TranslationTable};

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn tables() -> (LexicalTable, LexicalTable) {
    let fwd = LexicalTable::from_entries([
        ("tomato", "tomate", -0.2),
        ("tomato", "paradeiser", -2.0),
        ("processing", "verarbeitung", -0.1),
        ("processing", "bearbeitung", -1.7),
    ]);
    (fwd.clone(), fwd.inverted())
}

fn model<'a>(fwd: &'a LexicalTable, rev: &'a LexicalTable, source: &[String]) -> CrfModel<'a> {
    let vocab: SuffixVocabulary = ["", "n", "s", "en"].into_iter().collect();
    let mut model = CrfModel::new(FeatureScorer::new(fwd, rev).with_oov_score(-10.0), vocab);
    model.register_source(source);
    let names = model.feature_names().to_vec();
    for (i, name) in names.iter().enumerate() {
        // distinct, deterministic weights
        model
            .set_weight(name, ((i * 7 % 5) as f64 - 2.0) * 0.37)
            .unwrap();
    }
    model
}

/// Every non-all-null source-order derivation, scored by the model, best first.
fn brute_force(model: &CrfModel<'_>, fwd: &LexicalTable, source: &[String]) -> Vec<f64> {
    let vocab: Vec<String> = model.suffixes().iter().map(str::to_string).collect();
    let per_position: Vec<Vec<(String, String)>> = source
        .iter()
        .map(|word| {
            let mut options = vec![(String::new(), String::new())];
            for (t, _) in fwd.translations(word) {
                for s in &vocab {
                    options.push((t.to_string(), s.clone()));
                }
            }
            options
        })
        .collect();

    let mut scores = Vec::new();
    for combo in cross(&per_position) {
        let (translations, suffixes): (Vec<String>, Vec<String>) = combo.into_iter().unzip();
        let permutation = non_null_positions(&translations);
        if permutation.is_empty() {
            continue;
        }
        let d = Derivation::new(translations, suffixes, permutation);
        scores.push(model.score(source, &d).unwrap());
    }
    scores.sort_by(|a, b| b.total_cmp(a));
    scores
}

#[test]
fn test_kbest_matches_brute_force() {
    let (fwd, rev) = tables();
    let source = strings(&["tomato", "processing"]);
    let model = model(&fwd, &rev, &source);
    let expected = brute_force(&model, &fwd, &source);

    for k in [1, 3, 10, 100] {
        let results = model.predict(&source, k);
        assert_eq!(results.len(), k.min(expected.len()));
        for (got, want) in results.iter().zip(&expected) {
            assert!((got.score - want).abs() < 1e-9, "k={k}: {} vs {want}", got.score);
        }
    }
}

#[test]
fn test_kbest_is_sorted_and_bounded() {
    let (fwd, rev) = tables();
    let source = strings(&["the", "tomato", "processing"]);
    let model = model(&fwd, &rev, &source);
    let results = model.predict(&source, 7);
    assert!(results.len() <= 7);
    for pair in results.windows(2) {
        assert!(pair[0].score >= pair[1].score);
    }
}

#[test]
fn test_reported_score_equals_model_score() {
    let (fwd, rev) = tables();
    let source = strings(&["processing", "tomato"]);
    let model = model(&fwd, &rev, &source);
    for result in model.predict(&source, 5) {
        result.derivation.validate(source.len()).unwrap();
        assert!(result.derivation.is_monotone());
        let score = model.score(&source, &result.derivation).unwrap();
        assert!((result.score - score).abs() < 1e-9);
    }
}

#[test]
fn test_best_follows_lexical_scores() {
    let (fwd, rev) = tables();
    let source = strings(&["tomato", "processing"]);
    let mut model = model(&fwd, &rev, &source);
    for name in model.feature_names().to_vec() {
        model.set_weight(&name, 0.0).unwrap();
    }
    model.set_weight(FWD_SCORE, 1.0).unwrap();
    model.set_weight(TGT_NULL, -5.0).unwrap();
    model.set_weight(MONOTONE, 0.5).unwrap();

    let best = &model.predict(&source, 1)[0];
    assert_eq!(
        best.derivation.translations,
        strings(&["tomate", "verarbeitung"])
    );
    assert_eq!(best.derivation.suffixes, strings(&["", ""]));
    assert_eq!(best.derivation.permutation, vec![0, 1]);
    assert!((best.score - (-0.3 + 0.5)).abs() < 1e-12);
}

#[test]
fn test_all_null_is_never_returned() {
    let (fwd, rev) = tables();
    let source = strings(&["tomato", "processing"]);
    let mut model = model(&fwd, &rev, &source);
    // Make the all-null hypothesis the single best one
    model.set_weight(TGT_NULL, 50.0).unwrap();

    let results = model.predict(&source, 4);
    assert_eq!(results.len(), 4);
    assert!(results.iter().all(|r| !r.derivation.permutation.is_empty()));
    let expected = brute_force(&model, &fwd, &source);
    for (got, want) in results.iter().zip(&expected) {
        assert!((got.score - want).abs() < 1e-9);
    }
}

#[test]
fn test_untranslatable_source_yields_nothing() {
    let (fwd, rev) = tables();
    let source = strings(&["sauce", "with"]);
    let model = model(&fwd, &rev, &source);
    assert!(model.predict(&source, 5).is_empty());
}

#[test]
fn test_zero_k_and_empty_source() {
    let (fwd, rev) = tables();
    let source = strings(&["tomato"]);
    let model = model(&fwd, &rev, &source);
    assert!(model.predict(&source, 0).is_empty());
    assert!(model.predict(&[], 3).is_empty());
}

#[test]
fn test_unseen_words_decode_leniently() {
    let (fwd, rev) = tables();
    let source = strings(&["tomato"]);
    let model = model(&fwd, &rev, &source);
    // "processing" was never registered; its null feature counts as zero
    let results = model.predict(&strings(&["tomato", "processing"]), 3);
    assert_eq!(results.len(), 3);
}

#[test]
fn test_huge_k_returns_every_hypothesis() {
    let (fwd, rev) = tables();
    let source = strings(&["tomato", "processing"]);
    let model = model(&fwd, &rev, &source);
    let expected = brute_force(&model, &fwd, &source);

    let results = model.predict(&source, usize::MAX);
    assert_eq!(results.len(), expected.len());
    for (got, want) in results.iter().zip(&expected) {
        assert!((got.score - want).abs() < 1e-9);
    }
}
