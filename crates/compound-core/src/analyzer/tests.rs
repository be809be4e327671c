use proptest::prelude::*;

use super::*;
use crate::table::LexicalTable;

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn test_table() -> LexicalTable {
    LexicalTable::from_entries([
        ("tomato", "tomate", -0.2),
        ("tomato", "paradeiser", -2.0),
        ("processing", "verarbeitung", -0.1),
        ("processing", "bearbeitung", -1.7),
        ("the", "die", -0.5),
    ])
}

#[test]
fn test_decompose_in_order() {
    let pieces = strings(&["tomate", "verarbeitung"]);
    let suffixes = decompose("tomatenverarbeitung", &pieces, &[0, 1]).unwrap();
    assert_eq!(suffixes, strings(&["n", ""]));
}

#[test]
fn test_decompose_rejects_leading_text() {
    let pieces = strings(&["tomate", "verarbeitung"]);
    assert!(decompose("tomatenverarbeitung", &pieces, &[1, 0]).is_none());
}

#[test]
fn test_decompose_missing_piece() {
    let pieces = strings(&["tomate", "soße"]);
    assert!(decompose("tomatenverarbeitung", &pieces, &[0, 1]).is_none());
}

#[test]
fn test_decompose_suffix_goes_to_previous_piece_in_order() {
    // Pieces are placed in reverse source order; the gap after "haus" belongs
    // to position 1, not to position 0.
    let pieces = strings(&["tür", "haus"]);
    let suffixes = decompose("haustür", &pieces, &[1, 0]).unwrap();
    assert_eq!(suffixes, strings(&["", ""]));

    let suffixes = decompose("hausestür", &pieces, &[1, 0]).unwrap();
    assert_eq!(suffixes, strings(&["", "es"]));
}

#[test]
fn test_decompose_skips_null_positions() {
    let pieces = strings(&["", "verarbeitung"]);
    let suffixes = decompose("verarbeitungs", &pieces, &[1]).unwrap();
    assert_eq!(suffixes, strings(&["", "s"]));
}

#[test]
fn test_decompose_multibyte() {
    let pieces = strings(&["größe", "ände"]);
    let suffixes = decompose("größenände", &pieces, &[0, 1]).unwrap();
    assert_eq!(suffixes, strings(&["n", ""]));
}

#[test]
fn test_candidates_include_null_and_filter_by_substring() {
    let table = test_table();
    let analyzer = CompoundAnalyzer::new(&table);
    let candidates =
        analyzer.candidate_translations(&strings(&["tomato", "processing"]), "tomatenverarbeitung");
    assert_eq!(candidates[0], strings(&["", "tomate"]));
    // "bearbeitung" is not a substring of "tomatenverarbeitung"
    assert_eq!(candidates[1], strings(&["", "verarbeitung"]));
}

#[test]
fn test_analyze_tomato_processing() {
    let table = test_table();
    let analyzer = CompoundAnalyzer::new(&table);
    let derivations = analyzer.analyze(&strings(&["tomato", "processing"]), "tomatenverarbeitung");

    // tomate+nverarbeitung, and tomate+n verarbeitung+
    assert_eq!(derivations.len(), 2);
    let full = derivations
        .iter()
        .find(|d| d.permutation.len() == 2)
        .unwrap();
    assert_eq!(full.translations, strings(&["tomate", "verarbeitung"]));
    assert_eq!(full.suffixes, strings(&["n", ""]));
    assert_eq!(full.permutation, vec![0, 1]);

    let single = derivations
        .iter()
        .find(|d| d.permutation.len() == 1)
        .unwrap();
    assert_eq!(single.translations, strings(&["tomate", ""]));
    assert_eq!(single.suffixes, strings(&["nverarbeitung", ""]));
}

#[test]
fn test_analyze_never_emits_all_null() {
    let table = test_table();
    let analyzer = CompoundAnalyzer::new(&table);
    // No word has a translation inside "hund", so the only combination is all-null
    let derivations = analyzer.analyze(&strings(&["tomato", "the"]), "hund");
    assert!(derivations.is_empty());
}

#[test]
fn test_analyze_unknown_words() {
    let table = test_table();
    let analyzer = CompoundAnalyzer::new(&table);
    let derivations = analyzer.analyze(&strings(&["sauce", "tomato"]), "tomatensoße");
    assert_eq!(derivations.len(), 1);
    assert_eq!(derivations[0].translations, strings(&["", "tomate"]));
    assert_eq!(derivations[0].suffixes, strings(&["", "nsoße"]));
}

#[test]
fn test_analyze_reordered_source() {
    let table = test_table();
    let analyzer = CompoundAnalyzer::new(&table);
    let derivations = analyzer.analyze(&strings(&["processing", "tomato"]), "tomatenverarbeitung");
    let full = derivations
        .iter()
        .find(|d| d.permutation.len() == 2)
        .unwrap();
    assert_eq!(full.permutation, vec![1, 0]);
    assert_eq!(full.suffixes, strings(&["", "n"]));
    assert_eq!(full.reconstruct(), "tomatenverarbeitung");
}

#[test]
fn test_analyzed_derivations_are_valid() {
    let table = test_table();
    let analyzer = CompoundAnalyzer::new(&table);
    let source = strings(&["the", "tomato", "processing"]);
    for d in analyzer.analyze(&source, "dietomatenverarbeitung") {
        d.validate(source.len()).unwrap();
        assert_eq!(d.reconstruct(), "dietomatenverarbeitung");
    }
}

fn piece() -> impl Strategy<Value = String> {
    "[a-eä]{1,4}"
}

proptest! {
    #[test]
    fn decomposition_reconstructs_compound(
        parts in prop::collection::vec((piece(), "[a-eß]{0,2}"), 1..5),
        seed in any::<u64>(),
    ) {
        // Lay pieces out in a scrambled order, then ask for exactly that order.
        let n = parts.len();
        let mut order: Vec<usize> = (0..n).collect();
        let mut state = seed;
        for i in (1..n).rev() {
            state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            order.swap(i, (state >> 33) as usize % (i + 1));
        }
        let pieces: Vec<String> = parts.iter().map(|(p, _)| p.clone()).collect();
        let compound: String = order
            .iter()
            .map(|&j| format!("{}{}", parts[j].0, parts[j].1))
            .collect();

        let suffixes = decompose(&compound, &pieces, &order);
        prop_assert!(suffixes.is_some());
        let derivation = Derivation::new(pieces, suffixes.unwrap(), order);
        prop_assert_eq!(derivation.reconstruct(), compound);
    }

    #[test]
    fn any_successful_decomposition_reconstructs(
        compound in "[ab]{1,8}",
        pieces in prop::collection::vec("[ab]{1,3}", 1..4),
    ) {
        let indices: Vec<usize> = (0..pieces.len()).collect();
        for order in crate::derivation::permutations(&indices) {
            if let Some(suffixes) = decompose(&compound, &pieces, &order) {
                let derivation = Derivation::new(pieces.clone(), suffixes, order);
                prop_assert_eq!(derivation.reconstruct(), compound.clone());
            }
        }
    }
}
