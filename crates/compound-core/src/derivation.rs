//! The derivation value type and the combinatorial helpers used to enumerate it.

use std::fmt;

use serde::{Deserialize, Serialize};

/// One hypothesised decomposition of a compound against a source sentence.
///
/// `translations` and `suffixes` are aligned with the source words; an empty
/// translation means the source word is unaligned. `permutation` lists the
/// non-null positions in the order their pieces appear in the compound.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Derivation {
    pub translations: Vec<String>,
    pub suffixes: Vec<String>,
    pub permutation: Vec<usize>,
}

#[derive(Debug, thiserror::Error)]
pub enum DerivationError {
    #[error("derivation covers {found} positions but the source has {expected} words")]
    SourceLength { expected: usize, found: usize },

    #[error("derivation has {translations} translations but {suffixes} suffixes")]
    SuffixLength { translations: usize, suffixes: usize },

    #[error("permutation {permutation:?} does not match the non-null positions {expected:?}")]
    Permutation {
        permutation: Vec<usize>,
        expected: Vec<usize>,
    },
}

impl Derivation {
    pub fn new(translations: Vec<String>, suffixes: Vec<String>, permutation: Vec<usize>) -> Self {
        Self {
            translations,
            suffixes,
            permutation,
        }
    }

    pub fn len(&self) -> usize {
        self.translations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.translations.is_empty()
    }

    /// Check the structural invariants against a source sentence of `source_len` words.
    pub fn validate(&self, source_len: usize) -> Result<(), DerivationError> {
        if self.translations.len() != source_len {
            return Err(DerivationError::SourceLength {
                expected: source_len,
                found: self.translations.len(),
            });
        }
        if self.suffixes.len() != self.translations.len() {
            return Err(DerivationError::SuffixLength {
                translations: self.translations.len(),
                suffixes: self.suffixes.len(),
            });
        }
        let expected = non_null_positions(&self.translations);
        let mut sorted = self.permutation.clone();
        sorted.sort_unstable();
        if sorted != expected {
            return Err(DerivationError::Permutation {
                permutation: self.permutation.clone(),
                expected,
            });
        }
        Ok(())
    }

    /// True when pieces appear in source order.
    pub fn is_monotone(&self) -> bool {
        is_monotone(&self.permutation)
    }

    /// Concatenate `translation + suffix` in permutation order.
    pub fn reconstruct(&self) -> String {
        self.permutation
            .iter()
            .map(|&j| format!("{}{}", self.translations[j], self.suffixes[j]))
            .collect()
    }
}

impl fmt::Display for Derivation {
    /// `piece+suffix` per source position (`NULL` when unaligned), then the permutation.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (t, s)) in self.translations.iter().zip(&self.suffixes).enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            if t.is_empty() {
                f.write_str("NULL")?;
            } else {
                write!(f, "{t}+{s}")?;
            }
        }
        f.write_str(" |||")?;
        for j in &self.permutation {
            write!(f, " {j}")?;
        }
        Ok(())
    }
}

/// Indices of the non-empty entries, ascending.
pub fn non_null_positions(translations: &[String]) -> Vec<usize> {
    translations
        .iter()
        .enumerate()
        .filter(|(_, t)| !t.is_empty())
        .map(|(i, _)| i)
        .collect()
}

/// True when `permutation` is non-decreasing.
pub fn is_monotone(permutation: &[usize]) -> bool {
    permutation.windows(2).all(|w| w[0] <= w[1])
}

/// Cartesian product of `lists`, varying the last list fastest.
///
/// There is exactly one (empty) combination of zero lists, and none when any
/// list is empty.
pub fn cross<T: Clone>(lists: &[Vec<T>]) -> Vec<Vec<T>> {
    if lists.iter().any(|l| l.is_empty()) {
        return Vec::new();
    }
    let total: usize = lists.iter().map(|l| l.len()).product();
    let mut product = Vec::with_capacity(total);
    let mut indices = vec![0usize; lists.len()];
    loop {
        product.push(
            indices
                .iter()
                .zip(lists)
                .map(|(&i, list)| list[i].clone())
                .collect(),
        );

        // Odometer increment; done once the first digit wraps.
        let mut pos = lists.len();
        loop {
            if pos == 0 {
                return product;
            }
            pos -= 1;
            indices[pos] += 1;
            if indices[pos] < lists[pos].len() {
                break;
            }
            indices[pos] = 0;
        }
    }
}

/// Rearrange `items` into the next lexicographic permutation.
///
/// Returns `false` (leaving `items` sorted ascending) after the last one.
pub fn next_permutation<T: Ord>(items: &mut [T]) -> bool {
    if items.len() < 2 {
        return false;
    }
    let mut i = items.len() - 1;
    while i > 0 && items[i - 1] >= items[i] {
        i -= 1;
    }
    if i == 0 {
        items.reverse();
        return false;
    }
    let mut j = items.len() - 1;
    while items[j] <= items[i - 1] {
        j -= 1;
    }
    items.swap(i - 1, j);
    items[i..].reverse();
    true
}

/// All orderings of `items`, starting from ascending order.
pub fn permutations(items: &[usize]) -> Vec<Vec<usize>> {
    let mut current = items.to_vec();
    current.sort_unstable();
    let mut all = vec![current.clone()];
    while next_permutation(&mut current) {
        all.push(current.clone());
    }
    all
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_cross_zero_lists() {
        let product = cross::<String>(&[]);
        assert_eq!(product, vec![Vec::<String>::new()]);
    }

    #[test]
    fn test_cross_order() {
        let product = cross(&[strings(&["a", "b"]), strings(&["x", "y", "z"])]);
        assert_eq!(product.len(), 6);
        assert_eq!(product[0], strings(&["a", "x"]));
        assert_eq!(product[1], strings(&["a", "y"]));
        assert_eq!(product[3], strings(&["b", "x"]));
        assert_eq!(product[5], strings(&["b", "z"]));
    }

    #[test]
    fn test_cross_with_empty_list() {
        assert!(cross(&[strings(&["a"]), Vec::new()]).is_empty());
    }

    #[test]
    fn test_permutations_count_and_order() {
        let all = permutations(&[2, 0, 1]);
        assert_eq!(all.len(), 6);
        assert_eq!(all[0], vec![0, 1, 2]);
        assert_eq!(all[5], vec![2, 1, 0]);
    }

    #[test]
    fn test_permutations_of_nothing() {
        assert_eq!(permutations(&[]), vec![Vec::<usize>::new()]);
    }

    #[test]
    fn test_monotone() {
        assert!(is_monotone(&[]));
        assert!(is_monotone(&[3]));
        assert!(is_monotone(&[0, 2, 4]));
        assert!(!is_monotone(&[1, 0]));
    }

    #[test]
    fn test_validate() {
        let d = Derivation::new(
            strings(&["tomate", "", "verarbeitung"]),
            strings(&["n", "", ""]),
            vec![0, 2],
        );
        assert!(d.validate(3).is_ok());
        assert!(matches!(
            d.validate(2),
            Err(DerivationError::SourceLength { .. })
        ));

        let bad_suffixes = Derivation::new(strings(&["a"]), Vec::new(), vec![0]);
        assert!(matches!(
            bad_suffixes.validate(1),
            Err(DerivationError::SuffixLength { .. })
        ));

        let bad_perm = Derivation::new(strings(&["a", ""]), strings(&["", ""]), vec![0, 1]);
        assert!(matches!(
            bad_perm.validate(2),
            Err(DerivationError::Permutation { .. })
        ));
    }

    #[test]
    fn test_display_and_reconstruct() {
        let d = Derivation::new(
            strings(&["verarbeitung", "", "tomate"]),
            strings(&["", "", "n"]),
            vec![2, 0],
        );
        assert_eq!(d.reconstruct(), "tomatenverarbeitung");
        assert_eq!(d.to_string(), "verarbeitung+ NULL tomate+n ||| 2 0");
        assert!(!d.is_monotone());
    }

    proptest! {
        #[test]
        fn cross_product_size(sizes in prop::collection::vec(0usize..4, 0..5)) {
            let lists: Vec<Vec<usize>> = sizes.iter().map(|&n| (0..n).collect()).collect();
            let expected: usize = sizes.iter().product();
            prop_assert_eq!(cross(&lists).len(), expected);
        }

        #[test]
        fn permutations_are_distinct(n in 0usize..6) {
            let items: Vec<usize> = (0..n).collect();
            let all = permutations(&items);
            let factorial: usize = (1..=n).product();
            prop_assert_eq!(all.len(), factorial);
            let unique: std::collections::HashSet<_> = all.iter().cloned().collect();
            prop_assert_eq!(unique.len(), all.len());
        }
    }
}
