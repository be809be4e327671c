//! Line-oriented text input.
//!
//! A training line is whitespace-tokenized and lower-cased; its last token is
//! the compound and the tokens before it are the source sentence.

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;

/// One `(source words, compound)` pair.
pub type Pair = (Vec<String>, String);

/// Lower-cased tokens of `line`.
pub fn tokenize(line: &str) -> Vec<String> {
    line.split_whitespace().map(str::to_lowercase).collect()
}

/// Split a line into source words and compound. `None` for lines with fewer
/// than two tokens.
pub fn parse_pair(line: &str) -> Option<Pair> {
    let mut tokens = tokenize(line);
    if tokens.len() < 2 {
        return None;
    }
    let compound = tokens.pop()?;
    Some((tokens, compound))
}

/// Non-empty lines of `reader`, skipping `#` comments.
pub fn read_lines<R: BufRead>(reader: R) -> io::Result<Vec<String>> {
    let mut lines = Vec::new();
    for line in reader.lines() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        lines.push(trimmed.to_string());
    }
    Ok(lines)
}

/// Every parseable pair in the file at `path`. Lines with a single token are
/// skipped with a warning.
pub fn read_corpus(path: &Path) -> io::Result<Vec<Pair>> {
    let lines = read_lines(BufReader::new(File::open(path)?))?;
    let mut pairs = Vec::with_capacity(lines.len());
    for (i, line) in lines.iter().enumerate() {
        match parse_pair(line) {
            Some(pair) => pairs.push(pair),
            None => tracing::warn!(line = i + 1, "no source words, skipped"),
        }
    }
    Ok(pairs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_pair_lowercases_and_splits() {
        let (source, compound) = parse_pair("Tomato  Processing\tTomatenVerarbeitung").unwrap();
        assert_eq!(source, vec!["tomato", "processing"]);
        assert_eq!(compound, "tomatenverarbeitung");
    }

    #[test]
    fn test_parse_pair_multibyte() {
        let (_, compound) = parse_pair("tomato sauce TOMATENSOSSE").unwrap();
        assert_eq!(compound, "tomatensosse");
        let (_, compound) = parse_pair("street Straße").unwrap();
        assert_eq!(compound, "straße");
    }

    #[test]
    fn test_parse_pair_needs_two_tokens() {
        assert!(parse_pair("").is_none());
        assert!(parse_pair("hund").is_none());
    }

    #[test]
    fn test_read_lines_skips_blanks_and_comments() {
        let text = "# corpus\n\ntomato processing tomatenverarbeitung\n  \nsauce soße\n";
        let lines = read_lines(text.as_bytes()).unwrap();
        assert_eq!(
            lines,
            vec!["tomato processing tomatenverarbeitung", "sauce soße"]
        );
    }

    #[test]
    fn test_read_corpus() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("train.txt");
        std::fs::write(&path, "Tomato Processing Tomatenverarbeitung\nhund\nthe dog hund\n").unwrap();
        let pairs = read_corpus(&path).unwrap();
        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs[1].0, vec!["the", "dog"]);
    }
}
