//! Text and JSON rendering of scored derivations.

use serde::Serialize;

use compound_core::derivation::Derivation;
use compound_core::features::FeatureVector;

/// `name=value` pairs separated by spaces, in name order.
pub fn format_features(features: &FeatureVector) -> String {
    features
        .iter()
        .map(|(name, value)| format!("{name}={value}"))
        .collect::<Vec<_>>()
        .join(" ")
}

/// `rank ||| piece+suffix ... ||| permutation ||| feature=value ...`
pub fn format_hypothesis(rank: usize, derivation: &Derivation, features: &FeatureVector) -> String {
    format!("{rank} ||| {derivation} ||| {}", format_features(features))
}

#[derive(Debug, Serialize)]
pub struct HypothesisRecord {
    pub rank: usize,
    pub score: f64,
    pub derivation: Derivation,
    pub reconstruction: String,
    pub features: Vec<(String, f64)>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matches_target: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct PredictionRecord {
    pub source: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    pub hypotheses: Vec<HypothesisRecord>,
}

impl PredictionRecord {
    /// One protocol line per hypothesis. The score is only part of the JSON
    /// record.
    pub fn text_lines(&self) -> Vec<String> {
        self.hypotheses
            .iter()
            .map(|h| {
                let features: FeatureVector = h.features.iter().cloned().collect();
                format_hypothesis(h.rank, &h.derivation, &features)
            })
            .collect()
    }

    /// Whether the best hypothesis reconstructs the target. `None` without a
    /// target.
    pub fn top_matches(&self) -> Option<bool> {
        self.target.as_ref()?;
        Some(
            self.hypotheses
                .first()
                .and_then(|h| h.matches_target)
                .unwrap_or(false),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> (Derivation, FeatureVector) {
        let derivation = Derivation::new(
            vec!["tomate".into(), "".into(), "verarbeitung".into()],
            vec!["n".into(), "".into(), "".into()],
            vec![0, 2],
        );
        let features: FeatureVector = [
            ("tgt_null".to_string(), 1.0),
            ("fwd_score".to_string(), -0.3),
            ("monotone".to_string(), 1.0),
        ]
        .into_iter()
        .collect();
        (derivation, features)
    }

    #[test]
    fn test_format_hypothesis() {
        let (derivation, features) = sample();
        assert_eq!(
            format_hypothesis(0, &derivation, &features),
            "0 ||| tomate+n NULL verarbeitung+ ||| 0 2 ||| fwd_score=-0.3 monotone=1 tgt_null=1"
        );
    }

    #[test]
    fn test_json_record() {
        let (derivation, _) = sample();
        let record = HypothesisRecord {
            rank: 0,
            score: 1.5,
            reconstruction: derivation.reconstruct(),
            derivation,
            features: vec![("monotone".into(), 1.0)],
            matches_target: None,
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["reconstruction"], "tomatenverarbeitung");
        assert_eq!(json["derivation"]["permutation"], serde_json::json!([0, 2]));
        assert!(json.get("matches_target").is_none());
    }

    #[test]
    fn test_text_lines_follow_protocol() {
        let (derivation, features) = sample();
        let record = PredictionRecord {
            source: vec!["tomato".into(), "the".into(), "processing".into()],
            target: None,
            hypotheses: vec![HypothesisRecord {
                rank: 0,
                score: 2.75,
                reconstruction: derivation.reconstruct(),
                derivation,
                features: features.iter().map(|(n, v)| (n.to_string(), v)).collect(),
                matches_target: None,
            }],
        };
        let lines = record.text_lines();
        assert_eq!(
            lines,
            vec!["0 ||| tomate+n NULL verarbeitung+ ||| 0 2 ||| fwd_score=-0.3 monotone=1 tgt_null=1"]
        );
        assert_eq!(lines[0].split(" ||| ").count(), 4);
    }

    #[test]
    fn test_top_matches() {
        let (derivation, _) = sample();
        let mut record = PredictionRecord {
            source: vec!["tomato".into(), "the".into(), "processing".into()],
            target: None,
            hypotheses: vec![HypothesisRecord {
                rank: 0,
                score: 0.0,
                reconstruction: derivation.reconstruct(),
                derivation,
                features: Vec::new(),
                matches_target: Some(true),
            }],
        };
        assert_eq!(record.top_matches(), None);
        record.target = Some("tomatenverarbeitung".into());
        assert_eq!(record.top_matches(), Some(true));
        record.hypotheses.clear();
        assert_eq!(record.top_matches(), Some(false));
    }
}
