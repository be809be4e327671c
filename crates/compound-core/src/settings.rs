//! Global settings loaded from TOML, using a OnceLock singleton.
//!
//! - `init_custom(toml_content)` sets a custom TOML before first `settings()` call
//! - `settings()` returns `&'static Settings` (lazy-init singleton)
//! - Default values are embedded via `include_str!("default_settings.toml")`

use std::sync::OnceLock;

use serde::Deserialize;

use crate::crf::UpdateRule;

pub const DEFAULT_SETTINGS_TOML: &str = include_str!("default_settings.toml");

static CUSTOM_TOML: OnceLock<String> = OnceLock::new();

/// Set custom TOML before first `settings()` call.
pub fn init_custom(toml_content: String) -> Result<(), SettingsError> {
    parse_settings_toml(&toml_content)?;
    CUSTOM_TOML
        .set(toml_content)
        .map_err(|_| SettingsError::AlreadyInitialized)
}

/// Get or initialize the global settings singleton.
pub fn settings() -> &'static Settings {
    static INSTANCE: OnceLock<Settings> = OnceLock::new();
    INSTANCE.get_or_init(|| {
        let toml_str = CUSTOM_TOML
            .get()
            .map(|s| s.as_str())
            .unwrap_or(DEFAULT_SETTINGS_TOML);
        parse_settings_toml(toml_str).expect("settings TOML must be valid")
    })
}

/// Returns the embedded default settings TOML content.
pub fn default_toml() -> &'static str {
    DEFAULT_SETTINGS_TOML
}

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("TOML parse error: {0}")]
    Parse(String),
    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
    #[error("settings already initialized")]
    AlreadyInitialized,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub features: FeatureSettings,
    pub noise: NoiseSettings,
    pub training: TrainingSettings,
    pub decoder: DecoderSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeatureSettings {
    /// Lexical score for a (source, target) pair missing from a table.
    pub oov_score: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NoiseSettings {
    /// Forward score assigned to unknown pairs by the noise distribution.
    pub oov_score: f64,
    pub samples: usize,
    pub null_probability: f64,
    pub seed: u64,
}

/// Which loss `train` minimises.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Objective {
    Likelihood,
    Nce,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TrainingSettings {
    pub objective: Objective,
    pub update: UpdateRule,
    pub learning_rate: f64,
    pub l2_strength: f64,
    pub iterations: usize,
    pub initial_weight: f64,
    pub initial_history: f64,
    pub rho: f64,
    pub epsilon: f64,
    pub max_source_len: usize,
    pub seed: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DecoderSettings {
    pub kbest: usize,
}

pub fn parse_settings_toml(toml_str: &str) -> Result<Settings, SettingsError> {
    let s: Settings = toml::from_str(toml_str).map_err(|e| SettingsError::Parse(e.to_string()))?;
    validate(&s)?;
    Ok(s)
}

fn validate(s: &Settings) -> Result<(), SettingsError> {
    macro_rules! check_non_negative {
        ($section:ident . $field:ident) => {
            if s.$section.$field < 0.0 {
                return Err(SettingsError::InvalidValue {
                    field: concat!(stringify!($section), ".", stringify!($field)).to_string(),
                    reason: "must be non-negative".to_string(),
                });
            }
        };
    }
    macro_rules! check_positive_usize {
        ($section:ident . $field:ident) => {
            if s.$section.$field == 0 {
                return Err(SettingsError::InvalidValue {
                    field: concat!(stringify!($section), ".", stringify!($field)).to_string(),
                    reason: "must be positive".to_string(),
                });
            }
        };
    }
    macro_rules! check_open_unit {
        ($section:ident . $field:ident) => {
            if !(s.$section.$field > 0.0 && s.$section.$field < 1.0) {
                return Err(SettingsError::InvalidValue {
                    field: concat!(stringify!($section), ".", stringify!($field)).to_string(),
                    reason: "must be in (0, 1)".to_string(),
                });
            }
        };
    }

    if s.noise.null_probability < 0.0 || s.noise.null_probability > 1.0 {
        return Err(SettingsError::InvalidValue {
            field: "noise.null_probability".to_string(),
            reason: "must be in [0, 1]".to_string(),
        });
    }
    check_positive_usize!(noise.samples);

    check_non_negative!(training.learning_rate);
    check_non_negative!(training.l2_strength);
    check_non_negative!(training.initial_history);
    check_open_unit!(training.rho);
    if s.training.epsilon <= 0.0 {
        return Err(SettingsError::InvalidValue {
            field: "training.epsilon".to_string(),
            reason: "must be positive".to_string(),
        });
    }
    check_positive_usize!(training.max_source_len);
    // 2^n subsets in the exact partition function
    if s.training.max_source_len > 16 {
        return Err(SettingsError::InvalidValue {
            field: "training.max_source_len".to_string(),
            reason: "must be at most 16".to_string(),
        });
    }

    check_positive_usize!(decoder.kbest);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID: &str = r#"
[features]
oov_score = -5.0

[noise]
oov_score = -8.0
samples = 20
null_probability = 0.2
seed = 7

[training]
objective = "likelihood"
update = "sgd"
learning_rate = 0.05
l2_strength = 0.5
iterations = 10
initial_weight = 0.0
initial_history = 1.0
rho = 0.9
epsilon = 1e-8
max_source_len = 4
seed = 3

[decoder]
kbest = 3
"#;

    #[test]
    fn parse_default_toml() {
        let s = parse_settings_toml(DEFAULT_SETTINGS_TOML).unwrap();
        assert!((s.features.oov_score + 10.0).abs() < f64::EPSILON);
        assert!((s.noise.oov_score + 10.0).abs() < f64::EPSILON);
        assert_eq!(s.noise.samples, 100);
        assert_eq!(s.training.objective, Objective::Nce);
        assert_eq!(s.training.update, UpdateRule::Adadelta);
        assert!((s.training.learning_rate - 0.1).abs() < f64::EPSILON);
        assert!((s.training.l2_strength - 1.0).abs() < f64::EPSILON);
        assert_eq!(s.training.iterations, 100);
        assert!((s.training.initial_weight - 3.0).abs() < f64::EPSILON);
        assert!((s.training.rho - 0.95).abs() < f64::EPSILON);
        assert!((s.training.epsilon - 1.0e-6).abs() < f64::EPSILON);
        assert_eq!(s.training.max_source_len, 5);
        assert_eq!(s.decoder.kbest, 10);
    }

    #[test]
    fn parse_valid_custom_toml() {
        let s = parse_settings_toml(VALID).unwrap();
        assert_eq!(s.training.objective, Objective::Likelihood);
        assert_eq!(s.training.update, UpdateRule::Sgd);
        assert_eq!(s.training.max_source_len, 4);
        assert_eq!(s.decoder.kbest, 3);
    }

    #[test]
    fn error_rho_out_of_range() {
        let toml = VALID.replace("rho = 0.9", "rho = 1.0");
        let err = parse_settings_toml(&toml).unwrap_err();
        assert!(matches!(err, SettingsError::InvalidValue { .. }));
        assert!(err.to_string().contains("training.rho"));
    }

    #[test]
    fn error_zero_kbest() {
        let toml = VALID.replace("kbest = 3", "kbest = 0");
        let err = parse_settings_toml(&toml).unwrap_err();
        assert!(err.to_string().contains("decoder.kbest"));
    }

    #[test]
    fn error_null_probability() {
        let toml = VALID.replace("null_probability = 0.2", "null_probability = 1.5");
        let err = parse_settings_toml(&toml).unwrap_err();
        assert!(err.to_string().contains("noise.null_probability"));
    }

    #[test]
    fn error_source_len_too_large() {
        let toml = VALID.replace("max_source_len = 4", "max_source_len = 20");
        let err = parse_settings_toml(&toml).unwrap_err();
        assert!(err.to_string().contains("max_source_len"));
    }

    #[test]
    fn error_unknown_objective() {
        let toml = VALID.replace("\"likelihood\"", "\"hinge\"");
        let err = parse_settings_toml(&toml).unwrap_err();
        assert!(matches!(err, SettingsError::Parse(_)));
    }

    #[test]
    fn error_invalid_toml() {
        let err = parse_settings_toml("not valid toml {{{").unwrap_err();
        assert!(matches!(err, SettingsError::Parse(_)));
    }

    #[test]
    fn error_missing_section() {
        let toml = r#"
[features]
oov_score = -10.0
"#;
        let err = parse_settings_toml(toml).unwrap_err();
        assert!(matches!(err, SettingsError::Parse(_)));
    }
}
