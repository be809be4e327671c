use serde::{Deserialize, Serialize};

use crate::settings::settings;

/// How gradients turn into weight changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdateRule {
    /// `w -= learning_rate * g`
    Sgd,
    /// Adaptive per-feature step from decayed squared gradients and updates.
    Adadelta,
}

/// Per-feature optimizer state, indexed like the weight vector.
#[derive(Debug, Clone)]
pub(crate) struct Optimizer {
    rule: UpdateRule,
    rho: f64,
    epsilon: f64,
    initial_history: f64,
    squared_gradients: Vec<f64>,
    squared_updates: Vec<f64>,
}

impl Optimizer {
    pub fn from_settings() -> Self {
        let t = &settings().training;
        Self::new(t.update, t.rho, t.epsilon, t.initial_history)
    }

    pub fn new(rule: UpdateRule, rho: f64, epsilon: f64, initial_history: f64) -> Self {
        Self {
            rule,
            rho,
            epsilon,
            initial_history,
            squared_gradients: Vec::new(),
            squared_updates: Vec::new(),
        }
    }

    pub fn rule(&self) -> UpdateRule {
        self.rule
    }

    pub fn set_rule(&mut self, rule: UpdateRule) {
        self.rule = rule;
    }

    /// Add state for one newly registered feature.
    pub fn register(&mut self) {
        self.squared_gradients.push(self.initial_history);
        self.squared_updates.push(self.initial_history);
    }

    /// Apply one update in place. `weights` and `gradients` share the feature ids.
    pub fn step(&mut self, weights: &mut [f64], gradients: &[f64], learning_rate: f64) {
        debug_assert_eq!(weights.len(), gradients.len());
        debug_assert_eq!(weights.len(), self.squared_gradients.len());
        match self.rule {
            UpdateRule::Sgd => {
                for (w, &g) in weights.iter_mut().zip(gradients) {
                    *w -= learning_rate * g;
                }
            }
            UpdateRule::Adadelta => {
                let rho = self.rho;
                let eps = self.epsilon;
                for (i, (w, &g)) in weights.iter_mut().zip(gradients).enumerate() {
                    let eg = &mut self.squared_gradients[i];
                    *eg = rho * *eg + (1.0 - rho) * g * g;
                    let ed = &mut self.squared_updates[i];
                    let delta = -g * (*ed + eps).sqrt() / (*eg + eps).sqrt();
                    *ed = rho * *ed + (1.0 - rho) * delta * delta;
                    *w += delta;
                }
            }
        }
    }
}
