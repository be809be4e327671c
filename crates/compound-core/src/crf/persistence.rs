use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::{CrfModel, ModelError};
use crate::features::{FeatureScorer, SuffixVocabulary};

const MAGIC: &[u8; 4] = b"CPMD";
const VERSION: u8 = 1;

/// Everything needed to rebuild a trained model, minus the translation tables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSnapshot {
    /// `(feature name, weight)` in registration order.
    pub features: Vec<(String, f64)>,
    pub suffixes: SuffixVocabulary,
}

impl ModelSnapshot {
    /// Serialize to bytes (CPMD format).
    pub fn to_bytes(&self) -> Result<Vec<u8>, ModelError> {
        let body = bincode::serialize(self)?;
        let mut buf = Vec::with_capacity(5 + body.len());
        buf.extend_from_slice(MAGIC);
        buf.push(VERSION);
        buf.extend_from_slice(&body);
        Ok(buf)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ModelError> {
        if bytes.len() < 5 {
            return Err(ModelError::Snapshot("too short".to_string()));
        }
        if &bytes[0..4] != MAGIC {
            return Err(ModelError::Snapshot("bad magic".to_string()));
        }
        if bytes[4] != VERSION {
            return Err(ModelError::Snapshot(format!(
                "unsupported version {}",
                bytes[4]
            )));
        }
        Ok(bincode::deserialize(&bytes[5..])?)
    }

    /// Atomic write: write to .tmp then rename.
    pub fn save(&self, path: &Path) -> Result<(), ModelError> {
        let bytes = self.to_bytes()?;
        let tmp = path.with_extension("tmp");
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&tmp, &bytes)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self, ModelError> {
        Self::from_bytes(&fs::read(path)?)
    }
}

impl<'a> CrfModel<'a> {
    pub fn snapshot(&self) -> ModelSnapshot {
        ModelSnapshot {
            features: self
                .index
                .names()
                .iter()
                .cloned()
                .zip(self.weights.iter().copied())
                .collect(),
            suffixes: self.suffixes.clone(),
        }
    }

    /// Rebuild a model from `snapshot`, scoring with `scorer`.
    ///
    /// Features keep their saved order, so the dense ids match the ones the
    /// weights were trained under.
    pub fn from_snapshot(
        scorer: FeatureScorer<'a>,
        snapshot: ModelSnapshot,
    ) -> Result<Self, ModelError> {
        // null positions decode with the empty suffix
        if !snapshot.suffixes.contains("") {
            return Err(ModelError::Snapshot(
                "suffix vocabulary lacks the empty suffix".to_string(),
            ));
        }
        let mut model = Self::new(scorer, snapshot.suffixes);
        for (name, weight) in &snapshot.features {
            model.add_feature(name);
            model.set_weight(name, *weight)?;
        }
        Ok(model)
    }
}
