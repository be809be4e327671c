//! Log-linear models of compound-word formation.
//!
//! A compound is explained by a [`derivation::Derivation`]: one translation
//! (or null) per source word, a connecting suffix after every placed piece,
//! and the order the pieces appear in. [`analyzer`] enumerates the derivations
//! of a training pair, [`features`] maps them to sparse feature vectors,
//! [`crf`] scores, normalises and trains over them, and [`decoder`] finds the
//! k best for an unseen source sentence.

pub mod analyzer;
pub mod crf;
pub mod decoder;
pub mod derivation;
pub mod features;
pub mod noise;
pub mod settings;
pub mod table;
pub mod trainer;
