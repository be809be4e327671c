use std::collections::HashMap;

/// Stable dense ids for feature names.
///
/// Names are assigned ids in registration order; ids never change once
/// assigned, so a dense weight vector can be indexed by them.
#[derive(Debug, Clone, Default)]
pub struct FeatureIndex {
    names: Vec<String>,
    ids: HashMap<String, usize>,
}

impl FeatureIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Id of `name`, registering it if new. The bool is true for a new name.
    pub fn register(&mut self, name: &str) -> (usize, bool) {
        if let Some(&id) = self.ids.get(name) {
            return (id, false);
        }
        let id = self.names.len();
        self.names.push(name.to_string());
        self.ids.insert(name.to_string(), id);
        (id, true)
    }

    pub fn id(&self, name: &str) -> Option<usize> {
        self.ids.get(name).copied()
    }

    pub fn name(&self, id: usize) -> Option<&str> {
        self.names.get(id).map(String::as_str)
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}
