//! Names of structs recorded across compilation contexts

use std::collections::HashSet;

use parking_lot::Mutex;

/// Process-wide set of struct names
#[derive(Debug, Default)]
pub struct StructInfoSet {
    names: Mutex<HashSet<String>>,
}

impl StructInfoSet {
    /// Empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `name`; returns false if it was already present
    pub fn insert(&self, name: impl Into<String>) -> bool {
        self.names.lock().insert(name.into())
    }

    /// Check whether `name` was recorded
    pub fn contains(&self, name: &str) -> bool {
        self.names.lock().contains(name)
    }

    /// Number of recorded names
    pub fn len(&self) -> usize {
        self.names.lock().len()
    }

    /// Check whether nothing was recorded
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Forget every name
    pub fn clear(&self) {
        self.names.lock().clear();
    }
}
