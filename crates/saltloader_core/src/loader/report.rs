//! Diagnostics for adapters that contributed nothing to a load pass.

use serde::Serialize;

/// One rejected adapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IneligibleEntry {
    pub source_name: String,
    pub location: String,
    /// Declared virtual name, when the adapter has one.
    pub virtual_name: Option<String>,
    pub reason: Option<String>,
}

/// Rejected adapters of one load pass, in load order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IneligibleReport {
    entries: Vec<IneligibleEntry>,
}

impl IneligibleReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&mut self, entry: IneligibleEntry) {
        self.entries.push(entry);
    }

    pub fn entries(&self) -> &[IneligibleEntry] {
        &self.entries
    }

    pub fn iter(&self) -> impl Iterator<Item = &IneligibleEntry> {
        self.entries.iter()
    }

    /// Latest entry for a source name.
    pub fn get(&self, source_name: &str) -> Option<&IneligibleEntry> {
        self.entries
            .iter()
            .rev()
            .find(|entry| entry.source_name == source_name)
    }

    pub fn contains(&self, source_name: &str) -> bool {
        self.get(source_name).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
