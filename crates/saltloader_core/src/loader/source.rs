//! Adapter search locations.

use crate::adapter::AdapterModule;
use std::sync::Arc;

/// One ordered location adapters are loaded from.
pub trait AdapterSource: Send + Sync {
    /// Label used in logs and the ineligible report.
    fn location(&self) -> &str;

    /// Adapters in load order.
    fn adapters(&self) -> Vec<Arc<dyn AdapterModule>>;
}

/// Fixed list of adapters compiled into the binary.
#[derive(Clone)]
pub struct StaticSource {
    location: String,
    adapters: Vec<Arc<dyn AdapterModule>>,
}

impl std::fmt::Debug for StaticSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticSource")
            .field("location", &self.location)
            .field(
                "adapters",
                &self
                    .adapters
                    .iter()
                    .map(|adapter| adapter.source_name().to_string())
                    .collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl StaticSource {
    pub fn new(location: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            adapters: Vec::new(),
        }
    }

    pub fn with(mut self, adapter: Arc<dyn AdapterModule>) -> Self {
        self.push(adapter);
        self
    }

    pub fn push(&mut self, adapter: Arc<dyn AdapterModule>) {
        self.adapters.push(adapter);
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }

    pub fn into_source(self) -> Arc<dyn AdapterSource> {
        Arc::new(self)
    }
}

impl AdapterSource for StaticSource {
    fn location(&self) -> &str {
        &self.location
    }

    fn adapters(&self) -> Vec<Arc<dyn AdapterModule>> {
        self.adapters.clone()
    }
}
