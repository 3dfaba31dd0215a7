//! Execution context: one registry, its adapter sources and the live table.
//!
//! # Responsibility
//! - Own the frozen registry for one context.
//! - Rebuild the dispatch table wholesale on `sync` and publish it with a
//!   single pointer swap.
//!
//! # Invariants
//! - Readers see either the previous load pass or the new one, never a
//!   partially merged table.
//! - Snapshots taken before a sync stay valid and unchanged.
//! - Concurrent `sync` calls are serialized; each produces one generation.

use crate::capability::{self, CallArgs, CapabilityRegistry};
use crate::config::LoaderOptions;
use crate::dispatch::{call, DispatchResult, DispatchTable};
use crate::loader::{AdapterSource, IneligibleReport, ModuleLoader};
use log::info;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Instant;

/// Table lifecycle as seen by callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableState {
    Empty,
    Built { generation: u64 },
}

/// Result of one published load pass.
#[derive(Debug, Clone, Default)]
pub struct LoadPass {
    generation: u64,
    table: Arc<DispatchTable>,
    report: Arc<IneligibleReport>,
}

impl LoadPass {
    /// Zero before the first pass.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn table(&self) -> &Arc<DispatchTable> {
        &self.table
    }

    pub fn report(&self) -> &Arc<IneligibleReport> {
        &self.report
    }
}

/// Live dispatch state for one execution context.
pub struct ExecutionContext {
    registry: Arc<CapabilityRegistry>,
    sources: Vec<Arc<dyn AdapterSource>>,
    loader: ModuleLoader,
    current: RwLock<Arc<LoadPass>>,
    sync_lock: Mutex<()>,
}

impl std::fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("context_id", &self.registry.context_id())
            .field("tag", &self.loader.tag())
            .field("sources", &self.sources.len())
            .field("state", &self.state())
            .finish()
    }
}

impl ExecutionContext {
    /// Builds the registry from `options` and runs the first load pass.
    pub fn new(options: LoaderOptions, sources: Vec<Arc<dyn AdapterSource>>) -> Self {
        let registry = capability::build(options);
        Self::with_registry(registry, sources)
    }

    /// Uses a caller-built registry and runs the first load pass.
    pub fn with_registry(
        registry: CapabilityRegistry,
        sources: Vec<Arc<dyn AdapterSource>>,
    ) -> Self {
        let context = Self::prepare(Arc::new(registry), sources, ModuleLoader::default());
        context.sync();
        context
    }

    /// Creates a context with an empty table; nothing is loaded until `sync`.
    pub fn prepare(
        registry: Arc<CapabilityRegistry>,
        sources: Vec<Arc<dyn AdapterSource>>,
        loader: ModuleLoader,
    ) -> Self {
        Self {
            registry,
            sources,
            loader,
            current: RwLock::new(Arc::new(LoadPass::default())),
            sync_lock: Mutex::new(()),
        }
    }

    pub fn registry(&self) -> &Arc<CapabilityRegistry> {
        &self.registry
    }

    pub fn loader(&self) -> &ModuleLoader {
        &self.loader
    }

    pub fn state(&self) -> TableState {
        match self.current().generation {
            0 => TableState::Empty,
            generation => TableState::Built { generation },
        }
    }

    /// Current load pass.
    pub fn current(&self) -> Arc<LoadPass> {
        let current = self.current.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&current)
    }

    /// Current table; unaffected by later syncs.
    pub fn snapshot(&self) -> Arc<DispatchTable> {
        Arc::clone(&self.current().table)
    }

    pub fn report(&self) -> Arc<IneligibleReport> {
        Arc::clone(&self.current().report)
    }

    /// Re-runs a full load pass against the same registry and publishes it.
    pub fn sync(&self) -> Arc<LoadPass> {
        let _guard = self.sync_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let started_at = Instant::now();
        let previous = self.current().generation;
        let (table, report) = self.loader.load_all(&self.sources, &self.registry);
        let pass = Arc::new(LoadPass {
            generation: previous + 1,
            table: Arc::new(table),
            report: Arc::new(report),
        });
        {
            let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
            *current = Arc::clone(&pass);
        }
        info!(
            "event=table_rebuild module=dispatch status=ok tag={} context_id={} generation={} functions={} modules={} ineligible={} duration_ms={}",
            self.loader.tag(),
            self.registry.context_id(),
            pass.generation,
            pass.table.len(),
            pass.table.modules().len(),
            pass.report.len(),
            started_at.elapsed().as_millis()
        );
        pass
    }

    /// Dispatches against the current snapshot.
    pub fn call(&self, qualified_name: &str, args: &CallArgs) -> DispatchResult {
        let table = self.snapshot();
        call(&table, qualified_name, args)
    }
}

#[cfg(test)]
mod tests {
    use super::{ExecutionContext, TableState};
    use crate::adapter::StaticAdapter;
    use crate::capability::{CallArgs, CapabilityRegistryBuilder};
    use crate::config::LoaderOptions;
    use crate::loader::{ModuleLoader, StaticSource};
    use serde_json::json;
    use std::sync::Arc;

    #[test]
    fn prepare_starts_empty_until_sync() {
        let registry = Arc::new(CapabilityRegistryBuilder::new(LoaderOptions::new()).freeze());
        let source = StaticSource::new("builtin")
            .with(
                StaticAdapter::new("test")
                    .function("ping", |_, _| Ok(json!(true)))
                    .into_module(),
            )
            .into_source();
        let context = ExecutionContext::prepare(registry, vec![source], ModuleLoader::default());

        assert_eq!(context.state(), TableState::Empty);
        assert!(context
            .call("test.ping", &CallArgs::new())
            .expect_err("empty table")
            .is_unknown_capability());

        context.sync();
        assert_eq!(context.state(), TableState::Built { generation: 1 });
        assert_eq!(
            context.call("test.ping", &CallArgs::new()).expect("ping"),
            json!(true)
        );
    }
}
