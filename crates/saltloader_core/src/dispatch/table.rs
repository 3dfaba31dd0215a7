//! Flattened `<virtual>.<function>` dispatch table.
//!
//! # Responsibility
//! - Hold every bound function produced by one load pass.
//! - Explain why a qualified name is missing.
//!
//! # Invariants
//! - Every entry was bound with the registry of the load pass that built the
//!   table.
//! - Mutation is crate-private; once handed out behind an `Arc` the table is
//!   read-only.

use crate::adapter::AdapterFn;
use crate::capability::{CallArgs, CallResult, CapabilityRegistry};
use crate::naming::qualify;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

/// One adapter function bound to its load-pass registry.
#[derive(Clone)]
pub struct BoundFunction {
    qualified_name: String,
    virtual_name: String,
    function_name: String,
    source_name: String,
    outputter: Option<String>,
    func: AdapterFn,
    registry: Arc<CapabilityRegistry>,
}

impl std::fmt::Debug for BoundFunction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundFunction")
            .field("qualified_name", &self.qualified_name)
            .field("source_name", &self.source_name)
            .field("outputter", &self.outputter)
            .field("context_id", &self.registry.context_id())
            .finish_non_exhaustive()
    }
}

impl BoundFunction {
    pub(crate) fn new(
        virtual_name: &str,
        function_name: &str,
        source_name: &str,
        outputter: Option<String>,
        func: AdapterFn,
        registry: Arc<CapabilityRegistry>,
    ) -> Self {
        Self {
            qualified_name: qualify(virtual_name, function_name),
            virtual_name: virtual_name.to_string(),
            function_name: function_name.to_string(),
            source_name: source_name.to_string(),
            outputter,
            func,
            registry,
        }
    }

    pub fn qualified_name(&self) -> &str {
        &self.qualified_name
    }

    pub fn virtual_name(&self) -> &str {
        &self.virtual_name
    }

    pub fn function_name(&self) -> &str {
        &self.function_name
    }

    /// Source name of the adapter that provided this function.
    pub fn source_name(&self) -> &str {
        &self.source_name
    }

    /// Outputter hint declared by the adapter.
    pub fn outputter(&self) -> Option<&str> {
        self.outputter.as_deref()
    }

    pub fn registry(&self) -> &Arc<CapabilityRegistry> {
        &self.registry
    }

    /// Calls the adapter function with its bound registry; arguments are
    /// passed through as given.
    pub fn invoke(&self, args: &CallArgs) -> CallResult {
        (self.func)(&self.registry, args)
    }
}

/// Adapter that contributed to a virtual name in the last load pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoadedModule {
    pub virtual_name: String,
    pub source_name: String,
    pub location: String,
    pub functions: Vec<String>,
}

/// Name to bound-function table for one load pass.
#[derive(Debug, Clone, Default)]
pub struct DispatchTable {
    functions: BTreeMap<String, BoundFunction>,
    loaded_modules: BTreeMap<String, Vec<LoadedModule>>,
    missing_modules: BTreeMap<String, Option<String>>,
}

impl DispatchTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, qualified_name: &str) -> Option<&BoundFunction> {
        self.functions.get(qualified_name)
    }

    pub fn contains(&self, qualified_name: &str) -> bool {
        self.functions.contains_key(qualified_name)
    }

    /// Sorted qualified names.
    pub fn qualified_names(&self) -> Vec<&str> {
        self.functions.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    /// Sorted virtual names with at least one loaded adapter.
    pub fn modules(&self) -> Vec<&str> {
        self.loaded_modules.keys().map(String::as_str).collect()
    }

    /// Adapters registered under `virtual_name`, in load order.
    pub fn providers(&self, virtual_name: &str) -> &[LoadedModule] {
        self.loaded_modules
            .get(virtual_name)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Bound functions under one virtual name.
    pub fn functions_of<'a>(
        &'a self,
        virtual_name: &'a str,
    ) -> impl Iterator<Item = &'a BoundFunction> + 'a {
        self.functions
            .values()
            .filter(move |bound| bound.virtual_name == virtual_name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &BoundFunction> {
        self.functions.values()
    }

    /// Human-readable explanation for an unresolvable name.
    ///
    /// Names under a loaded module, or under a module nobody declared, are
    /// "not available"; names under a module rejected by its eligibility
    /// check carry the rejection reason.
    pub fn missing_fun_string(&self, qualified_name: &str) -> String {
        let module = qualified_name
            .split_once('.')
            .map(|(module, _)| module)
            .unwrap_or(qualified_name);
        if self.loaded_modules.contains_key(module) {
            return format!("'{qualified_name}' is not available.");
        }
        match self.missing_modules.get(module) {
            Some(Some(reason)) => format!("'{module}' __virtual__ returned False: {reason}"),
            Some(None) => format!("'{module}' __virtual__ returned False"),
            None => format!("'{qualified_name}' is not available."),
        }
    }

    /// Inserts a binding; returns the replaced binding.
    pub(crate) fn insert(&mut self, bound: BoundFunction) -> Option<BoundFunction> {
        self.functions.insert(bound.qualified_name.clone(), bound)
    }

    pub(crate) fn record_loaded(&mut self, module: LoadedModule) {
        self.loaded_modules
            .entry(module.virtual_name.clone())
            .or_default()
            .push(module);
    }

    pub(crate) fn is_loaded(&self, virtual_name: &str) -> bool {
        self.loaded_modules.contains_key(virtual_name)
    }

    pub(crate) fn record_missing(&mut self, module: &str, reason: Option<String>) {
        self.missing_modules.insert(module.to_string(), reason);
    }
}
