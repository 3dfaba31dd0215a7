//! Declarative adapter builder.
//!
//! Adapters are written as explicit tables of named functions instead of
//! being discovered by reflection over a live module or client object.

use crate::adapter::{
    AdapterError, AdapterFn, AdapterModule, AliasTable, EligibilityContext, VirtualVerdict,
};
use crate::capability::{CallArgs, CallResult, CapabilityRegistry};
use crate::config::LoaderOptions;
use std::collections::BTreeMap;
use std::sync::Arc;

type InitFn = Arc<dyn Fn(&LoaderOptions) -> Result<(), AdapterError> + Send + Sync>;
type CheckFn =
    Arc<dyn Fn(&EligibilityContext<'_>) -> Result<VirtualVerdict, AdapterError> + Send + Sync>;

/// Adapter assembled from closures.
#[derive(Clone)]
pub struct StaticAdapter {
    source_name: String,
    virtual_name: Option<String>,
    virtual_aliases: Vec<String>,
    requires: Vec<String>,
    platforms: Vec<String>,
    proxy_enabled: Vec<String>,
    proxy_only: bool,
    init: Option<InitFn>,
    check: Option<CheckFn>,
    functions: BTreeMap<String, AdapterFn>,
    load_list: Option<Vec<String>>,
    alias_table: AliasTable,
    outputters: BTreeMap<String, String>,
}

impl std::fmt::Debug for StaticAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticAdapter")
            .field("source_name", &self.source_name)
            .field("virtual_name", &self.virtual_name)
            .field("functions", &self.functions.keys().collect::<Vec<_>>())
            .field("alias_table", &self.alias_table)
            .finish_non_exhaustive()
    }
}

impl StaticAdapter {
    pub fn new(source_name: impl Into<String>) -> Self {
        Self {
            source_name: source_name.into(),
            virtual_name: None,
            virtual_aliases: Vec::new(),
            requires: Vec::new(),
            platforms: Vec::new(),
            proxy_enabled: Vec::new(),
            proxy_only: false,
            init: None,
            check: None,
            functions: BTreeMap::new(),
            load_list: None,
            alias_table: AliasTable::default(),
            outputters: BTreeMap::new(),
        }
    }

    pub fn virtual_name(mut self, name: impl Into<String>) -> Self {
        self.virtual_name = Some(name.into());
        self
    }

    pub fn virtual_alias(mut self, alias: impl Into<String>) -> Self {
        self.virtual_aliases.push(alias.into());
        self
    }

    pub fn requires(mut self, capability: impl Into<String>) -> Self {
        self.requires.push(capability.into());
        self
    }

    /// Restricts loading to hosts with this kernel grain; repeatable.
    pub fn platform(mut self, kernel: impl Into<String>) -> Self {
        self.platforms.push(kernel.into());
        self
    }

    pub fn proxy_enabled(mut self, proxy_types: &[&str]) -> Self {
        self.proxy_enabled
            .extend(proxy_types.iter().map(|value| value.to_string()));
        self
    }

    pub fn proxy_only(mut self) -> Self {
        self.proxy_only = true;
        self
    }

    pub fn on_init<F>(mut self, init: F) -> Self
    where
        F: Fn(&LoaderOptions) -> Result<(), AdapterError> + Send + Sync + 'static,
    {
        self.init = Some(Arc::new(init));
        self
    }

    /// Installs the eligibility check; without one the adapter always loads.
    pub fn eligible_when<F>(mut self, check: F) -> Self
    where
        F: Fn(&EligibilityContext<'_>) -> Result<VirtualVerdict, AdapterError>
            + Send
            + Sync
            + 'static,
    {
        self.check = Some(Arc::new(check));
        self
    }

    pub fn function<F>(mut self, name: impl Into<String>, func: F) -> Self
    where
        F: Fn(&CapabilityRegistry, &CallArgs) -> CallResult + Send + Sync + 'static,
    {
        self.functions.insert(name.into(), Arc::new(func));
        self
    }

    pub fn alias(mut self, internal: impl Into<String>, external: impl Into<String>) -> Self {
        self.alias_table.insert(internal, external);
        self
    }

    pub fn load_only(mut self, names: &[&str]) -> Self {
        self.load_list = Some(names.iter().map(|name| name.to_string()).collect());
        self
    }

    pub fn outputter(mut self, function: impl Into<String>, outputter: impl Into<String>) -> Self {
        self.outputters.insert(function.into(), outputter.into());
        self
    }

    /// Wraps the adapter for use in an adapter source.
    pub fn into_module(self) -> Arc<dyn AdapterModule> {
        Arc::new(self)
    }
}

impl AdapterModule for StaticAdapter {
    fn source_name(&self) -> &str {
        &self.source_name
    }

    fn declared_virtual_name(&self) -> Option<&str> {
        self.virtual_name.as_deref()
    }

    fn virtual_aliases(&self) -> Vec<String> {
        self.virtual_aliases.clone()
    }

    fn requires(&self) -> Vec<String> {
        self.requires.clone()
    }

    fn platforms(&self) -> Vec<String> {
        self.platforms.clone()
    }

    fn proxy_enabled(&self) -> Vec<String> {
        self.proxy_enabled.clone()
    }

    fn proxy_only(&self) -> bool {
        self.proxy_only
    }

    fn init(&self, options: &LoaderOptions) -> Result<(), AdapterError> {
        match &self.init {
            Some(init) => init(options),
            None => Ok(()),
        }
    }

    fn check(&self, ctx: &EligibilityContext<'_>) -> Result<VirtualVerdict, AdapterError> {
        match &self.check {
            Some(check) => check(ctx),
            None => Ok(VirtualVerdict::Load),
        }
    }

    fn has_virtual_check(&self) -> bool {
        self.check.is_some()
    }

    fn functions(&self) -> BTreeMap<String, AdapterFn> {
        self.functions.clone()
    }

    fn load_list(&self) -> Option<Vec<String>> {
        self.load_list.clone()
    }

    fn alias_table(&self) -> AliasTable {
        self.alias_table.clone()
    }

    fn outputters(&self) -> BTreeMap<String, String> {
        self.outputters.clone()
    }
}
