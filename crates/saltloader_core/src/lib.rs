//! Core virtual-module loader.
//! This crate is the single source of truth for capability injection,
//! adapter eligibility and dispatch invariants.

pub mod adapter;
pub mod cache;
pub mod capability;
pub mod config;
pub mod dispatch;
pub mod loader;
pub mod logging;
pub mod modules;
pub mod naming;

pub use adapter::{
    AdapterError, AdapterLoadError, AdapterModule, AliasTable, EligibilityContext,
    EligibilityResult, StaticAdapter, VirtualVerdict,
};
pub use cache::{CacheBackend, CacheError, CacheResult};
pub use capability::{
    CallArgs, CallError, CallResult, Capability, CapabilityBuildError, CapabilityRegistry,
    CapabilityRegistryBuilder, RegistryError,
};
pub use config::{ConfigError, ConfigResult, LoaderOptions};
pub use dispatch::{
    call, BoundFunction, DispatchError, DispatchResult, DispatchTable, ExecutionContext,
    TableState,
};
pub use loader::{load_all, AdapterSource, IneligibleReport, ModuleLoader, StaticSource};
pub use logging::{default_log_level, init_logging, logging_status, LogTarget};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
