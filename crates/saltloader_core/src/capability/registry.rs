//! Capability registry and its builder.
//!
//! # Responsibility
//! - Map symbolic keys (`cmd.run`, `config.option`, ...) to callables or
//!   config values for one execution context.
//! - Record capabilities whose backing resource failed to build.
//!
//! # Invariants
//! - Only `CapabilityRegistryBuilder` can add or rebind keys; a built
//!   `CapabilityRegistry` has no mutating API (it is frozen).
//! - Each registry owns a fresh context id and scratch space.

use crate::capability::args::{CallArgs, CallError, CallResult};
use crate::capability::grains::effective_grains;
use crate::capability::scratch::ScratchSpace;
use crate::config::{traverse, LoaderOptions, DEFAULT_TARGET_DELIM};
use crate::naming::split_qualified;
use log::debug;
use once_cell::sync::OnceCell;
use serde_json::Value;
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;
use uuid::Uuid;

/// Callable capability signature.
pub type CapabilityFn = Arc<dyn Fn(&CallArgs) -> CallResult + Send + Sync>;

/// One registry entry.
#[derive(Clone)]
pub enum Capability {
    Callable(CapabilityFn),
    Config(Value),
}

impl std::fmt::Debug for Capability {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Callable(_) => write!(f, "Callable(..)"),
            Self::Config(value) => f.debug_tuple("Config").field(value).finish(),
        }
    }
}

/// A capability whose backing resource could not be constructed.
///
/// Non-fatal for the registry; fatal only for adapters that require the key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapabilityBuildError {
    pub capability: String,
    pub reason: String,
}

impl CapabilityBuildError {
    pub fn new(capability: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            capability: capability.into(),
            reason: reason.into(),
        }
    }
}

impl Display for CapabilityBuildError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "capability `{}` could not be built: {}",
            self.capability, self.reason
        )
    }
}

impl Error for CapabilityBuildError {}

/// Builder misuse errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    InvalidKey(String),
    DuplicateKey(String),
}

impl Display for RegistryError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidKey(value) => {
                write!(f, "capability key is invalid (expected `<ns>.<name>`): {value}")
            }
            Self::DuplicateKey(value) => write!(f, "capability key already bound: {value}"),
        }
    }
}

impl Error for RegistryError {}

static NO_GRAINS: Value = Value::Null;

/// Effective grains as published by `freeze`.
///
/// Capabilities bound before freezing read grains through this handle, so a
/// later `with_grains` is seen by them and by the registry alike.
#[derive(Debug, Clone, Default)]
pub struct FrozenGrains(Arc<OnceCell<Value>>);

impl FrozenGrains {
    /// Final grains; `Null` until the owning builder is frozen.
    pub fn get(&self) -> &Value {
        self.0.get().unwrap_or(&NO_GRAINS)
    }
}

/// Mutable registry under construction.
pub struct CapabilityRegistryBuilder {
    options: LoaderOptions,
    grains: Value,
    frozen_grains: FrozenGrains,
    entries: BTreeMap<String, Capability>,
    unavailable: BTreeMap<String, CapabilityBuildError>,
}

impl CapabilityRegistryBuilder {
    /// Starts an empty builder; grains are detected host facts merged with
    /// configured overrides.
    pub fn new(options: LoaderOptions) -> Self {
        let grains = effective_grains(&options);
        Self {
            options,
            grains,
            frozen_grains: FrozenGrains::default(),
            entries: BTreeMap::new(),
            unavailable: BTreeMap::new(),
        }
    }

    pub fn options(&self) -> &LoaderOptions {
        &self.options
    }

    pub fn grains(&self) -> &Value {
        &self.grains
    }

    /// Handle to the grains this builder will freeze with.
    pub fn frozen_grains(&self) -> FrozenGrains {
        self.frozen_grains.clone()
    }

    /// Replaces the effective grains wholesale, including for capabilities
    /// already bound through `frozen_grains`.
    pub fn with_grains(mut self, grains: Value) -> Self {
        self.grains = grains;
        self
    }

    /// Binds a callable under a new key.
    pub fn bind<F>(&mut self, key: &str, func: F) -> Result<&mut Self, RegistryError>
    where
        F: Fn(&CallArgs) -> CallResult + Send + Sync + 'static,
    {
        self.insert(key, Capability::Callable(Arc::new(func)), false)
    }

    /// Binds a config value under a new key.
    pub fn bind_value(&mut self, key: &str, value: Value) -> Result<&mut Self, RegistryError> {
        self.insert(key, Capability::Config(value), false)
    }

    /// Binds or replaces a key. Clears any recorded build failure for it.
    pub fn rebind<F>(&mut self, key: &str, func: F) -> Result<&mut Self, RegistryError>
    where
        F: Fn(&CallArgs) -> CallResult + Send + Sync + 'static,
    {
        self.insert(key, Capability::Callable(Arc::new(func)), true)
    }

    /// Records that a capability could not be built. Any existing binding for
    /// the key is removed.
    pub fn mark_unavailable(&mut self, error: CapabilityBuildError) -> &mut Self {
        self.entries.remove(error.capability.as_str());
        self.unavailable.insert(error.capability.clone(), error);
        self
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Freezes the builder into a registry with a fresh context id and
    /// scratch space.
    pub fn freeze(self) -> CapabilityRegistry {
        let _ = self.frozen_grains.0.set(self.grains.clone());
        let registry = CapabilityRegistry {
            context_id: Uuid::new_v4(),
            options: self.options,
            grains: self.grains,
            entries: self.entries,
            unavailable: self.unavailable,
            scratch: ScratchSpace::new(),
        };
        debug!(
            "event=registry_freeze module=capability status=ok context_id={} capabilities={} unavailable={}",
            registry.context_id,
            registry.entries.len(),
            registry.unavailable.len()
        );
        registry
    }

    fn insert(
        &mut self,
        key: &str,
        capability: Capability,
        replace: bool,
    ) -> Result<&mut Self, RegistryError> {
        let key = key.trim();
        if split_qualified(key).is_none() {
            return Err(RegistryError::InvalidKey(key.to_string()));
        }
        if !replace && self.entries.contains_key(key) {
            return Err(RegistryError::DuplicateKey(key.to_string()));
        }
        self.unavailable.remove(key);
        self.entries.insert(key.to_string(), capability);
        Ok(self)
    }
}

/// Frozen, read-only capability registry for one execution context.
pub struct CapabilityRegistry {
    context_id: Uuid,
    options: LoaderOptions,
    grains: Value,
    entries: BTreeMap<String, Capability>,
    unavailable: BTreeMap<String, CapabilityBuildError>,
    scratch: ScratchSpace,
}

impl std::fmt::Debug for CapabilityRegistry {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapabilityRegistry")
            .field("context_id", &self.context_id)
            .field("entries", &self.entries.keys().collect::<Vec<_>>())
            .field("unavailable", &self.unavailable.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl CapabilityRegistry {
    pub fn context_id(&self) -> Uuid {
        self.context_id
    }

    pub fn options(&self) -> &LoaderOptions {
        &self.options
    }

    pub fn grains(&self) -> &Value {
        &self.grains
    }

    /// Colon-path lookup in effective grains.
    pub fn grain(&self, path: &str) -> Option<&Value> {
        traverse(&self.grains, path, DEFAULT_TARGET_DELIM)
    }

    /// `kernel` grain, when it is a string.
    pub fn kernel(&self) -> Option<&str> {
        self.grain("kernel").and_then(Value::as_str)
    }

    pub fn is_proxy(&self) -> bool {
        self.options.proxy_type().is_some()
    }

    pub fn scratch(&self) -> &ScratchSpace {
        &self.scratch
    }

    pub fn get(&self, key: &str) -> Option<&Capability> {
        self.entries.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Sorted bound keys.
    pub fn keys(&self) -> Vec<&str> {
        self.entries.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn unavailable(&self) -> impl Iterator<Item = &CapabilityBuildError> {
        self.unavailable.values()
    }

    /// Explains why `key` cannot be used, or `Ok` when it is bound.
    pub fn availability(&self, key: &str) -> Result<(), String> {
        if self.entries.contains_key(key) {
            return Ok(());
        }
        match self.unavailable.get(key) {
            Some(err) => Err(err.reason.clone()),
            None => Err("not registered".to_string()),
        }
    }

    /// Config value bound under `key`.
    pub fn value(&self, key: &str) -> Option<&Value> {
        match self.entries.get(key)? {
            Capability::Config(value) => Some(value),
            Capability::Callable(_) => None,
        }
    }

    /// Invokes a callable capability.
    pub fn call(&self, key: &str, args: &CallArgs) -> CallResult {
        match self.entries.get(key) {
            Some(Capability::Callable(func)) => func(args),
            Some(Capability::Config(_)) => Err(CallError::Invocation(format!(
                "capability `{key}` is a config value, not a callable"
            ))),
            None => Err(CallError::Unavailable {
                capability: key.to_string(),
                reason: self
                    .availability(key)
                    .err()
                    .unwrap_or_else(|| "not registered".to_string()),
            }),
        }
    }
}
