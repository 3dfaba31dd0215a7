//! Adapter module contract.
//!
//! # Responsibility
//! - Define what one adapter exposes: names, gates, an eligibility check and
//!   its public functions.
//! - Provide the declarative `StaticAdapter` builder, the alias table and the
//!   virtual-name resolver.
//!
//! # Invariants
//! - Adapter functions receive the registry they were bound with as an
//!   explicit argument.
//! - Eligibility checks return a tagged verdict, never a loosely typed value.

use crate::capability::{CallArgs, CallResult, CapabilityRegistry};
use crate::config::LoaderOptions;
use serde_json::Value;
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

pub mod alias;
pub mod declaration;
pub mod declarative;
pub mod resolver;

pub use alias::AliasTable;
pub use declaration::{validate_declaration, DeclarationError};
pub use declarative::StaticAdapter;
pub use resolver::{resolve, resolve_with, EligibilityResult, ResolveSettings};

/// Adapter function signature.
pub type AdapterFn = Arc<dyn Fn(&CapabilityRegistry, &CallArgs) -> CallResult + Send + Sync>;

/// What an eligibility check decided.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VirtualVerdict {
    /// Load under the declared virtual name, or the source name.
    Load,
    /// Load under this virtual name.
    LoadAs(String),
    /// Do not load; optional human-readable reason.
    Skip(Option<String>),
}

impl VirtualVerdict {
    pub fn skip(reason: impl Into<String>) -> Self {
        Self::Skip(Some(reason.into()))
    }
}

/// Error raised by an adapter's own init hook or eligibility check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdapterError {
    message: String,
}

impl AdapterError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl Display for AdapterError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl Error for AdapterError {}

/// Load-time failure of one adapter, caught at the loader boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdapterLoadError {
    InvalidDeclaration {
        adapter: String,
        error: DeclarationError,
    },
    InitFailed {
        adapter: String,
        message: String,
    },
    CheckFailed {
        adapter: String,
        message: String,
    },
    Panicked {
        adapter: String,
        stage: &'static str,
        message: String,
    },
}

impl Display for AdapterLoadError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidDeclaration { adapter, error } => {
                write!(f, "adapter `{adapter}` has an invalid declaration: {error}")
            }
            Self::InitFailed { adapter, message } => {
                write!(f, "init failed for `{adapter}`: {message}")
            }
            Self::CheckFailed { adapter, message } => write!(
                f,
                "eligibility check raised for `{adapter}`; adapter will not be loaded: {message}"
            ),
            Self::Panicked {
                adapter,
                stage,
                message,
            } => write!(f, "adapter `{adapter}` panicked during {stage}: {message}"),
        }
    }
}

impl Error for AdapterLoadError {}

/// Read access given to eligibility checks.
#[derive(Clone, Copy)]
pub struct EligibilityContext<'a> {
    registry: &'a CapabilityRegistry,
    tag: &'a str,
}

impl<'a> EligibilityContext<'a> {
    pub fn new(registry: &'a CapabilityRegistry, tag: &'a str) -> Self {
        Self { registry, tag }
    }

    pub fn registry(&self) -> &'a CapabilityRegistry {
        self.registry
    }

    /// Loader tag (`module`, `states`, ...).
    pub fn tag(&self) -> &'a str {
        self.tag
    }

    pub fn options(&self) -> &'a LoaderOptions {
        self.registry.options()
    }

    pub fn grain(&self, path: &str) -> Option<&'a Value> {
        self.registry.grain(path)
    }

    pub fn kernel(&self) -> Option<&'a str> {
        self.registry.kernel()
    }

    pub fn os_family(&self) -> Option<&'a str> {
        self.registry.grain("os_family").and_then(Value::as_str)
    }

    pub fn proxy_type(&self) -> Option<&'a str> {
        self.registry.options().proxy_type()
    }

    pub fn has_capability(&self, key: &str) -> bool {
        self.registry.contains(key)
    }
}

/// One adapter module.
///
/// Only `source_name` and `functions` are required; the defaults describe an
/// adapter that always loads under its source name.
pub trait AdapterModule: Send + Sync {
    /// File-derived identifier.
    fn source_name(&self) -> &str;

    /// Fixed virtual name (`__virtualname__`).
    fn declared_virtual_name(&self) -> Option<&str> {
        None
    }

    /// Extra names the functions are also registered under.
    fn virtual_aliases(&self) -> Vec<String> {
        Vec::new()
    }

    /// Capability keys that must be bound for this adapter to load.
    fn requires(&self) -> Vec<String> {
        Vec::new()
    }

    /// Kernels this adapter supports; empty means any.
    fn platforms(&self) -> Vec<String> {
        Vec::new()
    }

    /// Proxy types this adapter supports (`"*"` for all).
    fn proxy_enabled(&self) -> Vec<String> {
        Vec::new()
    }

    /// Only loadable inside a proxy-minion context.
    fn proxy_only(&self) -> bool {
        false
    }

    /// Runs once per load pass before the eligibility check.
    fn init(&self, _options: &LoaderOptions) -> Result<(), AdapterError> {
        Ok(())
    }

    fn check(&self, _ctx: &EligibilityContext<'_>) -> Result<VirtualVerdict, AdapterError> {
        Ok(VirtualVerdict::Load)
    }

    /// Whether `check` does real work (`__virtual__`). Only such checks are
    /// timed under `virtual_timer`.
    fn has_virtual_check(&self) -> bool {
        true
    }

    /// Public functions keyed by internal name.
    fn functions(&self) -> BTreeMap<String, AdapterFn>;

    /// Restricts exported functions to this list (`__load__`).
    fn load_list(&self) -> Option<Vec<String>> {
        None
    }

    fn alias_table(&self) -> AliasTable {
        AliasTable::default()
    }

    /// Outputter hints keyed by internal function name.
    fn outputters(&self) -> BTreeMap<String, String> {
        BTreeMap::new()
    }
}

#[cfg(test)]
mod tests {
    use super::{AdapterError, AdapterLoadError, VirtualVerdict};

    #[test]
    fn load_error_messages_name_the_adapter() {
        let err = AdapterLoadError::CheckFailed {
            adapter: "mysql".to_string(),
            message: "MySQLdb not importable".to_string(),
        };
        let text = err.to_string();
        assert!(text.contains("`mysql`"));
        assert!(text.contains("MySQLdb not importable"));
    }

    #[test]
    fn skip_helper_carries_reason() {
        assert_eq!(
            VirtualVerdict::skip("boto3 missing"),
            VirtualVerdict::Skip(Some("boto3 missing".to_string()))
        );
        assert_eq!(AdapterError::new("x").message(), "x");
    }
}
