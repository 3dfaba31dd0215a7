//! Dispatcher and execution-context lifecycle.
//!
//! # Responsibility
//! - Resolve `<virtual>.<function>` against a dispatch table and invoke it.
//! - Normalize every "no such function" case into `UnknownCapability`.
//!
//! # Invariants
//! - Arguments reach the adapter untouched.
//! - Adapter errors are wrapped, never swallowed or rewritten.
//! - The dispatcher imposes no timeout.

use crate::capability::{CallArgs, CallError};
use crate::naming::split_qualified;
use serde_json::Value;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod context;
pub mod table;

pub use context::{ExecutionContext, LoadPass, TableState};
pub use table::{BoundFunction, DispatchTable, LoadedModule};

pub type DispatchResult = Result<Value, DispatchError>;

/// Dispatch errors.
#[derive(Debug)]
pub enum DispatchError {
    /// No function is registered under the qualified name.
    UnknownCapability { name: String, reason: String },
    /// The adapter function ran and failed.
    Adapter { name: String, source: CallError },
}

impl DispatchError {
    pub fn name(&self) -> &str {
        match self {
            Self::UnknownCapability { name, .. } | Self::Adapter { name, .. } => name,
        }
    }

    pub fn is_unknown_capability(&self) -> bool {
        matches!(self, Self::UnknownCapability { .. })
    }
}

impl Display for DispatchError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownCapability { reason, .. } => write!(f, "{reason}"),
            Self::Adapter { name, source } => write!(f, "`{name}` failed: {source}"),
        }
    }
}

impl Error for DispatchError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::UnknownCapability { .. } => None,
            Self::Adapter { source, .. } => Some(source),
        }
    }
}

/// Invokes `qualified_name` from `table`.
///
/// # Errors
/// - `UnknownCapability` for malformed or unregistered names.
/// - `Adapter` when the bound function returns an error.
pub fn call(table: &DispatchTable, qualified_name: &str, args: &CallArgs) -> DispatchResult {
    if split_qualified(qualified_name).is_none() {
        return Err(DispatchError::UnknownCapability {
            name: qualified_name.to_string(),
            reason: format!("'{qualified_name}' is not available."),
        });
    }
    let Some(bound) = table.get(qualified_name) else {
        return Err(DispatchError::UnknownCapability {
            name: qualified_name.to_string(),
            reason: table.missing_fun_string(qualified_name),
        });
    };
    bound.invoke(args).map_err(|source| DispatchError::Adapter {
        name: qualified_name.to_string(),
        source,
    })
}
