//! Call argument model and adapter-level call errors.

use crate::cache::CacheError;
use serde_json::{Map, Value};
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type CallResult = Result<Value, CallError>;

/// Positional and keyword arguments for one capability or adapter call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CallArgs {
    pub args: Vec<Value>,
    pub kwargs: Map<String, Value>,
}

impl CallArgs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn positional(args: impl IntoIterator<Item = Value>) -> Self {
        Self {
            args: args.into_iter().collect(),
            kwargs: Map::new(),
        }
    }

    pub fn arg(mut self, value: impl Into<Value>) -> Self {
        self.args.push(value.into());
        self
    }

    pub fn kwarg(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.kwargs.insert(key.into(), value.into());
        self
    }

    /// Returns positional `index`, falling back to keyword `name`.
    pub fn value(&self, index: usize, name: &str) -> Option<&Value> {
        self.args.get(index).or_else(|| self.kwargs.get(name))
    }

    pub fn str_value(&self, index: usize, name: &str) -> Option<&str> {
        self.value(index, name).and_then(Value::as_str)
    }

    /// Required string argument; missing or non-string values are an
    /// invocation error.
    pub fn required_str(&self, index: usize, name: &str) -> Result<&str, CallError> {
        match self.value(index, name) {
            Some(Value::String(value)) => Ok(value.as_str()),
            Some(other) => Err(CallError::Invocation(format!(
                "argument `{name}` must be a string, got {other}"
            ))),
            None => Err(CallError::Invocation(format!(
                "missing required argument `{name}`"
            ))),
        }
    }

    /// Keyword flag with default; only JSON booleans are honoured.
    pub fn flag(&self, name: &str, default: bool) -> bool {
        self.kwargs
            .get(name)
            .and_then(Value::as_bool)
            .unwrap_or(default)
    }
}

/// Errors raised by capabilities and adapter functions.
///
/// The dispatcher passes these through untouched.
#[derive(Debug)]
pub enum CallError {
    /// Bad or missing arguments.
    Invocation(String),
    /// A command could not be spawned.
    CommandFailed { command: String, message: String },
    /// A capability is missing from the registry or failed to build.
    Unavailable { capability: String, reason: String },
    Cache(CacheError),
    Other(String),
}

impl Display for CallError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Invocation(message) => write!(f, "invalid invocation: {message}"),
            Self::CommandFailed { command, message } => {
                write!(f, "command `{command}` failed: {message}")
            }
            Self::Unavailable { capability, reason } => {
                write!(f, "capability `{capability}` is not available: {reason}")
            }
            Self::Cache(err) => write!(f, "cache error: {err}"),
            Self::Other(message) => write!(f, "{message}"),
        }
    }
}

impl Error for CallError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Cache(err) => Some(err),
            _ => None,
        }
    }
}

impl From<CacheError> for CallError {
    fn from(value: CacheError) -> Self {
        Self::Cache(value)
    }
}

#[cfg(test)]
mod tests {
    use super::{CallArgs, CallError};
    use serde_json::json;

    #[test]
    fn positional_takes_precedence_over_keyword() {
        let args = CallArgs::new().arg("root").kwarg("name", "wheel");
        assert_eq!(args.str_value(0, "name"), Some("root"));

        let args = CallArgs::new().kwarg("name", "wheel");
        assert_eq!(args.str_value(0, "name"), Some("wheel"));
    }

    #[test]
    fn required_str_reports_missing_and_mistyped_values() {
        let err = CallArgs::new()
            .required_str(0, "name")
            .expect_err("missing name must fail");
        assert!(matches!(err, CallError::Invocation(message) if message.contains("missing")));

        let err = CallArgs::new()
            .arg(json!(12))
            .required_str(0, "name")
            .expect_err("numeric name must fail");
        assert!(matches!(err, CallError::Invocation(message) if message.contains("string")));
    }

    #[test]
    fn flag_ignores_non_boolean_values() {
        let args = CallArgs::new()
            .kwarg("python_shell", true)
            .kwarg("quiet", "yes");
        assert!(args.flag("python_shell", false));
        assert!(!args.flag("quiet", false));
        assert!(args.flag("absent", true));
    }
}
