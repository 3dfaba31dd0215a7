//! Well-known capability keys every registry binds before any adapter check
//! runs.

use std::error::Error;
use std::fmt::{Display, Formatter};

/// Capability guaranteed by the registry builder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum BuiltinCapability {
    CmdRun,
    CmdRunAll,
    CmdRetcode,
    ConfigOption,
    ConfigGet,
    FileFopen,
    GrainsGet,
    GrainsItem,
    PillarGet,
}

impl BuiltinCapability {
    pub const ALL: [BuiltinCapability; 9] = [
        Self::CmdRun,
        Self::CmdRunAll,
        Self::CmdRetcode,
        Self::ConfigOption,
        Self::ConfigGet,
        Self::FileFopen,
        Self::GrainsGet,
        Self::GrainsItem,
        Self::PillarGet,
    ];

    /// Stable registry key.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CmdRun => CMD_RUN,
            Self::CmdRunAll => CMD_RUN_ALL,
            Self::CmdRetcode => CMD_RETCODE,
            Self::ConfigOption => CONFIG_OPTION,
            Self::ConfigGet => CONFIG_GET,
            Self::FileFopen => FILE_FOPEN,
            Self::GrainsGet => GRAINS_GET,
            Self::GrainsItem => GRAINS_ITEM,
            Self::PillarGet => PILLAR_GET,
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Self::CmdRun => "Run a command and return its stdout.",
            Self::CmdRunAll => "Run a command and return pid, retcode, stdout and stderr.",
            Self::CmdRetcode => "Run a command and return only its exit code.",
            Self::ConfigOption => "Look up a top-level option, then pillar.",
            Self::ConfigGet => "Look up a colon path in options, grains, then pillar.",
            Self::FileFopen => "Read a file, or write/append data to it.",
            Self::GrainsGet => "Look up a colon path in host facts.",
            Self::GrainsItem => "Return a mapping of the requested host facts.",
            Self::PillarGet => "Look up a colon path in pillar data.",
        }
    }
}

pub const CMD_RUN: &str = "cmd.run";
pub const CMD_RUN_ALL: &str = "cmd.run_all";
pub const CMD_RETCODE: &str = "cmd.retcode";
pub const CONFIG_OPTION: &str = "config.option";
pub const CONFIG_GET: &str = "config.get";
pub const FILE_FOPEN: &str = "file.fopen";
pub const GRAINS_GET: &str = "grains.get";
pub const GRAINS_ITEM: &str = "grains.item";
pub const PILLAR_GET: &str = "pillar.get";

pub const CACHE_STORE: &str = "cache.store";
pub const CACHE_FETCH: &str = "cache.fetch";
pub const CACHE_FLUSH: &str = "cache.flush";
pub const CACHE_LIST: &str = "cache.list";
pub const CACHE_CONTAINS: &str = "cache.contains";

/// Cache keys are bound only when the configured backend builds.
pub const CACHE_CAPABILITIES: &[&str] = &[
    CACHE_STORE,
    CACHE_FETCH,
    CACHE_FLUSH,
    CACHE_LIST,
    CACHE_CONTAINS,
];

/// Parses a well-known capability key.
pub fn parse_builtin_capability(value: &str) -> Result<BuiltinCapability, CapabilityNameError> {
    let normalized = value.trim();
    if normalized.is_empty() {
        return Err(CapabilityNameError::Empty);
    }
    BuiltinCapability::ALL
        .into_iter()
        .find(|capability| capability.as_str() == normalized)
        .ok_or_else(|| CapabilityNameError::NotBuiltin(normalized.to_string()))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CapabilityNameError {
    Empty,
    NotBuiltin(String),
}

impl Display for CapabilityNameError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Empty => write!(f, "capability key must not be empty"),
            Self::NotBuiltin(value) => write!(f, "not a built-in capability: {value}"),
        }
    }
}

impl Error for CapabilityNameError {}
