//! Declaration-level validation for adapter modules.
//!
//! Runs before init and the eligibility check, so malformed declarations are
//! rejected without executing adapter code paths that depend on them.

use crate::adapter::AdapterModule;
use crate::naming::{is_valid_segment, split_qualified};
use std::collections::BTreeSet;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Declaration validation errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeclarationError {
    InvalidSourceName(String),
    InvalidVirtualName(String),
    InvalidVirtualAlias(String),
    DuplicateVirtualAlias(String),
    InvalidRequirement(String),
    InvalidAlias { internal: String, external: String },
    PrivateAlias(String),
}

impl Display for DeclarationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidSourceName(value) => write!(f, "source name is invalid: `{value}`"),
            Self::InvalidVirtualName(value) => write!(f, "virtual name is invalid: `{value}`"),
            Self::InvalidVirtualAlias(value) => {
                write!(f, "virtual alias is invalid: `{value}`")
            }
            Self::DuplicateVirtualAlias(value) => {
                write!(f, "virtual alias is duplicated: `{value}`")
            }
            Self::InvalidRequirement(value) => {
                write!(f, "required capability key is invalid: `{value}`")
            }
            Self::InvalidAlias { internal, external } => {
                write!(f, "function alias is invalid: `{internal}` -> `{external}`")
            }
            Self::PrivateAlias(value) => {
                write!(f, "function alias must not expose a private name: `{value}`")
            }
        }
    }
}

impl Error for DeclarationError {}

/// Validates names, aliases and requirement keys an adapter declares.
pub fn validate_declaration(adapter: &dyn AdapterModule) -> Result<(), DeclarationError> {
    let source_name = adapter.source_name();
    if !is_public_name(source_name) {
        return Err(DeclarationError::InvalidSourceName(source_name.to_string()));
    }

    let declared = adapter.declared_virtual_name();
    if let Some(name) = declared {
        if !is_public_name(name) {
            return Err(DeclarationError::InvalidVirtualName(name.to_string()));
        }
    }

    let mut seen = BTreeSet::new();
    for alias in adapter.virtual_aliases() {
        if !is_public_name(&alias) {
            return Err(DeclarationError::InvalidVirtualAlias(alias));
        }
        if Some(alias.as_str()) == declared || !seen.insert(alias.clone()) {
            return Err(DeclarationError::DuplicateVirtualAlias(alias));
        }
    }

    for key in adapter.requires() {
        if split_qualified(&key).is_none() {
            return Err(DeclarationError::InvalidRequirement(key));
        }
    }

    for (internal, external) in adapter.alias_table().iter() {
        if !is_valid_segment(internal) || !is_valid_segment(external) {
            return Err(DeclarationError::InvalidAlias {
                internal: internal.to_string(),
                external: external.to_string(),
            });
        }
        if external.starts_with('_') {
            return Err(DeclarationError::PrivateAlias(external.to_string()));
        }
    }
    Ok(())
}

fn is_public_name(value: &str) -> bool {
    is_valid_segment(value) && !value.starts_with('_')
}

#[cfg(test)]
mod tests {
    use super::{validate_declaration, DeclarationError};
    use crate::adapter::StaticAdapter;

    #[test]
    fn accepts_well_formed_adapter() {
        let adapter = StaticAdapter::new("aix_group")
            .virtual_name("group")
            .virtual_alias("lgroup")
            .requires("cmd.run")
            .alias("list_", "list");
        assert!(validate_declaration(&adapter).is_ok());
    }

    #[test]
    fn rejects_bad_source_and_virtual_names() {
        let err = validate_declaration(&StaticAdapter::new("Bad-Name"))
            .expect_err("invalid source name must fail");
        assert!(matches!(err, DeclarationError::InvalidSourceName(_)));

        let err = validate_declaration(&StaticAdapter::new("ok").virtual_name("_hidden"))
            .expect_err("private virtual name must fail");
        assert!(matches!(err, DeclarationError::InvalidVirtualName(_)));
    }

    #[test]
    fn rejects_duplicate_virtual_alias() {
        let adapter = StaticAdapter::new("pkgng")
            .virtual_name("pkg")
            .virtual_alias("pkg");
        let err = validate_declaration(&adapter).expect_err("alias equal to name must fail");
        assert_eq!(err, DeclarationError::DuplicateVirtualAlias("pkg".to_string()));
    }

    #[test]
    fn rejects_malformed_requirements_and_aliases() {
        let err = validate_declaration(&StaticAdapter::new("x").requires("cmd"))
            .expect_err("single segment requirement must fail");
        assert!(matches!(err, DeclarationError::InvalidRequirement(_)));

        let err = validate_declaration(&StaticAdapter::new("x").alias("list_", "_list"))
            .expect_err("private external alias must fail");
        assert!(matches!(err, DeclarationError::PrivateAlias(_)));
    }
}
