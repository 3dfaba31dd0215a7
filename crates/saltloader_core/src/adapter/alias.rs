//! Per-adapter function alias table (`__func_alias__`).

use log::debug;
use std::collections::BTreeMap;

/// Maps internal function names to external names.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AliasTable {
    entries: BTreeMap<String, String>,
}

impl AliasTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, internal: impl Into<String>, external: impl Into<String>) -> Self {
        self.insert(internal, external);
        self
    }

    pub fn insert(&mut self, internal: impl Into<String>, external: impl Into<String>) {
        self.entries.insert(internal.into(), external.into());
    }

    /// External name for `internal`, or `internal` itself.
    pub fn external_name<'a>(&'a self, internal: &'a str) -> &'a str {
        self.entries
            .get(internal)
            .map(String::as_str)
            .unwrap_or(internal)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .map(|(internal, external)| (internal.as_str(), external.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Renames aliased functions; other keys pass through unchanged.
///
/// An aliased function replaces an unaliased function already using the
/// external name.
pub fn apply<T>(
    public_functions: BTreeMap<String, T>,
    alias_map: &AliasTable,
) -> BTreeMap<String, T> {
    let mut renamed = BTreeMap::new();
    let mut moved = Vec::new();
    for (name, func) in public_functions {
        match alias_map.entries.get(&name) {
            Some(external) => moved.push((external.clone(), name, func)),
            None => {
                renamed.insert(name, func);
            }
        }
    }
    for (external, internal, func) in moved {
        if renamed.insert(external.clone(), func).is_some() {
            debug!(
                "event=alias_apply module=adapter status=replaced internal={} external={}",
                internal, external
            );
        }
    }
    renamed
}

#[cfg(test)]
mod tests {
    use super::{apply, AliasTable};
    use std::collections::BTreeMap;

    fn functions(names: &[&str]) -> BTreeMap<String, String> {
        names
            .iter()
            .map(|name| (name.to_string(), format!("impl:{name}")))
            .collect()
    }

    #[test]
    fn moves_internal_name_to_external_name() {
        let aliases = AliasTable::new().with("list_", "list");
        let renamed = apply(functions(&["list_", "info"]), &aliases);

        assert_eq!(renamed.get("list").map(String::as_str), Some("impl:list_"));
        assert!(!renamed.contains_key("list_"));
        assert_eq!(renamed.get("info").map(String::as_str), Some("impl:info"));
    }

    #[test]
    fn ignores_aliases_for_absent_functions() {
        let aliases = AliasTable::new().with("true_", "true");
        let renamed = apply(functions(&["ping"]), &aliases);
        assert_eq!(renamed.len(), 1);
        assert!(!renamed.contains_key("true"));
    }

    #[test]
    fn aliased_function_wins_external_name() {
        let aliases = AliasTable::new().with("list_", "list");
        let renamed = apply(functions(&["list_", "list"]), &aliases);
        assert_eq!(renamed.len(), 1);
        assert_eq!(renamed.get("list").map(String::as_str), Some("impl:list_"));
    }

    #[test]
    fn external_name_defaults_to_internal() {
        let aliases = AliasTable::new().with("false_", "false");
        assert_eq!(aliases.external_name("false_"), "false");
        assert_eq!(aliases.external_name("ping"), "ping");
    }
}
