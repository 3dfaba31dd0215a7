//! First-party adapters shipped with the loader.
//!
//! Each adapter is a `StaticAdapter` table; `builtin_source` lists them in
//! load order. Platform-specific adapters come after generic ones so that a
//! wrongly eligible generic adapter never shadows a platform override.

use crate::adapter::AdapterModule;
use crate::loader::{AdapterSource, StaticSource};
use std::sync::Arc;

pub mod aix_group;
pub mod data;
pub mod group;

/// Location label of the built-in source.
pub const BUILTIN_LOCATION: &str = "builtin";

/// Built-in adapters in load order.
pub fn builtin_adapters() -> Vec<Arc<dyn AdapterModule>> {
    vec![test::adapter(), group::adapter(), aix_group::adapter(), data::adapter()]
}

/// Source containing every built-in adapter.
pub fn builtin_source() -> Arc<dyn AdapterSource> {
    builtin_adapters()
        .into_iter()
        .fold(StaticSource::new(BUILTIN_LOCATION), StaticSource::with)
        .into_source()
}

/// Splits a comma-separated group member list.
pub(crate) fn split_members(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|member| !member.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::{builtin_source, split_members, BUILTIN_LOCATION};

    #[test]
    fn builtin_source_lists_every_adapter() {
        let source = builtin_source();
        assert_eq!(source.location(), BUILTIN_LOCATION);
        let names: Vec<String> = source
            .adapters()
            .iter()
            .map(|adapter| adapter.source_name().to_string())
            .collect();
        assert_eq!(names, vec!["test", "group", "aix_group", "data"]);
    }

    #[test]
    fn split_members_drops_empty_entries() {
        assert_eq!(split_members("alice, bob,,"), vec!["alice", "bob"]);
        assert!(split_members("").is_empty());
    }
}
