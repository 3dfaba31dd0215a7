//! In-memory cache backend.

use crate::cache::{
    child_segment, is_within, now_epoch_secs, validate_bank, validate_key, CacheBackend,
    CacheResult,
};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{PoisonError, RwLock};

#[derive(Debug, Clone)]
struct Entry {
    data: Value,
    updated: i64,
}

/// Process-local cache; contents are lost with the value.
#[derive(Debug, Default)]
pub struct MemoryCache {
    banks: RwLock<BTreeMap<String, BTreeMap<String, Entry>>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CacheBackend for MemoryCache {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn store(&self, bank: &str, key: &str, data: &Value) -> CacheResult<()> {
        validate_bank(bank)?;
        validate_key(key)?;
        let mut banks = self.banks.write().unwrap_or_else(PoisonError::into_inner);
        banks.entry(bank.to_string()).or_default().insert(
            key.to_string(),
            Entry {
                data: data.clone(),
                updated: now_epoch_secs(),
            },
        );
        Ok(())
    }

    fn fetch(&self, bank: &str, key: &str) -> CacheResult<Option<Value>> {
        validate_bank(bank)?;
        validate_key(key)?;
        let banks = self.banks.read().unwrap_or_else(PoisonError::into_inner);
        Ok(banks
            .get(bank)
            .and_then(|entries| entries.get(key))
            .map(|entry| entry.data.clone()))
    }

    fn updated(&self, bank: &str, key: &str) -> CacheResult<Option<i64>> {
        validate_bank(bank)?;
        validate_key(key)?;
        let banks = self.banks.read().unwrap_or_else(PoisonError::into_inner);
        Ok(banks
            .get(bank)
            .and_then(|entries| entries.get(key))
            .map(|entry| entry.updated))
    }

    fn flush(&self, bank: &str, key: Option<&str>) -> CacheResult<bool> {
        validate_bank(bank)?;
        let mut banks = self.banks.write().unwrap_or_else(PoisonError::into_inner);
        match key {
            Some(key) => {
                validate_key(key)?;
                let Some(entries) = banks.get_mut(bank) else {
                    return Ok(false);
                };
                let removed = entries.remove(key).is_some();
                if entries.is_empty() {
                    banks.remove(bank);
                }
                Ok(removed)
            }
            None => {
                let before = banks.len();
                banks.retain(|name, _| !is_within(bank, name));
                Ok(banks.len() != before)
            }
        }
    }

    fn list(&self, bank: &str) -> CacheResult<Vec<String>> {
        validate_bank(bank)?;
        let banks = self.banks.read().unwrap_or_else(PoisonError::into_inner);
        let mut names = BTreeSet::new();
        for (name, entries) in banks.iter() {
            if name == bank {
                names.extend(entries.keys().cloned());
            } else if let Some(child) = child_segment(bank, name) {
                names.insert(child.to_string());
            }
        }
        Ok(names.into_iter().collect())
    }

    fn contains(&self, bank: &str, key: Option<&str>) -> CacheResult<bool> {
        validate_bank(bank)?;
        let banks = self.banks.read().unwrap_or_else(PoisonError::into_inner);
        match key {
            Some(key) => {
                validate_key(key)?;
                Ok(banks
                    .get(bank)
                    .is_some_and(|entries| entries.contains_key(key)))
            }
            None => Ok(banks.keys().any(|name| is_within(bank, name))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::MemoryCache;
    use crate::cache::{CacheBackend, CacheError};
    use serde_json::json;

    #[test]
    fn flush_bank_removes_nested_banks_only() {
        let cache = MemoryCache::new();
        cache
            .store("minions/web01", "grains", &json!({"os": "Debian"}))
            .expect("store");
        cache
            .store("minions/web01/data", "mine", &json!([1]))
            .expect("store");
        cache
            .store("minions2", "other", &json!(true))
            .expect("store");

        assert!(cache.flush("minions", None).expect("flush"));
        assert!(!cache.contains("minions", None).expect("contains"));
        assert!(cache.contains("minions2", Some("other")).expect("contains"));
    }

    #[test]
    fn flush_last_key_drops_bank() {
        let cache = MemoryCache::new();
        cache.store("tokens", "abc", &json!(1)).expect("store");
        assert!(cache.flush("tokens", Some("abc")).expect("flush"));
        assert!(!cache.contains("tokens", None).expect("contains"));
        assert!(!cache.flush("tokens", Some("abc")).expect("second flush"));
    }

    #[test]
    fn rejects_invalid_key() {
        let cache = MemoryCache::new();
        let err = cache
            .store("bank", "a/b", &json!(1))
            .expect_err("slash key must fail");
        assert!(matches!(err, CacheError::InvalidKey(_)));
    }
}
