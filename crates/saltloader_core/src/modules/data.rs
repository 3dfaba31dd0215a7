//! `data` adapter: a small persistent key/value datastore.
//!
//! The whole datastore is one JSON mapping stored under bank `minion_data`,
//! key `datastore`, through the `cache.*` capabilities.

use crate::adapter::{AdapterModule, StaticAdapter};
use crate::capability::names::{CACHE_FETCH, CACHE_FLUSH, CACHE_STORE};
use crate::capability::{CallArgs, CallError, CallResult, CapabilityRegistry};
use serde_json::{Map, Value};
use std::sync::Arc;

pub const DATA_BANK: &str = "minion_data";
pub const DATA_KEY: &str = "datastore";

pub fn adapter() -> Arc<dyn AdapterModule> {
    StaticAdapter::new("data")
        .requires(CACHE_STORE)
        .requires(CACHE_FETCH)
        .requires(CACHE_FLUSH)
        .function("clear", clear)
        .function("load", |registry, _| Ok(Value::Object(load(registry)?)))
        .function("dump", dump)
        .function("update", update)
        .function("get", get)
        .function("pop", pop)
        .function("has_key", has_key)
        .function("keys", |registry, _| {
            let store = load(registry)?;
            Ok(Value::Array(store.keys().cloned().map(Value::String).collect()))
        })
        .function("values", |registry, _| {
            Ok(Value::Array(load(registry)?.into_iter().map(|(_, v)| v).collect()))
        })
        .function("items", |registry, _| {
            let items = load(registry)?
                .into_iter()
                .map(|(key, value)| Value::Array(vec![Value::String(key), value]))
                .collect();
            Ok(Value::Array(items))
        })
        .into_module()
}

fn load(registry: &CapabilityRegistry) -> Result<Map<String, Value>, CallError> {
    let stored = registry.call(CACHE_FETCH, &CallArgs::new().arg(DATA_BANK).arg(DATA_KEY))?;
    match stored {
        Value::Object(map) => Ok(map),
        Value::Null => Ok(Map::new()),
        other => Err(CallError::Other(format!(
            "datastore is corrupt: expected a mapping, got {other}"
        ))),
    }
}

fn save(registry: &CapabilityRegistry, store: Map<String, Value>) -> Result<(), CallError> {
    registry.call(
        CACHE_STORE,
        &CallArgs::new()
            .arg(DATA_BANK)
            .arg(DATA_KEY)
            .arg(Value::Object(store)),
    )?;
    Ok(())
}

fn clear(registry: &CapabilityRegistry, _: &CallArgs) -> CallResult {
    registry.call(CACHE_FLUSH, &CallArgs::new().arg(DATA_BANK))?;
    Ok(Value::Bool(true))
}

/// Replaces the whole datastore with a mapping.
fn dump(registry: &CapabilityRegistry, args: &CallArgs) -> CallResult {
    match args.value(0, "new_data") {
        Some(Value::Object(map)) => {
            save(registry, map.clone())?;
            Ok(Value::Bool(true))
        }
        Some(_) => Ok(Value::Bool(false)),
        None => Err(CallError::Invocation(
            "missing required argument `new_data`".to_string(),
        )),
    }
}

fn update(registry: &CapabilityRegistry, args: &CallArgs) -> CallResult {
    let key = args.required_str(0, "key")?;
    let value = args.value(1, "value").cloned().unwrap_or(Value::Null);
    let mut store = load(registry)?;
    store.insert(key.to_string(), value);
    save(registry, store)?;
    Ok(Value::Bool(true))
}

fn get(registry: &CapabilityRegistry, args: &CallArgs) -> CallResult {
    let default = args.value(1, "default").cloned().unwrap_or(Value::Null);
    let store = load(registry)?;
    match args.value(0, "key") {
        Some(Value::String(key)) => Ok(store.get(key).cloned().unwrap_or(default)),
        Some(Value::Array(keys)) => Ok(Value::Array(
            keys.iter()
                .map(|key| {
                    key.as_str()
                        .and_then(|key| store.get(key).cloned())
                        .unwrap_or_else(|| default.clone())
                })
                .collect(),
        )),
        Some(other) => Err(CallError::Invocation(format!(
            "argument `key` must be a string or list, got {other}"
        ))),
        None => Err(CallError::Invocation(
            "missing required argument `key`".to_string(),
        )),
    }
}

fn pop(registry: &CapabilityRegistry, args: &CallArgs) -> CallResult {
    let key = args.required_str(0, "key")?;
    let default = args.value(1, "default").cloned().unwrap_or(Value::Null);
    let mut store = load(registry)?;
    let value = store.remove(key);
    if value.is_some() {
        save(registry, store)?;
    }
    Ok(value.unwrap_or(default))
}

fn has_key(registry: &CapabilityRegistry, args: &CallArgs) -> CallResult {
    let key = args.required_str(0, "key")?;
    Ok(Value::Bool(load(registry)?.contains_key(key)))
}
