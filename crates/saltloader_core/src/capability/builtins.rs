//! Built-in capability set bound into every registry.
//!
//! # Responsibility
//! - Bind `cmd.*`, `config.*`, `file.fopen`, `grains.*` and `pillar.get`
//!   before any adapter eligibility check runs.
//! - Bind `cache.*` when the configured cache backend builds, or record a
//!   `CapabilityBuildError` for each cache key when it does not.
//!
//! # Invariants
//! - `build` never fails; resource failures only mark capabilities
//!   unavailable.

use crate::cache::{self, CacheBackend};
use crate::capability::args::{CallArgs, CallError, CallResult};
use crate::capability::command::{run_command, CommandRequest};
use crate::capability::names::{
    CACHE_CAPABILITIES, CACHE_CONTAINS, CACHE_FETCH, CACHE_FLUSH, CACHE_LIST, CACHE_STORE,
    CMD_RETCODE, CMD_RUN, CMD_RUN_ALL, CONFIG_GET, CONFIG_OPTION, FILE_FOPEN, GRAINS_GET,
    GRAINS_ITEM, PILLAR_GET,
};
use crate::capability::registry::{
    CapabilityBuildError, CapabilityRegistry, CapabilityRegistryBuilder, RegistryError,
};
use crate::config::{traverse, LoaderOptions, DEFAULT_TARGET_DELIM};
use log::{info, warn};
use serde_json::{json, Map, Value};
use std::io::Write;
use std::sync::Arc;

/// Builds and freezes a registry with every built-in capability.
pub fn build(options: LoaderOptions) -> CapabilityRegistry {
    let registry = builder(options).freeze();
    info!(
        "event=registry_build module=capability status=ok context_id={} capabilities={} unavailable={}",
        registry.context_id(),
        registry.len(),
        registry.unavailable().count()
    );
    registry
}

/// Returns a builder pre-populated with built-ins, so callers can bind or
/// rebind extra capabilities before freezing.
pub fn builder(options: LoaderOptions) -> CapabilityRegistryBuilder {
    let mut builder = CapabilityRegistryBuilder::new(options);
    if let Err(err) = bind_builtins(&mut builder) {
        // Built-in keys are static and distinct; this only fires on a
        // programming error.
        warn!("event=registry_build module=capability status=error error={err}");
    }
    builder
}

fn bind_builtins(builder: &mut CapabilityRegistryBuilder) -> Result<(), RegistryError> {
    builder.bind(CMD_RUN, |args| {
        let output = run_command(&command_request(args)?)?;
        Ok(json!(output.stdout))
    })?;
    builder.bind(CMD_RUN_ALL, |args| {
        Ok(run_command(&command_request(args)?)?.to_value())
    })?;
    builder.bind(CMD_RETCODE, |args| {
        Ok(json!(run_command(&command_request(args)?)?.retcode))
    })?;

    let options = builder.options().clone();
    let grains = builder.frozen_grains();

    let option_source = options.clone();
    builder.bind(CONFIG_OPTION, move |args| {
        let key = args.required_str(0, "value")?;
        Ok(option_source.option(key, default_arg(args, 1)))
    })?;

    let get_source = options.clone();
    let get_grains = grains.clone();
    builder.bind(CONFIG_GET, move |args| {
        let key = args.required_str(0, "key")?;
        Ok(get_source.get(key, get_grains.get(), default_arg(args, 1)))
    })?;

    builder.bind(FILE_FOPEN, fopen)?;

    let grains_get = grains.clone();
    builder.bind(GRAINS_GET, move |args| {
        let key = args.required_str(0, "key")?;
        Ok(traverse(grains_get.get(), key, DEFAULT_TARGET_DELIM)
            .cloned()
            .unwrap_or_else(|| default_arg(args, 1)))
    })?;

    let grains_item = grains;
    builder.bind(GRAINS_ITEM, move |args| {
        let mut items = Map::new();
        for key in args.args.iter().filter_map(Value::as_str) {
            let value = traverse(grains_item.get(), key, DEFAULT_TARGET_DELIM)
                .cloned()
                .unwrap_or(Value::Null);
            items.insert(key.to_string(), value);
        }
        Ok(Value::Object(items))
    })?;

    let pillar = Value::Object(options.pillar());
    builder.bind(PILLAR_GET, move |args| {
        let key = args.required_str(0, "key")?;
        Ok(traverse(&pillar, key, DEFAULT_TARGET_DELIM)
            .cloned()
            .unwrap_or_else(|| default_arg(args, 1)))
    })?;

    match cache::open(&options) {
        Ok(backend) => bind_cache(builder, backend)?,
        Err(err) => {
            warn!(
                "event=capability_build module=capability status=unavailable capability=cache.* error={}",
                err
            );
            for key in CACHE_CAPABILITIES {
                builder.mark_unavailable(CapabilityBuildError::new(*key, err.to_string()));
            }
        }
    }
    Ok(())
}

/// Binds the cache contract over one backend.
pub fn bind_cache(
    builder: &mut CapabilityRegistryBuilder,
    backend: Arc<dyn CacheBackend>,
) -> Result<(), RegistryError> {
    let store = Arc::clone(&backend);
    builder.rebind(CACHE_STORE, move |args| {
        let bank = args.required_str(0, "bank")?;
        let key = args.required_str(1, "key")?;
        let data = args.value(2, "data").cloned().unwrap_or(Value::Null);
        store.store(bank, key, &data)?;
        Ok(Value::Bool(true))
    })?;

    let fetch = Arc::clone(&backend);
    builder.rebind(CACHE_FETCH, move |args| {
        let bank = args.required_str(0, "bank")?;
        let key = args.required_str(1, "key")?;
        Ok(fetch.fetch(bank, key)?.unwrap_or_else(|| json!({})))
    })?;

    let flush = Arc::clone(&backend);
    builder.rebind(CACHE_FLUSH, move |args| {
        let bank = args.required_str(0, "bank")?;
        Ok(Value::Bool(flush.flush(bank, args.str_value(1, "key"))?))
    })?;

    let list = Arc::clone(&backend);
    builder.rebind(CACHE_LIST, move |args| {
        let bank = args.required_str(0, "bank")?;
        Ok(json!(list.list(bank)?))
    })?;

    let contains = backend;
    builder.rebind(CACHE_CONTAINS, move |args| {
        let bank = args.required_str(0, "bank")?;
        Ok(Value::Bool(contains.contains(bank, args.str_value(1, "key"))?))
    })?;
    Ok(())
}

fn command_request(args: &CallArgs) -> Result<CommandRequest<'_>, CallError> {
    let cmd = args.required_str(0, "cmd")?;
    let env = match args.kwargs.get("env") {
        Some(Value::Object(map)) => map
            .iter()
            .map(|(key, value)| {
                let value = value
                    .as_str()
                    .map(str::to_string)
                    .unwrap_or_else(|| value.to_string());
                (key.clone(), value)
            })
            .collect(),
        _ => Vec::new(),
    };
    Ok(CommandRequest {
        cmd,
        python_shell: args.flag("python_shell", false),
        cwd: args.kwargs.get("cwd").and_then(Value::as_str),
        env,
    })
}

fn default_arg(args: &CallArgs, index: usize) -> Value {
    args.value(index, "default").cloned().unwrap_or(Value::Null)
}

fn fopen(args: &CallArgs) -> CallResult {
    let path = args.required_str(0, "path")?;
    let mode = args.str_value(1, "mode").unwrap_or("r");
    let io_error = |err: std::io::Error| CallError::Other(format!("file.fopen `{path}`: {err}"));
    match mode {
        "r" | "rb" => Ok(json!(std::fs::read_to_string(path).map_err(io_error)?)),
        "w" | "wb" | "a" | "ab" => {
            let data = match args.value(2, "data") {
                Some(Value::String(data)) => data.clone(),
                Some(other) => other.to_string(),
                None => String::new(),
            };
            let mut file = std::fs::OpenOptions::new()
                .create(true)
                .write(true)
                .append(mode.starts_with('a'))
                .truncate(mode.starts_with('w'))
                .open(path)
                .map_err(io_error)?;
            file.write_all(data.as_bytes()).map_err(io_error)?;
            Ok(Value::Bool(true))
        }
        other => Err(CallError::Invocation(format!(
            "file.fopen mode must be one of r|w|a, got `{other}`"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::{build, builder};
    use crate::capability::args::CallArgs;
    use crate::capability::names::{BuiltinCapability, CACHE_CAPABILITIES};
    use crate::config::LoaderOptions;
    use serde_json::json;

    #[test]
    fn binds_every_builtin_capability() {
        let registry = build(LoaderOptions::new());
        for capability in BuiltinCapability::ALL {
            assert!(
                registry.contains(capability.as_str()),
                "missing {}",
                capability.as_str()
            );
        }
        for key in CACHE_CAPABILITIES {
            assert!(registry.contains(key), "missing {key}");
        }
    }

    #[test]
    fn cache_failure_marks_cache_keys_unavailable() {
        let registry = build(LoaderOptions::new().with("cache", json!("redis")));
        for key in CACHE_CAPABILITIES {
            let reason = registry
                .availability(key)
                .expect_err("cache capability must be unavailable");
            assert!(reason.contains("redis"));
        }
        assert!(registry.contains("cmd.run"));
    }

    #[test]
    fn config_and_pillar_lookups_use_defaults() {
        let registry = build(
            LoaderOptions::new()
                .with("master", json!("salt.example.com"))
                .with("pillar", json!({"db": {"user": "app"}})),
        );
        assert_eq!(
            registry
                .call("config.option", &CallArgs::new().arg("master"))
                .expect("config.option"),
            json!("salt.example.com")
        );
        assert_eq!(
            registry
                .call("pillar.get", &CallArgs::new().arg("db:user"))
                .expect("pillar.get"),
            json!("app")
        );
        assert_eq!(
            registry
                .call("pillar.get", &CallArgs::new().arg("db:pass").arg("none"))
                .expect("pillar.get default"),
            json!("none")
        );
    }

    #[test]
    fn grains_item_returns_requested_keys() {
        let registry = build(LoaderOptions::new().with("grains", json!({"role": "web"})));
        let items = registry
            .call("grains.item", &CallArgs::new().arg("role").arg("absent"))
            .expect("grains.item");
        assert_eq!(items, json!({"role": "web", "absent": null}));
    }

    #[test]
    fn grain_capabilities_agree_with_registry_after_override() {
        let options = LoaderOptions::new().with("grains", json!({"kernel": "Linux"}));
        let registry = builder(options)
            .with_grains(json!({"kernel": "AIX", "os_family": "AIX"}))
            .freeze();

        assert_eq!(registry.kernel(), Some("AIX"));
        assert_eq!(
            registry
                .call("grains.get", &CallArgs::new().arg("kernel"))
                .expect("grains.get"),
            json!("AIX")
        );
        assert_eq!(
            registry
                .call("config.get", &CallArgs::new().arg("kernel"))
                .expect("config.get"),
            json!("AIX")
        );
        assert_eq!(
            registry
                .call("grains.item", &CallArgs::new().arg("os_family"))
                .expect("grains.item"),
            json!({"os_family": "AIX"})
        );
    }

    #[test]
    fn cache_capabilities_round_trip_through_memory_backend() {
        let registry = build(LoaderOptions::new());
        registry
            .call(
                "cache.store",
                &CallArgs::new().arg("minions/web01").arg("grains").arg(json!({"a": 1})),
            )
            .expect("cache.store");
        assert_eq!(
            registry
                .call("cache.list", &CallArgs::new().arg("minions"))
                .expect("cache.list"),
            json!(["web01"])
        );
        assert_eq!(
            registry
                .call("cache.fetch", &CallArgs::new().arg("minions/web01").arg("missing"))
                .expect("cache.fetch"),
            json!({})
        );
    }
}
