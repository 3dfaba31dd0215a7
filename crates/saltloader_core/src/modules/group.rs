//! Generic `group` adapter for Linux and BSD hosts.
//!
//! Reads the group database through `getent group` and manages groups with
//! `groupadd`/`groupdel`. The parsed database is memoized in the context
//! scratch space until `refresh=True` is passed.

use crate::adapter::{AdapterModule, StaticAdapter, VirtualVerdict};
use crate::capability::names::{CMD_RETCODE, CMD_RUN_ALL};
use crate::capability::{CallArgs, CallError, CallResult, CapabilityRegistry};
use crate::modules::split_members;
use serde_json::{json, Value};
use std::sync::Arc;

/// Kernels served by this adapter.
pub const SUPPORTED_KERNELS: &[&str] = &["Linux", "FreeBSD", "OpenBSD", "NetBSD"];

const GETENT_SCRATCH_KEY: &str = "group.getent";

pub fn adapter() -> Arc<dyn AdapterModule> {
    StaticAdapter::new("group")
        .requires(CMD_RUN_ALL)
        .requires(CMD_RETCODE)
        .eligible_when(|ctx| {
            let kernel = ctx.kernel().unwrap_or("unknown");
            if SUPPORTED_KERNELS.contains(&kernel) {
                Ok(VirtualVerdict::Load)
            } else {
                Ok(VirtualVerdict::skip(format!(
                    "group module not supported on kernel {kernel}"
                )))
            }
        })
        .function("info", info)
        .function("getent", getent)
        .function("list_", list)
        .function("add", add)
        .function("delete", delete)
        .alias("list_", "list")
        .into_module()
}

/// Parses one `name:passwd:gid:members` line.
pub fn parse_group_line(line: &str) -> Option<Value> {
    let mut fields = line.trim().splitn(4, ':');
    let name = fields.next().filter(|name| !name.is_empty())?;
    let passwd = fields.next()?;
    let gid = fields.next()?.trim().parse::<i64>().ok()?;
    let members = split_members(fields.next().unwrap_or(""));
    Some(json!({
        "name": name,
        "passwd": passwd,
        "gid": gid,
        "members": members,
    }))
}

fn info(registry: &CapabilityRegistry, args: &CallArgs) -> CallResult {
    let name = args.required_str(0, "name")?;
    let output = registry.call(
        CMD_RUN_ALL,
        &CallArgs::new().arg(format!("getent group {name}")),
    )?;
    if output["retcode"].as_i64() != Some(0) {
        return Ok(json!({}));
    }
    Ok(output["stdout"]
        .as_str()
        .unwrap_or("")
        .lines()
        .find_map(parse_group_line)
        .unwrap_or_else(|| json!({})))
}

fn getent(registry: &CapabilityRegistry, args: &CallArgs) -> CallResult {
    let refresh = args.flag("refresh", false);
    if !refresh {
        if let Some(cached) = registry.scratch().get(GETENT_SCRATCH_KEY) {
            return Ok(cached);
        }
    }
    let output = registry.call(CMD_RUN_ALL, &CallArgs::new().arg("getent group"))?;
    if output["retcode"].as_i64() != Some(0) {
        return Err(CallError::CommandFailed {
            command: "getent group".to_string(),
            message: output["stderr"].as_str().unwrap_or("").trim().to_string(),
        });
    }
    let groups: Vec<Value> = output["stdout"]
        .as_str()
        .unwrap_or("")
        .lines()
        .filter_map(parse_group_line)
        .collect();
    let groups = Value::Array(groups);
    registry.scratch().set(GETENT_SCRATCH_KEY, groups.clone());
    Ok(groups)
}

fn list(registry: &CapabilityRegistry, args: &CallArgs) -> CallResult {
    let groups = getent(registry, args)?;
    let names: Vec<Value> = groups
        .as_array()
        .map(|groups| groups.iter().map(|group| group["name"].clone()).collect())
        .unwrap_or_default();
    Ok(Value::Array(names))
}

fn add(registry: &CapabilityRegistry, args: &CallArgs) -> CallResult {
    let name = args.required_str(0, "name")?;
    let mut cmd = String::from("groupadd");
    if let Some(gid) = args.value(1, "gid").and_then(Value::as_i64) {
        cmd.push_str(&format!(" -g {gid}"));
    }
    if args.flag("system", false) {
        cmd.push_str(" -r");
    }
    cmd.push(' ');
    cmd.push_str(name);
    let retcode = registry.call(CMD_RETCODE, &CallArgs::new().arg(cmd))?;
    registry.scratch().remove(GETENT_SCRATCH_KEY);
    Ok(Value::Bool(retcode.as_i64() == Some(0)))
}

fn delete(registry: &CapabilityRegistry, args: &CallArgs) -> CallResult {
    let name = args.required_str(0, "name")?;
    let retcode = registry.call(CMD_RETCODE, &CallArgs::new().arg(format!("groupdel {name}")))?;
    registry.scratch().remove(GETENT_SCRATCH_KEY);
    Ok(Value::Bool(retcode.as_i64() == Some(0)))
}

#[cfg(test)]
mod tests {
    use super::{adapter, parse_group_line};
    use crate::capability::{CallArgs, CapabilityRegistryBuilder};
    use crate::config::LoaderOptions;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn parses_getent_lines() {
        assert_eq!(
            parse_group_line("wheel:x:10:alice,bob"),
            Some(json!({"name": "wheel", "passwd": "x", "gid": 10, "members": ["alice", "bob"]}))
        );
        assert_eq!(
            parse_group_line("nogroup:x:65534:"),
            Some(json!({"name": "nogroup", "passwd": "x", "gid": 65534, "members": []}))
        );
        assert_eq!(parse_group_line("garbage"), None);
    }

    #[test]
    fn getent_is_memoized_until_refresh() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let mut builder = CapabilityRegistryBuilder::new(LoaderOptions::new());
        builder
            .bind("cmd.run_all", move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(json!({"retcode": 0, "stdout": "root:x:0:\nwheel:x:10:alice", "stderr": ""}))
            })
            .expect("bind cmd.run_all");
        let registry = builder.freeze();
        let functions = adapter().functions();
        let getent = functions.get("getent").expect("getent declared");
        let list = functions.get("list_").expect("list_ declared");

        getent(&registry, &CallArgs::new()).expect("first getent");
        let names = list(&registry, &CallArgs::new()).expect("list");
        assert_eq!(names, json!(["root", "wheel"]));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        getent(&registry, &CallArgs::new().kwarg("refresh", true)).expect("refresh");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
