//! AIX override for the `group` virtual name.
//!
//! Uses `lsgroup -c` colon output and `mkgroup`/`rmgroup`.

use crate::adapter::{AdapterModule, StaticAdapter};
use crate::capability::names::{CMD_RETCODE, CMD_RUN_ALL};
use crate::capability::{CallArgs, CallError, CallResult, CapabilityRegistry};
use crate::modules::split_members;
use serde_json::{json, Value};
use std::sync::Arc;

pub fn adapter() -> Arc<dyn AdapterModule> {
    StaticAdapter::new("aix_group")
        .virtual_name("group")
        .platform("AIX")
        .requires(CMD_RUN_ALL)
        .requires(CMD_RETCODE)
        .function("info", info)
        .function("list_", list)
        .function("add", add)
        .function("delete", delete)
        .alias("list_", "list")
        .into_module()
}

/// Parses `lsgroup -c -a id users` output into group records.
///
/// The first line is the `#name:id:users` header.
pub fn parse_lsgroup(stdout: &str) -> Vec<Value> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| {
            let mut fields = line.splitn(3, ':');
            let name = fields.next().filter(|name| !name.is_empty())?;
            let gid = fields.next()?.trim().parse::<i64>().ok()?;
            let members = split_members(fields.next().unwrap_or(""));
            Some(json!({
                "name": name,
                "passwd": "!",
                "gid": gid,
                "members": members,
            }))
        })
        .collect()
}

fn lsgroup(registry: &CapabilityRegistry, target: &str) -> Result<Vec<Value>, CallError> {
    let output = registry.call(
        CMD_RUN_ALL,
        &CallArgs::new().arg(format!("lsgroup -c -a id users {target}")),
    )?;
    if output["retcode"].as_i64() != Some(0) {
        return Ok(Vec::new());
    }
    Ok(parse_lsgroup(output["stdout"].as_str().unwrap_or("")))
}

fn info(registry: &CapabilityRegistry, args: &CallArgs) -> CallResult {
    let name = args.required_str(0, "name")?;
    Ok(lsgroup(registry, name)?
        .into_iter()
        .next()
        .unwrap_or_else(|| json!({})))
}

fn list(registry: &CapabilityRegistry, _: &CallArgs) -> CallResult {
    let names = lsgroup(registry, "ALL")?
        .into_iter()
        .map(|group| group["name"].clone())
        .collect();
    Ok(Value::Array(names))
}

fn add(registry: &CapabilityRegistry, args: &CallArgs) -> CallResult {
    let name = args.required_str(0, "name")?;
    let mut cmd = String::from("mkgroup");
    if args.flag("system", false) {
        cmd.push_str(" -a");
    }
    if let Some(gid) = args.value(1, "gid").and_then(Value::as_i64) {
        cmd.push_str(&format!(" id={gid}"));
    }
    cmd.push(' ');
    cmd.push_str(name);
    let retcode = registry.call(CMD_RETCODE, &CallArgs::new().arg(cmd))?;
    Ok(Value::Bool(retcode.as_i64() == Some(0)))
}

fn delete(registry: &CapabilityRegistry, args: &CallArgs) -> CallResult {
    let name = args.required_str(0, "name")?;
    let retcode = registry.call(CMD_RETCODE, &CallArgs::new().arg(format!("rmgroup {name}")))?;
    Ok(Value::Bool(retcode.as_i64() == Some(0)))
}
