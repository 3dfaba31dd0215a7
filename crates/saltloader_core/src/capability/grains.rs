//! Host fact (grain) detection.
//!
//! Detected facts are a small, dependency-free baseline: kernel, OS family,
//! CPU architecture, node name and CPU count. Configured `grains` override
//! detected values key by key.

use crate::config::LoaderOptions;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;

const OS_RELEASE_PATH: &str = "/etc/os-release";

/// Detected facts merged with configured overrides.
pub fn effective_grains(options: &LoaderOptions) -> Value {
    let mut grains = detect_host_grains();
    for (key, value) in options.grain_overrides() {
        grains.insert(key, value);
    }
    grains.insert("id".to_string(), json!(options.id()));
    Value::Object(grains)
}

/// Detects facts about the running host.
pub fn detect_host_grains() -> Map<String, Value> {
    let kernel = kernel_name(std::env::consts::OS);
    let os_release = if kernel == "Linux" {
        std::fs::read_to_string(OS_RELEASE_PATH)
            .map(|raw| parse_os_release(&raw))
            .unwrap_or_default()
    } else {
        BTreeMap::new()
    };

    let mut grains = Map::new();
    grains.insert("kernel".to_string(), json!(kernel));
    grains.insert(
        "os_family".to_string(),
        json!(os_family(kernel, &os_release)),
    );
    grains.insert(
        "os".to_string(),
        json!(os_release
            .get("NAME")
            .cloned()
            .unwrap_or_else(|| kernel.to_string())),
    );
    if let Some(version) = os_release.get("VERSION_ID") {
        grains.insert("osrelease".to_string(), json!(version));
    }
    grains.insert("cpuarch".to_string(), json!(std::env::consts::ARCH));
    grains.insert("nodename".to_string(), json!(nodename()));
    grains.insert(
        "num_cpus".to_string(),
        json!(std::thread::available_parallelism()
            .map(|count| count.get())
            .unwrap_or(1)),
    );
    grains.insert(
        "saltloader_version".to_string(),
        json!(env!("CARGO_PKG_VERSION")),
    );
    grains
}

/// Maps `std::env::consts::OS` to the `kernel` grain spelling.
pub fn kernel_name(os: &str) -> &str {
    match os {
        "linux" | "android" => "Linux",
        "macos" | "ios" => "Darwin",
        "windows" => "Windows",
        "freebsd" => "FreeBSD",
        "openbsd" => "OpenBSD",
        "netbsd" => "NetBSD",
        "aix" => "AIX",
        "solaris" | "illumos" => "SunOS",
        other => other,
    }
}

/// Derives `os_family` from the kernel and `/etc/os-release` fields.
pub fn os_family(kernel: &str, os_release: &BTreeMap<String, String>) -> String {
    match kernel {
        "Darwin" => return "MacOS".to_string(),
        "SunOS" => return "Solaris".to_string(),
        "Linux" => {}
        other => return other.to_string(),
    }

    let mut candidates: Vec<String> = Vec::new();
    if let Some(id) = os_release.get("ID") {
        candidates.push(id.to_ascii_lowercase());
    }
    if let Some(like) = os_release.get("ID_LIKE") {
        candidates.extend(like.split_whitespace().map(str::to_ascii_lowercase));
    }

    for candidate in &candidates {
        let family = match candidate.as_str() {
            "debian" | "ubuntu" | "raspbian" | "linuxmint" => "Debian",
            "rhel" | "fedora" | "centos" | "rocky" | "almalinux" | "amzn" => "RedHat",
            "suse" | "opensuse" | "sles" | "opensuse-leap" | "opensuse-tumbleweed" => "Suse",
            "arch" | "manjaro" => "Arch",
            "alpine" => "Alpine",
            "gentoo" => "Gentoo",
            _ => continue,
        };
        return family.to_string();
    }
    "Linux".to_string()
}

/// Parses `KEY=value` lines, stripping optional quotes.
pub fn parse_os_release(raw: &str) -> BTreeMap<String, String> {
    raw.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| line.split_once('='))
        .map(|(key, value)| {
            let value = value.trim().trim_matches('"').trim_matches('\'');
            (key.trim().to_string(), value.to_string())
        })
        .collect()
}

fn nodename() -> String {
    std::fs::read_to_string("/proc/sys/kernel/hostname")
        .ok()
        .map(|raw| raw.trim().to_string())
        .filter(|name| !name.is_empty())
        .or_else(|| std::env::var("HOSTNAME").ok())
        .or_else(|| std::env::var("COMPUTERNAME").ok())
        .unwrap_or_else(|| "localhost".to_string())
}
