//! Virtual-name resolver.
//!
//! # Responsibility
//! - Decide whether one adapter is eligible in the current context and under
//!   which virtual name.
//!
//! # Invariants
//! - Gates run in order: platform, proxy, required capabilities, then the
//!   adapter's own check.
//! - A failing or panicking check yields `Ineligible`; it never propagates.
//! - A declared virtual name always wins over a rename returned by the check.

use crate::adapter::{AdapterLoadError, AdapterModule, EligibilityContext, VirtualVerdict};
use crate::capability::CapabilityRegistry;
use crate::logging::panic_summary;
use crate::naming::is_valid_segment;
use log::{error, trace, warn};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::Instant;

/// Tags whose adapters must opt in to proxy-minion contexts.
pub const PROXY_GATED_TAGS: &[&str] = &["grains", "proxy"];
/// Reason recorded for adapters rejected by the proxy gate.
pub const NOT_PROXY_ENABLED: &str = "not a proxy_minion enabled module";
/// Default loader tag.
pub const DEFAULT_TAG: &str = "module";

/// Outcome of resolving one adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EligibilityResult {
    Eligible(String),
    Ineligible(Option<String>),
}

impl EligibilityResult {
    pub fn is_eligible(&self) -> bool {
        matches!(self, Self::Eligible(_))
    }
}

/// Loader-level switches that affect resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolveSettings {
    pub tag: String,
    /// When false the adapter's check is skipped (`virtual_enable`).
    pub virtual_enable: bool,
    /// Log each check's duration (`virtual_timer`).
    pub virtual_timer: bool,
}

impl Default for ResolveSettings {
    fn default() -> Self {
        Self {
            tag: DEFAULT_TAG.to_string(),
            virtual_enable: true,
            virtual_timer: false,
        }
    }
}

/// Resolves with default settings.
pub fn resolve(adapter: &dyn AdapterModule, registry: &CapabilityRegistry) -> EligibilityResult {
    resolve_with(adapter, registry, &ResolveSettings::default())
}

/// Resolves one adapter against a registry.
pub fn resolve_with(
    adapter: &dyn AdapterModule,
    registry: &CapabilityRegistry,
    settings: &ResolveSettings,
) -> EligibilityResult {
    let source_name = adapter.source_name();
    let default_name = adapter.declared_virtual_name().unwrap_or(source_name);

    let platforms = adapter.platforms();
    if !platforms.is_empty() {
        let kernel = registry.kernel().unwrap_or("unknown");
        if !platforms.iter().any(|platform| platform == kernel) {
            return EligibilityResult::Ineligible(Some(format!(
                "only available on {}; host kernel is {kernel}",
                platforms.join(", ")
            )));
        }
    }

    if let Some(reason) = proxy_gate(adapter, registry, &settings.tag) {
        return EligibilityResult::Ineligible(Some(reason));
    }

    for key in adapter.requires() {
        if let Err(reason) = registry.availability(&key) {
            return EligibilityResult::Ineligible(Some(format!(
                "required capability `{key}` is unavailable: {reason}"
            )));
        }
    }

    if !settings.virtual_enable {
        return EligibilityResult::Eligible(default_name.to_string());
    }

    let ctx = EligibilityContext::new(registry, &settings.tag);
    let started_at = Instant::now();
    let verdict = catch_unwind(AssertUnwindSafe(|| adapter.check(&ctx)));
    if times_check(adapter, settings) {
        warn!(
            "event=virtual_timer module=resolver tag={} adapter={} duration_ms={}",
            settings.tag,
            source_name,
            started_at.elapsed().as_millis()
        );
    }

    let verdict = match verdict {
        Ok(Ok(verdict)) => verdict,
        Ok(Err(err)) => {
            let failure = AdapterLoadError::CheckFailed {
                adapter: source_name.to_string(),
                message: err.to_string(),
            };
            error!(
                "event=virtual_check module=resolver status=error tag={} adapter={} error={}",
                settings.tag, source_name, failure
            );
            return EligibilityResult::Ineligible(Some(failure.to_string()));
        }
        Err(payload) => {
            let failure = AdapterLoadError::Panicked {
                adapter: source_name.to_string(),
                stage: "eligibility check",
                message: panic_summary(payload.as_ref()),
            };
            error!(
                "event=virtual_check module=resolver status=panic tag={} adapter={} error={}",
                settings.tag, source_name, failure
            );
            return EligibilityResult::Ineligible(Some(failure.to_string()));
        }
    };

    match verdict {
        VirtualVerdict::Skip(reason) => EligibilityResult::Ineligible(reason),
        VirtualVerdict::Load => EligibilityResult::Eligible(default_name.to_string()),
        VirtualVerdict::LoadAs(name) => {
            if let Some(declared) = adapter.declared_virtual_name() {
                if declared != name {
                    error!(
                        "event=virtual_name_mismatch module=resolver tag={} adapter={} declared={} returned={}",
                        settings.tag, source_name, declared, name
                    );
                }
                return EligibilityResult::Eligible(declared.to_string());
            }
            if !is_valid_segment(&name) || name.starts_with('_') {
                return EligibilityResult::Ineligible(Some(format!(
                    "eligibility check returned an invalid virtual name `{name}`"
                )));
            }
            trace!(
                "event=virtual_rename module=resolver adapter={} virtual_name={}",
                source_name,
                name
            );
            EligibilityResult::Eligible(name)
        }
    }
}

/// `virtual_timer` applies to adapters with their own check only.
fn times_check(adapter: &dyn AdapterModule, settings: &ResolveSettings) -> bool {
    settings.virtual_timer && adapter.has_virtual_check()
}

fn proxy_gate(
    adapter: &dyn AdapterModule,
    registry: &CapabilityRegistry,
    tag: &str,
) -> Option<String> {
    let proxy_type = registry.options().proxy_type();
    let gated = adapter.proxy_only() || (proxy_type.is_some() && PROXY_GATED_TAGS.contains(&tag));
    if !gated {
        return None;
    }
    let Some(proxy_type) = proxy_type else {
        return Some(NOT_PROXY_ENABLED.to_string());
    };
    let enabled = adapter.proxy_enabled();
    if enabled
        .iter()
        .any(|value| value == "*" || value == proxy_type)
    {
        None
    } else {
        Some(NOT_PROXY_ENABLED.to_string())
    }
}
