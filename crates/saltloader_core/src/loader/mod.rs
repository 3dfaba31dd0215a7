//! Module loader.
//!
//! # Responsibility
//! - Walk adapter sources in order, gate each adapter, and merge the public
//!   functions of eligible ones into a fresh dispatch table.
//! - Record every adapter that contributed nothing, with its reason.
//!
//! # Invariants
//! - One adapter's failure (bad declaration, init error, failing check, or a
//!   panic in any adapter or source hook) never stops the pass.
//! - Virtual-name collisions resolve last-write-wins and are logged.
//! - Function names starting with `_` are never exported; an aliased internal
//!   name is never exported under its internal name.
//! - The pass is sequential; the returned table is complete when handed out.

use crate::adapter::alias;
use crate::adapter::resolver::DEFAULT_TAG;
use crate::adapter::{
    resolve_with, validate_declaration, AdapterFn, AdapterLoadError, AdapterModule,
    EligibilityResult, ResolveSettings,
};
use crate::capability::CapabilityRegistry;
use crate::config::LoaderOptions;
use crate::dispatch::{BoundFunction, DispatchTable, LoadedModule};
use crate::logging::panic_summary;
use crate::naming::is_valid_segment;
use log::{debug, error, info, warn};
use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

pub mod report;
pub mod source;

pub use report::{IneligibleEntry, IneligibleReport};
pub use source::{AdapterSource, StaticSource};

/// Option key listing adapters never loaded for `tag`.
///
/// `module` -> `disable_modules`, `states` -> `disable_states`.
pub fn disable_key(tag: &str) -> String {
    format!("disable_{}", plural(tag))
}

/// Option key listing the only adapters loaded for `tag`.
pub fn whitelist_key(tag: &str) -> String {
    format!("whitelist_{}", plural(tag))
}

fn plural(tag: &str) -> String {
    if tag.ends_with('s') {
        tag.to_string()
    } else {
        format!("{tag}s")
    }
}

/// Per-pass loader switches read from options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadSettings {
    pub tag: String,
    pub whitelist: Vec<String>,
    pub disabled: Vec<String>,
    pub virtual_enable: bool,
    pub virtual_timer: bool,
}

impl LoadSettings {
    pub fn from_options(tag: &str, options: &LoaderOptions) -> Self {
        Self {
            tag: tag.to_string(),
            whitelist: options.string_list(&whitelist_key(tag)),
            disabled: options.string_list(&disable_key(tag)),
            virtual_enable: options.flag("virtual_enable", true),
            virtual_timer: options.flag("virtual_timer", false),
        }
    }

    pub fn resolve_settings(&self) -> ResolveSettings {
        ResolveSettings {
            tag: self.tag.clone(),
            virtual_enable: self.virtual_enable,
            virtual_timer: self.virtual_timer,
        }
    }
}

/// Loader for one adapter tag.
#[derive(Debug, Clone)]
pub struct ModuleLoader {
    tag: String,
    settings: Option<LoadSettings>,
}

impl Default for ModuleLoader {
    fn default() -> Self {
        Self::new(DEFAULT_TAG)
    }
}

impl ModuleLoader {
    /// Loader whose settings are read from the registry options on each pass.
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            settings: None,
        }
    }

    /// Loader with fixed settings.
    pub fn with_settings(settings: LoadSettings) -> Self {
        Self {
            tag: settings.tag.clone(),
            settings: Some(settings),
        }
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn settings_for(&self, options: &LoaderOptions) -> LoadSettings {
        match &self.settings {
            Some(settings) => settings.clone(),
            None => LoadSettings::from_options(&self.tag, options),
        }
    }

    /// Runs one full load pass.
    pub fn load_all(
        &self,
        sources: &[Arc<dyn AdapterSource>],
        registry: &Arc<CapabilityRegistry>,
    ) -> (DispatchTable, IneligibleReport) {
        let settings = self.settings_for(registry.options());
        let resolve_settings = settings.resolve_settings();
        let mut table = DispatchTable::new();
        let mut report = IneligibleReport::new();

        for source in sources {
            let location = source.location();
            let adapters = match catch_unwind(AssertUnwindSafe(|| source.adapters())) {
                Ok(adapters) => adapters,
                Err(payload) => {
                    error!(
                        "event=source_scan module=loader status=error tag={} location={} error={}",
                        settings.tag,
                        location,
                        panic_summary(payload.as_ref())
                    );
                    continue;
                }
            };
            for adapter in adapters {
                let adapter = adapter.as_ref();
                let identity = catch_unwind(AssertUnwindSafe(|| {
                    (
                        adapter.source_name().to_string(),
                        adapter.declared_virtual_name().map(str::to_string),
                    )
                }));
                let (source_name, virtual_name) = match identity {
                    Ok(identity) => identity,
                    Err(payload) => {
                        error!(
                            "event=adapter_load module=loader status=error tag={} location={} adapter=- error={}",
                            settings.tag,
                            location,
                            panic_summary(payload.as_ref())
                        );
                        continue;
                    }
                };
                let outcome = catch_unwind(AssertUnwindSafe(|| {
                    load_adapter(
                        &settings,
                        &resolve_settings,
                        adapter,
                        location,
                        registry,
                        &mut table,
                    )
                }))
                .unwrap_or_else(|payload| {
                    let failure = AdapterLoadError::Panicked {
                        adapter: source_name.clone(),
                        stage: "load",
                        message: panic_summary(payload.as_ref()),
                    };
                    error!(
                        "event=adapter_load module=loader status=error tag={} adapter={} error={}",
                        settings.tag, source_name, failure
                    );
                    Err(Some(failure.to_string()))
                });
                if let Err(reason) = outcome {
                    debug!(
                        "event=adapter_load module=loader status=ineligible tag={} location={} adapter={} reason={}",
                        settings.tag,
                        location,
                        source_name,
                        reason.as_deref().unwrap_or("-")
                    );
                    report.push(IneligibleEntry {
                        source_name,
                        location: location.to_string(),
                        virtual_name,
                        reason,
                    });
                }
            }
        }

        for entry in report.iter() {
            let names = std::iter::once(&entry.source_name).chain(entry.virtual_name.as_ref());
            for name in names {
                if !table.is_loaded(name) {
                    table.record_missing(name, entry.reason.clone());
                }
            }
        }

        info!(
            "event=load_pass module=loader status=ok tag={} context_id={} functions={} modules={} ineligible={}",
            settings.tag,
            registry.context_id(),
            table.len(),
            table.modules().len(),
            report.len()
        );
        (table, report)
    }
}

/// Runs a load pass with the default `module` loader.
pub fn load_all(
    sources: &[Arc<dyn AdapterSource>],
    registry: &Arc<CapabilityRegistry>,
) -> (DispatchTable, IneligibleReport) {
    ModuleLoader::default().load_all(sources, registry)
}

type Exported = BTreeMap<String, (AdapterFn, Option<String>)>;

/// Loads one adapter into `table`; `Err` carries the ineligible reason.
///
/// Every call into the adapter happens before the first table insert, so a
/// panic leaves the table untouched.
fn load_adapter(
    settings: &LoadSettings,
    resolve_settings: &ResolveSettings,
    adapter: &dyn AdapterModule,
    location: &str,
    registry: &Arc<CapabilityRegistry>,
    table: &mut DispatchTable,
) -> Result<(), Option<String>> {
    let source_name = adapter.source_name();

    if let Err(error) = validate_declaration(adapter) {
        let failure = AdapterLoadError::InvalidDeclaration {
            adapter: source_name.to_string(),
            error,
        };
        error!(
            "event=adapter_load module=loader status=error tag={} adapter={} error={}",
            settings.tag, source_name, failure
        );
        return Err(Some(failure.to_string()));
    }

    let mut names = vec![source_name.to_string()];
    names.extend(adapter.declared_virtual_name().map(str::to_string));
    names.extend(adapter.virtual_aliases());
    let whitelisted = names.iter().any(|name| settings.whitelist.contains(name));
    if !settings.whitelist.is_empty() && !whitelisted {
        return Err(Some(format!("not listed in `{}`", whitelist_key(&settings.tag))));
    }
    if names.iter().any(|name| settings.disabled.contains(name)) {
        return Err(Some(format!("disabled by `{}`", disable_key(&settings.tag))));
    }

    run_init(settings, adapter, registry)?;

    let virtual_name = match resolve_with(adapter, registry, resolve_settings) {
        EligibilityResult::Eligible(name) => name,
        EligibilityResult::Ineligible(reason) => return Err(reason),
    };
    if settings.disabled.contains(&virtual_name) {
        return Err(Some(format!("disabled by `{}`", disable_key(&settings.tag))));
    }

    let exported = exported_functions(settings, adapter);

    let mut targets = vec![virtual_name];
    for alias in adapter.virtual_aliases() {
        if !targets.contains(&alias) {
            targets.push(alias);
        }
    }

    for target in &targets {
        if table.is_loaded(target) {
            let previous = table
                .providers(target)
                .iter()
                .map(|module| module.source_name.as_str())
                .collect::<Vec<_>>()
                .join(",");
            warn!(
                "event=virtual_collision module=loader tag={} virtual_name={} adapter={} previous={}",
                settings.tag, target, source_name, previous
            );
        }
        for (function, (func, outputter)) in &exported {
            let bound = BoundFunction::new(
                target,
                function,
                source_name,
                outputter.clone(),
                Arc::clone(func),
                Arc::clone(registry),
            );
            if let Some(replaced) = table.insert(bound) {
                warn!(
                    "event=function_overwrite module=loader tag={} name={} adapter={} replaced_adapter={}",
                    settings.tag,
                    replaced.qualified_name(),
                    source_name,
                    replaced.source_name()
                );
            }
        }
        table.record_loaded(LoadedModule {
            virtual_name: target.clone(),
            source_name: source_name.to_string(),
            location: location.to_string(),
            functions: exported.keys().cloned().collect(),
        });
    }

    debug!(
        "event=adapter_load module=loader status=ok tag={} location={} adapter={} virtual_name={} functions={}",
        settings.tag,
        location,
        source_name,
        targets.join(","),
        exported.len()
    );
    Ok(())
}

fn run_init(
    settings: &LoadSettings,
    adapter: &dyn AdapterModule,
    registry: &CapabilityRegistry,
) -> Result<(), Option<String>> {
    let source_name = adapter.source_name();
    let failure = match catch_unwind(AssertUnwindSafe(|| adapter.init(registry.options()))) {
        Ok(Ok(())) => return Ok(()),
        Ok(Err(err)) => AdapterLoadError::InitFailed {
            adapter: source_name.to_string(),
            message: err.to_string(),
        },
        Err(payload) => AdapterLoadError::Panicked {
            adapter: source_name.to_string(),
            stage: "init",
            message: panic_summary(payload.as_ref()),
        },
    };
    error!(
        "event=adapter_init module=loader status=error tag={} adapter={} error={}",
        settings.tag, source_name, failure
    );
    Err(Some(failure.to_string()))
}

/// Public functions after the load list, private-name filter and aliases.
fn exported_functions(settings: &LoadSettings, adapter: &dyn AdapterModule) -> Exported {
    let load_list = adapter.load_list();
    let outputters = adapter.outputters();
    let mut exported = Exported::new();
    for (name, func) in adapter.functions() {
        if name.starts_with('_') {
            continue;
        }
        if let Some(list) = &load_list {
            if !list.contains(&name) {
                continue;
            }
        }
        if !is_valid_segment(&name) {
            warn!(
                "event=function_skip module=loader tag={} adapter={} function={} reason=invalid_name",
                settings.tag,
                adapter.source_name(),
                name
            );
            continue;
        }
        let outputter = outputters.get(&name).cloned();
        exported.insert(name, (func, outputter));
    }
    alias::apply(exported, &adapter.alias_table())
}

#[cfg(test)]
mod tests {
    use super::{
        disable_key, load_all, whitelist_key, AdapterSource, LoadSettings, ModuleLoader,
        StaticSource,
    };
    use crate::adapter::{AdapterError, AdapterFn, AdapterModule, StaticAdapter, VirtualVerdict};
    use crate::capability::{CallArgs, CapabilityRegistry, CapabilityRegistryBuilder};
    use crate::config::LoaderOptions;
    use crate::dispatch::call;
    use serde_json::json;
    use std::collections::BTreeMap;
    use std::sync::Arc;

    struct BrokenExports;

    impl AdapterModule for BrokenExports {
        fn source_name(&self) -> &str {
            "broken_exports"
        }

        fn functions(&self) -> BTreeMap<String, AdapterFn> {
            panic!("function table exploded")
        }
    }

    struct BrokenSource;

    impl AdapterSource for BrokenSource {
        fn location(&self) -> &str {
            "broken-ext"
        }

        fn adapters(&self) -> Vec<Arc<dyn AdapterModule>> {
            panic!("extension directory unreadable")
        }
    }

    fn registry(options: LoaderOptions) -> Arc<CapabilityRegistry> {
        Arc::new(
            CapabilityRegistryBuilder::new(options)
                .with_grains(json!({"kernel": "Linux", "os_family": "Debian"}))
                .freeze(),
        )
    }

    #[test]
    fn option_keys_follow_tag_plural_rule() {
        assert_eq!(disable_key("module"), "disable_modules");
        assert_eq!(disable_key("states"), "disable_states");
        assert_eq!(whitelist_key("grains"), "whitelist_grains");
    }

    #[test]
    fn settings_read_switches_from_options() {
        let options = LoaderOptions::new()
            .with("disable_states", json!(["pkg"]))
            .with("virtual_enable", json!(false))
            .with("virtual_timer", json!(true));
        let settings = LoadSettings::from_options("states", &options);
        assert_eq!(settings.disabled, vec!["pkg".to_string()]);
        assert!(settings.whitelist.is_empty());
        assert!(!settings.virtual_enable);
        assert!(settings.virtual_timer);
    }

    #[test]
    fn private_functions_and_load_list_limit_exports() {
        let adapter = StaticAdapter::new("svc")
            .function("start", |_, _| Ok(json!("started")))
            .function("stop", |_, _| Ok(json!("stopped")))
            .function("_pid", |_, _| Ok(json!(1)))
            .load_only(&["start", "_pid"])
            .into_module();
        let source = StaticSource::new("builtin").with(adapter).into_source();
        let (table, _) = load_all(&[source], &registry(LoaderOptions::new()));

        assert_eq!(table.qualified_names(), vec!["svc.start"]);
    }

    #[test]
    fn virtual_aliases_register_every_name() {
        let adapter = StaticAdapter::new("pkgng")
            .virtual_name("pkg")
            .virtual_alias("pkgng")
            .function("install", |_, _| Ok(json!(true)))
            .outputter("install", "highstate")
            .into_module();
        let source = StaticSource::new("builtin").with(adapter).into_source();
        let (table, report) = load_all(&[source], &registry(LoaderOptions::new()));

        assert!(report.is_empty());
        assert_eq!(table.qualified_names(), vec!["pkg.install", "pkgng.install"]);
        let bound = table.get("pkg.install").expect("pkg.install bound");
        assert_eq!(bound.outputter(), Some("highstate"));
        assert_eq!(bound.source_name(), "pkgng");
    }

    #[test]
    fn whitelist_and_disable_lists_reject_adapters() {
        let source = StaticSource::new("builtin")
            .with(
                StaticAdapter::new("test")
                    .function("ping", |_, _| Ok(json!(true)))
                    .into_module(),
            )
            .with(
                StaticAdapter::new("cmdmod")
                    .virtual_name("cmd")
                    .function("run", |_, _| Ok(json!("")))
                    .into_module(),
            )
            .with(
                StaticAdapter::new("grp")
                    .function("info", |_, _| Ok(json!({})))
                    .into_module(),
            )
            .into_source();
        let options = LoaderOptions::new()
            .with("whitelist_modules", json!(["test", "cmd"]))
            .with("disable_modules", json!(["cmd"]));
        let (table, report) = load_all(&[source], &registry(options));

        assert_eq!(table.qualified_names(), vec!["test.ping"]);
        let cmd = report.get("cmdmod").expect("cmdmod reported");
        assert_eq!(cmd.reason.as_deref(), Some("disabled by `disable_modules`"));
        assert_eq!(cmd.virtual_name.as_deref(), Some("cmd"));
        let grp = report.get("grp").expect("grp reported");
        assert_eq!(grp.reason.as_deref(), Some("not listed in `whitelist_modules`"));
    }

    #[test]
    fn init_failure_and_panic_are_isolated() {
        let source = StaticSource::new("builtin")
            .with(
                StaticAdapter::new("broken")
                    .on_init(|_| Err(AdapterError::new("missing client library")))
                    .function("run", |_, _| Ok(json!(1)))
                    .into_module(),
            )
            .with(
                StaticAdapter::new("exploding")
                    .on_init(|_| panic!("init blew up"))
                    .function("run", |_, _| Ok(json!(2)))
                    .into_module(),
            )
            .with(
                StaticAdapter::new("healthy")
                    .function("run", |_, _| Ok(json!(3)))
                    .into_module(),
            )
            .into_source();
        let (table, report) = load_all(&[source], &registry(LoaderOptions::new()));

        assert_eq!(table.qualified_names(), vec!["healthy.run"]);
        let broken = report.get("broken").expect("broken reported");
        assert!(broken
            .reason
            .as_deref()
            .is_some_and(|reason| reason.starts_with("init failed")));
        let exploding = report.get("exploding").expect("exploding reported");
        assert!(exploding
            .reason
            .as_deref()
            .is_some_and(|reason| reason.contains("init blew up")));
    }

    #[test]
    fn panicking_adapter_hooks_are_isolated() {
        let ext = StaticSource::new("ext")
            .with(Arc::new(BrokenExports))
            .with(
                StaticAdapter::new("healthy")
                    .function("run", |_, _| Ok(json!("ok")))
                    .into_module(),
            )
            .into_source();
        let broken: Arc<dyn AdapterSource> = Arc::new(BrokenSource);
        let tail = StaticSource::new("tail")
            .with(
                StaticAdapter::new("later")
                    .function("run", |_, _| Ok(json!("later")))
                    .into_module(),
            )
            .into_source();
        let (table, report) = load_all(&[ext, broken, tail], &registry(LoaderOptions::new()));

        assert_eq!(table.qualified_names(), vec!["healthy.run", "later.run"]);
        let entry = report.get("broken_exports").expect("broken_exports reported");
        assert_eq!(entry.location, "ext");
        assert!(entry.reason.as_deref().is_some_and(|reason| {
            reason.contains("panicked during load") && reason.contains("function table exploded")
        }));
        assert_eq!(report.len(), 1);
    }

    #[test]
    fn invalid_declaration_is_reported() {
        let source = StaticSource::new("ext")
            .with(
                StaticAdapter::new("Bad-Name")
                    .function("run", |_, _| Ok(json!(1)))
                    .into_module(),
            )
            .into_source();
        let (table, report) = load_all(&[source], &registry(LoaderOptions::new()));
        assert!(table.is_empty());
        let entry = report.get("Bad-Name").expect("reported");
        assert_eq!(entry.location, "ext");
        assert!(entry
            .reason
            .as_deref()
            .is_some_and(|reason| reason.contains("invalid declaration")));
    }

    #[test]
    fn rejected_virtual_name_explains_missing_function() {
        let source = StaticSource::new("builtin")
            .with(
                StaticAdapter::new("mysql")
                    .eligible_when(|_| Ok(VirtualVerdict::skip("MySQLdb not importable")))
                    .function("query", |_, _| Ok(json!([])))
                    .into_module(),
            )
            .into_source();
        let (table, _) = load_all(&[source], &registry(LoaderOptions::new()));
        let err = call(&table, "mysql.query", &CallArgs::new()).expect_err("not loaded");
        assert_eq!(
            err.to_string(),
            "'mysql' __virtual__ returned False: MySQLdb not importable"
        );
    }

    #[test]
    fn fixed_settings_override_options() {
        let loader = ModuleLoader::with_settings(LoadSettings {
            tag: "states".to_string(),
            whitelist: vec![],
            disabled: vec!["pkg".to_string()],
            virtual_enable: true,
            virtual_timer: false,
        });
        let source = StaticSource::new("builtin")
            .with(
                StaticAdapter::new("pkg")
                    .function("installed", |_, _| Ok(json!(true)))
                    .into_module(),
            )
            .into_source();
        let (table, report) = loader.load_all(&[source], &registry(LoaderOptions::new()));
        assert_eq!(loader.tag(), "states");
        assert!(table.is_empty());
        assert_eq!(
            report.get("pkg").and_then(|entry| entry.reason.as_deref()),
            Some("disabled by `disable_states`")
        );
    }
}
