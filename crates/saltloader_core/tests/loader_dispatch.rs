use saltloader_core::capability::builtins;
use saltloader_core::modules::builtin_source;
use saltloader_core::{
    call, load_all, AdapterError, AdapterSource, CallArgs, CallError, CapabilityRegistry,
    DispatchError, LoaderOptions, StaticAdapter, StaticSource, VirtualVerdict,
};
use serde_json::{json, Value};
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

fn linux_registry() -> Arc<CapabilityRegistry> {
    host_registry("Linux")
}

fn host_registry(kernel: &str) -> Arc<CapabilityRegistry> {
    let options = LoaderOptions::new().with("grains", json!({"kernel": kernel}));
    Arc::new(builtins::build(options))
}

fn source(adapters: Vec<StaticAdapter>) -> Arc<dyn AdapterSource> {
    adapters
        .into_iter()
        .fold(StaticSource::new("test-source"), |source, adapter| {
            source.with(adapter.into_module())
        })
        .into_source()
}

fn names(table: &saltloader_core::DispatchTable) -> BTreeSet<String> {
    table
        .qualified_names()
        .into_iter()
        .map(str::to_string)
        .collect()
}

#[test]
fn ineligible_adapter_contributes_no_functions() {
    let sources = vec![source(vec![
        StaticAdapter::new("mysql")
            .eligible_when(|_| Ok(VirtualVerdict::skip("MySQLdb not importable")))
            .function("query", |_, _| Ok(json!([])))
            .function("version", |_, _| Ok(json!("8.0"))),
        StaticAdapter::new("quiet")
            .eligible_when(|_| Ok(VirtualVerdict::Skip(None)))
            .function("run", |_, _| Ok(Value::Null)),
    ])];
    let (table, report) = load_all(&sources, &linux_registry());

    assert!(table.is_empty());
    assert!(table
        .iter()
        .all(|bound| bound.source_name() != "mysql" && bound.source_name() != "quiet"));
    assert_eq!(report.len(), 2);
    assert_eq!(
        report.get("mysql").and_then(|entry| entry.reason.as_deref()),
        Some("MySQLdb not importable")
    );
    assert_eq!(report.get("quiet").expect("quiet reported").reason, None);
}

#[test]
fn eligible_adapter_exposes_every_public_function_under_virtual_name() {
    let sources = vec![source(vec![StaticAdapter::new("boto_vpc")
        .eligible_when(|_| Ok(VirtualVerdict::LoadAs("vpc".to_string())))
        .function("create", |_, _| Ok(json!(true)))
        .function("delete", |_, _| Ok(json!(true)))
        .function("describe", |_, _| Ok(json!({})))])];
    let (table, report) = load_all(&sources, &linux_registry());

    assert!(report.is_empty());
    assert_eq!(
        names(&table),
        ["vpc.create", "vpc.delete", "vpc.describe"]
            .into_iter()
            .map(str::to_string)
            .collect()
    );
    assert_eq!(table.modules(), vec!["vpc"]);
    assert_eq!(table.providers("vpc")[0].source_name, "boto_vpc");
}

#[test]
fn rebuilding_from_same_inputs_yields_same_names() {
    let registry = linux_registry();
    let sources = vec![builtin_source()];

    let (first, first_report) = load_all(&sources, &registry);
    let (second, second_report) = load_all(&sources, &registry);

    assert!(!first.is_empty());
    assert_eq!(names(&first), names(&second));
    assert_eq!(first_report, second_report);
}

#[test]
fn same_virtual_name_merges_disjoint_functions_and_later_wins_overlap() {
    let sources = vec![
        source(vec![StaticAdapter::new("foo_base")
            .virtual_name("foo")
            .function("alpha", |_, _| Ok(json!("base.alpha")))
            .function("shared", |_, _| Ok(json!("base.shared")))]),
        source(vec![StaticAdapter::new("foo_ext")
            .virtual_name("foo")
            .function("beta", |_, _| Ok(json!("ext.beta")))
            .function("shared", |_, _| Ok(json!("ext.shared")))]),
    ];
    let (table, _) = load_all(&sources, &linux_registry());

    assert_eq!(
        names(&table),
        ["foo.alpha", "foo.beta", "foo.shared"]
            .into_iter()
            .map(str::to_string)
            .collect()
    );
    let args = CallArgs::new();
    assert_eq!(call(&table, "foo.alpha", &args).expect("alpha"), json!("base.alpha"));
    assert_eq!(call(&table, "foo.beta", &args).expect("beta"), json!("ext.beta"));
    assert_eq!(call(&table, "foo.shared", &args).expect("shared"), json!("ext.shared"));
    assert_eq!(table.providers("foo").len(), 2);
}

#[test]
fn alias_exposes_external_name_only() {
    let sources = vec![source(vec![StaticAdapter::new("a")
        .function("list_", |_, _| Ok(json!(["one"])))
        .function("info", |_, _| Ok(json!({})))
        .alias("list_", "list")])];
    let (table, _) = load_all(&sources, &linux_registry());

    assert_eq!(
        call(&table, "a.list", &CallArgs::new()).expect("a.list callable"),
        json!(["one"])
    );
    assert!(!table.contains("a.list_"));
    assert!(call(&table, "a.list_", &CallArgs::new())
        .expect_err("internal name hidden")
        .is_unknown_capability());
}

#[test]
fn failing_eligibility_check_does_not_block_other_adapters() {
    let sources = vec![source(vec![
        StaticAdapter::new("consul")
            .eligible_when(|_| Err(AdapterError::new("connection refused")))
            .function("get", |_, _| Ok(Value::Null)),
        StaticAdapter::new("fragile")
            .eligible_when(|_| panic!("check exploded"))
            .function("get", |_, _| Ok(Value::Null)),
        StaticAdapter::new("etcd").function("get", |_, _| Ok(json!("value"))),
    ])];
    let (table, report) = load_all(&sources, &linux_registry());

    assert_eq!(
        call(&table, "etcd.get", &CallArgs::new()).expect("etcd loads"),
        json!("value")
    );
    let consul = report.get("consul").expect("consul reported");
    assert!(consul
        .reason
        .as_deref()
        .is_some_and(|reason| reason.contains("connection refused")));
    let fragile = report.get("fragile").expect("fragile reported");
    assert!(fragile
        .reason
        .as_deref()
        .is_some_and(|reason| reason.contains("check exploded")));
    assert!(!table.contains("consul.get"));
    assert!(!table.contains("fragile.get"));
}

#[test]
fn dispatcher_reports_unknown_and_passes_arguments_untouched() {
    let seen: Arc<Mutex<Vec<CallArgs>>> = Arc::new(Mutex::new(Vec::new()));
    let recorder = Arc::clone(&seen);
    let sources = vec![source(vec![StaticAdapter::new("rec").function(
        "record",
        move |_, args| {
            recorder.lock().expect("recorder lock").push(args.clone());
            Ok(json!("recorded"))
        },
    )])];
    let (table, _) = load_all(&sources, &linux_registry());

    let err = call(&table, "rec.missing", &CallArgs::new()).expect_err("unknown function");
    assert!(matches!(err, DispatchError::UnknownCapability { ref name, .. } if name == "rec.missing"));
    let err = call(&table, "nope.run", &CallArgs::new()).expect_err("unknown module");
    assert_eq!(err.to_string(), "'nope.run' is not available.");

    let args = CallArgs::new()
        .arg(json!({"nested": [1, 2]}))
        .arg("  spaced  ")
        .kwarg("flag", true);
    assert_eq!(
        call(&table, "rec.record", &args).expect("record"),
        json!("recorded")
    );
    let seen = seen.lock().expect("seen lock");
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0], args);
}

#[test]
fn adapter_errors_surface_as_adapter_variant() {
    let (table, _) = load_all(&[builtin_source()], &linux_registry());
    let err = call(&table, "test.exception", &CallArgs::new().arg("boom"))
        .expect_err("exception must fail");
    match err {
        DispatchError::Adapter { name, source } => {
            assert_eq!(name, "test.exception");
            assert!(matches!(source, CallError::Other(message) if message == "boom"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn adapter_function_reaches_stubbed_cmd_run() {
    let mut builder = builtins::builder(LoaderOptions::new());
    builder
        .rebind("cmd.run", |_| Ok(json!("ok")))
        .expect("stub cmd.run");
    let registry = Arc::new(builder.freeze());
    let sources = vec![source(vec![StaticAdapter::new("x_adapter")
        .eligible_when(|_| Ok(VirtualVerdict::LoadAs("x".to_string())))
        .requires("cmd.run")
        .function("check", |registry, _| {
            registry.call("cmd.run", &CallArgs::new().arg("somecmd"))
        })])];
    let (table, _) = load_all(&sources, &registry);

    assert_eq!(
        call(&table, "x.check", &CallArgs::new()).expect("x.check"),
        json!("ok")
    );
}

fn stub_group_registry(kernel: &str) -> Arc<CapabilityRegistry> {
    let options = LoaderOptions::new().with("grains", json!({"kernel": kernel}));
    let mut builder = builtins::builder(options);
    builder
        .rebind("cmd.run_all", |args| {
            let cmd = args.required_str(0, "cmd")?;
            let stdout = if cmd.starts_with("getent group") {
                "wheel:x:10:alice"
            } else if cmd.starts_with("lsgroup") {
                "#name:id:users\nwheel:10:root"
            } else {
                ""
            };
            Ok(json!({"pid": 1, "retcode": 0, "stdout": stdout, "stderr": ""}))
        })
        .expect("stub cmd.run_all");
    Arc::new(builder.freeze())
}

#[test]
fn generic_group_serves_group_info_on_non_aix_host() {
    let (table, report) = load_all(&[builtin_source()], &stub_group_registry("Linux"));

    let bound = table.get("group.info").expect("group.info bound");
    assert_eq!(bound.source_name(), "group");
    assert_eq!(
        call(&table, "group.info", &CallArgs::new().arg("wheel")).expect("group.info"),
        json!({"name": "wheel", "passwd": "x", "gid": 10, "members": ["alice"]})
    );
    assert!(report.contains("aix_group"));
    assert_eq!(table.providers("group").len(), 1);
}

#[test]
fn aix_group_serves_group_info_on_aix_host() {
    let (table, report) = load_all(&[builtin_source()], &stub_group_registry("AIX"));

    let bound = table.get("group.info").expect("group.info bound");
    assert_eq!(bound.source_name(), "aix_group");
    assert_eq!(
        call(&table, "group.info", &CallArgs::new().arg("wheel")).expect("group.info"),
        json!({"name": "wheel", "passwd": "!", "gid": 10, "members": ["root"]})
    );
    assert!(report.contains("group"));
    assert!(table.contains("group.list"));
    assert!(!table.contains("group.getent"));
}

#[test]
fn builtin_test_module_aliases_reserved_names() {
    let (table, _) = load_all(&[builtin_source()], &linux_registry());
    assert_eq!(
        call(&table, "test.true", &CallArgs::new()).expect("test.true"),
        json!(true)
    );
    assert_eq!(
        call(&table, "test.false", &CallArgs::new()).expect("test.false"),
        json!(false)
    );
    assert!(!table.contains("test.true_"));
    assert_eq!(table.get("test.arg").and_then(|bound| bound.outputter()), Some("yaml"));
}
