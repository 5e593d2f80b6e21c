//! Visibility scenarios: dependencies, host imports and plugin runtimes.

mod common;

use common::{archive, builder, id, loader, plugin, script};
use relink_core::{InvocationError, ModuleSpec, Origin, SymbolTable};
use relink_loader::{ChangeSet, CompilationCause, LoaderConfig, ModuleOutcome, ReloadError};
use serde_json::json;

fn host_loader() -> relink_loader::ModuleLoader {
    let mut host = SymbolTable::new();
    host.define_constant("pkg.allowed.X", json!("x")).unwrap();
    host.define_constant("pkg.allowedX", json!("lookalike")).unwrap();
    host.define_constant("pkg.other.Y", json!("y")).unwrap();
    host.define_constant("sys.secret", json!("s")).unwrap();
    let config = LoaderConfig {
        exposed_packages: vec!["pkg".into()],
        ..LoaderConfig::default()
    };
    builder(config).host_symbols(&host).build().unwrap()
}

fn importing(name: &str, imports: &[&str], source: &str) -> relink_core::ScriptArchive {
    let mut spec = ModuleSpec::builder(id(name)).compiler_plugin(plugin("script"));
    for prefix in imports {
        spec = spec.allow_import(*prefix);
    }
    archive(spec.build().unwrap(), &[("main.rls", source)])
}

#[test]
fn unrelated_modules_cannot_see_each_other() {
    let loader = loader();
    let report = loader.apply_change_set(
        ChangeSet::new()
            .add(script("other", &[], "let secret = \"hidden\""))
            .add(script("app", &[], "let x = 1")),
    );
    assert!(report.is_success(), "{report:?}");

    let app = loader.lookup(&id("app")).unwrap();
    assert_eq!(
        app.invoke("other.secret", &[]),
        Err(InvocationError::IsolationViolation {
            module: id("app"),
            symbol: "other.secret".into(),
        })
    );

    // Referencing it from source fails the build instead.
    let report = loader.update_archives([script("app", &[], "let x = other.secret")]);
    assert!(matches!(
        report.outcome(&id("app")),
        Some(ModuleOutcome::Failed {
            error: ReloadError::Compilation(_),
            retained: Some(1),
        })
    ));
}

#[test]
fn transitive_dependencies_are_visible() {
    let loader = loader();
    loader.apply_change_set(
        ChangeSet::new()
            .add(script("c", &[], "let x = \"c\""))
            .add(script("b", &["c"], "let x = \"b\""))
            .add(script("a", &["b"], "let x = c.x + b.x")),
    );
    let a = loader.lookup(&id("a")).unwrap();
    assert_eq!(a.invoke("a.x", &[]).unwrap(), json!("cb"));

    let linked: Vec<_> = a.linked_dependencies().iter().map(|l| l.id.clone()).collect();
    assert_eq!(linked, [id("b"), id("c")]);
    let resolved = a.resolve_symbol("c.x").unwrap();
    assert_eq!(
        resolved.origin,
        Origin::Dependency {
            module: id("c"),
            revision: 1
        }
    );
}

#[test]
fn host_imports_need_both_allow_lists() {
    let loader = host_loader();
    let report = loader.update_archives([
        importing("app", &["pkg.allowed", "sys"], "let x = pkg.allowed.X"),
        importing("closed", &[], "let x = 1"),
    ]);
    assert!(report.is_success(), "{report:?}");

    let app = loader.lookup(&id("app")).unwrap();
    assert_eq!(app.invoke("app.x", &[]).unwrap(), json!("x"));
    assert_eq!(app.resolve_symbol("pkg.allowed.X").unwrap().origin, Origin::Host);
    for hidden in ["pkg.allowedX", "pkg.other.Y", "sys.secret"] {
        assert!(
            matches!(app.invoke(hidden, &[]), Err(InvocationError::IsolationViolation { .. })),
            "{hidden} should be hidden"
        );
    }

    let closed = loader.lookup(&id("closed")).unwrap();
    assert!(closed.invoke("pkg.allowed.X", &[]).is_err());
}

#[test]
fn filtered_import_fails_the_build() {
    let loader = host_loader();
    let report =
        loader.update_archives([importing("app", &["pkg.allowed"], "let y = pkg.other.Y")]);
    match report.outcome(&id("app")) {
        Some(ModuleOutcome::Failed {
            error: ReloadError::Compilation(err),
            retained: None,
        }) => match &err.cause {
            CompilationCause::Backend(failure) => {
                assert!(failure.message.contains("pkg.other.Y"));
                assert_eq!(failure.entry.as_deref(), Some("main.rls"));
            }
            other => panic!("unexpected cause {other:?}"),
        },
        other => panic!("unexpected outcome {other:?}"),
    }
}

#[test]
fn plugin_runtimes_are_visible_only_to_declaring_modules() {
    let loader = loader();
    let data_spec = ModuleSpec::builder(id("data"))
        .compiler_plugin(plugin("symbols"))
        .build()
        .unwrap();
    let report = loader.apply_change_set(
        ChangeSet::new()
            .add(script("banner", &[], "let line = script.runtime.repeat($1, 3)"))
            .add(archive(data_spec, &[("data.symbols.toml", "[symbols.data]\nname = \"d\"\n")])),
    );
    assert!(report.is_success(), "{report:?}");

    let banner = loader.lookup(&id("banner")).unwrap();
    assert_eq!(banner.invoke("banner.line", &[json!("=")]).unwrap(), json!("==="));
    assert_eq!(
        banner.resolve_symbol("script.runtime.repeat").unwrap().origin,
        Origin::Plugin(plugin("script"))
    );

    let data = loader.lookup(&id("data")).unwrap();
    assert_eq!(data.invoke("data.name", &[]).unwrap(), json!("d"));
    assert!(matches!(
        data.invoke("script.runtime.repeat", &[json!("="), json!(3)]),
        Err(InvocationError::IsolationViolation { .. })
    ));
}

#[test]
fn dependency_code_keeps_its_own_boundary() {
    let loader = host_loader();
    let app_spec = ModuleSpec::builder(id("app"))
        .compiler_plugin(plugin("script"))
        .dependency(id("fmt"))
        .build()
        .unwrap();
    let report = loader.apply_change_set(
        ChangeSet::new()
            .add(importing("fmt", &["pkg.allowed"], "let tag = pkg.allowed.X + $1"))
            .add(archive(app_spec, &[("main.rls", "let label = fmt.tag(\"!\")")])),
    );
    assert!(report.is_success(), "{report:?}");

    let app = loader.lookup(&id("app")).unwrap();
    assert_eq!(app.invoke("app.label", &[]).unwrap(), json!("x!"));
    assert!(matches!(
        app.invoke("pkg.allowed.X", &[]),
        Err(InvocationError::IsolationViolation { .. })
    ));
}

#[test]
fn undeclared_plugin_is_rejected() {
    let loader = loader();
    let spec = ModuleSpec::builder(id("app"))
        .compiler_plugin(plugin("nope"))
        .build()
        .unwrap();
    let report = loader.update_archives([archive(spec, &[("main.rls", "let x = 1")])]);
    assert_eq!(
        report.failures().map(|(_, e)| e.clone()).collect::<Vec<_>>(),
        [ReloadError::UnknownPlugin {
            module: id("app"),
            plugin: plugin("nope"),
        }]
    );
}

#[test]
fn unclaimed_archives_publish_resources_only() {
    let loader = loader();
    let spec = ModuleSpec::empty(id("assets"));
    let report = loader.update_archives([archive(spec, &[("logo.svg", "<svg/>")])]);
    assert!(report.is_success(), "{report:?}");

    let assets = loader.lookup(&id("assets")).unwrap();
    assert!(assets.symbols().is_empty());
    assert!(assets.compiler().is_none());
    assert_eq!(assets.resource("logo.svg"), Some(&b"<svg/>"[..]));
}

const MIXED_SOURCE: &str = "let hello = \"Hello Mixed Module!\"\nlet both = hello + \" \" + byte\n";
const MIXED_TABLE: &str = "[symbols.mixed]\nbyte = \"Hello Precompiled!\"\n";

#[test]
fn mixed_archive_publishes_scripts_and_tables() {
    let loader = loader();
    let spec = ModuleSpec::builder(id("mixed"))
        .compiler_plugin(plugin("mixed"))
        .build()
        .unwrap();
    let report = loader.update_archives([archive(
        spec,
        &[("main.rls", MIXED_SOURCE), ("data.symbols.toml", MIXED_TABLE)],
    )]);
    assert!(report.is_success(), "{report:?}");

    let module = loader.lookup(&id("mixed")).unwrap();
    assert_eq!(module.compiler().map(|p| p.as_str()), Some("mixed"));
    assert_eq!(module.invoke("mixed.hello", &[]).unwrap(), json!("Hello Mixed Module!"));
    assert_eq!(module.invoke("mixed.byte", &[]).unwrap(), json!("Hello Precompiled!"));
    assert_eq!(
        module.invoke("mixed.both", &[]).unwrap(),
        json!("Hello Mixed Module! Hello Precompiled!")
    );
}

#[test]
fn single_claimant_builds_only_its_half() {
    let loader = loader();
    let spec = ModuleSpec::builder(id("mixed"))
        .compiler_plugin(plugin("script"))
        .compiler_plugin(plugin("symbols"))
        .build()
        .unwrap();
    let source = "let hello = \"Hello Mixed Module!\"\n";
    let report = loader.update_archives([archive(
        spec,
        &[("main.rls", source), ("data.symbols.toml", MIXED_TABLE)],
    )]);
    assert!(report.is_success(), "{report:?}");

    let module = loader.lookup(&id("mixed")).unwrap();
    assert_eq!(module.compiler().map(|p| p.as_str()), Some("script"));
    assert!(module.invoke("mixed.hello", &[]).is_ok());
    assert!(matches!(
        module.invoke("mixed.byte", &[]),
        Err(InvocationError::IsolationViolation { .. })
    ));
}
