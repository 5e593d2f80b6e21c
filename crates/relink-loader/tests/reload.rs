//! Reload cycle scenarios: ordering, containment, revisions and removal.

mod common;

use common::{id, loader, script};
use relink_loader::{CancelToken, ChangeSet, CompilationCause, ModuleOutcome, ReloadError};
use serde_json::json;

const B_V1: &str = "namespace lib.b\nlet greeting = \"Hello B v1\"\n";
const B_V2: &str = "namespace lib.b\nlet greeting = \"Hello B v2\"\n";
const B_BROKEN: &str = "namespace lib.b\nlet greeting = (\"Hello B v2\"\n";
const A_SRC: &str = "namespace app.a\nlet run = lib.b.greeting\n";

#[test]
fn dependencies_build_before_dependents() {
    let loader = loader();
    let report = loader.apply_change_set(
        ChangeSet::new()
            .add(script("a", &["b"], "let x = b.x + 1"))
            .add(script("b", &["c"], "let x = c.x + 1"))
            .add(script("c", &[], "let x = 1")),
    );

    assert!(report.is_success(), "{report:?}");
    assert_eq!(report.order, [id("c"), id("b"), id("a")]);
    assert_eq!(report.snapshot_version, 1);
    let a = loader.lookup(&id("a")).unwrap();
    assert_eq!(a.invoke("a.x", &[]).unwrap(), json!(3));
}

#[test]
fn failed_dependency_update_keeps_previous_revisions() {
    let loader = loader();
    let report = loader.apply_change_set(
        ChangeSet::new()
            .add(script("b", &[], B_V1))
            .add(script("a", &["b"], A_SRC)),
    );
    assert!(report.is_success(), "{report:?}");
    let b_v1 = loader.lookup(&id("b")).unwrap();

    let report = loader.update_archives([script("b", &[], B_BROKEN)]);
    assert!(!report.is_success());
    match report.outcome(&id("b")).unwrap() {
        ModuleOutcome::Failed {
            error: ReloadError::Compilation(err),
            retained: Some(1),
        } => {
            assert!(matches!(&err.cause, CompilationCause::Backend(f) if f.line == Some(2)));
        }
        other => panic!("unexpected outcome for b: {other:?}"),
    }
    assert_eq!(
        report.outcome(&id("a")),
        Some(&ModuleOutcome::Failed {
            error: ReloadError::DependencyFailed {
                module: id("a"),
                dependency: id("b"),
            },
            retained: Some(1),
        })
    );
    assert!(!report.committed);

    let b = loader.lookup(&id("b")).unwrap();
    assert_eq!(b.revision(), 1);
    assert_eq!(b.content_hash(), b_v1.content_hash());
    let a = loader.lookup(&id("a")).unwrap();
    assert_eq!(a.invoke("app.a.run", &[]).unwrap(), json!("Hello B v1"));
}

#[test]
fn dependents_relink_against_new_revision() {
    let loader = loader();
    loader.apply_change_set(
        ChangeSet::new()
            .add(script("b", &[], B_V1))
            .add(script("a", &["b"], A_SRC)),
    );
    let a_v1 = loader.lookup(&id("a")).unwrap();

    let report = loader.update_archives([script("b", &[], B_V2)]);
    assert!(report.is_success(), "{report:?}");
    assert_eq!(report.order, [id("b"), id("a")]);
    assert_eq!(
        report.outcome(&id("a")),
        Some(&ModuleOutcome::Published {
            revision: 2,
            previous: Some(1)
        })
    );

    let a = loader.lookup(&id("a")).unwrap();
    assert_eq!(a.invoke("app.a.run", &[]).unwrap(), json!("Hello B v2"));
    assert_eq!(a.linked_dependencies()[0].revision, 2);
    // Handles taken before the reload keep working against what they linked.
    assert_eq!(a_v1.invoke("app.a.run", &[]).unwrap(), json!("Hello B v1"));
}

#[test]
fn cycles_are_rejected_as_a_unit() {
    let loader = loader();
    let report = loader.apply_change_set(
        ChangeSet::new()
            .add(script("a", &["b"], "let x = 1"))
            .add(script("b", &["a"], "let x = 2"))
            .add(script("c", &[], "let x = 3")),
    );

    for module in ["a", "b"] {
        match report.outcome(&id(module)) {
            Some(ModuleOutcome::Failed {
                error: ReloadError::Cycle(cycle),
                retained: None,
            }) => {
                assert!(cycle.involves(&id("a")) && cycle.involves(&id("b")));
            }
            other => panic!("unexpected outcome for {module}: {other:?}"),
        }
    }
    assert_eq!(report.published_revision(&id("c")), Some(1));
    assert!(loader.lookup(&id("a")).is_none());
    assert!(loader.lookup(&id("b")).is_none());
}

#[test]
fn every_member_of_a_strongly_connected_set_is_a_cycle() {
    let loader = loader();
    let report = loader.apply_change_set(
        ChangeSet::new()
            .add(script("a", &["b", "d"], "let x = 1"))
            .add(script("b", &["a"], "let x = 2"))
            .add(script("d", &["b"], "let x = 3")),
    );
    for module in ["a", "b", "d"] {
        match report.outcome(&id(module)) {
            Some(ModuleOutcome::Failed {
                error: ReloadError::Cycle(cycle),
                retained: None,
            }) => assert_eq!(cycle.members, [id("a"), id("b"), id("d")]),
            other => panic!("unexpected outcome for {module}: {other:?}"),
        }
    }
    assert!(loader.list_all().is_empty());
}

#[test]
fn deeply_nested_source_fails_only_its_module() {
    let loader = loader();
    loader.update_archives([script("b", &[], B_V1)]);

    let deep = format!("let x = {}1{}", "(".repeat(200_000), ")".repeat(200_000));
    let report = loader.apply_change_set(
        ChangeSet::new()
            .add(script("deep", &[], &deep))
            .add(script("ok", &[], "let x = 1"))
            .update(script("b", &[], B_V2)),
    );

    match report.outcome(&id("deep")) {
        Some(ModuleOutcome::Failed {
            error: ReloadError::Compilation(err),
            retained: None,
        }) => {
            let CompilationCause::Backend(failure) = &err.cause else {
                panic!("unexpected cause: {}", err.cause);
            };
            assert!(failure.message.contains("nested too deeply"), "{failure}");
        }
        other => panic!("unexpected outcome for deep: {other:?}"),
    }
    assert_eq!(report.published_revision(&id("ok")), Some(1));
    assert_eq!(report.published_revision(&id("b")), Some(2));
    assert!(loader.lookup(&id("deep")).is_none());
}

#[test]
fn runaway_invocation_leaves_the_registry_intact() {
    let loader = loader();
    let report = loader.update_archives([script("rec", &[], "let a = a()\nlet ok = \"fine\"\n")]);
    assert!(report.is_success(), "{report:?}");
    let version = loader.registry().current_snapshot_version();

    let module = loader.lookup(&id("rec")).unwrap();
    assert!(module.invoke("rec.a", &[]).is_err());
    assert_eq!(module.invoke("rec.ok", &[]).unwrap(), json!("fine"));
    assert_eq!(loader.registry().current_snapshot_version(), version);
    assert_eq!(loader.lookup(&id("rec")).unwrap().revision(), 1);
}

#[test]
fn missing_dependency_is_reported() {
    let loader = loader();
    let report = loader.update_archives([script("a", &["nowhere"], "let x = 1")]);
    assert_eq!(
        report.failures().collect::<Vec<_>>(),
        [(
            &id("a"),
            &ReloadError::UnresolvedDependency {
                module: id("a"),
                missing: id("nowhere"),
            }
        )]
    );
    assert!(loader.list_all().is_empty());
}

#[test]
fn revisions_never_repeat() {
    let loader = loader();
    let report = loader.update_archives([script("a", &[], "let x = 1")]);
    assert_eq!(report.published_revision(&id("a")), Some(1));
    let report = loader.update_archives([script("a", &[], "let x = 2")]);
    assert_eq!(report.published_revision(&id("a")), Some(2));

    let report = loader.remove_module(&id("a"));
    assert_eq!(
        report.outcome(&id("a")),
        Some(&ModuleOutcome::Removed { last_revision: 2 })
    );
    assert!(loader.lookup(&id("a")).is_none());

    let report = loader.update_archives([script("a", &[], "let x = 3")]);
    assert_eq!(
        report.outcome(&id("a")),
        Some(&ModuleOutcome::Published {
            revision: 3,
            previous: None
        })
    );
}

#[test]
fn failed_first_build_does_not_consume_a_revision() {
    let loader = loader();
    let report = loader.update_archives([script("a", &[], "let x = (")]);
    assert!(matches!(
        report.outcome(&id("a")),
        Some(ModuleOutcome::Failed { retained: None, .. })
    ));
    let report = loader.update_archives([script("a", &[], "let x = 1")]);
    assert_eq!(report.published_revision(&id("a")), Some(1));
}

#[test]
fn removing_a_dependency_quarantines_dependents() {
    let loader = loader();
    loader.apply_change_set(
        ChangeSet::new()
            .add(script("b", &[], B_V1))
            .add(script("a", &["b"], A_SRC)),
    );

    let report = loader.remove_module(&id("b"));
    assert!(report.committed);
    assert_eq!(
        report.outcome(&id("b")),
        Some(&ModuleOutcome::Removed { last_revision: 1 })
    );
    assert!(matches!(
        report.outcome(&id("a")),
        Some(ModuleOutcome::Failed {
            error: ReloadError::UnresolvedDependency { .. },
            retained: Some(1),
        })
    ));
    assert!(loader.lookup(&id("b")).is_none());
    let a = loader.lookup(&id("a")).unwrap();
    assert_eq!(a.invoke("app.a.run", &[]).unwrap(), json!("Hello B v1"));
}

#[test]
fn last_submission_of_an_id_wins() {
    let loader = loader();
    let report = loader.apply_change_set(
        ChangeSet::new()
            .add(script("a", &[], "let x = \"first\""))
            .update(script("a", &[], "let x = \"second\"")),
    );
    assert_eq!(report.outcomes.len(), 1);
    assert_eq!(report.published_revision(&id("a")), Some(1));
    let a = loader.lookup(&id("a")).unwrap();
    assert_eq!(a.invoke("a.x", &[]).unwrap(), json!("second"));
}

#[test]
fn removal_overrides_submission_in_same_change_set() {
    let loader = loader();
    loader.update_archives([script("a", &[], "let x = 1")]);
    let report = loader.apply_change_set(
        ChangeSet::new()
            .update(script("a", &[], "let x = 2"))
            .remove(id("a")),
    );
    assert_eq!(
        report.outcome(&id("a")),
        Some(&ModuleOutcome::Removed { last_revision: 1 })
    );
    assert!(loader.lookup(&id("a")).is_none());
}

#[test]
fn empty_and_ineffective_change_sets_publish_nothing() {
    let loader = loader();
    loader.update_archives([script("a", &[], "let x = 1")]);
    let version = loader.registry().current_snapshot_version();

    let report = loader.apply_change_set(ChangeSet::new());
    assert!(!report.committed);
    assert!(report.outcomes.is_empty());
    assert_eq!(report.snapshot_version, version);

    let report = loader.remove_module(&id("never-loaded"));
    assert!(!report.committed);
    assert_eq!(loader.registry().current_snapshot_version(), version);
}

#[test]
fn cancelled_cycle_commits_nothing() {
    let loader = loader();
    let token = CancelToken::new();
    token.cancel();
    let report =
        loader.apply_change_set_with(ChangeSet::new().add(script("a", &[], "let x = 1")), &token);
    assert!(report.cancelled);
    assert!(!report.committed);
    assert!(!report.is_success());
    assert!(loader.lookup(&id("a")).is_none());
    assert_eq!(loader.registry().current_snapshot_version(), 0);

    // Revisions handed out by a cancelled cycle are not burned.
    let report = loader.update_archives([script("a", &[], "let x = 1")]);
    assert_eq!(report.published_revision(&id("a")), Some(1));
}

#[test]
fn unrelated_modules_are_not_rebuilt() {
    let loader = loader();
    loader.apply_change_set(
        ChangeSet::new()
            .add(script("b", &[], B_V1))
            .add(script("a", &["b"], A_SRC))
            .add(script("solo", &[], "let x = 1")),
    );
    let report = loader.update_archives([script("b", &[], B_V2)]);
    assert_eq!(report.order, [id("b"), id("a")]);
    assert!(report.outcome(&id("solo")).is_none());
    assert_eq!(loader.lookup(&id("solo")).unwrap().revision(), 1);
}

#[test]
fn directory_archives_load_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("greeter");
    std::fs::create_dir_all(root.join("src")).unwrap();
    std::fs::write(
        root.join("module.toml"),
        "[module]\nid = \"greeter\"\ncompiler-plugins = [\"script\"]\n",
    )
    .unwrap();
    std::fs::write(root.join("src/main.rls"), "let hello = \"Hello \" + $1\n").unwrap();
    std::fs::write(root.join("banner.txt"), "welcome").unwrap();

    let archive = relink_core::ScriptArchive::from_dir(&root).unwrap();
    let loader = loader();
    let report = loader.update_archives([archive]);
    assert!(report.is_success(), "{report:?}");

    let module = loader.lookup(&id("greeter")).unwrap();
    assert_eq!(
        module.invoke("greeter.hello", &[json!("there")]).unwrap(),
        json!("Hello there")
    );
    assert_eq!(module.resource("banner.txt"), Some(&b"welcome"[..]));
    assert_eq!(module.compiler().map(|p| p.as_str()), Some("script"));
}
