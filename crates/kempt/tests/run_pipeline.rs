//! End-to-end passes through the orchestrator with real files.

mod harness;

use harness::{enable, recording_registry, upper_deps, CorruptingFsIo, Project, UpperFormatter};
use kempt::config::ExtensionSpec;
use kempt::events::names;
use kempt::{FileStatus, ProcessorDeps, SessionState};
use serde_json::json;
use std::fs;
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn test_valid_and_invalid_file_in_one_run() {
    let project = Project::new();
    let a = project.write("a.js", "const a = 1;");
    let b = project.write("b.json", "{ \"broken\": ");
    let formatter = Arc::new(UpperFormatter::default());
    let orchestrator = project.orchestrator(project.config(), upper_deps(formatter.clone())).await;

    let summary = orchestrator.run_once().await.unwrap();

    assert_eq!(summary.total, 2);
    assert_eq!(summary.succeeded, 1);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.outcome(&a).unwrap().status, FileStatus::Formatted);

    let failed = summary.outcome(&b).unwrap();
    assert_eq!(failed.status, FileStatus::Failed);
    assert_eq!(failed.error.as_ref().unwrap().kind, "validation");
    assert_eq!(failed.attempts, 1);

    assert_eq!(project.read("a.js"), "CONST A = 1;");
    assert_eq!(project.read("b.json"), "{ \"broken\": ");
    // Only the valid file reached the formatter.
    assert_eq!(formatter.calls(), 1);
}

#[tokio::test]
async fn test_second_run_is_idempotent() {
    let project = Project::new();
    project.write("src/a.js", "let a;");
    project.write("src/b.css", "body {}");
    project.write("README.md", "# title");
    let formatter = Arc::new(UpperFormatter::default());
    let orchestrator = project.orchestrator(project.config(), upper_deps(formatter.clone())).await;

    let first = orchestrator.run_once().await.unwrap();
    assert_eq!(first.formatted, 3);
    let calls_after_first = formatter.calls();
    let contents: Vec<String> = ["src/a.js", "src/b.css", "README.md"].iter().map(|p| project.read(p)).collect();

    let second = orchestrator.run_once().await.unwrap();
    assert_eq!(second.total, 3);
    assert_eq!(second.skipped, 3);
    assert_eq!(second.formatted, 0);
    assert_eq!(formatter.calls(), calls_after_first);

    let again: Vec<String> = ["src/a.js", "src/b.css", "README.md"].iter().map(|p| project.read(p)).collect();
    assert_eq!(contents, again);
}

#[tokio::test]
async fn test_cache_survives_sessions_and_resets_on_config_change() {
    let project = Project::new();
    project.write("a.js", "let a;");
    let formatter = Arc::new(UpperFormatter::default());

    {
        let orchestrator = project.orchestrator(project.config(), upper_deps(formatter.clone())).await;
        orchestrator.run_once().await.unwrap();
        orchestrator.graceful_shutdown().await.unwrap();
    }

    // Same configuration: the persisted cache is reused.
    let orchestrator = project.orchestrator(project.config(), upper_deps(formatter.clone())).await;
    assert_eq!(orchestrator.session().cache_snapshot().len(), 1);
    let summary = orchestrator.run_once().await.unwrap();
    assert_eq!(summary.skipped, 1);
    orchestrator.graceful_shutdown().await.unwrap();

    // Changing a formatter option changes the fingerprint, so the cache loads empty.
    let mut changed = project.config();
    changed.formatter.options.insert("semi".into(), false.into());
    let orchestrator = project.orchestrator(changed, upper_deps(formatter.clone())).await;
    assert!(orchestrator.session().cache_snapshot().is_empty());
    let summary = orchestrator.run_once().await.unwrap();
    assert_eq!(summary.skipped, 0);
    assert_eq!(summary.unchanged, 1);
}

#[tokio::test]
async fn test_extension_option_change_invalidates_cache() {
    let project = Project::new();
    project.write("a.js", "let a;");
    let with_header = |header: &str| {
        let mut config = project.config();
        config.extensions.push(ExtensionSpec {
            id: "license-header".to_string(),
            options: json!({ "header": header }),
        });
        config
    };

    let orchestrator = project.orchestrator(with_header("// MIT"), ProcessorDeps::default()).await;
    let summary = orchestrator.run_once().await.unwrap();
    assert_eq!(summary.formatted, 1);
    orchestrator.graceful_shutdown().await.unwrap();
    assert_eq!(project.read("a.js"), "// MIT\nlet a;");

    // Same options: the cache carries over and the file is skipped.
    let orchestrator = project.orchestrator(with_header("// MIT"), ProcessorDeps::default()).await;
    assert_eq!(orchestrator.session().cache_snapshot().len(), 1);
    assert_eq!(orchestrator.run_once().await.unwrap().skipped, 1);
    orchestrator.graceful_shutdown().await.unwrap();

    let orchestrator = project
        .orchestrator(with_header("// Apache-2.0"), ProcessorDeps::default())
        .await;
    assert!(orchestrator.session().cache_snapshot().is_empty());
    let summary = orchestrator.run_once().await.unwrap();
    assert_eq!(summary.skipped, 0);
    assert_eq!(summary.formatted, 1);
    assert_eq!(project.read("a.js"), "// Apache-2.0\n// MIT\nlet a;");
}

#[tokio::test]
async fn test_integrity_failure_keeps_recovery_copy() {
    let project = Project::new();
    let path = project.write("a.js", "let a;");
    let deps = ProcessorDeps::default()
        .with_formatter(Arc::new(UpperFormatter::default()))
        .with_io(Arc::new(CorruptingFsIo));
    let orchestrator = project.orchestrator(project.config(), deps).await;

    let summary = orchestrator.run_once().await.unwrap();
    let outcome = summary.outcome(&path).unwrap();

    assert_eq!(outcome.status, FileStatus::Failed);
    assert_eq!(outcome.error.as_ref().unwrap().kind, "integrity_mismatch");
    let recovery = outcome.recovery_path.as_ref().expect("recovery copy");
    assert!(recovery.starts_with(&project.home));
    assert_eq!(fs::read_to_string(recovery).unwrap(), "let a;");
    assert!(orchestrator.session().cache_snapshot().get(&path).is_none());
}

#[tokio::test]
async fn test_ignore_rules_and_config_precedence() {
    let project = Project::new();
    project.write(".gitignore", "dist/\n*.min.js\n");
    let kept = project.write("src/app.js", "app");
    project.write("dist/bundle.js", "bundle");
    project.write("vendor.min.js", "min");
    let reincluded = project.write("keep.min.js", "keep");
    project.write("node_modules/dep/index.js", "dep");

    let mut config = project.config();
    config.ignore.push("!keep.min.js".to_string());
    let (registry, seen) = recording_registry();
    enable(&mut config, "recorder");
    let orchestrator = project
        .orchestrator_with(config, &registry, upper_deps(Arc::new(UpperFormatter::default())))
        .await;

    let summary = orchestrator.run_once().await.unwrap();
    let mut paths: Vec<_> = summary.outcomes.iter().map(|o| o.path.clone()).collect();
    paths.sort();
    assert_eq!(paths, vec![reincluded, kept]);

    let seen = seen.lock().unwrap();
    assert!(seen.iter().any(|n| n == names::CORE_GITIGNORE_LOADED));
    assert!(seen.iter().filter(|n| *n == names::FILE_IGNORED).count() >= 2);
    // Ignored paths are announced during the walk, before scan:complete.
    let scan_complete = seen.iter().position(|n| n == names::SCAN_COMPLETE).unwrap();
    let last_ignored = seen.iter().rposition(|n| n == names::FILE_IGNORED).unwrap();
    assert!(last_ignored < scan_complete);
}

#[tokio::test]
async fn test_lifecycle_events_in_order() {
    let project = Project::new();
    project.write("a.js", "a");
    let mut config = project.config();
    let (registry, seen) = recording_registry();
    enable(&mut config, "recorder");
    let orchestrator = project
        .orchestrator_with(config, &registry, upper_deps(Arc::new(UpperFormatter::default())))
        .await;

    orchestrator.run_once().await.unwrap();
    orchestrator.graceful_shutdown().await.unwrap();

    let seen = seen.lock().unwrap().clone();
    let position = |name: &str| seen.iter().position(|n| n == name).unwrap_or_else(|| panic!("missing {}", name));
    let order = [
        names::SESSION_START,
        names::SCAN_COMPLETE,
        names::RUN_START,
        names::FILE_BEFORE_VALIDATE,
        names::FILE_VALIDATED,
        names::FILE_CACHE_MISS,
        names::FORMAT_BEFORE,
        names::FORMAT_AFTER,
        names::FILE_PROCESSED,
        names::RUN_COMPLETE,
        names::SESSION_SHUTDOWN_START,
        names::SESSION_STOP,
    ];
    for pair in order.windows(2) {
        assert!(position(pair[0]) < position(pair[1]), "{} should precede {}", pair[0], pair[1]);
    }
    assert_eq!(orchestrator.session().state(), SessionState::Stopped);
}

#[tokio::test]
async fn test_dry_run_writes_nothing() {
    let project = Project::new();
    project.write("a.js", "let a;");
    project.write("b.js", "B");
    let mut config = project.config();
    config.dry_run = true;
    let orchestrator = project.orchestrator(config, upper_deps(Arc::new(UpperFormatter::default()))).await;

    let summary = orchestrator.run_once().await.unwrap();
    assert!(summary.dry_run);
    assert_eq!(summary.would_format, 1);
    assert_eq!(summary.unchanged, 1);
    assert_eq!(project.read("a.js"), "let a;");
}

#[tokio::test]
async fn test_concurrent_requests_for_one_path_share_a_transform() {
    let project = Project::new();
    let path = project.write("a.js", "let a;");
    let formatter = Arc::new(UpperFormatter::slow(Duration::from_millis(100)));
    let orchestrator = project.orchestrator(project.config(), upper_deps(formatter.clone())).await;

    let outcomes = orchestrator
        .processor()
        .process_all(vec![path.clone(), path.clone(), path.clone()])
        .await;

    assert_eq!(formatter.calls(), 1);
    assert_eq!(outcomes.len(), 3);
    assert!(outcomes.iter().all(|o| o.status == FileStatus::Formatted));
    assert_eq!(project.read("a.js"), "LET A;");
}

#[tokio::test]
async fn test_concurrency_limit_is_respected() {
    let project = Project::new();
    for i in 0..6 {
        project.write(&format!("f{}.js", i), "x");
    }
    let mut config = project.config();
    config.concurrency = 2;
    let formatter = Arc::new(UpperFormatter::slow(Duration::from_millis(50)));
    let orchestrator = project.orchestrator(config, upper_deps(formatter)).await;

    let limiter = orchestrator.session().limiter().clone();
    let probe = tokio::spawn(async move {
        let mut peak = 0;
        for _ in 0..40 {
            peak = peak.max(limiter.active());
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        peak
    });
    let summary = orchestrator.run_once().await.unwrap();
    assert_eq!(summary.formatted, 6);
    assert!(probe.await.unwrap() <= 2);
}

#[tokio::test]
async fn test_shutdown_rejects_new_work_and_persists_cache() {
    let project = Project::new();
    let path = project.write("a.js", "let a;");
    let orchestrator = project
        .orchestrator(project.config(), upper_deps(Arc::new(UpperFormatter::default())))
        .await;
    orchestrator.run_once().await.unwrap();

    orchestrator.graceful_shutdown().await.unwrap();
    // A second call is a no-op.
    orchestrator.graceful_shutdown().await.unwrap();

    let late = orchestrator.processor().process_file(&path).await;
    assert_eq!(late.status, FileStatus::Failed);
    assert_eq!(late.error.as_ref().unwrap().kind, "shutdown_aborted");

    let cache_file = orchestrator.session().cache_store().path().to_path_buf();
    assert!(cache_file.starts_with(&project.home));
    assert!(cache_file.is_file());
}

#[tokio::test]
async fn test_missing_root_is_fatal() {
    let project = Project::new();
    let mut config = project.config();
    config.root = project.root.join("does-not-exist");

    let result = kempt::Orchestrator::initialize(
        config,
        &kempt::ExtensionRegistry::with_builtins(),
        ProcessorDeps::default(),
    )
    .await;
    assert!(matches!(result, Err(kempt::KemptError::Configuration(_))));
}

#[tokio::test]
async fn test_unknown_extension_is_skipped() {
    let project = Project::new();
    project.write("a.js", "a");
    let mut config = project.config();
    enable(&mut config, "does-not-exist");
    enable(&mut config, "final-newline");

    let orchestrator = project.orchestrator(config, ProcessorDeps::default()).await;
    let summary = orchestrator.run_once().await.unwrap();
    assert_eq!(summary.formatted, 1);
    assert_eq!(project.read("a.js"), "a\n");
}
