//! Watch mode against a real filesystem watcher.

mod harness;

use harness::{upper_deps, Project, UpperFormatter};
use kempt::{FileStatus, RunSummary};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;

async fn next_pass(rx: &mut mpsc::UnboundedReceiver<RunSummary>) -> RunSummary {
    timeout(Duration::from_secs(10), rx.recv())
        .await
        .expect("pass within timeout")
        .expect("watch still running")
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_changes_are_batched_into_one_pass() {
    let project = Project::new();
    project.write("a.js", "a");
    let mut config = project.config();
    config.watch_debounce_ms = 200;
    let formatter = Arc::new(UpperFormatter::default());
    let orchestrator = Arc::new(project.orchestrator(config, upper_deps(formatter.clone())).await);

    let (tx, mut rx) = mpsc::unbounded_channel();
    let watcher = {
        let orchestrator = Arc::clone(&orchestrator);
        tokio::spawn(async move {
            orchestrator
                .watch(move |summary| {
                    let _ = tx.send(summary.clone());
                })
                .await
        })
    };

    let initial = next_pass(&mut rx).await;
    assert_eq!(initial.formatted, 1);
    // Give the watcher time to register before touching files.
    tokio::time::sleep(Duration::from_millis(300)).await;

    let b = project.write("b.js", "b");
    let c = project.write("sub/c.js", "c");
    project.write("notes.txt", "not a target");

    let mut changed = Vec::new();
    while changed.len() < 2 {
        let pass = next_pass(&mut rx).await;
        for outcome in pass.outcomes {
            // Our own writes come back as notifications and hit the cache.
            if outcome.status == FileStatus::Skipped {
                continue;
            }
            assert_eq!(outcome.status, FileStatus::Formatted);
            changed.push(outcome.path);
        }
    }
    changed.sort();
    assert_eq!(changed, vec![b, c]);
    assert_eq!(project.read("b.js"), "B");
    // a.js was not rescanned.
    assert_eq!(formatter.calls(), 3);

    orchestrator.graceful_shutdown().await.unwrap();
    timeout(Duration::from_secs(5), watcher)
        .await
        .expect("watch loop exits after shutdown")
        .unwrap()
        .unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_ignored_changes_are_not_processed() {
    let project = Project::new();
    project.write("a.js", "a");
    let mut config = project.config();
    config.watch_debounce_ms = 100;
    config.ignore.push("generated/".to_string());
    let formatter = Arc::new(UpperFormatter::default());
    let orchestrator = Arc::new(project.orchestrator(config, upper_deps(formatter.clone())).await);

    let (tx, mut rx) = mpsc::unbounded_channel();
    let watcher = {
        let orchestrator = Arc::clone(&orchestrator);
        tokio::spawn(async move {
            orchestrator
                .watch(move |summary| {
                    let _ = tx.send(summary.clone());
                })
                .await
        })
    };
    next_pass(&mut rx).await;
    tokio::time::sleep(Duration::from_millis(300)).await;

    project.write("generated/x.js", "x");
    let kept = project.write("d.js", "d");

    let mut seen = Vec::new();
    while !seen.contains(&kept) {
        let pass = next_pass(&mut rx).await;
        seen.extend(pass.outcomes.into_iter().map(|o| o.path));
    }
    assert!(seen.iter().all(|p| !p.starts_with(project.root.join("generated"))));
    assert_eq!(project.read("generated/x.js"), "x");

    orchestrator.graceful_shutdown().await.unwrap();
    timeout(Duration::from_secs(5), watcher).await.unwrap().unwrap().unwrap();
}
