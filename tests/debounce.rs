mod common;
use crate::common::fakes::{ScriptedCapability, StaticProvider};
use crate::common::{init_tracing, with_timeout};

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use opdeck::fs::mock::MockFileSystem;
use opdeck::registry::CommandRegistry;
use opdeck::watch::{
    Fingerprinter, MAX_WAIT_WINDOWS, ReloadDebouncer, WatchFilter, reload_blocking,
};

const WINDOW: Duration = Duration::from_millis(30);

fn loaded_registry() -> (StaticProvider, Arc<CommandRegistry>) {
    let provider = StaticProvider::new("base").with("deploy", ScriptedCapability::ok(["x"]));
    let registry = Arc::new(CommandRegistry::new(vec![provider.boxed()]));
    registry.reload().unwrap();
    (provider, registry)
}

#[tokio::test]
async fn test_burst_collapses_into_one_reload() {
    init_tracing();
    let (_provider, registry) = loaded_registry();
    let (tx, rx) = mpsc::unbounded_channel();

    for i in 0..10 {
        tx.send(PathBuf::from(format!("/deck/formula/{i}.toml"))).unwrap();
    }
    drop(tx);

    let reloads = with_timeout(ReloadDebouncer::new(Arc::clone(&registry), WINDOW).run(rx)).await;

    assert_eq!(reloads, 1);
    assert_eq!(registry.generation(), 2);
}

#[tokio::test]
async fn test_separate_bursts_reload_separately() {
    init_tracing();
    let (provider, registry) = loaded_registry();
    let (tx, rx) = mpsc::unbounded_channel();
    let debouncer = tokio::spawn(ReloadDebouncer::new(Arc::clone(&registry), WINDOW).run(rx));

    tx.send(PathBuf::from("/deck/formula/a.toml")).unwrap();
    tx.send(PathBuf::from("/deck/formula/a.toml")).unwrap();
    tokio::time::sleep(WINDOW * 5).await;
    assert_eq!(registry.generation(), 2);

    provider.set("rollback", ScriptedCapability::ok(["y"]));
    tx.send(PathBuf::from("/deck/formula/b.toml")).unwrap();
    drop(tx);

    let reloads = with_timeout(debouncer).await.unwrap();
    assert_eq!(reloads, 2);
    assert_eq!(registry.generation(), 3);
    assert!(registry.get("rollback").is_ok());
}

#[tokio::test]
async fn test_steady_trickle_still_reloads() {
    init_tracing();
    let (_provider, registry) = loaded_registry();
    let (tx, rx) = mpsc::unbounded_channel();
    let debouncer = tokio::spawn(ReloadDebouncer::new(Arc::clone(&registry), WINDOW).run(rx));

    // Changes arrive faster than the window for well past the maximum wait.
    let trickle_for = WINDOW * MAX_WAIT_WINDOWS * 3;
    let started = tokio::time::Instant::now();
    while started.elapsed() < trickle_for {
        tx.send(PathBuf::from("/deck/formula/base.toml")).unwrap();
        tokio::time::sleep(WINDOW / 3).await;
    }

    assert!(
        registry.generation() >= 2,
        "no reload during {trickle_for:?} of steady changes"
    );
    drop(tx);
    with_timeout(debouncer).await.unwrap();
}

#[tokio::test]
async fn test_failed_reload_after_change_keeps_commands() {
    init_tracing();
    let (provider, registry) = loaded_registry();
    provider.fail_with(Some("syntax error"));

    let (tx, rx) = mpsc::unbounded_channel();
    tx.send(PathBuf::from("/deck/formula/a.toml")).unwrap();
    drop(tx);

    let reloads = with_timeout(ReloadDebouncer::new(Arc::clone(&registry), WINDOW).run(rx)).await;

    // Attempted, but the old snapshot stays.
    assert_eq!(reloads, 1);
    assert_eq!(registry.generation(), 1);
    assert!(registry.get("deploy").is_ok());
}

#[tokio::test]
async fn test_unchanged_content_skips_reload() {
    init_tracing();
    let (_provider, registry) = loaded_registry();

    let fs = MockFileSystem::new();
    fs.add_file("/deck/formula/base.toml", "[command.deploy]\n");
    let filter = WatchFilter::new("/deck", &["**/*.toml".to_string()], &[]).unwrap();
    let fingerprinter =
        Fingerprinter::new(Arc::new(fs.clone()), vec![PathBuf::from("/deck/formula")], filter);
    let loaded = fingerprinter.compute().unwrap();

    let (tx, rx) = mpsc::unbounded_channel();
    let debouncer = tokio::spawn(
        ReloadDebouncer::new(Arc::clone(&registry), WINDOW)
            .with_fingerprint(fingerprinter, Some(loaded))
            .run(rx),
    );

    // Touch without edit.
    tx.send(PathBuf::from("/deck/formula/base.toml")).unwrap();
    tokio::time::sleep(WINDOW * 5).await;
    assert_eq!(registry.generation(), 1);

    // Real edit.
    fs.add_file("/deck/formula/base.toml", "[command.deploy]\n# edited\n");
    tx.send(PathBuf::from("/deck/formula/base.toml")).unwrap();
    drop(tx);

    let reloads = with_timeout(debouncer).await.unwrap();
    assert_eq!(reloads, 1);
    assert_eq!(registry.generation(), 2);
}

#[tokio::test]
async fn test_reload_blocking_reports_outcome() {
    let (provider, registry) = loaded_registry();
    assert!(reload_blocking(Arc::clone(&registry)).await);

    provider.fail_with(Some("boom"));
    assert!(!reload_blocking(Arc::clone(&registry)).await);
    assert_eq!(registry.generation(), 2);
}
