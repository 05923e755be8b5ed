mod common;
use crate::common::builders::EngineBuilder;
use crate::common::fakes::{GatedCapability, PanickingCapability, ScriptedCapability, StaticProvider};
use crate::common::{init_tracing, read_until, wait_finished, wait_until, with_timeout};

use std::collections::BTreeSet;

use opdeck::errors::OpdeckError;
use opdeck::process::{CancelAck, ProcessState};
use opdeck::types::{Outcome, Selector};

fn deploy_engine() -> opdeck::engine::Engine {
    let provider = StaticProvider::new("base")
        .with("deploy", ScriptedCapability::ok(["ok\n"]))
        .with("echo", ScriptedCapability::ok(["param={param}\n"]))
        .with("broken", ScriptedCapability::failing(["partial\n"], "boom"))
        .with("explode", std::sync::Arc::new(PanickingCapability));
    EngineBuilder::new().provider(provider.boxed()).build()
}

#[tokio::test]
async fn test_submit_streams_framed_output_in_order() {
    init_tracing();
    let engine = deploy_engine();

    let mut sub = engine.tail(Selector::from_ids([1]));
    let id = engine.submit("deploy", "v1").unwrap();
    assert_eq!(id, 1);

    let mut texts = Vec::new();
    with_timeout(async {
        loop {
            let event = sub.recv().await.expect("subscription ended early");
            assert_eq!(event.process_id, 1);
            let done = event.text.starts_with(">>> END COMMAND");
            texts.push(event.text);
            if done {
                break;
            }
        }
    })
    .await;

    assert_eq!(
        texts,
        vec![
            ">>> RUNNING COMMAND deploy:v1\n".to_string(),
            "ok\n".to_string(),
            ">>> END COMMAND command deploy:v1\n".to_string(),
        ]
    );

    assert_eq!(wait_finished(&engine, id).await, Outcome::Ok);
    let status = engine.status();
    assert!(status.running.is_empty());
    let entry = status.finished_entry(1).expect("process 1 should be finished");
    assert_eq!(entry.command, "deploy:v1");
    assert_eq!(entry.outcome, Some(Outcome::Ok));
}

#[tokio::test]
async fn test_unknown_command_allocates_no_id() {
    init_tracing();
    let engine = deploy_engine();

    match engine.submit("nope", "") {
        Err(OpdeckError::CommandNotFound(name)) => assert_eq!(name, "nope"),
        other => panic!("Expected CommandNotFound, got: {:?}", other),
    }
    let status = engine.status();
    assert!(status.running.is_empty());
    assert!(status.finished.is_empty());

    // The next successful submit still gets the first id.
    assert_eq!(engine.submit("deploy", "").unwrap(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_submits_get_distinct_ids() {
    init_tracing();
    let engine = deploy_engine();

    let mut handles = Vec::new();
    for _ in 0..8 {
        let engine = engine.clone();
        handles.push(tokio::spawn(async move { engine.submit("deploy", "").unwrap() }));
    }

    let mut ids = BTreeSet::new();
    for handle in handles {
        ids.insert(handle.await.unwrap());
    }
    assert_eq!(ids, (1..=8).collect::<BTreeSet<_>>());

    for id in ids {
        assert_eq!(wait_finished(&engine, id).await, Outcome::Ok);
    }
}

#[tokio::test]
async fn test_parameter_reaches_capability() {
    let engine = deploy_engine();
    let mut sub = engine.tail(Selector::All);

    let id = engine.submit_line("echo:a:b").unwrap();
    let text = read_until(&mut sub, id, ">>> END COMMAND").await;

    assert!(text.contains(">>> RUNNING COMMAND echo:a:b\n"));
    assert!(text.contains("param=a:b\n"));
}

#[tokio::test]
async fn test_failed_capability_reports_error_line() {
    init_tracing();
    let engine = deploy_engine();

    let id = engine.submit("broken", "").unwrap();
    assert_eq!(wait_finished(&engine, id).await, Outcome::Error("boom".to_string()));

    let log = engine.hub().buffer(id).unwrap();
    let end = log.find(">>> END COMMAND command broken\n").unwrap();
    let err = log.find("ERROR: boom\n").unwrap();
    assert!(log.starts_with(">>> RUNNING COMMAND broken\npartial\n"));
    assert!(end < err);
}

#[tokio::test]
async fn test_panicking_capability_finishes_as_error() {
    init_tracing();
    let engine = deploy_engine();

    let id = engine.submit("explode", "").unwrap();
    match wait_finished(&engine, id).await {
        Outcome::Error(msg) => assert!(msg.contains("capability aborted")),
        other => panic!("Expected Error outcome, got: {:?}", other),
    }

    // The manager is still usable afterwards.
    let next = engine.submit("deploy", "").unwrap();
    assert_eq!(wait_finished(&engine, next).await, Outcome::Ok);
}

#[tokio::test]
async fn test_cancel_moves_process_to_finished_even_if_ignored() {
    init_tracing();
    let (gated, gate) = GatedCapability::new(false);
    let provider = StaticProvider::new("base").with("hang", gated);
    let engine = EngineBuilder::new().provider(provider.boxed()).build();

    let id = engine.submit("hang", "").unwrap();
    wait_until("capability to start", || {
        engine
            .hub()
            .buffer(id)
            .is_some_and(|log| log.contains("started\n"))
    })
    .await;
    assert_eq!(engine.state(id), Some(ProcessState::Running));

    assert_eq!(engine.cancel(id), CancelAck::Cancelled);
    assert_eq!(engine.state(id), Some(ProcessState::Finished(Outcome::Cancelled)));
    assert!(engine.hub().buffer(id).unwrap().contains(">>> CANCELLED COMMAND hang\n"));

    // Second cancel is a no-op.
    assert_eq!(engine.cancel(id), CancelAck::AlreadyFinished);

    // The capability eventually completes on its own; its late output still
    // lands in the buffer but the outcome stays Cancelled.
    gate.notify_one();
    wait_until("late output", || {
        engine
            .hub()
            .buffer(id)
            .is_some_and(|log| log.contains(">>> END COMMAND"))
    })
    .await;
    assert_eq!(engine.state(id), Some(ProcessState::Finished(Outcome::Cancelled)));
}

#[tokio::test]
async fn test_cancel_cooperative_capability() {
    init_tracing();
    let (gated, _gate) = GatedCapability::new(true);
    let provider = StaticProvider::new("base").with("hang", gated);
    let engine = EngineBuilder::new().provider(provider.boxed()).build();

    let mut sub = engine.tail(Selector::All);
    let id = engine.submit("hang", "").unwrap();
    read_until(&mut sub, id, "started\n").await;

    assert_eq!(engine.cancel(id), CancelAck::Cancelled);
    let text = read_until(&mut sub, id, ">>> END COMMAND").await;

    assert!(text.contains(">>> CANCELLED COMMAND hang\n"));
    assert!(!text.contains("released"));
    assert!(!text.contains("ERROR:"));
    assert_eq!(engine.state(id), Some(ProcessState::Finished(Outcome::Cancelled)));
}

#[tokio::test]
async fn test_cancel_unknown_process_is_not_an_error() {
    let engine = deploy_engine();
    assert_eq!(engine.cancel(42), CancelAck::Unknown);
}

#[tokio::test]
async fn test_close_rules() {
    init_tracing();
    let (gated, gate) = GatedCapability::new(false);
    let provider = StaticProvider::new("base").with("hang", gated);
    let engine = EngineBuilder::new().provider(provider.boxed()).build();

    let id = engine.submit("hang", "").unwrap();
    assert!(matches!(
        engine.close(id),
        Err(OpdeckError::ProcessStillRunning(1))
    ));

    gate.notify_one();
    assert_eq!(wait_finished(&engine, id).await, Outcome::Ok);

    engine.close(id).unwrap();
    assert_eq!(engine.state(id), None);
    assert_eq!(engine.hub().buffer(id), None);
    assert!(engine.status().finished.is_empty());

    assert!(matches!(
        engine.close(id),
        Err(OpdeckError::ProcessAlreadyClosed(1))
    ));
    assert!(matches!(
        engine.close(7),
        Err(OpdeckError::UnknownProcess(7))
    ));
    assert_eq!(engine.cancel(id), CancelAck::Unknown);
}

#[tokio::test]
async fn test_ids_are_never_reused_after_close() {
    let engine = deploy_engine();

    let first = engine.submit("deploy", "").unwrap();
    wait_finished(&engine, first).await;
    engine.close(first).unwrap();

    let second = engine.submit("deploy", "").unwrap();
    assert_eq!(second, first + 1);
}

#[tokio::test]
async fn test_history_records_distinct_commands_newest_first() {
    let engine = deploy_engine();

    for line in ["deploy:v1", "echo:x", "deploy:v1"] {
        let id = engine.submit_line(line).unwrap();
        wait_finished(&engine, id).await;
    }

    assert_eq!(
        engine.history(10),
        vec!["deploy:v1".to_string(), "echo:x".to_string()]
    );
}

#[tokio::test]
async fn test_reload_does_not_disturb_running_process() {
    init_tracing();
    let (gated, gate) = GatedCapability::new(false);
    let provider = StaticProvider::new("base").with("hang", gated);
    let engine = EngineBuilder::new().provider(provider.boxed()).build();

    let id = engine.submit("hang", "").unwrap();
    provider.remove("hang");
    engine.reload().await.unwrap();
    assert!(engine.list_names().is_empty());

    gate.notify_one();
    assert_eq!(wait_finished(&engine, id).await, Outcome::Ok);
    assert!(matches!(
        engine.submit("hang", ""),
        Err(OpdeckError::CommandNotFound(_))
    ));
}

#[tokio::test]
async fn test_shutdown_cancels_everything_running() {
    let (gated, _gate) = GatedCapability::new(true);
    let provider = StaticProvider::new("base").with("hang", gated);
    let engine = EngineBuilder::new().provider(provider.boxed()).build();

    let a = engine.submit("hang", "").unwrap();
    let b = engine.submit("hang", "").unwrap();
    engine.shutdown();

    assert!(engine.status().running.is_empty());
    assert_eq!(engine.state(a), Some(ProcessState::Finished(Outcome::Cancelled)));
    assert_eq!(engine.state(b), Some(ProcessState::Finished(Outcome::Cancelled)));
}
