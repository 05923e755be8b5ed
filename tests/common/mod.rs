#![allow(dead_code)]

pub use opdeck_test_utils::{builders, fakes, init_tracing, wait_until, with_timeout};

use opdeck::engine::Engine;
use opdeck::hub::Subscription;
use opdeck::process::ProcessState;
use opdeck::types::{Outcome, ProcessId};

/// Wait until `id` has finished and return its outcome.
pub async fn wait_finished(engine: &Engine, id: ProcessId) -> Outcome {
    wait_until(&format!("process {id} to finish"), || {
        matches!(engine.state(id), Some(ProcessState::Finished(_)))
    })
    .await;
    match engine.state(id) {
        Some(ProcessState::Finished(outcome)) => outcome,
        other => panic!("process {id} in unexpected state {other:?}"),
    }
}

/// Read events until the accumulated text of process `id` contains `needle`.
pub async fn read_until(sub: &mut Subscription, id: ProcessId, needle: &str) -> String {
    let mut text = String::new();
    with_timeout(async {
        while !text.contains(needle) {
            let event = sub.recv().await.expect("subscription ended early");
            if event.process_id == id {
                text.push_str(&event.text);
            }
        }
    })
    .await;
    text
}
