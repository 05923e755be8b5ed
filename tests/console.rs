mod common;
use crate::common::builders::EngineBuilder;
use crate::common::fakes::{GatedCapability, ScriptedCapability, StaticProvider};
use crate::common::{init_tracing, with_timeout};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use opdeck::engine::Console;

struct Session {
    input: mpsc::UnboundedSender<String>,
    output: mpsc::UnboundedReceiver<String>,
    console: JoinHandle<()>,
}

impl Session {
    fn start(provider: &StaticProvider) -> Self {
        let engine = EngineBuilder::new().provider(provider.boxed()).build();
        let (out_tx, output) = mpsc::unbounded_channel();
        let (input, lines) = mpsc::unbounded_channel();
        let console = tokio::spawn(Console::new(engine, out_tx).run(lines));
        Self {
            input,
            output,
            console,
        }
    }

    fn send(&self, line: &str) {
        self.input.send(line.to_string()).unwrap();
    }

    /// Read console output until a message contains `needle`; returns it.
    async fn expect(&mut self, needle: &str) -> String {
        with_timeout(async {
            loop {
                let msg = self.output.recv().await.expect("console output closed");
                if msg.contains(needle) {
                    return msg;
                }
            }
        })
        .await
    }
}

#[tokio::test]
async fn test_run_tail_status_close_session() {
    init_tracing();
    let provider = StaticProvider::new("base").with("deploy", ScriptedCapability::ok(["ok\n"]));
    let mut session = Session::start(&provider);

    session.send("tail 1");
    session.expect("viewer 1 following process 1").await;

    session.send("run deploy:v1");
    session.expect("started process 1").await;
    session.expect("[1] >>> RUNNING COMMAND deploy:v1").await;
    session.expect("[1] ok").await;
    session.expect("[1] >>> END COMMAND command deploy:v1").await;

    session.send("status");
    let status = session.expect("finished (1):").await;
    assert!(status.starts_with("running (0):"));
    assert!(status.contains("deploy:v1  [ok]"));

    session.send("close 1");
    session.expect("closed process 1").await;
    session.send("close 1");
    session.expect("was already closed").await;

    session.send("history");
    assert_eq!(session.expect("deploy").await, "deploy:v1");

    session.send("quit");
    with_timeout(session.console).await.unwrap();
}

#[tokio::test]
async fn test_errors_are_reported_and_console_keeps_going() {
    init_tracing();
    let provider = StaticProvider::new("base").with("deploy", ScriptedCapability::ok(["ok\n"]));
    let mut session = Session::start(&provider);

    session.send("run nope");
    session.expect("error: Command not found: nope").await;

    session.send("frobnicate");
    session.expect("unknown command 'frobnicate'").await;

    session.send("cancel x");
    session.expect("usage: cancel <id>").await;

    session.send("cancel 9");
    session.expect("no process 9").await;

    session.send("untail 4");
    session.expect("no viewer 4").await;

    session.send("list");
    assert_eq!(session.expect("deploy").await, "deploy");

    // Closing the input ends the console like `quit` does.
    drop(session.input);
    with_timeout(session.console).await.unwrap();
}

#[tokio::test]
async fn test_cancel_and_reload_from_console() {
    init_tracing();
    let (gated, _gate) = GatedCapability::new(true);
    let provider = StaticProvider::new("base").with("hang", gated);
    let mut session = Session::start(&provider);

    session.send("run hang");
    session.expect("started process 1").await;
    session.send("close 1");
    session.expect("still running").await;

    session.send("cancel 1");
    session.expect("cancelled process 1").await;
    session.send("cancel 1");
    session.expect("process 1 already finished").await;

    provider.set("deploy", ScriptedCapability::ok(["ok\n"]));
    session.send("reload");
    session.expect("reloaded: 2 commands").await;

    provider.fail_with(Some("bad formula"));
    session.send("reload");
    session.expect("bad formula").await;

    session.send("exit");
    with_timeout(session.console).await.unwrap();
}
