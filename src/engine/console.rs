// src/engine/console.rs

use std::collections::HashMap;
use std::fmt;
use std::fmt::Write as _;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::engine::Engine;
use crate::engine::request::{HELP, OperatorRequest, parse_request};
use crate::hub::Subscription;
use crate::process::{CancelAck, StatusReport};
use crate::types::{Selector, SubscriberId};

/// Line-oriented operator console.
///
/// Reads requests from a line channel (fed from stdin in `serve`), runs them
/// against the [`Engine`] and writes responses to `out`. Each `tail` starts
/// a background viewer task that writes the followed output to the same
/// channel, prefixed with the process id.
pub struct Console {
    engine: Engine,
    out: mpsc::UnboundedSender<String>,
    viewers: HashMap<SubscriberId, JoinHandle<()>>,
}

impl fmt::Debug for Console {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Console")
            .field("viewers", &self.viewers.len())
            .finish_non_exhaustive()
    }
}

impl Console {
    pub fn new(engine: Engine, out: mpsc::UnboundedSender<String>) -> Self {
        Self {
            engine,
            out,
            viewers: HashMap::new(),
        }
    }

    fn say(&self, text: impl Into<String>) {
        // The printer only goes away at shutdown; nothing to do then.
        let _ = self.out.send(text.into());
    }

    /// Process lines until `quit` or until the input side closes.
    pub async fn run(mut self, mut lines: mpsc::UnboundedReceiver<String>) {
        info!("operator console ready");

        while let Some(line) = lines.recv().await {
            debug!(line = %line, "console input");
            let keep_running = match parse_request(&line) {
                Ok(request) => self.handle(request).await,
                Err(e) => {
                    self.say(format!("error: {e}"));
                    true
                }
            };
            if !keep_running {
                break;
            }
        }

        self.stop_viewers();
        info!("operator console closed");
    }

    /// Execute one request. Returns `false` when the console should stop.
    pub async fn handle(&mut self, request: OperatorRequest) -> bool {
        match request {
            OperatorRequest::Nothing => {}
            OperatorRequest::Run { name, param } => match self.engine.submit(&name, &param) {
                Ok(id) => self.say(format!("started process {id}")),
                Err(e) => self.say(format!("error: {e}")),
            },
            OperatorRequest::Cancel(id) => match self.engine.cancel(id) {
                CancelAck::Cancelled => self.say(format!("cancelled process {id}")),
                CancelAck::AlreadyFinished => self.say(format!("process {id} already finished")),
                CancelAck::Unknown => self.say(format!("no process {id}")),
            },
            OperatorRequest::Close(id) => match self.engine.close(id) {
                Ok(()) => self.say(format!("closed process {id}")),
                Err(e) => self.say(format!("error: {e}")),
            },
            OperatorRequest::Tail(selector) => {
                let subscription = self.engine.tail(selector.clone());
                let viewer = subscription.id();
                self.reap_viewers();
                self.viewers
                    .insert(viewer, spawn_viewer(subscription, self.out.clone()));
                self.say(format!("viewer {viewer} following {}", describe(&selector)));
            }
            OperatorRequest::Untail(viewer) => match self.viewers.remove(&viewer) {
                Some(handle) => {
                    handle.abort();
                    self.say(format!("viewer {viewer} stopped"));
                }
                None => self.say(format!("no viewer {viewer}")),
            },
            OperatorRequest::Status => self.say(render_status(&self.engine.status())),
            OperatorRequest::List => {
                let names = self.engine.list_names();
                if names.is_empty() {
                    self.say("no commands loaded");
                } else {
                    self.say(names.into_iter().collect::<Vec<_>>().join("\n"));
                }
            }
            OperatorRequest::History(limit) => {
                let recent = self.engine.history(limit);
                if recent.is_empty() {
                    self.say("no history");
                } else {
                    self.say(recent.join("\n"));
                }
            }
            OperatorRequest::Reload => match self.engine.reload().await {
                Ok(()) => self.say(format!(
                    "reloaded: {} commands",
                    self.engine.registry().len()
                )),
                Err(e) => self.say(format!("error: {e}")),
            },
            OperatorRequest::Help => self.say(HELP),
            OperatorRequest::Quit => return false,
        }
        true
    }

    pub fn viewer_count(&self) -> usize {
        self.viewers.values().filter(|h| !h.is_finished()).count()
    }

    fn reap_viewers(&mut self) {
        self.viewers.retain(|_, handle| !handle.is_finished());
    }

    fn stop_viewers(&mut self) {
        for (_, handle) in self.viewers.drain() {
            handle.abort();
        }
    }
}

impl Drop for Console {
    fn drop(&mut self) {
        self.stop_viewers();
    }
}

fn describe(selector: &Selector) -> String {
    match selector {
        Selector::All => "all processes".to_string(),
        Selector::Processes(ids) => {
            let ids: Vec<String> = ids.iter().map(u64::to_string).collect();
            format!("process {}", ids.join(","))
        }
    }
}

/// Forward a subscription to the console output until it ends.
fn spawn_viewer(mut subscription: Subscription, out: mpsc::UnboundedSender<String>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let viewer = subscription.id();
        while let Some(event) = subscription.recv().await {
            for line in event.text.lines() {
                if out.send(format!("[{}] {line}", event.process_id)).is_err() {
                    return;
                }
            }
        }
        warn!(viewer, "log viewer disconnected");
        let _ = out.send(format!("viewer {viewer} disconnected; tail again to resume"));
    })
}

pub fn render_status(report: &StatusReport) -> String {
    let mut text = String::new();
    let _ = writeln!(text, "running ({}):", report.running.len());
    for p in report.running.iter() {
        let _ = writeln!(text, "  {:>4}  {}", p.id, p.command);
    }
    let _ = write!(text, "finished ({}):", report.finished.len());
    for p in report.finished.iter() {
        let outcome = p
            .outcome
            .as_ref()
            .map(ToString::to_string)
            .unwrap_or_default();
        let _ = write!(text, "\n  {:>4}  {}  [{}]", p.id, p.command, outcome);
    }
    text
}
