// src/process/manager.rs

//! Process lifecycle manager.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, error, info, warn};

use crate::errors::{ExecError, OpdeckError, Result};
use crate::hub::LogHub;
use crate::process::history::AuditLog;
use crate::registry::{CancelHandle, CancelSignal, Capability, CommandRegistry, LogSink};
use crate::types::{ProcessId, Outcome, command_line, split_command_line};

/// Internal handle for a currently-running process.
///
/// `cancel` is taken exactly once, by whichever of `cancel()` or the
/// execution unit's completion removes the entry from `running` first.
struct RunningProcess {
    command: String,
    cancel: Option<CancelHandle>,
}

#[derive(Debug, Clone)]
struct FinishedProcess {
    command: String,
    outcome: Outcome,
}

/// Running/finished membership. A live id is in exactly one of the maps.
#[derive(Default)]
struct ProcessTable {
    last_id: ProcessId,
    running: BTreeMap<ProcessId, RunningProcess>,
    finished: BTreeMap<ProcessId, FinishedProcess>,
}

struct ManagerInner {
    registry: Arc<CommandRegistry>,
    hub: LogHub,
    audit: AuditLog,
    table: Mutex<ProcessTable>,
}

impl ManagerInner {
    fn table(&self) -> MutexGuard<'_, ProcessTable> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Running -> Finished handoff for natural completion.
    ///
    /// A no-op if `cancel` already moved the process.
    fn finish(&self, id: ProcessId, outcome: Outcome) {
        let mut table = self.table();
        match table.running.remove(&id) {
            Some(proc) => {
                info!(process_id = id, command = %proc.command, %outcome, "process finished");
                table.finished.insert(
                    id,
                    FinishedProcess {
                        command: proc.command,
                        outcome,
                    },
                );
            }
            None => {
                debug!(process_id = id, %outcome, "process already finished by cancellation");
            }
        }
    }
}

/// Public view of a process's state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessState {
    Running,
    Finished(Outcome),
}

/// One row of a [`StatusReport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessInfo {
    pub id: ProcessId,
    pub command: String,
    /// `None` while running.
    pub outcome: Option<Outcome>,
}

/// Snapshot of both membership sets, each ordered by id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusReport {
    pub running: Vec<ProcessInfo>,
    pub finished: Vec<ProcessInfo>,
}

impl StatusReport {
    pub fn is_running(&self, id: ProcessId) -> bool {
        self.running.iter().any(|p| p.id == id)
    }

    pub fn finished_entry(&self, id: ProcessId) -> Option<&ProcessInfo> {
        self.finished.iter().find(|p| p.id == id)
    }
}

/// Result of a cancel request. Cancelling never fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelAck {
    /// The process was running and is now finished as `Cancelled`.
    Cancelled,
    /// The process had already finished; nothing changed.
    AlreadyFinished,
    /// No such process (never allocated, or closed).
    Unknown,
}

/// Turns registry lookups into running, cancellable, trackable processes.
///
/// Cheap to clone; all clones share the same process table.
#[derive(Clone)]
pub struct ProcessManager {
    inner: Arc<ManagerInner>,
}

impl fmt::Debug for ProcessManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let table = self.inner.table();
        f.debug_struct("ProcessManager")
            .field("last_id", &table.last_id)
            .field("running", &table.running.len())
            .field("finished", &table.finished.len())
            .finish_non_exhaustive()
    }
}

impl ProcessManager {
    pub fn new(registry: Arc<CommandRegistry>, hub: LogHub, audit: AuditLog) -> Self {
        Self {
            inner: Arc::new(ManagerInner {
                registry,
                hub,
                audit,
                table: Mutex::new(ProcessTable::default()),
            }),
        }
    }

    /// Launch `name` with `param`.
    ///
    /// The name is resolved before an id is allocated, so an unknown command
    /// allocates nothing. On success the process is already in the running
    /// set when this returns; the command itself runs on its own task.
    pub fn submit(&self, name: &str, param: &str) -> Result<ProcessId> {
        let capability = self.inner.registry.get(name).inspect_err(|_| {
            warn!(command = %name, "submit rejected: unknown command");
        })?;
        let command = command_line(name, param);
        let (cancel_handle, cancel_signal) = CancelSignal::pair();

        let id = {
            let mut table = self.inner.table();
            table.last_id += 1;
            let id = table.last_id;
            self.inner.hub.open(id);
            table.running.insert(
                id,
                RunningProcess {
                    command: command.clone(),
                    cancel: Some(cancel_handle),
                },
            );
            id
        };

        self.inner.audit.record(&command);
        info!(process_id = id, command = %command, "process started");

        let inner = Arc::clone(&self.inner);
        let param = param.to_string();
        tokio::spawn(run_process(inner, id, command, capability, param, cancel_signal));

        Ok(id)
    }

    /// Launch from an operator command line such as `deploy:v1`.
    pub fn submit_line(&self, line: &str) -> Result<ProcessId> {
        let (name, param) = split_command_line(line);
        self.submit(name, param)
    }

    /// Request cancellation.
    ///
    /// A running process is moved to finished (`Cancelled`) immediately and
    /// its signal is fired; whether the capability actually stops is up to
    /// the capability.
    pub fn cancel(&self, id: ProcessId) -> CancelAck {
        let (command, handle) = {
            let mut table = self.inner.table();
            match table.running.remove(&id) {
                Some(mut proc) => {
                    let handle = proc.cancel.take();
                    table.finished.insert(
                        id,
                        FinishedProcess {
                            command: proc.command.clone(),
                            outcome: Outcome::Cancelled,
                        },
                    );
                    (proc.command, handle)
                }
                None if table.finished.contains_key(&id) => {
                    debug!(process_id = id, "cancel ignored: process already finished");
                    return CancelAck::AlreadyFinished;
                }
                None => {
                    debug!(process_id = id, "cancel ignored: unknown process");
                    return CancelAck::Unknown;
                }
            }
        };

        let delivered = handle.map(CancelHandle::fire).unwrap_or(false);
        info!(process_id = id, command = %command, delivered, "process cancelled");
        self.inner
            .hub
            .publish(id, &format!(">>> CANCELLED COMMAND {command}\n"));

        CancelAck::Cancelled
    }

    /// Discard a finished process's log and command text.
    pub fn close(&self, id: ProcessId) -> Result<()> {
        {
            let mut table = self.inner.table();
            if table.running.contains_key(&id) {
                return Err(OpdeckError::ProcessStillRunning(id));
            }
            if table.finished.remove(&id).is_none() {
                return if id >= 1 && id <= table.last_id {
                    Err(OpdeckError::ProcessAlreadyClosed(id))
                } else {
                    Err(OpdeckError::UnknownProcess(id))
                };
            }
        }

        self.inner.hub.discard(id);
        debug!(process_id = id, "process closed; log discarded");
        Ok(())
    }

    pub fn state(&self, id: ProcessId) -> Option<ProcessState> {
        let table = self.inner.table();
        if table.running.contains_key(&id) {
            return Some(ProcessState::Running);
        }
        table
            .finished
            .get(&id)
            .map(|f| ProcessState::Finished(f.outcome.clone()))
    }

    pub fn status(&self) -> StatusReport {
        let table = self.inner.table();
        StatusReport {
            running: table
                .running
                .iter()
                .map(|(id, p)| ProcessInfo {
                    id: *id,
                    command: p.command.clone(),
                    outcome: None,
                })
                .collect(),
            finished: table
                .finished
                .iter()
                .map(|(id, p)| ProcessInfo {
                    id: *id,
                    command: p.command.clone(),
                    outcome: Some(p.outcome.clone()),
                })
                .collect(),
        }
    }

    /// Ids currently running, ascending.
    pub fn running_ids(&self) -> Vec<ProcessId> {
        self.inner.table().running.keys().copied().collect()
    }

    /// Cancel everything still running (used on shutdown).
    pub fn cancel_all(&self) -> usize {
        self.running_ids()
            .into_iter()
            .filter(|id| self.cancel(*id) == CancelAck::Cancelled)
            .count()
    }

    /// Most recent distinct submitted commands, newest first.
    pub fn history(&self, limit: usize) -> Vec<String> {
        self.inner.audit.recent(limit)
    }

    pub fn hub(&self) -> &LogHub {
        &self.inner.hub
    }
}

/// Execution unit of one process.
///
/// The capability runs on its own task so that a panic inside it becomes
/// an `Error` outcome instead of tearing down this unit.
async fn run_process(
    inner: Arc<ManagerInner>,
    id: ProcessId,
    command: String,
    capability: Arc<dyn Capability>,
    param: String,
    cancel: CancelSignal,
) {
    let hub = inner.hub.clone();
    hub.publish(id, &format!(">>> RUNNING COMMAND {command}\n"));

    let sink = {
        let hub = hub.clone();
        LogSink::new(move |chunk| {
            hub.publish(id, chunk);
        })
    };

    let joined =
        tokio::spawn(async move { capability.execute(sink, param, cancel).await }).await;
    let result = match joined {
        Ok(result) => result,
        Err(join_err) => {
            error!(process_id = id, error = %join_err, "capability task aborted");
            Err(ExecError::failed(format!("capability aborted: {join_err}")))
        }
    };

    hub.publish(id, &format!(">>> END COMMAND command {command}\n"));

    let outcome = match result {
        Ok(()) => Outcome::Ok,
        Err(ExecError::Cancelled) => Outcome::Cancelled,
        Err(ExecError::Failed(msg)) => {
            hub.publish(id, &format!("ERROR: {msg}\n"));
            Outcome::Error(msg)
        }
    };

    inner.finish(id, outcome);
}
