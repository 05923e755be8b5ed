// src/engine/mod.rs

//! Operator-facing engine.
//!
//! [`Engine`] bundles the command registry, the log hub and the process
//! manager behind the operations an operator surface needs. Transports sit
//! on top of it:
//!
//! - [`request`] is the pure line parser (no IO, unit tested in place);
//! - [`console`] is the async shell that reads operator lines, calls the
//!   engine and prints results and tailed output.

pub mod console;
pub mod request;

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use tracing::info;

use crate::errors::{OpdeckError, Result};
use crate::hub::{LogHub, Subscription};
use crate::process::{AuditLog, CancelAck, ProcessManager, ProcessState, StatusReport};
use crate::registry::CommandRegistry;
use crate::types::{ProcessId, Selector};

pub use console::Console;
pub use request::{OperatorRequest, parse_request};

/// Cheap to clone; clones share all state.
#[derive(Clone)]
pub struct Engine {
    registry: Arc<CommandRegistry>,
    hub: LogHub,
    processes: ProcessManager,
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("registry", &self.registry)
            .field("processes", &self.processes)
            .finish_non_exhaustive()
    }
}

impl Engine {
    pub fn new(registry: Arc<CommandRegistry>, hub: LogHub, audit: AuditLog) -> Self {
        let processes = ProcessManager::new(Arc::clone(&registry), hub.clone(), audit);
        Self {
            registry,
            hub,
            processes,
        }
    }

    pub fn registry(&self) -> &Arc<CommandRegistry> {
        &self.registry
    }

    pub fn hub(&self) -> &LogHub {
        &self.hub
    }

    pub fn processes(&self) -> &ProcessManager {
        &self.processes
    }

    pub fn submit(&self, name: &str, param: &str) -> Result<ProcessId> {
        self.processes.submit(name, param)
    }

    /// Submit `name` or `name:param`.
    pub fn submit_line(&self, line: &str) -> Result<ProcessId> {
        self.processes.submit_line(line)
    }

    pub fn cancel(&self, id: ProcessId) -> CancelAck {
        self.processes.cancel(id)
    }

    pub fn close(&self, id: ProcessId) -> Result<()> {
        self.processes.close(id)
    }

    /// Live view of the selected processes: buffered output first, then
    /// everything published afterwards.
    pub fn tail(&self, selector: Selector) -> Subscription {
        self.hub.subscribe(selector)
    }

    pub fn status(&self) -> StatusReport {
        self.processes.status()
    }

    pub fn state(&self, id: ProcessId) -> Option<ProcessState> {
        self.processes.state(id)
    }

    pub fn list_names(&self) -> BTreeSet<String> {
        self.registry.names()
    }

    /// Manual registry reload. Runs the providers on the blocking pool.
    pub async fn reload(&self) -> Result<()> {
        let registry = Arc::clone(&self.registry);
        tokio::task::spawn_blocking(move || registry.reload())
            .await
            .map_err(|e| OpdeckError::Other(anyhow::anyhow!("reload task failed: {e}")))?
    }

    pub fn history(&self, limit: usize) -> Vec<String> {
        self.processes.history(limit)
    }

    /// Cancel everything still running.
    pub fn shutdown(&self) {
        let cancelled = self.processes.cancel_all();
        info!(cancelled, "engine shut down");
    }
}
