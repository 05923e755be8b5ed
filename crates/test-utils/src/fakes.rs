//! Scripted capabilities and providers.

use std::sync::{Arc, Mutex};

use anyhow::anyhow;
use tokio::sync::Notify;

use opdeck::errors::ExecError;
use opdeck::registry::{
    CancelSignal, Capability, CapabilityFuture, CommandSet, FormulaProvider, LogSink,
};

/// Writes fixed chunks, then succeeds or fails.
///
/// The literal `{param}` in a chunk is replaced by the submitted parameter.
pub struct ScriptedCapability {
    chunks: Vec<String>,
    failure: Option<String>,
}

impl ScriptedCapability {
    pub fn ok<I, S>(chunks: I) -> Arc<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Arc::new(Self {
            chunks: chunks.into_iter().map(Into::into).collect(),
            failure: None,
        })
    }

    pub fn failing<I, S>(chunks: I, message: &str) -> Arc<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Arc::new(Self {
            chunks: chunks.into_iter().map(Into::into).collect(),
            failure: Some(message.to_string()),
        })
    }
}

impl Capability for ScriptedCapability {
    fn execute(&self, sink: LogSink, param: String, _cancel: CancelSignal) -> CapabilityFuture<'_> {
        Box::pin(async move {
            for chunk in self.chunks.iter() {
                sink.write(&chunk.replace("{param}", &param));
            }
            match &self.failure {
                Some(msg) => Err(ExecError::failed(msg.clone())),
                None => Ok(()),
            }
        })
    }
}

/// Blocks until released, optionally honouring cancellation.
///
/// Writes `started\n` first, so tests can wait for the process to be
/// actually running before poking it.
pub struct GatedCapability {
    gate: Arc<Notify>,
    honour_cancel: bool,
}

impl GatedCapability {
    /// Returns the capability and the gate that releases it.
    pub fn new(honour_cancel: bool) -> (Arc<Self>, Arc<Notify>) {
        let gate = Arc::new(Notify::new());
        (
            Arc::new(Self {
                gate: Arc::clone(&gate),
                honour_cancel,
            }),
            gate,
        )
    }
}

impl Capability for GatedCapability {
    fn execute(&self, sink: LogSink, _param: String, mut cancel: CancelSignal) -> CapabilityFuture<'_> {
        Box::pin(async move {
            sink.write("started\n");
            if self.honour_cancel {
                tokio::select! {
                    _ = self.gate.notified() => {}
                    _ = cancel.cancelled() => return Err(ExecError::Cancelled),
                }
            } else {
                self.gate.notified().await;
            }
            sink.write("released\n");
            Ok(())
        })
    }
}

/// Panics when executed.
pub struct PanickingCapability;

impl Capability for PanickingCapability {
    #[allow(unreachable_code)]
    fn execute(&self, _sink: LogSink, _param: String, _cancel: CancelSignal) -> CapabilityFuture<'_> {
        Box::pin(async move {
            panic!("capability exploded");
            Ok::<(), ExecError>(())
        })
    }
}

/// Provider serving an in-memory command list that tests can swap between
/// reloads, optionally failing on demand.
#[derive(Clone)]
pub struct StaticProvider {
    name: String,
    commands: Arc<Mutex<CommandSet>>,
    fail_with: Arc<Mutex<Option<String>>>,
}

impl StaticProvider {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            commands: Arc::new(Mutex::new(Vec::new())),
            fail_with: Arc::new(Mutex::new(None)),
        }
    }

    pub fn with(self, command: &str, capability: Arc<dyn Capability>) -> Self {
        self.set(command, capability);
        self
    }

    /// Add or replace a command for the next reload.
    pub fn set(&self, command: &str, capability: Arc<dyn Capability>) {
        let mut commands = self.commands.lock().unwrap();
        commands.retain(|(name, _)| name != command);
        commands.push((command.to_string(), capability));
    }

    pub fn remove(&self, command: &str) {
        self.commands.lock().unwrap().retain(|(name, _)| name != command);
    }

    /// Make subsequent reloads fail (`Some`) or succeed again (`None`).
    pub fn fail_with(&self, message: Option<&str>) {
        *self.fail_with.lock().unwrap() = message.map(str::to_string);
    }

    pub fn boxed(&self) -> Box<dyn FormulaProvider> {
        Box::new(self.clone())
    }
}

impl FormulaProvider for StaticProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn provide(&self) -> anyhow::Result<CommandSet> {
        if let Some(msg) = self.fail_with.lock().unwrap().as_ref() {
            return Err(anyhow!("{msg}"));
        }
        Ok(self.commands.lock().unwrap().clone())
    }
}
