// src/registry/capability.rs

//! The executable unit a registry entry resolves to, and the two handles a
//! capability is given when it runs: a log sink and a cancel signal.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::oneshot;

use crate::errors::ExecError;

/// Boxed future returned by [`Capability::execute`].
pub type CapabilityFuture<'a> = Pin<Box<dyn Future<Output = Result<(), ExecError>> + Send + 'a>>;

/// A named, executable command produced by a formula provider.
///
/// Implementations are stateless from the registry's point of view; each
/// provider family (shell formulas, containers, HTTP checks, ...) implements
/// this once and the registry stores them as trait objects.
pub trait Capability: Send + Sync {
    /// Run the command.
    ///
    /// - `sink` receives output chunks in call order.
    /// - `param` is the raw parameter the operator typed after `name:`.
    /// - `cancel` fires when the operator cancels the process. Honouring it
    ///   is best-effort; the manager does not wait for the capability to
    ///   stop.
    fn execute(&self, sink: LogSink, param: String, cancel: CancelSignal) -> CapabilityFuture<'_>;
}

/// Chunk consumer handed to a running capability.
#[derive(Clone)]
pub struct LogSink {
    write: Arc<dyn Fn(&str) + Send + Sync>,
}

impl LogSink {
    pub fn new<F>(write: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        Self {
            write: Arc::new(write),
        }
    }

    pub fn write(&self, chunk: &str) {
        (self.write)(chunk);
    }

    /// Write `line` followed by a newline.
    pub fn line(&self, line: &str) {
        let mut chunk = String::with_capacity(line.len() + 1);
        chunk.push_str(line);
        chunk.push('\n');
        self.write(&chunk);
    }
}

impl fmt::Debug for LogSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogSink").finish_non_exhaustive()
    }
}

/// Sending half of a one-shot cancel signal, held by the process manager.
#[derive(Debug)]
pub struct CancelHandle {
    tx: oneshot::Sender<()>,
}

impl CancelHandle {
    /// Fire the signal. Returns `false` if the capability side is already
    /// gone (it finished, or dropped its signal).
    pub fn fire(self) -> bool {
        self.tx.send(()).is_ok()
    }
}

/// Receiving half of a one-shot cancel signal.
#[derive(Debug)]
pub struct CancelSignal {
    rx: Option<oneshot::Receiver<()>>,
    fired: bool,
}

impl CancelSignal {
    /// Create a connected handle/signal pair.
    pub fn pair() -> (CancelHandle, CancelSignal) {
        let (tx, rx) = oneshot::channel();
        (
            CancelHandle { tx },
            CancelSignal {
                rx: Some(rx),
                fired: false,
            },
        )
    }

    /// A signal that never fires.
    pub fn never() -> Self {
        CancelSignal {
            rx: None,
            fired: false,
        }
    }

    /// Resolve once cancellation was requested.
    ///
    /// If the handle is dropped without firing, this never resolves: the
    /// owner lost interest in cancelling, which is not a cancellation.
    pub async fn cancelled(&mut self) {
        if self.fired {
            return;
        }
        match self.rx.as_mut() {
            Some(rx) => match rx.await {
                Ok(()) => self.fired = true,
                Err(_) => {
                    self.rx = None;
                    std::future::pending::<()>().await;
                }
            },
            None => std::future::pending::<()>().await,
        }
    }

    /// Non-blocking check, for capabilities that poll between steps.
    pub fn is_cancelled(&mut self) -> bool {
        if self.fired {
            return true;
        }
        if let Some(rx) = self.rx.as_mut() {
            match rx.try_recv() {
                Ok(()) => self.fired = true,
                Err(oneshot::error::TryRecvError::Closed) => self.rx = None,
                Err(oneshot::error::TryRecvError::Empty) => {}
            }
        }
        self.fired
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn sink_forwards_chunks_in_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = {
            let seen = Arc::clone(&seen);
            LogSink::new(move |chunk| seen.lock().unwrap().push(chunk.to_string()))
        };

        sink.write("a");
        sink.line("b");

        assert_eq!(*seen.lock().unwrap(), vec!["a".to_string(), "b\n".to_string()]);
    }

    #[tokio::test]
    async fn fired_signal_is_observed() {
        let (handle, mut signal) = CancelSignal::pair();
        assert!(!signal.is_cancelled());
        assert!(handle.fire());
        signal.cancelled().await;
        assert!(signal.is_cancelled());
    }

    #[tokio::test]
    async fn dropped_handle_is_not_a_cancellation() {
        let (handle, mut signal) = CancelSignal::pair();
        drop(handle);
        assert!(!signal.is_cancelled());

        let waited =
            tokio::time::timeout(std::time::Duration::from_millis(20), signal.cancelled()).await;
        assert!(waited.is_err());
    }
}
