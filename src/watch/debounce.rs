// src/watch/debounce.rs

//! Turning change notifications into registry reloads.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::registry::CommandRegistry;
use crate::watch::hash::Fingerprinter;

/// Upper bound on one burst, in windows, so a steady trickle of changes
/// cannot postpone the reload forever.
pub const MAX_WAIT_WINDOWS: u32 = 4;

/// Collapses bursts of change notifications into single reloads.
///
/// A burst starts with the first notification and ends once `window` passes
/// without another one, or [`MAX_WAIT_WINDOWS`] windows after it started;
/// each burst causes at most one reload.
#[derive(Debug)]
pub struct ReloadDebouncer {
    registry: Arc<CommandRegistry>,
    window: Duration,
    fingerprinter: Option<Fingerprinter>,
    last_fingerprint: Option<String>,
}

impl ReloadDebouncer {
    pub fn new(registry: Arc<CommandRegistry>, window: Duration) -> Self {
        Self {
            registry,
            window,
            fingerprinter: None,
            last_fingerprint: None,
        }
    }

    /// Skip reloads whose watched content hashes to the last loaded value.
    ///
    /// `loaded` is the fingerprint of what the registry currently holds, if
    /// known.
    pub fn with_fingerprint(mut self, fingerprinter: Fingerprinter, loaded: Option<String>) -> Self {
        self.fingerprinter = Some(fingerprinter);
        self.last_fingerprint = loaded;
        self
    }

    /// Consume notifications until the sender side is gone.
    ///
    /// Returns the number of reloads attempted. A burst still pending when
    /// the channel closes is flushed before returning.
    pub async fn run(mut self, mut changes: mpsc::UnboundedReceiver<PathBuf>) -> u64 {
        let mut reloads = 0;

        while let Some(first) = changes.recv().await {
            debug!(path = ?first, "config change detected; debouncing");
            let mut burst = 1usize;
            let mut closed = false;
            let deadline = Instant::now() + self.window * MAX_WAIT_WINDOWS;

            loop {
                tokio::select! {
                    next = changes.recv() => match next {
                        Some(path) => {
                            debug!(path = ?path, "config change detected; debouncing");
                            burst += 1;
                        }
                        None => {
                            closed = true;
                            break;
                        }
                    },
                    _ = tokio::time::sleep(self.window) => break,
                    _ = tokio::time::sleep_until(deadline) => {
                        debug!(changes = burst, "debounce burst hit its maximum wait");
                        break;
                    }
                }
            }

            if self.reload_after_burst(burst).await {
                reloads += 1;
            }
            if closed {
                break;
            }
        }

        debug!(reloads, "config change debouncer finished");
        reloads
    }

    async fn reload_after_burst(&mut self, burst: usize) -> bool {
        let fingerprint = match &self.fingerprinter {
            Some(fp) => {
                let fp = fp.clone();
                match tokio::task::spawn_blocking(move || fp.compute()).await {
                    Ok(Ok(hash)) => Some(hash),
                    Ok(Err(e)) => {
                        warn!(error = %format!("{e:#}"), "fingerprinting watched files failed; reloading anyway");
                        None
                    }
                    Err(e) => {
                        warn!(error = %e, "fingerprint task failed; reloading anyway");
                        None
                    }
                }
            }
            None => None,
        };

        if fingerprint.is_some() && fingerprint == self.last_fingerprint {
            info!(changes = burst, "watched files unchanged by content; skipping reload");
            return false;
        }

        info!(changes = burst, "reloading command registry after config change");
        if reload_blocking(Arc::clone(&self.registry)).await && fingerprint.is_some() {
            self.last_fingerprint = fingerprint;
        }
        true
    }
}

/// Run a reload off the async workers. Providers read files synchronously.
///
/// Returns whether the reload succeeded; failures are logged here.
pub async fn reload_blocking(registry: Arc<CommandRegistry>) -> bool {
    match tokio::task::spawn_blocking(move || registry.reload()).await {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            warn!(error = %e, "registry reload failed; previous commands stay active");
            false
        }
        Err(e) => {
            warn!(error = %e, "registry reload task failed");
            false
        }
    }
}

/// Reload the registry every `interval`. Failures are logged and the timer
/// keeps going.
pub fn spawn_reload_timer(registry: Arc<CommandRegistry>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately; startup already loaded.
        ticker.tick().await;

        loop {
            ticker.tick().await;
            debug!("periodic registry reload");
            reload_blocking(Arc::clone(&registry)).await;
        }
    })
}
