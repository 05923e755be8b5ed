// src/watch/watcher.rs

use std::path::PathBuf;

use anyhow::{Context, Result};
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::watch::debounce::ReloadDebouncer;
use crate::watch::patterns::WatchFilter;

/// Keeps the underlying `RecommendedWatcher` alive. Dropping it stops
/// watching; the forwarding and debounce tasks then wind down on their own.
pub struct WatcherHandle {
    _inner: RecommendedWatcher,
}

impl std::fmt::Debug for WatcherHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatcherHandle").finish()
    }
}

/// Watch `roots` recursively and reload the registry (through `debouncer`)
/// whenever a path accepted by `filter` changes.
pub fn spawn_config_watcher(
    roots: &[PathBuf],
    filter: WatchFilter,
    debouncer: ReloadDebouncer,
) -> Result<WatcherHandle> {
    // Channel from the blocking notify callback into the async world.
    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<Event>();

    let mut watcher = RecommendedWatcher::new(
        move |res: notify::Result<Event>| match res {
            Ok(event) => {
                if event_tx.send(event).is_err() {
                    debug!("watch event dropped: forwarder gone");
                }
            }
            Err(err) => warn!(error = %err, "file watch error"),
        },
        Config::default(),
    )?;

    for root in roots {
        watcher
            .watch(root, RecursiveMode::Recursive)
            .with_context(|| format!("watching {:?}", root))?;
        info!(root = ?root, "config watcher started");
    }

    let (change_tx, change_rx) = mpsc::unbounded_channel::<PathBuf>();

    tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            if matches!(event.kind, EventKind::Access(_)) {
                continue;
            }
            for path in event.paths {
                if filter.matches(&path) {
                    if change_tx.send(path).is_err() {
                        return;
                    }
                } else {
                    debug!(path = ?path, "ignoring change outside watch patterns");
                }
            }
        }
        debug!("watch event forwarder finished");
    });

    tokio::spawn(debouncer.run(change_rx));

    Ok(WatcherHandle { _inner: watcher })
}
