// src/hub/mod.rs

//! Log broadcast hub.
//!
//! The hub owns every process's [`LogBuffer`] and the registry of live
//! viewers. Publication, buffer trimming and subscriber registration all
//! happen under one lock, which gives two guarantees:
//!
//! - per-process events reach each subscriber in publish order;
//! - a new subscriber's replay snapshot and its live stream meet exactly,
//!   with no gap and no duplicate.
//!
//! Delivery never waits on a viewer. Each subscriber has a bounded channel;
//! a subscriber whose channel is full when an event arrives is disconnected
//! (its stream ends) instead of stalling the publisher.

pub mod buffer;

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, warn};

use crate::types::{LogEvent, ProcessId, Selector, SubscriberId};

pub use buffer::LogBuffer;

struct SubscriberEntry {
    selector: Selector,
    tx: mpsc::Sender<LogEvent>,
}

#[derive(Default)]
struct HubState {
    buffers: BTreeMap<ProcessId, LogBuffer>,
    subscribers: HashMap<SubscriberId, SubscriberEntry>,
    next_subscriber: SubscriberId,
}

struct HubInner {
    state: Mutex<HubState>,
    max_log_bytes: usize,
    subscriber_buffer: usize,
}

impl HubInner {
    fn lock(&self) -> MutexGuard<'_, HubState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn remove_subscriber(&self, id: SubscriberId) -> bool {
        let removed = self.lock().subscribers.remove(&id).is_some();
        if removed {
            debug!(subscriber = id, "log viewer unsubscribed");
        }
        removed
    }
}

/// Cloneable handle to the shared hub.
#[derive(Clone)]
pub struct LogHub {
    inner: Arc<HubInner>,
}

impl fmt::Debug for LogHub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogHub")
            .field("max_log_bytes", &self.inner.max_log_bytes)
            .field("subscriber_buffer", &self.inner.subscriber_buffer)
            .finish_non_exhaustive()
    }
}

impl LogHub {
    /// `max_log_bytes` caps each process buffer; `subscriber_buffer` is the
    /// number of undelivered events a viewer may have before it is dropped.
    pub fn new(max_log_bytes: usize, subscriber_buffer: usize) -> Self {
        Self {
            inner: Arc::new(HubInner {
                state: Mutex::new(HubState {
                    next_subscriber: 1,
                    ..HubState::default()
                }),
                max_log_bytes,
                subscriber_buffer: subscriber_buffer.max(1),
            }),
        }
    }

    /// Start buffering output for a process.
    pub fn open(&self, id: ProcessId) {
        let cap = self.inner.max_log_bytes;
        self.inner
            .lock()
            .buffers
            .entry(id)
            .or_insert_with(|| LogBuffer::new(cap));
    }

    /// Drop a process's buffer. Later publishes for it are ignored.
    pub fn discard(&self, id: ProcessId) -> bool {
        self.inner.lock().buffers.remove(&id).is_some()
    }

    /// Append `text` to the process buffer and fan it out.
    ///
    /// Returns `false` (and does nothing) if the process has no open buffer,
    /// e.g. a late write from a cancelled capability after `close`.
    pub fn publish(&self, id: ProcessId, text: &str) -> bool {
        let mut guard = self.inner.lock();
        let state = &mut *guard;

        let Some(buffer) = state.buffers.get_mut(&id) else {
            return false;
        };
        let trimmed = buffer.append(text);
        if trimmed > 0 {
            debug!(process_id = id, trimmed, "log buffer over budget; dropped oldest output");
        }

        let mut disconnected = Vec::new();
        for (sub_id, sub) in state.subscribers.iter() {
            if !sub.selector.matches(id) {
                continue;
            }
            let event = LogEvent {
                process_id: id,
                text: text.to_string(),
            };
            match sub.tx.try_send(event) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    warn!(
                        subscriber = *sub_id,
                        process_id = id,
                        "log viewer is not keeping up; disconnecting it"
                    );
                    disconnected.push(*sub_id);
                }
                Err(TrySendError::Closed(_)) => {
                    disconnected.push(*sub_id);
                }
            }
        }

        for sub_id in disconnected {
            state.subscribers.remove(&sub_id);
        }

        true
    }

    /// Register a viewer.
    ///
    /// The returned subscription yields the buffered output of every
    /// process in scope first (one event per process, ordered by id), then
    /// live events.
    pub fn subscribe(&self, selector: Selector) -> Subscription {
        let (tx, rx) = mpsc::channel(self.inner.subscriber_buffer);

        let mut state = self.inner.lock();
        let id = state.next_subscriber;
        state.next_subscriber += 1;

        let replay: VecDeque<LogEvent> = state
            .buffers
            .iter()
            .filter(|(pid, buf)| selector.matches(**pid) && !buf.is_empty())
            .map(|(pid, buf)| LogEvent {
                process_id: *pid,
                text: buf.as_str().to_string(),
            })
            .collect();

        debug!(subscriber = id, ?selector, replayed = replay.len(), "log viewer subscribed");
        state
            .subscribers
            .insert(id, SubscriberEntry { selector, tx });

        Subscription {
            id,
            replay,
            rx,
            hub: Arc::downgrade(&self.inner),
        }
    }

    /// Deregister a viewer. Returns `false` if it was already gone.
    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        self.inner.remove_subscriber(id)
    }

    /// Current buffered text of a process.
    pub fn buffer(&self, id: ProcessId) -> Option<String> {
        self.inner
            .lock()
            .buffers
            .get(&id)
            .map(|b| b.as_str().to_string())
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.lock().subscribers.len()
    }

    pub fn max_log_bytes(&self) -> usize {
        self.inner.max_log_bytes
    }
}

/// A live viewer's end of the hub.
///
/// Dropping it unsubscribes, so a transport only has to drop the
/// subscription when its client disconnects.
pub struct Subscription {
    id: SubscriberId,
    replay: VecDeque<LogEvent>,
    rx: mpsc::Receiver<LogEvent>,
    hub: Weak<HubInner>,
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("pending_replay", &self.replay.len())
            .finish_non_exhaustive()
    }
}

impl Subscription {
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Next event: replay first, then live.
    ///
    /// Returns `None` once the hub has disconnected this viewer (or was
    /// dropped) and everything already queued has been read.
    pub async fn recv(&mut self) -> Option<LogEvent> {
        if let Some(event) = self.replay.pop_front() {
            return Some(event);
        }
        self.rx.recv().await
    }

    /// Non-blocking variant of [`recv`](Subscription::recv).
    pub fn try_recv(&mut self) -> Option<LogEvent> {
        if let Some(event) = self.replay.pop_front() {
            return Some(event);
        }
        self.rx.try_recv().ok()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(hub) = self.hub.upgrade() {
            hub.remove_subscriber(self.id);
        }
    }
}
