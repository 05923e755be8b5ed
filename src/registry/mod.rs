// src/registry/mod.rs

//! Hot-reloadable command registry.
//!
//! The registry holds an immutable snapshot mapping command names to
//! [`Capability`] trait objects. A reload asks every [`FormulaProvider`] for
//! its commands, in order, and builds a brand new snapshot; only when every
//! provider succeeds is the new snapshot swapped in. Readers clone the
//! current `Arc<Snapshot>` and never observe a mix of old and new entries.

pub mod capability;
pub mod provider;

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use tracing::{debug, info, warn};

use crate::errors::{OpdeckError, Result};

pub use capability::{CancelHandle, CancelSignal, Capability, CapabilityFuture, LogSink};
pub use provider::{CommandSet, FormulaProvider};

/// One immutable generation of the name -> capability mapping.
#[derive(Default)]
pub struct Snapshot {
    commands: HashMap<String, Arc<dyn Capability>>,
}

impl Snapshot {
    pub fn get(&self, name: &str) -> Option<Arc<dyn Capability>> {
        self.commands.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.commands.contains_key(name)
    }

    pub fn names(&self) -> BTreeSet<String> {
        self.commands.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

impl fmt::Debug for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Snapshot")
            .field("commands", &self.commands.len())
            .finish()
    }
}

/// Owner of the current command snapshot and of the providers that build it.
pub struct CommandRegistry {
    providers: Vec<Box<dyn FormulaProvider>>,
    current: RwLock<Arc<Snapshot>>,
    /// Serialises reloads so two rebuilds never race to publish.
    reload_lock: Mutex<()>,
    generation: AtomicU64,
}

impl fmt::Debug for CommandRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let providers: Vec<&str> = self.providers.iter().map(|p| p.name()).collect();
        f.debug_struct("CommandRegistry")
            .field("providers", &providers)
            .field("generation", &self.generation())
            .finish_non_exhaustive()
    }
}

impl CommandRegistry {
    /// Create a registry with an empty snapshot. Call [`reload`] to
    /// populate it.
    ///
    /// [`reload`]: CommandRegistry::reload
    pub fn new(providers: Vec<Box<dyn FormulaProvider>>) -> Self {
        Self {
            providers,
            current: RwLock::new(Arc::new(Snapshot::default())),
            reload_lock: Mutex::new(()),
            generation: AtomicU64::new(0),
        }
    }

    /// Rebuild the mapping from all providers.
    ///
    /// Providers run in their configured order and later providers win on
    /// duplicate names. The first provider error aborts the reload and the
    /// previous snapshot stays authoritative.
    pub fn reload(&self) -> Result<()> {
        let _serialised = self
            .reload_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let mut commands: HashMap<String, Arc<dyn Capability>> = HashMap::new();

        for provider in self.providers.iter() {
            let set = provider.provide().map_err(|e| {
                warn!(provider = provider.name(), error = %e, "provider failed; keeping previous command set");
                OpdeckError::Reload {
                    provider: provider.name().to_string(),
                    message: format!("{e:#}"),
                }
            })?;

            debug!(provider = provider.name(), commands = set.len(), "provider loaded");

            for (name, capability) in set {
                if commands.insert(name.clone(), capability).is_some() {
                    debug!(
                        provider = provider.name(),
                        command = %name,
                        "command redefined by later provider"
                    );
                }
            }
        }

        let snapshot = Arc::new(Snapshot { commands });
        let count = snapshot.len();
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = snapshot;
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;

        info!(commands = count, generation, "command registry reloaded");
        Ok(())
    }

    /// The snapshot currently being served.
    pub fn snapshot(&self) -> Arc<Snapshot> {
        let current = self.current.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&*current)
    }

    /// Resolve a command name.
    pub fn get(&self, name: &str) -> Result<Arc<dyn Capability>> {
        self.snapshot()
            .get(name)
            .ok_or_else(|| OpdeckError::CommandNotFound(name.to_string()))
    }

    pub fn names(&self) -> BTreeSet<String> {
        self.snapshot().names()
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot().is_empty()
    }

    /// Number of successful reloads so far.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }
}
