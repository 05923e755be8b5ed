// src/watch/mod.rs

//! Registry reload triggers.
//!
//! This module is responsible for:
//! - Compiling the `[watch]` include / exclude globs.
//! - Wiring up a cross-platform filesystem watcher (`notify`).
//! - Debouncing change bursts into single reloads, optionally skipping
//!   reloads when the watched content hashes to the same value.
//! - The periodic reload timer.
//!
//! It knows nothing about processes; its only output is calls to
//! `CommandRegistry::reload`.

pub mod debounce;
pub mod hash;
pub mod patterns;
pub mod watcher;

pub use debounce::{MAX_WAIT_WINDOWS, ReloadDebouncer, reload_blocking, spawn_reload_timer};
pub use hash::{Fingerprinter, compute_file_hash};
pub use patterns::{WatchFilter, collect_matching_files};
pub use watcher::{WatcherHandle, spawn_config_watcher};
