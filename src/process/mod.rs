// src/process/mod.rs

//! Process lifecycle: submit, run, cancel, close.
//!
//! - [`manager`] owns the running/finished membership sets and spawns one
//!   execution unit per submitted process.
//! - [`history`] is the append-only audit record of submitted commands.

pub mod history;
pub mod manager;

pub use history::AuditLog;
pub use manager::{CancelAck, ProcessInfo, ProcessManager, ProcessState, StatusReport};
