// src/exec/mod.rs

//! Process execution layer.
//!
//! Shell formula steps and shell jobs both run scripts with
//! `tokio::process::Command`; [`shell`] holds that shared piece: spawning,
//! line streaming into a [`LogSink`](crate::registry::LogSink), exit-code
//! mapping and kill-on-cancel.

pub mod shell;

pub use shell::ShellCommand;
