// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

/// Command-line arguments for `opdeck`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "opdeck",
    version,
    about = "Operator console: launch, follow and cancel operational commands.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    ///
    /// Default: `Opdeck.toml` in the current working directory.
    #[arg(long, value_name = "PATH", default_value = "Opdeck.toml")]
    pub config: String,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `OPDECK_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL", global = true)]
    pub log_level: Option<LogLevel>,

    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Clone, Subcommand)]
pub enum CliCommand {
    /// Load formulas, start the reload triggers and run the stdin console.
    Serve,

    /// Load formulas once and print the command names.
    List,

    /// Run a job file through the job pool and record the results.
    Verify {
        /// Job file (TOML) with `[verify]` and `[[job]]` sections.
        #[arg(long, value_name = "PATH")]
        jobs: PathBuf,

        /// Concurrent workers; overrides `verify.workers` in the job file.
        #[arg(long, value_name = "N")]
        workers: Option<usize>,

        /// Results file (TOML). Jobs that already passed there are skipped.
        #[arg(long, value_name = "PATH")]
        results: Option<PathBuf>,
    },
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
