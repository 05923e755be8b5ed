// src/jobs/mod.rs

//! Batch verification: run many jobs with bounded concurrency, verify their
//! output and record the results.
//!
//! - [`pool`]: the fan-out/fan-in consumer pool.
//! - [`sink`]: result sinks with upsert semantics, including a TOML file.
//! - [`shell`]: a runner that executes job content as a shell script.
//! - [`file`]: job file loading.

pub mod file;
pub mod pool;
pub mod shell;
pub mod sink;

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};

pub use file::{JobFile, VerifySection, load_job_file, parse_job_file};
pub use pool::JobPool;
pub use shell::ShellJobRunner;
pub use sink::{
    MemoryResultSink, ResultRecord, ResultSink, RunSummary, TomlResultSink, drain_results,
    skip_passed,
};

/// A unit of batch work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub kind: String,
    pub content: String,
    pub code: String,
}

impl Job {
    pub fn new(kind: impl Into<String>, content: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            content: content.into(),
            code: code.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobResult {
    pub job: Job,
    /// Runner output, or the failure text when the runner failed.
    pub output: String,
    pub passed: bool,
    pub duration: Duration,
}

/// Boxed future returned by [`JobRunner::run`].
pub type RunnerFuture<'a> = Pin<Box<dyn Future<Output = Result<String, String>> + Send + 'a>>;

/// Executes one job and returns its output, or the failure text.
pub trait JobRunner: Send + Sync {
    fn run<'a>(&'a self, job: &'a Job) -> RunnerFuture<'a>;
}

impl<F, Fut> JobRunner for F
where
    F: Fn(Job) -> Fut + Send + Sync,
    Fut: Future<Output = Result<String, String>> + Send + 'static,
{
    fn run<'a>(&'a self, job: &'a Job) -> RunnerFuture<'a> {
        Box::pin(self(job.clone()))
    }
}

/// Decides whether a successful run's output passes.
pub type Verifier = Arc<dyn Fn(&str) -> bool + Send + Sync>;

/// Verifier that passes when `pattern` matches anywhere in the output.
pub fn expect_verifier(pattern: &str) -> Result<Verifier> {
    let re = Regex::new(pattern).with_context(|| format!("invalid expect pattern: {pattern}"))?;
    Ok(Arc::new(move |output: &str| re.is_match(output)))
}

/// Verifier that passes everything that ran successfully.
pub fn accept_all() -> Verifier {
    Arc::new(|_: &str| true)
}

impl fmt::Display for JobResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{}] {} in {:?}",
            self.job.code,
            self.job.kind,
            if self.passed { "passed" } else { "failed" },
            self.duration
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expect_verifier_matches_anywhere() {
        let verify = expect_verifier(r"^ok\b").unwrap();
        assert!(verify("ok: 3 rows"));
        assert!(!verify("not ok"));
        assert!(expect_verifier("(").is_err());
    }

    #[tokio::test]
    async fn closures_are_runners() {
        let runner = |job: Job| async move { Ok::<_, String>(job.content.to_uppercase()) };
        let job = Job::new("echo", "hi", "J1");
        assert_eq!(runner.run(&job).await, Ok("HI".to_string()));
    }
}
