// src/jobs/sink.rs

//! Where job results go.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::fs::FileSystem;
use crate::jobs::{Job, JobResult};

/// Persistent form of one job's latest result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultRecord {
    pub kind: String,
    pub content: String,
    pub code: String,
    pub output: String,
    pub passed: bool,
}

impl ResultRecord {
    fn from_result(result: &JobResult) -> Self {
        Self {
            kind: result.job.kind.clone(),
            content: result.job.content.clone(),
            code: result.job.code.clone(),
            output: result.output.clone(),
            passed: result.passed,
        }
    }

    fn same_job(&self, job: &Job) -> bool {
        (self.content == job.content && self.kind == job.kind) || self.code == job.code
    }
}

/// Consumer of a result stream.
///
/// Recording is an upsert: a result for a job already on record (same
/// content and kind, or same code) replaces that record.
pub trait ResultSink: Send {
    fn record(&mut self, result: &JobResult) -> Result<()>;

    /// Codes of jobs whose latest recorded result passed.
    fn passed_codes(&self) -> BTreeSet<String>;
}

#[derive(Debug, Clone, Default)]
pub struct MemoryResultSink {
    records: Vec<ResultRecord>,
}

impl MemoryResultSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_records(records: Vec<ResultRecord>) -> Self {
        Self { records }
    }

    pub fn records(&self) -> &[ResultRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl ResultSink for MemoryResultSink {
    fn record(&mut self, result: &JobResult) -> Result<()> {
        let record = ResultRecord::from_result(result);
        match self.records.iter_mut().find(|r| r.same_job(&result.job)) {
            Some(existing) => {
                debug!(code = %record.code, passed = record.passed, "updating job result");
                *existing = record;
            }
            None => {
                debug!(code = %record.code, passed = record.passed, "recording new job result");
                self.records.push(record);
            }
        }
        Ok(())
    }

    fn passed_codes(&self) -> BTreeSet<String> {
        self.records
            .iter()
            .filter(|r| r.passed)
            .map(|r| r.code.clone())
            .collect()
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct ResultsFile {
    #[serde(default)]
    result: Vec<ResultRecord>,
}

/// [`MemoryResultSink`] mirrored to a TOML file after every record.
#[derive(Debug)]
pub struct TomlResultSink {
    path: PathBuf,
    fs: Arc<dyn FileSystem>,
    memory: MemoryResultSink,
}

impl TomlResultSink {
    /// Open a results file, loading earlier results if it exists.
    pub fn open(path: impl Into<PathBuf>, fs: Arc<dyn FileSystem>) -> Result<Self> {
        let path = path.into();
        let records = if fs.exists(&path) {
            let text = fs.read_to_string(&path)?;
            let file: ResultsFile = toml::from_str(&text)
                .with_context(|| format!("parsing results file {:?}", path))?;
            file.result
        } else {
            Vec::new()
        };
        debug!(path = ?path, records = records.len(), "opened results file");

        Ok(Self {
            path,
            fs,
            memory: MemoryResultSink::from_records(records),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn records(&self) -> &[ResultRecord] {
        self.memory.records()
    }

    fn persist(&self) -> Result<()> {
        let file = ResultsFile {
            result: self.memory.records().to_vec(),
        };
        let text = toml::to_string(&file).context("serializing job results")?;
        self.fs.write(&self.path, text.as_bytes())
    }
}

impl ResultSink for TomlResultSink {
    fn record(&mut self, result: &JobResult) -> Result<()> {
        self.memory.record(result)?;
        self.persist()
            .with_context(|| format!("writing results file {:?}", self.path))
    }

    fn passed_codes(&self) -> BTreeSet<String> {
        self.memory.passed_codes()
    }
}

/// Totals for one drained result stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    /// Sum of per-job durations.
    pub busy: Duration,
}

/// Consume a result stream into `sink` until it closes.
///
/// A sink failure is logged and does not stop the drain; every result is
/// still counted.
pub async fn drain_results(
    mut results: mpsc::Receiver<JobResult>,
    sink: &mut dyn ResultSink,
) -> RunSummary {
    let mut summary = RunSummary::default();

    while let Some(result) = results.recv().await {
        summary.total += 1;
        summary.busy += result.duration;
        if result.passed {
            summary.passed += 1;
        } else {
            summary.failed += 1;
        }

        info!(
            code = %result.job.code,
            kind = %result.job.kind,
            passed = result.passed,
            duration = ?result.duration,
            "job result"
        );

        if let Err(e) = sink.record(&result) {
            warn!(code = %result.job.code, error = %format!("{e:#}"), "failed to record job result");
        }
    }

    summary
}

/// Drop jobs whose code already passed according to `sink`.
pub fn skip_passed(jobs: Vec<Job>, sink: &dyn ResultSink) -> Vec<Job> {
    let passed = sink.passed_codes();
    let before = jobs.len();
    let remaining: Vec<Job> = jobs
        .into_iter()
        .filter(|job| !passed.contains(&job.code))
        .collect();
    if remaining.len() < before {
        info!(skipped = before - remaining.len(), "skipping jobs that already passed");
    }
    remaining
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::mock::MockFileSystem;

    fn result(code: &str, content: &str, passed: bool) -> JobResult {
        JobResult {
            job: Job::new("sql", content, code),
            output: if passed { "pass".into() } else { "fail".into() },
            passed,
            duration: Duration::from_millis(5),
        }
    }

    #[test]
    fn upsert_by_content_or_code_never_duplicates() {
        let mut sink = MemoryResultSink::new();
        sink.record(&result("J1", "select 1", false)).unwrap();
        // Same content and kind, new code.
        sink.record(&result("J1b", "select 1", true)).unwrap();
        // Same code, new content.
        sink.record(&result("J1b", "select 2", false)).unwrap();
        sink.record(&result("J2", "select 3", true)).unwrap();

        assert_eq!(sink.len(), 2);
        assert_eq!(sink.records()[0].code, "J1b");
        assert_eq!(sink.records()[0].content, "select 2");
        assert!(!sink.records()[0].passed);
        assert_eq!(sink.passed_codes(), BTreeSet::from(["J2".to_string()]));
    }

    #[test]
    fn toml_sink_survives_reopen() {
        let fs: Arc<dyn FileSystem> = Arc::new(MockFileSystem::new());
        {
            let mut sink = TomlResultSink::open("/deck/results.toml", Arc::clone(&fs)).unwrap();
            sink.record(&result("J1", "select 1", true)).unwrap();
            sink.record(&result("J2", "select 2", false)).unwrap();
        }

        let reopened = TomlResultSink::open("/deck/results.toml", fs).unwrap();
        assert_eq!(reopened.records().len(), 2);
        assert_eq!(reopened.passed_codes(), BTreeSet::from(["J1".to_string()]));
    }

    #[test]
    fn skip_passed_filters_by_code() {
        let mut sink = MemoryResultSink::new();
        sink.record(&result("J1", "a", true)).unwrap();
        sink.record(&result("J2", "b", false)).unwrap();

        let jobs = vec![Job::new("sql", "a", "J1"), Job::new("sql", "b", "J2")];
        let left = skip_passed(jobs, &sink);
        assert_eq!(left, vec![Job::new("sql", "b", "J2")]);
    }
}
