// src/jobs/shell.rs

use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

use crate::exec::ShellCommand;
use crate::jobs::{Job, JobRunner, RunnerFuture};
use crate::registry::{CancelSignal, LogSink};

/// Runs a job's `content` as a shell script.
///
/// The output is stdout and stderr, line by line, in arrival order. A
/// non-zero exit is a failure whose text includes the captured output.
#[derive(Debug, Clone, Default)]
pub struct ShellJobRunner {
    workdir: Option<PathBuf>,
}

impl ShellJobRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn in_dir(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: Some(workdir.into()),
        }
    }
}

impl JobRunner for ShellJobRunner {
    fn run<'a>(&'a self, job: &'a Job) -> RunnerFuture<'a> {
        Box::pin(async move {
            let captured = Arc::new(Mutex::new(String::new()));
            let sink = {
                let captured = Arc::clone(&captured);
                LogSink::new(move |chunk| {
                    captured
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .push_str(chunk)
                })
            };

            let outcome = ShellCommand::new(job.content.as_str())
                .workdir(self.workdir.clone())
                .env("OPDECK_JOB_CODE", job.code.as_str())
                .env("OPDECK_JOB_KIND", job.kind.as_str())
                .run(&sink, &mut CancelSignal::never())
                .await;

            let output = std::mem::take(&mut *captured.lock().unwrap_or_else(PoisonError::into_inner));
            match outcome {
                Ok(()) => Ok(output),
                Err(e) => Err(format!("{e}\n{output}")),
            }
        })
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn captures_output_and_job_env() {
        let runner = ShellJobRunner::new();
        let job = Job::new("shell", "echo $OPDECK_JOB_CODE", "J7");
        assert_eq!(runner.run(&job).await, Ok("J7\n".to_string()));
    }

    #[tokio::test]
    async fn failure_text_carries_output() {
        let runner = ShellJobRunner::new();
        let job = Job::new("shell", "echo partial; exit 2", "J8");
        let err = runner.run(&job).await.unwrap_err();
        assert!(err.contains("code 2"));
        assert!(err.contains("partial"));
    }
}
