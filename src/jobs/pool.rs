// src/jobs/pool.rs

//! Fan-out/fan-in job consumer pool.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::jobs::{Job, JobResult, JobRunner, Verifier};

/// Runs a batch of jobs on a fixed number of workers.
///
/// One dispatch task feeds a bounded queue in input order; each worker takes
/// one job at a time from it. Results arrive in completion order, and the
/// result stream closes only after every worker has been joined, so the
/// consumer sees exactly one result per job.
#[derive(Clone)]
pub struct JobPool {
    workers: usize,
    runner: Arc<dyn JobRunner>,
    verifier: Verifier,
}

impl fmt::Debug for JobPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobPool")
            .field("workers", &self.workers)
            .finish_non_exhaustive()
    }
}

impl JobPool {
    /// `workers` below one is raised to one.
    pub fn new(workers: usize, runner: Arc<dyn JobRunner>, verifier: Verifier) -> Self {
        Self {
            workers: workers.max(1),
            runner,
            verifier,
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Start consuming `jobs`; returns the result stream immediately.
    pub fn consume(&self, jobs: Vec<Job>) -> mpsc::Receiver<JobResult> {
        let total = jobs.len();
        info!(jobs = total, workers = self.workers, "starting job pool");

        // Every result fits, so workers never wait on a slow consumer.
        let (result_tx, result_rx) = mpsc::channel::<JobResult>(total.max(1));
        let (job_tx, job_rx) = mpsc::channel::<Job>(self.workers);
        let job_rx = Arc::new(Mutex::new(job_rx));

        tokio::spawn(async move {
            for (index, job) in jobs.into_iter().enumerate() {
                debug!(index, total, code = %job.code, "dispatching job");
                if job_tx.send(job).await.is_err() {
                    warn!("all workers gone; stopping dispatch");
                    return;
                }
            }
            debug!("all jobs dispatched");
        });

        let mut workers = JoinSet::new();
        for worker in 0..self.workers {
            let job_rx = Arc::clone(&job_rx);
            let result_tx = result_tx.clone();
            let runner = Arc::clone(&self.runner);
            let verifier = Arc::clone(&self.verifier);

            workers.spawn(async move {
                loop {
                    // Hold the queue lock only while taking the next job.
                    let next = job_rx.lock().await.recv().await;
                    let Some(job) = next else {
                        break;
                    };

                    debug!(worker, code = %job.code, "worker received job");
                    let result = run_isolated(&runner, &verifier, job).await;
                    debug!(worker, code = %result.job.code, passed = result.passed, "worker finished job");

                    if result_tx.send(result).await.is_err() {
                        debug!(worker, "result receiver dropped");
                        break;
                    }
                }
            });
        }
        drop(result_tx);

        tokio::spawn(async move {
            while let Some(joined) = workers.join_next().await {
                if let Err(e) = joined {
                    warn!(error = %e, "job worker ended abnormally");
                }
            }
            info!(jobs = total, "job pool drained");
        });

        result_rx
    }
}

/// Run one job on its own task so a panicking runner costs only that job.
async fn run_isolated(runner: &Arc<dyn JobRunner>, verifier: &Verifier, job: Job) -> JobResult {
    let start = Instant::now();
    let fallback = job.clone();
    let runner = Arc::clone(runner);
    let verifier = Arc::clone(verifier);

    match tokio::spawn(async move { run_one(runner.as_ref(), &verifier, job).await }).await {
        Ok(result) => result,
        Err(join_err) => {
            error!(code = %fallback.code, error = %join_err, "job runner panicked");
            JobResult {
                job: fallback,
                output: format!("runner panicked: {join_err}"),
                passed: false,
                duration: start.elapsed(),
            }
        }
    }
}

async fn run_one(runner: &dyn JobRunner, verifier: &Verifier, job: Job) -> JobResult {
    let start = Instant::now();
    let (output, passed) = match runner.run(&job).await {
        Ok(output) => {
            let passed = verifier(&output);
            (output, passed)
        }
        Err(failure) => (failure, false),
    };

    JobResult {
        job,
        output,
        passed,
        duration: start.elapsed(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::accept_all;

    #[tokio::test]
    async fn empty_batch_closes_immediately() {
        let runner = |_job: Job| async { Ok::<_, String>(String::new()) };
        let pool = JobPool::new(3, Arc::new(runner), accept_all());

        let mut rx = pool.consume(Vec::new());
        assert!(rx.recv().await.is_none());
    }

    #[test]
    fn zero_workers_is_raised_to_one() {
        let runner = |_job: Job| async { Ok::<_, String>(String::new()) };
        let pool = JobPool::new(0, Arc::new(runner), accept_all());
        assert_eq!(pool.workers(), 1);
    }

    #[tokio::test]
    #[allow(unreachable_code)]
    async fn panicking_runner_becomes_failed_result() {
        let runner = |_job: Job| async {
            panic!("runner blew up");
            Ok::<_, String>(String::new())
        };
        let runner: Arc<dyn JobRunner> = Arc::new(runner);

        let result = run_isolated(&runner, &accept_all(), Job::new("sql", "select 1", "J1")).await;

        assert!(!result.passed);
        assert_eq!(result.job.code, "J1");
        assert!(result.output.starts_with("runner panicked:"), "{}", result.output);
    }
}
