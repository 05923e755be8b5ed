// src/lib.rs

pub mod cli;
pub mod config;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod formula;
pub mod fs;
pub mod hub;
pub mod jobs;
pub mod logging;
pub mod process;
pub mod registry;
pub mod types;
pub mod watch;

use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::cli::{CliArgs, CliCommand};
use crate::config::{ConfigFile, config_root_dir, load_and_validate};
use crate::engine::{Console, Engine};
use crate::formula::providers_from_config;
use crate::fs::{FileSystem, RealFileSystem};
use crate::hub::LogHub;
use crate::jobs::{
    JobPool, MemoryResultSink, ResultSink, ShellJobRunner, TomlResultSink, drain_results,
    load_job_file, skip_passed,
};
use crate::process::AuditLog;
use crate::registry::CommandRegistry;
use crate::watch::{
    Fingerprinter, ReloadDebouncer, WatchFilter, WatcherHandle, spawn_config_watcher,
    spawn_reload_timer,
};

/// Workers used by `verify` when neither the CLI nor the job file says.
pub const DEFAULT_VERIFY_WORKERS: usize = 4;

/// High-level entry point used by `main.rs`.
pub async fn run(args: CliArgs) -> Result<()> {
    let fs: Arc<dyn FileSystem> = Arc::new(RealFileSystem);
    let config_path = PathBuf::from(&args.config);

    match args.command {
        CliCommand::Serve => {
            let cfg = load_config(&config_path)?;
            serve(&config_path, cfg, fs).await
        }
        CliCommand::List => {
            let cfg = load_config(&config_path)?;
            let registry = CommandRegistry::new(providers_from_config(&cfg, fs));
            registry.reload()?;
            for name in registry.names() {
                println!("{name}");
            }
            Ok(())
        }
        CliCommand::Verify {
            jobs,
            workers,
            results,
        } => verify(fs, &jobs, workers, results.as_deref()).await,
    }
}

fn load_config(path: &Path) -> Result<ConfigFile> {
    let cfg = load_and_validate(path).with_context(|| format!("loading config {:?}", path))?;
    debug!(
        providers = cfg.provider.len(),
        watch_roots = cfg.watch.roots.len(),
        "config loaded"
    );
    Ok(cfg)
}

/// Build the engine from config and load the initial command set.
///
/// A failing initial load is fatal: there is no previous snapshot to fall
/// back on.
pub async fn build_engine(cfg: &ConfigFile, fs: Arc<dyn FileSystem>) -> Result<Engine> {
    let registry = Arc::new(CommandRegistry::new(providers_from_config(cfg, Arc::clone(&fs))));
    {
        let registry = Arc::clone(&registry);
        tokio::task::spawn_blocking(move || registry.reload())
            .await
            .context("initial registry load task failed")?
            .context("initial registry load")?;
    }

    let hub = LogHub::new(cfg.config.max_log_bytes, cfg.config.subscriber_buffer);
    let audit = match &cfg.config.history_file {
        Some(path) => AuditLog::with_file(path, fs)?,
        None => AuditLog::in_memory(),
    };

    Ok(Engine::new(registry, hub, audit))
}

/// Start the config watcher, if any roots are configured.
fn start_watcher(
    config_path: &Path,
    cfg: &ConfigFile,
    registry: Arc<CommandRegistry>,
    fs: Arc<dyn FileSystem>,
) -> Result<Option<WatcherHandle>> {
    if cfg.watch.roots.is_empty() {
        debug!("no watch roots configured; file watching disabled");
        return Ok(None);
    }

    // Canonicalize once so notify's absolute event paths relativize cleanly.
    let canonical = |p: &Path| p.canonicalize().unwrap_or_else(|_| p.to_path_buf());
    let base = canonical(config_root_dir(config_path).as_path());
    let roots: Vec<PathBuf> = cfg.watch.roots.iter().map(|r| canonical(r.as_path())).collect();

    let filter = WatchFilter::from_section(base, &cfg.watch)?;
    let mut debouncer =
        ReloadDebouncer::new(registry, Duration::from_millis(cfg.watch.debounce_ms));

    if cfg.watch.use_hash {
        let fingerprinter = Fingerprinter::new(fs, roots.clone(), filter.clone());
        let loaded = match fingerprinter.compute() {
            Ok(hash) => Some(hash),
            Err(e) => {
                warn!(error = %format!("{e:#}"), "initial watch fingerprint failed");
                None
            }
        };
        debouncer = debouncer.with_fingerprint(fingerprinter, loaded);
    }

    Ok(Some(spawn_config_watcher(&roots, filter, debouncer)?))
}

async fn serve(config_path: &Path, cfg: ConfigFile, fs: Arc<dyn FileSystem>) -> Result<()> {
    let engine = build_engine(&cfg, Arc::clone(&fs)).await?;
    info!(commands = engine.registry().len(), "opdeck ready");

    let timer = match cfg.config.reload_interval_secs {
        0 => None,
        secs => Some(spawn_reload_timer(
            Arc::clone(engine.registry()),
            Duration::from_secs(secs),
        )),
    };

    let _watcher = start_watcher(config_path, &cfg, Arc::clone(engine.registry()), fs)?;

    // Console output goes through one printer so tailed lines and replies
    // never interleave mid-line.
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<String>();
    let printer = tokio::spawn(async move {
        while let Some(text) = out_rx.recv().await {
            println!("{text}");
        }
    });

    let console = Console::new(engine.clone(), out_tx);

    tokio::select! {
        () = console.run(spawn_stdin_reader()) => {}
        signal = tokio::signal::ctrl_c() => {
            match signal {
                Ok(()) => info!("Ctrl-C received; shutting down"),
                Err(e) => warn!(error = %e, "failed to listen for Ctrl-C"),
            }
        }
    }

    engine.shutdown();
    if let Some(timer) = timer {
        timer.abort();
    }
    // Let the printer flush what is already queued.
    let _ = tokio::time::timeout(Duration::from_millis(200), printer).await;
    Ok(())
}

/// Read stdin on a dedicated thread.
///
/// Tokio's async stdin parks a blocking-pool thread that keeps the runtime
/// from shutting down until the next line arrives; a detached thread does
/// not.
fn spawn_stdin_reader() -> mpsc::UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            match line {
                Ok(line) => {
                    if tx.send(line).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    warn!(error = %e, "reading stdin failed");
                    break;
                }
            }
        }
    });
    rx
}

async fn verify(
    fs: Arc<dyn FileSystem>,
    jobs_path: &Path,
    workers: Option<usize>,
    results: Option<&Path>,
) -> Result<()> {
    let job_file = load_job_file(fs.as_ref(), jobs_path)?;
    let verifier = job_file.verifier()?;
    let workers = workers
        .or(job_file.verify.workers)
        .unwrap_or(DEFAULT_VERIFY_WORKERS);

    let mut sink: Box<dyn ResultSink> = match results {
        Some(path) => Box::new(TomlResultSink::open(path, Arc::clone(&fs))?),
        None => Box::new(MemoryResultSink::new()),
    };

    let jobs = skip_passed(job_file.job, sink.as_ref());
    let pool = JobPool::new(workers, Arc::new(ShellJobRunner::new()), verifier);
    let summary = drain_results(pool.consume(jobs), sink.as_mut()).await;

    println!(
        "{} jobs: {} passed, {} failed",
        summary.total, summary.passed, summary.failed
    );
    if summary.failed > 0 {
        bail!("{} of {} jobs failed", summary.failed, summary.total);
    }
    Ok(())
}
