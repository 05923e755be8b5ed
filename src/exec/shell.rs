// src/exec/shell.rs

//! Running one shell script as a child process, streaming its output.

use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::errors::ExecError;
use crate::registry::{CancelSignal, LogSink};

/// A script to run through the platform shell.
#[derive(Debug, Clone)]
pub struct ShellCommand {
    script: String,
    workdir: Option<PathBuf>,
    env: Vec<(String, String)>,
}

impl ShellCommand {
    pub fn new(script: impl Into<String>) -> Self {
        Self {
            script: script.into(),
            workdir: None,
            env: Vec::new(),
        }
    }

    pub fn workdir(mut self, dir: Option<PathBuf>) -> Self {
        self.workdir = dir;
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    fn build(&self) -> Command {
        let mut cmd = if cfg!(windows) {
            let mut c = Command::new("cmd");
            c.arg("/C").arg(&self.script);
            c
        } else {
            let mut c = Command::new("sh");
            c.arg("-c").arg(&self.script);
            c
        };

        if let Some(dir) = &self.workdir {
            cmd.current_dir(dir);
        }
        for (key, value) in self.env.iter() {
            cmd.env(key, value);
        }

        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }

    /// Run to completion, writing every stdout and stderr line to `sink`.
    ///
    /// All output has been written to the sink by the time this returns.
    /// A non-zero exit is a `Failed` error. If `cancel` fires first the child
    /// is killed and `Cancelled` is returned.
    pub async fn run(&self, sink: &LogSink, cancel: &mut CancelSignal) -> Result<(), ExecError> {
        debug!(script = %self.script, workdir = ?self.workdir, "spawning shell step");

        let mut child = self
            .build()
            .spawn()
            .map_err(|e| ExecError::failed(format!("spawning `{}`: {e}", self.script)))?;

        let mut readers: Vec<JoinHandle<()>> = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            readers.push(pipe_lines(stdout, sink.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(pipe_lines(stderr, sink.clone()));
        }

        let status: ExitStatus = tokio::select! {
            status = child.wait() => {
                status.map_err(|e| ExecError::failed(format!("waiting for `{}`: {e}", self.script)))?
            }
            _ = cancel.cancelled() => {
                info!(script = %self.script, "cancellation requested; killing shell step");
                if let Err(e) = child.kill().await {
                    warn!(script = %self.script, error = %e, "failed to kill child process on cancellation");
                }
                for reader in readers {
                    reader.abort();
                }
                return Err(ExecError::Cancelled);
            }
        };

        for reader in readers {
            if let Err(e) = reader.await {
                debug!(error = %e, "output reader ended abnormally");
            }
        }

        if status.success() {
            Ok(())
        } else {
            let code = status.code().unwrap_or(-1);
            Err(ExecError::failed(format!(
                "`{}` exited with code {code}",
                self.script
            )))
        }
    }
}

/// Forward `stream` to `sink` one line at a time until EOF.
///
/// Lines are decoded lossily, so a non-UTF-8 byte never stops the reader.
fn pipe_lines<R>(stream: R, sink: LogSink) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(stream);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) => break,
                Ok(_) => {
                    if buf.last() == Some(&b'\n') {
                        buf.pop();
                    }
                    sink.line(&String::from_utf8_lossy(&buf));
                }
                Err(e) => {
                    warn!(error = %e, "reading child output failed");
                    break;
                }
            }
        }
    })
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    fn collecting_sink() -> (LogSink, Arc<Mutex<String>>) {
        let out = Arc::new(Mutex::new(String::new()));
        let sink = {
            let out = Arc::clone(&out);
            LogSink::new(move |chunk| out.lock().unwrap().push_str(chunk))
        };
        (sink, out)
    }

    #[tokio::test]
    async fn streams_stdout_and_exports_env() {
        let (sink, out) = collecting_sink();
        let cmd = ShellCommand::new("echo hello $OPDECK_PARAM").env("OPDECK_PARAM", "v1");

        cmd.run(&sink, &mut CancelSignal::never()).await.unwrap();
        assert_eq!(out.lock().unwrap().as_str(), "hello v1\n");
    }

    #[tokio::test]
    async fn non_zero_exit_is_failure_and_keeps_stderr() {
        let (sink, out) = collecting_sink();
        let cmd = ShellCommand::new("echo broken >&2; exit 3");

        let err = cmd.run(&sink, &mut CancelSignal::never()).await.unwrap_err();
        assert!(matches!(err, ExecError::Failed(ref msg) if msg.contains("code 3")));
        assert_eq!(out.lock().unwrap().as_str(), "broken\n");
    }

    #[tokio::test]
    async fn cancel_kills_child() {
        let (sink, _out) = collecting_sink();
        let (handle, mut signal) = CancelSignal::pair();
        let cmd = ShellCommand::new("sleep 30");

        let run = tokio::spawn(async move { cmd.run(&sink, &mut signal).await });
        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.fire();

        let result = tokio::time::timeout(Duration::from_secs(5), run)
            .await
            .expect("cancelled step should stop promptly")
            .unwrap();
        assert_eq!(result, Err(ExecError::Cancelled));
    }

    #[tokio::test]
    async fn invalid_utf8_does_not_stop_output() {
        let (sink, out) = collecting_sink();
        let cmd = ShellCommand::new(
            "printf 'before\\n\\377\\n'; yes after | head -c 300000; echo; echo last; exit 0",
        );

        cmd.run(&sink, &mut CancelSignal::never()).await.unwrap();

        let out = out.lock().unwrap();
        assert!(out.starts_with("before\n\u{FFFD}\n"));
        assert!(out.ends_with("\nlast\n"));
        assert!(out.len() > 64 * 1024);
    }

    #[tokio::test]
    async fn final_line_without_newline_is_kept() {
        let (sink, out) = collecting_sink();
        let cmd = ShellCommand::new("printf 'one\\ntwo'");

        cmd.run(&sink, &mut CancelSignal::never()).await.unwrap();
        assert_eq!(out.lock().unwrap().as_str(), "one\ntwo\n");
    }
}
