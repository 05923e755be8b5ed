// src/formula/shell.rs

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::debug;

use crate::errors::ExecError;
use crate::exec::ShellCommand;
use crate::fs::FileSystem;
use crate::registry::{CancelSignal, Capability, CapabilityFuture, CommandSet, FormulaProvider, LogSink};

/// Environment variable carrying the operator's parameter into `run` steps.
pub const PARAM_ENV: &str = "OPDECK_PARAM";

/// Placeholder replaced by the parameter in `run` and `output` steps.
pub const PARAM_PLACEHOLDER: &str = "{param}";

/// A formula file:
///
/// ```toml
/// [command."deploy"]
/// workdir = "/srv/app"
/// steps = [
///   { run = "echo deploying {param}" },
///   { output = "done\n" },
/// ]
/// ```
#[derive(Debug, Clone, Deserialize, Default)]
pub struct FormulaFile {
    #[serde(default)]
    pub command: BTreeMap<String, CommandFormula>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CommandFormula {
    #[serde(default)]
    pub workdir: Option<PathBuf>,

    #[serde(default)]
    pub steps: Vec<Step>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Step {
    /// Shell script run through `sh -c`.
    Run(String),
    /// Literal text written to the log.
    Output(String),
}

/// Parse a formula file's text.
pub fn parse_formula_file(text: &str) -> Result<FormulaFile> {
    let file: FormulaFile = toml::from_str(text)?;
    for (name, formula) in file.command.iter() {
        if name.trim().is_empty() {
            anyhow::bail!("command with an empty name");
        }
        if name.contains(':') {
            anyhow::bail!("command name '{name}' must not contain ':'");
        }
        if formula.steps.is_empty() {
            anyhow::bail!("command '{name}' has no steps");
        }
    }
    Ok(file)
}

/// Provider that turns one formula file into shell capabilities.
///
/// The file is re-read on every `provide()` call, so editing it and
/// reloading the registry picks up the change.
pub struct ShellFormulaProvider {
    name: String,
    path: PathBuf,
    fs: Arc<dyn FileSystem>,
}

impl fmt::Debug for ShellFormulaProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShellFormulaProvider")
            .field("name", &self.name)
            .field("path", &self.path)
            .finish()
    }
}

impl ShellFormulaProvider {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>, fs: Arc<dyn FileSystem>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            fs,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl FormulaProvider for ShellFormulaProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn provide(&self) -> Result<CommandSet> {
        let text = self.fs.read_to_string(&self.path)?;
        let file = parse_formula_file(&text)
            .with_context(|| format!("parsing formula file {:?}", self.path))?;

        debug!(
            provider = %self.name,
            path = ?self.path,
            commands = file.command.len(),
            "parsed formula file"
        );

        Ok(file
            .command
            .into_iter()
            .map(|(name, formula)| {
                let capability: Arc<dyn Capability> =
                    Arc::new(ShellCapability::new(name.clone(), formula));
                (name, capability)
            })
            .collect())
    }
}

/// Runs a formula's steps in order; the first failing step aborts the rest.
#[derive(Debug)]
pub struct ShellCapability {
    name: String,
    formula: CommandFormula,
}

impl ShellCapability {
    pub fn new(name: impl Into<String>, formula: CommandFormula) -> Self {
        Self {
            name: name.into(),
            formula,
        }
    }

    async fn run_steps(
        &self,
        sink: LogSink,
        param: String,
        mut cancel: CancelSignal,
    ) -> Result<(), ExecError> {
        for (index, step) in self.formula.steps.iter().enumerate() {
            if cancel.is_cancelled() {
                return Err(ExecError::Cancelled);
            }
            match step {
                Step::Output(text) => sink.write(&text.replace(PARAM_PLACEHOLDER, &param)),
                Step::Run(script) => {
                    debug!(command = %self.name, step = index, "running formula step");
                    ShellCommand::new(script.replace(PARAM_PLACEHOLDER, &param))
                        .workdir(self.formula.workdir.clone())
                        .env(PARAM_ENV, param.as_str())
                        .run(&sink, &mut cancel)
                        .await?;
                }
            }
        }
        Ok(())
    }
}

impl Capability for ShellCapability {
    fn execute(&self, sink: LogSink, param: String, cancel: CancelSignal) -> CapabilityFuture<'_> {
        Box::pin(self.run_steps(sink, param, cancel))
    }
}
