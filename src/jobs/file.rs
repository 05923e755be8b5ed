// src/jobs/file.rs

use std::collections::HashSet;
use std::path::Path;

use anyhow::{Context, Result, bail};
use serde::Deserialize;

use crate::fs::FileSystem;
use crate::jobs::{Job, Verifier, accept_all, expect_verifier};

/// A batch of jobs plus how to verify them:
///
/// ```toml
/// [verify]
/// expect = "^ok"
/// workers = 4
///
/// [[job]]
/// kind = "shell"
/// code = "disk-free"
/// content = "df -h / && echo ok"
/// ```
#[derive(Debug, Clone, Deserialize, Default)]
pub struct JobFile {
    #[serde(default)]
    pub verify: VerifySection,

    #[serde(default)]
    pub job: Vec<Job>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct VerifySection {
    /// Regex the output must match; absent means any successful run passes.
    #[serde(default)]
    pub expect: Option<String>,

    #[serde(default)]
    pub workers: Option<usize>,
}

impl JobFile {
    pub fn verifier(&self) -> Result<Verifier> {
        match &self.verify.expect {
            Some(pattern) => expect_verifier(pattern),
            None => Ok(accept_all()),
        }
    }
}

pub fn parse_job_file(text: &str) -> Result<JobFile> {
    let file: JobFile = toml::from_str(text)?;

    if file.verify.workers == Some(0) {
        bail!("verify.workers must be at least 1");
    }
    let mut codes = HashSet::new();
    for job in file.job.iter() {
        if job.code.trim().is_empty() {
            bail!("job with empty code (kind '{}')", job.kind);
        }
        if !codes.insert(job.code.as_str()) {
            bail!("duplicate job code '{}'", job.code);
        }
    }
    Ok(file)
}

pub fn load_job_file(fs: &dyn FileSystem, path: &Path) -> Result<JobFile> {
    let text = fs.read_to_string(path)?;
    parse_job_file(&text).with_context(|| format!("parsing job file {:?}", path))
}
