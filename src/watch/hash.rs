// src/watch/hash.rs

//! Content fingerprints for `use_hash`.
//!
//! Editors often touch files without changing them (save-without-edit,
//! atomic rename dances). With `use_hash = true` the watcher hashes every
//! watched file after a debounced burst and skips the reload when nothing
//! actually changed since the last successful load.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use blake3::Hasher;
use tracing::debug;

use crate::fs::FileSystem;
use crate::watch::patterns::{WatchFilter, collect_matching_files};

/// Hash of one file's contents.
pub fn compute_file_hash(fs: &dyn FileSystem, path: &Path) -> Result<String> {
    let mut hasher = Hasher::new();
    let mut reader = fs
        .open_read(path)
        .with_context(|| format!("opening file for hashing: {:?}", path))?;
    let mut buf = [0u8; 8192];
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hasher.finalize().to_hex().to_string())
}

/// Aggregate fingerprint of all watched files.
///
/// Each file contributes its path and content hash, in sorted path order,
/// so adding, removing or renaming a file changes the fingerprint as well.
#[derive(Debug, Clone)]
pub struct Fingerprinter {
    fs: Arc<dyn FileSystem>,
    roots: Vec<PathBuf>,
    filter: WatchFilter,
}

impl Fingerprinter {
    pub fn new(fs: Arc<dyn FileSystem>, roots: Vec<PathBuf>, filter: WatchFilter) -> Self {
        Self { fs, roots, filter }
    }

    pub fn compute(&self) -> Result<String> {
        let files = collect_matching_files(self.fs.as_ref(), &self.roots, &self.filter)?;
        let mut hasher = Hasher::new();

        for path in files.iter() {
            let file_hash = compute_file_hash(self.fs.as_ref(), path)?;
            hasher.update(path.to_string_lossy().as_bytes());
            hasher.update(b"\0");
            hasher.update(file_hash.as_bytes());
        }

        let hash = hasher.finalize().to_hex().to_string();
        debug!(files = files.len(), hash = %hash, "computed watch fingerprint");
        Ok(hash)
    }
}
