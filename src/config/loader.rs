// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::Result;

/// Load a configuration file from a given path and return the raw
/// `RawConfigFile`.
///
/// This only performs TOML deserialization; use [`load_and_validate`] for
/// the semantic checks.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawConfigFile> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;

    let config: RawConfigFile = toml::from_str(&contents)?;

    Ok(config)
}

/// Load a configuration file from path and run validation.
///
/// Relative provider files, watch roots and the history file are resolved
/// against the directory that contains the config file, so the service can
/// be started from anywhere.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<ConfigFile> {
    let path = path.as_ref();
    let raw_config = load_from_path(path)?;
    let mut config = ConfigFile::try_from(raw_config)?;
    resolve_relative_paths(&mut config, &config_root_dir(path));
    Ok(config)
}

/// Directory the config file lives in.
///
/// A bare filename like "Opdeck.toml" has an empty parent, in which case we
/// fall back to the current working directory.
pub fn config_root_dir(config_path: &Path) -> PathBuf {
    match config_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
    }
}

fn resolve_relative_paths(config: &mut ConfigFile, root: &Path) {
    let resolve = |p: &Path| {
        if p.is_absolute() {
            p.to_path_buf()
        } else {
            root.join(p)
        }
    };

    for provider in config.provider.iter_mut() {
        provider.file = resolve(&provider.file);
    }
    config.watch.roots = config.watch.roots.iter().map(|r| resolve(r)).collect();
    if let Some(history) = config.config.history_file.take() {
        config.config.history_file = Some(resolve(&history));
    }
}
