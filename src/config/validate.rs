// src/config/validate.rs

use std::collections::HashSet;

use globset::Glob;

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::{OpdeckError, Result};

/// Smallest log budget we accept; below this the trim rule degenerates.
pub const MIN_LOG_BYTES: usize = 16;

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = OpdeckError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_config(&raw)?;
        Ok(ConfigFile::new_unchecked(raw.config, raw.watch, raw.provider))
    }
}

/// Run every semantic check on a raw config.
pub fn validate_config(cfg: &RawConfigFile) -> Result<()> {
    validate_global_config(cfg)?;
    validate_providers(cfg)?;
    validate_watch(cfg)?;
    Ok(())
}

fn validate_global_config(cfg: &RawConfigFile) -> Result<()> {
    if cfg.config.max_log_bytes < MIN_LOG_BYTES {
        return Err(OpdeckError::ConfigError(format!(
            "[config].max_log_bytes must be >= {} (got {})",
            MIN_LOG_BYTES, cfg.config.max_log_bytes
        )));
    }

    if cfg.config.subscriber_buffer == 0 {
        return Err(OpdeckError::ConfigError(
            "[config].subscriber_buffer must be >= 1 (got 0)".to_string(),
        ));
    }

    Ok(())
}

fn validate_providers(cfg: &RawConfigFile) -> Result<()> {
    let mut seen = HashSet::new();
    for provider in cfg.provider.iter() {
        if provider.name.trim().is_empty() {
            return Err(OpdeckError::ConfigError(
                "[[provider]] entries must have a non-empty name".to_string(),
            ));
        }
        if !seen.insert(provider.name.as_str()) {
            return Err(OpdeckError::ConfigError(format!(
                "provider '{}' is declared more than once",
                provider.name
            )));
        }
    }
    Ok(())
}

fn validate_watch(cfg: &RawConfigFile) -> Result<()> {
    for pattern in cfg.watch.include.iter().chain(cfg.watch.exclude.iter()) {
        Glob::new(pattern).map_err(|e| {
            OpdeckError::ConfigError(format!("invalid watch glob '{}': {}", pattern, e))
        })?;
    }
    Ok(())
}
