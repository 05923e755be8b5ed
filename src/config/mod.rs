// src/config/mod.rs

//! Configuration loading and validation for opdeck.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load a config file from disk (`loader.rs`).
//! - Validate basic invariants like buffer budgets and provider names
//!   (`validate.rs`).

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{config_root_dir, load_and_validate, load_from_path};
pub use model::{ConfigFile, ConfigSection, ProviderConfig, RawConfigFile, WatchSection};
pub use validate::validate_config;
