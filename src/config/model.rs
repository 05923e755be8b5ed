// src/config/model.rs

use std::path::PathBuf;

use serde::Deserialize;

/// Top-level configuration as read from a TOML file.
///
/// ```toml
/// [config]
/// max_log_bytes = 1048576
/// reload_interval_secs = 60
/// history_file = "history.txt"
///
/// [watch]
/// roots = ["config", "formula"]
/// include = ["**/*.toml"]
///
/// [[provider]]
/// name = "base"
/// file = "config/commands.toml"
/// ```
///
/// All sections are optional and have reasonable defaults. Use
/// [`ConfigFile`] (obtained through `TryFrom`) everywhere except in tests
/// and builders.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawConfigFile {
    #[serde(default)]
    pub config: ConfigSection,

    #[serde(default)]
    pub watch: WatchSection,

    /// Formula providers, invoked in this order on every reload.
    #[serde(default)]
    pub provider: Vec<ProviderConfig>,
}

/// Validated configuration.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub config: ConfigSection,
    pub watch: WatchSection,
    pub provider: Vec<ProviderConfig>,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(
        config: ConfigSection,
        watch: WatchSection,
        provider: Vec<ProviderConfig>,
    ) -> Self {
        Self {
            config,
            watch,
            provider,
        }
    }
}

/// `[config]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigSection {
    /// Byte budget of each process log buffer.
    #[serde(default = "default_max_log_bytes")]
    pub max_log_bytes: usize,

    /// Events a live viewer may have queued before it is disconnected.
    #[serde(default = "default_subscriber_buffer")]
    pub subscriber_buffer: usize,

    /// Periodic registry reload; `0` disables the timer.
    #[serde(default = "default_reload_interval_secs")]
    pub reload_interval_secs: u64,

    /// Append-only audit history of submitted commands.
    #[serde(default)]
    pub history_file: Option<PathBuf>,
}

fn default_max_log_bytes() -> usize {
    1024 * 1024
}

fn default_subscriber_buffer() -> usize {
    1024
}

fn default_reload_interval_secs() -> u64 {
    60
}

impl Default for ConfigSection {
    fn default() -> Self {
        Self {
            max_log_bytes: default_max_log_bytes(),
            subscriber_buffer: default_subscriber_buffer(),
            reload_interval_secs: default_reload_interval_secs(),
            history_file: None,
        }
    }
}

/// `[watch]` section: what the config watcher observes.
#[derive(Debug, Clone, Deserialize)]
pub struct WatchSection {
    /// Directories watched recursively, relative to the config file.
    #[serde(default)]
    pub roots: Vec<PathBuf>,

    /// Glob patterns (relative to the config directory) that count as a
    /// config change.
    #[serde(default = "default_include")]
    pub include: Vec<String>,

    #[serde(default)]
    pub exclude: Vec<String>,

    /// Change bursts within this window collapse into one reload.
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// Skip a reload when the matched files hash to the same value as the
    /// last successful load.
    #[serde(default)]
    pub use_hash: bool,
}

fn default_include() -> Vec<String> {
    vec!["**/*.toml".to_string()]
}

fn default_debounce_ms() -> u64 {
    1000
}

impl Default for WatchSection {
    fn default() -> Self {
        Self {
            roots: Vec::new(),
            include: default_include(),
            exclude: Vec::new(),
            debounce_ms: default_debounce_ms(),
            use_hash: false,
        }
    }
}

/// `[[provider]]` entry: one shell formula file.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfig {
    pub name: String,
    pub file: PathBuf,
}
