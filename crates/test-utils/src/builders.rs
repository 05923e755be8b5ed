use std::path::PathBuf;
use std::sync::Arc;

use opdeck::config::{ConfigFile, ProviderConfig, RawConfigFile};
use opdeck::engine::Engine;
use opdeck::hub::LogHub;
use opdeck::process::AuditLog;
use opdeck::registry::{CommandRegistry, FormulaProvider};

/// Builder for `ConfigFile` to simplify test setup.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfigFile::default(),
        }
    }

    pub fn with_provider(mut self, name: &str, file: impl Into<PathBuf>) -> Self {
        self.config.provider.push(ProviderConfig {
            name: name.to_string(),
            file: file.into(),
        });
        self
    }

    pub fn with_max_log_bytes(mut self, bytes: usize) -> Self {
        self.config.config.max_log_bytes = bytes;
        self
    }

    pub fn with_subscriber_buffer(mut self, events: usize) -> Self {
        self.config.config.subscriber_buffer = events;
        self
    }

    pub fn with_watch_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.config.watch.roots.push(root.into());
        self
    }

    pub fn with_watch_exclude(mut self, pattern: &str) -> Self {
        self.config.watch.exclude.push(pattern.to_string());
        self
    }

    pub fn raw(self) -> RawConfigFile {
        self.config
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Assembles an [`Engine`] over in-memory providers, with the initial
/// reload already done.
pub struct EngineBuilder {
    providers: Vec<Box<dyn FormulaProvider>>,
    max_log_bytes: usize,
    subscriber_buffer: usize,
}

impl EngineBuilder {
    pub fn new() -> Self {
        Self {
            providers: Vec::new(),
            max_log_bytes: 64 * 1024,
            subscriber_buffer: 256,
        }
    }

    pub fn provider(mut self, provider: Box<dyn FormulaProvider>) -> Self {
        self.providers.push(provider);
        self
    }

    pub fn max_log_bytes(mut self, bytes: usize) -> Self {
        self.max_log_bytes = bytes;
        self
    }

    pub fn subscriber_buffer(mut self, events: usize) -> Self {
        self.subscriber_buffer = events;
        self
    }

    pub fn build(self) -> Engine {
        let registry = Arc::new(CommandRegistry::new(self.providers));
        registry.reload().expect("initial reload in EngineBuilder failed");
        Engine::new(
            registry,
            LogHub::new(self.max_log_bytes, self.subscriber_buffer),
            AuditLog::in_memory(),
        )
    }
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}
