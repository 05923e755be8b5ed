// src/registry/provider.rs

use std::sync::Arc;

use anyhow::Result;

use super::capability::Capability;

/// Named capabilities emitted by one provider, in the provider's own order.
pub type CommandSet = Vec<(String, Arc<dyn Capability>)>;

/// A source of named command capabilities.
///
/// Providers translate some configuration (shell formulas, container
/// definitions, database credentials, ...) into capabilities. They are
/// invoked in a fixed order on every registry reload; an error from any of
/// them aborts that reload.
pub trait FormulaProvider: Send + Sync {
    /// Name used in logs and in reload errors.
    fn name(&self) -> &str;

    fn provide(&self) -> Result<CommandSet>;
}
