// src/formula/mod.rs

//! Shipped formula provider family: shell-step commands read from TOML.
//!
//! Other provider families live outside this crate and plug in through
//! [`FormulaProvider`](crate::registry::FormulaProvider).

pub mod shell;

use std::sync::Arc;

use crate::config::ConfigFile;
use crate::fs::FileSystem;
use crate::registry::FormulaProvider;

pub use shell::{
    CommandFormula, FormulaFile, PARAM_ENV, ShellCapability, ShellFormulaProvider, Step,
    parse_formula_file,
};

/// One provider per `[[provider]]` entry, in configured order.
pub fn providers_from_config(
    cfg: &ConfigFile,
    fs: Arc<dyn FileSystem>,
) -> Vec<Box<dyn FormulaProvider>> {
    cfg.provider
        .iter()
        .map(|p| {
            Box::new(ShellFormulaProvider::new(p.name.clone(), p.file.clone(), Arc::clone(&fs)))
                as Box<dyn FormulaProvider>
        })
        .collect()
}
