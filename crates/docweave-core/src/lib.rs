//! Docweave Core - documentation model builder for Python packages
//!
//! This crate provides:
//! - Lexer and parser: a Python syntax tree, enough to find docstrings
//! - Reflection: what each module binds, from source or from a JSON dump
//! - Loader: turning module specs into names and names into files
//! - Docstrings: cleaning, flavor detection and conversion to Markdown
//! - Doc: the documentation model, its builder and cross-references
//!
//! Rendering the model is left to the consumer; every model type serializes
//! with `serde`.

use rayon::prelude::*;
use serde::Serialize;
use thiserror::Error;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Lexer module - tokenization of Python source
pub mod lexer;

/// Abstract Syntax Tree - the statements docstrings attach to
pub mod ast;

/// Parser module - converts tokens into AST
pub mod parser;

/// Static reflection and the reflection dump format
pub mod reflect;

/// Module discovery and loading
pub mod loader;

/// Docstring normalization
pub mod docstring;

/// Documentation model, builder and cross-references
pub mod doc;

/// Build configuration
pub mod config;

/// Non-fatal build warnings
pub mod diagnostics;

pub use config::{Config, ConfigError};
pub use diagnostics::{Diagnostics, Warning, WarningKind};
pub use doc::{Documentation, Reference, Resolver, Session};
pub use docstring::{Docstring, Flavor};
pub use loader::{LoadError, ModuleLoader};
pub use parser::Parser;

/// Errors that stop a build
#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Load(#[from] LoadError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// A finished build and everything that went wrong along the way
#[derive(Debug, Clone, Serialize)]
pub struct BuildOutput {
    pub documentation: Documentation,
    pub warnings: Vec<Warning>,
}

/// Document one module spec and its submodules
pub fn build(spec: &str, config: &Config) -> Result<BuildOutput, Error> {
    let mut session = Session::new(config.clone())?;
    let documentation = session.build(spec)?;
    let warnings = session.into_diagnostics().into_warnings();
    tracing::debug!(
        target: "docweave",
        spec,
        modules = documentation.modules.len(),
        warnings = warnings.len(),
        "build finished"
    );
    Ok(BuildOutput {
        documentation,
        warnings,
    })
}

/// Document independent specs in parallel, one session each
///
/// Results are in the order of `specs`.
pub fn build_all(specs: &[&str], config: &Config) -> Vec<Result<BuildOutput, Error>> {
    specs.par_iter().map(|spec| build(spec, config)).collect()
}
