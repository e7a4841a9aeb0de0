//! A build session: loader, caches and collected warnings
//!
//! Every top-level build gets its own session, so independent builds never
//! share reflected modules or diagnostics.

use regex::Regex;
use std::collections::HashMap;
use std::path::PathBuf;
use std::rc::Rc;

use crate::config::{Config, ConfigError};
use crate::diagnostics::{Diagnostics, WarningKind};
use crate::docstring::Flavor;
use crate::loader::{module_pattern, LoadError, ModuleLoader, SourceKind};
use crate::reflect::ReflectedModule;

use super::extractor::{AstExtractor, AstInfo};
use super::project::Documentation;

/// Everything the builder needs to know about one reflected module
#[derive(Debug, Clone)]
pub(crate) struct Source {
    pub module: Rc<ReflectedModule>,
    pub ast: Rc<AstInfo>,
    /// Flavor fixed for the module, `None` to detect per docstring
    pub flavor: Option<Flavor>,
    pub path: Option<PathBuf>,
}

/// State of one documentation build
#[derive(Debug)]
pub struct Session {
    config: Config,
    loader: ModuleLoader,
    excludes: Vec<Regex>,
    reflected: HashMap<String, Rc<ReflectedModule>>,
    ast: HashMap<String, Rc<AstInfo>>,
    diagnostics: Diagnostics,
}

impl Session {
    /// A session searching the configured paths, resolving local names against
    /// the working directory
    pub fn new(config: Config) -> Result<Self, ConfigError> {
        let loader = ModuleLoader::new(".").with_search_paths(config.build.search_paths.clone());
        Self::with_loader(config, loader)
    }

    pub fn with_loader(config: Config, loader: ModuleLoader) -> Result<Self, ConfigError> {
        let excludes = config.exclude_patterns()?;
        Ok(Self {
            config,
            loader,
            excludes,
            reflected: HashMap::new(),
            ast: HashMap::new(),
            diagnostics: Diagnostics::new(),
        })
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    #[must_use]
    pub fn loader(&self) -> &ModuleLoader {
        &self.loader
    }

    #[must_use]
    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    pub(crate) fn diagnostics_mut(&mut self) -> &mut Diagnostics {
        &mut self.diagnostics
    }

    #[must_use]
    pub fn into_diagnostics(self) -> Diagnostics {
        self.diagnostics
    }

    pub(crate) fn is_excluded(&self, name: &str) -> bool {
        self.excludes.iter().any(|pattern| pattern.is_match(name))
    }

    pub(crate) fn is_module(&self, name: &str) -> bool {
        self.reflected.contains_key(name) || self.loader.find(name).is_some()
    }

    /// The reflected module, loaded at most once per session
    pub fn reflect(&mut self, name: &str) -> Result<Rc<ReflectedModule>, LoadError> {
        if let Some(module) = self.reflected.get(name) {
            return Ok(Rc::clone(module));
        }
        let location = self
            .loader
            .find(name)
            .ok_or_else(|| LoadError::NotFound(name.to_string()))?;
        let module = Rc::new(self.loader.load(&location)?);
        self.reflected.insert(name.to_string(), Rc::clone(&module));
        Ok(module)
    }

    /// AST docstrings of a module; a syntax error leaves them empty
    pub(crate) fn ast_info(&mut self, module: &ReflectedModule) -> Rc<AstInfo> {
        if let Some(info) = self.ast.get(&module.name) {
            return Rc::clone(info);
        }
        let info = match &module.source {
            Some(source) => match AstExtractor::extract(source) {
                Ok(info) => info,
                Err(errors) => {
                    let first = errors
                        .first()
                        .map(ToString::to_string)
                        .unwrap_or_default();
                    self.diagnostics.warn(
                        WarningKind::Parse,
                        module.name.as_str(),
                        format!("source does not parse, variable docstrings unavailable: {first}"),
                    );
                    AstInfo::default()
                }
            },
            None => AstInfo::default(),
        };
        let info = Rc::new(info);
        self.ast.insert(module.name.clone(), Rc::clone(&info));
        info
    }

    /// Flavor in effect for a module: configuration, then `__docformat__`
    pub(crate) fn module_flavor(&self, module: &ReflectedModule) -> Option<Flavor> {
        self.config
            .build
            .docformat
            .or_else(|| module.docformat.as_deref().and_then(Flavor::from_docformat))
    }

    pub(crate) fn source(&mut self, name: &str) -> Result<Source, LoadError> {
        let module = self.reflect(name)?;
        let ast = self.ast_info(&module);
        let path = self
            .loader
            .find(name)
            .filter(|location| location.kind != SourceKind::Dump)
            .map(|location| location.path);
        Ok(Source {
            flavor: self.module_flavor(&module),
            module,
            ast,
            path,
        })
    }

    /// Build one spec: the named module and its submodules
    ///
    /// Fails only if the requested module itself cannot be loaded.
    pub fn build(&mut self, spec: &str) -> Result<Documentation, LoadError> {
        let name = self.loader.parse_spec(spec, &mut self.diagnostics)?;
        let mut docs = Documentation::default();
        let mut in_progress = Vec::new();
        self.build_module(&name, &mut in_progress, &mut docs)?;
        docs.sort();
        Ok(docs)
    }

    /// Build several specs into one model
    ///
    /// Specs are expanded with [`ModuleLoader::walk_specs`]; `!pattern` specs
    /// and configured exclusions remove modules, also where they would be
    /// reached as submodules. Modules that fail to load are reported as
    /// warnings.
    pub fn build_specs(&mut self, specs: &[&str]) -> Result<Documentation, LoadError> {
        let mut names = self.loader.walk_specs(specs, &mut self.diagnostics)?;
        names.retain(|name| !self.is_excluded(name));
        for pattern in specs.iter().filter_map(|spec| spec.strip_prefix('!')) {
            self.excludes.push(module_pattern(pattern)?);
        }

        let mut docs = Documentation::default();
        for name in names {
            let mut in_progress = Vec::new();
            if let Err(e) = self.build_module(&name, &mut in_progress, &mut docs) {
                self.diagnostics.warn(WarningKind::Import, name.as_str(), e.to_string());
            }
        }
        docs.sort();
        Ok(docs)
    }
}
