//! Locating Python modules and turning them into [`ReflectedModule`]s.
//!
//! A module is found the way the import system would find it: `a.b` is
//! `<search path>/a/b/__init__.py` or `<search path>/a/b.py`, trying search
//! paths in order. Reflection dumps (`*.json`) registered through
//! [`ModuleLoader::parse_spec`] take precedence over source files.

use regex::Regex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::diagnostics::{Diagnostics, WarningKind};
use crate::parser::Parser;
use crate::reflect::{reflect_source, ReflectedModule};

const INIT_FILE: &str = "__init__.py";
const STUB_INIT_FILE: &str = "__init__.pyi";

/// UTF-8 byte order mark, allowed at the start of a source file
const BOM: char = '\u{feff}';

/// Spans are `u32` byte offsets
const MAX_SOURCE_LEN: usize = u32::MAX as usize;

/// Errors that make a requested module unavailable.
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("module not found: {0}")]
    NotFound(String),

    #[error("failed to read module '{module}' from {}", .path.display())]
    Io {
        module: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid reflection dump for module '{module}'")]
    Dump {
        module: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid module pattern '{pattern}'")]
    Pattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("module '{module}' is too large ({size} bytes)")]
    TooLarge { module: String, size: usize },

    #[error("no modules to document")]
    EmptySpec,
}

/// How a module is stored on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    /// A single `name.py` file
    Module,
    /// A directory with `__init__.py`; the path points at the init file
    Package,
    /// A JSON reflection dump
    Dump,
}

/// A located module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleLocation {
    pub name: String,
    pub path: PathBuf,
    pub kind: SourceKind,
}

impl ModuleLocation {
    #[must_use]
    pub fn is_package(&self) -> bool {
        self.kind == SourceKind::Package
    }
}

/// Finds and loads modules.
#[derive(Debug, Clone)]
pub struct ModuleLoader {
    search_paths: Vec<PathBuf>,
    /// Directory that bare names and `./` specs are checked against
    local_root: PathBuf,
    dumps: HashMap<String, PathBuf>,
}

impl ModuleLoader {
    #[must_use]
    pub fn new(local_root: impl Into<PathBuf>) -> Self {
        Self {
            search_paths: Vec::new(),
            local_root: local_root.into(),
            dumps: HashMap::new(),
        }
    }

    #[must_use]
    pub fn with_search_paths(mut self, paths: impl IntoIterator<Item = PathBuf>) -> Self {
        self.search_paths.extend(paths);
        self
    }

    #[must_use]
    pub fn search_paths(&self) -> &[PathBuf] {
        &self.search_paths
    }

    fn add_search_path(&mut self, path: PathBuf) {
        if !self.search_paths.contains(&path) {
            tracing::debug!(target: "docweave", "adding search path {}", path.display());
            self.search_paths.insert(0, path);
        }
    }

    /// Turn a spec (dotted name, file, package directory or dump) into a module name.
    ///
    /// Explicit paths win. A bare name that exists both under the local root
    /// and on the search path resolves to the search path with an
    /// [`WarningKind::AmbiguousName`] warning; `./name` selects the local one.
    pub fn parse_spec(&mut self, spec: &str, diagnostics: &mut Diagnostics) -> Result<String, LoadError> {
        let is_path = spec.starts_with("./")
            || spec.contains(['/', '\\'])
            || Path::new(spec)
                .extension()
                .is_some_and(|ext| ext == "py" || ext == "json");
        if is_path {
            return self.parse_path_spec(spec);
        }

        let local = find_in(&self.local_root, spec);
        let installed = self.find_on_search_path(spec);
        match (local, installed) {
            (Some(local), Some(installed)) => {
                if !same_file(&local.path, &installed.path) {
                    diagnostics.warn(
                        WarningKind::AmbiguousName,
                        spec,
                        format!(
                            "'{spec}' matches both {} and {}; using the latter, prefix with './' for the local one",
                            local.path.display(),
                            installed.path.display()
                        ),
                    );
                }
                Ok(spec.to_string())
            }
            (Some(_), None) => {
                let root = self.local_root.clone();
                self.add_search_path(root);
                Ok(spec.to_string())
            }
            (None, Some(_)) => Ok(spec.to_string()),
            (None, None) if self.dumps.contains_key(spec) => Ok(spec.to_string()),
            (None, None) => Err(LoadError::NotFound(spec.to_string())),
        }
    }

    fn parse_path_spec(&mut self, spec: &str) -> Result<String, LoadError> {
        let mut path = self.local_root.join(spec.strip_prefix("./").unwrap_or(spec));
        if !path.exists() && path.extension().is_none() {
            path.set_extension("py");
        }
        if !path.exists() {
            return Err(LoadError::NotFound(spec.to_string()));
        }
        if path.extension().is_some_and(|ext| ext == "json") {
            let name = stem(&path);
            self.dumps.insert(name.clone(), path);
            return Ok(name);
        }

        let mut parts = vec![stem(&path)];
        let mut root = path.parent().map(Path::to_path_buf).unwrap_or_default();
        while root.join(INIT_FILE).is_file() {
            parts.push(stem(&root));
            match root.parent() {
                Some(parent) => root = parent.to_path_buf(),
                None => break,
            }
        }
        parts.reverse();
        self.add_search_path(root);
        Ok(parts.join("."))
    }

    fn find_on_search_path(&self, name: &str) -> Option<ModuleLocation> {
        self.search_paths.iter().find_map(|root| find_in(root, name))
    }

    /// Locate a module by dotted name.
    #[must_use]
    pub fn find(&self, name: &str) -> Option<ModuleLocation> {
        if let Some(path) = self.dumps.get(name) {
            return Some(ModuleLocation {
                name: name.to_string(),
                path: path.clone(),
                kind: SourceKind::Dump,
            });
        }
        self.find_on_search_path(name)
    }

    /// Read and reflect a located module.
    pub fn load(&self, location: &ModuleLocation) -> Result<ReflectedModule, LoadError> {
        tracing::debug!(target: "docweave", "loading {} from {}", location.name, location.path.display());
        let content = std::fs::read_to_string(&location.path).map_err(|source| LoadError::Io {
            module: location.name.clone(),
            path: location.path.clone(),
            source,
        })?;
        if content.len() > MAX_SOURCE_LEN {
            return Err(LoadError::TooLarge {
                module: location.name.clone(),
                size: content.len(),
            });
        }
        if location.kind == SourceKind::Dump {
            let mut module: ReflectedModule =
                serde_json::from_str(&content).map_err(|source| LoadError::Dump {
                    module: location.name.clone(),
                    source,
                })?;
            if module.name.is_empty() {
                module.name.clone_from(&location.name);
            }
            if let Some(source) = module.source.as_mut() {
                if let Some(rest) = source.strip_prefix(BOM) {
                    *source = rest.to_string();
                }
            }
            return Ok(module);
        }

        let content = content.strip_prefix(BOM).unwrap_or(&content);
        let (ast, _) = Parser::parse_module_recovering(content);
        let mut module = reflect_source(&location.name, content, &ast, location.is_package());
        if location.is_package() {
            module.submodules = self.child_modules(location)?;
        }
        Ok(module)
    }

    /// The type stub for `name`, if one is on the search path.
    ///
    /// `a.b` is looked up as `a/b.pyi`, `a/b/__init__.pyi` and in the stub
    /// package `a-stubs/`, trying search paths in order.
    #[must_use]
    pub fn find_stub(&self, name: &str) -> Option<PathBuf> {
        if name.is_empty() || !name.split('.').all(is_identifier) {
            return None;
        }
        let parts: Vec<&str> = name.split('.').collect();
        let stub_package = format!("{}-stubs", parts[0]);
        let mut stub_parts = parts.clone();
        stub_parts[0] = stub_package.as_str();
        self.search_paths.iter().find_map(|root| {
            [&parts, &stub_parts].into_iter().find_map(|parts| {
                let base = parts.iter().fold(root.clone(), |path, part| path.join(part));
                [base.with_extension("pyi"), base.join(STUB_INIT_FILE)]
                    .into_iter()
                    .find(|candidate| candidate.is_file())
            })
        })
    }

    /// Read a stub found by [`Self::find_stub`], byte order mark removed.
    pub fn read_stub(&self, name: &str, path: &Path) -> Result<String, LoadError> {
        tracing::debug!(target: "docweave", "reading type stub for {name} from {}", path.display());
        let content = std::fs::read_to_string(path).map_err(|source| LoadError::Io {
            module: name.to_string(),
            path: path.to_path_buf(),
            source,
        })?;
        if content.len() > MAX_SOURCE_LEN {
            return Err(LoadError::TooLarge {
                module: name.to_string(),
                size: content.len(),
            });
        }
        Ok(match content.strip_prefix(BOM) {
            Some(rest) => rest.to_string(),
            None => content,
        })
    }

    /// Unqualified names of the direct children of a package, sorted.
    pub fn child_modules(&self, location: &ModuleLocation) -> Result<Vec<String>, LoadError> {
        if !location.is_package() {
            return Ok(Vec::new());
        }
        let dir = location.path.parent().unwrap_or(Path::new("."));
        let io_error = |source: std::io::Error| LoadError::Io {
            module: location.name.clone(),
            path: dir.to_path_buf(),
            source,
        };
        let mut children = Vec::new();
        for entry in std::fs::read_dir(dir).map_err(io_error)? {
            let path = entry.map_err(io_error)?.path();
            let name = if path.is_dir() && path.join(INIT_FILE).is_file() {
                stem(&path)
            } else if path.extension().is_some_and(|ext| ext == "py") && !path.ends_with(INIT_FILE) {
                stem(&path)
            } else {
                continue;
            };
            if name != "__main__" && is_identifier(&name) {
                children.push(name);
            }
        }
        children.sort();
        Ok(children)
    }

    /// Expand specs into module names, submodules included.
    ///
    /// A spec starting with `!` is a regular expression; names collected so
    /// far that match it are removed.
    pub fn walk_specs(&mut self, specs: &[&str], diagnostics: &mut Diagnostics) -> Result<Vec<String>, LoadError> {
        let mut names: Vec<String> = Vec::new();
        for spec in specs {
            if let Some(pattern) = spec.strip_prefix('!') {
                let regex = module_pattern(pattern)?;
                names.retain(|name| !regex.is_match(name));
                continue;
            }
            let name = self.parse_spec(spec, diagnostics)?;
            let mut pending = vec![name];
            while let Some(name) = pending.pop() {
                if names.contains(&name) {
                    diagnostics.warn(
                        WarningKind::AmbiguousName,
                        name.as_str(),
                        format!("'{name}' is requested more than once"),
                    );
                    continue;
                }
                if let Some(location) = self.find(&name) {
                    match self.child_modules(&location) {
                        Ok(children) => pending.extend(
                            children
                                .iter()
                                .rev()
                                .filter(|child| !child.starts_with('_'))
                                .map(|child| format!("{name}.{child}")),
                        ),
                        Err(e) => diagnostics.warn(WarningKind::Import, name.as_str(), e.to_string()),
                    }
                }
                names.push(name);
            }
        }
        if names.is_empty() {
            return Err(LoadError::EmptySpec);
        }
        Ok(names)
    }
}

/// A `!pattern` spec, anchored at the start of the module name
pub(crate) fn module_pattern(pattern: &str) -> Result<Regex, LoadError> {
    Regex::new(&format!("^(?:{pattern})")).map_err(|source| LoadError::Pattern {
        pattern: pattern.to_string(),
        source,
    })
}

/// `a.b` below `root`, packages before plain modules
fn find_in(root: &Path, name: &str) -> Option<ModuleLocation> {
    if name.is_empty() || !name.split('.').all(is_identifier) {
        return None;
    }
    let base = name.split('.').fold(root.to_path_buf(), |path, part| path.join(part));
    let init = base.join(INIT_FILE);
    if init.is_file() {
        return Some(ModuleLocation {
            name: name.to_string(),
            path: init,
            kind: SourceKind::Package,
        });
    }
    let file = base.with_extension("py");
    file.is_file().then(|| ModuleLocation {
        name: name.to_string(),
        path: file,
        kind: SourceKind::Module,
    })
}

fn stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

pub(crate) fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|c| c == '_' || c.is_alphabetic())
        && chars.all(|c| c == '_' || c.is_alphanumeric())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write(root: &Path, path: &str, content: &str) {
        let path = root.join(path);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn find_prefers_packages() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "pkg/__init__.py", "");
        write(tmp.path(), "pkg/sub.py", "");
        write(tmp.path(), "pkg.py", "");
        let loader = ModuleLoader::new(tmp.path()).with_search_paths([tmp.path().to_path_buf()]);
        let pkg = loader.find("pkg").unwrap();
        assert_eq!(pkg.kind, SourceKind::Package);
        assert_eq!(loader.find("pkg.sub").unwrap().kind, SourceKind::Module);
        assert!(loader.find("pkg.missing").is_none());
        assert!(loader.find("not-a-name").is_none());
    }

    #[test]
    fn path_specs_derive_dotted_names() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "src/pkg/__init__.py", "");
        write(tmp.path(), "src/pkg/inner/__init__.py", "");
        write(tmp.path(), "src/pkg/inner/mod.py", "X = 1\n");
        let mut loader = ModuleLoader::new(tmp.path());
        let mut diagnostics = Diagnostics::new();
        let name = loader.parse_spec("src/pkg/inner/mod.py", &mut diagnostics).unwrap();
        assert_eq!(name, "pkg.inner.mod");
        assert_eq!(loader.search_paths(), &[tmp.path().join("src")]);
        assert_eq!(loader.parse_spec("./src/pkg", &mut diagnostics).unwrap(), "pkg");
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn ambiguous_bare_names_prefer_the_search_path() {
        let local = TempDir::new().unwrap();
        let installed = TempDir::new().unwrap();
        write(local.path(), "demo.py", "");
        write(installed.path(), "demo/__init__.py", "");
        let mut loader =
            ModuleLoader::new(local.path()).with_search_paths([installed.path().to_path_buf()]);
        let mut diagnostics = Diagnostics::new();
        assert_eq!(loader.parse_spec("demo", &mut diagnostics).unwrap(), "demo");
        assert_eq!(diagnostics.count(WarningKind::AmbiguousName), 1);
        assert_eq!(loader.find("demo").unwrap().kind, SourceKind::Package);

        let mut loader =
            ModuleLoader::new(local.path()).with_search_paths([installed.path().to_path_buf()]);
        let mut diagnostics = Diagnostics::new();
        assert_eq!(loader.parse_spec("./demo", &mut diagnostics).unwrap(), "demo");
        assert!(diagnostics.is_empty());
        assert_eq!(loader.find("demo").unwrap().kind, SourceKind::Module);
    }

    #[test]
    fn missing_modules_are_errors() {
        let tmp = TempDir::new().unwrap();
        let mut loader = ModuleLoader::new(tmp.path());
        let mut diagnostics = Diagnostics::new();
        assert!(matches!(
            loader.parse_spec("nowhere", &mut diagnostics),
            Err(LoadError::NotFound(_))
        ));
        assert!(matches!(
            loader.walk_specs(&[], &mut diagnostics),
            Err(LoadError::EmptySpec)
        ));
    }

    #[test]
    fn children_and_walk() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "pkg/__init__.py", "");
        write(tmp.path(), "pkg/b.py", "");
        write(tmp.path(), "pkg/a/__init__.py", "");
        write(tmp.path(), "pkg/a/deep.py", "");
        write(tmp.path(), "pkg/__main__.py", "");
        write(tmp.path(), "pkg/_private.py", "");
        write(tmp.path(), "pkg/notes.txt", "");
        write(tmp.path(), "pkg/data/readme.py", "");
        let mut loader = ModuleLoader::new(tmp.path()).with_search_paths([tmp.path().to_path_buf()]);
        let location = loader.find("pkg").unwrap();
        assert_eq!(loader.child_modules(&location).unwrap(), vec!["_private", "a", "b"]);

        let mut diagnostics = Diagnostics::new();
        let names = loader.walk_specs(&["pkg"], &mut diagnostics).unwrap();
        assert_eq!(names, vec!["pkg", "pkg.a", "pkg.a.deep", "pkg.b"]);
        let names = loader.walk_specs(&["pkg", "!pkg\\.a"], &mut diagnostics).unwrap();
        assert_eq!(names, vec!["pkg", "pkg.b"]);
    }

    #[test]
    fn load_skips_a_byte_order_mark() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "bom.py", "\u{feff}\"\"\"Module doc.\"\"\"\nX = 1\n");
        let loader = ModuleLoader::new(tmp.path()).with_search_paths([tmp.path().to_path_buf()]);
        let module = loader.load(&loader.find("bom").unwrap()).unwrap();
        assert_eq!(module.docstring.as_deref(), Some("Module doc."));
        assert!(module.source.unwrap().starts_with("\"\"\""));
        assert_eq!(module.members[0].name, "X");
    }

    #[test]
    fn stubs_next_to_modules_and_in_stub_packages() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "pkg/__init__.py", "");
        write(tmp.path(), "pkg/__init__.pyi", "");
        write(tmp.path(), "pkg/fast.py", "");
        write(tmp.path(), "pkg/fast.pyi", "");
        write(tmp.path(), "native/__init__.py", "");
        write(tmp.path(), "native-stubs/core.pyi", "\u{feff}X: int\n");
        let loader = ModuleLoader::new(tmp.path()).with_search_paths([tmp.path().to_path_buf()]);
        assert_eq!(loader.find_stub("pkg"), Some(tmp.path().join("pkg/__init__.pyi")));
        assert_eq!(loader.find_stub("pkg.fast"), Some(tmp.path().join("pkg/fast.pyi")));
        let native = loader.find_stub("native.core").unwrap();
        assert_eq!(native, tmp.path().join("native-stubs/core.pyi"));
        assert_eq!(loader.read_stub("native.core", &native).unwrap(), "X: int\n");
        assert!(loader.find_stub("native").is_none());
        assert!(loader.find_stub("pkg.missing").is_none());
    }

    #[test]
    fn load_reads_source_and_dumps() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "pkg/__init__.py", "\"\"\"Package.\"\"\"\nfrom . import b\n");
        write(tmp.path(), "pkg/b.py", "");
        write(tmp.path(), "ext.json", r#"{"name": "", "docstring": "From a dump."}"#);
        write(tmp.path(), "broken.json", "{");
        let mut loader = ModuleLoader::new(tmp.path()).with_search_paths([tmp.path().to_path_buf()]);
        let module = loader.load(&loader.find("pkg").unwrap()).unwrap();
        assert!(module.is_package);
        assert_eq!(module.docstring.as_deref(), Some("Package."));
        assert_eq!(module.submodules, vec!["b"]);

        let mut diagnostics = Diagnostics::new();
        assert_eq!(loader.parse_spec("ext.json", &mut diagnostics).unwrap(), "ext");
        let dump = loader.load(&loader.find("ext").unwrap()).unwrap();
        assert_eq!(dump.name, "ext");
        assert_eq!(dump.docstring.as_deref(), Some("From a dump."));

        loader.parse_spec("broken.json", &mut diagnostics).unwrap();
        let err = loader.load(&loader.find("broken").unwrap()).unwrap_err();
        assert!(matches!(err, LoadError::Dump { .. }));
    }
}
