//! The documentation model of a whole build

use indexmap::IndexMap;
use serde::Serialize;

use super::types::{Member, Module};

/// What a fullname refers to
#[derive(Debug, Clone, Copy)]
pub enum Target<'a> {
    Module(&'a Module),
    Member(&'a Module, &'a Member),
}

/// All modules documented by a build, keyed by name
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Documentation {
    pub modules: IndexMap<String, Module>,
}

impl Documentation {
    #[must_use]
    pub fn module(&self, name: &str) -> Option<&Module> {
        self.modules.get(name)
    }

    pub fn modules(&self) -> impl Iterator<Item = &Module> {
        self.modules.values()
    }

    pub(crate) fn insert(&mut self, module: Module) {
        self.modules.insert(module.name.clone(), module);
    }

    /// Order modules by name, which puts packages before their children
    pub(crate) fn sort(&mut self) {
        self.modules.sort_keys();
    }

    /// Merge another build; modules already present are kept
    pub fn extend(&mut self, other: Documentation) {
        for (name, module) in other.modules {
            self.modules.entry(name).or_insert(module);
        }
        self.sort();
    }

    /// Look up a module or member by its fully qualified name
    ///
    /// The longest documented module prefix wins, so `pkg.mod.Class.method`
    /// is found in `pkg.mod` even when `pkg` documents a `mod` member.
    #[must_use]
    pub fn find(&self, fullname: &str) -> Option<Target<'_>> {
        if let Some(module) = self.modules.get(fullname) {
            return Some(Target::Module(module));
        }
        let mut split = fullname.len();
        while let Some(dot) = fullname[..split].rfind('.') {
            if let Some(module) = self.modules.get(&fullname[..dot]) {
                if let Some(member) = module.find(&fullname[dot + 1..]) {
                    return Some(Target::Member(module, member));
                }
            }
            split = dot;
        }
        None
    }

    /// Documented direct children of a module, in name order
    #[must_use]
    pub fn submodules_of(&self, name: &str) -> Vec<&Module> {
        let prefix = format!("{name}.");
        self.modules
            .values()
            .filter(|m| {
                m.name
                    .strip_prefix(&prefix)
                    .is_some_and(|rest| !rest.contains('.'))
            })
            .collect()
    }
}
