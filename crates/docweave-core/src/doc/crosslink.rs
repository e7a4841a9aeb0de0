//! Cross-references between documented objects
//!
//! Identifiers mentioned in docstrings are resolved against a finished
//! [`Documentation`]: first the scopes surrounding the mention, then the whole
//! model by fully qualified name. Whatever is left is external.

use regex::Regex;
use serde::Serialize;
use std::sync::LazyLock;

use crate::config::LinkConfig;
use crate::loader::is_identifier;

use super::project::{Documentation, Target};
use super::types::{Member, Module};

/// What an identifier refers to
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Reference {
    /// A member of the module being documented
    Local { fullname: String, anchor: String },
    /// A documented module
    Module { module: String, href: String },
    /// A member documented on another module's page
    CrossPage {
        module: String,
        qualname: String,
        href: String,
    },
    /// Not part of the model; `url` is only guessed when external links are on
    External {
        identifier: String,
        url: Option<String>,
    },
}

impl Reference {
    #[must_use]
    pub fn is_external(&self) -> bool {
        matches!(self, Self::External { .. })
    }
}

/// A resolved mention inside a piece of text
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReferenceSpan {
    /// Byte range of the identifier, without backticks or `()`
    pub start: usize,
    pub end: usize,
    pub identifier: String,
    pub reference: Reference,
}

static MENTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"`(?P<quoted>\.*[A-Za-z_][A-Za-z0-9_]*(?:\.[A-Za-z_][A-Za-z0-9_]*)*)(?:\(\))?`|(?P<dotted>\b[A-Za-z_][A-Za-z0-9_]*(?:\.[A-Za-z_][A-Za-z0-9_]*)+)|(?P<word>\b[A-Za-z_][A-Za-z0-9_]*)",
    )
    .expect("valid regex")
});

/// Module page of `module` relative to the page of `from`
///
/// `pkg.sub` is rendered to `pkg/sub.html`.
#[must_use]
pub fn relative_link(from: &str, module: &str) -> String {
    let from_dir: Vec<&str> = match from.rsplit_once('.') {
        Some((parent, _)) => parent.split('.').collect(),
        None => Vec::new(),
    };
    let target: Vec<&str> = module.split('.').collect();
    let common = from_dir
        .iter()
        .zip(&target[..target.len() - 1])
        .take_while(|(a, b)| a == b)
        .count();
    let mut link = "../".repeat(from_dir.len() - common);
    link.push_str(&target[common..].join("/"));
    link.push_str(".html");
    link
}

/// Resolves identifiers against a documentation model
pub struct Resolver<'a> {
    docs: &'a Documentation,
    links: &'a LinkConfig,
}

impl<'a> Resolver<'a> {
    #[must_use]
    pub fn new(docs: &'a Documentation, links: &'a LinkConfig) -> Self {
        Self { docs, links }
    }

    /// Resolve an identifier mentioned at module level
    #[must_use]
    pub fn resolve_reference(&self, identifier: &str, context: &str) -> Reference {
        self.resolve_in(identifier, context, "")
    }

    /// Resolve an identifier mentioned inside `namespace`, a qualname in `context`
    #[must_use]
    pub fn resolve_in(&self, identifier: &str, context: &str, namespace: &str) -> Reference {
        let identifier = identifier.trim().trim_end_matches("()");

        if identifier.starts_with('.') {
            return self
                .absolute(identifier, context)
                .and_then(|absolute| self.global(&absolute, context))
                .unwrap_or_else(|| Reference::External {
                    identifier: identifier.to_string(),
                    url: None,
                });
        }

        if let Some(module) = self.docs.module(context) {
            if let Some(reference) = self.local(module, identifier, namespace) {
                return reference;
            }
        }
        self.global(identifier, context)
            .unwrap_or_else(|| self.external(identifier))
    }

    /// Every mention in `text` that refers to something
    ///
    /// Backticked identifiers are always reported, external ones included.
    /// Dotted names are reported when they resolve into the model, bare words
    /// only when they name a member visible from the mention.
    #[must_use]
    pub fn references_in(&self, text: &str, context: &str, namespace: &str) -> Vec<ReferenceSpan> {
        let mut spans = Vec::new();
        let mut in_fence = false;
        let mut offset = 0;
        for line in text.split_inclusive('\n') {
            let line_start = offset;
            offset += line.len();
            let trimmed = line.trim_start();
            if trimmed.starts_with("```") || trimmed.starts_with("~~~") {
                in_fence = !in_fence;
                continue;
            }
            if in_fence {
                continue;
            }
            for caps in MENTION.captures_iter(line) {
                let (found, reference) = if let Some(quoted) = caps.name("quoted") {
                    (quoted, self.resolve_in(quoted.as_str(), context, namespace))
                } else if let Some(dotted) = caps.name("dotted") {
                    let reference = self.resolve_in(dotted.as_str(), context, namespace);
                    if reference.is_external() {
                        continue;
                    }
                    (dotted, reference)
                } else if let Some(word) = caps.name("word") {
                    let Some(reference) = self
                        .docs
                        .module(context)
                        .and_then(|module| self.local(module, word.as_str(), namespace))
                    else {
                        continue;
                    };
                    (word, reference)
                } else {
                    continue;
                };
                spans.push(ReferenceSpan {
                    start: line_start + found.start(),
                    end: line_start + found.end(),
                    identifier: found.as_str().to_string(),
                    reference,
                });
            }
        }
        spans
    }

    /// Make `.name` / `..name` absolute against the context module
    fn absolute(&self, identifier: &str, context: &str) -> Option<String> {
        let rest = identifier.trim_start_matches('.');
        let dots = identifier.len() - rest.len();
        let is_package = self.docs.module(context).is_some_and(|m| m.is_package);
        let mut base = if is_package {
            context
        } else {
            context.rsplit_once('.').map(|(parent, _)| parent)?
        };
        for _ in 1..dots {
            base = base.rsplit_once('.').map(|(parent, _)| parent)?;
        }
        Some(if rest.is_empty() {
            base.to_string()
        } else {
            format!("{base}.{rest}")
        })
    }

    /// Look the name up in the enclosing scopes, innermost first
    fn local(&self, module: &Module, identifier: &str, namespace: &str) -> Option<Reference> {
        let mut scopes: Vec<&str> = Vec::new();
        let mut scope = namespace;
        while !scope.is_empty() {
            scopes.push(scope);
            scope = scope.rsplit_once('.').map_or("", |(parent, _)| parent);
        }

        for scope in scopes {
            let Some(Member::Class(class)) = module.find(scope) else {
                continue;
            };
            if let Some(member) = module.find(&format!("{scope}.{identifier}")) {
                return Some(self.member_reference(module, member, &module.name));
            }
            let (head, rest) = match identifier.split_once('.') {
                Some((head, rest)) => (head, Some(rest)),
                None => (identifier, None),
            };
            for (ancestor, names) in &class.inherited {
                if names.iter().any(|n| n == head) {
                    let fullname = match rest {
                        Some(rest) => format!("{ancestor}.{head}.{rest}"),
                        None => format!("{ancestor}.{head}"),
                    };
                    if let Some(reference) = self.global(&fullname, &module.name) {
                        return Some(reference);
                    }
                }
            }
        }

        module
            .find(identifier)
            .map(|member| self.member_reference(module, member, &module.name))
    }

    /// Look up a fully qualified name anywhere in the model
    fn global(&self, fullname: &str, context: &str) -> Option<Reference> {
        match self.docs.find(fullname)? {
            Target::Module(module) => Some(Reference::Module {
                module: module.name.clone(),
                href: relative_link(context, &module.name),
            }),
            Target::Member(module, member) => Some(self.member_reference(module, member, context)),
        }
    }

    fn member_reference(&self, module: &Module, member: &Member, context: &str) -> Reference {
        if let Member::Submodule(submodule) = member {
            if !submodule.placeholder || self.docs.module(&submodule.info.fullname).is_some() {
                return Reference::Module {
                    module: submodule.info.fullname.clone(),
                    href: relative_link(context, &submodule.info.fullname),
                };
            }
        }
        let info = member.info();
        if module.name == context {
            Reference::Local {
                fullname: info.fullname.clone(),
                anchor: info.qualname.clone(),
            }
        } else {
            Reference::CrossPage {
                module: module.name.clone(),
                qualname: info.qualname.clone(),
                href: format!("{}#{}", relative_link(context, &module.name), info.qualname),
            }
        }
    }

    fn external(&self, identifier: &str) -> Reference {
        let qualified = identifier.contains('.') && identifier.split('.').all(is_identifier);
        let url = (self.links.external && qualified).then(|| {
            let parts: Vec<&str> = identifier.split('.').collect();
            // modules are lowercase by convention; the first capitalized part starts the qualname
            let split = parts
                .iter()
                .position(|p| p.starts_with(|c: char| c.is_ascii_uppercase()))
                .filter(|&i| i > 0)
                .unwrap_or(parts.len() - 1);
            self.links
                .external_url
                .replace("{module}", &parts[..split].join("."))
                .replace("{qualname}", &parts[split..].join("."))
                .replace("{identifier}", identifier)
        });
        Reference::External {
            identifier: identifier.to_string(),
            url,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::docstring::Docstring;
    use crate::doc::types::{DocInfo, Function, Binding, Visibility, Class};
    use indexmap::IndexMap;

    fn info(module: &str, qualname: &str) -> DocInfo {
        DocInfo {
            name: qualname.rsplit('.').next().unwrap().to_string(),
            qualname: qualname.to_string(),
            fullname: format!("{module}.{qualname}"),
            module: module.to_string(),
            parent: qualname.rsplit_once('.').map(|(p, _)| p.to_string()),
            visibility: Visibility::Public,
            docstring: Docstring::default(),
            location: None,
            inherited_from: None,
            taken_from: None,
        }
    }

    fn function(module: &str, qualname: &str) -> Member {
        Member::Function(Function {
            info: info(module, qualname),
            params: Vec::new(),
            returns: None,
            is_async: false,
            binding: Binding::Function,
            decorators: Vec::new(),
        })
    }

    fn module(name: &str, is_package: bool, members: Vec<Member>) -> Module {
        Module {
            name: name.to_string(),
            path: None,
            is_package,
            docstring: Docstring::default(),
            flavor: None,
            members: members.into_iter().map(|m| (m.name().to_string(), m)).collect(),
        }
    }

    fn model() -> Documentation {
        let base = Member::Class(Class {
            info: info("pkg.base", "Base"),
            bases: Vec::new(),
            mro: Vec::new(),
            descendants: Vec::new(),
            members: [("run".to_string(), function("pkg.base", "Base.run"))].into_iter().collect(),
            inherited: IndexMap::new(),
            decorators: Vec::new(),
        });
        let child = Member::Class(Class {
            info: info("pkg.mod", "Child"),
            bases: vec!["Base".to_string()],
            mro: Vec::new(),
            descendants: Vec::new(),
            members: [("own".to_string(), function("pkg.mod", "Child.own"))].into_iter().collect(),
            inherited: [("pkg.base.Base".to_string(), vec!["run".to_string()])].into_iter().collect(),
            decorators: Vec::new(),
        });
        let mut docs = Documentation::default();
        docs.insert(module("pkg", true, Vec::new()));
        docs.insert(module("pkg.base", false, vec![base]));
        docs.insert(module("pkg.mod", false, vec![function("pkg.mod", "helper"), child]));
        docs
    }

    #[test]
    fn test_relative_links() {
        assert_eq!(relative_link("pkg.a", "pkg.b"), "b.html");
        assert_eq!(relative_link("pkg", "pkg.b"), "pkg/b.html");
        assert_eq!(relative_link("pkg.sub.a", "pkg.b"), "../b.html");
        assert_eq!(relative_link("pkg.a", "other"), "../other.html");
    }

    #[test]
    fn test_local_before_global() {
        let docs = model();
        let links = LinkConfig::default();
        let resolver = Resolver::new(&docs, &links);
        assert_eq!(
            resolver.resolve_reference("helper()", "pkg.mod"),
            Reference::Local {
                fullname: "pkg.mod.helper".to_string(),
                anchor: "helper".to_string()
            }
        );
        assert_eq!(
            resolver.resolve_reference("pkg.base.Base", "pkg.mod"),
            Reference::CrossPage {
                module: "pkg.base".to_string(),
                qualname: "Base".to_string(),
                href: "base.html#Base".to_string()
            }
        );
        assert_eq!(
            resolver.resolve_reference("pkg.base", "pkg.mod"),
            Reference::Module {
                module: "pkg.base".to_string(),
                href: "base.html".to_string()
            }
        );
    }

    #[test]
    fn test_class_namespace_and_inherited_members() {
        let docs = model();
        let links = LinkConfig::default();
        let resolver = Resolver::new(&docs, &links);
        assert!(matches!(
            resolver.resolve_in("own", "pkg.mod", "Child.own"),
            Reference::Local { anchor, .. } if anchor == "Child.own"
        ));
        assert!(matches!(
            resolver.resolve_in("run", "pkg.mod", "Child"),
            Reference::CrossPage { qualname, .. } if qualname == "Base.run"
        ));
        assert!(resolver.resolve_reference("run", "pkg.mod").is_external());
    }

    #[test]
    fn test_relative_identifiers() {
        let docs = model();
        let links = LinkConfig::default();
        let resolver = Resolver::new(&docs, &links);
        assert!(matches!(
            resolver.resolve_reference(".base.Base", "pkg.mod"),
            Reference::CrossPage { module, .. } if module == "pkg.base"
        ));
        assert!(matches!(
            resolver.resolve_reference(".mod", "pkg"),
            Reference::Module { module, .. } if module == "pkg.mod"
        ));
    }

    #[test]
    fn test_external_urls_are_opt_in() {
        let docs = model();
        let mut links = LinkConfig::default();
        let resolver = Resolver::new(&docs, &links);
        assert_eq!(
            resolver.resolve_reference("collections.OrderedDict", "pkg.mod"),
            Reference::External {
                identifier: "collections.OrderedDict".to_string(),
                url: None
            }
        );
        links.external = true;
        let resolver = Resolver::new(&docs, &links);
        assert_eq!(
            resolver.resolve_reference("collections.OrderedDict", "pkg.mod"),
            Reference::External {
                identifier: "collections.OrderedDict".to_string(),
                url: Some(
                    "https://docs.python.org/3/library/collections.html#collections.OrderedDict".to_string()
                )
            }
        );
        assert!(matches!(
            resolver.resolve_reference("plain", "pkg.mod"),
            Reference::External { url: None, .. }
        ));
    }

    #[test]
    fn test_unresolved_relative_names_get_no_url() {
        let docs = model();
        let links = LinkConfig {
            external: true,
            ..LinkConfig::default()
        };
        let resolver = Resolver::new(&docs, &links);
        for identifier in [".missing", "..nothing", ".base.Missing"] {
            assert_eq!(
                resolver.resolve_reference(identifier, "pkg.mod"),
                Reference::External {
                    identifier: identifier.to_string(),
                    url: None
                }
            );
        }
        assert!(matches!(
            resolver.resolve_reference("os..path", "pkg.mod"),
            Reference::External { url: None, .. }
        ));
    }

    #[test]
    fn test_references_in_text() {
        let docs = model();
        let links = LinkConfig::default();
        let resolver = Resolver::new(&docs, &links);
        let text = "Calls helper and `os.path`.\n```\nhelper\n```\nSee pkg.base.Base, not the other one.";
        let spans = resolver.references_in(text, "pkg.mod", "");
        let found: Vec<&str> = spans.iter().map(|s| s.identifier.as_str()).collect();
        assert_eq!(found, vec!["helper", "os.path", "pkg.base.Base"]);
        assert_eq!(&text[spans[0].start..spans[0].end], "helper");
        assert!(spans[1].reference.is_external());
    }
}
