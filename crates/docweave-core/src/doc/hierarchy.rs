//! Resolving base classes across modules
//!
//! Bases are written as expressions in the defining module (`Base`,
//! `mod.Base`, `Generic[T]`). They are resolved through that module's
//! bindings to a fullname, then looked up in the reflected modules of the
//! session. Anything that cannot be found stays an opaque external ancestor.

use std::collections::{HashSet, VecDeque};

use crate::diagnostics::WarningKind;
use crate::reflect::{ReflectedClass, ReflectedMember, ReflectedModule, ReflectedValue};

use super::mro::{self, BaseGraph};
use super::session::Session;
use super::types::Ancestor;

/// Re-exports followed before giving up on a name
pub(crate) const MAX_IMPORT_HOPS: usize = 8;

/// A class found in a reflected module
#[derive(Debug, Clone)]
pub(crate) struct ClassRef {
    pub module: String,
    pub qualname: String,
    pub class: ReflectedClass,
}

impl ClassRef {
    pub fn fullname(&self) -> String {
        format!("{}.{}", self.module, self.qualname)
    }
}

pub(crate) fn find_reflected<'a>(members: &'a [ReflectedMember], name: &str) -> Option<&'a ReflectedMember> {
    members.iter().find(|m| m.name == name)
}

/// The class named by a dotted path below `members`
fn nested_class<'a>(members: &'a [ReflectedMember], path: &[&str]) -> Option<&'a ReflectedClass> {
    let (first, rest) = path.split_first()?;
    match &find_reflected(members, first)?.value {
        ReflectedValue::Class(class) if rest.is_empty() => Some(class),
        ReflectedValue::Class(class) => nested_class(&class.members, rest),
        _ => None,
    }
}

impl Session {
    /// Resolve a name written in `module` (inside class scope `scope`) to a fullname
    ///
    /// Unresolvable names are returned as written, minus generic arguments.
    pub(crate) fn resolve_written(module: &ReflectedModule, scope: &str, written: &str) -> String {
        let name = written.split('[').next().unwrap_or(written).trim();
        let (head, rest) = match name.split_once('.') {
            Some((head, rest)) => (head, Some(rest)),
            None => (name, None),
        };
        let with_rest = |base: String| match rest {
            Some(rest) => format!("{base}.{rest}"),
            None => base,
        };

        // enclosing class bodies, innermost first
        let scopes: Vec<&str> = if scope.is_empty() { Vec::new() } else { scope.split('.').collect() };
        for depth in (1..=scopes.len()).rev() {
            let path = &scopes[..depth];
            if let Some(class) = nested_class(&module.members, path) {
                if let Some(ReflectedMember {
                    value: ReflectedValue::Class(_),
                    ..
                }) = find_reflected(&class.members, head)
                {
                    return with_rest(format!("{}.{}.{head}", module.name, path.join(".")));
                }
            }
        }

        match find_reflected(&module.members, head).map(|m| &m.value) {
            Some(ReflectedValue::Import { target } | ReflectedValue::Module { target }) => {
                with_rest(target.clone())
            }
            Some(_) => with_rest(format!("{}.{head}", module.name)),
            None => name.to_string(),
        }
    }

    /// Resolve a base of `class` as written in its module
    ///
    /// Bases are evaluated before the class name is bound, so a base naming
    /// the class itself refers to whatever the name was bound to before.
    pub(crate) fn resolve_base(module: &ReflectedModule, class: &ClassRef, written: &str) -> String {
        let (scope, own) = class.qualname.rsplit_once('.').unwrap_or(("", &class.qualname));
        let name = written.split('[').next().unwrap_or(written).trim();
        let (head, rest) = match name.split_once('.') {
            Some((head, rest)) => (head, Some(rest)),
            None => (name, None),
        };
        if head != own {
            return Self::resolve_written(module, scope, written);
        }
        match (&class.class.shadows, rest) {
            (Some(target), Some(rest)) => format!("{target}.{rest}"),
            (Some(target), None) => target.clone(),
            (None, _) => name.to_string(),
        }
    }

    /// Find a class by fullname, following re-exports
    pub(crate) fn find_class(&mut self, fullname: &str) -> Option<ClassRef> {
        self.find_class_inner(fullname, 0)
    }

    fn find_class_inner(&mut self, fullname: &str, hops: usize) -> Option<ClassRef> {
        if hops > MAX_IMPORT_HOPS {
            return None;
        }
        let parts: Vec<&str> = fullname.split('.').collect();
        for split in (1..parts.len()).rev() {
            let module_name = parts[..split].join(".");
            if !self.is_module(&module_name) {
                continue;
            }
            let module = self.reflect(&module_name).ok()?;
            let path = &parts[split..];
            // walk into nested classes; an import along the way restarts the search
            let mut members = module.members.as_slice();
            for (i, part) in path.iter().enumerate() {
                let member = find_reflected(members, part)?;
                match &member.value {
                    ReflectedValue::Class(class) if i + 1 == path.len() => {
                        return Some(ClassRef {
                            module: module_name,
                            qualname: path.join("."),
                            class: class.clone(),
                        });
                    }
                    ReflectedValue::Class(class) => members = &class.members,
                    ReflectedValue::Import { target } | ReflectedValue::Module { target } => {
                        let mut next = target.clone();
                        for rest in &path[i + 1..] {
                            next.push('.');
                            next.push_str(rest);
                        }
                        return self.find_class_inner(&next, hops + 1);
                    }
                    _ => return None,
                }
            }
            return None;
        }
        None
    }

    /// Base classes of every class reachable from `start`, and the external ones
    fn base_graph(&mut self, start: ClassRef) -> (BaseGraph, HashSet<String>) {
        let mut graph = BaseGraph::new();
        let mut external = HashSet::new();
        let mut queue = VecDeque::from([start]);
        while let Some(class) = queue.pop_front() {
            let fullname = class.fullname();
            if graph.contains_key(&fullname) {
                continue;
            }
            let Ok(module) = self.reflect(&class.module) else {
                graph.insert(fullname, Vec::new());
                continue;
            };
            let mut bases = Vec::new();
            for written in &class.class.bases {
                let resolved = Self::resolve_base(&module, &class, written);
                if resolved == "object" || resolved == "builtins.object" {
                    continue;
                }
                match self.find_class(&resolved) {
                    Some(base) => {
                        bases.push(base.fullname());
                        queue.push_back(base);
                    }
                    None => {
                        external.insert(resolved.clone());
                        bases.push(resolved);
                    }
                }
            }
            graph.insert(fullname, bases);
        }
        (graph, external)
    }

    /// Method resolution order of a class, without the class itself
    ///
    /// An inconsistent hierarchy is reported and falls back to depth-first order.
    pub(crate) fn class_mro(&mut self, start: ClassRef) -> Vec<Ancestor> {
        let fullname = start.fullname();
        let module = start.module.clone();
        let (graph, external) = self.base_graph(start);
        let order = match mro::linearize(&fullname, &graph) {
            Ok(order) => order,
            Err(e) => {
                self.diagnostics_mut().warn(WarningKind::Mro, module, e.to_string());
                mro::depth_first(&fullname, &graph)
            }
        };
        order
            .into_iter()
            .skip(1)
            .map(|name| Ancestor {
                external: external.contains(&name),
                fullname: name,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::Parser;
    use crate::reflect::reflect_source;

    fn reflect(name: &str, source: &str) -> ReflectedModule {
        let module = Parser::parse_module(source).unwrap();
        reflect_source(name, source, &module, false)
    }

    #[test]
    fn test_resolve_written_names() {
        let module = reflect(
            "demo",
            "import abc\nfrom pkg.base import Base as B\nclass Local: pass\nclass Outer:\n    class Inner: pass\n",
        );
        assert_eq!(Session::resolve_written(&module, "", "Local"), "demo.Local");
        assert_eq!(Session::resolve_written(&module, "", "B[int]"), "pkg.base.Base");
        assert_eq!(Session::resolve_written(&module, "", "abc.ABC"), "abc.ABC");
        assert_eq!(Session::resolve_written(&module, "Outer", "Inner"), "demo.Outer.Inner");
        assert_eq!(Session::resolve_written(&module, "", "Exception"), "Exception");
    }

    #[test]
    fn test_base_named_like_the_class_uses_the_earlier_binding() {
        let module = reflect(
            "demo",
            "from pkg.base import Foo\nimport other as Mod\nclass Foo(Foo): pass\nclass Mod(Mod.Base): pass\nclass Bar(Bar): pass\n",
        );
        let class_ref = |qualname: &str| {
            let Some(ReflectedValue::Class(class)) = find_reflected(&module.members, qualname).map(|m| &m.value) else {
                panic!("expected class {qualname}");
            };
            ClassRef {
                module: "demo".to_string(),
                qualname: qualname.to_string(),
                class: class.clone(),
            }
        };
        assert_eq!(Session::resolve_base(&module, &class_ref("Foo"), "Foo"), "pkg.base.Foo");
        assert_eq!(Session::resolve_base(&module, &class_ref("Mod"), "Mod.Base"), "other.Base");
        assert_eq!(Session::resolve_base(&module, &class_ref("Bar"), "Bar"), "Bar");
    }
}
