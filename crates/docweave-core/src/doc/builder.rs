//! Building the documentation model from reflected modules
//!
//! A module is documented member by member. Docstrings come from explicit
//! markers, the syntax tree, reflection and finally inherited ancestors, in
//! that order of precedence. Failures below the module level are reported as
//! warnings and only drop the member concerned.

use indexmap::IndexMap;
use std::collections::HashSet;
use std::rc::Rc;
use thiserror::Error;

use crate::diagnostics::WarningKind;
use crate::docstring::{Docstring, Flavor, Marker};
use crate::loader::LoadError;
use crate::reflect::{
    ReflectedClass, ReflectedFunction, ReflectedMember, ReflectedValue, ValueRepr, MODULE_METADATA,
};

use super::extractor::AstInfo;
use super::hierarchy::{find_reflected, ClassRef, MAX_IMPORT_HOPS};
use super::project::Documentation;
use super::session::{Session, Source};
use super::types::{
    Ancestor, Binding, Class, DocInfo, Function, Member, Module, Parameter, SourceLocation,
    SubmoduleRef, Variable, VariableScope, Visibility,
};

#[derive(Error, Debug)]
enum MemberError {
    #[error("cannot resolve re-exported name '{0}'")]
    Unresolved(String),

    #[error("cannot load the origin of '{target}'")]
    Load {
        target: String,
        #[source]
        source: LoadError,
    },
}

/// Where a member is defined and where it is documented
#[derive(Clone, Copy)]
struct Site<'a> {
    source: &'a Source,
    /// Class path of the definition inside its own module
    scope: &'a str,
    /// Module the member is documented in
    module: &'a str,
    /// Qualname of the documenting class
    parent: Option<&'a str>,
}

impl Site<'_> {
    fn qualname(&self, name: &str) -> String {
        match self.parent {
            Some(parent) => format!("{parent}.{name}"),
            None => name.to_string(),
        }
    }
}

/// A re-exported object found in its defining module
struct Origin {
    source: Source,
    scope: String,
    member: ReflectedMember,
}

fn join(scope: &str, name: &str) -> String {
    if scope.is_empty() {
        name.to_string()
    } else {
        format!("{scope}.{name}")
    }
}

fn visibility(name: &str, marker: Option<Marker>, all: Option<&[String]>) -> Visibility {
    match marker {
        Some(Marker::Private) => return Visibility::Private,
        Some(Marker::Public) => return Visibility::Public,
        None => {}
    }
    if let Some(all) = all {
        return if all.iter().any(|n| n == name) {
            Visibility::Public
        } else {
            Visibility::Private
        };
    }
    if name.starts_with('_') && name != "__init__" {
        Visibility::Private
    } else {
        Visibility::Public
    }
}

/// `@staticmethod`, `@abc.staticmethod` and `@staticmethod()` all count
fn has_decorator(decorators: &[String], name: &str) -> bool {
    decorators.iter().any(|d| {
        let head = d.split('(').next().unwrap_or(d).trim();
        head == name || head.ends_with(&format!(".{name}"))
    })
}

fn binding(function: &ReflectedFunction, in_class: bool) -> Binding {
    if !in_class {
        Binding::Function
    } else if has_decorator(&function.decorators, "staticmethod") {
        Binding::StaticMethod
    } else if has_decorator(&function.decorators, "classmethod") {
        Binding::ClassMethod
    } else {
        Binding::Method
    }
}

impl Session {
    /// Document `name` and, recursively, its submodules into `docs`
    ///
    /// `in_progress` holds the modules currently being built; a submodule
    /// found there is referenced by a placeholder instead of being rebuilt.
    pub(crate) fn build_module(
        &mut self,
        name: &str,
        in_progress: &mut Vec<String>,
        docs: &mut Documentation,
    ) -> Result<(), LoadError> {
        if docs.module(name).is_some() {
            return Ok(());
        }
        let source = self.source(name)?;
        tracing::debug!(target: "docweave", module = name, "documenting module");
        in_progress.push(name.to_string());
        let mut module = self.document_module(&source, in_progress, docs);
        in_progress.pop();
        self.apply_stub(&mut module);
        tracing::debug!(target: "docweave", module = name, members = module.members.len(), "module documented");
        docs.insert(module);
        Ok(())
    }

    fn document_module(
        &mut self,
        source: &Source,
        in_progress: &mut Vec<String>,
        docs: &mut Documentation,
    ) -> Module {
        let reflected = Rc::clone(&source.module);
        let name = reflected.name.as_str();
        let all = reflected.all.as_deref();
        let site = Site {
            source,
            scope: "",
            module: name,
            parent: None,
        };

        let mut members = Vec::new();
        for rm in &reflected.members {
            let result = match &rm.value {
                ReflectedValue::Module { target } | ReflectedValue::Import { target } => {
                    self.imported_member(site, rm, target, in_progress, docs)
                }
                _ => Ok(self.document_member(site, rm, &rm.name)),
            };
            match result {
                Ok(Some(member)) => members.push(member),
                Ok(None) => {}
                Err(e) => self.diagnostics_mut().warn(WarningKind::Import, name, e.to_string()),
            }
        }

        // annotated but never assigned
        let ast = Rc::clone(&source.ast);
        for var in ast.names_in("") {
            if MODULE_METADATA.contains(&var) || find_reflected(&reflected.members, var).is_some() {
                continue;
            }
            members.push(Self::ast_variable(site, var, VariableScope::Module));
        }

        let include_private = self.config().build.include_private;
        for child in &reflected.submodules {
            if members.iter().any(|m| m.name() == child) {
                continue;
            }
            let wanted = match all {
                Some(all) => all.contains(child),
                None => !child.starts_with('_') || include_private,
            };
            if !wanted {
                continue;
            }
            let target = format!("{name}.{child}");
            if let Some(member) = self.submodule_member(name, child, &target, in_progress, docs) {
                members.push(member);
            }
        }

        if let Some(all) = all {
            for entry in all {
                if !members.iter().any(|m| m.name() == entry) {
                    self.diagnostics_mut().warn(
                        WarningKind::Resolution,
                        name,
                        format!("'{entry}' is listed in __all__ but not defined"),
                    );
                }
            }
        }

        let mut members = self.finish_members(members, all, &ast, "");
        link_descendants(&mut members);
        Module {
            name: name.to_string(),
            path: source.path.clone(),
            is_package: reflected.is_package,
            docstring: Docstring::new(reflected.docstring.as_deref().unwrap_or(""), source.flavor),
            flavor: source.flavor,
            members,
        }
    }

    /// A name bound by an import: a submodule, a re-export or nothing
    fn imported_member(
        &mut self,
        site: Site<'_>,
        rm: &ReflectedMember,
        target: &str,
        in_progress: &mut Vec<String>,
        docs: &mut Documentation,
    ) -> Result<Option<Member>, MemberError> {
        let listed = site.source.module.all.as_ref().is_some_and(|all| all.contains(&rm.name));
        if self.is_module(target) {
            let is_child = target
                .strip_prefix(site.module)
                .is_some_and(|rest| rest.starts_with('.'));
            if is_child || listed {
                return Ok(self.submodule_member(site.module, &rm.name, target, in_progress, docs));
            }
            return Ok(None);
        }
        if !listed {
            return Ok(None);
        }
        let origin = self.locate(target, 0)?;
        let origin_site = Site {
            source: &origin.source,
            scope: &origin.scope,
            module: site.module,
            parent: None,
        };
        let mut member = self
            .document_member(origin_site, &origin.member, &rm.name)
            .ok_or_else(|| MemberError::Unresolved(target.to_string()))?;
        member.info_mut().taken_from = Some(format!(
            "{}.{}",
            origin.source.module.name,
            join(&origin.scope, &origin.member.name)
        ));
        Ok(Some(member))
    }

    /// Find the definition behind a re-exported fullname
    fn locate(&mut self, target: &str, hops: usize) -> Result<Origin, MemberError> {
        let unresolved = || MemberError::Unresolved(target.to_string());
        if hops > MAX_IMPORT_HOPS {
            return Err(unresolved());
        }
        let parts: Vec<&str> = target.split('.').collect();
        for split in (1..parts.len()).rev() {
            let module_name = parts[..split].join(".");
            if !self.is_module(&module_name) {
                continue;
            }
            let source = self.source(&module_name).map_err(|source| MemberError::Load {
                target: target.to_string(),
                source,
            })?;
            let module = Rc::clone(&source.module);
            let path = &parts[split..];
            let mut members = module.members.as_slice();
            for (i, part) in path.iter().enumerate() {
                let member = find_reflected(members, part).ok_or_else(unresolved)?;
                match &member.value {
                    ReflectedValue::Import { target } | ReflectedValue::Module { target } => {
                        let mut next = target.clone();
                        for rest in &path[i + 1..] {
                            next.push('.');
                            next.push_str(rest);
                        }
                        return self.locate(&next, hops + 1);
                    }
                    _ if i + 1 == path.len() => {
                        return Ok(Origin {
                            scope: path[..i].join("."),
                            member: member.clone(),
                            source,
                        });
                    }
                    ReflectedValue::Class(class) => members = &class.members,
                    _ => return Err(unresolved()),
                }
            }
        }
        Err(unresolved())
    }

    /// Reference a submodule, building it unless it is already in progress
    fn submodule_member(
        &mut self,
        module: &str,
        name: &str,
        target: &str,
        in_progress: &mut Vec<String>,
        docs: &mut Documentation,
    ) -> Option<Member> {
        if self.is_excluded(target) {
            return None;
        }
        let placeholder = in_progress.iter().any(|m| m == target);
        if placeholder {
            tracing::debug!(target: "docweave", module, submodule = target, "circular import, using placeholder");
        } else if let Err(e) = self.build_module(target, in_progress, docs) {
            self.diagnostics_mut().warn(
                WarningKind::Import,
                module,
                format!("cannot document submodule {target}: {e}"),
            );
            return None;
        }
        let docstring = match docs.module(target) {
            Some(built) => built.docstring.clone(),
            None => match self.reflect(target) {
                Ok(reflected) => Docstring::new(
                    reflected.docstring.as_deref().unwrap_or(""),
                    self.module_flavor(&reflected),
                ),
                Err(_) => Docstring::default(),
            },
        };
        Some(Member::Submodule(SubmoduleRef {
            info: DocInfo {
                name: name.to_string(),
                qualname: name.to_string(),
                fullname: target.to_string(),
                module: module.to_string(),
                parent: None,
                visibility: Visibility::Public,
                docstring,
                location: None,
                inherited_from: None,
                taken_from: None,
            },
            placeholder,
        }))
    }

    fn doc_info(site: Site<'_>, name: &str, raw: Option<&str>, lines: Option<(u32, u32)>) -> DocInfo {
        let qualname = site.qualname(name);
        DocInfo {
            name: name.to_string(),
            fullname: format!("{}.{qualname}", site.module),
            qualname,
            module: site.module.to_string(),
            parent: site.parent.map(str::to_string),
            visibility: Visibility::Public,
            docstring: Docstring::new(raw.unwrap_or(""), site.source.flavor),
            location: lines.map(|(first_line, last_line)| SourceLocation {
                file: site.source.path.clone(),
                first_line,
                last_line,
            }),
            inherited_from: None,
            taken_from: None,
        }
    }

    /// Document one reflected member under `name`
    ///
    /// Import bindings are not members by themselves and yield `None`.
    fn document_member(&mut self, site: Site<'_>, rm: &ReflectedMember, name: &str) -> Option<Member> {
        let ast = &site.source.ast;
        let in_class = site.parent.is_some();
        let member = match &rm.value {
            ReflectedValue::Variable {
                annotation,
                value,
                docstring,
            } => {
                let raw = ast
                    .var_docstring(site.scope, &rm.name)
                    .or(docstring.as_deref());
                let annotation = annotation.clone().or_else(|| {
                    ast.annotation(site.scope, &rm.name)
                        .flatten()
                        .map(str::to_string)
                });
                let default = self.represent(site, name, value.as_ref());
                Member::Variable(Variable {
                    info: Self::doc_info(site, name, raw, rm.lines),
                    annotation,
                    default,
                    scope: if in_class {
                        VariableScope::Class
                    } else {
                        VariableScope::Module
                    },
                })
            }
            ReflectedValue::Property(getter) => {
                let raw = getter
                    .docstring
                    .as_deref()
                    .or_else(|| ast.func_docstring(site.scope, &rm.name));
                Member::Variable(Variable {
                    info: Self::doc_info(site, name, raw, rm.lines),
                    annotation: getter.returns.clone(),
                    default: None,
                    scope: VariableScope::Instance,
                })
            }
            ReflectedValue::Function(function) => {
                Member::Function(self.function(site, rm, name, function, in_class))
            }
            ReflectedValue::Class(class) => Member::Class(self.class(site, rm, name, class)),
            ReflectedValue::Module { .. } | ReflectedValue::Import { .. } => return None,
        };
        Some(member)
    }

    /// Text of a default value; failures are reported and leave it empty
    fn represent(&mut self, site: Site<'_>, name: &str, value: Option<&ValueRepr>) -> Option<String> {
        match value? {
            ValueRepr::Text(text) => Some(text.clone()),
            ValueRepr::Unrepresentable(reason) => {
                self.diagnostics_mut().warn(
                    WarningKind::Representation,
                    site.module,
                    format!("cannot represent the value of {}: {reason}", site.qualname(name)),
                );
                None
            }
        }
    }

    fn function(
        &mut self,
        site: Site<'_>,
        rm: &ReflectedMember,
        name: &str,
        function: &ReflectedFunction,
        in_class: bool,
    ) -> Function {
        let raw = function
            .docstring
            .as_deref()
            .or_else(|| site.source.ast.func_docstring(site.scope, &rm.name));
        let info = Self::doc_info(site, name, raw, rm.lines);
        let params = function
            .params
            .iter()
            .map(|param| Parameter {
                name: param.name.clone(),
                kind: param.kind,
                annotation: param.annotation.clone(),
                default: self.represent(site, &format!("{name}({})", param.name), param.default.as_ref()),
            })
            .collect();
        Function {
            info,
            params,
            returns: function.returns.clone(),
            is_async: function.is_async,
            binding: binding(function, in_class),
            decorators: function.decorators.clone(),
        }
    }

    fn class(&mut self, site: Site<'_>, rm: &ReflectedMember, name: &str, class: &ReflectedClass) -> Class {
        let info = Self::doc_info(site, name, class.docstring.as_deref(), rm.lines);
        let scope = join(site.scope, &rm.name);
        let inner = Site {
            source: site.source,
            scope: &scope,
            module: site.module,
            parent: Some(info.qualname.as_str()),
        };

        let mut members = Vec::new();
        for member in &class.members {
            if let Some(member) = self.document_member(inner, member, &member.name) {
                members.push(member);
            }
        }
        let ast = Rc::clone(&site.source.ast);
        for var in ast.names_in(&scope) {
            if find_reflected(&class.members, var).is_none() {
                members.push(Self::ast_variable(inner, var, VariableScope::Instance));
            }
        }

        let mro = self.class_mro(ClassRef {
            module: site.source.module.name.clone(),
            qualname: scope.clone(),
            class: class.clone(),
        });
        self.inherit_docstrings(&mut members, &mro);
        let inherited = self.inherited_names(&members, &mro);
        let members = self.finish_members(members, None, &ast, &scope);

        Class {
            bases: class.bases.clone(),
            mro,
            descendants: Vec::new(),
            members,
            inherited,
            decorators: class.decorators.clone(),
            info,
        }
    }

    /// A variable known only from the syntax tree
    fn ast_variable(site: Site<'_>, name: &str, scope: VariableScope) -> Member {
        let ast = &site.source.ast;
        let lines = ast.declaration_line(site.scope, name).map(|line| (line, line));
        Member::Variable(Variable {
            info: Self::doc_info(site, name, ast.var_docstring(site.scope, name), lines),
            annotation: ast.annotation(site.scope, name).flatten().map(str::to_string),
            default: None,
            scope,
        })
    }

    /// Fill empty docstrings from the nearest ancestor that documents the name
    fn inherit_docstrings(&mut self, members: &mut [Member], mro: &[Ancestor]) {
        for member in members.iter_mut() {
            if !member.docstring().is_empty() {
                continue;
            }
            let name = member.name().to_string();
            for ancestor in mro.iter().filter(|a| !a.external) {
                if let Some((raw, flavor)) = self.ancestor_docstring(&ancestor.fullname, &name) {
                    let info = member.info_mut();
                    info.docstring = Docstring::new(&raw, flavor);
                    info.inherited_from = Some(format!("{}.{name}", ancestor.fullname));
                    break;
                }
            }
        }
    }

    fn ancestor_docstring(&mut self, class: &str, name: &str) -> Option<(String, Option<Flavor>)> {
        let class = self.find_class(class)?;
        let source = self.source(&class.module).ok()?;
        let ast = &source.ast;
        let scope = class.qualname.as_str();
        let raw = match find_reflected(&class.class.members, name).map(|m| &m.value) {
            Some(ReflectedValue::Variable { docstring, .. }) => ast
                .var_docstring(scope, name)
                .map(str::to_string)
                .or_else(|| docstring.clone()),
            Some(ReflectedValue::Function(f) | ReflectedValue::Property(f)) => f
                .docstring
                .clone()
                .or_else(|| ast.func_docstring(scope, name).map(str::to_string)),
            Some(ReflectedValue::Class(c)) => c.docstring.clone(),
            Some(ReflectedValue::Module { .. } | ReflectedValue::Import { .. }) => None,
            None => ast.var_docstring(scope, name).map(str::to_string),
        }?;
        (!raw.trim().is_empty()).then_some((raw, source.flavor))
    }

    /// Public names each ancestor contributes that the class does not define
    fn inherited_names(&mut self, members: &[Member], mro: &[Ancestor]) -> IndexMap<String, Vec<String>> {
        let mut seen: HashSet<String> = members.iter().map(|m| m.name().to_string()).collect();
        let include_private = self.config().build.include_private;
        let mut inherited = IndexMap::new();
        for ancestor in mro.iter().filter(|a| !a.external) {
            let Some(class) = self.find_class(&ancestor.fullname) else {
                continue;
            };
            let mut names: Vec<String> = class
                .class
                .members
                .iter()
                .filter(|m| !matches!(m.value, ReflectedValue::Module { .. } | ReflectedValue::Import { .. }))
                .map(|m| m.name.clone())
                .collect();
            if let Ok(source) = self.source(&class.module) {
                names.extend(source.ast.names_in(&class.qualname).map(str::to_string));
            }
            names.retain(|n| (include_private || !n.starts_with('_')) && seen.insert(n.clone()));
            if !names.is_empty() {
                inherited.insert(ancestor.fullname.clone(), names);
            }
        }
        inherited
    }

    /// Apply visibility, drop private members and order the rest
    ///
    /// Order: position in `__all__`, then variables, functions, classes and
    /// submodules, `__init__` first among functions, then declaration order.
    fn finish_members(
        &self,
        members: Vec<Member>,
        all: Option<&[String]>,
        ast: &AstInfo,
        scope: &str,
    ) -> IndexMap<String, Member> {
        let include_private = self.config().build.include_private;
        let mut kept: Vec<Member> = members
            .into_iter()
            .filter_map(|mut member| {
                let vis = visibility(member.name(), member.docstring().marker, all);
                member.info_mut().visibility = vis;
                (vis == Visibility::Public || include_private).then_some(member)
            })
            .collect();
        kept.sort_by_key(|member| {
            let listed = all
                .and_then(|all| all.iter().position(|n| n == member.name()))
                .unwrap_or(usize::MAX);
            let line = ast
                .declaration_line(scope, member.name())
                .or_else(|| member.info().location.as_ref().map(|l| l.first_line))
                .unwrap_or(u32::MAX);
            (listed, member.group(), member.name() != "__init__", line)
        });
        kept.into_iter()
            .map(|member| (member.name().to_string(), member))
            .collect()
    }
}

/// Fill `descendants` of every class defined in the module
fn link_descendants(members: &mut IndexMap<String, Member>) {
    fn collect(members: &IndexMap<String, Member>, out: &mut Vec<(String, Vec<String>)>) {
        for member in members.values() {
            if let Member::Class(class) = member {
                if class.info.taken_from.is_none() {
                    let ancestors = class.mro.iter().map(|a| a.fullname.clone()).collect();
                    out.push((class.info.fullname.clone(), ancestors));
                }
                collect(&class.members, out);
            }
        }
    }
    fn assign(members: &mut IndexMap<String, Member>, classes: &[(String, Vec<String>)]) {
        for member in members.values_mut() {
            if let Member::Class(class) = member {
                class.descendants = classes
                    .iter()
                    .filter(|(_, ancestors)| ancestors.contains(&class.info.fullname))
                    .map(|(name, _)| name.clone())
                    .collect();
                assign(&mut class.members, classes);
            }
        }
    }
    let mut classes = Vec::new();
    collect(members, &mut classes);
    assign(members, &classes);
}
