//! Types of the documentation model

use indexmap::IndexMap;
use serde::Serialize;
use std::path::PathBuf;

use crate::ast::ParamKind;
use crate::docstring::{Docstring, Flavor};

/// Whether a member is part of the public interface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Public,
    Private,
}

/// Where a member is defined
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceLocation {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
    pub first_line: u32,
    pub last_line: u32,
}

/// Information every member carries
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocInfo {
    pub name: String,
    /// Dotted path inside the module, e.g. `Class.method`
    pub qualname: String,
    /// Module name and qualname
    pub fullname: String,
    pub module: String,
    /// Qualname of the owning class
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    pub visibility: Visibility,
    pub docstring: Docstring,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<SourceLocation>,
    /// Fullname of the ancestor member the docstring was taken from
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inherited_from: Option<String>,
    /// Fullname of the original object for re-exported members
    #[serde(skip_serializing_if = "Option::is_none")]
    pub taken_from: Option<String>,
}

/// A documented member: variable, function, class or submodule
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Member {
    Variable(Variable),
    Function(Function),
    Class(Class),
    Submodule(SubmoduleRef),
}

impl Member {
    #[must_use]
    pub fn info(&self) -> &DocInfo {
        match self {
            Self::Variable(v) => &v.info,
            Self::Function(f) => &f.info,
            Self::Class(c) => &c.info,
            Self::Submodule(s) => &s.info,
        }
    }

    pub fn info_mut(&mut self) -> &mut DocInfo {
        match self {
            Self::Variable(v) => &mut v.info,
            Self::Function(f) => &mut f.info,
            Self::Class(c) => &mut c.info,
            Self::Submodule(s) => &mut s.info,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.info().name
    }

    #[must_use]
    pub fn fullname(&self) -> &str {
        &self.info().fullname
    }

    #[must_use]
    pub fn docstring(&self) -> &Docstring {
        &self.info().docstring
    }

    #[must_use]
    pub fn is_public(&self) -> bool {
        self.info().visibility == Visibility::Public
    }

    #[must_use]
    pub fn as_class(&self) -> Option<&Class> {
        match self {
            Self::Class(c) => Some(c),
            _ => None,
        }
    }

    /// Presentation group: variables, functions, classes, submodules
    pub(crate) fn group(&self) -> u8 {
        match self {
            Self::Variable(_) => 0,
            Self::Function(_) => 1,
            Self::Class(_) => 2,
            Self::Submodule(_) => 3,
        }
    }
}

/// Where a variable lives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum VariableScope {
    Module,
    Class,
    /// Assigned on `self` in `__init__` or declared by annotation only
    Instance,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Variable {
    #[serde(flatten)]
    pub info: DocInfo,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub annotation: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
    pub scope: VariableScope,
}

/// How a function is bound
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Binding {
    Function,
    Method,
    StaticMethod,
    ClassMethod,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Parameter {
    pub name: String,
    pub kind: ParamKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub annotation: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
}

impl std::fmt::Display for Parameter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.kind {
            ParamKind::VarPositional => write!(f, "*")?,
            ParamKind::VarKeyword => write!(f, "**")?,
            _ => {}
        }
        write!(f, "{}", self.name)?;
        if let Some(annotation) = &self.annotation {
            write!(f, ": {annotation}")?;
        }
        match (&self.default, &self.annotation) {
            (Some(default), Some(_)) => write!(f, " = {default}"),
            (Some(default), None) => write!(f, "={default}"),
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Function {
    #[serde(flatten)]
    pub info: DocInfo,
    pub params: Vec<Parameter>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub returns: Option<String>,
    pub is_async: bool,
    pub binding: Binding,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub decorators: Vec<String>,
}

impl Function {
    /// Parameters as written, without the bound `self` / `cls`
    #[must_use]
    pub fn signature(&self) -> String {
        let skip = usize::from(matches!(self.binding, Binding::Method | Binding::ClassMethod));
        let params = self.params.iter().skip(skip).collect::<Vec<_>>();
        let mut parts = Vec::new();
        for (i, param) in params.iter().enumerate() {
            let next_kind = params.get(i + 1).map(|p| p.kind);
            let prev_kind = i.checked_sub(1).map(|j| params[j].kind);
            if param.kind == ParamKind::KeywordOnly
                && !matches!(prev_kind, Some(ParamKind::KeywordOnly | ParamKind::VarPositional))
            {
                parts.push("*".to_string());
            }
            parts.push(param.to_string());
            if param.kind == ParamKind::PositionalOnly
                && next_kind != Some(ParamKind::PositionalOnly)
            {
                parts.push("/".to_string());
            }
        }
        let mut signature = format!("({})", parts.join(", "));
        if let Some(returns) = &self.returns {
            signature.push_str(" -> ");
            signature.push_str(returns);
        }
        signature
    }
}

/// One entry of a class's method resolution order
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Ancestor {
    /// Fullname of the class, or the base as written when it could not be found
    pub fullname: String,
    /// Not part of any loaded module
    pub external: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Class {
    #[serde(flatten)]
    pub info: DocInfo,
    /// Base classes as written
    pub bases: Vec<String>,
    /// Method resolution order without the class itself and `object`
    pub mro: Vec<Ancestor>,
    /// Fullnames of classes in the same module that derive from this one
    pub descendants: Vec<String>,
    pub members: IndexMap<String, Member>,
    /// Ancestor fullname to the names it provides that are not overridden
    pub inherited: IndexMap<String, Vec<String>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub decorators: Vec<String>,
}

impl Class {
    fn variables(&self, scope: VariableScope) -> Vec<&Variable> {
        self.members
            .values()
            .filter_map(|m| match m {
                Member::Variable(v) if v.scope == scope => Some(v),
                _ => None,
            })
            .collect()
    }

    fn functions(&self, binding: Binding) -> Vec<&Function> {
        self.members
            .values()
            .filter_map(|m| match m {
                Member::Function(f) if f.binding == binding => Some(f),
                _ => None,
            })
            .collect()
    }

    #[must_use]
    pub fn class_variables(&self) -> Vec<&Variable> {
        self.variables(VariableScope::Class)
    }

    #[must_use]
    pub fn instance_variables(&self) -> Vec<&Variable> {
        self.variables(VariableScope::Instance)
    }

    #[must_use]
    pub fn methods(&self) -> Vec<&Function> {
        self.functions(Binding::Method)
    }

    #[must_use]
    pub fn static_methods(&self) -> Vec<&Function> {
        self.functions(Binding::StaticMethod)
    }

    #[must_use]
    pub fn class_methods(&self) -> Vec<&Function> {
        self.functions(Binding::ClassMethod)
    }

    #[must_use]
    pub fn classes(&self) -> Vec<&Class> {
        self.members.values().filter_map(Member::as_class).collect()
    }

    /// Fullnames in the method resolution order
    pub fn ancestor_names(&self) -> impl Iterator<Item = &str> {
        self.mro.iter().map(|a| a.fullname.as_str())
    }
}

/// Reference to a module documented on its own page
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubmoduleRef {
    #[serde(flatten)]
    pub info: DocInfo,
    /// The module was still being built when referenced; follow `fullname`
    /// to reach it
    pub placeholder: bool,
}

/// A documented module
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Module {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    pub is_package: bool,
    pub docstring: Docstring,
    /// Flavor fixed by configuration or `__docformat__`; `None` when detected per docstring
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flavor: Option<Flavor>,
    pub members: IndexMap<String, Member>,
}

impl Module {
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Member> {
        self.members.get(name)
    }

    /// Look up a dotted qualname such as `Class.method`
    #[must_use]
    pub fn find(&self, qualname: &str) -> Option<&Member> {
        let mut parts = qualname.split('.');
        let mut member = self.members.get(parts.next()?)?;
        for part in parts {
            member = member.as_class()?.members.get(part)?;
        }
        Some(member)
    }

    #[must_use]
    pub fn variables(&self) -> Vec<&Variable> {
        self.members
            .values()
            .filter_map(|m| match m {
                Member::Variable(v) => Some(v),
                _ => None,
            })
            .collect()
    }

    #[must_use]
    pub fn functions(&self) -> Vec<&Function> {
        self.members
            .values()
            .filter_map(|m| match m {
                Member::Function(f) => Some(f),
                _ => None,
            })
            .collect()
    }

    #[must_use]
    pub fn classes(&self) -> Vec<&Class> {
        self.members.values().filter_map(Member::as_class).collect()
    }

    #[must_use]
    pub fn submodules(&self) -> Vec<&SubmoduleRef> {
        self.members
            .values()
            .filter_map(|m| match m {
                Member::Submodule(s) => Some(s),
                _ => None,
            })
            .collect()
    }

    /// Every class of the module, nested ones included, in declaration order
    #[must_use]
    pub fn all_classes(&self) -> Vec<&Class> {
        fn collect<'a>(members: &'a IndexMap<String, Member>, out: &mut Vec<&'a Class>) {
            for class in members.values().filter_map(Member::as_class) {
                out.push(class);
                collect(&class.members, out);
            }
        }
        let mut out = Vec::new();
        collect(&self.members, &mut out);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(name: &str) -> DocInfo {
        DocInfo {
            name: name.to_string(),
            qualname: name.to_string(),
            fullname: format!("demo.{name}"),
            module: "demo".to_string(),
            parent: None,
            visibility: Visibility::Public,
            docstring: Docstring::default(),
            location: None,
            inherited_from: None,
            taken_from: None,
        }
    }

    fn param(name: &str, kind: ParamKind, default: Option<&str>) -> Parameter {
        Parameter {
            name: name.to_string(),
            kind,
            annotation: None,
            default: default.map(str::to_string),
        }
    }

    #[test]
    fn test_signature_markers() {
        let function = Function {
            info: info("f"),
            params: vec![
                param("self", ParamKind::PositionalOrKeyword, None),
                param("a", ParamKind::PositionalOnly, None),
                param("b", ParamKind::PositionalOrKeyword, Some("1")),
                param("c", ParamKind::KeywordOnly, None),
                param("kw", ParamKind::VarKeyword, None),
            ],
            returns: Some("int".to_string()),
            is_async: false,
            binding: Binding::Method,
            decorators: Vec::new(),
        };
        // `self` precedes `a` in real code; skipping it keeps the rest intact
        assert_eq!(function.signature(), "(a, /, b=1, *, c, **kw) -> int");

        let mut annotated = param("x", ParamKind::PositionalOrKeyword, Some("None"));
        annotated.annotation = Some("int | None".to_string());
        assert_eq!(annotated.to_string(), "x: int | None = None");
    }

    #[test]
    fn test_find_nested_members() {
        let mut inner = Class {
            info: info("Inner"),
            bases: Vec::new(),
            mro: Vec::new(),
            descendants: Vec::new(),
            members: IndexMap::new(),
            inherited: IndexMap::new(),
            decorators: Vec::new(),
        };
        inner.members.insert(
            "x".to_string(),
            Member::Variable(Variable {
                info: info("x"),
                annotation: None,
                default: None,
                scope: VariableScope::Class,
            }),
        );
        let mut outer = inner.clone();
        outer.info = info("Outer");
        outer.members.insert("Inner".to_string(), Member::Class(inner));
        let mut module = Module {
            name: "demo".to_string(),
            path: None,
            is_package: false,
            docstring: Docstring::default(),
            flavor: None,
            members: IndexMap::new(),
        };
        module.members.insert("Outer".to_string(), Member::Class(outer));
        assert!(module.find("Outer.Inner.x").is_some());
        assert!(module.find("Outer.missing").is_none());
        assert_eq!(module.all_classes().len(), 2);
        assert_eq!(module.classes()[0].class_variables().len(), 1);
    }
}
