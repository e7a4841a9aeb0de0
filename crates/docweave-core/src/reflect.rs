//! The reflected view of a module
//!
//! [`ReflectedModule`] is what the model builder consumes: the names a module
//! binds, in binding order, with what each name is bound to. It is produced
//! either statically from source ([`reflect_source`]) or deserialized from a
//! JSON dump written by an external process that imported the module.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::ast::{ClassDef, Expr, FunctionDef, Module, ParamKind, Spanned, Stmt, StmtKind};
use crate::lexer::LineIndex;

/// Names that describe the module rather than belong to it
pub(crate) const MODULE_METADATA: &[&str] = &["__all__", "__docformat__", "__doc__"];

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ReflectedModule {
    pub name: String,
    #[serde(default)]
    pub docstring: Option<String>,
    /// Contents of `__all__`, if the module defines it as a list of strings
    #[serde(default)]
    pub all: Option<Vec<String>>,
    /// Value of `__docformat__`
    #[serde(default)]
    pub docformat: Option<String>,
    #[serde(default)]
    pub members: Vec<ReflectedMember>,
    /// Module source, used for AST docstrings
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub is_package: bool,
    /// Unqualified names of the direct child modules of a package
    #[serde(default)]
    pub submodules: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReflectedMember {
    pub name: String,
    /// First and last source line of the definition
    #[serde(default)]
    pub lines: Option<(u32, u32)>,
    pub value: ReflectedValue,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReflectedValue {
    Function(ReflectedFunction),
    /// A property; the getter carries docstring and return annotation
    Property(ReflectedFunction),
    Class(ReflectedClass),
    Variable {
        #[serde(default)]
        annotation: Option<String>,
        #[serde(default)]
        value: Option<ValueRepr>,
        /// Docstring attached to the value itself, e.g. by a descriptor
        #[serde(default)]
        docstring: Option<String>,
    },
    /// `import target` / `import target as name`
    Module { target: String },
    /// `from module import name`: `target` is `module.name`
    Import { target: String },
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ReflectedFunction {
    #[serde(default)]
    pub docstring: Option<String>,
    #[serde(default)]
    pub params: Vec<ReflectedParam>,
    #[serde(default)]
    pub returns: Option<String>,
    #[serde(default)]
    pub is_async: bool,
    /// Decorator expressions without the `@`
    #[serde(default)]
    pub decorators: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReflectedParam {
    pub name: String,
    pub kind: ParamKind,
    #[serde(default)]
    pub annotation: Option<String>,
    #[serde(default)]
    pub default: Option<ValueRepr>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ReflectedClass {
    #[serde(default)]
    pub docstring: Option<String>,
    /// Base class expressions as written
    #[serde(default)]
    pub bases: Vec<String>,
    #[serde(default)]
    pub members: Vec<ReflectedMember>,
    #[serde(default)]
    pub decorators: Vec<String>,
    /// Import target the class name was bound to before the `class` statement
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shadows: Option<String>,
}

/// Text representation of a value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueRepr {
    Text(String),
    /// Rendering failed; holds the reason
    Unrepresentable(String),
}

/// Reflect a parsed module without executing it
///
/// `name` is the module's dotted name; it anchors relative imports.
#[must_use]
pub fn reflect_source(name: &str, source: &str, module: &Module, is_package: bool) -> ReflectedModule {
    let package = if is_package {
        name.to_string()
    } else {
        name.rsplit_once('.').map(|(parent, _)| parent.to_string()).unwrap_or_default()
    };
    let reflector = Reflector {
        source,
        lines: LineIndex::new(source),
        package,
    };
    let mut scope = Scope::default();
    reflector.walk(&module.body, &mut scope, false);
    ReflectedModule {
        name: name.to_string(),
        docstring: module.docstring().map(str::to_string),
        all: scope.all,
        docformat: scope.docformat,
        members: scope.members.into_values().collect(),
        source: Some(source.to_string()),
        is_package,
        submodules: Vec::new(),
    }
}

#[derive(Default)]
struct Scope {
    members: IndexMap<String, ReflectedMember>,
    all: Option<Vec<String>>,
    docformat: Option<String>,
}

struct Reflector<'a> {
    source: &'a str,
    lines: LineIndex,
    package: String,
}

impl Reflector<'_> {
    /// Bind the names of `body`; with `fill_only`, existing bindings are kept
    fn walk(&self, body: &[Stmt], scope: &mut Scope, fill_only: bool) {
        for stmt in body {
            self.statement(stmt, scope, fill_only);
        }
    }

    fn bind(&self, scope: &mut Scope, fill_only: bool, name: &str, stmt: &Stmt, value: ReflectedValue) {
        if fill_only && scope.members.contains_key(name) {
            return;
        }
        scope.members.insert(
            name.to_string(),
            ReflectedMember {
                name: name.to_string(),
                lines: Some(self.lines.line_range(stmt.span)),
                value,
            },
        );
    }

    fn statement(&self, stmt: &Stmt, scope: &mut Scope, fill_only: bool) {
        match &stmt.kind {
            StmtKind::FunctionDef(def) => {
                let is_accessor = def.decorators.iter().any(|d| {
                    d.dotted_name()
                        .is_some_and(|n| n.ends_with(".setter") || n.ends_with(".deleter"))
                });
                if is_accessor && scope.members.contains_key(&def.name.name) {
                    return;
                }
                let function = self.function(def);
                let value = if def.has_decorator("property") || def.has_decorator("cached_property") {
                    ReflectedValue::Property(function)
                } else {
                    ReflectedValue::Function(function)
                };
                self.bind(scope, fill_only, &def.name.name, stmt, value);
            }
            StmtKind::ClassDef(def) => {
                let mut class = self.class(def);
                class.shadows = match scope.members.get(&def.name.name).map(|m| &m.value) {
                    Some(ReflectedValue::Import { target } | ReflectedValue::Module { target }) => {
                        Some(target.clone())
                    }
                    _ => None,
                };
                let value = ReflectedValue::Class(class);
                self.bind(scope, fill_only, &def.name.name, stmt, value);
            }
            StmtKind::Assign { targets, value } => {
                for target in targets {
                    for name in target.target_names() {
                        match name {
                            "__all__" => scope.all = value.string_items(),
                            "__docformat__" => scope.docformat = value.as_str().map(str::to_string),
                            _ => {}
                        }
                        self.bind_variable(scope, fill_only, name, stmt, None, Some(value));
                    }
                }
            }
            StmtKind::AnnAssign {
                target,
                annotation,
                value: Some(value),
            } => {
                for name in target.target_names() {
                    if name == "__all__" {
                        scope.all = value.string_items();
                    }
                    self.bind_variable(scope, fill_only, name, stmt, Some(annotation), Some(value));
                }
            }
            StmtKind::AugAssign { target, op, value } => {
                let extends_all = op == "+=" && target.target_names() == ["__all__"];
                if let (true, Some(all), Some(extra)) = (extends_all, scope.all.as_mut(), value.string_items()) {
                    all.extend(extra);
                }
            }
            StmtKind::TypeAlias { name, value } => {
                self.bind_variable(scope, fill_only, &name.name, stmt, None, Some(value));
            }
            StmtKind::Import(aliases) => {
                for alias in aliases {
                    let target = match &alias.asname {
                        Some(_) => alias.name.clone(),
                        None => alias.bound_name().to_string(),
                    };
                    self.bind(scope, fill_only, alias.bound_name(), stmt, ReflectedValue::Module { target });
                }
            }
            StmtKind::ImportFrom { module, level, names } => {
                let Some(base) = self.absolute_module(module.as_deref(), *level) else {
                    return;
                };
                for alias in names.iter().filter(|alias| alias.name != "*") {
                    let target = if base.is_empty() {
                        alias.name.clone()
                    } else {
                        format!("{base}.{}", alias.name)
                    };
                    self.bind(scope, fill_only, alias.bound_name(), stmt, ReflectedValue::Import { target });
                }
            }
            StmtKind::If { test, body, orelse } => {
                if is_type_checking(test) {
                    self.walk(orelse, scope, fill_only);
                } else {
                    self.walk(body, scope, fill_only);
                    self.walk(orelse, scope, true);
                }
            }
            StmtKind::Try {
                body,
                handlers,
                orelse,
                finalbody,
            } => {
                self.walk(body, scope, fill_only);
                for handler in handlers {
                    self.walk(handler, scope, true);
                }
                self.walk(orelse, scope, fill_only);
                self.walk(finalbody, scope, fill_only);
            }
            StmtKind::Block(bodies) => {
                for body in bodies {
                    self.walk(body, scope, fill_only);
                }
            }
            StmtKind::AnnAssign { value: None, .. } | StmtKind::Expr(_) | StmtKind::Other => {}
        }
    }

    fn bind_variable(
        &self,
        scope: &mut Scope,
        fill_only: bool,
        name: &str,
        stmt: &Stmt,
        annotation: Option<&Expr>,
        value: Option<&Expr>,
    ) {
        if MODULE_METADATA.contains(&name) {
            return;
        }
        let value = ReflectedValue::Variable {
            annotation: annotation.map(|a| self.text(a)),
            value: value.map(|v| self.repr(v)),
            docstring: None,
        };
        self.bind(scope, fill_only, name, stmt, value);
    }

    /// Resolve `from ..module import` against the current package
    fn absolute_module(&self, module: Option<&str>, level: u32) -> Option<String> {
        if level == 0 {
            return module.map(str::to_string);
        }
        let mut base = self.package.as_str();
        for _ in 1..level {
            base = base.rsplit_once('.').map_or("", |(parent, _)| parent);
        }
        Some(match (base.is_empty(), module) {
            (_, None) => base.to_string(),
            (true, Some(module)) => module.to_string(),
            (false, Some(module)) => format!("{base}.{module}"),
        })
    }

    fn text(&self, expr: &Expr) -> String {
        expr.source_text(self.source).trim().to_string()
    }

    fn repr(&self, expr: &Expr) -> ValueRepr {
        let text = self.text(expr);
        if text.is_empty() {
            ValueRepr::Unrepresentable("expression has no source text".to_string())
        } else {
            ValueRepr::Text(text)
        }
    }

    fn function(&self, def: &FunctionDef) -> ReflectedFunction {
        ReflectedFunction {
            docstring: def.docstring().map(str::to_string),
            params: def
                .params
                .iter()
                .map(|param| ReflectedParam {
                    name: param.name.name.clone(),
                    kind: param.kind,
                    annotation: param.annotation.as_ref().map(|a| self.text(a)),
                    default: param.default.as_ref().map(|d| self.repr(d)),
                })
                .collect(),
            returns: def.returns.as_ref().map(|r| self.text(r)),
            is_async: def.is_async,
            decorators: def.decorators.iter().map(|d| self.text(d)).collect(),
        }
    }

    fn class(&self, def: &ClassDef) -> ReflectedClass {
        let mut scope = Scope::default();
        self.walk(&def.body, &mut scope, false);
        ReflectedClass {
            docstring: def.docstring().map(str::to_string),
            bases: def.bases.iter().map(|b| self.text(b)).collect(),
            members: scope.members.into_values().collect(),
            decorators: def.decorators.iter().map(|d| self.text(d)).collect(),
            shadows: None,
        }
    }
}

/// `if TYPE_CHECKING:` guards imports that only exist for type checkers
pub(crate) fn is_type_checking(test: &Expr) -> bool {
    test.dotted_name()
        .is_some_and(|name| name == "TYPE_CHECKING" || name.ends_with(".TYPE_CHECKING"))
}
