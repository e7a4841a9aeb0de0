//! AST docstring extractor - recovers what reflection cannot see
//!
//! Python keeps no docstrings for variables, and instance attributes only
//! exist once `__init__` ran. Both are recovered from the syntax tree: a string
//! literal statement directly after an assignment documents its targets.

use indexmap::IndexMap;

use crate::ast::{Expr, FunctionDef, Module, Spanned, Stmt, StmtKind};
use crate::docstring::clean;
use crate::lexer::LineIndex;
use crate::parser::{ParseError, Parser};
use crate::reflect::is_type_checking;

/// `(scope, name)`: scope is `""` for module level, else the dotted class path
pub type ScopedName = (String, String);

/// Everything recovered from a module's syntax tree
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AstInfo {
    /// Cleaned docstrings of assignments
    pub var_docstrings: IndexMap<ScopedName, String>,
    /// Cleaned first-statement docstrings of functions
    pub func_docstrings: IndexMap<ScopedName, String>,
    /// Annotation source text; `None` for names assigned without one
    pub annotations: IndexMap<ScopedName, Option<String>>,
    /// First line each name is declared on
    pub declarations: IndexMap<ScopedName, u32>,
}

impl AstInfo {
    #[must_use]
    pub fn var_docstring(&self, scope: &str, name: &str) -> Option<&str> {
        self.var_docstrings
            .get(&(scope.to_string(), name.to_string()))
            .map(String::as_str)
    }

    #[must_use]
    pub fn func_docstring(&self, scope: &str, name: &str) -> Option<&str> {
        self.func_docstrings
            .get(&(scope.to_string(), name.to_string()))
            .map(String::as_str)
    }

    /// `Some(None)` for a name known to be assigned without annotation
    #[must_use]
    pub fn annotation(&self, scope: &str, name: &str) -> Option<Option<&str>> {
        self.annotations
            .get(&(scope.to_string(), name.to_string()))
            .map(Option::as_deref)
    }

    #[must_use]
    pub fn declaration_line(&self, scope: &str, name: &str) -> Option<u32> {
        self.declarations
            .get(&(scope.to_string(), name.to_string()))
            .copied()
    }

    /// Names assigned or annotated directly in `scope`, in declaration order
    pub fn names_in<'a>(&'a self, scope: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.annotations
            .keys()
            .filter(move |(s, _)| s == scope)
            .map(|(_, name)| name.as_str())
    }
}

/// Extracts [`AstInfo`] from source text
pub struct AstExtractor<'a> {
    source: &'a str,
    lines: LineIndex,
    info: AstInfo,
}

impl<'a> AstExtractor<'a> {
    /// Parse `source` and collect its docstrings; any syntax error fails the whole unit
    pub fn extract(source: &'a str) -> Result<AstInfo, Vec<ParseError>> {
        let module = Parser::parse_module(source)?;
        Ok(Self::from_module(source, &module))
    }

    /// Collect docstrings from an already parsed module
    #[must_use]
    pub fn from_module(source: &'a str, module: &Module) -> AstInfo {
        let mut extractor = Self {
            source,
            lines: LineIndex::new(source),
            info: AstInfo::default(),
        };
        extractor.body(&module.body, "");
        extractor.info
    }

    fn body(&mut self, body: &[Stmt], scope: &str) {
        for (i, stmt) in body.iter().enumerate() {
            let docstring = body.get(i + 1).and_then(Stmt::as_docstring);
            self.statement(stmt, scope, docstring);
        }
    }

    fn statement(&mut self, stmt: &Stmt, scope: &str, docstring: Option<&str>) {
        match &stmt.kind {
            StmtKind::Assign { targets, .. } => {
                for target in targets {
                    for name in target.target_names() {
                        self.assigned(scope, name, None, stmt, docstring);
                    }
                }
            }
            StmtKind::AnnAssign {
                target, annotation, ..
            } => {
                for name in target.target_names() {
                    self.assigned(scope, name, Some(annotation), stmt, docstring);
                }
            }
            StmtKind::TypeAlias { name, .. } => {
                self.assigned(scope, &name.name, None, stmt, docstring);
            }
            StmtKind::FunctionDef(def) => {
                self.declared(scope, &def.name.name, stmt);
                if let Some(doc) = def.docstring() {
                    self.info
                        .func_docstrings
                        .insert(key(scope, &def.name.name), clean(doc));
                }
                if def.name.name == "__init__" && !scope.is_empty() {
                    self.constructor(def, scope);
                }
            }
            StmtKind::ClassDef(def) => {
                self.declared(scope, &def.name.name, stmt);
                let inner = if scope.is_empty() {
                    def.name.name.clone()
                } else {
                    format!("{scope}.{}", def.name.name)
                };
                self.body(&def.body, &inner);
            }
            StmtKind::If { test, body, orelse } => {
                if !is_type_checking(test) {
                    self.body(body, scope);
                }
                self.body(orelse, scope);
            }
            StmtKind::Try {
                body,
                handlers,
                orelse,
                finalbody,
            } => {
                self.body(body, scope);
                for handler in handlers {
                    self.body(handler, scope);
                }
                self.body(orelse, scope);
                self.body(finalbody, scope);
            }
            StmtKind::Block(bodies) => {
                for body in bodies {
                    self.body(body, scope);
                }
            }
            StmtKind::AugAssign { .. }
            | StmtKind::Expr(_)
            | StmtKind::Import(_)
            | StmtKind::ImportFrom { .. }
            | StmtKind::Other => {}
        }
    }

    /// `self.x = ...` and `self.x: T = ...` directly in `__init__`
    fn constructor(&mut self, def: &FunctionDef, scope: &str) {
        let Some(receiver) = def.params.first().map(|p| p.name.name.as_str()) else {
            return;
        };
        for (i, stmt) in def.body.iter().enumerate() {
            let docstring = def.body.get(i + 1).and_then(Stmt::as_docstring);
            match &stmt.kind {
                StmtKind::Assign { targets, .. } => {
                    for name in targets.iter().filter_map(|t| t.attribute_of(receiver)) {
                        self.assigned(scope, name, None, stmt, docstring);
                    }
                }
                StmtKind::AnnAssign {
                    target, annotation, ..
                } => {
                    if let Some(name) = target.attribute_of(receiver) {
                        self.assigned(scope, name, Some(annotation), stmt, docstring);
                    }
                }
                _ => {}
            }
        }
    }

    fn assigned(
        &mut self,
        scope: &str,
        name: &str,
        annotation: Option<&Expr>,
        stmt: &Stmt,
        docstring: Option<&str>,
    ) {
        self.declared(scope, name, stmt);
        let key = key(scope, name);
        match annotation {
            Some(annotation) => {
                let text = annotation.source_text(self.source).trim().to_string();
                self.info.annotations.insert(key.clone(), Some(text));
            }
            None => {
                self.info.annotations.entry(key.clone()).or_insert(None);
            }
        }
        if let Some(doc) = docstring {
            self.info.var_docstrings.insert(key, clean(doc));
        }
    }

    fn declared(&mut self, scope: &str, name: &str, stmt: &Stmt) {
        let line = self.lines.line_of(stmt.span().start);
        self.info.declarations.entry(key(scope, name)).or_insert(line);
    }
}

fn key(scope: &str, name: &str) -> ScopedName {
    (scope.to_string(), name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_module_and_class_variables() {
        let source = r#"
X = 1
"""the answer"""

a, b = 1, 2
"""Both of them."""

c = d = 3
"""Chained."""

unannotated = 4
typed: int = 5
"""Typed."""
only_declared: str

type Alias = list[int]
"""An alias."""

class Outer:
    attr = 1
    """Class attribute."""

    class Inner:
        deep = 2
        """Nested."""
"#;
        let info = AstExtractor::extract(source).unwrap();
        assert_eq!(info.var_docstring("", "X"), Some("the answer"));
        assert_eq!(info.var_docstring("", "a"), Some("Both of them."));
        assert_eq!(info.var_docstring("", "b"), Some("Both of them."));
        assert_eq!(info.var_docstring("", "c"), Some("Chained."));
        assert_eq!(info.var_docstring("", "d"), Some("Chained."));
        assert_eq!(info.var_docstring("", "unannotated"), None);
        assert_eq!(info.var_docstring("", "typed"), Some("Typed."));
        assert_eq!(info.var_docstring("", "Alias"), Some("An alias."));
        assert_eq!(info.annotation("", "typed"), Some(Some("int")));
        assert_eq!(info.annotation("", "unannotated"), Some(None));
        assert_eq!(info.annotation("", "only_declared"), Some(Some("str")));
        assert_eq!(info.var_docstring("Outer", "attr"), Some("Class attribute."));
        assert_eq!(info.var_docstring("Outer.Inner", "deep"), Some("Nested."));
        assert_eq!(info.declaration_line("", "X"), Some(2));
    }

    #[test]
    fn test_constructor_attributes() {
        let source = r#"
class Point:
    def __init__(this, x: int):
        this.x = x
        """The x coordinate."""
        this.y: float = 0.0
        """
        The y coordinate,
        indented.
        """
        other.z = 1
        """Not ours."""
"#;
        let info = AstExtractor::extract(source).unwrap();
        assert_eq!(info.var_docstring("Point", "x"), Some("The x coordinate."));
        assert_eq!(info.var_docstring("Point", "y"), Some("The y coordinate,\nindented."));
        assert_eq!(info.annotation("Point", "y"), Some(Some("float")));
        assert_eq!(info.var_docstring("Point", "z"), None);
        let names: Vec<&str> = info.names_in("Point").collect();
        assert_eq!(names, vec!["x", "y"]);
    }

    #[test]
    fn test_decorated_function_docstrings() {
        let source = r#"
@decorator
@other.thing(1)
def f():
    """Decorated."""

class C:
    @staticmethod
    def g():
        """Static."""
"#;
        let info = AstExtractor::extract(source).unwrap();
        assert_eq!(info.func_docstring("", "f"), Some("Decorated."));
        assert_eq!(info.func_docstring("C", "g"), Some("Static."));
    }

    #[test]
    fn test_type_checking_blocks_are_skipped() {
        let source = r#"
if TYPE_CHECKING:
    Alias: TypeAlias = "list[int]"
    """Only for checkers."""
else:
    Alias = list
    """At runtime."""
if typing.TYPE_CHECKING:
    hidden: int
"#;
        let info = AstExtractor::extract(source).unwrap();
        assert_eq!(info.var_docstring("", "Alias"), Some("At runtime."));
        assert_eq!(info.annotation("", "Alias"), Some(None));
        assert_eq!(info.declaration_line("", "hidden"), None);
    }

    #[test]
    fn test_generators_do_not_hide_variable_docstrings() {
        let source = r#"
X = 1
"""the answer"""

def gen():
    yield
    yield from other()
"#;
        let info = AstExtractor::extract(source).unwrap();
        assert_eq!(info.var_docstring("", "X"), Some("the answer"));
    }

    #[test]
    fn test_syntax_error_fails_the_unit() {
        assert!(AstExtractor::extract("X = 1\ndef broken(:\n").is_err());
    }
}
