//! Syntax tree for Python modules
//!
//! The tree only models what documentation needs: definitions, assignments,
//! imports and the control flow that wraps them. Expressions keep their span so
//! any node can be printed back exactly as written.

mod expr;
mod stmt;

pub use expr::*;
pub use stmt::*;

pub use crate::lexer::Span;

/// A trait for AST nodes that have associated source location information
pub trait Spanned {
    fn span(&self) -> Span;

    /// The node's text exactly as written in `source`
    fn source_text<'a>(&self, source: &'a str) -> &'a str {
        self.span().text(source)
    }
}

/// An identifier with its source location
#[derive(Debug, Clone, PartialEq)]
pub struct Ident {
    pub name: String,
    pub span: Span,
}

impl Ident {
    #[must_use]
    pub fn new(name: impl Into<String>, span: Span) -> Self {
        Self {
            name: name.into(),
            span,
        }
    }
}

impl Spanned for Ident {
    fn span(&self) -> Span {
        self.span
    }
}

/// A parsed source file
#[derive(Debug, Clone, PartialEq)]
pub struct Module {
    pub body: Vec<Stmt>,
    pub span: Span,
}

impl Module {
    #[must_use]
    pub fn new(body: Vec<Stmt>, span: Span) -> Self {
        Self { body, span }
    }

    /// The module docstring: a string literal as the first statement
    #[must_use]
    pub fn docstring(&self) -> Option<&str> {
        docstring_of(&self.body)
    }
}

/// First-statement docstring of a body
#[must_use]
pub fn docstring_of(body: &[Stmt]) -> Option<&str> {
    match &body.first()?.kind {
        StmtKind::Expr(expr) => expr.as_str(),
        _ => None,
    }
}
