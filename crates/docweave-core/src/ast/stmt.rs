//! Statement nodes

use serde::{Deserialize, Serialize};

use crate::lexer::Span;

use super::{Expr, Ident, Spanned};

/// Kind of a function parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamKind {
    PositionalOnly,
    PositionalOrKeyword,
    /// `*args`
    VarPositional,
    KeywordOnly,
    /// `**kwargs`
    VarKeyword,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: Ident,
    pub kind: ParamKind,
    pub annotation: Option<Expr>,
    pub default: Option<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDef {
    pub name: Ident,
    pub params: Vec<Param>,
    pub returns: Option<Expr>,
    pub body: Vec<Stmt>,
    pub decorators: Vec<Expr>,
    pub is_async: bool,
}

impl FunctionDef {
    #[must_use]
    pub fn docstring(&self) -> Option<&str> {
        super::docstring_of(&self.body)
    }

    /// True if decorated with `@name` or `@x.name`
    #[must_use]
    pub fn has_decorator(&self, name: &str) -> bool {
        self.decorators.iter().any(|d| {
            d.dotted_name()
                .is_some_and(|n| n == name || n.ends_with(&format!(".{name}")))
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassDef {
    pub name: Ident,
    pub bases: Vec<Expr>,
    pub keywords: Vec<super::Keyword>,
    pub body: Vec<Stmt>,
    pub decorators: Vec<Expr>,
}

impl ClassDef {
    #[must_use]
    pub fn docstring(&self) -> Option<&str> {
        super::docstring_of(&self.body)
    }
}

/// One name in an import statement
#[derive(Debug, Clone, PartialEq)]
pub struct Alias {
    /// Dotted name as written, or `*`
    pub name: String,
    pub asname: Option<Ident>,
    pub span: Span,
}

impl Alias {
    /// The name bound in the importing namespace
    #[must_use]
    pub fn bound_name(&self) -> &str {
        match &self.asname {
            Some(ident) => &ident.name,
            None => self.name.split('.').next().unwrap_or(&self.name),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    FunctionDef(FunctionDef),
    ClassDef(ClassDef),
    /// `a = b = value`; one target per `=`
    Assign {
        targets: Vec<Expr>,
        value: Expr,
    },
    AnnAssign {
        target: Expr,
        annotation: Expr,
        value: Option<Expr>,
    },
    AugAssign {
        target: Expr,
        op: String,
        value: Expr,
    },
    /// `type Alias = value`
    TypeAlias {
        name: Ident,
        value: Expr,
    },
    Expr(Expr),
    Import(Vec<Alias>),
    ImportFrom {
        module: Option<String>,
        level: u32,
        names: Vec<Alias>,
    },
    If {
        test: Expr,
        body: Vec<Stmt>,
        orelse: Vec<Stmt>,
    },
    Try {
        body: Vec<Stmt>,
        handlers: Vec<Vec<Stmt>>,
        orelse: Vec<Stmt>,
        finalbody: Vec<Stmt>,
    },
    /// Loops, `with` and `match`: bodies are kept, headers are not
    Block(Vec<Vec<Stmt>>),
    /// Statements that bind nothing documentation cares about
    Other,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
    pub kind: StmtKind,
    pub span: Span,
}

impl Stmt {
    #[must_use]
    pub fn new(kind: StmtKind, span: Span) -> Self {
        Self { kind, span }
    }

    /// The string literal if this is a bare string expression statement
    #[must_use]
    pub fn as_docstring(&self) -> Option<&str> {
        match &self.kind {
            StmtKind::Expr(expr) => expr.as_str(),
            _ => None,
        }
    }
}

impl Spanned for Stmt {
    fn span(&self) -> Span {
        self.span
    }
}
