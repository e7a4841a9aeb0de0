//! Expression nodes

use crate::lexer::Span;

use super::Spanned;

/// A decoded string literal (implicit concatenation already applied)
#[derive(Debug, Clone, PartialEq)]
pub struct StrLit {
    pub value: String,
    /// `b"..."` literal
    pub bytes: bool,
    /// `f"..."` literal; `value` holds the unevaluated template
    pub formatted: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Keyword {
    /// `None` for `**kwargs` unpacking
    pub name: Option<String>,
    pub value: Expr,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    Name(String),
    Attribute {
        value: Box<Expr>,
        attr: String,
    },
    Str(StrLit),
    /// Numbers, `None`, `True`, `False` and `...`
    Constant,
    Tuple(Vec<Expr>),
    List(Vec<Expr>),
    Call {
        func: Box<Expr>,
        args: Vec<Expr>,
        keywords: Vec<Keyword>,
    },
    Subscript {
        value: Box<Expr>,
        index: Box<Expr>,
    },
    Starred(Box<Expr>),
    BinOp {
        left: Box<Expr>,
        op: String,
        right: Box<Expr>,
    },
    /// Anything else: dicts, comprehensions, lambdas, conditionals, ...
    Other,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Span,
}

impl Expr {
    #[must_use]
    pub fn new(kind: ExprKind, span: Span) -> Self {
        Self { kind, span }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match &self.kind {
            ExprKind::Str(lit) if !lit.bytes && !lit.formatted => Some(&lit.value),
            _ => None,
        }
    }

    /// `a.b.c` for name and attribute chains
    #[must_use]
    pub fn dotted_name(&self) -> Option<String> {
        match &self.kind {
            ExprKind::Name(name) => Some(name.clone()),
            ExprKind::Attribute { value, attr } => {
                value.dotted_name().map(|base| format!("{base}.{attr}"))
            }
            _ => None,
        }
    }

    /// Strip generic parameters: `Base[T]` -> `Base`
    #[must_use]
    pub fn without_subscript(&self) -> &Expr {
        match &self.kind {
            ExprKind::Subscript { value, .. } => value.without_subscript(),
            _ => self,
        }
    }

    /// Names bound when this expression is an assignment target
    #[must_use]
    pub fn target_names(&self) -> Vec<&str> {
        match &self.kind {
            ExprKind::Name(name) => vec![name.as_str()],
            ExprKind::Tuple(items) | ExprKind::List(items) => {
                items.iter().flat_map(Expr::target_names).collect()
            }
            ExprKind::Starred(inner) => inner.target_names(),
            _ => Vec::new(),
        }
    }

    /// `self.attr` (any receiver named `receiver`)
    #[must_use]
    pub fn attribute_of(&self, receiver: &str) -> Option<&str> {
        match &self.kind {
            ExprKind::Attribute { value, attr } => match &value.kind {
                ExprKind::Name(name) if name == receiver => Some(attr),
                _ => None,
            },
            _ => None,
        }
    }

    /// String items of a list or tuple literal, `None` if any item is not a string
    #[must_use]
    pub fn string_items(&self) -> Option<Vec<String>> {
        match &self.kind {
            ExprKind::List(items) | ExprKind::Tuple(items) => items
                .iter()
                .map(|item| item.as_str().map(str::to_string))
                .collect(),
            ExprKind::BinOp { left, op, right } if op == "+" => {
                let mut items = left.string_items()?;
                items.extend(right.string_items()?);
                Some(items)
            }
            _ => None,
        }
    }
}

impl Spanned for Expr {
    fn span(&self) -> Span {
        self.span
    }
}
