//! Token types for the Python lexer

use logos::Logos;

/// The kind of token produced by the lexer
#[derive(Logos, Debug, Clone, Copy, PartialEq, Eq)]
#[logos(skip r"[ \t\x0C]+")]
#[logos(skip r"#[^\r\n]*")]
#[logos(skip r"\\\r?\n")]
pub enum TokenKind {
    // ========== Keywords ==========
    #[token("def")]
    Def,
    #[token("class")]
    Class,
    #[token("async")]
    Async,
    #[token("await")]
    Await,
    #[token("if")]
    If,
    #[token("elif")]
    Elif,
    #[token("else")]
    Else,
    #[token("for")]
    For,
    #[token("while")]
    While,
    #[token("try")]
    Try,
    #[token("except")]
    Except,
    #[token("finally")]
    Finally,
    #[token("with")]
    With,
    #[token("import")]
    Import,
    #[token("from")]
    From,
    #[token("as")]
    As,
    #[token("lambda")]
    Lambda,
    #[token("return")]
    Return,
    #[token("pass")]
    Pass,
    #[token("global")]
    Global,
    #[token("nonlocal")]
    Nonlocal,
    #[token("del")]
    Del,
    #[token("raise")]
    Raise,
    #[token("assert")]
    Assert,
    #[token("break")]
    Break,
    #[token("continue")]
    Continue,
    #[token("yield")]
    Yield,
    #[token("in")]
    In,
    #[token("is")]
    Is,
    #[token("not")]
    Not,
    #[token("and")]
    And,
    #[token("or")]
    Or,
    #[token("None")]
    NoneLiteral,
    #[token("True")]
    True,
    #[token("False")]
    False,

    // ========== Literals ==========
    /// Single-line string literal with optional prefix
    #[regex(r#"([rRuUbB]|[bB][rR]|[rR][bB])?"([^"\\\r\n]|\\[^\r\n]|\\\r?\n)*""#)]
    #[regex(r#"([rRuUbB]|[bB][rR]|[rR][bB])?'([^'\\\r\n]|\\[^\r\n]|\\\r?\n)*'"#)]
    #[regex(r#"([fF]|[fF][rR]|[rR][fF])""#, |lex| close_fstring(lex, b'"'))]
    #[regex(r"([fF]|[fF][rR]|[rR][fF])'", |lex| close_fstring(lex, b'\''))]
    String,

    /// Triple-quoted string literal; the body is consumed by a callback
    #[regex(r#"[rRbBuUfF]{0,2}""""#, |lex| close_triple_quote(lex, b'"'))]
    #[regex(r"[rRbBuUfF]{0,2}'''", |lex| close_triple_quote(lex, b'\''))]
    LongString,

    #[regex(r"[0-9][0-9_]*(\.[0-9_]*)?([eE][+-]?[0-9_]+)?[jJ]?")]
    #[regex(r"\.[0-9][0-9_]*([eE][+-]?[0-9_]+)?[jJ]?")]
    #[regex(r"0[xXoObB][0-9a-fA-F_]+")]
    Number,

    // ========== Identifiers ==========
    #[regex(r"[a-zA-Z_][a-zA-Z0-9_]*", priority = 3)]
    #[regex(r"[\p{XID_Start}_][\p{XID_Continue}]*", priority = 2)]
    Name,

    // ========== Delimiters ==========
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,
    #[token(",")]
    Comma,
    #[token(":")]
    Colon,
    #[token(";")]
    Semicolon,
    #[token(".")]
    Dot,
    #[token("...")]
    Ellipsis,

    // ========== Operators ==========
    #[token("=")]
    Eq,
    #[token(":=")]
    ColonEq,
    #[token("->")]
    Arrow,
    #[token("@")]
    At,
    #[token("*")]
    Star,
    #[token("**")]
    DoubleStar,
    #[token("/")]
    Slash,

    /// Augmented assignment: `+=`, `//=`, `**=`, ...
    #[regex(r"[-+*/%@&|^]=|//=|>>=|<<=|\*\*=")]
    AugAssign,

    /// Any other operator; the parser only needs to skip these
    #[regex(r"[-+%&|^~<>]|//|<<|>>|<=|>=|==|!=")]
    Operator,

    // ========== Layout ==========
    #[regex(r"\r?\n|\r")]
    Newline,

    /// Produced by the indentation tracker, never by logos
    Indent,
    Dedent,
    Eof,
    Error,
}

/// Consume the body of a triple-quoted string up to the matching delimiter
fn close_triple_quote(lex: &mut logos::Lexer<TokenKind>, quote: u8) -> bool {
    let rest = lex.remainder().as_bytes();
    let mut i = 0;
    while i < rest.len() {
        match rest[i] {
            b'\\' => i += 2,
            b if b == quote && rest[i..].starts_with(&[quote; 3]) => {
                lex.bump(i + 3);
                return true;
            }
            _ => i += 1,
        }
    }
    false
}

/// Consume a single-line f-string body
///
/// Replacement fields may nest braces and strings, including strings that
/// reuse the enclosing quote.
fn close_fstring(lex: &mut logos::Lexer<TokenKind>, quote: u8) -> bool {
    let rest = lex.remainder().as_bytes();
    let mut depth = 0usize;
    let mut i = 0;
    while i < rest.len() {
        let byte = rest[i];
        if depth == 0 {
            match byte {
                b'\\' if rest[i + 1..].starts_with(b"\r\n") => i += 3,
                b'\\' => i += 2,
                b'\r' | b'\n' => return false,
                b'{' if rest.get(i + 1) == Some(&b'{') => i += 2,
                b'{' => {
                    depth = 1;
                    i += 1;
                }
                b if b == quote => {
                    lex.bump(i + 1);
                    return true;
                }
                _ => i += 1,
            }
            continue;
        }
        match byte {
            b'{' => depth += 1,
            b'}' => depth -= 1,
            b'"' | b'\'' => {
                let mut j = i + 1;
                while j < rest.len() && rest[j] != byte {
                    if rest[j] == b'\\' {
                        j += 1;
                    }
                    j += 1;
                }
                i = j;
            }
            _ => {}
        }
        i += 1;
    }
    false
}

impl TokenKind {
    #[must_use]
    pub const fn is_keyword(&self) -> bool {
        matches!(
            self,
            Self::Def
                | Self::Class
                | Self::Async
                | Self::Await
                | Self::If
                | Self::Elif
                | Self::Else
                | Self::For
                | Self::While
                | Self::Try
                | Self::Except
                | Self::Finally
                | Self::With
                | Self::Import
                | Self::From
                | Self::As
                | Self::Lambda
                | Self::Return
                | Self::Pass
                | Self::Global
                | Self::Nonlocal
                | Self::Del
                | Self::Raise
                | Self::Assert
                | Self::Break
                | Self::Continue
                | Self::Yield
                | Self::In
                | Self::Is
                | Self::Not
                | Self::And
                | Self::Or
                | Self::NoneLiteral
                | Self::True
                | Self::False
        )
    }

    #[must_use]
    pub const fn is_string(&self) -> bool {
        matches!(self, Self::String | Self::LongString)
    }

    #[must_use]
    pub const fn opens_bracket(&self) -> bool {
        matches!(self, Self::LParen | Self::LBracket | Self::LBrace)
    }

    #[must_use]
    pub const fn closes_bracket(&self) -> bool {
        matches!(self, Self::RParen | Self::RBracket | Self::RBrace)
    }

    /// Tokens that end a logical line
    #[must_use]
    pub const fn is_line_end(&self) -> bool {
        matches!(self, Self::Newline | Self::Eof)
    }
}

impl std::fmt::Display for TokenKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Def => write!(f, "def"),
            Self::Class => write!(f, "class"),
            Self::Async => write!(f, "async"),
            Self::Await => write!(f, "await"),
            Self::If => write!(f, "if"),
            Self::Elif => write!(f, "elif"),
            Self::Else => write!(f, "else"),
            Self::For => write!(f, "for"),
            Self::While => write!(f, "while"),
            Self::Try => write!(f, "try"),
            Self::Except => write!(f, "except"),
            Self::Finally => write!(f, "finally"),
            Self::With => write!(f, "with"),
            Self::Import => write!(f, "import"),
            Self::From => write!(f, "from"),
            Self::As => write!(f, "as"),
            Self::Lambda => write!(f, "lambda"),
            Self::Return => write!(f, "return"),
            Self::Pass => write!(f, "pass"),
            Self::Global => write!(f, "global"),
            Self::Nonlocal => write!(f, "nonlocal"),
            Self::Del => write!(f, "del"),
            Self::Raise => write!(f, "raise"),
            Self::Assert => write!(f, "assert"),
            Self::Break => write!(f, "break"),
            Self::Continue => write!(f, "continue"),
            Self::Yield => write!(f, "yield"),
            Self::In => write!(f, "in"),
            Self::Is => write!(f, "is"),
            Self::Not => write!(f, "not"),
            Self::And => write!(f, "and"),
            Self::Or => write!(f, "or"),
            Self::NoneLiteral => write!(f, "None"),
            Self::True => write!(f, "True"),
            Self::False => write!(f, "False"),
            Self::String | Self::LongString => write!(f, "string"),
            Self::Number => write!(f, "number"),
            Self::Name => write!(f, "identifier"),
            Self::LParen => write!(f, "("),
            Self::RParen => write!(f, ")"),
            Self::LBracket => write!(f, "["),
            Self::RBracket => write!(f, "]"),
            Self::LBrace => write!(f, "{{"),
            Self::RBrace => write!(f, "}}"),
            Self::Comma => write!(f, ","),
            Self::Colon => write!(f, ":"),
            Self::Semicolon => write!(f, ";"),
            Self::Dot => write!(f, "."),
            Self::Ellipsis => write!(f, "..."),
            Self::Eq => write!(f, "="),
            Self::ColonEq => write!(f, ":="),
            Self::Arrow => write!(f, "->"),
            Self::At => write!(f, "@"),
            Self::Star => write!(f, "*"),
            Self::DoubleStar => write!(f, "**"),
            Self::Slash => write!(f, "/"),
            Self::AugAssign => write!(f, "augmented assignment"),
            Self::Operator => write!(f, "operator"),
            Self::Newline => write!(f, "newline"),
            Self::Indent => write!(f, "indent"),
            Self::Dedent => write!(f, "dedent"),
            Self::Eof => write!(f, "end of file"),
            Self::Error => write!(f, "error"),
        }
    }
}
