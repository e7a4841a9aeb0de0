//! Lexer for Python source
//!
//! The logos-generated scanner produces raw tokens; this module layers Python's
//! line structure on top of it:
//! - NEWLINE tokens are suppressed inside brackets and on blank lines
//! - INDENT / DEDENT tokens are synthesised from leading whitespace
//! - the stream always ends with any pending DEDENTs followed by EOF

#![allow(clippy::cast_possible_truncation)] // u32 offsets; sources larger than 4GB are rejected by the loader

mod span;
mod token;

pub use span::{LineIndex, Location, Span};
pub use token::TokenKind;

use logos::Logos;
use thiserror::Error;

/// A token with its kind, span, and source text
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
    pub lexeme: String,
}

impl Token {
    #[must_use]
    pub fn new(kind: TokenKind, span: Span, lexeme: impl Into<String>) -> Self {
        Self {
            kind,
            span,
            lexeme: lexeme.into(),
        }
    }
}

/// Lexer error types
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LexError {
    #[error("unexpected character")]
    UnexpectedChar,
    #[error("unterminated string literal")]
    UnterminatedString,
    #[error("unindent does not match any outer indentation level")]
    InconsistentDedent,
    #[error("unmatched closing bracket")]
    UnmatchedBracket,
    #[error("bracket was never closed")]
    UnclosedBracket,
}

/// A lexer error with location information
#[derive(Debug, Clone)]
pub struct SpannedError {
    pub error: LexError,
    pub span: Span,
}

impl SpannedError {
    #[must_use]
    pub fn new(error: LexError, span: Span) -> Self {
        Self { error, span }
    }
}

impl std::fmt::Display for SpannedError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} at {}", self.error, self.span)
    }
}

impl std::error::Error for SpannedError {}

/// The Python lexer
pub struct Lexer<'source> {
    source: &'source str,
    tokens: Vec<Token>,
    errors: Vec<SpannedError>,
    /// Indentation widths of the enclosing blocks, outermost first
    indents: Vec<u32>,
    /// Open bracket nesting depth
    depth: u32,
    /// True until the first real token of the current logical line is seen
    at_line_start: bool,
}

impl<'source> Lexer<'source> {
    #[must_use]
    pub fn new(source: &'source str) -> Self {
        Self {
            source,
            tokens: Vec::new(),
            errors: Vec::new(),
            indents: vec![0],
            depth: 0,
            at_line_start: true,
        }
    }

    /// Tokenize the entire source, returning all tokens and any errors
    #[must_use]
    pub fn tokenize(source: &str) -> (Vec<Token>, Vec<SpannedError>) {
        let mut lexer = Lexer::new(source);
        lexer.run();
        (lexer.tokens, lexer.errors)
    }

    fn run(&mut self) {
        let mut raw = TokenKind::lexer(self.source);
        while let Some(result) = raw.next() {
            let span = Span::from_range(raw.span());
            match result {
                Ok(TokenKind::Newline) => self.newline(span),
                Ok(kind) => self.token(kind, span),
                Err(()) => {
                    let error = if raw.slice().contains(['"', '\'']) {
                        LexError::UnterminatedString
                    } else {
                        LexError::UnexpectedChar
                    };
                    self.errors.push(SpannedError::new(error, span));
                    self.token(TokenKind::Error, span);
                }
            }
        }

        let end = Span::new(self.source.len() as u32, self.source.len() as u32);
        if self.depth > 0 {
            self.errors
                .push(SpannedError::new(LexError::UnclosedBracket, end));
        }
        if !self.at_line_start {
            self.push(TokenKind::Newline, end);
        }
        while self.indents.len() > 1 {
            self.indents.pop();
            self.push(TokenKind::Dedent, end);
        }
        self.push(TokenKind::Eof, end);
    }

    fn newline(&mut self, span: Span) {
        if self.depth > 0 || self.at_line_start {
            return;
        }
        self.push(TokenKind::Newline, span);
        self.at_line_start = true;
    }

    fn token(&mut self, kind: TokenKind, span: Span) {
        if self.at_line_start {
            self.at_line_start = false;
            if self.depth == 0 {
                self.indentation(span);
            }
        }
        if kind.opens_bracket() {
            self.depth += 1;
        } else if kind.closes_bracket() {
            if self.depth == 0 {
                self.errors
                    .push(SpannedError::new(LexError::UnmatchedBracket, span));
            }
            self.depth = self.depth.saturating_sub(1);
        }
        self.push(kind, span);
    }

    /// Emit INDENT/DEDENT for the first token of a logical line
    fn indentation(&mut self, first: Span) {
        let width = self.indent_width(first.start as usize);
        let current = self.indents.last().copied().unwrap_or(0);
        let at = Span::new(first.start, first.start);
        if width > current {
            self.indents.push(width);
            self.push(TokenKind::Indent, at);
            return;
        }
        while self.indents.last().is_some_and(|&level| level > width) {
            self.indents.pop();
            self.push(TokenKind::Dedent, at);
        }
        if self.indents.last().copied().unwrap_or(0) != width {
            self.errors
                .push(SpannedError::new(LexError::InconsistentDedent, at));
            self.indents.push(width);
        }
    }

    /// Column of `offset` with tabs advancing to the next multiple of eight
    fn indent_width(&self, offset: usize) -> u32 {
        let line_start = self.source[..offset].rfind(['\n', '\r']).map_or(0, |i| i + 1);
        self.source[line_start..offset]
            .chars()
            .fold(0, |width, c| match c {
                '\t' => (width / 8 + 1) * 8,
                _ => width + 1,
            })
    }

    fn push(&mut self, kind: TokenKind, span: Span) {
        let lexeme = match kind {
            TokenKind::Indent | TokenKind::Dedent | TokenKind::Eof => "",
            _ => span.text(self.source),
        };
        self.tokens.push(Token::new(kind, span, lexeme));
    }
}
