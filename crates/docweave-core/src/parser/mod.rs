//! Recursive-descent parser for Python source
//!
//! The parser builds the reduced tree from [`crate::ast`]. Statement structure is
//! parsed faithfully (it decides which names a module binds and where docstrings
//! sit); expressions are parsed only as deeply as documentation needs, with
//! dicts, comprehensions, slices and lambdas kept as opaque spans.
//!
//! # Example
//!
//! ```
//! use docweave_core::parser::Parser;
//!
//! let module = Parser::parse_module("X = 1\n\"\"\"The answer.\"\"\"\n").unwrap();
//! assert_eq!(module.body.len(), 2);
//! assert_eq!(module.body[1].as_docstring(), Some("The answer."));
//! ```

mod error;

pub use error::{ExpectedToken, ParseError, ParseErrorKind};

use crate::ast::{
    Alias, ClassDef, Expr, ExprKind, FunctionDef, Ident, Keyword, Module, Param, ParamKind, Stmt,
    StmtKind, StrLit,
};
use crate::lexer::{Lexer, Span, Token, TokenKind};

/// Result type for parsing operations
pub type ParseResult<T> = Result<T, ParseError>;

/// The Python parser
pub struct Parser {
    tokens: Vec<Token>,
    position: usize,
    errors: Vec<ParseError>,
    /// End offset of the last consumed token that is not layout
    last_end: u32,
}

impl Parser {
    #[must_use]
    pub fn new(source: &str) -> Self {
        let (tokens, lex_errors) = Lexer::tokenize(source);
        let errors = lex_errors
            .into_iter()
            .map(|e| ParseError::new(ParseErrorKind::Lex(e.error), e.span))
            .collect();
        Self {
            tokens,
            position: 0,
            errors,
            last_end: 0,
        }
    }

    /// Parse a module, failing on the first syntax problem anywhere
    pub fn parse_module(source: &str) -> Result<Module, Vec<ParseError>> {
        let (module, errors) = Self::parse_module_recovering(source);
        if errors.is_empty() {
            Ok(module)
        } else {
            Err(errors)
        }
    }

    /// Parse a module, skipping statements that fail to parse
    #[must_use]
    pub fn parse_module_recovering(source: &str) -> (Module, Vec<ParseError>) {
        let mut parser = Parser::new(source);
        let module = parser.module(source.len());
        (module, parser.errors)
    }

    /// Parse a single expression such as an annotation
    pub fn parse_expression(source: &str) -> Result<Expr, Vec<ParseError>> {
        let mut parser = Parser::new(source);
        let result = parser.expression();
        match result {
            Ok(expr) if parser.errors.is_empty() && parser.at_logical_end() => Ok(expr),
            Ok(_) => {
                let found = parser.current_kind();
                parser.errors.push(ParseError::new(
                    ParseErrorKind::UnexpectedToken {
                        found,
                        expected: ExpectedToken::Token(TokenKind::Eof),
                    },
                    parser.current().span,
                ));
                Err(parser.errors)
            }
            Err(e) => {
                parser.errors.push(e);
                Err(parser.errors)
            }
        }
    }

    // ==================== Token Management ====================

    fn current(&self) -> &Token {
        // the lexer always terminates the stream with EOF
        &self.tokens[self.position.min(self.tokens.len() - 1)]
    }

    fn current_kind(&self) -> TokenKind {
        self.current().kind
    }

    fn peek_kind(&self, ahead: usize) -> TokenKind {
        let index = (self.position + ahead).min(self.tokens.len() - 1);
        self.tokens[index].kind
    }

    fn is_eof(&self) -> bool {
        self.current_kind() == TokenKind::Eof
    }

    fn at_logical_end(&self) -> bool {
        self.current_kind().is_line_end()
    }

    fn advance(&mut self) -> Token {
        let token = self.current().clone();
        if !matches!(
            token.kind,
            TokenKind::Newline | TokenKind::Indent | TokenKind::Dedent | TokenKind::Eof
        ) {
            self.last_end = token.span.end;
        }
        if self.position < self.tokens.len() - 1 {
            self.position += 1;
        }
        token
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.current_kind() == kind
    }

    fn check_name(&self, name: &str) -> bool {
        self.check(TokenKind::Name) && self.current().lexeme == name
    }

    fn eat(&mut self, kind: TokenKind) -> Option<Token> {
        if self.check(kind) {
            Some(self.advance())
        } else {
            None
        }
    }

    fn expect(&mut self, kind: TokenKind) -> ParseResult<Token> {
        if self.check(kind) {
            Ok(self.advance())
        } else if self.is_eof() {
            Err(ParseError::new(
                ParseErrorKind::UnexpectedEof,
                self.current().span,
            ))
        } else {
            Err(ParseError::new(
                ParseErrorKind::UnexpectedToken {
                    found: self.current_kind(),
                    expected: ExpectedToken::Token(kind),
                },
                self.current().span,
            ))
        }
    }

    fn expect_name(&mut self) -> ParseResult<Ident> {
        let token = self.current().clone();
        if token.kind == TokenKind::Name {
            self.advance();
            Ok(Ident::new(token.lexeme, token.span))
        } else {
            Err(ParseError::new(
                ParseErrorKind::ExpectedIdentifier,
                token.span,
            ))
        }
    }

    fn span_from(&self, start: Span) -> Span {
        Span::new(start.start, self.last_end.max(start.start))
    }

    fn error(&mut self, error: ParseError) {
        self.errors.push(error);
    }

    // ==================== Statements ====================

    fn module(&mut self, len: usize) -> Module {
        let mut body = Vec::new();
        while !self.is_eof() {
            match self.current_kind() {
                TokenKind::Newline | TokenKind::Dedent => {
                    self.advance();
                }
                TokenKind::Indent => {
                    self.error(ParseError::new(
                        ParseErrorKind::UnexpectedIndent,
                        self.current().span,
                    ));
                    self.skip_block();
                }
                _ => self.statement_into(&mut body),
            }
        }
        Module::new(body, Span::from_range(0..len))
    }

    fn statement_into(&mut self, body: &mut Vec<Stmt>) {
        match self.statement() {
            Ok(stmts) => body.extend(stmts),
            Err(e) => {
                self.error(e);
                self.synchronize();
            }
        }
    }

    fn statement(&mut self) -> ParseResult<Vec<Stmt>> {
        let stmt = match self.current_kind() {
            TokenKind::At => self.decorated()?,
            TokenKind::Def => self.function_def(Vec::new(), self.current().span)?,
            TokenKind::Class => self.class_def(Vec::new(), self.current().span)?,
            TokenKind::Async => match self.peek_kind(1) {
                TokenKind::Def => self.function_def(Vec::new(), self.current().span)?,
                _ => self.header_block()?,
            },
            TokenKind::If => self.if_stmt()?,
            TokenKind::While | TokenKind::For | TokenKind::With => self.header_block()?,
            TokenKind::Try => self.try_stmt()?,
            TokenKind::Name if self.check_name("match") && self.looks_like_match() => {
                self.match_stmt()?
            }
            _ => return self.simple_stmt(),
        };
        Ok(vec![stmt])
    }

    /// `:` followed by an inline statement list or an indented block
    fn suite(&mut self) -> ParseResult<Vec<Stmt>> {
        self.expect(TokenKind::Colon)?;
        if self.eat(TokenKind::Newline).is_none() {
            return self.simple_stmt();
        }
        if self.eat(TokenKind::Indent).is_none() {
            return Err(ParseError::new(
                ParseErrorKind::ExpectedBlock,
                self.current().span,
            ));
        }
        let mut body = Vec::new();
        while !self.check(TokenKind::Dedent) && !self.is_eof() {
            match self.current_kind() {
                TokenKind::Newline => {
                    self.advance();
                }
                TokenKind::Indent => {
                    self.error(ParseError::new(
                        ParseErrorKind::UnexpectedIndent,
                        self.current().span,
                    ));
                    self.skip_block();
                }
                _ => self.statement_into(&mut body),
            }
        }
        self.eat(TokenKind::Dedent);
        Ok(body)
    }

    fn simple_stmt(&mut self) -> ParseResult<Vec<Stmt>> {
        let mut stmts = vec![self.small_stmt()?];
        while self.eat(TokenKind::Semicolon).is_some() {
            if self.at_logical_end() {
                break;
            }
            stmts.push(self.small_stmt()?);
        }
        if !self.is_eof() {
            self.expect(TokenKind::Newline)?;
        }
        Ok(stmts)
    }

    fn small_stmt(&mut self) -> ParseResult<Stmt> {
        let start = self.current().span;
        let kind = match self.current_kind() {
            TokenKind::Pass | TokenKind::Break | TokenKind::Continue => {
                self.advance();
                StmtKind::Other
            }
            TokenKind::Return
            | TokenKind::Raise
            | TokenKind::Del
            | TokenKind::Assert
            | TokenKind::Global
            | TokenKind::Nonlocal => {
                self.advance();
                while !self.at_logical_end() && !self.check(TokenKind::Semicolon) {
                    self.advance();
                }
                StmtKind::Other
            }
            TokenKind::Yield => StmtKind::Expr(self.yield_expr()?),
            TokenKind::Import => self.import()?,
            TokenKind::From => self.import_from()?,
            TokenKind::Name
                if self.check_name("type")
                    && self.peek_kind(1) == TokenKind::Name
                    && matches!(self.peek_kind(2), TokenKind::Eq | TokenKind::LBracket) =>
            {
                self.advance();
                let name = self.expect_name()?;
                if self.check(TokenKind::LBracket) {
                    self.skip_balanced()?;
                }
                self.expect(TokenKind::Eq)?;
                let value = self.expression()?;
                StmtKind::TypeAlias { name, value }
            }
            _ => self.expr_stmt()?,
        };
        Ok(Stmt::new(kind, self.span_from(start)))
    }

    fn expr_stmt(&mut self) -> ParseResult<StmtKind> {
        let first = self.star_expressions()?;
        if self.eat(TokenKind::Colon).is_some() {
            let annotation = self.expression()?;
            let value = if self.eat(TokenKind::Eq).is_some() {
                Some(self.assignment_value()?)
            } else {
                None
            };
            return Ok(StmtKind::AnnAssign {
                target: first,
                annotation,
                value,
            });
        }
        if self.eat(TokenKind::Eq).is_some() {
            let mut targets = vec![first];
            let mut value = self.assignment_value()?;
            while self.eat(TokenKind::Eq).is_some() {
                targets.push(value);
                value = self.assignment_value()?;
            }
            return Ok(StmtKind::Assign { targets, value });
        }
        if self.check(TokenKind::AugAssign) {
            let op = self.advance().lexeme;
            let value = self.assignment_value()?;
            return Ok(StmtKind::AugAssign {
                target: first,
                op,
                value,
            });
        }
        Ok(StmtKind::Expr(first))
    }

    fn assignment_value(&mut self) -> ParseResult<Expr> {
        if self.check(TokenKind::Yield) {
            self.yield_expr()
        } else {
            self.star_expressions()
        }
    }

    fn import(&mut self) -> ParseResult<StmtKind> {
        self.expect(TokenKind::Import)?;
        let mut names = Vec::new();
        loop {
            let start = self.current().span;
            let name = self.dotted_name()?;
            let asname = if self.eat(TokenKind::As).is_some() {
                Some(self.expect_name()?)
            } else {
                None
            };
            names.push(Alias {
                name,
                asname,
                span: self.span_from(start),
            });
            if self.eat(TokenKind::Comma).is_none() {
                break;
            }
        }
        Ok(StmtKind::Import(names))
    }

    fn import_from(&mut self) -> ParseResult<StmtKind> {
        self.expect(TokenKind::From)?;
        let mut level = 0;
        loop {
            if self.eat(TokenKind::Dot).is_some() {
                level += 1;
            } else if self.eat(TokenKind::Ellipsis).is_some() {
                level += 3;
            } else {
                break;
            }
        }
        let module = if self.check(TokenKind::Name) {
            Some(self.dotted_name()?)
        } else {
            None
        };
        if module.is_none() && level == 0 {
            return Err(ParseError::new(
                ParseErrorKind::ExpectedIdentifier,
                self.current().span,
            ));
        }
        self.expect(TokenKind::Import)?;

        let mut names = Vec::new();
        if let Some(star) = self.eat(TokenKind::Star) {
            names.push(Alias {
                name: "*".to_string(),
                asname: None,
                span: star.span,
            });
            return Ok(StmtKind::ImportFrom {
                module,
                level,
                names,
            });
        }
        let parenthesized = self.eat(TokenKind::LParen).is_some();
        loop {
            if parenthesized && self.check(TokenKind::RParen) {
                break;
            }
            let name = self.expect_name()?;
            let asname = if self.eat(TokenKind::As).is_some() {
                Some(self.expect_name()?)
            } else {
                None
            };
            names.push(Alias {
                span: self.span_from(name.span),
                name: name.name,
                asname,
            });
            if self.eat(TokenKind::Comma).is_none() {
                break;
            }
        }
        if parenthesized {
            self.expect(TokenKind::RParen)?;
        }
        Ok(StmtKind::ImportFrom {
            module,
            level,
            names,
        })
    }

    fn dotted_name(&mut self) -> ParseResult<String> {
        let mut name = self.expect_name()?.name;
        while self.eat(TokenKind::Dot).is_some() {
            name.push('.');
            name.push_str(&self.expect_name()?.name);
        }
        Ok(name)
    }

    fn decorated(&mut self) -> ParseResult<Stmt> {
        let start = self.current().span;
        let mut decorators = Vec::new();
        while self.eat(TokenKind::At).is_some() {
            decorators.push(self.expression()?);
            self.expect(TokenKind::Newline)?;
        }
        match self.current_kind() {
            TokenKind::Def | TokenKind::Async => self.function_def(decorators, start),
            TokenKind::Class => self.class_def(decorators, start),
            found => Err(ParseError::new(
                ParseErrorKind::UnexpectedToken {
                    found,
                    expected: ExpectedToken::OneOf(vec![TokenKind::Def, TokenKind::Class]),
                },
                self.current().span,
            )
            .with_hint("decorators must be followed by a function or class definition")),
        }
    }

    fn function_def(&mut self, decorators: Vec<Expr>, start: Span) -> ParseResult<Stmt> {
        let is_async = self.eat(TokenKind::Async).is_some();
        self.expect(TokenKind::Def)?;
        let name = self.expect_name()?;
        if self.check(TokenKind::LBracket) {
            self.skip_balanced()?;
        }
        self.expect(TokenKind::LParen)?;
        let params = self.parameters()?;
        self.expect(TokenKind::RParen)?;
        let returns = if self.eat(TokenKind::Arrow).is_some() {
            Some(self.expression()?)
        } else {
            None
        };
        let body = self.suite()?;
        Ok(Stmt::new(
            StmtKind::FunctionDef(FunctionDef {
                name,
                params,
                returns,
                body,
                decorators,
                is_async,
            }),
            self.span_from(start),
        ))
    }

    fn parameters(&mut self) -> ParseResult<Vec<Param>> {
        let mut params: Vec<Param> = Vec::new();
        let mut after_star = false;
        while !self.check(TokenKind::RParen) {
            if self.eat(TokenKind::Slash).is_some() {
                for param in &mut params {
                    if param.kind == ParamKind::PositionalOrKeyword {
                        param.kind = ParamKind::PositionalOnly;
                    }
                }
            } else if self.eat(TokenKind::Star).is_some() {
                after_star = true;
                if self.check(TokenKind::Name) {
                    params.push(self.parameter(ParamKind::VarPositional)?);
                }
            } else if self.eat(TokenKind::DoubleStar).is_some() {
                params.push(self.parameter(ParamKind::VarKeyword)?);
            } else {
                let kind = if after_star {
                    ParamKind::KeywordOnly
                } else {
                    ParamKind::PositionalOrKeyword
                };
                params.push(self.parameter(kind)?);
            }
            if self.eat(TokenKind::Comma).is_none() {
                break;
            }
        }
        Ok(params)
    }

    fn parameter(&mut self, kind: ParamKind) -> ParseResult<Param> {
        let name = self.expect_name()?;
        let annotation = if self.eat(TokenKind::Colon).is_some() {
            Some(self.star_expression()?)
        } else {
            None
        };
        let default = if self.eat(TokenKind::Eq).is_some() {
            Some(self.expression()?)
        } else {
            None
        };
        Ok(Param {
            name,
            kind,
            annotation,
            default,
        })
    }

    fn class_def(&mut self, decorators: Vec<Expr>, start: Span) -> ParseResult<Stmt> {
        self.expect(TokenKind::Class)?;
        let name = self.expect_name()?;
        if self.check(TokenKind::LBracket) {
            self.skip_balanced()?;
        }
        let (bases, keywords) = if self.eat(TokenKind::LParen).is_some() {
            self.arguments()?
        } else {
            (Vec::new(), Vec::new())
        };
        let body = self.suite()?;
        Ok(Stmt::new(
            StmtKind::ClassDef(ClassDef {
                name,
                bases,
                keywords,
                body,
                decorators,
            }),
            self.span_from(start),
        ))
    }

    fn if_stmt(&mut self) -> ParseResult<Stmt> {
        let start = self.advance().span; // `if` or `elif`
        let test = self.expression()?;
        let body = self.suite()?;
        let orelse = if self.check(TokenKind::Elif) {
            vec![self.if_stmt()?]
        } else if self.eat(TokenKind::Else).is_some() {
            self.suite()?
        } else {
            Vec::new()
        };
        Ok(Stmt::new(
            StmtKind::If { test, body, orelse },
            self.span_from(start),
        ))
    }

    /// `for`, `while` and `with` (optionally `async`): the header is skipped
    fn header_block(&mut self) -> ParseResult<Stmt> {
        let start = self.current().span;
        self.eat(TokenKind::Async);
        let keyword = self.advance().kind;
        self.skip_header("block header")?;
        let mut bodies = vec![self.suite()?];
        if keyword != TokenKind::With && self.eat(TokenKind::Else).is_some() {
            bodies.push(self.suite()?);
        }
        Ok(Stmt::new(StmtKind::Block(bodies), self.span_from(start)))
    }

    fn try_stmt(&mut self) -> ParseResult<Stmt> {
        let start = self.advance().span;
        let body = self.suite()?;
        let mut handlers = Vec::new();
        while self.eat(TokenKind::Except).is_some() {
            self.eat(TokenKind::Star);
            self.skip_header("except clause")?;
            handlers.push(self.suite()?);
        }
        let orelse = if self.eat(TokenKind::Else).is_some() {
            self.suite()?
        } else {
            Vec::new()
        };
        let finalbody = if self.eat(TokenKind::Finally).is_some() {
            self.suite()?
        } else {
            Vec::new()
        };
        Ok(Stmt::new(
            StmtKind::Try {
                body,
                handlers,
                orelse,
                finalbody,
            },
            self.span_from(start),
        ))
    }

    /// `match subject:` line followed by an indented block
    fn looks_like_match(&self) -> bool {
        if matches!(
            self.peek_kind(1),
            TokenKind::Eq | TokenKind::AugAssign | TokenKind::Colon | TokenKind::Dot
        ) {
            return false;
        }
        let mut index = self.position;
        while index + 2 < self.tokens.len() {
            if self.tokens[index + 1].kind == TokenKind::Newline {
                return self.tokens[index].kind == TokenKind::Colon
                    && self.tokens[index + 2].kind == TokenKind::Indent;
            }
            index += 1;
        }
        false
    }

    fn match_stmt(&mut self) -> ParseResult<Stmt> {
        let start = self.advance().span;
        self.skip_header("match subject")?;
        self.expect(TokenKind::Colon)?;
        self.expect(TokenKind::Newline)?;
        self.expect(TokenKind::Indent)?;
        let mut cases = Vec::new();
        while !self.check(TokenKind::Dedent) && !self.is_eof() {
            if !self.check_name("case") {
                return Err(ParseError::new(
                    ParseErrorKind::UnexpectedToken {
                        found: self.current_kind(),
                        expected: ExpectedToken::Description("case clause".to_string()),
                    },
                    self.current().span,
                ));
            }
            self.advance();
            self.skip_header("case pattern")?;
            cases.push(self.suite()?);
        }
        self.eat(TokenKind::Dedent);
        Ok(Stmt::new(StmtKind::Block(cases), self.span_from(start)))
    }

    // ==================== Expressions ====================

    /// A possibly unparenthesized tuple: `a, *b = ...`
    fn star_expressions(&mut self) -> ParseResult<Expr> {
        let first = self.star_expression()?;
        if !self.check(TokenKind::Comma) {
            return Ok(first);
        }
        let start = first.span;
        let mut items = vec![first];
        while self.eat(TokenKind::Comma).is_some() {
            if self.at_expression_end() {
                break;
            }
            items.push(self.star_expression()?);
        }
        Ok(Expr::new(ExprKind::Tuple(items), self.span_from(start)))
    }

    fn at_expression_end(&self) -> bool {
        matches!(
            self.current_kind(),
            TokenKind::Newline
                | TokenKind::Eof
                | TokenKind::Semicolon
                | TokenKind::Eq
                | TokenKind::Colon
                | TokenKind::AugAssign
                | TokenKind::RParen
                | TokenKind::RBracket
                | TokenKind::RBrace
        )
    }

    fn star_expression(&mut self) -> ParseResult<Expr> {
        if let Some(star) = self.eat(TokenKind::Star) {
            let inner = self.binary()?;
            return Ok(Expr::new(
                ExprKind::Starred(Box::new(inner)),
                self.span_from(star.span),
            ));
        }
        self.expression()
    }

    fn expression(&mut self) -> ParseResult<Expr> {
        if self.check(TokenKind::Lambda) {
            return self.lambda();
        }
        let expr = self.binary()?;
        if self.eat(TokenKind::ColonEq).is_some() {
            self.expression()?;
            return Ok(Expr::new(ExprKind::Other, self.span_from(expr.span)));
        }
        if self.eat(TokenKind::If).is_some() {
            self.binary()?;
            self.expect(TokenKind::Else)?;
            self.expression()?;
            return Ok(Expr::new(ExprKind::Other, self.span_from(expr.span)));
        }
        Ok(expr)
    }

    fn lambda(&mut self) -> ParseResult<Expr> {
        let start = self.advance().span;
        self.skip_header("lambda parameters")?;
        self.expect(TokenKind::Colon)?;
        self.expression()?;
        Ok(Expr::new(ExprKind::Other, self.span_from(start)))
    }

    fn yield_expr(&mut self) -> ParseResult<Expr> {
        let start = self.advance().span;
        self.eat(TokenKind::From);
        if !self.at_expression_end() {
            self.star_expressions()?;
        }
        Ok(Expr::new(ExprKind::Other, self.span_from(start)))
    }

    /// Binary operator chains, parsed left-associatively without precedence
    fn binary(&mut self) -> ParseResult<Expr> {
        let mut left = self.unary()?;
        while let Some(op) = self.binary_operator() {
            let right = self.unary()?;
            let span = left.span.to(right.span);
            left = Expr::new(
                ExprKind::BinOp {
                    left: Box::new(left),
                    op,
                    right: Box::new(right),
                },
                span,
            );
        }
        Ok(left)
    }

    fn binary_operator(&mut self) -> Option<String> {
        let op = match self.current_kind() {
            TokenKind::Operator if self.current().lexeme != "~" => self.current().lexeme.clone(),
            TokenKind::Star
            | TokenKind::Slash
            | TokenKind::DoubleStar
            | TokenKind::At
            | TokenKind::And
            | TokenKind::Or
            | TokenKind::In => self.current().lexeme.clone(),
            TokenKind::Is => {
                self.advance();
                if self.eat(TokenKind::Not).is_some() {
                    return Some("is not".to_string());
                }
                return Some("is".to_string());
            }
            TokenKind::Not if self.peek_kind(1) == TokenKind::In => {
                self.advance();
                self.advance();
                return Some("not in".to_string());
            }
            _ => return None,
        };
        self.advance();
        Some(op)
    }

    fn unary(&mut self) -> ParseResult<Expr> {
        let is_prefix = match self.current_kind() {
            TokenKind::Operator => matches!(self.current().lexeme.as_str(), "-" | "+" | "~"),
            TokenKind::Not | TokenKind::Await => true,
            _ => false,
        };
        if is_prefix {
            let start = self.advance().span;
            let operand = self.unary()?;
            return Ok(Expr::new(ExprKind::Other, start.to(operand.span)));
        }
        self.primary()
    }

    fn primary(&mut self) -> ParseResult<Expr> {
        let mut expr = self.atom()?;
        loop {
            match self.current_kind() {
                TokenKind::Dot => {
                    self.advance();
                    let attr = self.expect_name()?;
                    let span = expr.span.to(attr.span);
                    expr = Expr::new(
                        ExprKind::Attribute {
                            value: Box::new(expr),
                            attr: attr.name,
                        },
                        span,
                    );
                }
                TokenKind::LParen => {
                    self.advance();
                    let (args, keywords) = self.arguments()?;
                    let span = self.span_from(expr.span);
                    expr = Expr::new(
                        ExprKind::Call {
                            func: Box::new(expr),
                            args,
                            keywords,
                        },
                        span,
                    );
                }
                TokenKind::LBracket => {
                    let open = self.current().span;
                    let inner = self.skip_balanced()?;
                    let index = Expr::new(ExprKind::Other, Span::new(open.end, inner.end - 1));
                    let span = self.span_from(expr.span);
                    expr = Expr::new(
                        ExprKind::Subscript {
                            value: Box::new(expr),
                            index: Box::new(index),
                        },
                        span,
                    );
                }
                _ => return Ok(expr),
            }
        }
    }

    /// Call arguments after `(`, consuming the closing `)`
    fn arguments(&mut self) -> ParseResult<(Vec<Expr>, Vec<Keyword>)> {
        let mut args = Vec::new();
        let mut keywords = Vec::new();
        while !self.check(TokenKind::RParen) {
            if self.check(TokenKind::Star) {
                args.push(self.star_expression()?);
            } else if self.eat(TokenKind::DoubleStar).is_some() {
                keywords.push(Keyword {
                    name: None,
                    value: self.expression()?,
                });
            } else if self.check(TokenKind::Name) && self.peek_kind(1) == TokenKind::Eq {
                let name = self.expect_name()?;
                self.advance();
                keywords.push(Keyword {
                    name: Some(name.name),
                    value: self.expression()?,
                });
            } else {
                let arg = self.expression()?;
                if self.check(TokenKind::For) || self.check(TokenKind::Async) {
                    // bare generator argument: `f(x for x in y)`
                    let end = self.skip_to_closer()?;
                    args.push(Expr::new(ExprKind::Other, Span::new(arg.span.start, end.start)));
                    return Ok((args, keywords));
                }
                args.push(arg);
            }
            if self.eat(TokenKind::Comma).is_none() {
                break;
            }
        }
        self.expect(TokenKind::RParen)?;
        Ok((args, keywords))
    }

    fn atom(&mut self) -> ParseResult<Expr> {
        let token = self.current().clone();
        match token.kind {
            TokenKind::Name => {
                self.advance();
                Ok(Expr::new(ExprKind::Name(token.lexeme), token.span))
            }
            TokenKind::Number
            | TokenKind::NoneLiteral
            | TokenKind::True
            | TokenKind::False
            | TokenKind::Ellipsis => {
                self.advance();
                Ok(Expr::new(ExprKind::Constant, token.span))
            }
            TokenKind::String | TokenKind::LongString => Ok(self.strings()),
            TokenKind::LParen => self.parenthesized(),
            TokenKind::LBracket => self.list(),
            TokenKind::LBrace => {
                let span = self.skip_balanced()?;
                Ok(Expr::new(ExprKind::Other, span))
            }
            TokenKind::Lambda => self.lambda(),
            TokenKind::Eof => Err(ParseError::new(ParseErrorKind::UnexpectedEof, token.span)),
            _ => Err(ParseError::new(
                ParseErrorKind::ExpectedExpression,
                token.span,
            )),
        }
    }

    /// Adjacent string literals, concatenated
    fn strings(&mut self) -> Expr {
        let start = self.current().span;
        let mut lit = StrLit {
            value: String::new(),
            bytes: false,
            formatted: false,
        };
        while self.current_kind().is_string() {
            let part = decode_string(&self.advance().lexeme);
            lit.value.push_str(&part.value);
            lit.bytes |= part.bytes;
            lit.formatted |= part.formatted;
        }
        Expr::new(ExprKind::Str(lit), self.span_from(start))
    }

    fn parenthesized(&mut self) -> ParseResult<Expr> {
        let start = self.advance().span;
        if self.eat(TokenKind::RParen).is_some() {
            return Ok(Expr::new(ExprKind::Tuple(Vec::new()), self.span_from(start)));
        }
        if self.check(TokenKind::Yield) {
            self.yield_expr()?;
            self.expect(TokenKind::RParen)?;
            return Ok(Expr::new(ExprKind::Other, self.span_from(start)));
        }
        let first = self.star_expression()?;
        if self.check(TokenKind::For) || self.check(TokenKind::Async) {
            self.skip_to_closer()?;
            return Ok(Expr::new(ExprKind::Other, self.span_from(start)));
        }
        if !self.check(TokenKind::Comma) {
            self.expect(TokenKind::RParen)?;
            return Ok(first);
        }
        let mut items = vec![first];
        while self.eat(TokenKind::Comma).is_some() {
            if self.check(TokenKind::RParen) {
                break;
            }
            items.push(self.star_expression()?);
        }
        self.expect(TokenKind::RParen)?;
        Ok(Expr::new(ExprKind::Tuple(items), self.span_from(start)))
    }

    fn list(&mut self) -> ParseResult<Expr> {
        let start = self.advance().span;
        let mut items = Vec::new();
        while !self.check(TokenKind::RBracket) {
            let item = self.star_expression()?;
            if items.is_empty() && (self.check(TokenKind::For) || self.check(TokenKind::Async)) {
                self.skip_to_closer()?;
                return Ok(Expr::new(ExprKind::Other, self.span_from(start)));
            }
            items.push(item);
            if self.eat(TokenKind::Comma).is_none() {
                break;
            }
        }
        self.expect(TokenKind::RBracket)?;
        Ok(Expr::new(ExprKind::List(items), self.span_from(start)))
    }

    // ==================== Skipping ====================

    /// Skip a bracketed group starting at the opening bracket, returning its span
    fn skip_balanced(&mut self) -> ParseResult<Span> {
        let start = self.advance().span;
        let end = self.skip_to_closer()?;
        Ok(start.to(end))
    }

    /// Skip to and consume the bracket closing the current group
    fn skip_to_closer(&mut self) -> ParseResult<Span> {
        let mut depth = 1u32;
        loop {
            if self.is_eof() {
                return Err(ParseError::new(
                    ParseErrorKind::UnexpectedEof,
                    self.current().span,
                ));
            }
            let token = self.advance();
            if token.kind.opens_bracket() {
                depth += 1;
            } else if token.kind.closes_bracket() {
                depth -= 1;
                if depth == 0 {
                    return Ok(token.span);
                }
            }
        }
    }

    /// Skip to (not past) the `:` ending a compound statement header
    fn skip_header(&mut self, context: &'static str) -> ParseResult<()> {
        let mut depth = 0u32;
        loop {
            match self.current_kind() {
                TokenKind::Colon if depth == 0 => return Ok(()),
                TokenKind::Newline | TokenKind::Eof => {
                    return Err(ParseError::new(
                        ParseErrorKind::ExpectedAfter {
                            expected: ":",
                            context,
                        },
                        self.current().span,
                    ));
                }
                kind if kind.opens_bracket() => depth += 1,
                kind if kind.closes_bracket() => depth = depth.saturating_sub(1),
                _ => {}
            }
            self.advance();
        }
    }

    /// Skip an indented block including nested blocks
    fn skip_block(&mut self) {
        let mut depth = 0u32;
        while !self.is_eof() {
            match self.advance().kind {
                TokenKind::Indent => depth += 1,
                TokenKind::Dedent => {
                    depth = depth.saturating_sub(1);
                    if depth == 0 {
                        return;
                    }
                }
                _ => {}
            }
        }
    }

    /// Recover after an error: drop the rest of the logical line and any
    /// block it opened
    fn synchronize(&mut self) {
        let start = self.position;
        while !self.at_logical_end() && !self.check(TokenKind::Dedent) {
            self.advance();
        }
        if self.eat(TokenKind::Newline).is_some() && self.check(TokenKind::Indent) {
            self.skip_block();
        }
        if self.position == start && !self.is_eof() && !self.check(TokenKind::Dedent) {
            self.advance();
        }
    }
}

// ==================== Helper Functions ====================

/// Decode one string literal token, prefix and quotes included
fn decode_string(lexeme: &str) -> StrLit {
    let prefix_len = lexeme.find(['"', '\'']).unwrap_or(0);
    let prefix = lexeme[..prefix_len].to_ascii_lowercase();
    let body = &lexeme[prefix_len..];
    let quote_len = if body.starts_with("\"\"\"") || body.starts_with("'''") {
        3
    } else {
        1
    };
    let inner = body
        .get(quote_len..body.len().saturating_sub(quote_len))
        .unwrap_or("")
        .replace("\r\n", "\n");
    let value = if prefix.contains('r') {
        inner
    } else {
        unescape(&inner)
    };
    StrLit {
        value,
        bytes: prefix.contains('b'),
        formatted: prefix.contains('f'),
    }
}

fn unescape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        let Some(escaped) = chars.next() else {
            out.push('\\');
            break;
        };
        match escaped {
            '\n' => {}
            'n' => out.push('\n'),
            't' => out.push('\t'),
            'r' => out.push('\r'),
            'a' => out.push('\x07'),
            'b' => out.push('\x08'),
            'f' => out.push('\x0c'),
            'v' => out.push('\x0b'),
            '\\' | '\'' | '"' => out.push(escaped),
            '0'..='7' => {
                let mut value = escaped.to_digit(8).unwrap_or(0);
                for _ in 0..2 {
                    match chars.peek().and_then(|d| d.to_digit(8)) {
                        Some(digit) => {
                            value = value * 8 + digit;
                            chars.next();
                        }
                        None => break,
                    }
                }
                out.extend(char::from_u32(value));
            }
            'x' | 'u' | 'U' => {
                let width = match escaped {
                    'x' => 2,
                    'u' => 4,
                    _ => 8,
                };
                let mut digits = String::new();
                while digits.len() < width {
                    match chars.peek() {
                        Some(d) if d.is_ascii_hexdigit() => {
                            digits.push(*d);
                            chars.next();
                        }
                        _ => break,
                    }
                }
                let decoded = (digits.len() == width)
                    .then(|| u32::from_str_radix(&digits, 16).ok())
                    .flatten()
                    .and_then(char::from_u32);
                match decoded {
                    Some(ch) => out.push(ch),
                    None => {
                        out.push('\\');
                        out.push(escaped);
                        out.push_str(&digits);
                    }
                }
            }
            other => {
                out.push('\\');
                out.push(other);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Spanned;

    fn parse(source: &str) -> Module {
        match Parser::parse_module(source) {
            Ok(module) => module,
            Err(errors) => panic!("parse failed: {errors:?}"),
        }
    }

    #[test]
    fn assignment_followed_by_docstring() {
        let module = parse("X = 1\n\"\"\"the answer\"\"\"\n");
        assert!(matches!(module.body[0].kind, StmtKind::Assign { .. }));
        assert_eq!(module.body[1].as_docstring(), Some("the answer"));
    }

    #[test]
    fn yield_statements_in_generators() {
        let module = parse(
            "def gen():\n    yield\n    yield 1, 2\n    yield from other()\n    x = yield\n\nY = 2\n\"\"\"doc\"\"\"\n",
        );
        let StmtKind::FunctionDef(func) = &module.body[0].kind else {
            panic!("expected function");
        };
        assert_eq!(func.body.len(), 4);
        assert!(matches!(func.body[0].kind, StmtKind::Expr(_)));
        assert!(matches!(func.body[3].kind, StmtKind::Assign { .. }));
        assert_eq!(module.body[2].as_docstring(), Some("doc"));
    }

    #[test]
    fn chained_and_tuple_assignments() {
        let module = parse("a = b = 1\nc, (d, *e) = f()\n");
        let StmtKind::Assign { targets, .. } = &module.body[0].kind else {
            panic!("expected assignment");
        };
        assert_eq!(targets.len(), 2);
        let StmtKind::Assign { targets, .. } = &module.body[1].kind else {
            panic!("expected assignment");
        };
        assert_eq!(targets[0].target_names(), vec!["c", "d", "e"]);
    }

    #[test]
    fn annotated_assignment() {
        let source = "x: dict[str, int] = {}\ny: int\n";
        let module = parse(source);
        let StmtKind::AnnAssign {
            annotation, value, ..
        } = &module.body[0].kind
        else {
            panic!("expected annotated assignment");
        };
        assert_eq!(annotation.source_text(source), "dict[str, int]");
        assert!(value.is_some());
        assert!(matches!(
            module.body[1].kind,
            StmtKind::AnnAssign { value: None, .. }
        ));
    }

    #[test]
    fn function_signature() {
        let source = "@staticmethod\nasync def f(a, /, b: int = 2, *args, c, **kw) -> str:\n    \"\"\"Doc.\"\"\"\n    return a\n";
        let module = parse(source);
        let StmtKind::FunctionDef(func) = &module.body[0].kind else {
            panic!("expected function");
        };
        assert!(func.is_async);
        assert!(func.has_decorator("staticmethod"));
        assert_eq!(func.docstring(), Some("Doc."));
        let kinds: Vec<_> = func.params.iter().map(|p| p.kind).collect();
        assert_eq!(
            kinds,
            vec![
                ParamKind::PositionalOnly,
                ParamKind::PositionalOrKeyword,
                ParamKind::VarPositional,
                ParamKind::KeywordOnly,
                ParamKind::VarKeyword,
            ]
        );
        assert_eq!(
            func.params[1].default.as_ref().map(|d| d.source_text(source)),
            Some("2")
        );
        assert_eq!(
            func.returns.as_ref().map(|r| r.source_text(source)),
            Some("str")
        );
        // the statement span starts at the decorator
        assert!(module.body[0].source_text(source).starts_with("@staticmethod"));
    }

    #[test]
    fn class_with_bases_and_keywords() {
        let source = "class A(Base, typing.Generic[T], metaclass=Meta):\n    x = 1\n\n    class Inner: pass\n";
        let module = parse(source);
        let StmtKind::ClassDef(class) = &module.body[0].kind else {
            panic!("expected class");
        };
        let bases: Vec<_> = class
            .bases
            .iter()
            .filter_map(|b| b.without_subscript().dotted_name())
            .collect();
        assert_eq!(bases, vec!["Base", "typing.Generic"]);
        assert_eq!(class.keywords[0].name.as_deref(), Some("metaclass"));
        assert_eq!(class.body.len(), 2);
    }

    #[test]
    fn imports() {
        let module = parse("import os.path as p, sys\nfrom ..pkg import (a as b,\n    c,)\nfrom . import *\n");
        let StmtKind::Import(names) = &module.body[0].kind else {
            panic!("expected import");
        };
        assert_eq!(names[0].bound_name(), "p");
        assert_eq!(names[1].bound_name(), "sys");
        let StmtKind::ImportFrom {
            module: from,
            level,
            names,
        } = &module.body[1].kind
        else {
            panic!("expected from-import");
        };
        assert_eq!((from.as_deref(), *level), (Some("pkg"), 2));
        assert_eq!(names.len(), 2);
        assert!(matches!(
            &module.body[2].kind,
            StmtKind::ImportFrom { module: None, level: 1, names } if names[0].name == "*"
        ));
    }

    #[test]
    fn control_flow_bodies() {
        let source = "\
if TYPE_CHECKING:
    import x
elif y:
    pass
else:
    z = 1
try:
    a = 1
except (ValueError, KeyError) as e:
    a = 2
finally:
    pass
for i in range(3):
    pass
with open(f) as fh, lock:
    pass
match command:
    case [x, *rest] if x:
        pass
    case _:
        pass
";
        let module = parse(source);
        assert_eq!(module.body.len(), 5);
        let StmtKind::If { orelse, .. } = &module.body[0].kind else {
            panic!("expected if");
        };
        assert!(matches!(orelse[0].kind, StmtKind::If { .. }));
        assert!(matches!(module.body[1].kind, StmtKind::Try { .. }));
        assert!(matches!(&module.body[4].kind, StmtKind::Block(cases) if cases.len() == 2));
    }

    #[test]
    fn opaque_expressions() {
        let source = "a = {k: v for k, v in items}\nb = [i for i in x if i]\nc = lambda x, y=1: x if y else -y\nd = x[1:2, ::3]\ne = not a and b is not None\nf = (yield)\n";
        let module = parse(source);
        assert_eq!(module.body.len(), 6);
    }

    #[test]
    fn string_decoding() {
        let module = parse("s = 'a' \"b\" r'\\n' '\\x41\\u00e9\\101'\nb = b'x'\n");
        let StmtKind::Assign { value, .. } = &module.body[0].kind else {
            panic!("expected assignment");
        };
        assert_eq!(value.as_str(), Some("ab\\nAéA"));
        let StmtKind::Assign { value, .. } = &module.body[1].kind else {
            panic!("expected assignment");
        };
        assert_eq!(value.as_str(), None);
    }

    #[test]
    fn soft_keywords_as_names() {
        let module = parse("type = 1\nmatch = re.match(x)\ntype Point = tuple[float, float]\n");
        assert!(matches!(module.body[0].kind, StmtKind::Assign { .. }));
        assert!(matches!(module.body[1].kind, StmtKind::Assign { .. }));
        assert!(matches!(module.body[2].kind, StmtKind::TypeAlias { .. }));
    }

    #[test]
    fn strict_parse_reports_errors() {
        assert!(Parser::parse_module("def f(:\n    pass\n").is_err());
        assert!(Parser::parse_module("x = (1,\n").is_err());
    }

    #[test]
    fn recovering_parse_keeps_good_statements() {
        let (module, errors) =
            Parser::parse_module_recovering("a = 1\ndef broken(:\n    pass\nb = 2\n");
        assert_eq!(errors.len(), 1);
        let names: Vec<_> = module
            .body
            .iter()
            .filter_map(|s| match &s.kind {
                StmtKind::Assign { targets, .. } => targets[0].dotted_name(),
                _ => None,
            })
            .collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn parse_single_expression() {
        let expr = Parser::parse_expression("Optional[List[int]]").unwrap();
        assert!(matches!(expr.kind, ExprKind::Subscript { .. }));
        assert!(Parser::parse_expression("a b").is_err());
    }
}
