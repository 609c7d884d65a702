//! Recursive-descent parser over the token stream from [`crate::lexer`].
//!
//! Expression precedence follows the Python grammar from `lambda` down to
//! primaries. Every node records the byte span of the text it was built from.

use crate::ast::*;
use crate::error::{ParseError, ParseErrorCode, Result};
use crate::lexer::{tokenize, StrToken, Token, TokenKind};
use crate::literal::{normalize_float, normalize_imaginary, normalize_int};
use crate::span::Span;

const KEYWORDS: &[&str] = &[
    "False", "None", "True", "and", "as", "assert", "async", "await", "break", "class", "continue",
    "def", "del", "elif", "else", "except", "finally", "for", "from", "global", "if", "import",
    "in", "is", "lambda", "nonlocal", "not", "or", "pass", "raise", "return", "try", "while",
    "with", "yield",
];

const AUGMENTED_ASSIGN: &[&str] = &[
    "+=", "-=", "*=", "@=", "/=", "//=", "%=", "**=", "<<=", ">>=", "&=", "|=", "^=",
];

pub fn is_keyword(name: &str) -> bool {
    KEYWORDS.contains(&name)
}

/// Parse a complete program.
pub fn parse(source: &str) -> Result<Module> {
    let tokens = tokenize(source)?;
    Parser::new(tokens).parse_module()
}

/// Parse a standalone expression such as a predicted fragment.
/// Surrounding whitespace is ignored.
pub fn parse_expression(source: &str) -> Result<Expr> {
    let tokens = tokenize(source.trim())?;
    let mut parser = Parser::new(tokens);
    let expr = parser.parse_star_expressions_or_yield()?;
    while matches!(parser.kind(), TokenKind::Newline) {
        parser.advance();
    }
    if !matches!(parser.kind(), TokenKind::EndOfFile) {
        return Err(parser.unexpected("end of expression"));
    }
    Ok(expr)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn new(tokens: Vec<Token>) -> Self {
        Self { tokens, pos: 0 }
    }

    // -----------------------------------------------------------------------
    // Token helpers
    // -----------------------------------------------------------------------

    fn peek_nth(&self, n: usize) -> &Token {
        let last = self.tokens.len().saturating_sub(1);
        &self.tokens[(self.pos + n).min(last)]
    }

    fn kind(&self) -> &TokenKind {
        &self.peek_nth(0).kind
    }

    fn start(&self) -> Span {
        self.peek_nth(0).span
    }

    fn advance(&mut self) -> Token {
        let token = self.peek_nth(0).clone();
        if !matches!(token.kind, TokenKind::EndOfFile) {
            self.pos += 1;
        }
        token
    }

    fn prev_end(&self) -> usize {
        if self.pos == 0 {
            0
        } else {
            self.tokens[self.pos - 1].span.end
        }
    }

    fn span_from(&self, start: Span) -> Span {
        Span::new(start.start, self.prev_end().max(start.start), start.line, start.column)
    }

    fn at_op(&self, op: &str) -> bool {
        matches!(self.kind(), TokenKind::Op(o) if *o == op)
    }

    fn nth_is_op(&self, n: usize, op: &str) -> bool {
        matches!(&self.peek_nth(n).kind, TokenKind::Op(o) if *o == op)
    }

    fn at_keyword(&self, kw: &str) -> bool {
        matches!(self.kind(), TokenKind::Name(n) if n == kw)
    }

    fn nth_is_keyword(&self, n: usize, kw: &str) -> bool {
        matches!(&self.peek_nth(n).kind, TokenKind::Name(name) if name == kw)
    }

    fn eat_op(&mut self, op: &str) -> bool {
        if self.at_op(op) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn eat_keyword(&mut self, kw: &str) -> bool {
        if self.at_keyword(kw) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect_op(&mut self, op: &str) -> Result<()> {
        if self.eat_op(op) {
            Ok(())
        } else {
            Err(self.unexpected(&format!("'{op}'")))
        }
    }

    fn expect_keyword(&mut self, kw: &str) -> Result<()> {
        if self.eat_keyword(kw) {
            Ok(())
        } else {
            Err(self.unexpected(&format!("'{kw}'")))
        }
    }

    fn expect_name(&mut self) -> Result<String> {
        match self.kind() {
            TokenKind::Name(name) if !is_keyword(name) => {
                let name = name.clone();
                self.advance();
                Ok(name)
            }
            _ => Err(self.unexpected("identifier")),
        }
    }

    fn expect_newline(&mut self) -> Result<()> {
        match self.kind() {
            TokenKind::Newline => {
                self.advance();
                Ok(())
            }
            TokenKind::EndOfFile => Ok(()),
            _ => Err(self.unexpected("end of line")),
        }
    }

    fn at_name(&self) -> bool {
        matches!(self.kind(), TokenKind::Name(n) if !is_keyword(n))
    }

    fn unexpected(&self, expected: &str) -> ParseError {
        let token = self.peek_nth(0);
        let (code, found) = match &token.kind {
            TokenKind::EndOfFile => (ParseErrorCode::UnexpectedEof, "end of input".to_string()),
            TokenKind::Newline => (ParseErrorCode::UnexpectedToken, "newline".to_string()),
            TokenKind::Indent => (ParseErrorCode::UnexpectedToken, "indent".to_string()),
            TokenKind::Dedent => (ParseErrorCode::UnexpectedToken, "dedent".to_string()),
            TokenKind::Name(n) => (ParseErrorCode::UnexpectedToken, format!("'{n}'")),
            TokenKind::Op(o) => (ParseErrorCode::UnexpectedToken, format!("'{o}'")),
            TokenKind::Int(t) | TokenKind::Float(t) | TokenKind::Imaginary(t) => {
                (ParseErrorCode::UnexpectedToken, format!("number {t}"))
            }
            TokenKind::Str(s) => (ParseErrorCode::UnexpectedToken, format!("string {}", s.raw)),
        };
        ParseError::new(
            code,
            format!("expected {expected}, found {found}"),
            token.span.line,
            token.span.column,
        )
    }

    /// True where an expression list may legally stop.
    fn at_expression_end(&self) -> bool {
        match self.kind() {
            TokenKind::Newline | TokenKind::EndOfFile | TokenKind::Dedent => true,
            TokenKind::Op(o) => {
                matches!(*o, ")" | "]" | "}" | "=" | ";" | ":") || AUGMENTED_ASSIGN.contains(o)
            }
            TokenKind::Name(n) => n == "in",
            _ => false,
        }
    }

    // -----------------------------------------------------------------------
    // Statements
    // -----------------------------------------------------------------------

    fn parse_module(&mut self) -> Result<Module> {
        let mut body = Vec::new();
        loop {
            match self.kind() {
                TokenKind::EndOfFile => break,
                TokenKind::Newline => {
                    self.advance();
                }
                TokenKind::Indent => return Err(self.unexpected("statement")),
                _ => body.extend(self.parse_statement()?),
            }
        }
        Ok(Module { body })
    }

    fn parse_statement(&mut self) -> Result<Vec<Stmt>> {
        let start = self.start();
        if self.at_op("@") {
            return Ok(vec![self.parse_decorated(start)?]);
        }
        let keyword = match self.kind() {
            TokenKind::Name(n) => n.clone(),
            _ => String::new(),
        };
        let stmt = match keyword.as_str() {
            "if" => self.parse_if(start)?,
            "while" => self.parse_while(start)?,
            "for" => self.parse_for(start, false)?,
            "try" => self.parse_try(start)?,
            "with" => self.parse_with(start, false)?,
            "def" => self.parse_def(start, Vec::new(), false)?,
            "class" => self.parse_class(start, Vec::new())?,
            "async" if self.nth_is_keyword(1, "def") => {
                self.advance();
                self.parse_def(start, Vec::new(), true)?
            }
            "async" if self.nth_is_keyword(1, "for") => {
                self.advance();
                self.parse_for(start, true)?
            }
            "async" if self.nth_is_keyword(1, "with") => {
                self.advance();
                self.parse_with(start, true)?
            }
            _ => return self.parse_simple_statements(),
        };
        Ok(vec![stmt])
    }

    fn parse_simple_statements(&mut self) -> Result<Vec<Stmt>> {
        let mut stmts = vec![self.parse_small_statement()?];
        while self.eat_op(";") {
            if matches!(self.kind(), TokenKind::Newline | TokenKind::EndOfFile) {
                break;
            }
            stmts.push(self.parse_small_statement()?);
        }
        self.expect_newline()?;
        Ok(stmts)
    }

    fn at_statement_end(&self) -> bool {
        matches!(
            self.kind(),
            TokenKind::Newline | TokenKind::EndOfFile | TokenKind::Dedent
        ) || self.at_op(";")
    }

    fn parse_small_statement(&mut self) -> Result<Stmt> {
        let start = self.start();
        let keyword = match self.kind() {
            TokenKind::Name(n) => n.clone(),
            _ => String::new(),
        };
        let kind = match keyword.as_str() {
            "pass" => {
                self.advance();
                StmtKind::Pass
            }
            "break" => {
                self.advance();
                StmtKind::Break
            }
            "continue" => {
                self.advance();
                StmtKind::Continue
            }
            "return" => {
                self.advance();
                let value = if self.at_statement_end() {
                    None
                } else {
                    Some(self.parse_star_expressions()?)
                };
                StmtKind::Return { value }
            }
            "raise" => {
                self.advance();
                let mut exc = None;
                let mut cause = None;
                if !self.at_statement_end() {
                    exc = Some(self.parse_expression()?);
                    if self.eat_keyword("from") {
                        cause = Some(self.parse_expression()?);
                    }
                }
                StmtKind::Raise { exc, cause }
            }
            "global" | "nonlocal" => {
                self.advance();
                let mut names = vec![self.expect_name()?];
                while self.eat_op(",") {
                    names.push(self.expect_name()?);
                }
                if keyword == "global" {
                    StmtKind::Global { names }
                } else {
                    StmtKind::Nonlocal { names }
                }
            }
            "del" => {
                self.advance();
                let mut targets = vec![self.parse_target()?];
                while self.eat_op(",") {
                    if self.at_statement_end() {
                        break;
                    }
                    targets.push(self.parse_target()?);
                }
                StmtKind::Delete { targets }
            }
            "assert" => {
                self.advance();
                let test = self.parse_expression()?;
                let msg = if self.eat_op(",") {
                    Some(self.parse_expression()?)
                } else {
                    None
                };
                StmtKind::Assert { test, msg }
            }
            "import" => {
                self.advance();
                let mut names = vec![self.parse_dotted_alias()?];
                while self.eat_op(",") {
                    names.push(self.parse_dotted_alias()?);
                }
                StmtKind::Import { names }
            }
            "from" => self.parse_import_from()?,
            _ => self.parse_expression_statement()?,
        };
        Ok(Stmt::new(kind, self.span_from(start)))
    }

    fn parse_dotted_name(&mut self) -> Result<String> {
        let mut name = self.expect_name()?;
        while self.eat_op(".") {
            name.push('.');
            name.push_str(&self.expect_name()?);
        }
        Ok(name)
    }

    fn parse_dotted_alias(&mut self) -> Result<Alias> {
        let name = self.parse_dotted_name()?;
        let asname = if self.eat_keyword("as") {
            Some(self.expect_name()?)
        } else {
            None
        };
        Ok(Alias { name, asname })
    }

    fn parse_import_from(&mut self) -> Result<StmtKind> {
        self.expect_keyword("from")?;
        let mut level = 0;
        loop {
            if self.eat_op(".") {
                level += 1;
            } else if self.eat_op("...") {
                level += 3;
            } else {
                break;
            }
        }
        let module = if self.at_keyword("import") {
            None
        } else {
            Some(self.parse_dotted_name()?)
        };
        self.expect_keyword("import")?;
        let mut names = Vec::new();
        if self.eat_op("*") {
            names.push(Alias {
                name: "*".to_string(),
                asname: None,
            });
        } else {
            let parenthesized = self.eat_op("(");
            loop {
                let name = self.expect_name()?;
                let asname = if self.eat_keyword("as") {
                    Some(self.expect_name()?)
                } else {
                    None
                };
                names.push(Alias { name, asname });
                if !self.eat_op(",") {
                    break;
                }
                if parenthesized && self.at_op(")") {
                    break;
                }
            }
            if parenthesized {
                self.expect_op(")")?;
            }
        }
        Ok(StmtKind::ImportFrom {
            module,
            names,
            level,
        })
    }

    fn parse_expression_statement(&mut self) -> Result<StmtKind> {
        let first = self.parse_star_expressions_or_yield()?;

        if self.eat_op(":") {
            let annotation = self.parse_expression()?;
            let value = if self.eat_op("=") {
                Some(self.parse_star_expressions_or_yield()?)
            } else {
                None
            };
            return Ok(StmtKind::AnnAssign {
                target: first,
                annotation,
                value,
            });
        }

        if let TokenKind::Op(op) = self.kind() {
            if AUGMENTED_ASSIGN.contains(op) {
                let symbol = op.trim_end_matches('=');
                let op = BinOp::from_symbol(symbol)
                    .ok_or_else(|| self.unexpected("augmented assignment"))?;
                self.advance();
                let value = self.parse_star_expressions_or_yield()?;
                return Ok(StmtKind::AugAssign {
                    target: first,
                    op,
                    value,
                });
            }
        }

        if self.at_op("=") {
            let mut exprs = vec![first];
            while self.eat_op("=") {
                exprs.push(self.parse_star_expressions_or_yield()?);
            }
            let value = exprs.pop().ok_or_else(|| self.unexpected("expression"))?;
            for target in &exprs {
                check_target(target)?;
            }
            return Ok(StmtKind::Assign {
                targets: exprs,
                value,
            });
        }

        Ok(StmtKind::Expr { value: first })
    }

    fn parse_block(&mut self) -> Result<Vec<Stmt>> {
        self.expect_op(":")?;
        if !matches!(self.kind(), TokenKind::Newline) {
            return self.parse_simple_statements();
        }
        self.advance();
        if !matches!(self.kind(), TokenKind::Indent) {
            return Err(self.unexpected("indented block"));
        }
        self.advance();
        let mut body = Vec::new();
        loop {
            match self.kind() {
                TokenKind::Dedent => {
                    self.advance();
                    break;
                }
                TokenKind::EndOfFile => break,
                TokenKind::Newline => {
                    self.advance();
                }
                _ => body.extend(self.parse_statement()?),
            }
        }
        Ok(body)
    }

    fn parse_if(&mut self, start: Span) -> Result<Stmt> {
        // Current token is `if` or `elif`.
        self.advance();
        let test = self.parse_named_expression()?;
        let body = self.parse_block()?;
        let orelse = if self.at_keyword("elif") {
            let elif_start = self.start();
            vec![self.parse_if(elif_start)?]
        } else if self.eat_keyword("else") {
            self.parse_block()?
        } else {
            Vec::new()
        };
        Ok(Stmt::new(
            StmtKind::If { test, body, orelse },
            self.span_from(start),
        ))
    }

    fn parse_while(&mut self, start: Span) -> Result<Stmt> {
        self.expect_keyword("while")?;
        let test = self.parse_named_expression()?;
        let body = self.parse_block()?;
        let orelse = if self.eat_keyword("else") {
            self.parse_block()?
        } else {
            Vec::new()
        };
        Ok(Stmt::new(
            StmtKind::While { test, body, orelse },
            self.span_from(start),
        ))
    }

    fn parse_for(&mut self, start: Span, is_async: bool) -> Result<Stmt> {
        self.expect_keyword("for")?;
        let target = self.parse_target_list()?;
        self.expect_keyword("in")?;
        let iter = self.parse_star_expressions()?;
        let body = self.parse_block()?;
        let orelse = if self.eat_keyword("else") {
            self.parse_block()?
        } else {
            Vec::new()
        };
        Ok(Stmt::new(
            StmtKind::For {
                is_async,
                target,
                iter,
                body,
                orelse,
            },
            self.span_from(start),
        ))
    }

    fn parse_try(&mut self, start: Span) -> Result<Stmt> {
        self.expect_keyword("try")?;
        let body = self.parse_block()?;
        let mut handlers = Vec::new();
        while self.at_keyword("except") {
            let handler_start = self.start();
            self.advance();
            let mut kind = None;
            let mut name = None;
            if !self.at_op(":") {
                kind = Some(self.parse_expression()?);
                if self.eat_keyword("as") {
                    name = Some(self.expect_name()?);
                }
            }
            let handler_body = self.parse_block()?;
            handlers.push(ExceptHandler {
                kind,
                name,
                body: handler_body,
                span: self.span_from(handler_start),
            });
        }
        let orelse = if self.eat_keyword("else") {
            self.parse_block()?
        } else {
            Vec::new()
        };
        let finalbody = if self.eat_keyword("finally") {
            self.parse_block()?
        } else {
            Vec::new()
        };
        if handlers.is_empty() && finalbody.is_empty() {
            return Err(self.unexpected("'except' or 'finally'"));
        }
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

    fn parse_with(&mut self, start: Span, is_async: bool) -> Result<Stmt> {
        self.expect_keyword("with")?;
        let mut items = Vec::new();
        loop {
            let item_start = self.start();
            let context = self.parse_expression()?;
            let target = if self.eat_keyword("as") {
                Some(self.parse_target()?)
            } else {
                None
            };
            items.push(WithItem {
                context,
                target,
                span: self.span_from(item_start),
            });
            if !self.eat_op(",") {
                break;
            }
        }
        let body = self.parse_block()?;
        Ok(Stmt::new(
            StmtKind::With {
                is_async,
                items,
                body,
            },
            self.span_from(start),
        ))
    }

    fn parse_decorated(&mut self, start: Span) -> Result<Stmt> {
        let mut decorators = Vec::new();
        while self.eat_op("@") {
            decorators.push(self.parse_named_expression()?);
            self.expect_newline()?;
        }
        if self.at_keyword("class") {
            self.parse_class(start, decorators)
        } else if self.at_keyword("async") && self.nth_is_keyword(1, "def") {
            self.advance();
            self.parse_def(start, decorators, true)
        } else if self.at_keyword("def") {
            self.parse_def(start, decorators, false)
        } else {
            Err(self.unexpected("'def' or 'class' after decorator"))
        }
    }

    fn parse_def(&mut self, start: Span, decorators: Vec<Expr>, is_async: bool) -> Result<Stmt> {
        self.expect_keyword("def")?;
        let name = self.expect_name()?;
        self.expect_op("(")?;
        let params = self.parse_params(")", true)?;
        self.expect_op(")")?;
        let returns = if self.eat_op("->") {
            Some(self.parse_expression()?)
        } else {
            None
        };
        let body = self.parse_block()?;
        Ok(Stmt::new(
            StmtKind::FunctionDef(Box::new(FunctionDef {
                is_async,
                name,
                params,
                returns,
                body,
                decorators,
            })),
            self.span_from(start),
        ))
    }

    fn parse_class(&mut self, start: Span, decorators: Vec<Expr>) -> Result<Stmt> {
        self.expect_keyword("class")?;
        let name = self.expect_name()?;
        let (bases, keywords) = if self.eat_op("(") {
            let parsed = self.parse_call_arguments()?;
            self.expect_op(")")?;
            parsed
        } else {
            (Vec::new(), Vec::new())
        };
        let body = self.parse_block()?;
        Ok(Stmt::new(
            StmtKind::ClassDef(Box::new(ClassDef {
                name,
                bases,
                keywords,
                body,
                decorators,
            })),
            self.span_from(start),
        ))
    }

    fn parse_params(&mut self, closing: &str, annotations: bool) -> Result<Vec<Param>> {
        let mut params = Vec::new();
        while !self.at_op(closing) {
            let start = self.start();
            let (kind, name) = if self.eat_op("/") {
                (ParamKind::PositionalOnlyMarker, String::new())
            } else if self.eat_op("**") {
                (ParamKind::VarKeywords, self.expect_name()?)
            } else if self.eat_op("*") {
                if self.at_op(",") || self.at_op(closing) {
                    (ParamKind::KeywordOnlyMarker, String::new())
                } else {
                    (ParamKind::VarArgs, self.expect_name()?)
                }
            } else {
                (ParamKind::Normal, self.expect_name()?)
            };
            let named = !name.is_empty();
            let annotation = if named && annotations && self.eat_op(":") {
                Some(self.parse_expression()?)
            } else {
                None
            };
            let default = if kind == ParamKind::Normal && self.eat_op("=") {
                Some(self.parse_expression()?)
            } else {
                None
            };
            params.push(Param {
                kind,
                name,
                annotation,
                default,
                span: self.span_from(start),
            });
            if !self.eat_op(",") {
                break;
            }
        }
        Ok(params)
    }

    // -----------------------------------------------------------------------
    // Expressions
    // -----------------------------------------------------------------------

    fn parse_star_expressions_or_yield(&mut self) -> Result<Expr> {
        if self.at_keyword("yield") {
            self.parse_yield()
        } else {
            self.parse_star_expressions()
        }
    }

    fn parse_yield(&mut self) -> Result<Expr> {
        let start = self.start();
        self.expect_keyword("yield")?;
        if self.eat_keyword("from") {
            let value = self.parse_expression()?;
            return Ok(Expr::new(
                ExprKind::YieldFrom(Box::new(value)),
                self.span_from(start),
            ));
        }
        let value = if self.at_expression_end() {
            None
        } else {
            Some(Box::new(self.parse_star_expressions()?))
        };
        Ok(Expr::new(ExprKind::Yield(value), self.span_from(start)))
    }

    fn parse_star_expressions(&mut self) -> Result<Expr> {
        let start = self.start();
        let first = self.parse_star_expression()?;
        if !self.at_op(",") {
            return Ok(first);
        }
        let mut elts = vec![first];
        while self.eat_op(",") {
            if self.at_expression_end() {
                break;
            }
            elts.push(self.parse_star_expression()?);
        }
        Ok(Expr::new(ExprKind::Tuple(elts), self.span_from(start)))
    }

    fn parse_star_expression(&mut self) -> Result<Expr> {
        if self.at_op("*") {
            let start = self.start();
            self.advance();
            let value = self.parse_bitor()?;
            return Ok(Expr::new(
                ExprKind::Starred(Box::new(value)),
                self.span_from(start),
            ));
        }
        self.parse_named_expression()
    }

    fn parse_named_expression(&mut self) -> Result<Expr> {
        if self.at_name() && self.nth_is_op(1, ":=") {
            let start = self.start();
            let name = self.expect_name()?;
            let target = Expr::new(ExprKind::Name(name), self.span_from(start));
            self.advance();
            let value = self.parse_expression()?;
            return Ok(Expr::new(
                ExprKind::NamedExpr {
                    target: Box::new(target),
                    value: Box::new(value),
                },
                self.span_from(start),
            ));
        }
        self.parse_expression()
    }

    fn parse_expression(&mut self) -> Result<Expr> {
        if self.at_keyword("lambda") {
            return self.parse_lambda();
        }
        let start = self.start();
        let body = self.parse_disjunction()?;
        if !self.at_keyword("if") {
            return Ok(body);
        }
        self.advance();
        let test = self.parse_disjunction()?;
        self.expect_keyword("else")?;
        let orelse = self.parse_expression()?;
        Ok(Expr::new(
            ExprKind::IfExp {
                test: Box::new(test),
                body: Box::new(body),
                orelse: Box::new(orelse),
            },
            self.span_from(start),
        ))
    }

    fn parse_lambda(&mut self) -> Result<Expr> {
        let start = self.start();
        self.expect_keyword("lambda")?;
        let params = self.parse_params(":", false)?;
        self.expect_op(":")?;
        let body = self.parse_expression()?;
        Ok(Expr::new(
            ExprKind::Lambda {
                params,
                body: Box::new(body),
            },
            self.span_from(start),
        ))
    }

    fn parse_bool_chain(
        &mut self,
        keyword: &str,
        op: BoolOp,
        next: fn(&mut Self) -> Result<Expr>,
    ) -> Result<Expr> {
        let start = self.start();
        let first = next(self)?;
        if !self.at_keyword(keyword) {
            return Ok(first);
        }
        let mut values = vec![first];
        while self.eat_keyword(keyword) {
            values.push(next(self)?);
        }
        Ok(Expr::new(
            ExprKind::BoolOp { op, values },
            self.span_from(start),
        ))
    }

    fn parse_disjunction(&mut self) -> Result<Expr> {
        self.parse_bool_chain("or", BoolOp::Or, Self::parse_conjunction)
    }

    fn parse_conjunction(&mut self) -> Result<Expr> {
        self.parse_bool_chain("and", BoolOp::And, Self::parse_inversion)
    }

    fn parse_inversion(&mut self) -> Result<Expr> {
        if self.at_keyword("not") {
            let start = self.start();
            self.advance();
            let operand = self.parse_inversion()?;
            return Ok(Expr::new(
                ExprKind::UnaryOp {
                    op: UnaryOp::Not,
                    operand: Box::new(operand),
                },
                self.span_from(start),
            ));
        }
        self.parse_comparison()
    }

    fn comparison_operator(&self) -> Option<(CmpOp, usize)> {
        match self.kind() {
            TokenKind::Op(o) => {
                let op = match *o {
                    "==" => CmpOp::Eq,
                    "!=" => CmpOp::NotEq,
                    "<" => CmpOp::Lt,
                    "<=" => CmpOp::LtE,
                    ">" => CmpOp::Gt,
                    ">=" => CmpOp::GtE,
                    _ => return None,
                };
                Some((op, 1))
            }
            TokenKind::Name(n) => match n.as_str() {
                "in" => Some((CmpOp::In, 1)),
                "not" if self.nth_is_keyword(1, "in") => Some((CmpOp::NotIn, 2)),
                "is" if self.nth_is_keyword(1, "not") => Some((CmpOp::IsNot, 2)),
                "is" => Some((CmpOp::Is, 1)),
                _ => None,
            },
            _ => None,
        }
    }

    fn parse_comparison(&mut self) -> Result<Expr> {
        let start = self.start();
        let left = self.parse_bitor()?;
        let mut ops = Vec::new();
        let mut comparators = Vec::new();
        while let Some((op, width)) = self.comparison_operator() {
            for _ in 0..width {
                self.advance();
            }
            ops.push(op);
            comparators.push(self.parse_bitor()?);
        }
        if ops.is_empty() {
            return Ok(left);
        }
        Ok(Expr::new(
            ExprKind::Compare {
                left: Box::new(left),
                ops,
                comparators,
            },
            self.span_from(start),
        ))
    }

    fn current_op_in(&self, ops: &[&str]) -> Option<&'static str> {
        match self.kind() {
            TokenKind::Op(o) if ops.contains(o) => Some(*o),
            _ => None,
        }
    }

    fn parse_left_assoc(
        &mut self,
        ops: &[&str],
        next: fn(&mut Self) -> Result<Expr>,
    ) -> Result<Expr> {
        let start = self.start();
        let mut left = next(self)?;
        while let Some(symbol) = self.current_op_in(ops) {
            let op = BinOp::from_symbol(symbol).ok_or_else(|| self.unexpected("operator"))?;
            self.advance();
            let right = next(self)?;
            left = Expr::new(
                ExprKind::BinOp {
                    left: Box::new(left),
                    op,
                    right: Box::new(right),
                },
                self.span_from(start),
            );
        }
        Ok(left)
    }

    fn parse_bitor(&mut self) -> Result<Expr> {
        self.parse_left_assoc(&["|"], Self::parse_bitxor)
    }

    fn parse_bitxor(&mut self) -> Result<Expr> {
        self.parse_left_assoc(&["^"], Self::parse_bitand)
    }

    fn parse_bitand(&mut self) -> Result<Expr> {
        self.parse_left_assoc(&["&"], Self::parse_shift)
    }

    fn parse_shift(&mut self) -> Result<Expr> {
        self.parse_left_assoc(&["<<", ">>"], Self::parse_arith)
    }

    fn parse_arith(&mut self) -> Result<Expr> {
        self.parse_left_assoc(&["+", "-"], Self::parse_term)
    }

    fn parse_term(&mut self) -> Result<Expr> {
        self.parse_left_assoc(&["*", "/", "//", "%", "@"], Self::parse_factor)
    }

    fn parse_factor(&mut self) -> Result<Expr> {
        let op = match self.kind() {
            TokenKind::Op("+") => Some(UnaryOp::UAdd),
            TokenKind::Op("-") => Some(UnaryOp::USub),
            TokenKind::Op("~") => Some(UnaryOp::Invert),
            _ => None,
        };
        let Some(op) = op else {
            return self.parse_power();
        };
        let start = self.start();
        self.advance();
        let operand = self.parse_factor()?;
        Ok(Expr::new(
            ExprKind::UnaryOp {
                op,
                operand: Box::new(operand),
            },
            self.span_from(start),
        ))
    }

    fn parse_power(&mut self) -> Result<Expr> {
        let start = self.start();
        let base = self.parse_await_primary()?;
        if !self.eat_op("**") {
            return Ok(base);
        }
        let exponent = self.parse_factor()?;
        Ok(Expr::new(
            ExprKind::BinOp {
                left: Box::new(base),
                op: BinOp::Pow,
                right: Box::new(exponent),
            },
            self.span_from(start),
        ))
    }

    fn parse_await_primary(&mut self) -> Result<Expr> {
        if !self.at_keyword("await") {
            return self.parse_primary();
        }
        let start = self.start();
        self.advance();
        let value = self.parse_primary()?;
        Ok(Expr::new(
            ExprKind::Await(Box::new(value)),
            self.span_from(start),
        ))
    }

    fn parse_primary(&mut self) -> Result<Expr> {
        let start = self.start();
        let mut expr = self.parse_atom()?;
        loop {
            if self.eat_op(".") {
                let attr = self.expect_name()?;
                expr = Expr::new(
                    ExprKind::Attribute {
                        value: Box::new(expr),
                        attr,
                    },
                    self.span_from(start),
                );
            } else if self.eat_op("(") {
                let (args, keywords) = self.parse_call_arguments()?;
                self.expect_op(")")?;
                expr = Expr::new(
                    ExprKind::Call {
                        func: Box::new(expr),
                        args,
                        keywords,
                    },
                    self.span_from(start),
                );
            } else if self.eat_op("[") {
                let slice = self.parse_slices()?;
                self.expect_op("]")?;
                expr = Expr::new(
                    ExprKind::Subscript {
                        value: Box::new(expr),
                        slice: Box::new(slice),
                    },
                    self.span_from(start),
                );
            } else {
                break;
            }
        }
        Ok(expr)
    }

    fn parse_call_arguments(&mut self) -> Result<(Vec<Expr>, Vec<Keyword>)> {
        let mut args = Vec::new();
        let mut keywords = Vec::new();
        while !self.at_op(")") {
            let start = self.start();
            if self.eat_op("**") {
                let value = self.parse_expression()?;
                keywords.push(Keyword {
                    arg: None,
                    value,
                    span: self.span_from(start),
                });
            } else if self.eat_op("*") {
                let value = self.parse_expression()?;
                args.push(Expr::new(
                    ExprKind::Starred(Box::new(value)),
                    self.span_from(start),
                ));
            } else if self.at_name() && self.nth_is_op(1, "=") {
                let arg = self.expect_name()?;
                self.advance();
                let value = self.parse_expression()?;
                keywords.push(Keyword {
                    arg: Some(arg),
                    value,
                    span: self.span_from(start),
                });
            } else {
                let value = self.parse_named_expression()?;
                if self.at_comprehension() {
                    let generators = self.parse_comprehension_clauses()?;
                    args.push(Expr::new(
                        ExprKind::GeneratorExp {
                            elt: Box::new(value),
                            generators,
                        },
                        self.span_from(start),
                    ));
                } else {
                    args.push(value);
                }
            }
            if !self.eat_op(",") {
                break;
            }
        }
        Ok((args, keywords))
    }

    fn parse_slices(&mut self) -> Result<Expr> {
        let start = self.start();
        let first = self.parse_slice()?;
        if !self.at_op(",") {
            return Ok(first);
        }
        let mut elts = vec![first];
        while self.eat_op(",") {
            if self.at_op("]") {
                break;
            }
            elts.push(self.parse_slice()?);
        }
        Ok(Expr::new(ExprKind::Tuple(elts), self.span_from(start)))
    }

    fn parse_slice(&mut self) -> Result<Expr> {
        let start = self.start();
        let lower = if self.at_op(":") {
            None
        } else {
            let value = self.parse_star_expression()?;
            if !self.at_op(":") {
                return Ok(value);
            }
            Some(Box::new(value))
        };
        self.expect_op(":")?;
        let bound_end = |p: &Self| p.at_op(":") || p.at_op("]") || p.at_op(",");
        let upper = if bound_end(self) {
            None
        } else {
            Some(Box::new(self.parse_expression()?))
        };
        let step = if self.eat_op(":") {
            if self.at_op("]") || self.at_op(",") {
                None
            } else {
                Some(Box::new(self.parse_expression()?))
            }
        } else {
            None
        };
        Ok(Expr::new(
            ExprKind::Slice { lower, upper, step },
            self.span_from(start),
        ))
    }

    fn at_comprehension(&self) -> bool {
        self.at_keyword("for") || (self.at_keyword("async") && self.nth_is_keyword(1, "for"))
    }

    fn parse_comprehension_clauses(&mut self) -> Result<Vec<Comprehension>> {
        let mut generators = Vec::new();
        while self.at_comprehension() {
            let start = self.start();
            let is_async = self.eat_keyword("async");
            self.expect_keyword("for")?;
            let target = self.parse_target_list()?;
            self.expect_keyword("in")?;
            let iter = self.parse_disjunction()?;
            let mut ifs = Vec::new();
            while self.eat_keyword("if") {
                ifs.push(self.parse_disjunction()?);
            }
            generators.push(Comprehension {
                is_async,
                target,
                iter,
                ifs,
                span: self.span_from(start),
            });
        }
        Ok(generators)
    }

    fn parse_target(&mut self) -> Result<Expr> {
        if self.at_op("*") {
            let start = self.start();
            self.advance();
            let value = self.parse_bitor()?;
            return Ok(Expr::new(
                ExprKind::Starred(Box::new(value)),
                self.span_from(start),
            ));
        }
        self.parse_bitor()
    }

    fn parse_target_list(&mut self) -> Result<Expr> {
        let start = self.start();
        let first = self.parse_target()?;
        if !self.at_op(",") {
            return Ok(first);
        }
        let mut elts = vec![first];
        while self.eat_op(",") {
            if self.at_expression_end() {
                break;
            }
            elts.push(self.parse_target()?);
        }
        Ok(Expr::new(ExprKind::Tuple(elts), self.span_from(start)))
    }

    fn parse_atom(&mut self) -> Result<Expr> {
        let start = self.start();
        let token = self.peek_nth(0).clone();
        match token.kind {
            TokenKind::Name(name) => {
                let kind = match name.as_str() {
                    "True" => ExprKind::Constant(Constant::Bool(true)),
                    "False" => ExprKind::Constant(Constant::Bool(false)),
                    "None" => ExprKind::Constant(Constant::None),
                    _ if is_keyword(&name) => return Err(self.unexpected("expression")),
                    _ => ExprKind::Name(name),
                };
                self.advance();
                Ok(Expr::new(kind, self.span_from(start)))
            }
            TokenKind::Int(text) => {
                self.advance();
                Ok(Expr::new(
                    ExprKind::Constant(Constant::Int(normalize_int(&text))),
                    self.span_from(start),
                ))
            }
            TokenKind::Float(text) => {
                self.advance();
                Ok(Expr::new(
                    ExprKind::Constant(Constant::Float(normalize_float(&text))),
                    self.span_from(start),
                ))
            }
            TokenKind::Imaginary(text) => {
                self.advance();
                Ok(Expr::new(
                    ExprKind::Constant(Constant::Imaginary(normalize_imaginary(&text))),
                    self.span_from(start),
                ))
            }
            TokenKind::Str(_) => self.parse_strings(),
            TokenKind::Op("...") => {
                self.advance();
                Ok(Expr::new(
                    ExprKind::Constant(Constant::Ellipsis),
                    self.span_from(start),
                ))
            }
            TokenKind::Op("(") => self.parse_parenthesized(),
            TokenKind::Op("[") => self.parse_list_display(),
            TokenKind::Op("{") => self.parse_brace_display(),
            _ => Err(self.unexpected("expression")),
        }
    }

    fn parse_strings(&mut self) -> Result<Expr> {
        let start = self.start();
        let mut pieces: Vec<StrToken> = Vec::new();
        while let TokenKind::Str(piece) = self.kind() {
            pieces.push(piece.clone());
            self.advance();
        }
        let bytes = pieces.iter().filter(|p| p.is_bytes()).count();
        if bytes != 0 && bytes != pieces.len() {
            return Err(ParseError::new(
                ParseErrorCode::UnexpectedToken,
                "cannot mix bytes and nonbytes literals",
                start.line,
                start.column,
            ));
        }
        let raw_joined = || {
            pieces
                .iter()
                .map(|p| p.raw.as_str())
                .collect::<Vec<_>>()
                .join(" ")
        };
        let kind = if bytes > 0 {
            ExprKind::Constant(Constant::Bytes(raw_joined()))
        } else if pieces.iter().any(StrToken::is_format) {
            ExprKind::FString(raw_joined())
        } else {
            ExprKind::Constant(Constant::Str(pieces.iter().map(StrToken::value).collect()))
        };
        Ok(Expr::new(kind, self.span_from(start)))
    }

    fn parse_parenthesized(&mut self) -> Result<Expr> {
        let start = self.start();
        self.expect_op("(")?;
        if self.eat_op(")") {
            return Ok(Expr::new(ExprKind::Tuple(Vec::new()), self.span_from(start)));
        }
        if self.at_keyword("yield") {
            let value = self.parse_yield()?;
            self.expect_op(")")?;
            return Ok(value);
        }
        let first = self.parse_star_expression()?;
        if self.at_comprehension() {
            let generators = self.parse_comprehension_clauses()?;
            self.expect_op(")")?;
            return Ok(Expr::new(
                ExprKind::GeneratorExp {
                    elt: Box::new(first),
                    generators,
                },
                self.span_from(start),
            ));
        }
        if !self.at_op(",") {
            self.expect_op(")")?;
            return Ok(first);
        }
        let mut elts = vec![first];
        while self.eat_op(",") {
            if self.at_op(")") {
                break;
            }
            elts.push(self.parse_star_expression()?);
        }
        self.expect_op(")")?;
        Ok(Expr::new(ExprKind::Tuple(elts), self.span_from(start)))
    }

    fn parse_list_display(&mut self) -> Result<Expr> {
        let start = self.start();
        self.expect_op("[")?;
        if self.eat_op("]") {
            return Ok(Expr::new(ExprKind::List(Vec::new()), self.span_from(start)));
        }
        let first = self.parse_star_expression()?;
        if self.at_comprehension() {
            let generators = self.parse_comprehension_clauses()?;
            self.expect_op("]")?;
            return Ok(Expr::new(
                ExprKind::ListComp {
                    elt: Box::new(first),
                    generators,
                },
                self.span_from(start),
            ));
        }
        let mut elts = vec![first];
        while self.eat_op(",") {
            if self.at_op("]") {
                break;
            }
            elts.push(self.parse_star_expression()?);
        }
        self.expect_op("]")?;
        Ok(Expr::new(ExprKind::List(elts), self.span_from(start)))
    }

    fn parse_brace_display(&mut self) -> Result<Expr> {
        let start = self.start();
        self.expect_op("{")?;
        if self.eat_op("}") {
            return Ok(Expr::new(
                ExprKind::Dict {
                    keys: Vec::new(),
                    values: Vec::new(),
                },
                self.span_from(start),
            ));
        }

        let mut keys = Vec::new();
        let mut values = Vec::new();
        if self.eat_op("**") {
            keys.push(None);
            values.push(self.parse_bitor()?);
        } else {
            let first = self.parse_star_expression()?;
            if !self.eat_op(":") {
                return self.finish_set(start, first);
            }
            let value = self.parse_expression()?;
            if self.at_comprehension() {
                let generators = self.parse_comprehension_clauses()?;
                self.expect_op("}")?;
                return Ok(Expr::new(
                    ExprKind::DictComp {
                        key: Box::new(first),
                        value: Box::new(value),
                        generators,
                    },
                    self.span_from(start),
                ));
            }
            keys.push(Some(first));
            values.push(value);
        }

        while self.eat_op(",") {
            if self.at_op("}") {
                break;
            }
            if self.eat_op("**") {
                keys.push(None);
                values.push(self.parse_bitor()?);
            } else {
                let key = self.parse_expression()?;
                self.expect_op(":")?;
                keys.push(Some(key));
                values.push(self.parse_expression()?);
            }
        }
        self.expect_op("}")?;
        Ok(Expr::new(
            ExprKind::Dict { keys, values },
            self.span_from(start),
        ))
    }

    fn finish_set(&mut self, start: Span, first: Expr) -> Result<Expr> {
        if self.at_comprehension() {
            let generators = self.parse_comprehension_clauses()?;
            self.expect_op("}")?;
            return Ok(Expr::new(
                ExprKind::SetComp {
                    elt: Box::new(first),
                    generators,
                },
                self.span_from(start),
            ));
        }
        let mut elts = vec![first];
        while self.eat_op(",") {
            if self.at_op("}") {
                break;
            }
            elts.push(self.parse_star_expression()?);
        }
        self.expect_op("}")?;
        Ok(Expr::new(ExprKind::Set(elts), self.span_from(start)))
    }
}

/// Reject assignment targets that Python would refuse.
fn check_target(target: &Expr) -> Result<()> {
    match &target.kind {
        ExprKind::Name(_) | ExprKind::Attribute { .. } | ExprKind::Subscript { .. } => Ok(()),
        ExprKind::Starred(inner) => check_target(inner),
        ExprKind::Tuple(elts) | ExprKind::List(elts) => elts.iter().try_for_each(check_target),
        _ => Err(ParseError::new(
            ParseErrorCode::InvalidTarget,
            "cannot assign to expression",
            target.span.line,
            target.span.column,
        )),
    }
}
