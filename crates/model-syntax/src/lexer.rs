//! Indentation-aware tokenizer.
//!
//! Produces a flat token stream with explicit `Newline`, `Indent` and
//! `Dedent` tokens. Comments are dropped. Newlines inside brackets and
//! backslash continuations do not end a logical line.

use crate::error::{ParseError, ParseErrorCode, Result};
use crate::span::Span;

/// Operators and delimiters, longest first so greedy matching works.
const OPERATORS: &[&str] = &[
    "**=", "//=", ">>=", "<<=", "...", "->", ":=", "**", "//", "<<", ">>", "<=", ">=", "==", "!=",
    "+=", "-=", "*=", "/=", "%=", "&=", "|=", "^=", "@=", "+", "-", "*", "/", "%", "@", "&", "|",
    "^", "~", "<", ">", "(", ")", "[", "]", "{", "}", ",", ":", ".", ";", "=",
];

const STRING_PREFIXES: &[&str] = &["r", "u", "b", "f", "br", "rb", "fr", "rf"];

/// A single string literal piece, before implicit concatenation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StrToken {
    /// Lower-cased prefix letters (`r`, `b`, `f`, ...).
    pub prefix: String,
    /// Text between the quotes, undecoded.
    pub body: String,
    /// Full literal text as written, prefix and quotes included.
    pub raw: String,
}

impl StrToken {
    pub fn is_bytes(&self) -> bool {
        self.prefix.contains('b')
    }

    pub fn is_format(&self) -> bool {
        self.prefix.contains('f')
    }

    pub fn is_raw(&self) -> bool {
        self.prefix.contains('r')
    }

    /// Decoded string value. Raw literals are returned verbatim.
    pub fn value(&self) -> String {
        if self.is_raw() {
            self.body.clone()
        } else {
            decode_escapes(&self.body)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenKind {
    Name(String),
    Int(String),
    Float(String),
    Imaginary(String),
    Str(StrToken),
    Op(&'static str),
    Newline,
    Indent,
    Dedent,
    EndOfFile,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

/// Tokenize `source` into a logical-line token stream.
pub fn tokenize(source: &str) -> Result<Vec<Token>> {
    Lexer::new(source).run()
}

struct Lexer<'a> {
    src: &'a str,
    pos: usize,
    line: usize,
    line_start: usize,
    indents: Vec<usize>,
    brackets: Vec<(char, usize, usize)>,
    at_line_start: bool,
    tokens: Vec<Token>,
}

impl<'a> Lexer<'a> {
    fn new(src: &'a str) -> Self {
        Self {
            src,
            pos: 0,
            line: 1,
            line_start: 0,
            indents: vec![0],
            brackets: Vec::new(),
            at_line_start: true,
            tokens: Vec::new(),
        }
    }

    fn peek(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.src[self.pos..].chars().nth(offset)
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        if c == '\n' {
            self.line += 1;
            self.line_start = self.pos;
        }
        Some(c)
    }

    fn column(&self) -> usize {
        self.pos - self.line_start
    }

    fn error(&self, code: ParseErrorCode, message: impl Into<String>) -> ParseError {
        ParseError::new(code, message, self.line, self.column())
    }

    fn push(&mut self, kind: TokenKind, start: usize, line: usize, column: usize) {
        self.tokens.push(Token {
            kind,
            span: Span::new(start, self.pos, line, column),
        });
    }

    fn run(mut self) -> Result<Vec<Token>> {
        loop {
            if self.at_line_start && self.brackets.is_empty() {
                if !self.handle_indentation()? {
                    break;
                }
            }
            let Some(c) = self.peek() else { break };
            let start = self.pos;
            let line = self.line;
            let column = self.column();
            match c {
                ' ' | '\t' | '\x0c' => {
                    self.bump();
                }
                '#' => self.skip_comment(),
                '\\' => {
                    self.bump();
                    if self.peek() == Some('\r') {
                        self.bump();
                    }
                    if self.peek() != Some('\n') {
                        return Err(self.error(
                            ParseErrorCode::InvalidCharacter,
                            "unexpected character after line continuation",
                        ));
                    }
                    self.bump();
                }
                '\r' | '\n' => {
                    self.bump();
                    if c == '\r' && self.peek() == Some('\n') {
                        self.bump();
                    }
                    if self.brackets.is_empty() {
                        self.tokens.push(Token {
                            kind: TokenKind::Newline,
                            span: Span::new(start, start, line, column),
                        });
                        self.at_line_start = true;
                    }
                }
                '\'' | '"' => {
                    let tok = self.lex_string(String::new())?;
                    self.push(TokenKind::Str(tok), start, line, column);
                }
                c if c.is_ascii_digit()
                    || (c == '.' && self.peek_at(1).is_some_and(|n| n.is_ascii_digit())) =>
                {
                    let kind = self.lex_number();
                    self.push(kind, start, line, column);
                }
                c if is_ident_start(c) => {
                    let ident = self.lex_ident();
                    let lowered = ident.to_ascii_lowercase();
                    if matches!(self.peek(), Some('\'' | '"'))
                        && STRING_PREFIXES.contains(&lowered.as_str())
                    {
                        let tok = self.lex_string(lowered)?;
                        self.push(TokenKind::Str(tok), start, line, column);
                    } else {
                        self.push(TokenKind::Name(ident), start, line, column);
                    }
                }
                _ => {
                    let op = self.lex_operator()?;
                    self.push(TokenKind::Op(op), start, line, column);
                }
            }
        }
        self.finish()
    }

    /// Measure the indentation of a new logical line and emit Indent/Dedent.
    /// Returns `false` at end of input.
    fn handle_indentation(&mut self) -> Result<bool> {
        loop {
            let mut width = 0usize;
            while let Some(c) = self.peek() {
                match c {
                    ' ' => width += 1,
                    '\t' => width = (width / 8 + 1) * 8,
                    '\x0c' => width = 0,
                    _ => break,
                }
                self.bump();
            }
            match self.peek() {
                None => return Ok(false),
                Some('#') => {
                    self.skip_comment();
                    self.skip_line_break();
                }
                Some('\r' | '\n') => self.skip_line_break(),
                Some(_) => {
                    self.at_line_start = false;
                    let current = self.indents.last().copied().unwrap_or(0);
                    let here = Span::new(self.pos, self.pos, self.line, self.column());
                    if width > current {
                        self.indents.push(width);
                        self.tokens.push(Token {
                            kind: TokenKind::Indent,
                            span: here,
                        });
                    } else if width < current {
                        while self.indents.last().is_some_and(|&w| w > width) {
                            self.indents.pop();
                            self.tokens.push(Token {
                                kind: TokenKind::Dedent,
                                span: here,
                            });
                        }
                        if self.indents.last() != Some(&width) {
                            return Err(self.error(
                                ParseErrorCode::InconsistentIndent,
                                "unindent does not match any outer indentation level",
                            ));
                        }
                    }
                    return Ok(true);
                }
            }
        }
    }

    fn skip_comment(&mut self) {
        while let Some(c) = self.peek() {
            if c == '\n' || c == '\r' {
                break;
            }
            self.bump();
        }
    }

    fn skip_line_break(&mut self) {
        if self.peek() == Some('\r') {
            self.bump();
        }
        if self.peek() == Some('\n') {
            self.bump();
        }
    }

    fn lex_ident(&mut self) -> String {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if is_ident_continue(c) {
                self.bump();
            } else {
                break;
            }
        }
        self.src[start..self.pos].to_string()
    }

    fn lex_number(&mut self) -> TokenKind {
        let start = self.pos;
        let radix_prefix = self.peek() == Some('0')
            && matches!(self.peek_at(1), Some('x' | 'X' | 'o' | 'O' | 'b' | 'B'));
        if radix_prefix {
            self.bump();
            self.bump();
            while self
                .peek()
                .is_some_and(|c| c.is_ascii_hexdigit() || c == '_')
            {
                self.bump();
            }
            return TokenKind::Int(self.src[start..self.pos].to_string());
        }

        let mut is_float = false;
        self.eat_digits();
        if self.peek() == Some('.') {
            is_float = true;
            self.bump();
            self.eat_digits();
        }
        if matches!(self.peek(), Some('e' | 'E')) {
            let sign_then_digit = matches!(self.peek_at(1), Some('+' | '-'))
                && self.peek_at(2).is_some_and(|c| c.is_ascii_digit());
            if self.peek_at(1).is_some_and(|c| c.is_ascii_digit()) || sign_then_digit {
                is_float = true;
                self.bump();
                if matches!(self.peek(), Some('+' | '-')) {
                    self.bump();
                }
                self.eat_digits();
            }
        }
        if matches!(self.peek(), Some('j' | 'J')) {
            self.bump();
            return TokenKind::Imaginary(self.src[start..self.pos].to_string());
        }
        let text = self.src[start..self.pos].to_string();
        if is_float {
            TokenKind::Float(text)
        } else {
            TokenKind::Int(text)
        }
    }

    fn eat_digits(&mut self) {
        while self.peek().is_some_and(|c| c.is_ascii_digit() || c == '_') {
            self.bump();
        }
    }

    fn lex_string(&mut self, prefix: String) -> Result<StrToken> {
        let literal_start = self.pos - prefix.len();
        let quote = self.peek().ok_or_else(|| {
            self.error(ParseErrorCode::UnexpectedEof, "expected string quote")
        })?;
        let triple = self.peek_at(1) == Some(quote) && self.peek_at(2) == Some(quote);
        let quote_len = if triple { 3 } else { 1 };
        for _ in 0..quote_len {
            self.bump();
        }
        let body_start = self.pos;
        loop {
            let Some(c) = self.peek() else {
                return Err(self.error(
                    ParseErrorCode::UnterminatedString,
                    "unterminated string literal",
                ));
            };
            if c == '\\' {
                self.bump();
                if self.bump().is_none() {
                    return Err(self.error(
                        ParseErrorCode::UnterminatedString,
                        "unterminated string literal",
                    ));
                }
                continue;
            }
            if c == quote {
                if !triple {
                    break;
                }
                if self.peek_at(1) == Some(quote) && self.peek_at(2) == Some(quote) {
                    break;
                }
            }
            if (c == '\n' || c == '\r') && !triple {
                return Err(self.error(
                    ParseErrorCode::UnterminatedString,
                    "end of line inside string literal",
                ));
            }
            self.bump();
        }
        let body = self.src[body_start..self.pos].to_string();
        for _ in 0..quote_len {
            self.bump();
        }
        Ok(StrToken {
            prefix,
            body,
            raw: self.src[literal_start..self.pos].to_string(),
        })
    }

    fn lex_operator(&mut self) -> Result<&'static str> {
        let rest = &self.src[self.pos..];
        let Some(op) = OPERATORS.iter().copied().find(|op| rest.starts_with(op)) else {
            let c = self.peek().unwrap_or('\0');
            return Err(self.error(
                ParseErrorCode::InvalidCharacter,
                format!("invalid character {c:?}"),
            ));
        };
        let (line, column) = (self.line, self.column());
        match op {
            "(" | "[" | "{" => {
                let open = op.chars().next().unwrap_or('(');
                self.brackets.push((open, line, column));
            }
            ")" | "]" | "}" => {
                let expected = match op {
                    ")" => '(',
                    "]" => '[',
                    _ => '{',
                };
                match self.brackets.pop() {
                    Some((open, _, _)) if open == expected => {}
                    _ => {
                        return Err(self.error(
                            ParseErrorCode::UnbalancedBracket,
                            format!("unmatched '{op}'"),
                        ))
                    }
                }
            }
            _ => {}
        }
        self.pos += op.len();
        Ok(op)
    }

    fn finish(mut self) -> Result<Vec<Token>> {
        if let Some(&(open, line, column)) = self.brackets.last() {
            return Err(ParseError::new(
                ParseErrorCode::UnbalancedBracket,
                format!("'{open}' was never closed"),
                line,
                column,
            ));
        }
        let end = Span::new(self.pos, self.pos, self.line, self.column());
        let needs_newline = self
            .tokens
            .last()
            .is_some_and(|t| !matches!(t.kind, TokenKind::Newline | TokenKind::Dedent));
        if needs_newline {
            self.tokens.push(Token {
                kind: TokenKind::Newline,
                span: end,
            });
        }
        while self.indents.len() > 1 {
            self.indents.pop();
            self.tokens.push(Token {
                kind: TokenKind::Dedent,
                span: end,
            });
        }
        self.tokens.push(Token {
            kind: TokenKind::EndOfFile,
            span: end,
        });
        Ok(self.tokens)
    }
}

fn is_ident_start(c: char) -> bool {
    c == '_' || c.is_alphabetic()
}

fn is_ident_continue(c: char) -> bool {
    c == '_' || c.is_alphanumeric()
}

/// Decode Python backslash escapes in a non-raw string body.
pub fn decode_escapes(body: &str) -> String {
    let mut out = String::with_capacity(body.len());
    let mut chars = body.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        let Some(next) = chars.next() else {
            out.push('\\');
            break;
        };
        match next {
            '\n' => {}
            '\r' => {
                if chars.peek() == Some(&'\n') {
                    chars.next();
                }
            }
            '\\' => out.push('\\'),
            '\'' => out.push('\''),
            '"' => out.push('"'),
            'n' => out.push('\n'),
            't' => out.push('\t'),
            'r' => out.push('\r'),
            'a' => out.push('\x07'),
            'b' => out.push('\x08'),
            'f' => out.push('\x0c'),
            'v' => out.push('\x0b'),
            '0'..='7' => {
                let mut value = next.to_digit(8).unwrap_or(0);
                for _ in 0..2 {
                    match chars.peek().and_then(|d| d.to_digit(8)) {
                        Some(d) => {
                            value = value * 8 + d;
                            chars.next();
                        }
                        None => break,
                    }
                }
                out.push(char::from_u32(value).unwrap_or('\u{fffd}'));
            }
            'x' | 'u' | 'U' => {
                let width = match next {
                    'x' => 2,
                    'u' => 4,
                    _ => 8,
                };
                let digits: String = chars.clone().take(width).collect();
                match u32::from_str_radix(&digits, 16).ok().and_then(char::from_u32) {
                    Some(decoded) if digits.len() == width => {
                        for _ in 0..width {
                            chars.next();
                        }
                        out.push(decoded);
                    }
                    _ => {
                        out.push('\\');
                        out.push(next);
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

    fn kinds(src: &str) -> Vec<TokenKind> {
        tokenize(src).unwrap().into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn test_indent_and_dedent_are_balanced() {
        let src = "if x:\n    y = 1\nz = 2\n";
        let toks = kinds(src);
        let indents = toks.iter().filter(|k| **k == TokenKind::Indent).count();
        let dedents = toks.iter().filter(|k| **k == TokenKind::Dedent).count();
        assert_eq!(indents, 1);
        assert_eq!(dedents, 1);
        assert_eq!(toks.last(), Some(&TokenKind::EndOfFile));
    }

    #[test]
    fn test_newlines_inside_brackets_are_joined() {
        let toks = kinds("f(a,\n  b)\n");
        let newlines = toks.iter().filter(|k| **k == TokenKind::Newline).count();
        assert_eq!(newlines, 1);
    }

    #[test]
    fn test_comments_and_blank_lines_are_skipped() {
        let toks = kinds("# header\n\nx = 1  # trailing\n\n");
        assert_eq!(
            toks,
            vec![
                TokenKind::Name("x".into()),
                TokenKind::Op("="),
                TokenKind::Int("1".into()),
                TokenKind::Newline,
                TokenKind::EndOfFile,
            ]
        );
    }

    #[test]
    fn test_string_prefixes_and_triple_quotes() {
        let toks = tokenize("s = rb'\\d'\nt = \"\"\"a\nb\"\"\"\n").unwrap();
        let strs: Vec<&StrToken> = toks
            .iter()
            .filter_map(|t| match &t.kind {
                TokenKind::Str(s) => Some(s),
                _ => None,
            })
            .collect();
        assert_eq!(strs.len(), 2);
        assert!(strs[0].is_bytes() && strs[0].is_raw());
        assert_eq!(strs[1].value(), "a\nb");
    }

    #[test]
    fn test_numbers_are_classified() {
        let toks = kinds("1_000 0x1F 1.5 .5 1e-3 2j\n");
        assert_eq!(toks[0], TokenKind::Int("1_000".into()));
        assert_eq!(toks[1], TokenKind::Int("0x1F".into()));
        assert_eq!(toks[2], TokenKind::Float("1.5".into()));
        assert_eq!(toks[3], TokenKind::Float(".5".into()));
        assert_eq!(toks[4], TokenKind::Float("1e-3".into()));
        assert_eq!(toks[5], TokenKind::Imaginary("2j".into()));
    }

    #[test]
    fn test_inconsistent_dedent_is_an_error() {
        let err = tokenize("if x:\n        y\n    z\n").unwrap_err();
        assert_eq!(err.code, ParseErrorCode::InconsistentIndent);
    }

    #[test]
    fn test_unclosed_bracket_is_an_error() {
        let err = tokenize("f(1, 2\n").unwrap_err();
        assert_eq!(err.code, ParseErrorCode::UnbalancedBracket);
    }

    #[test]
    fn test_decode_escapes() {
        assert_eq!(decode_escapes("a\\nb\\x41\\'"), "a\nbA'");
        assert_eq!(decode_escapes("\\d"), "\\d");
    }

    #[test]
    fn test_spans_cover_token_text() {
        let src = "model.add(x)\n";
        let toks = tokenize(src).unwrap();
        assert_eq!(toks[0].span.slice(src), Some("model"));
        assert_eq!(toks[2].span.slice(src), Some("add"));
        assert_eq!(toks[2].span.column, 6);
    }
}
