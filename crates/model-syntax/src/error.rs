//! Parse error envelope.

use serde::{Deserialize, Serialize};

/// Stable classification of parse failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParseErrorCode {
    UnterminatedString,
    InvalidCharacter,
    InconsistentIndent,
    UnbalancedBracket,
    UnexpectedToken,
    UnexpectedEof,
    InvalidTarget,
}

/// Error raised by the lexer or parser, pinned to a source position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{code:?}: {message} (line={line}, column={column})")]
pub struct ParseError {
    pub code: ParseErrorCode,
    pub message: String,
    pub line: usize,
    pub column: usize,
}

impl ParseError {
    pub fn new(code: ParseErrorCode, message: impl Into<String>, line: usize, column: usize) -> Self {
        Self {
            code,
            message: message.into(),
            line,
            column,
        }
    }
}

pub type Result<T> = std::result::Result<T, ParseError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_position() {
        let err = ParseError::new(ParseErrorCode::UnexpectedToken, "expected ':'", 3, 7);
        let text = err.to_string();
        assert!(text.contains("UnexpectedToken"));
        assert!(text.contains("line=3"));
        assert!(text.contains("column=7"));
    }
}
