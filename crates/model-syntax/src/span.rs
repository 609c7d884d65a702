//! Byte-offset source spans.

use serde::{Deserialize, Serialize};

/// Half-open byte range `[start, end)` into the text a tree was parsed from,
/// plus the 1-based line and 0-based column of `start`.
///
/// Nodes synthesized by tree rewrites carry [`Span::SYNTHETIC`]; their spans
/// do not refer to any source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
    pub line: usize,
    pub column: usize,
}

impl Span {
    pub const SYNTHETIC: Span = Span {
        start: 0,
        end: 0,
        line: 0,
        column: 0,
    };

    pub fn new(start: usize, end: usize, line: usize, column: usize) -> Self {
        Self {
            start,
            end,
            line,
            column,
        }
    }

    /// Whether this span was produced by the parser rather than a rewrite.
    pub fn is_synthetic(&self) -> bool {
        self.line == 0
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Slice the covered text out of `source`.
    pub fn slice<'a>(&self, source: &'a str) -> Option<&'a str> {
        if self.is_synthetic() {
            return None;
        }
        source.get(self.start..self.end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slice_returns_covered_text() {
        let span = Span::new(4, 9, 1, 4);
        assert_eq!(span.slice("abc hello world"), Some("hello"));
        assert_eq!(span.len(), 5);
    }

    #[test]
    fn synthetic_span_has_no_text() {
        assert!(Span::SYNTHETIC.is_synthetic());
        assert_eq!(Span::SYNTHETIC.slice("anything"), None);
    }
}
