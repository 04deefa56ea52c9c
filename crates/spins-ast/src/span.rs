//! Source positions carried from the Promela parser.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A position in the Promela source.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Span {
    /// Line number (1-indexed, 0 for generated code).
    pub line: u32,
    /// Column number (1-indexed, in characters not bytes).
    pub column: u32,
}

impl Span {
    /// Create a new span.
    pub fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }

    /// Create a dummy span for generated code.
    pub fn dummy() -> Self {
        Self::default()
    }

    /// True for spans of synthesized actions and expressions.
    pub fn is_dummy(&self) -> bool {
        self.line == 0
    }

    /// The earlier of two spans, ignoring dummies.
    pub fn first(self, other: Self) -> Self {
        match (self.is_dummy(), other.is_dummy()) {
            (true, _) => other,
            (_, true) => self,
            _ if (other.line, other.column) < (self.line, self.column) => other,
            _ => self,
        }
    }
}

impl fmt::Debug for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_dummy() {
            write!(f, "<generated>")
        } else {
            write!(f, "line {}, column {}", self.line, self.column)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_ignores_dummy() {
        let a = Span::new(3, 7);
        assert_eq!(Span::dummy().first(a), a);
        assert_eq!(a.first(Span::dummy()), a);
        assert_eq!(a.first(Span::new(2, 9)), Span::new(2, 9));
    }

    #[test]
    fn test_display() {
        assert_eq!(Span::new(12, 4).to_string(), "line 12, column 4");
        assert_eq!(Span::dummy().to_string(), "<generated>");
    }
}
