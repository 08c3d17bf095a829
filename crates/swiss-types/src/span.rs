use serde::{Deserialize, Serialize};
use std::fmt;

/// Source location span.
///
/// Line and column values are 1-based so they can go straight into
/// human-readable diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Span {
    pub line: u32,
    pub column: u32,
    pub end_line: u32,
    pub end_column: u32,
}

impl Span {
    pub fn new(line: u32, column: u32, end_line: u32, end_column: u32) -> Self {
        Self {
            line,
            column,
            end_line,
            end_column,
        }
    }

    /// Zero-width span at a single position.
    pub fn point(line: u32, column: u32) -> Self {
        Self::new(line, column, line, column)
    }

    /// Span covering both `self` and `other`.
    pub fn to(self, other: Span) -> Span {
        let (line, column) = if (other.line, other.column) < (self.line, self.column) {
            (other.line, other.column)
        } else {
            (self.line, self.column)
        };
        let (end_line, end_column) =
            if (other.end_line, other.end_column) > (self.end_line, self.end_column) {
                (other.end_line, other.end_column)
            } else {
                (self.end_line, self.end_column)
            };
        Span::new(line, column, end_line, end_column)
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// A named source file plus cached line offsets for diagnostics.
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub name: String,
    pub source: String,
    line_starts: Vec<usize>,
}

impl SourceFile {
    pub fn new(name: impl Into<String>, source: impl Into<String>) -> Self {
        let source = source.into();
        let line_starts = std::iter::once(0)
            .chain(source.match_indices('\n').map(|(i, _)| i + 1))
            .collect();
        Self {
            name: name.into(),
            source,
            line_starts,
        }
    }

    /// Extract a source line by 1-based number, without its terminator.
    pub fn line(&self, number: u32) -> Option<&str> {
        let idx = number.checked_sub(1)? as usize;
        let start = *self.line_starts.get(idx)?;
        let end = self
            .line_starts
            .get(idx + 1)
            .map(|&next| next.saturating_sub(1))
            .unwrap_or(self.source.len());
        Some(self.source[start..end].trim_end_matches('\r'))
    }

    pub fn line_count(&self) -> usize {
        self.line_starts.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_point_span() {
        let s = Span::point(4, 9);
        assert_eq!(s.line, 4);
        assert_eq!(s.column, 9);
        assert_eq!(s.end_line, 4);
        assert_eq!(s.end_column, 9);
    }

    #[test]
    fn test_span_to_covers_both() {
        let a = Span::new(1, 5, 1, 10);
        let b = Span::new(3, 2, 3, 7);
        let joined = a.to(b);
        assert_eq!(joined, Span::new(1, 5, 3, 7));
        // Commutes
        assert_eq!(b.to(a), joined);
    }

    #[test]
    fn test_span_display() {
        assert_eq!(format!("{}", Span::point(12, 3)), "12:3");
    }

    #[test]
    fn test_source_file_lines() {
        let sf = SourceFile::new("main.swiss", "SUB Main()\n    HALT\nEND SUB");
        assert_eq!(sf.line_count(), 3);
        assert_eq!(sf.line(1), Some("SUB Main()"));
        assert_eq!(sf.line(2), Some("    HALT"));
        assert_eq!(sf.line(3), Some("END SUB"));
        assert_eq!(sf.line(0), None);
        assert_eq!(sf.line(4), None);
    }

    #[test]
    fn test_source_file_crlf() {
        let sf = SourceFile::new("main.swiss", "CONST A = 1\r\nCONST B = 2\r\n");
        assert_eq!(sf.line(1), Some("CONST A = 1"));
        assert_eq!(sf.line(2), Some("CONST B = 2"));
    }

    #[test]
    fn test_empty_source() {
        let sf = SourceFile::new("lib.swiss", "");
        assert_eq!(sf.line_count(), 1);
        assert_eq!(sf.line(1), Some(""));
    }
}
