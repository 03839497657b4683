use std::fmt;
use std::ops::Range;

use codespan_reporting::diagnostic::{Diagnostic, Label, Severity};
use serde::Serialize;

/// A line/column location in page source.
///
/// Lines and columns are 1-based. The zero value marks a synthetic or
/// unknown location, such as a map created by assigning `@a.b`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Position {
    pub line: usize,
    pub column: usize,
}

impl Position {
    pub fn new(line: usize, column: usize) -> Self {
        Position { line, column }
    }

    pub fn is_unknown(&self) -> bool {
        self.line == 0 && self.column == 0
    }

    /// Move past `c` to the position of the character after it.
    pub(crate) fn advance(&mut self, c: char) {
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
    }

    /// Byte range of the character at this position within `source`.
    ///
    /// Positions past the end of a line clamp to the line's end, and unknown
    /// positions map to an empty range at the start of the file.
    pub fn span_in(&self, source: &str) -> Range<usize> {
        if self.is_unknown() {
            return 0..0;
        }
        let mut offset = 0;
        for (index, line) in source.split_inclusive('\n').enumerate() {
            if index + 1 == self.line {
                let text = line.trim_end_matches('\n');
                let start = text
                    .char_indices()
                    .nth(self.column.saturating_sub(1))
                    .map(|(byte, _)| offset + byte)
                    .unwrap_or(offset + text.len());
                let end = source[start..]
                    .chars()
                    .next()
                    .filter(|c| *c != '\n')
                    .map(|c| start + c.len_utf8())
                    .unwrap_or(start);
                return start..end;
            }
            offset += line.len();
        }
        source.len()..source.len()
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// A non-fatal diagnostic recorded on a page while parsing or rendering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Warning {
    pub message: String,
    pub pos: Position,
}

impl Warning {
    pub fn new(message: impl Into<String>, pos: Position) -> Self {
        Warning {
            message: message.into(),
            pos,
        }
    }

    /// Convert to a codespan-reporting Diagnostic for display.
    pub fn to_diagnostic(&self, file_id: usize, source: &str) -> Diagnostic<usize> {
        let diagnostic = Diagnostic::new(Severity::Warning).with_message(&self.message);
        if self.pos.is_unknown() {
            return diagnostic;
        }
        diagnostic.with_labels(vec![Label::primary(file_id, self.pos.span_in(source))])
    }
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.pos.is_unknown() {
            write!(f, "{}", self.message)
        } else {
            write!(f, "{}: {}", self.pos, self.message)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn span_points_at_character() {
        let source = "first\nsecond line\n";
        assert_eq!(Position::new(2, 3).span_in(source), 8..9);
        assert_eq!(&source[Position::new(2, 3).span_in(source)], "c");
    }

    #[test]
    fn span_clamps_past_line_end() {
        let source = "ab\ncd\n";
        assert_eq!(Position::new(1, 10).span_in(source), 2..2);
        assert_eq!(Position::new(9, 1).span_in(source), 6..6);
    }

    #[test]
    fn warning_display_includes_position() {
        let warning = Warning::new("Stray key 'a' ignored", Position::new(3, 7));
        assert_eq!(warning.to_string(), "3:7: Stray key 'a' ignored");
        assert_eq!(Warning::new("x", Position::default()).to_string(), "x");
    }
}
