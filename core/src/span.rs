//! Source reference tracking. Every AST node and token carries a [Span] so
//! that errors can point back at the exact bit of source that caused them.

use nom_locate::LocatedSpan;
use serde::Serialize;
use std::fmt::{self, Write};

/// The span type used while parsing, before we've boiled it down to a
/// plain [Span]. Carries the full remaining input plus position tracking.
pub type RawSpan<'a> = LocatedSpan<&'a str>;

/// A `(file, line, column)`-style reference into the original source, plus
/// enough extra data (byte offset + length) to slice the exact text back out
/// of the source for error messages.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Span {
    pub offset: usize,
    pub length: usize,
    pub start_line: usize,
    pub start_col: usize,
    pub end_line: usize,
    pub end_col: usize,
}

impl Span {
    /// Build a span covering the given raw span, which should be the slice of
    /// input consumed by some parser (i.e. the difference between the input
    /// before and after the parser ran).
    pub fn from_raw_span(raw: &RawSpan<'_>) -> Self {
        let start_line = raw.location_line() as usize;
        let start_col = raw.get_utf8_column();
        let length = raw.fragment().len();
        let newlines = raw.fragment().matches('\n').count();
        let end_line = start_line + newlines;
        let end_col = match raw.fragment().rfind('\n') {
            Some(idx) => raw.fragment()[idx + 1..].len() + 1,
            None => start_col + length,
        };
        Self {
            offset: raw.location_offset(),
            length,
            start_line,
            start_col,
            end_line,
            end_col,
        }
    }

    /// Build a zero-length span at the current position of a raw span. Used
    /// when we need to report an error but have no source text to attach to
    /// it (e.g. the remaining, unconsumed input after a syntax error).
    pub fn from_position(raw: &RawSpan<'_>) -> Self {
        let start_line = raw.location_line() as usize;
        let start_col = raw.get_utf8_column();
        Self {
            offset: raw.location_offset(),
            length: 0,
            start_line,
            start_col,
            end_line: start_line,
            end_col: start_col,
        }
    }

    /// Merge two spans into one that covers both (and anything in between).
    /// Assumes `self` comes before `other` in the source.
    pub fn merge(&self, other: &Span) -> Span {
        Span {
            offset: self.offset,
            length: (other.offset + other.length).saturating_sub(self.offset),
            start_line: self.start_line,
            start_col: self.start_col,
            end_line: other.end_line,
            end_col: other.end_col,
        }
    }

    /// Slice the bit of source text that this span covers out of the full
    /// source string.
    pub fn get_source_slice<'a>(&self, src: &'a str) -> &'a str {
        let end = (self.offset + self.length).min(src.len());
        let start = self.offset.min(end);
        &src[start..end]
    }
}

/// Render a `^^^` style highlight of a span underneath the source line(s) it
/// covers. Used by [crate::error::WithSource]'s alternate (`{:#}`) format.
pub fn fmt_src_highlights(
    f: &mut dyn Write,
    span: &Span,
    src: &str,
) -> fmt::Result {
    let line = src.lines().nth(span.start_line.saturating_sub(1));
    if let Some(line) = line {
        writeln!(f)?;
        writeln!(f, "{}", line)?;
        let marker_len = if span.start_line == span.end_line {
            (span.end_col.saturating_sub(span.start_col)).max(1)
        } else {
            line.len().saturating_sub(span.start_col.saturating_sub(1)).max(1)
        };
        write!(
            f,
            "{}{}",
            " ".repeat(span.start_col.saturating_sub(1)),
            "^".repeat(marker_len)
        )?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_slice() {
        let span = Span {
            offset: 2,
            length: 3,
            start_line: 1,
            start_col: 3,
            end_line: 1,
            end_col: 6,
        };
        assert_eq!(span.get_source_slice("hi LBL rest"), "LBL");
    }
}
