//! Structured diagnostic records.
//!
//! A [`Diagnostic`] is one compiler-reported issue. Top-level records are
//! errors or warnings; each may carry an ordered chain of `note` records that
//! elaborate on it, possibly pointing into other files.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Message carried by the synthetic note that stands in for output the
/// compiler itself elided (e.g. suppressed candidate lists).
pub const ELIDED_MARKER: &str = "[...]";

/// Diagnostic severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
    Note,
}

impl Severity {
    /// Parse a severity word as printed by a compiler.
    ///
    /// `fatal error` is folded into [`Severity::Error`].
    pub fn from_word(word: &str) -> Option<Self> {
        match word {
            "error" | "fatal error" => Some(Severity::Error),
            "warning" => Some(Severity::Warning),
            "note" => Some(Severity::Note),
            _ => None,
        }
    }

    /// Whether this severity may head a diagnostic (error or warning).
    pub fn is_primary(self) -> bool {
        !matches!(self, Severity::Note)
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "error"),
            Severity::Warning => write!(f, "warning"),
            Severity::Note => write!(f, "note"),
        }
    }
}

/// A half-open column span `[start, end)`, 1-based, as marked by a caret line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnRange {
    pub start: u32,
    pub end: u32,
}

impl ColumnRange {
    pub fn new(start: u32, end: u32) -> Self {
        Self { start, end }
    }

    /// Number of columns covered.
    pub fn width(&self) -> u32 {
        self.end.saturating_sub(self.start)
    }
}

/// A single compiler diagnostic with its note chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub severity: Severity,
    /// Path exactly as the compiler printed it.
    pub file: PathBuf,
    /// 1-based line; 0 for synthetic records.
    pub line: u32,
    /// 1-based column; 0 when the compiler did not report one.
    pub column: u32,
    pub message: String,
    /// Compiler diagnostic code or option tag (`C2664`, `-Wunused-variable`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    /// Column span taken from the caret line, if the compiler printed one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub highlight: Option<ColumnRange>,
    /// Chained notes, in emission order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<Diagnostic>,
}

impl Diagnostic {
    pub fn new(
        severity: Severity,
        file: impl Into<PathBuf>,
        line: u32,
        column: u32,
        message: impl Into<String>,
    ) -> Self {
        Self {
            severity,
            file: file.into(),
            line,
            column,
            message: message.into(),
            code: None,
            highlight: None,
            notes: Vec::new(),
        }
    }

    /// The synthetic note recorded where the compiler elided its own output.
    pub fn elided() -> Self {
        Self::new(Severity::Note, PathBuf::new(), 0, 0, ELIDED_MARKER)
    }

    /// Whether this is the synthetic elision note.
    pub fn is_elided(&self) -> bool {
        self.severity == Severity::Note && self.line == 0 && self.message == ELIDED_MARKER
    }

    /// Whether this record points at a concrete source position.
    pub fn has_location(&self) -> bool {
        self.line > 0 && !self.file.as_os_str().is_empty()
    }

    /// The record followed by its notes, in emission order.
    pub fn chain(&self) -> impl Iterator<Item = &Diagnostic> {
        std::iter::once(self).chain(self.notes.iter())
    }

    /// One-line rendering in clang form: `path:line:col: severity: message`.
    pub fn header(&self) -> String {
        if self.is_elided() {
            return ELIDED_MARKER.to_string();
        }
        let mut out = format!("{}:{}", self.file.display(), self.line);
        if self.column > 0 {
            out.push_str(&format!(":{}", self.column));
        }
        out.push_str(&format!(": {}: {}", self.severity, self.message));
        if let Some(code) = &self.code {
            if code.starts_with('-') {
                out.push_str(&format!(" [{code}]"));
            } else {
                out.push_str(&format!(" ({code})"));
            }
        }
        out
    }

    /// Budget cost of this record and its note chain, in characters.
    ///
    /// Each record costs its rendered header plus a newline.
    pub fn cost(&self) -> usize {
        self.chain().map(|d| d.header().chars().count() + 1).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_severity_from_word() {
        assert_eq!(Severity::from_word("error"), Some(Severity::Error));
        assert_eq!(Severity::from_word("fatal error"), Some(Severity::Error));
        assert_eq!(Severity::from_word("warning"), Some(Severity::Warning));
        assert_eq!(Severity::from_word("note"), Some(Severity::Note));
        assert_eq!(Severity::from_word("remark"), None);
    }

    #[test]
    fn test_header_rendering() {
        let mut diag = Diagnostic::new(Severity::Warning, "a.cpp", 3, 9, "unused variable 'x'");
        diag.code = Some("-Wunused-variable".to_string());
        assert_eq!(
            diag.header(),
            "a.cpp:3:9: warning: unused variable 'x' [-Wunused-variable]"
        );

        let no_column = Diagnostic::new(Severity::Error, "b.c", 7, 0, "oops");
        assert_eq!(no_column.header(), "b.c:7: error: oops");
    }

    #[test]
    fn test_cost_includes_notes() {
        let mut diag = Diagnostic::new(Severity::Error, "a.cpp", 5, 6, "bad");
        let alone = diag.cost();
        assert_eq!(alone, "a.cpp:5:6: error: bad\n".len());

        diag.notes
            .push(Diagnostic::new(Severity::Note, "a.cpp", 1, 1, "here"));
        assert_eq!(diag.cost(), alone + "a.cpp:1:1: note: here\n".len());
    }

    #[test]
    fn test_elided_note() {
        let note = Diagnostic::elided();
        assert!(note.is_elided());
        assert!(!note.has_location());
        assert_eq!(note.header(), ELIDED_MARKER);
    }

    #[test]
    fn test_column_range_width() {
        assert_eq!(ColumnRange::new(6, 13).width(), 7);
        assert_eq!(ColumnRange::new(5, 5).width(), 0);
    }
}
