//! Classification of the lines that follow a diagnostic header.
//!
//! Compilers echo the offending source line and mark it with a caret line
//! (`^`, optionally with `~` range markers). Newer clang and gcc prefix both
//! with a line-number gutter (`   32 |     f(i);` / `      |     ^`); columns
//! are measured after the gutter.

use std::sync::LazyLock;

use regex::Regex;

use crate::diagnostic::ColumnRange;

/// Line-number gutter: optional number, then `|` and one space.
static GUTTER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:\d+)?\s*\|(?: |$)").expect("GUTTER regex should compile")
});

/// Compiler summary and include-trace lines that carry no diagnostic.
static TRAILER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?:\d+ (?:errors?|warnings?)(?: and \d+ (?:errors?|warnings?))? generated\.|In file included from |\s+from \S+:\d+[:,]$|compilation terminated\.)",
    )
    .expect("TRAILER regex should compile")
});

/// Split off a line-number gutter. Returns the text after it, if present.
pub fn strip_gutter(line: &str) -> Option<&str> {
    GUTTER.find(line).map(|m| &line[m.end()..])
}

/// Whether the line is a gutter-prefixed source echo (or gcc label line).
pub fn is_gutter_line(line: &str) -> bool {
    GUTTER.is_match(line)
}

/// Column span marked by a caret line, or `None` if the line is not one.
///
/// The span runs from the first to the last marker character, so a caret at
/// column C with an underline of total width W yields `[C, C + W)`.
pub fn caret_span(line: &str) -> Option<ColumnRange> {
    let body = strip_gutter(line).unwrap_or(line);
    let mut first = None;
    let mut last = 0usize;
    for (idx, ch) in body.chars().enumerate() {
        match ch {
            '^' | '~' => {
                first.get_or_insert(idx);
                last = idx;
            }
            ' ' | '\t' => {}
            _ => return None,
        }
    }
    let first = first?;
    Some(ColumnRange::new(first as u32 + 1, last as u32 + 2))
}

/// Elision marker the compiler prints in place of suppressed output.
pub fn is_elision_marker(line: &str) -> bool {
    matches!(line.trim(), "..." | "[...]" | "\u{2026}")
}

/// Summary, include-trace, and scope chatter.
pub fn is_trailer(line: &str) -> bool {
    TRAILER.is_match(line) || super::matcher::is_scope_line(line)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_plain_caret() {
        assert_eq!(caret_span("    ^"), Some(ColumnRange::new(5, 6)));
    }

    #[test]
    fn test_caret_with_underline() {
        // caret at column 3, underline through column 10: width 8
        assert_eq!(caret_span("  ~~~~^~~~"), Some(ColumnRange::new(3, 11)));
    }

    #[test]
    fn test_caret_with_detached_range() {
        assert_eq!(
            caret_span("     ^                  ~"),
            Some(ColumnRange::new(6, 26))
        );
    }

    #[test]
    fn test_gutter_caret() {
        assert_eq!(caret_span("      |     ^"), Some(ColumnRange::new(5, 6)));
        assert_eq!(caret_span("      |      ^ ~~~~~~"), Some(ColumnRange::new(6, 14)));
    }

    #[test]
    fn test_source_lines_are_not_carets() {
        assert_eq!(caret_span("    g(nullptr);"), None);
        assert_eq!(caret_span("   32 |     f(i);"), None);
        assert_eq!(caret_span(""), None);
        assert_eq!(caret_span("      |"), None);
        assert_eq!(caret_span("x ^ y"), None);
    }

    #[test]
    fn test_gutter_detection() {
        assert!(is_gutter_line("   32 |     f(i);"));
        assert!(is_gutter_line("      |     ^"));
        assert!(is_gutter_line("   22 |"));
        assert!(!is_gutter_line("    a | b;"));
        assert_eq!(strip_gutter("   26 | void f(char*) {}"), Some("void f(char*) {}"));
    }

    #[test]
    fn test_elision_markers() {
        assert!(is_elision_marker("[...]"));
        assert!(is_elision_marker("  ...  "));
        assert!(is_elision_marker("\u{2026}"));
        assert!(!is_elision_marker("...and more"));
    }

    #[test]
    fn test_trailers() {
        assert!(is_trailer("1 error generated."));
        assert!(is_trailer("2 warnings and 1 error generated."));
        assert!(is_trailer("In file included from main.cpp:1:"));
        assert!(is_trailer("                 from main.cpp:3,"));
        assert!(is_trailer("compilation terminated."));
        assert!(is_trailer("a.cpp: In function 'int main()':"));
        assert!(!is_trailer("    g(nullptr);"));
    }
}
