//! Diagnostic parser: raw compiler output to structured [`Diagnostic`]s.
//!
//! Parsing is line-oriented and driven by a small state machine:
//!
//! ```text
//!            header (error/warning/note)
//!   Seeking ─────────────────────────────► InCaretBlock
//!      ▲                                      │  caret line, or
//!      │ blank line                           │  next header / trailer
//!      │                                      ▼
//!      └──────────────────────────────── InNoteChain ──► note header appends
//! ```
//!
//! Format differences between compilers live entirely in [`LineMatcher`];
//! the state transitions are shared.

pub mod caret;
pub mod matcher;

use tracing::debug;

use crate::diagnostic::{ColumnRange, Diagnostic};
use crate::error::Issue;

pub use matcher::{CompilerFamily, Header, HeaderMatch, LineMatcher};

/// Parser output: diagnostics in emission order plus recovered issues.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParseOutput {
    pub diagnostics: Vec<Diagnostic>,
    pub issues: Vec<Issue>,
    /// The matcher used, or `None` when nothing looked like compiler output.
    pub matcher: Option<LineMatcher>,
}

/// Parse raw compiler output.
///
/// Never fails: input with no recognizable diagnostics yields an empty list.
pub fn parse(text: &str, family: CompilerFamily) -> ParseOutput {
    let Some(matcher) = family.matcher().or_else(|| LineMatcher::sniff(text.lines())) else {
        debug!("No diagnostic headers found in compiler output");
        return ParseOutput::default();
    };

    let mut parser = Parser::new(matcher);
    for (idx, line) in text.lines().enumerate() {
        parser.feed(idx + 1, line.trim_end_matches('\r'));
    }
    let output = parser.finish();
    debug!(
        matcher = ?matcher,
        diagnostics = output.diagnostics.len(),
        issues = output.issues.len(),
        "Parsed compiler output"
    );
    output
}

/// A line held while we wait to learn whether a caret line follows.
#[derive(Debug)]
struct Pending {
    text: String,
    indented: bool,
}

#[derive(Debug)]
enum State {
    /// No open note chain.
    Seeking,
    /// After a header: collecting echo lines until the caret line.
    InCaretBlock { pending: Vec<Pending> },
    /// The chain of the last error/warning is open for further notes.
    InNoteChain,
}

struct Parser {
    matcher: LineMatcher,
    state: State,
    diagnostics: Vec<Diagnostic>,
    issues: Vec<Issue>,
}

impl Parser {
    fn new(matcher: LineMatcher) -> Self {
        Self {
            matcher,
            state: State::Seeking,
            diagnostics: Vec::new(),
            issues: Vec::new(),
        }
    }

    fn feed(&mut self, line_no: usize, line: &str) {
        match self.matcher.parse_header(line) {
            HeaderMatch::Header(header) => {
                self.close_caret_block();
                self.start(line_no, header);
                return;
            }
            HeaderMatch::Ambiguous(reason) => {
                debug!(line = line_no, %reason, "Ambiguous diagnostic header kept as text");
                self.issues.push(Issue::ParseAmbiguous {
                    input_line: line_no,
                    reason,
                });
                if let State::InCaretBlock { pending } = &mut self.state {
                    pending.push(Pending {
                        text: line.trim().to_string(),
                        indented: true,
                    });
                } else {
                    self.append_continuation(line.trim());
                }
                return;
            }
            HeaderMatch::NotHeader => {}
        }

        let state = std::mem::replace(&mut self.state, State::Seeking);
        self.state = match state {
            State::Seeking => self.seeking(line),
            State::InCaretBlock { pending } => self.in_caret_block(pending, line),
            State::InNoteChain => self.in_note_chain(line),
        };
    }

    fn finish(mut self) -> ParseOutput {
        self.close_caret_block();
        ParseOutput {
            diagnostics: self.diagnostics,
            issues: self.issues,
            matcher: Some(self.matcher),
        }
    }

    /// Open a new record for a header line.
    fn start(&mut self, line_no: usize, header: Header) {
        let mut diag = Diagnostic::new(
            header.severity,
            header.file,
            header.line,
            header.column,
            header.message,
        );
        diag.code = header.code;

        if diag.severity.is_primary() {
            self.diagnostics.push(diag);
            self.state = State::InCaretBlock {
                pending: Vec::new(),
            };
            return;
        }

        match self.diagnostics.last_mut() {
            Some(parent) => {
                if matches!(self.state, State::Seeking) {
                    debug!(line = line_no, "Note after a closed chain attached to last diagnostic");
                }
                parent.notes.push(diag);
                self.state = State::InCaretBlock {
                    pending: Vec::new(),
                };
            }
            None => {
                debug!(line = line_no, "Dropping note with no parent diagnostic");
                self.issues.push(Issue::OrphanNote {
                    input_line: line_no,
                });
                self.state = State::Seeking;
            }
        }
    }

    fn seeking(&mut self, line: &str) -> State {
        if caret::is_elision_marker(line) {
            self.push_elided();
        } else if let Some(span) = caret::caret_span(line) {
            self.apply_stray_caret(span);
        }
        State::Seeking
    }

    fn in_caret_block(&mut self, mut pending: Vec<Pending>, line: &str) -> State {
        if line.trim().is_empty() {
            self.flush_continuations(pending);
            return State::Seeking;
        }
        if caret::is_elision_marker(line) {
            self.flush_continuations(pending);
            self.push_elided();
            return State::InNoteChain;
        }
        if let Some(span) = caret::caret_span(line) {
            // The line right above the caret is the source echo; indented
            // lines held before it were wrapped message text.
            pending.pop();
            self.flush_continuations(pending);
            if let Some(target) = self.last_record_mut() {
                target.highlight = Some(span);
            }
            return State::InNoteChain;
        }
        if caret::is_trailer(line) {
            self.flush_continuations(pending);
            return State::InNoteChain;
        }
        if caret::is_gutter_line(line) {
            // A gutter echo ends the message; earlier held lines were wrapped text.
            self.flush_continuations(pending);
            return State::InCaretBlock {
                pending: Vec::new(),
            };
        }
        pending.push(Pending {
            text: line.trim().to_string(),
            indented: line.starts_with([' ', '\t']),
        });
        State::InCaretBlock { pending }
    }

    fn in_note_chain(&mut self, line: &str) -> State {
        if line.trim().is_empty() {
            return State::Seeking;
        }
        if caret::is_elision_marker(line) {
            self.push_elided();
        } else if let Some(span) = caret::caret_span(line) {
            self.apply_stray_caret(span);
        }
        // Fix-it hints, gcc label lines, and trailers carry nothing we keep.
        State::InNoteChain
    }

    /// End an unfinished caret block: held indented lines were message text.
    fn close_caret_block(&mut self) {
        if matches!(self.state, State::InCaretBlock { .. })
            && let State::InCaretBlock { pending } =
                std::mem::replace(&mut self.state, State::InNoteChain)
        {
            self.flush_continuations(pending);
        }
    }

    fn flush_continuations(&mut self, pending: Vec<Pending>) {
        for line in pending.into_iter().filter(|p| p.indented) {
            self.append_continuation(&line.text);
        }
    }

    fn append_continuation(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        if let Some(target) = self.last_record_mut() {
            target.message.push('\n');
            target.message.push_str(text);
        }
    }

    fn push_elided(&mut self) {
        if let Some(parent) = self.diagnostics.last_mut() {
            parent.notes.push(Diagnostic::elided());
        }
    }

    /// A caret line detached from its header (e.g. after elided output)
    /// belongs to the latest record still missing a highlight.
    fn apply_stray_caret(&mut self, span: ColumnRange) {
        let Some(parent) = self.diagnostics.last_mut() else {
            return;
        };
        let note = parent
            .notes
            .iter()
            .rposition(|d| d.highlight.is_none() && !d.is_elided() && d.has_location());
        match note {
            Some(idx) => parent.notes[idx].highlight = Some(span),
            None if parent.highlight.is_none() => parent.highlight = Some(span),
            None => {}
        }
    }

    /// The most recently opened record: the last note, or its parent.
    fn last_record_mut(&mut self) -> Option<&mut Diagnostic> {
        let parent = self.diagnostics.last_mut()?;
        let notes = parent.notes.len();
        if notes == 0 {
            Some(parent)
        } else {
            parent.notes.get_mut(notes - 1)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostic::{ELIDED_MARKER, Severity};
    use pretty_assertions::assert_eq;
    use std::path::PathBuf;

    fn parse_clang(text: &str) -> ParseOutput {
        parse(text, CompilerFamily::Auto)
    }

    #[test]
    fn test_empty_input() {
        let out = parse_clang("");
        assert!(out.diagnostics.is_empty());
        assert!(out.issues.is_empty());
        assert_eq!(out.matcher, None);
    }

    #[test]
    fn test_garbage_input() {
        let out = parse_clang("make: *** [all] Error 1\nhello\n   ^\n");
        assert!(out.diagnostics.is_empty());
    }

    #[test]
    fn test_error_with_note_chain() {
        let text = "a.cpp:5:6: error: no matching function for call to 'g'\n\
                    a.cpp:5:6: note: candidate template ignored: substitution failure\n";
        let out = parse_clang(text);
        assert_eq!(out.diagnostics.len(), 1);
        let diag = &out.diagnostics[0];
        assert_eq!(diag.severity, Severity::Error);
        assert_eq!(diag.file, PathBuf::from("a.cpp"));
        assert_eq!(diag.line, 5);
        assert_eq!(diag.notes.len(), 1);
        assert_eq!(diag.notes[0].severity, Severity::Note);
        assert_eq!(diag.notes[0].line, 5);
        assert_eq!(diag.highlight, None);
    }

    #[test]
    fn test_counts_top_level_in_order() {
        let text = "\
a.c:1:1: warning: first
a.c:2:1: error: second
a.c:2:3: note: about second
b.c:3:1: warning: third
";
        let out = parse_clang(text);
        let messages: Vec<_> = out.diagnostics.iter().map(|d| d.message.as_str()).collect();
        assert_eq!(messages, vec!["first", "second", "third"]);
        assert_eq!(out.diagnostics[1].notes.len(), 1);
        assert!(out.diagnostics[0].notes.is_empty());
        assert!(out.diagnostics[2].notes.is_empty());
    }

    #[test]
    fn test_caret_block_sets_highlight() {
        let text = "\
/src/a.cpp:10:5: error: no matching function for call to 'g'
    g(nullptr);
    ^
/src/a.cpp:5:6: note: candidate template ignored
auto g(T t) -> decltype(f(t)) {
     ^                  ~
1 error generated.
";
        let out = parse_clang(text);
        assert_eq!(out.diagnostics.len(), 1);
        let diag = &out.diagnostics[0];
        assert_eq!(diag.highlight, Some(ColumnRange::new(5, 6)));
        assert_eq!(diag.message, "no matching function for call to 'g'");
        assert_eq!(diag.notes[0].highlight, Some(ColumnRange::new(6, 26)));
        assert_eq!(diag.notes[0].message, "candidate template ignored");
    }

    #[test]
    fn test_gutter_echo() {
        let text = "\
/w/t.cpp:32:5: error: no matching function for call to 'f'
   32 |     f(i);
      |     ^
/w/t.cpp:28:6: note: candidate function not viable: 1st argument ('const float') would lose const qualifier
   28 | void f(float&) {}
      |      ^ ~~~~~~
1 error generated.
";
        let out = parse(text, CompilerFamily::Clang);
        let diag = &out.diagnostics[0];
        assert_eq!(diag.highlight, Some(ColumnRange::new(5, 6)));
        assert_eq!(diag.notes[0].highlight, Some(ColumnRange::new(6, 14)));
    }

    #[test]
    fn test_multiline_message_continuation() {
        let text = "\
a.cpp(12): error C2664: 'void f(T)': cannot convert argument 1
        with
        [
            T=int
        ]
a.cpp(3): note: see declaration of 'f'
";
        let out = parse_clang(text);
        assert_eq!(out.matcher, Some(LineMatcher::Msvc));
        let diag = &out.diagnostics[0];
        assert_eq!(
            diag.message,
            "'void f(T)': cannot convert argument 1\nwith\n[\nT=int\n]"
        );
        assert_eq!(diag.code.as_deref(), Some("C2664"));
        assert_eq!(diag.notes.len(), 1);
        assert_eq!(diag.highlight, None);
    }

    #[test]
    fn test_echo_is_not_continuation() {
        let text = "\
a.c:4:3: error: use of undeclared identifier 'y'
  y = 1;
  ^
";
        let out = parse_clang(text);
        assert_eq!(out.diagnostics[0].message, "use of undeclared identifier 'y'");
    }

    #[test]
    fn test_elision_marker_becomes_note() {
        let text = "\
/w/t.cpp:32:5: error: no matching function for call to 'f'
   32 |     f(i);
      |     ^
/w/t.cpp:26:6: note: candidate function not viable
   26 | void f(char*) {}

[...]

      |      ^ ~~~~~
/w/t.cpp:28:6: note: candidate function not viable: would lose const qualifier
   28 | void f(float&) {}
      |      ^ ~~~~~~
";
        let out = parse_clang(text);
        assert_eq!(out.diagnostics.len(), 1);
        let notes = &out.diagnostics[0].notes;
        assert_eq!(notes.len(), 3);
        assert_eq!(notes[0].line, 26);
        assert_eq!(notes[0].highlight, Some(ColumnRange::new(6, 13)));
        assert!(notes[1].is_elided());
        assert_eq!(notes[1].message, ELIDED_MARKER);
        assert_eq!(notes[2].line, 28);
        assert_eq!(notes[2].highlight, Some(ColumnRange::new(6, 14)));
    }

    #[test]
    fn test_ambiguous_header_is_continuation() {
        let text = "\
a.c:1:1: error: bad thing
  a.c:xx:1: error: not really a header
b.c:2:2: warning: next
";
        let out = parse_clang(text);
        assert_eq!(out.diagnostics.len(), 2);
        assert!(out.diagnostics[0].message.contains("not really a header"));
        assert!(matches!(
            out.issues.as_slice(),
            [Issue::ParseAmbiguous { input_line: 2, .. }]
        ));
    }

    #[test]
    fn test_orphan_note() {
        let text = "a.c:1:1: note: floating note\na.c:2:1: error: real\n";
        let out = parse_clang(text);
        assert_eq!(out.diagnostics.len(), 1);
        assert_eq!(out.issues, vec![Issue::OrphanNote { input_line: 1 }]);
    }

    #[test]
    fn test_blank_line_closes_chain_but_late_note_attaches() {
        let text = "a.c:1:1: error: first\n\na.c:1:1: note: late\n";
        let out = parse_clang(text);
        assert_eq!(out.diagnostics.len(), 1);
        assert_eq!(out.diagnostics[0].notes.len(), 1);
        assert!(out.issues.is_empty());
    }

    #[test]
    fn test_gcc_output() {
        let text = "\
main.cpp: In function 'int main()':
main.cpp:7:6: error: invalid conversion from 'const char*' to 'int' [-fpermissive]
    7 |  int x = \"s\";
      |          ^~~
      |          |
      |          const char*
main.cpp:9: warning: statement has no effect
";
        let out = parse_clang(text);
        assert_eq!(out.matcher, Some(LineMatcher::Gcc));
        assert_eq!(out.diagnostics.len(), 2);
        assert_eq!(out.diagnostics[0].code.as_deref(), Some("-fpermissive"));
        assert_eq!(out.diagnostics[0].highlight, Some(ColumnRange::new(10, 13)));
        assert_eq!(out.diagnostics[1].column, 0);
    }

    #[test]
    fn test_column_less_header_after_clang_header() {
        let text = "a.c:3:5: error: first\na.c:9: warning: second\n";
        let out = parse_clang(text);
        assert_eq!(out.matcher, Some(LineMatcher::Clang));
        let messages: Vec<_> = out.diagnostics.iter().map(|d| d.message.as_str()).collect();
        assert_eq!(messages, vec!["first", "second"]);
        assert_eq!(out.diagnostics[1].line, 9);
        assert_eq!(out.diagnostics[1].column, 0);
        assert!(out.issues.is_empty());
    }

    #[test]
    fn test_wrapped_message_before_plain_echo() {
        let text = "\
a.cpp:12:3: error: no viable conversion
    from 'A' to 'B'
  b = a;
  ^
";
        let out = parse_clang(text);
        let diag = &out.diagnostics[0];
        assert_eq!(diag.message, "no viable conversion\nfrom 'A' to 'B'");
        assert_eq!(diag.highlight, Some(ColumnRange::new(3, 4)));
    }

    #[test]
    fn test_crlf_input() {
        let text = "a.c:1:2: error: x\r\n  foo;\r\n  ^\r\n";
        let out = parse_clang(text);
        assert_eq!(out.diagnostics[0].message, "x");
        assert_eq!(out.diagnostics[0].highlight, Some(ColumnRange::new(3, 4)));
    }
}
