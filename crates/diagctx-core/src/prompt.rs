//! Plain-text rendering of an [`ExplanationContext`] for a language model.

use std::fmt::Write;

use crate::compose::ExplanationContext;
use crate::diagnostic::Diagnostic;
use crate::snippet::Snippet;

const CODE_HEADING: &str = "This is my code:";
const ERROR_HEADING: &str = "This is my error:";
const QUESTION: &str = "What's the problem?";

/// Render the context as a question about the code and the error.
///
/// Each file's snippets become one fenced block with line numbers; `...`
/// separates non-contiguous snippets. Diagnostics are re-emitted in clang
/// form, each followed by its source line and caret when a snippet covers it.
pub fn render(context: &ExplanationContext) -> String {
    let mut out = String::new();

    if !context.snippets.is_empty() {
        out.push_str(CODE_HEADING);
        out.push_str("\n\n");
        for file in context.files() {
            let snippets: Vec<&Snippet> = context
                .snippets
                .iter()
                .filter(|s| s.file.as_path() == file)
                .collect();
            let _ = writeln!(out, "File `{}`:", file.display());
            out.push_str("```\n");
            render_file(&mut out, &snippets);
            out.push_str("```\n\n");
        }
        out.push('\n');
    }

    out.push_str(ERROR_HEADING);
    out.push_str("\n```\n");
    for (idx, diagnostic) in context.diagnostics.iter().enumerate() {
        for (position, record) in diagnostic.chain().enumerate() {
            out.push_str(&record.header());
            out.push('\n');
            render_caret(&mut out, context, (idx, position), record);
        }
    }
    out.push_str("```\n\n\n");
    out.push_str(QUESTION);
    out.push('\n');
    out
}

fn render_file(out: &mut String, snippets: &[&Snippet]) {
    let width = snippets
        .iter()
        .map(|s| s.end_line.to_string().len())
        .max()
        .unwrap_or(1);
    let mut previous_end: Option<u32> = None;
    for snippet in snippets {
        if let Some(end) = previous_end
            && snippet.start_line > end + 1
        {
            out.push_str("...\n");
        }
        for (offset, text) in snippet.lines.iter().enumerate() {
            let number = snippet.start_line as usize + offset;
            let _ = writeln!(out, "{number:>width$} {text}");
        }
        previous_end = Some(snippet.end_line);
    }
}

/// Echo the source line under a record's header, with a caret underline.
///
/// The line comes from the snippet holding the record's own highlight, so a
/// record that spells its path differently from the snippet still finds it.
fn render_caret(
    out: &mut String,
    context: &ExplanationContext,
    key: (usize, usize),
    record: &Diagnostic,
) {
    if !record.has_location() {
        return;
    }
    let own = context
        .snippets
        .iter()
        .filter(|s| s.highlights.iter().any(|h| h.key() == key))
        .find_map(|s| s.text(record.line));
    let Some(text) = own.or_else(|| {
        context
            .snippets
            .iter()
            .filter(|s| s.file == record.file)
            .find_map(|s| s.text(record.line))
    }) else {
        return;
    };
    let Some(underline) = underline(record) else {
        return;
    };
    let _ = writeln!(out, "{text}");
    let _ = writeln!(out, "{underline}");
}

/// `^` at the reported column, `~` across the rest of the caret span.
fn underline(record: &Diagnostic) -> Option<String> {
    let (start, end) = match record.highlight {
        Some(range) if range.width() > 0 => (range.start, range.end),
        _ if record.column > 0 => (record.column, record.column + 1),
        _ => return None,
    };
    let caret = if (start..end).contains(&record.column) {
        record.column
    } else {
        start
    };
    let mut line = " ".repeat(start.saturating_sub(1) as usize);
    for col in start..end {
        line.push(if col == caret { '^' } else { '~' });
    }
    Some(line)
}
