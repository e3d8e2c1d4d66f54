//! Snippet extraction: context windows around diagnostic positions.
//!
//! Each located diagnostic record yields a [`Highlight`]; the extractor turns
//! highlights into line windows of `context_radius` lines either side,
//! clamped to the file, then merges windows in the same file that overlap or
//! sit within `merge_gap_threshold` lines of each other. A merged snippet
//! keeps every highlight it absorbed.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use diagctx_config::EngineConfig;

use crate::diagnostic::{ColumnRange, Severity};
use crate::error::Issue;
use crate::source::SourceFile;

/// A highlighted position inside a snippet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Highlight {
    /// Index of the top-level diagnostic this supports.
    pub diagnostic: usize,
    /// Position in that diagnostic's chain: 0 for the diagnostic, k for note k.
    pub record: usize,
    pub severity: Severity,
    pub line: u32,
    /// Column span copied verbatim from the compiler's caret line.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub columns: Option<ColumnRange>,
    /// Context radius currently applied around `line`.
    pub radius: u32,
}

impl Highlight {
    /// Identity of the record this highlight came from.
    pub fn key(&self) -> (usize, usize) {
        (self.diagnostic, self.record)
    }
}

/// A contiguous excerpt of one source file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snippet {
    /// Path as first referenced by a diagnostic.
    pub file: PathBuf,
    /// Resolved location on this machine; not part of the serialized form.
    #[serde(skip)]
    pub resolved: PathBuf,
    pub start_line: u32,
    /// Inclusive.
    pub end_line: u32,
    /// Highlighted positions, ordered by line.
    pub highlights: Vec<Highlight>,
    /// Source text of `start_line..=end_line`.
    pub lines: Vec<String>,
}

impl Snippet {
    /// The first highlighted line.
    pub fn highlight_line(&self) -> Option<u32> {
        self.highlights.first().map(|h| h.line)
    }

    pub fn line_count(&self) -> usize {
        self.lines.len()
    }

    /// Text of a 1-based line, if inside the snippet.
    pub fn text(&self, line: u32) -> Option<&str> {
        let idx = line.checked_sub(self.start_line)? as usize;
        self.lines.get(idx).map(String::as_str)
    }

    /// Budget cost in characters: each line plus its newline.
    pub fn cost(&self) -> usize {
        self.lines.iter().map(|l| l.chars().count() + 1).sum()
    }

    /// Identity of the underlying file: the resolved path, or the referenced
    /// one when the snippet was deserialized without it.
    pub fn source_key(&self) -> &Path {
        if self.resolved.as_os_str().is_empty() {
            &self.file
        } else {
            &self.resolved
        }
    }

    /// Whether every highlight belongs to a note.
    pub fn is_note_only(&self) -> bool {
        self.highlights.iter().all(|h| h.severity == Severity::Note)
    }

    /// Whether any highlight supports the given top-level diagnostic.
    pub fn supports(&self, diagnostic: usize) -> bool {
        self.highlights.iter().any(|h| h.diagnostic == diagnostic)
    }
}

/// Window of `radius` lines either side of `line`, clamped to `[lo, hi]`.
///
/// `None` when the line itself lies outside the bounds.
pub fn window(line: u32, radius: u32, lo: u32, hi: u32) -> Option<(u32, u32)> {
    if line == 0 || line < lo || line > hi {
        return None;
    }
    let start = line.saturating_sub(radius).max(lo).max(1);
    let end = line.saturating_add(radius).min(hi);
    Some((start, end))
}

/// Merge windows that overlap or whose gap is at most `gap` lines.
///
/// Input order does not matter; output is sorted by start line and each
/// group's highlights are sorted by line.
pub(crate) fn merge_windows(
    mut windows: Vec<(u32, u32, Highlight)>,
    gap: u32,
) -> Vec<(u32, u32, Vec<Highlight>)> {
    windows.sort_by_key(|(start, end, h)| (*start, *end, h.line, h.key()));

    let mut merged: Vec<(u32, u32, Vec<Highlight>)> = Vec::new();
    for (start, end, highlight) in windows {
        if let Some(last) = merged.last_mut()
            && start <= last.1.saturating_add(gap).saturating_add(1)
        {
            last.1 = last.1.max(end);
            last.2.push(highlight);
            continue;
        }
        merged.push((start, end, vec![highlight]));
    }
    for group in &mut merged {
        group.2.sort_by_key(|h| (h.line, h.key()));
    }
    merged
}

/// Computes and merges snippets for one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnippetExtractor {
    radius: u32,
    merge_gap: u32,
}

impl SnippetExtractor {
    pub fn new(radius: u32, merge_gap: u32) -> Self {
        Self { radius, merge_gap }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.context_radius, config.merge_gap_threshold)
    }

    /// The snippet for a single highlight, at the configured radius.
    pub fn extract(
        &self,
        file: &SourceFile,
        referenced: &Path,
        mut highlight: Highlight,
    ) -> Option<Snippet> {
        highlight.radius = self.radius;
        let (start, end) = window(highlight.line, self.radius, 1, file.line_count() as u32)?;
        Some(Snippet {
            file: referenced.to_path_buf(),
            resolved: file.path.clone(),
            start_line: start,
            end_line: end,
            highlights: vec![highlight],
            lines: file.lines(start, end).to_vec(),
        })
    }

    /// Merge snippets of one file, re-reading gap lines from the source.
    pub fn merge(&self, file: &SourceFile, snippets: Vec<Snippet>) -> Vec<Snippet> {
        let Some(referenced) = snippets.first().map(|s| s.file.clone()) else {
            return Vec::new();
        };
        let windows = snippets
            .into_iter()
            .flat_map(|s| {
                let (start, end) = (s.start_line, s.end_line);
                s.highlights.into_iter().map(move |h| (start, end, h))
            })
            .collect();
        merge_windows(windows, self.merge_gap)
            .into_iter()
            .map(|(start, end, highlights)| Snippet {
                file: referenced.clone(),
                resolved: file.path.clone(),
                start_line: start,
                end_line: end,
                highlights,
                lines: file.lines(start, end).to_vec(),
            })
            .collect()
    }

    /// Extract and merge all highlights that point into `file`.
    ///
    /// Highlights past the end of the file are reported, not extracted.
    pub fn extract_all(
        &self,
        file: &SourceFile,
        referenced: &Path,
        highlights: Vec<Highlight>,
    ) -> (Vec<Snippet>, Vec<Issue>) {
        let mut issues = Vec::new();
        let mut snippets = Vec::new();
        for highlight in highlights {
            let line = highlight.line;
            match self.extract(file, referenced, highlight) {
                Some(snippet) => snippets.push(snippet),
                None => {
                    let issue = Issue::LineOutOfRange {
                        path: referenced.to_path_buf(),
                        line,
                        len: file.line_count(),
                    };
                    if !issues.contains(&issue) {
                        issues.push(issue);
                    }
                }
            }
        }
        (self.merge(file, snippets), issues)
    }
}

impl Default for SnippetExtractor {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default())
    }
}
