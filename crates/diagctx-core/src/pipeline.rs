//! End-to-end extraction: raw compiler output in, [`ExplanationContext`] out.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use diagctx_config::{EngineConfig, SourcesConfig};

use crate::compose::{Composer, ExplanationContext};
use crate::diagnostic::Diagnostic;
use crate::error::Issue;
use crate::parser::{self, CompilerFamily};
use crate::snippet::{Highlight, SnippetExtractor};
use crate::source::{SourceFile, SourceLocator};

/// Resolution status of one referenced source path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceStatus {
    pub referenced: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Parser, extractor, and composer configured together.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Engine {
    family: CompilerFamily,
    extractor: SnippetExtractor,
    composer: Composer,
}

impl Engine {
    pub fn new(config: &EngineConfig) -> Self {
        let family = config.compiler.parse().unwrap_or_else(|err: String| {
            warn!(error = %err, "Falling back to compiler auto-detection");
            CompilerFamily::Auto
        });
        Self {
            family,
            extractor: SnippetExtractor::from_config(config),
            composer: Composer::from_config(config),
        }
    }

    /// Pin the compiler family instead of the configured one.
    pub fn with_family(mut self, family: CompilerFamily) -> Self {
        self.family = family;
        self
    }

    pub fn family(&self) -> CompilerFamily {
        self.family
    }

    /// Parse, locate, extract, merge, and compose.
    ///
    /// Never fails. Unresolvable files and malformed input show up in
    /// [`ExplanationContext::issues`].
    pub fn explain(&self, raw: &str, locator: &mut SourceLocator) -> ExplanationContext {
        let parsed = parser::parse(raw, self.family);
        let mut issues = parsed.issues;

        let mut files: Vec<(Arc<SourceFile>, PathBuf, Vec<Highlight>)> = Vec::new();
        for (referenced, highlights) in highlights_by_path(&parsed.diagnostics) {
            match locator.load(&referenced) {
                // Two spellings of one file share a snippet set.
                Ok(file) => match files.iter_mut().find(|(f, _, _)| f.path == file.path) {
                    Some(entry) => entry.2.extend(highlights),
                    None => files.push((file, referenced, highlights)),
                },
                Err(err) => issues.push(Issue::from(&err)),
            }
        }

        let mut snippets = Vec::new();
        for (file, referenced, highlights) in files {
            let (extracted, out_of_range) =
                self.extractor.extract_all(&file, &referenced, highlights);
            snippets.extend(extracted);
            issues.extend(out_of_range);
        }

        let context = self.composer.compose(parsed.diagnostics, snippets, issues);
        info!(
            diagnostics = context.diagnostics.len(),
            snippets = context.snippets.len(),
            budget_used = context.budget_used,
            max_budget = context.max_budget,
            truncated = context.truncated,
            issues = context.issues.len(),
            "Built explanation context"
        );
        context
    }

    /// Every path the diagnostics reference, with its resolution outcome.
    pub fn sources(&self, raw: &str, locator: &mut SourceLocator) -> Vec<SourceStatus> {
        let parsed = parser::parse(raw, self.family);
        highlights_by_path(&parsed.diagnostics)
            .into_iter()
            .map(|(referenced, _)| match locator.load(&referenced) {
                Ok(file) => SourceStatus {
                    referenced,
                    resolved: Some(file.path.clone()),
                    error: None,
                },
                Err(err) => SourceStatus {
                    referenced,
                    resolved: None,
                    error: Some(err.to_string()),
                },
            })
            .collect()
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(&EngineConfig::default())
    }
}

/// Run the pipeline against the local filesystem.
pub fn explain(raw: &str, engine: &EngineConfig, sources: &SourcesConfig) -> ExplanationContext {
    let mut locator = SourceLocator::from_config(sources);
    Engine::new(engine).explain(raw, &mut locator)
}

/// Highlights grouped by referenced path, paths in first-reference order.
fn highlights_by_path(diagnostics: &[Diagnostic]) -> Vec<(PathBuf, Vec<Highlight>)> {
    let mut groups: Vec<(PathBuf, Vec<Highlight>)> = Vec::new();
    for (diagnostic, top) in diagnostics.iter().enumerate() {
        for (record, rec) in top.chain().enumerate() {
            if !rec.has_location() {
                continue;
            }
            let highlight = Highlight {
                diagnostic,
                record,
                severity: rec.severity,
                line: rec.line,
                columns: rec.highlight,
                radius: 0,
            };
            match groups.iter_mut().find(|(p, _)| p.as_path() == Path::new(&rec.file)) {
                Some((_, list)) => list.push(highlight),
                None => groups.push((rec.file.clone(), vec![highlight])),
            }
        }
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostic::{ColumnRange, Severity};
    use crate::source::MemoryReader;
    use pretty_assertions::assert_eq;

    fn locator(files: &[(&str, &str)]) -> SourceLocator {
        let reader = files
            .iter()
            .fold(MemoryReader::new(), |r, (path, text)| r.with_file(*path, *text));
        SourceLocator::with_reader(vec![PathBuf::from("/src")], reader)
    }

    fn numbered(lines: u32) -> String {
        (1..=lines).map(|i| format!("// line {i}\n")).collect()
    }

    #[test_log::test]
    fn test_single_error_with_note_in_same_file() {
        let raw = "\
a.cpp:10:5: error: no matching function for call to 'g'
    g(nullptr);
    ^
a.cpp:5:6: note: candidate template ignored
";
        let source = numbered(20);
        let mut locator = locator(&[("/src/a.cpp", source.as_str())]);
        let ctx = Engine::default().explain(raw, &mut locator);

        assert_eq!(ctx.diagnostics.len(), 1);
        assert_eq!(ctx.diagnostics[0].highlight, Some(ColumnRange::new(5, 6)));
        // [7,13] and [2,8] overlap.
        assert_eq!(ctx.snippets.len(), 1);
        assert_eq!((ctx.snippets[0].start_line, ctx.snippets[0].end_line), (2, 13));
        assert!(!ctx.truncated);
        assert!(ctx.issues.is_empty());
        assert_eq!(ctx.budget_used, ctx.cost());
    }

    #[test_log::test]
    fn test_missing_file_is_reported_not_fatal() {
        let raw = "\
a.cpp:3:1: error: first
missing.h:4:1: note: declared here
";
        let source = numbered(10);
        let mut locator = locator(&[("/src/a.cpp", source.as_str())]);
        let ctx = Engine::default().explain(raw, &mut locator);

        assert_eq!(ctx.diagnostics[0].notes.len(), 1);
        assert_eq!(ctx.files(), vec![Path::new("a.cpp")]);
        assert!(matches!(
            &ctx.issues[..],
            [Issue::SourceUnavailable { path, .. }] if path == Path::new("missing.h")
        ));
    }

    #[test]
    fn test_two_spellings_of_one_file_merge() {
        let raw = "\
a.cpp:3:1: error: first
/src/a.cpp:5:1: note: here
";
        let source = numbered(10);
        let mut locator = locator(&[("/src/a.cpp", source.as_str())]);
        let ctx = Engine::default().explain(raw, &mut locator);
        assert_eq!(ctx.snippets.len(), 1);
        assert_eq!(ctx.snippets[0].highlights.len(), 2);
        assert_eq!(ctx.snippets[0].file, PathBuf::from("a.cpp"));
    }

    #[test]
    fn test_line_past_end_of_file() {
        let raw = "a.cpp:99:1: error: stale line\n";
        let mut locator = locator(&[("/src/a.cpp", "one\ntwo\n")]);
        let ctx = Engine::default().explain(raw, &mut locator);
        assert!(ctx.snippets.is_empty());
        assert_eq!(
            ctx.issues,
            vec![Issue::LineOutOfRange {
                path: PathBuf::from("a.cpp"),
                line: 99,
                len: 2
            }]
        );
    }

    #[test]
    fn test_empty_and_garbage_input() {
        let mut locator = locator(&[]);
        for raw in ["", "make: *** [all] Error 2\n"] {
            let ctx = Engine::default().explain(raw, &mut locator);
            assert!(ctx.is_empty());
            assert!(ctx.snippets.is_empty());
            assert!(!ctx.truncated);
            assert_eq!(ctx.budget_used, 0);
        }
    }

    #[test]
    fn test_tiny_budget_keeps_diagnostic_text() {
        let raw = "a.cpp:3:1: error: first\n";
        let source = numbered(10);
        let mut locator = locator(&[("/src/a.cpp", source.as_str())]);
        let config = EngineConfig {
            max_budget: 4,
            ..EngineConfig::default()
        };
        let ctx = Engine::new(&config).explain(raw, &mut locator);
        assert_eq!(ctx.diagnostics.len(), 1);
        assert_eq!(ctx.diagnostics[0].message, "first");
        assert!(ctx.truncated);
        assert!(ctx.budget_used > 4);
        assert!(matches!(
            ctx.issues.last(),
            Some(Issue::BudgetExceededIrreducibly { budget: 4, .. })
        ));
    }

    #[test]
    fn test_compiler_hint_pins_matcher() {
        let raw = "a.c:9: warning: no column here\n";
        let mut locator = locator(&[]);
        let clang = Engine::default()
            .with_family(CompilerFamily::Clang)
            .explain(raw, &mut locator);
        assert!(clang.is_empty());
        let gcc = Engine::default()
            .with_family(CompilerFamily::Gcc)
            .explain(raw, &mut locator);
        assert_eq!(gcc.diagnostics.len(), 1);
        assert_eq!(gcc.diagnostics[0].severity, Severity::Warning);
    }

    #[test]
    fn test_unknown_compiler_falls_back_to_auto() {
        let config = EngineConfig {
            compiler: "icc".to_string(),
            ..EngineConfig::default()
        };
        assert_eq!(Engine::new(&config).family(), CompilerFamily::Auto);
    }

    #[test]
    fn test_sources_lists_each_path_once() {
        let raw = "\
a.cpp:3:1: error: first
b.h:4:1: note: declared here
a.cpp:8:1: warning: second
";
        let mut locator = locator(&[("/src/a.cpp", "x\n")]);
        let statuses = Engine::default().sources(raw, &mut locator);
        assert_eq!(statuses.len(), 2);
        assert_eq!(statuses[0].referenced, PathBuf::from("a.cpp"));
        assert_eq!(statuses[0].resolved, Some(PathBuf::from("/src/a.cpp")));
        assert_eq!(statuses[1].resolved, None);
        assert!(statuses[1].error.is_some());
    }
}
