#![deny(unsafe_code)]

//! diagctx core engine.
//!
//! Turns raw C/C++ compiler output into an [`ExplanationContext`]: the parsed
//! diagnostics plus the minimal, budget-bounded source excerpts needed to
//! understand them. The engine is synchronous and never installs a tracing
//! subscriber; binaries decide how events are reported.

/// Budget-bounded assembly of diagnostics and snippets.
pub mod compose;
/// Structured diagnostic records and their note chains.
pub mod diagnostic;
/// Source errors and recoverable issues.
pub mod error;
/// Line-oriented parser for clang, gcc, and MSVC output.
pub mod parser;
/// The end-to-end extraction pipeline.
pub mod pipeline;
/// Plain-text prompt rendering.
pub mod prompt;
/// Context windows around diagnostic positions.
pub mod snippet;
/// Source path resolution and file caching.
pub mod source;

pub use compose::{Composer, ExplanationContext};
pub use diagnostic::{ColumnRange, Diagnostic, Severity};
pub use error::{Issue, SourceError};
pub use parser::{CompilerFamily, LineMatcher, ParseOutput, parse};
pub use pipeline::{Engine, SourceStatus, explain};
pub use snippet::{Highlight, Snippet, SnippetExtractor};
pub use source::{FsReader, MemoryReader, SourceFile, SourceLocator, SourceReader};
