//! Error and issue types.
//!
//! The pipeline never fails on malformed input. Conditions it recovers from
//! are reported as [`Issue`] values on the resulting context so callers can
//! see what was degraded.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Failure to resolve or read a referenced source file.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SourceError {
    #[error(
        "source unavailable: {} not found in any search root ({tried} candidates tried)",
        .path.display()
    )]
    NotFound { path: PathBuf, tried: usize },

    #[error("source unavailable: failed to read {}: {reason}", .path.display())]
    Unreadable { path: PathBuf, reason: String },
}

impl SourceError {
    /// The path as referenced by the diagnostic.
    pub fn path(&self) -> &PathBuf {
        match self {
            SourceError::NotFound { path, .. } | SourceError::Unreadable { path, .. } => path,
        }
    }
}

/// A recoverable condition encountered while building a context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Issue {
    /// A line looked like a diagnostic header but failed validation; it was
    /// kept as message text instead.
    #[error("input line {input_line}: ambiguous diagnostic header ({reason})")]
    ParseAmbiguous { input_line: usize, reason: String },

    /// A note arrived before any error or warning it could belong to.
    #[error("input line {input_line}: note has no preceding error or warning")]
    OrphanNote { input_line: usize },

    /// A referenced file could not be resolved or read.
    #[error("{reason}")]
    SourceUnavailable { path: PathBuf, reason: String },

    /// A diagnostic points past the end of its (resolved) file.
    #[error("{}:{line}: line is beyond the end of the file ({len} lines)", .path.display())]
    LineOutOfRange { path: PathBuf, line: u32, len: usize },

    /// Diagnostic text alone does not fit in the budget.
    #[error("diagnostic text needs {required} characters, budget is {budget}")]
    BudgetExceededIrreducibly { required: usize, budget: usize },
}

impl From<&SourceError> for Issue {
    fn from(err: &SourceError) -> Self {
        Issue::SourceUnavailable {
            path: err.path().clone(),
            reason: err.to_string(),
        }
    }
}
