//! Source locator. Resolves diagnostic paths to file contents, with caching.
//!
//! Resolution order for a referenced path:
//!
//! 1. the path as given, when absolute;
//! 2. the path joined onto each search root, in order;
//! 3. optionally, trailing components of an absolute path under each root
//!    (output captured on another machine).
//!
//! The first candidate that reads successfully wins. A candidate that exists
//! but cannot be read is skipped; it is reported only when no later candidate
//! resolves. Results, including
//! failures, are cached for the lifetime of one [`SourceLocator`], which is
//! scoped to a single extraction request.

use std::collections::HashMap;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, warn};

use diagctx_config::SourcesConfig;

use crate::error::SourceError;

/// File-access capability used by the locator.
pub trait SourceReader: Send + Sync {
    /// Read a whole file. Implementations must not hold the file open after
    /// returning, on success or failure.
    fn read(&self, path: &Path) -> io::Result<Vec<u8>>;
}

/// Reads from the local filesystem in one scoped call.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsReader;

impl SourceReader for FsReader {
    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        std::fs::read(path)
    }
}

/// In-memory file set, keyed by absolute path.
#[derive(Debug, Clone, Default)]
pub struct MemoryReader {
    files: HashMap<PathBuf, Vec<u8>>,
}

impl MemoryReader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a file; `path` should be absolute to be found through a root.
    pub fn with_file(mut self, path: impl Into<PathBuf>, content: impl Into<Vec<u8>>) -> Self {
        self.files.insert(path.into(), content.into());
        self
    }
}

impl SourceReader for MemoryReader {
    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        self.files
            .get(path)
            .cloned()
            .ok_or_else(|| io::Error::from(io::ErrorKind::NotFound))
    }
}

/// A loaded source file. Never mutated after load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    /// Absolute path the content was read from.
    pub path: PathBuf,
    lines: Vec<String>,
}

impl SourceFile {
    /// Build from raw bytes; invalid UTF-8 is replaced rather than rejected.
    pub fn from_bytes(path: impl Into<PathBuf>, bytes: &[u8]) -> Self {
        let text = String::from_utf8_lossy(bytes);
        Self {
            path: path.into(),
            lines: text.lines().map(str::to_string).collect(),
        }
    }

    pub fn line_count(&self) -> usize {
        self.lines.len()
    }

    /// A 1-based line.
    pub fn line(&self, number: u32) -> Option<&str> {
        let idx = (number as usize).checked_sub(1)?;
        self.lines.get(idx).map(String::as_str)
    }

    /// Lines `start..=end` (1-based, inclusive), clamped to the file.
    pub fn lines(&self, start: u32, end: u32) -> &[String] {
        let from = (start.max(1) as usize - 1).min(self.lines.len());
        let to = (end as usize).min(self.lines.len()).max(from);
        &self.lines[from..to]
    }
}

/// Resolves and caches source files for one request.
pub struct SourceLocator {
    roots: Vec<PathBuf>,
    match_suffix: bool,
    reader: Box<dyn SourceReader>,
    /// Loaded files keyed by resolved absolute path.
    files: HashMap<PathBuf, Arc<SourceFile>>,
    /// Referenced path to resolution outcome.
    resolved: HashMap<PathBuf, Result<PathBuf, SourceError>>,
}

impl SourceLocator {
    /// A locator over the local filesystem.
    pub fn new(roots: Vec<PathBuf>) -> Self {
        Self::with_reader(roots, FsReader)
    }

    pub fn with_reader(roots: Vec<PathBuf>, reader: impl SourceReader + 'static) -> Self {
        let roots = roots.iter().map(|root| absolutize(root)).collect();
        Self {
            roots,
            match_suffix: false,
            reader: Box::new(reader),
            files: HashMap::new(),
            resolved: HashMap::new(),
        }
    }

    /// A filesystem locator over the configured search roots.
    pub fn from_config(config: &SourcesConfig) -> Self {
        Self::new(config.search_roots.clone()).match_path_suffix(config.match_path_suffix)
    }

    /// Enable trailing-component matching for unresolved absolute paths.
    pub fn match_path_suffix(mut self, enabled: bool) -> Self {
        self.match_suffix = enabled;
        self
    }

    /// Number of distinct files read so far.
    pub fn loaded_count(&self) -> usize {
        self.files.len()
    }

    /// Resolve a referenced path and return its content.
    pub fn load(&mut self, referenced: &Path) -> Result<Arc<SourceFile>, SourceError> {
        if let Some(outcome) = self.resolved.get(referenced) {
            debug!(path = %referenced.display(), "Source cache hit");
            return match outcome {
                Ok(abs) => self
                    .files
                    .get(abs)
                    .cloned()
                    .ok_or_else(|| SourceError::NotFound {
                        path: referenced.to_path_buf(),
                        tried: 0,
                    }),
                Err(err) => Err(err.clone()),
            };
        }

        let outcome = self.resolve(referenced);
        match &outcome {
            Ok(file) => {
                self.resolved
                    .insert(referenced.to_path_buf(), Ok(file.path.clone()));
            }
            Err(err) => {
                warn!(path = %referenced.display(), error = %err, "Source unavailable");
                self.resolved
                    .insert(referenced.to_path_buf(), Err(err.clone()));
            }
        }
        outcome
    }

    fn resolve(&mut self, referenced: &Path) -> Result<Arc<SourceFile>, SourceError> {
        let candidates = self.candidates(referenced);
        let tried = candidates.len();
        let mut unreadable: Option<SourceError> = None;

        for candidate in candidates {
            if let Some(file) = self.files.get(&candidate) {
                return Ok(Arc::clone(file));
            }
            match self.reader.read(&candidate) {
                Ok(bytes) => {
                    debug!(
                        path = %referenced.display(),
                        resolved = %candidate.display(),
                        "Loaded source file"
                    );
                    let file = Arc::new(SourceFile::from_bytes(candidate.clone(), &bytes));
                    self.files.insert(candidate, Arc::clone(&file));
                    return Ok(file);
                }
                Err(err) if err.kind() == io::ErrorKind::NotFound => continue,
                Err(err) if err.kind() == io::ErrorKind::IsADirectory => continue,
                Err(err) => {
                    debug!(
                        path = %referenced.display(),
                        candidate = %candidate.display(),
                        error = %err,
                        "Skipping unreadable candidate"
                    );
                    if unreadable.is_none() {
                        unreadable = Some(SourceError::Unreadable {
                            path: referenced.to_path_buf(),
                            reason: err.to_string(),
                        });
                    }
                }
            }
        }

        Err(unreadable.unwrap_or(SourceError::NotFound {
            path: referenced.to_path_buf(),
            tried,
        }))
    }

    /// Candidate absolute paths, in resolution order, without duplicates.
    fn candidates(&self, referenced: &Path) -> Vec<PathBuf> {
        let mut out: Vec<PathBuf> = Vec::new();
        let mut push = |path: PathBuf| {
            let path = normalize(&path);
            if !out.contains(&path) {
                out.push(path);
            }
        };

        if referenced.is_absolute() {
            push(referenced.to_path_buf());
        } else {
            for root in &self.roots {
                push(root.join(referenced));
            }
        }

        if self.match_suffix && referenced.is_absolute() {
            let parts: Vec<&std::ffi::OsStr> = referenced
                .components()
                .filter_map(|c| match c {
                    Component::Normal(part) => Some(part),
                    _ => None,
                })
                .collect();
            // Longest suffix first so the most specific match wins.
            for skip in 1..parts.len() {
                let suffix: PathBuf = parts[skip..].iter().collect();
                for root in &self.roots {
                    push(root.join(&suffix));
                }
            }
        }
        out
    }
}

fn absolutize(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}

/// Lexically fold `.` and `..` components.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push(component);
                }
            }
            other => out.push(other),
        }
    }
    out
}
