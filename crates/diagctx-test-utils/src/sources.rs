//! Temporary source trees for locator and pipeline tests.

use std::path::{Path, PathBuf};

use tempfile::TempDir;

/// A directory of source files that is deleted when dropped.
///
/// ```ignore
/// let tree = SourceTree::new()
///     .file("src/a.cpp", "int main() {}\n")
///     .numbered("include/b.h", 40);
/// let root = tree.root();
/// ```
pub struct SourceTree {
    dir: TempDir,
}

impl SourceTree {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("failed to create temp dir"),
        }
    }

    /// Write a file at `relative`, creating parent directories.
    pub fn file(self, relative: impl AsRef<Path>, content: impl AsRef<[u8]>) -> Self {
        let path = self.dir.path().join(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("failed to create source dir");
        }
        std::fs::write(&path, content).expect("failed to write source file");
        self
    }

    /// Write a file of `lines` lines reading `// line N`.
    pub fn numbered(self, relative: impl AsRef<Path>, lines: u32) -> Self {
        self.file(relative, numbered_source(lines))
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    /// Absolute path of a file in the tree.
    pub fn path(&self, relative: impl AsRef<Path>) -> PathBuf {
        self.dir.path().join(relative)
    }
}

impl Default for SourceTree {
    fn default() -> Self {
        Self::new()
    }
}

/// Source text whose line N reads `// line N`.
pub fn numbered_source(lines: u32) -> String {
    (1..=lines).map(|i| format!("// line {i}\n")).collect()
}
