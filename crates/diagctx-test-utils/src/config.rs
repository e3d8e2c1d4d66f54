//! Configuration builders for tests.
//!
//! Use [`TestConfigBuilder`] to create customised [`AppConfig`] values without
//! repeating boilerplate across crate boundaries, and [`TestConfigFile`] when
//! the code under test loads its config from disk.

use std::path::{Path, PathBuf};

use diagctx_config::AppConfig;
use tempfile::TempDir;

/// Fluent builder for [`AppConfig`] in tests.
///
/// ```ignore
/// let config = TestConfigBuilder::new()
///     .max_budget(512)
///     .context_radius(1)
///     .search_root(tree.root())
///     .build();
/// ```
pub struct TestConfigBuilder {
    config: AppConfig,
}

impl TestConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: AppConfig::default(),
        }
    }

    pub fn max_budget(mut self, budget: usize) -> Self {
        self.config.engine.max_budget = budget;
        self
    }

    pub fn context_radius(mut self, radius: u32) -> Self {
        self.config.engine.context_radius = radius;
        self
    }

    pub fn merge_gap_threshold(mut self, gap: u32) -> Self {
        self.config.engine.merge_gap_threshold = gap;
        self
    }

    pub fn compiler(mut self, compiler: &str) -> Self {
        self.config.engine.compiler = compiler.to_string();
        self
    }

    /// Replace the default search roots with `root` on first call, then append.
    pub fn search_root(mut self, root: impl AsRef<Path>) -> Self {
        let root = root.as_ref().to_path_buf();
        if self.config.sources.search_roots == AppConfig::default().sources.search_roots {
            self.config.sources.search_roots.clear();
        }
        self.config.sources.search_roots.push(root);
        self
    }

    pub fn match_path_suffix(mut self, enabled: bool) -> Self {
        self.config.sources.match_path_suffix = enabled;
        self
    }

    pub fn log_level(mut self, level: &str) -> Self {
        self.config.logging.level = level.to_string();
        self
    }

    pub fn fixtures_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.config.regression.fixtures_dir = dir.as_ref().to_path_buf();
        self
    }

    pub fn workers(mut self, workers: usize) -> Self {
        self.config.regression.workers = workers;
        self
    }

    pub fn build(self) -> AppConfig {
        self.config
    }
}

impl Default for TestConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A config file in a temp directory, deleted on drop.
pub struct TestConfigFile {
    pub config: AppConfig,
    pub path: PathBuf,
    _temp_dir: TempDir,
}

impl TestConfigFile {
    /// Write `toml_content` to a temp `diagctx.toml` and load it back.
    pub async fn with_toml(toml_content: &str) -> Self {
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        let path = temp_dir.path().join("diagctx.toml");
        tokio::fs::write(&path, toml_content)
            .await
            .expect("failed to write test config");

        let config = AppConfig::load(&path)
            .await
            .expect("failed to parse test config");

        Self {
            config,
            path,
            _temp_dir: temp_dir,
        }
    }
}
