#![deny(unsafe_code)]

//! Golden-output regression harness.
//!
//! Fixtures are recorded compiler logs laid out as
//! `<root>/<os>/<compiler>/<name>.log`, each with a `<name>.golden.json`
//! beside it holding the expected serialized [`ExplanationContext`]. Source
//! files the logs refer to live under `<root>/sources/`, which is the only
//! search root; paths captured on other machines resolve by suffix.
//!
//! Fixtures run in parallel on the blocking pool, each with its own
//! [`SourceLocator`].

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use diagctx_config::{AppConfig, EngineConfig};
use diagctx_core::{CompilerFamily, Engine, ExplanationContext, SourceLocator};

/// Directory under the fixture root holding the referenced sources.
pub const SOURCES_DIR: &str = "sources";
const LOG_EXTENSION: &str = "log";
const GOLDEN_SUFFIX: &str = ".golden.json";

/// Harness errors. Fixture mismatches are outcomes, not errors.
#[derive(Debug, thiserror::Error)]
pub enum RegressError {
    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid JSON in {}: {source}", .path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("fixture task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> RegressError + '_ {
    move |source| RegressError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// One recorded compiler log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Fixture {
    pub name: String,
    pub os: String,
    /// Compiler directory name, e.g. `clang++-17`.
    pub compiler: String,
    pub log: PathBuf,
    pub golden: PathBuf,
}

impl Fixture {
    /// `os/compiler/name`.
    pub fn id(&self) -> String {
        format!("{}/{}/{}", self.os, self.compiler, self.name)
    }

    /// Compiler family implied by the fixture's directory.
    pub fn family(&self) -> CompilerFamily {
        CompilerFamily::from_compiler_name(&self.compiler)
    }
}

/// Find every fixture under `root`, sorted by id.
pub fn discover(root: &Path) -> Result<Vec<Fixture>, RegressError> {
    let mut fixtures = Vec::new();
    for os_dir in sorted_dirs(root)? {
        let Some(os) = file_name(&os_dir) else {
            continue;
        };
        if os == SOURCES_DIR {
            continue;
        }
        for compiler_dir in sorted_dirs(&os_dir)? {
            let Some(compiler) = file_name(&compiler_dir) else {
                continue;
            };
            let entries = std::fs::read_dir(&compiler_dir).map_err(io_error(&compiler_dir))?;
            for entry in entries {
                let log = entry.map_err(io_error(&compiler_dir))?.path();
                if !log.is_file() || log.extension().and_then(|e| e.to_str()) != Some(LOG_EXTENSION)
                {
                    continue;
                }
                let Some(name) = log.file_stem().and_then(|s| s.to_str()).map(str::to_string)
                else {
                    continue;
                };
                let golden = compiler_dir.join(format!("{name}{GOLDEN_SUFFIX}"));
                fixtures.push(Fixture {
                    name,
                    os: os.clone(),
                    compiler: compiler.clone(),
                    log,
                    golden,
                });
            }
        }
    }
    fixtures.sort_by_key(Fixture::id);
    debug!(root = %root.display(), count = fixtures.len(), "Discovered fixtures");
    Ok(fixtures)
}

fn sorted_dirs(dir: &Path) -> Result<Vec<PathBuf>, RegressError> {
    let mut dirs = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(io_error(dir))? {
        let path = entry.map_err(io_error(dir))?.path();
        if path.is_dir() {
            dirs.push(path);
        }
    }
    dirs.sort();
    Ok(dirs)
}

fn file_name(path: &Path) -> Option<String> {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
}

/// Whether to compare against golden files or rewrite them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    #[default]
    Check,
    Bless,
}

/// Result of running one fixture.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    Passed,
    Failed { first_difference: String },
    MissingGolden,
    Blessed,
}

impl Outcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, Outcome::Failed { .. } | Outcome::MissingGolden)
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Passed => write!(f, "ok"),
            Outcome::Failed { first_difference } => write!(f, "FAILED ({first_difference})"),
            Outcome::MissingGolden => write!(f, "MISSING GOLDEN"),
            Outcome::Blessed => write!(f, "blessed"),
        }
    }
}

/// Outcome of every fixture, in discovery order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Report {
    pub results: Vec<(Fixture, Outcome)>,
}

impl Report {
    pub fn passed(&self) -> usize {
        self.results
            .iter()
            .filter(|(_, o)| matches!(o, Outcome::Passed | Outcome::Blessed))
            .count()
    }

    pub fn failed(&self) -> usize {
        self.results.iter().filter(|(_, o)| o.is_failure()).count()
    }

    pub fn is_success(&self) -> bool {
        self.failed() == 0
    }
}

/// Runs fixtures through the extraction pipeline.
#[derive(Debug, Clone)]
pub struct Harness {
    root: PathBuf,
    engine: EngineConfig,
    workers: usize,
    mode: Mode,
}

impl Harness {
    pub fn new(root: impl Into<PathBuf>, engine: EngineConfig) -> Self {
        Self {
            root: root.into(),
            engine,
            workers: 1,
            mode: Mode::Check,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(&config.regression.fixtures_dir, config.engine.clone())
            .workers(config.regression.workers)
    }

    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn discover(&self) -> Result<Vec<Fixture>, RegressError> {
        discover(&self.root)
    }

    /// Produce the context for one fixture.
    pub fn explain(&self, fixture: &Fixture) -> Result<ExplanationContext, RegressError> {
        let bytes = std::fs::read(&fixture.log).map_err(io_error(&fixture.log))?;
        let raw = String::from_utf8_lossy(&bytes);

        let mut engine = Engine::new(&self.engine);
        if engine.family() == CompilerFamily::Auto {
            engine = engine.with_family(fixture.family());
        }
        let mut locator =
            SourceLocator::new(vec![self.root.join(SOURCES_DIR)]).match_path_suffix(true);
        Ok(engine.explain(&raw, &mut locator))
    }

    /// Run a single fixture synchronously.
    pub fn run_one(&self, fixture: &Fixture) -> Result<Outcome, RegressError> {
        let produced = serde_json::to_value(self.explain(fixture)?).map_err(|source| {
            RegressError::Json {
                path: fixture.log.clone(),
                source,
            }
        })?;

        if self.mode == Mode::Bless {
            let mut text = serde_json::to_string_pretty(&produced).map_err(|source| {
                RegressError::Json {
                    path: fixture.golden.clone(),
                    source,
                }
            })?;
            text.push('\n');
            std::fs::write(&fixture.golden, text).map_err(io_error(&fixture.golden))?;
            return Ok(Outcome::Blessed);
        }

        let golden_text = match std::fs::read_to_string(&fixture.golden) {
            Ok(text) => text,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Outcome::MissingGolden);
            }
            Err(err) => return Err(io_error(&fixture.golden)(err)),
        };
        let golden: Value =
            serde_json::from_str(&golden_text).map_err(|source| RegressError::Json {
                path: fixture.golden.clone(),
                source,
            })?;

        Ok(match first_difference(&golden, &produced, "") {
            None => Outcome::Passed,
            Some(first_difference) => Outcome::Failed { first_difference },
        })
    }

    /// Run fixtures on the blocking pool, at most `workers` at a time.
    pub async fn run(&self, fixtures: Vec<Fixture>) -> Result<Report, RegressError> {
        let semaphore = Arc::new(Semaphore::new(self.workers));
        let harness = Arc::new(self.clone());
        let mut tasks = JoinSet::new();

        for (idx, fixture) in fixtures.into_iter().enumerate() {
            let permit = Arc::clone(&semaphore)
                .acquire_owned()
                .await
                .map_err(|_| RegressError::Io {
                    path: harness.root.clone(),
                    source: std::io::Error::other("worker pool closed"),
                })?;
            let harness = Arc::clone(&harness);
            tasks.spawn_blocking(move || {
                let _permit = permit;
                let outcome = harness.run_one(&fixture);
                (idx, fixture, outcome)
            });
        }

        let mut results = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            let (idx, fixture, outcome) = joined?;
            let outcome = outcome?;
            if outcome.is_failure() {
                warn!(fixture = %fixture.id(), %outcome, "Fixture failed");
            } else {
                debug!(fixture = %fixture.id(), %outcome, "Fixture finished");
            }
            results.push((idx, fixture, outcome));
        }
        results.sort_by_key(|(idx, _, _)| *idx);

        let report = Report {
            results: results.into_iter().map(|(_, f, o)| (f, o)).collect(),
        };
        info!(
            passed = report.passed(),
            failed = report.failed(),
            mode = ?self.mode,
            "Regression run complete"
        );
        Ok(report)
    }
}

/// Discover and run every fixture under the configured directory.
pub async fn run(config: &AppConfig, mode: Mode) -> Result<Report, RegressError> {
    let harness = Harness::from_config(config).mode(mode);
    let fixtures = harness.discover()?;
    harness.run(fixtures).await
}

/// JSON-pointer-style location of the first difference, with both values.
fn first_difference(expected: &Value, actual: &Value, at: &str) -> Option<String> {
    match (expected, actual) {
        (Value::Object(e), Value::Object(a)) => {
            let mut keys: Vec<&String> = e.keys().chain(a.keys()).collect();
            keys.sort();
            keys.dedup();
            keys.into_iter().find_map(|key| {
                let path = format!("{at}/{key}");
                match (e.get(key), a.get(key)) {
                    (Some(ev), Some(av)) => first_difference(ev, av, &path),
                    (Some(_), None) => Some(format!("{path}: missing")),
                    (None, Some(av)) => Some(format!("{path}: unexpected {av}")),
                    (None, None) => None,
                }
            })
        }
        (Value::Array(e), Value::Array(a)) => {
            let common = e
                .iter()
                .zip(a)
                .enumerate()
                .find_map(|(i, (ev, av))| first_difference(ev, av, &format!("{at}/{i}")));
            common.or_else(|| {
                (e.len() != a.len()).then(|| {
                    format!("{at}: expected {} elements, got {}", e.len(), a.len())
                })
            })
        }
        _ if expected == actual => None,
        _ => Some(format!(
            "{}: expected {expected}, got {actual}",
            if at.is_empty() { "/" } else { at }
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use diagctx_test_utils::sources::SourceTree;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    const LOG: &str = "\
/Users/runner/work/proj/tests/c++/a.cpp:10:5: error: no matching function for call to 'g'
    g(nullptr);
    ^
/Users/runner/work/proj/tests/c++/a.cpp:5:6: note: candidate template ignored
1 error generated.
";

    fn corpus() -> SourceTree {
        SourceTree::new()
            .numbered("sources/proj/tests/c++/a.cpp", 20)
            .file("macos/clang++/a.log", LOG)
            .file("ubuntu/g++-13/b.log", "b.c:1:1: warning: empty\n")
            .file("ubuntu/g++-13/notes.txt", "ignored")
    }

    #[test]
    fn test_discover_sorted_and_skips_sources() {
        let tree = corpus();
        let fixtures = discover(tree.root()).unwrap();
        let ids: Vec<String> = fixtures.iter().map(Fixture::id).collect();
        assert_eq!(ids, vec!["macos/clang++/a", "ubuntu/g++-13/b"]);
        assert_eq!(fixtures[0].family(), CompilerFamily::Clang);
        assert_eq!(fixtures[1].family(), CompilerFamily::Gcc);
        assert_eq!(fixtures[0].golden, tree.path("macos/clang++/a.golden.json"));
    }

    #[test]
    fn test_missing_root_is_io_error() {
        let err = discover(Path::new("/nonexistent/fixtures")).unwrap_err();
        assert!(matches!(err, RegressError::Io { .. }));
    }

    #[test]
    fn test_suffix_resolution_against_sources_dir() {
        let tree = corpus();
        let fixtures = discover(tree.root()).unwrap();
        let harness = Harness::new(tree.root(), EngineConfig::default());
        let ctx = harness.explain(&fixtures[0]).unwrap();
        assert_eq!(ctx.snippets.len(), 1);
        assert_eq!((ctx.snippets[0].start_line, ctx.snippets[0].end_line), (2, 13));
    }

    #[test_log::test(tokio::test)]
    async fn test_missing_golden_then_bless_then_pass() {
        let tree = corpus();
        let fixtures = discover(tree.root()).unwrap();
        let harness = Harness::new(tree.root(), EngineConfig::default()).workers(2);

        let report = harness.run(fixtures.clone()).await.unwrap();
        assert_eq!(report.failed(), 2);
        assert!(report.results.iter().all(|(_, o)| *o == Outcome::MissingGolden));

        let blessed = harness
            .clone()
            .mode(Mode::Bless)
            .run(fixtures.clone())
            .await
            .unwrap();
        assert!(blessed.results.iter().all(|(_, o)| *o == Outcome::Blessed));
        assert!(fixtures[0].golden.is_file());

        let report = harness.run(fixtures.clone()).await.unwrap();
        assert!(report.is_success());
        assert_eq!(report.passed(), 2);
        let ids: Vec<String> = report.results.iter().map(|(f, _)| f.id()).collect();
        assert_eq!(ids, vec!["macos/clang++/a", "ubuntu/g++-13/b"]);
    }

    #[tokio::test]
    async fn test_changed_golden_reports_first_difference() {
        let tree = corpus();
        let fixtures = discover(tree.root()).unwrap();
        let harness = Harness::new(tree.root(), EngineConfig::default());
        harness.clone().mode(Mode::Bless).run(fixtures.clone()).await.unwrap();

        let golden = &fixtures[0].golden;
        let mut value: Value =
            serde_json::from_str(&std::fs::read_to_string(golden).unwrap()).unwrap();
        value["snippets"][0]["start_line"] = json!(1);
        std::fs::write(golden, value.to_string()).unwrap();

        let outcome = harness.run_one(&fixtures[0]).unwrap();
        assert_eq!(
            outcome,
            Outcome::Failed {
                first_difference: "/snippets/0/start_line: expected 1, got 2".to_string()
            }
        );
    }

    #[test]
    fn test_first_difference_shapes() {
        assert_eq!(first_difference(&json!({"a": 1}), &json!({"a": 1}), ""), None);
        assert_eq!(
            first_difference(&json!({"a": [1, 2]}), &json!({"a": [1]}), ""),
            Some("/a: expected 2 elements, got 1".to_string())
        );
        assert_eq!(
            first_difference(&json!({"a": 1}), &json!({}), ""),
            Some("/a: missing".to_string())
        );
        assert_eq!(
            first_difference(&json!(true), &json!(false), ""),
            Some("/: expected true, got false".to_string())
        );
    }

    #[test]
    fn test_outcome_display() {
        assert_eq!(Outcome::Passed.to_string(), "ok");
        assert_eq!(Outcome::MissingGolden.to_string(), "MISSING GOLDEN");
        assert!(Outcome::MissingGolden.is_failure());
        assert!(!Outcome::Blessed.is_failure());
    }
}
