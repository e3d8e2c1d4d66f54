//! Runs the checked-in fixture corpus against its golden files.

use std::path::PathBuf;

use diagctx_config::EngineConfig;
use diagctx_regress::{Harness, Outcome, discover};
use pretty_assertions::assert_eq;

fn corpus_root() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../tests/regression")
}

#[test_log::test(tokio::test)]
async fn test_checked_in_corpus_matches_golden() {
    let harness = Harness::new(corpus_root(), EngineConfig::default()).workers(2);
    let fixtures = harness.discover().unwrap();
    assert!(!fixtures.is_empty(), "no fixtures under {}", corpus_root().display());

    let report = harness.run(fixtures).await.unwrap();
    for (fixture, outcome) in &report.results {
        assert_eq!(outcome, &Outcome::Passed, "{}", fixture.id());
    }
}

#[test]
fn test_corpus_layout() {
    let ids: Vec<String> = discover(&corpus_root())
        .unwrap()
        .iter()
        .map(|f| f.id())
        .collect();
    assert_eq!(
        ids,
        vec![
            "macos/clang++/sfinae-ambiguous",
            "ubuntu/clang++-17/overload-resolution-failure-bind-const-ref-to-non-const-ref",
        ]
    );
}
