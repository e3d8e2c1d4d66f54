//! Fuzz target for the diagnostic parser and the full extraction pipeline.
//!
//! Run with: cargo +nightly fuzz run fuzz_diagnostic_parser
//!
//! The first byte picks a budget; the rest is compiler output. Every line of
//! the input is also served as the content of `a.cpp` so that located
//! diagnostics produce snippets.

#![no_main]

use diagctx_config::EngineConfig;
use diagctx_core::{CompilerFamily, Engine, MemoryReader, SourceLocator, parse};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Some((&budget_byte, rest)) = data.split_first() else {
        return;
    };
    let text = String::from_utf8_lossy(rest);

    for family in [
        CompilerFamily::Auto,
        CompilerFamily::Clang,
        CompilerFamily::Gcc,
        CompilerFamily::Msvc,
    ] {
        let _ = parse(&text, family);
    }

    let config = EngineConfig {
        max_budget: budget_byte as usize * 16,
        ..EngineConfig::default()
    };
    let reader = MemoryReader::new().with_file("/src/a.cpp", rest.to_vec());
    let mut locator = SourceLocator::with_reader(vec!["/src".into()], reader);
    let context = Engine::new(&config).explain(&text, &mut locator);

    assert_eq!(context.budget_used, context.cost());
    if context.budget_used > context.max_budget {
        assert!(context.truncated);
        assert!(context.snippets.is_empty());
    }
});
