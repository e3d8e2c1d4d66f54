//! Tracing initialisation helpers for tests.
//!
//! Call [`init_test_tracing`] at the top of any test that emits tracing events
//! and wants them captured by the test harness. Initialisation happens at most
//! once per process.

use tracing_subscriber::EnvFilter;

/// Initialise a subscriber on the test-harness writer, honouring `RUST_LOG`.
///
/// Subsequent calls are silently ignored.
///
/// ```ignore
/// #[test]
/// fn explains_missing_header() {
///     diagctx_test_utils::tracing_setup::init_test_tracing();
///     tracing::debug!("visible when RUST_LOG=debug");
/// }
/// ```
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_test_writer()
        .try_init();
}
