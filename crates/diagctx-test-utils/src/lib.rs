#![deny(unsafe_code)]

//! Shared test utilities for the diagctx workspace.
//!
//! Provides temporary source trees, config builders, and tracing helpers so
//! that individual crate tests stay concise and consistent.
//!
//! Add this crate as a `[dev-dependency]` in any workspace member:
//!
//! ```toml
//! [dev-dependencies]
//! diagctx-test-utils = { workspace = true }
//! ```

pub mod config;
pub mod sources;
pub mod tracing_setup;
