//! Shared fixtures and fakes for Clyde's test suites.
//!
//! Provides isolated on-disk projects, manifest builders, a scripted
//! toolchain fake that behaves like a deterministic compiler, and an event
//! recorder for asserting on the hook stream.

#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

mod driver;
mod events;
mod temp_project;

pub use driver::FakeDriver;
pub use events::EventLog;
pub use temp_project::{TempProject, app_manifest, lib_manifest};

use std::sync::Once;

static TRACING: Once = Once::new();

/// Install a tracing subscriber honoring `RUST_LOG`, once per process.
/// Call at the top of tests whose logs matter when debugging.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}
