//! Utilities shared by the tests of every crate in the workspace.

#![warn(missing_docs)]

use std::sync::Once;

use observability_deps::tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

pub mod tracing;

static LOG_SETUP: Once = Once::new();

/// Enables logging if the `TEST_LOG` environment variable is set, filtered by `RUST_LOG`
/// (default `debug`).
///
/// ```bash
/// TEST_LOG= RUST_LOG=read_service=trace cargo test -p read_service
/// ```
pub fn maybe_start_logging() {
    if std::env::var("TEST_LOG").is_ok() {
        LOG_SETUP.call_once(|| {
            fmt()
                .with_env_filter(
                    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")),
                )
                .with_test_writer()
                .init();
            info!("test logging enabled");
        });
    }
}

/// Asserts that `actual` contains `expected`, printing both on failure.
#[macro_export]
macro_rules! assert_contains {
    ($actual: expr, $expected: expr) => {
        let actual_value: String = $actual.into();
        let expected_value: String = $expected.into();
        assert!(
            actual_value.contains(&expected_value),
            "Can not find expected in actual.\n\nExpected:\n{}\n\nActual:\n{}",
            expected_value,
            actual_value
        );
    };
}
