//! Process-wide tracing setup shared by the binaries and the test harnesses.

pub mod tracing;

pub use tracing::LogFormat;

/// Initialize logging from `RUST_LOG` (default `info`) and `LOG_FORMAT`.
///
/// Safe to call multiple times; later calls are no-ops.
pub fn init() {
    tracing::init(LogFormat::from_env());
}

/// Compact output captured by the test harness. Honors `RUST_LOG`.
pub fn init_for_tests() {
    tracing::init_test_writer();
}
