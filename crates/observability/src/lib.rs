//! Tracing and logging setup shared by the marketplace binaries.

/// Initialize process-wide tracing with JSON output and `RUST_LOG` filtering.
///
/// Safe to call multiple times; subsequent calls are no-ops.
pub fn init() {
    tracing::init(&tracing::TracingConfig::from_env());
}

/// Tracing configuration (filters, output format).
pub mod tracing;
