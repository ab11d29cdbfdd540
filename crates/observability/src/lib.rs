//! Tracing/logging setup shared by every propcrm binary and test harness.

/// Initialize process-wide logging from a [`LogConfig`].
///
/// This is safe to call multiple times; subsequent calls become no-ops.
pub fn init(config: &LogConfig) {
    tracing::init(config);
}

/// Tracing configuration (filters, output format).
pub mod tracing;

pub use tracing::{LogConfig, LogFormat, LogFormatError};
