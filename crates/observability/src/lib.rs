//! Tracing and logging (shared setup).

use serde::Deserialize;

/// Tracing configuration (filters, layers).
pub mod tracing;

/// Output format of the process-wide subscriber.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// One JSON object per event.
    #[default]
    Json,
    /// Human-readable multi-line output for local development.
    Pretty,
}

/// Initialize process-wide observability (tracing/logging).
///
/// This is safe to call multiple times; subsequent calls become no-ops.
pub fn init(filter: &str, format: LogFormat) {
    tracing::init(filter, format);
}
