//! Built-in defaults applied when no configuration layer sets a value.

use crate::logging::LogFormat;

/// Default log filter expression.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Largest frame body accepted by default (256 MiB, the native protocol cap).
pub const DEFAULT_MAX_FRAME_BYTES: usize = 256 * 1024 * 1024;

/// Highest native protocol version negotiated by default.
pub const DEFAULT_MAX_PROTOCOL_VERSION: u8 = 5;

/// Lowest protocol version the agent understands at all.
pub const MIN_PROTOCOL_VERSION: u8 = 1;

/// Number of worker threads executing ready-state queries.
pub const DEFAULT_EXECUTION_THREADS: usize = 4;

/// Queries one connection may have awaiting an answer before its reader
/// pauses.
pub const DEFAULT_MAX_IN_FLIGHT_QUERIES: usize = 1024;

/// Frame buffers retained for reuse across requests.
pub const DEFAULT_POOLED_FRAME_BUFFERS: usize = 64;

/// Default log filter expression used by the agent.
#[must_use]
pub fn default_log_filter() -> &'static str {
    DEFAULT_LOG_FILTER
}

/// Default logging format for the agent.
#[must_use]
pub fn default_log_format() -> LogFormat {
    LogFormat::Json
}
