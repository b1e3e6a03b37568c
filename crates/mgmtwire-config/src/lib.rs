//! Shared configuration for the management socket agent.
//!
//! Values are layered by `ortho_config`: built-in defaults, then a TOML file
//! (`--config-path` or `MGMTWIRE_CONFIG_PATH`), then `MGMTWIRE_*` environment
//! variables, then command-line flags. Every field is optional in the layered
//! representation; the accessors resolve unset values to the defaults in
//! [`defaults`].

mod defaults;
mod logging;

use std::sync::Arc;

use ortho_config::{OrthoConfig, OrthoError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use defaults::{
    DEFAULT_EXECUTION_THREADS, DEFAULT_LOG_FILTER, DEFAULT_MAX_FRAME_BYTES,
    DEFAULT_MAX_IN_FLIGHT_QUERIES, DEFAULT_MAX_PROTOCOL_VERSION, DEFAULT_POOLED_FRAME_BUFFERS,
    MIN_PROTOCOL_VERSION, default_log_filter, default_log_format,
};
pub use logging::{LogFormat, LogFormatParseError};

/// Agent configuration resolved from all configuration layers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, OrthoConfig)]
#[ortho_config(prefix = "MGMTWIRE")]
pub struct Config {
    /// Tracing filter expression, for example `info,mgmtwired::dispatch=debug`.
    #[serde(default)]
    pub log_filter: Option<String>,
    /// Output format for structured logs.
    #[serde(default)]
    pub log_format: Option<LogFormat>,
    /// Largest frame body, in bytes, accepted from a client.
    #[serde(default)]
    pub max_frame_bytes: Option<usize>,
    /// Highest native protocol version the agent will speak.
    #[serde(default)]
    pub max_protocol_version: Option<u8>,
    /// Worker threads executing queries once a connection is ready.
    #[serde(default)]
    pub execution_threads: Option<usize>,
    /// Unanswered queries one connection may hold before reading pauses.
    #[serde(default)]
    pub max_in_flight_queries: Option<usize>,
    /// Frame buffers kept for reuse across requests.
    #[serde(default)]
    pub pooled_frame_buffers: Option<usize>,
}

impl Config {
    /// Loads configuration from the process arguments and environment.
    ///
    /// # Errors
    ///
    /// Returns the aggregated loader error when any layer fails to parse.
    pub fn load() -> Result<Self, Arc<OrthoError>> {
        <Self as OrthoConfig>::load()
    }

    /// Loads configuration from an explicit argument list.
    ///
    /// # Errors
    ///
    /// Returns the aggregated loader error when any layer fails to parse.
    pub fn load_from_iter<I, T>(args: I) -> Result<Self, Arc<OrthoError>>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        <Self as OrthoConfig>::load_from_iter(args)
    }

    /// Tracing filter expression.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        self.log_filter.as_deref().unwrap_or(DEFAULT_LOG_FILTER)
    }

    /// Structured log format.
    #[must_use]
    pub fn log_format(&self) -> LogFormat {
        self.log_format.unwrap_or_else(default_log_format)
    }

    /// Largest accepted frame body in bytes.
    #[must_use]
    pub fn max_frame_bytes(&self) -> usize {
        self.max_frame_bytes.unwrap_or(DEFAULT_MAX_FRAME_BYTES)
    }

    /// Highest protocol version the decoder accepts.
    #[must_use]
    pub fn max_protocol_version(&self) -> u8 {
        self.max_protocol_version
            .unwrap_or(DEFAULT_MAX_PROTOCOL_VERSION)
    }

    /// Size of the query execution pool.
    #[must_use]
    pub fn execution_threads(&self) -> usize {
        self.execution_threads.unwrap_or(DEFAULT_EXECUTION_THREADS)
    }

    /// Per-connection cap on queries awaiting an answer.
    #[must_use]
    pub fn max_in_flight_queries(&self) -> usize {
        self.max_in_flight_queries
            .unwrap_or(DEFAULT_MAX_IN_FLIGHT_QUERIES)
    }

    /// Number of frame buffers retained for reuse.
    #[must_use]
    pub fn pooled_frame_buffers(&self) -> usize {
        self.pooled_frame_buffers
            .unwrap_or(DEFAULT_POOLED_FRAME_BUFFERS)
    }

    /// Checks that the resolved values describe a usable agent.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigValidationError`] naming the first offending field.
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.execution_threads() == 0 {
            return Err(ConfigValidationError::ZeroExecutionThreads);
        }
        if self.max_in_flight_queries() == 0 {
            return Err(ConfigValidationError::ZeroInFlightLimit);
        }
        if self.max_frame_bytes() == 0 {
            return Err(ConfigValidationError::ZeroFrameLimit);
        }
        let version = self.max_protocol_version();
        if !(MIN_PROTOCOL_VERSION..=DEFAULT_MAX_PROTOCOL_VERSION).contains(&version) {
            return Err(ConfigValidationError::ProtocolVersion {
                version,
                min: MIN_PROTOCOL_VERSION,
                max: DEFAULT_MAX_PROTOCOL_VERSION,
            });
        }
        Ok(())
    }
}

/// Semantic errors in an otherwise well-formed configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigValidationError {
    /// The execution pool would have no workers.
    #[error("execution_threads must be at least 1")]
    ZeroExecutionThreads,
    /// No query could ever be dispatched.
    #[error("max_in_flight_queries must be at least 1")]
    ZeroInFlightLimit,
    /// Every frame would be rejected as too large.
    #[error("max_frame_bytes must be at least 1")]
    ZeroFrameLimit,
    /// The protocol ceiling names a version the agent cannot speak.
    #[error("max_protocol_version {version} is outside the supported range {min}..={max}")]
    ProtocolVersion {
        /// Configured ceiling.
        version: u8,
        /// Lowest supported version.
        min: u8,
        /// Highest supported version.
        max: u8,
    },
}
