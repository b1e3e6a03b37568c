//! Process-wide tracing subscriber and the spans that tag agent output.
//!
//! Everything logged while a connection is being served runs inside a
//! `connection` span, and everything logged while one request executes runs
//! inside a `request` span, so structured output can be grouped by connection
//! and stream without repeating those fields at every call site.

use std::io::{self, IsTerminal};

use mgmtwire_config::{Config, LogFormat};
use mgmtwire_protocol::{ConnectionId, MessageKind, StreamId};
use once_cell::sync::OnceCell;
use tracing::{Span, Subscriber, debug_span, info_span, subscriber::SetGlobalDefaultError};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::{self, MakeWriter};

static INSTALLED_FORMAT: OnceCell<LogFormat> = OnceCell::new();

/// Proof that telemetry has been initialised.
#[derive(Debug, Clone, Copy)]
pub struct TelemetryHandle {
    format: LogFormat,
}

impl TelemetryHandle {
    /// Output format of the installed subscriber.
    ///
    /// This is the format of the first agent in the process, whatever later
    /// agents asked for.
    #[must_use]
    pub const fn format(&self) -> LogFormat {
        self.format
    }
}

/// Errors encountered while configuring telemetry.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    /// The configured filter expression did not parse.
    #[error("invalid log filter: {0}")]
    Filter(String),
    /// Another subscriber was already installed.
    #[error("failed to install telemetry subscriber: {0}")]
    Subscriber(SetGlobalDefaultError),
}

/// Installs the global subscriber on first use.
///
/// Later calls return a handle describing the subscriber already in place.
///
/// # Examples
///
/// ```rust
/// use mgmtwire_config::Config;
/// use mgmtwired::telemetry;
///
/// # fn main() -> Result<(), mgmtwired::telemetry::TelemetryError> {
/// let config = Config::default();
/// let first = telemetry::initialise(&config)?;
/// let again = telemetry::initialise(&config)?;
/// assert_eq!(first.format(), again.format());
/// # Ok(())
/// # }
/// ```
///
/// # Errors
///
/// Returns [`TelemetryError`] when the filter is invalid or a different
/// subscriber already owns the process.
pub fn initialise(config: &Config) -> Result<TelemetryHandle, TelemetryError> {
    INSTALLED_FORMAT
        .get_or_try_init(|| install_subscriber(config))
        .map(|format| TelemetryHandle { format: *format })
}

/// Span covering everything done for one connection.
#[must_use]
pub fn connection_span(connection: ConnectionId) -> Span {
    info_span!("connection", connection = %connection)
}

/// Span covering the execution of one request.
#[must_use]
pub fn request_span(connection: ConnectionId, stream: StreamId, kind: MessageKind) -> Span {
    debug_span!("request", connection = %connection, stream = %stream, kind = %kind)
}

fn install_subscriber(config: &Config) -> Result<LogFormat, TelemetryError> {
    let filter = EnvFilter::try_new(config.log_filter())
        .map_err(|error| TelemetryError::Filter(error.to_string()))?;
    let format = config.log_format();
    let subscriber = build_subscriber(filter, format, io::stderr, io::stderr().is_terminal());
    tracing::subscriber::set_global_default(subscriber).map_err(TelemetryError::Subscriber)?;
    Ok(format)
}

fn build_subscriber<W>(
    filter: EnvFilter,
    format: LogFormat,
    writer: W,
    ansi: bool,
) -> Box<dyn Subscriber + Send + Sync>
where
    W: for<'writer> MakeWriter<'writer> + Send + Sync + 'static,
{
    let builder = fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_target(true)
        .with_level(true)
        .with_thread_names(true)
        .with_writer(writer)
        .with_timer(fmt::time::UtcTime::rfc_3339());

    match format {
        LogFormat::Json => Box::new(
            builder
                .with_ansi(false)
                .json()
                .flatten_event(true)
                .with_current_span(true)
                .with_span_list(false)
                .finish(),
        ),
        LogFormat::Compact => Box::new(builder.with_ansi(ansi).compact().finish()),
    }
}
