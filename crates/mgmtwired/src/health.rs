//! Structured health reporting and fault inspection.

use std::sync::Arc;

use mgmtwire_config::Config;
use mgmtwire_protocol::ConnectionId;

use crate::bootstrap::BootstrapError;
use crate::dispatch::{DispatchError, FaultClass};

const HEALTH_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::health");

/// Observer trait used to surface lifecycle events to telemetry sinks.
pub trait HealthReporter: Send + Sync {
    /// Invoked before configuration loading begins.
    fn bootstrap_starting(&self);

    /// Invoked after bootstrap completes successfully.
    fn bootstrap_succeeded(&self, config: &Config);

    /// Invoked when bootstrap fails.
    fn bootstrap_failed(&self, error: &BootstrapError);

    /// Invoked when a connection is handed to the agent.
    fn connection_opened(&self, connection: ConnectionId);

    /// Invoked once the connection's pipeline has finished.
    fn connection_closed(&self, connection: ConnectionId);
}

impl<T> HealthReporter for Arc<T>
where
    T: HealthReporter,
{
    fn bootstrap_starting(&self) {
        (**self).bootstrap_starting();
    }

    fn bootstrap_succeeded(&self, config: &Config) {
        (**self).bootstrap_succeeded(config);
    }

    fn bootstrap_failed(&self, error: &BootstrapError) {
        (**self).bootstrap_failed(error);
    }

    fn connection_opened(&self, connection: ConnectionId) {
        (**self).connection_opened(connection);
    }

    fn connection_closed(&self, connection: ConnectionId) {
        (**self).connection_closed(connection);
    }
}

/// Default reporter that records lifecycle events using `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct StructuredHealthReporter;

impl StructuredHealthReporter {
    /// Builds a new reporter.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl HealthReporter for StructuredHealthReporter {
    fn bootstrap_starting(&self) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "bootstrap_starting",
            "starting agent bootstrap"
        );
    }

    fn bootstrap_succeeded(&self, config: &Config) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "bootstrap_succeeded",
            log_filter = %config.log_filter(),
            log_format = ?config.log_format(),
            max_protocol_version = config.max_protocol_version(),
            execution_threads = config.execution_threads(),
            "agent bootstrap completed"
        );
    }

    fn bootstrap_failed(&self, error: &BootstrapError) {
        tracing::error!(
            target: HEALTH_TARGET,
            event = "bootstrap_failed",
            error = %error,
            "agent bootstrap failed"
        );
    }

    fn connection_opened(&self, connection: ConnectionId) {
        tracing::debug!(
            target: HEALTH_TARGET,
            event = "connection_opened",
            connection = %connection,
            "connection opened"
        );
    }

    fn connection_closed(&self, connection: ConnectionId) {
        tracing::debug!(
            target: HEALTH_TARGET,
            event = "connection_closed",
            connection = %connection,
            "connection closed"
        );
    }
}

/// Whether a fault leaves the host process able to continue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultVerdict {
    /// The connection may carry on.
    Recoverable,
    /// The host should consider shutting down.
    Fatal,
}

/// Decides whether a fault is process-fatal.
///
/// The agent never shuts itself down; the verdict is logged and left to the
/// host process to act upon.
pub trait FaultInspector: Send + Sync {
    /// Inspects a fault raised on `connection`.
    fn inspect(&self, connection: ConnectionId, error: &DispatchError) -> FaultVerdict;
}

impl<T> FaultInspector for Arc<T>
where
    T: FaultInspector + ?Sized,
{
    fn inspect(&self, connection: ConnectionId, error: &DispatchError) -> FaultVerdict {
        (**self).inspect(connection, error)
    }
}

/// Inspector treating resource exhaustion as fatal and logging defects.
#[derive(Debug, Default, Clone, Copy)]
pub struct StructuredFaultInspector;

impl FaultInspector for StructuredFaultInspector {
    fn inspect(&self, connection: ConnectionId, error: &DispatchError) -> FaultVerdict {
        match error.class() {
            FaultClass::Exhaustion => {
                tracing::error!(
                    target: HEALTH_TARGET,
                    event = "fatal_fault",
                    connection = %connection,
                    error = %error,
                    "resource exhaustion reported"
                );
                FaultVerdict::Fatal
            }
            FaultClass::Defect => {
                tracing::error!(
                    target: HEALTH_TARGET,
                    event = "defect",
                    connection = %connection,
                    error = ?error,
                    "agent defect reported"
                );
                FaultVerdict::Recoverable
            }
            FaultClass::ProtocolViolation | FaultClass::Execution => FaultVerdict::Recoverable,
        }
    }
}
