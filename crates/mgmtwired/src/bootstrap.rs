//! Agent bootstrap orchestration.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use mgmtwire_config::{Config, ConfigValidationError};
use mgmtwire_protocol::{CompressionCatalog, FramePool, ProtocolVersionLimit};
use ortho_config::OrthoError;
use thiserror::Error;

use crate::auth::{AllowAllAuthenticator, Authenticator};
use crate::connection::ConnectionTracker;
use crate::dispatch::{MessageExecutor, NoQueryEngine, PoolError, QueryEngine, RequestDispatcher};
use crate::health::{FaultInspector, HealthReporter, StructuredFaultInspector};
use crate::pipeline::{CodecStages, FaultIsolator, PipelineAssembler};
use crate::telemetry::{self, TelemetryError, TelemetryHandle};
use crate::transport::{ConnectionHandler, ConnectionStream};

/// Trait abstracting configuration loading for testability.
pub trait ConfigLoader: Send + Sync {
    /// Loads the agent configuration.
    ///
    /// # Errors
    ///
    /// Returns the loader error when any configuration layer is invalid.
    fn load(&self) -> Result<Config, Arc<OrthoError>>;
}

/// Loader that delegates to [`Config::load`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemConfigLoader;

impl ConfigLoader for SystemConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        Config::load()
    }
}

/// Loader returning a configuration built in code.
#[derive(Debug, Default, Clone)]
pub struct StaticConfigLoader {
    config: Config,
}

impl StaticConfigLoader {
    /// Wraps an already resolved configuration.
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self { config }
    }
}

impl ConfigLoader for StaticConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        Ok(self.config.clone())
    }
}

/// Errors surfaced during bootstrap.
#[derive(Debug, Error)]
pub enum BootstrapError {
    /// Configuration failed to load.
    #[error("failed to load configuration: {source}")]
    Configuration {
        /// Underlying loader error.
        #[source]
        source: Arc<OrthoError>,
    },
    /// Configuration loaded but describes an unusable agent.
    #[error("invalid configuration: {source}")]
    Validation {
        /// Offending setting.
        #[source]
        source: ConfigValidationError,
    },
    /// Telemetry initialisation failed.
    #[error("failed to initialise telemetry: {source}")]
    Telemetry {
        /// Underlying telemetry error.
        #[source]
        source: TelemetryError,
    },
    /// The execution pool could not start.
    #[error("failed to start the execution pool: {source}")]
    ExecutionPool {
        /// Underlying pool error.
        #[source]
        source: PoolError,
    },
}

/// Pluggable collaborators the agent is built around.
pub struct Collaborators {
    authenticator: Arc<dyn Authenticator>,
    engine: Arc<dyn QueryEngine>,
    inspector: Arc<dyn FaultInspector>,
    compression: CompressionCatalog,
}

impl Default for Collaborators {
    fn default() -> Self {
        Self {
            authenticator: Arc::new(AllowAllAuthenticator),
            engine: Arc::new(NoQueryEngine),
            inspector: Arc::new(StructuredFaultInspector),
            compression: CompressionCatalog::new(),
        }
    }
}

impl Collaborators {
    /// Replaces the authentication backend.
    #[must_use]
    pub fn with_authenticator(mut self, authenticator: Arc<dyn Authenticator>) -> Self {
        self.authenticator = authenticator;
        self
    }

    /// Replaces the query engine.
    #[must_use]
    pub fn with_query_engine(mut self, engine: Arc<dyn QueryEngine>) -> Self {
        self.engine = engine;
        self
    }

    /// Replaces the fault inspector.
    #[must_use]
    pub fn with_fault_inspector(mut self, inspector: Arc<dyn FaultInspector>) -> Self {
        self.inspector = inspector;
        self
    }

    /// Replaces the compression algorithms offered to clients.
    #[must_use]
    pub fn with_compression(mut self, compression: CompressionCatalog) -> Self {
        self.compression = compression;
        self
    }
}

impl std::fmt::Debug for Collaborators {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("Collaborators")
            .field("authenticator", &self.authenticator.name())
            .field("compression", &self.compression)
            .finish_non_exhaustive()
    }
}

/// A bootstrapped agent ready to serve already-accepted connections.
pub struct Agent {
    config: Config,
    telemetry: TelemetryHandle,
    assembler: Arc<PipelineAssembler>,
}

impl Agent {
    /// Resolved configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Telemetry handle, primarily useful for testing.
    #[must_use]
    pub fn telemetry(&self) -> TelemetryHandle {
        self.telemetry
    }

    /// Serves `stream` on a dedicated thread.
    ///
    /// # Errors
    ///
    /// Returns the I/O error raised when the thread cannot be spawned.
    pub fn serve_connection<S: ConnectionStream>(
        &self,
        stream: S,
    ) -> std::io::Result<JoinHandle<()>> {
        let assembler = Arc::clone(&self.assembler);
        thread::Builder::new()
            .name("mgmtwire-conn".to_owned())
            .spawn(move || assembler.handle(stream))
    }

    /// Serves `stream` on the calling thread until it closes.
    pub fn handle_connection<S: ConnectionStream>(&self, stream: S) {
        self.assembler.handle(stream);
    }

    /// Connections currently being served.
    #[must_use]
    pub fn open_connections(&self) -> usize {
        self.assembler.tracker().open_connections()
    }

    /// Buffer pool backing decoded frame bodies.
    #[must_use]
    pub fn frame_pool(&self) -> &FramePool {
        self.assembler.stages().frame_pool()
    }
}

impl std::fmt::Debug for Agent {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("Agent")
            .field("config", &self.config)
            .field("assembler", &self.assembler)
            .finish_non_exhaustive()
    }
}

/// Bootstraps the agent using the supplied collaborators.
///
/// # Errors
///
/// Returns [`BootstrapError`] when configuration, telemetry or the execution
/// pool cannot be set up. The reporter is told about the failure first.
pub fn bootstrap_with(
    loader: &dyn ConfigLoader,
    reporter: Arc<dyn HealthReporter>,
    collaborators: Collaborators,
) -> Result<Agent, BootstrapError> {
    reporter.bootstrap_starting();
    match build_agent(loader, &reporter, collaborators) {
        Ok(agent) => {
            reporter.bootstrap_succeeded(&agent.config);
            Ok(agent)
        }
        Err(error) => {
            reporter.bootstrap_failed(&error);
            Err(error)
        }
    }
}

fn build_agent(
    loader: &dyn ConfigLoader,
    reporter: &Arc<dyn HealthReporter>,
    collaborators: Collaborators,
) -> Result<Agent, BootstrapError> {
    let config = loader
        .load()
        .map_err(|source| BootstrapError::Configuration { source })?;
    config
        .validate()
        .map_err(|source| BootstrapError::Validation { source })?;
    let telemetry =
        telemetry::initialise(&config).map_err(|source| BootstrapError::Telemetry { source })?;

    // Validation guarantees the ceiling names a known version.
    let limit =
        ProtocolVersionLimit::from_number(config.max_protocol_version()).unwrap_or_default();
    let Collaborators {
        authenticator,
        engine,
        inspector,
        compression,
    } = collaborators;

    let executor = Arc::new(MessageExecutor::new(
        Arc::clone(&authenticator),
        engine,
        compression,
        limit,
    ));
    let isolator = Arc::new(FaultIsolator::new(inspector));
    let dispatcher = RequestDispatcher::new(
        executor,
        Arc::clone(&isolator),
        config.execution_threads(),
        config.max_in_flight_queries(),
    )
    .map_err(|source| BootstrapError::ExecutionPool { source })?;
    let stages = CodecStages::new(
        limit,
        config.max_frame_bytes(),
        FramePool::new(config.pooled_frame_buffers()),
    );
    let assembler = PipelineAssembler::new(
        stages,
        Arc::new(dispatcher),
        isolator,
        Arc::new(ConnectionTracker::new(Arc::clone(reporter))),
        authenticator,
    );

    Ok(Agent {
        config,
        telemetry,
        assembler: Arc::new(assembler),
    })
}
