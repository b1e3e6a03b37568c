//! Connection core for the local management socket.
//!
//! The agent speaks the database's native binary protocol over an
//! already-accepted local socket, so a co-located management process can use
//! the same message grammar as an ordinary driver. Each connection walks the
//! same handshake a network client must: `UNINITIALIZED` until `STARTUP`,
//! `AUTHENTICATING` while a SASL exchange is running, and `READY` once queries
//! may flow.
//!
//! The crate is organised around four pieces:
//!
//! - [`Connection`] owns the handshake phase and the per-stream contexts,
//!   gating which message kinds are legal and advancing the phase as
//!   handshake responses are produced.
//! - [`RequestDispatcher`] runs one decoded request to exactly one response,
//!   releasing the request buffer and closing its warnings capture on every
//!   path.
//! - [`PipelineAssembler`] binds the codec stages, the dispatcher and the
//!   fault isolator to each accepted stream.
//! - [`FaultIsolator`] turns any fault that escapes dispatch into an error
//!   response on the faulting connection and shows it to the
//!   [`FaultInspector`].
//!
//! Accepting and binding sockets is left to the host process, which hands
//! connected streams to [`Agent::serve_connection`] after calling
//! [`bootstrap_with`].

mod auth;
mod bootstrap;
mod connection;
mod dispatch;
mod health;
mod pipeline;
pub mod telemetry;
mod transport;

pub use auth::{AllowAllAuthenticator, AuthenticationError, Authenticator, SaslNegotiator};
pub use bootstrap::{
    Agent, BootstrapError, Collaborators, ConfigLoader, StaticConfigLoader, SystemConfigLoader,
    bootstrap_with,
};
pub use connection::{
    ClientSession, Connection, ConnectionGuard, ConnectionTracker, HandshakeState, Identity,
    InFlightPermit, InFlightQueries, StreamContext, StreamContextTable,
};
pub use dispatch::{
    DEFAULT_CQL_VERSION, DispatchError, ExecutionContext, ExecutionPool, Executor, FaultClass,
    JobHandler, MessageExecutor, NoQueryEngine, PoolError, PoolStopped, QueryEngine, QueryError,
    RequestDispatcher, WarningsCapture,
};
pub use health::{
    FaultInspector, FaultVerdict, HealthReporter, StructuredFaultInspector,
    StructuredHealthReporter,
};
pub use pipeline::{CodecStages, FaultIsolator, PipelineAssembler, ResponseSink};
pub use telemetry::{TelemetryError, TelemetryHandle};
pub use transport::{ConnectionHandler, ConnectionStream};

#[cfg(test)]
mod tests;
