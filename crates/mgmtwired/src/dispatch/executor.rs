//! Execution collaborators.
//!
//! [`MessageExecutor`] answers the handshake vocabulary itself and forwards
//! query traffic to a pluggable [`QueryEngine`].

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use mgmtwire_protocol::{
    AuthToken, COMPRESSION, CQL_VERSION, CompressionCatalog, ErrorCode, LegacyCredentials,
    MessageKind, PROTOCOL_VERSIONS, ProtocolVersion, ProtocolVersionLimit, Request, Response,
    ResponseBody, StartupOptions,
};
use thiserror::Error;
use tracing::debug;

use super::DISPATCH_TARGET;
use super::errors::DispatchError;
use super::warnings::WarningsCapture;
use crate::auth::Authenticator;
use crate::connection::StreamContext;

/// Query language version advertised when the engine does not override it.
pub const DEFAULT_CQL_VERSION: &str = "3.4.5";

/// Everything an executor may consult while running one request.
#[derive(Debug)]
pub struct ExecutionContext<'a> {
    stream: &'a Arc<StreamContext>,
    started_at: Instant,
    version: ProtocolVersion,
    warnings: Option<&'a WarningsCapture>,
}

impl<'a> ExecutionContext<'a> {
    pub(crate) fn new(
        stream: &'a Arc<StreamContext>,
        started_at: Instant,
        version: ProtocolVersion,
        warnings: Option<&'a WarningsCapture>,
    ) -> Self {
        Self {
            stream,
            started_at,
            version,
            warnings,
        }
    }

    /// Stream context resolved by validation.
    #[must_use]
    pub fn stream(&self) -> &Arc<StreamContext> {
        self.stream
    }

    /// Monotonic instant dispatch began.
    #[must_use]
    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    /// Protocol version of the request.
    #[must_use]
    pub fn version(&self) -> ProtocolVersion {
        self.version
    }

    /// Attaches a warning to this request's response.
    ///
    /// Warnings are dropped for protocol versions that cannot carry them.
    pub fn warn(&self, warning: impl Into<String>) {
        if let Some(capture) = self.warnings {
            capture.add(warning);
        }
    }
}

/// Executes one validated request.
pub trait Executor: Send + Sync {
    /// Produces the response for `request`.
    ///
    /// # Errors
    ///
    /// Returns a [`DispatchError`] which the dispatcher converts into an
    /// `ERROR` response.
    fn execute(
        &self,
        request: &Request,
        context: &ExecutionContext<'_>,
    ) -> Result<Response, DispatchError>;
}

impl<T> Executor for Arc<T>
where
    T: Executor + ?Sized,
{
    fn execute(
        &self,
        request: &Request,
        context: &ExecutionContext<'_>,
    ) -> Result<Response, DispatchError> {
        (**self).execute(request, context)
    }
}

/// Failure reported by a query engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    /// The statement failed to parse.
    #[error("{0}")]
    Syntax(String),
    /// The statement parsed but cannot run.
    #[error("{0}")]
    Invalid(String),
    /// The engine failed internally.
    #[error("{0}")]
    Server(String),
}

impl From<QueryError> for DispatchError {
    fn from(error: QueryError) -> Self {
        let code = match &error {
            QueryError::Syntax(_) => ErrorCode::SyntaxError,
            QueryError::Invalid(_) => ErrorCode::Invalid,
            QueryError::Server(_) => ErrorCode::ServerError,
        };
        Self::execution(code, error.to_string())
    }
}

/// Query execution backend invoked once a connection is ready.
pub trait QueryEngine: Send + Sync {
    /// Runs a `QUERY`, `PREPARE`, `EXECUTE` or `BATCH` body.
    ///
    /// # Errors
    ///
    /// Returns a [`QueryError`] describing why the statement failed.
    fn execute(
        &self,
        kind: MessageKind,
        payload: &[u8],
        context: &ExecutionContext<'_>,
    ) -> Result<ResponseBody, QueryError>;

    /// Query language versions advertised in `SUPPORTED`.
    fn cql_versions(&self) -> Vec<String> {
        vec![DEFAULT_CQL_VERSION.to_owned()]
    }
}

impl<T> QueryEngine for Arc<T>
where
    T: QueryEngine + ?Sized,
{
    fn execute(
        &self,
        kind: MessageKind,
        payload: &[u8],
        context: &ExecutionContext<'_>,
    ) -> Result<ResponseBody, QueryError> {
        (**self).execute(kind, payload, context)
    }

    fn cql_versions(&self) -> Vec<String> {
        (**self).cql_versions()
    }
}

/// Engine used when the host has not attached one.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoQueryEngine;

impl QueryEngine for NoQueryEngine {
    fn execute(
        &self,
        kind: MessageKind,
        _payload: &[u8],
        _context: &ExecutionContext<'_>,
    ) -> Result<ResponseBody, QueryError> {
        Err(QueryError::Server(format!(
            "cannot execute {kind}: no query engine attached"
        )))
    }
}

/// Executor answering the handshake itself and delegating queries.
pub struct MessageExecutor {
    authenticator: Arc<dyn Authenticator>,
    engine: Arc<dyn QueryEngine>,
    compression: CompressionCatalog,
    versions: ProtocolVersionLimit,
}

impl MessageExecutor {
    /// Builds an executor from its collaborators.
    #[must_use]
    pub fn new(
        authenticator: Arc<dyn Authenticator>,
        engine: Arc<dyn QueryEngine>,
        compression: CompressionCatalog,
        versions: ProtocolVersionLimit,
    ) -> Self {
        Self {
            authenticator,
            engine,
            compression,
            versions,
        }
    }

    fn options(&self) -> ResponseBody {
        let mut supported = BTreeMap::new();
        supported.insert(CQL_VERSION.to_owned(), self.engine.cql_versions());
        supported.insert(
            COMPRESSION.to_owned(),
            self.compression.names().map(str::to_owned).collect(),
        );
        supported.insert(
            PROTOCOL_VERSIONS.to_owned(),
            self.versions.supported().map(|version| version.to_string()).collect(),
        );
        ResponseBody::Supported(supported)
    }

    fn startup(&self, request: &Request) -> Result<ResponseBody, DispatchError> {
        let options = StartupOptions::decode(request.payload())?;
        if options.cql_version().is_none() {
            return Err(DispatchError::protocol_violation(format!(
                "Missing value {CQL_VERSION} in {} message",
                MessageKind::Startup
            )));
        }
        if let Some(name) = options.compression() {
            let algorithm = self.compression.find(name).ok_or_else(|| {
                DispatchError::protocol_violation(format!("Unknown compression algorithm: {name}"))
            })?;
            request.connection().set_compressor(algorithm);
        }
        if self.authenticator.requires_authentication() {
            return Ok(ResponseBody::Authenticate {
                authenticator: self.authenticator.name().to_owned(),
            });
        }
        Ok(ResponseBody::Ready)
    }

    fn auth_response(
        &self,
        request: &Request,
        context: &ExecutionContext<'_>,
    ) -> Result<ResponseBody, DispatchError> {
        let AuthToken(token) = AuthToken::decode(request.payload())?;
        let session = context.stream().session();
        let mut slot = session.negotiator();
        let negotiator = slot.get_or_insert_with(|| self.authenticator.new_negotiator());

        let outcome = negotiator
            .evaluate_response(token.as_deref().unwrap_or_default())
            .and_then(|challenge| {
                if !negotiator.is_complete() {
                    return Ok(ResponseBody::AuthChallenge(challenge));
                }
                let identity = negotiator.authenticated_identity()?;
                debug!(
                    target: DISPATCH_TARGET,
                    identity = %identity,
                    "authentication completed"
                );
                session.login(identity);
                Ok(ResponseBody::AuthSuccess(challenge))
            });
        if !matches!(outcome, Ok(ResponseBody::AuthChallenge(_))) {
            // Completed and failed exchanges both start over on the next token.
            *slot = None;
        }
        Ok(outcome?)
    }

    fn credentials(
        &self,
        request: &Request,
        context: &ExecutionContext<'_>,
    ) -> Result<ResponseBody, DispatchError> {
        let LegacyCredentials(credentials) = LegacyCredentials::decode(request.payload())?;
        let identity = self.authenticator.legacy_authenticate(&credentials)?;
        context.stream().session().login(identity);
        Ok(ResponseBody::Ready)
    }
}

impl Executor for MessageExecutor {
    fn execute(
        &self,
        request: &Request,
        context: &ExecutionContext<'_>,
    ) -> Result<Response, DispatchError> {
        let body = match request.kind() {
            MessageKind::Options => self.options(),
            MessageKind::Startup => self.startup(request)?,
            MessageKind::AuthResponse => self.auth_response(request, context)?,
            MessageKind::Credentials => self.credentials(request, context)?,
            MessageKind::Register => ResponseBody::Ready,
            kind @ (MessageKind::Query
            | MessageKind::Prepare
            | MessageKind::Execute
            | MessageKind::Batch) => self.engine.execute(kind, request.payload(), context)?,
            kind => {
                return Err(DispatchError::invariant(format!(
                    "{kind} is not a request and cannot be executed"
                )));
            }
        };
        Ok(Response::new(body))
    }
}
