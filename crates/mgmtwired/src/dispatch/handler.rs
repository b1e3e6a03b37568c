//! The dispatch loop for one decoded request.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;

use mgmtwire_protocol::{Request, Response};
use tracing::trace;

use super::DISPATCH_TARGET;
use super::errors::DispatchError;
use super::executor::{ExecutionContext, Executor};
use super::pool::{ExecutionPool, JobHandler, PoolError};
use super::warnings::WarningsCapture;
use crate::connection::{Connection, HandshakeState, InFlightPermit};
use crate::pipeline::{FaultIsolator, ResponseSink};
use crate::telemetry;

struct QueuedRequest {
    connection: Arc<Connection>,
    request: Request,
    sink: ResponseSink,
    permit: InFlightPermit,
}

/// Validation, execution and response construction shared by the inline path
/// and the execution workers.
struct DispatchCore {
    executor: Arc<dyn Executor>,
    isolator: Arc<FaultIsolator>,
}

impl DispatchCore {
    fn process(&self, connection: &Connection, request: Request) -> Response {
        let stream_id = request.stream_id();
        let _span = telemetry::request_span(connection.id(), stream_id, request.kind()).entered();
        if request.connection().id() != connection.id() {
            let error = DispatchError::invariant(format!(
                "request from {} reached the dispatcher of {}",
                request.connection().id(),
                connection.id()
            ));
            request.release();
            return self.isolator.convert(connection, stream_id, &error);
        }

        let kind = request.kind();
        let version = request.version();
        let warnings = version.supports_warnings().then(WarningsCapture::open);
        let started_at = Instant::now();

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            let stream = connection.validate(kind, version, stream_id)?;
            stream.begin_execution();
            let context = ExecutionContext::new(&stream, started_at, version, warnings.as_ref());
            self.executor.execute(&request, &context)
        }))
        .unwrap_or_else(|payload| Err(DispatchError::from_panic(payload.as_ref())));

        request.release();
        let captured = warnings.map(WarningsCapture::close).unwrap_or_default();

        match outcome {
            Ok(mut response) => {
                response.set_stream_id(stream_id);
                response.set_warnings(captured);
                response.attach(Arc::clone(connection.info()));
                match connection.advance(kind, response.kind()) {
                    Ok(_) => {
                        trace!(
                            target: DISPATCH_TARGET,
                            connection = %connection.id(),
                            stream = %stream_id,
                            request = %kind,
                            response = %response.kind(),
                            elapsed_us = started_at.elapsed().as_micros(),
                            "request completed"
                        );
                        response
                    }
                    Err(error) => self.isolator.convert(connection, stream_id, &error),
                }
            }
            Err(error) => self.isolator.convert(connection, stream_id, &error),
        }
    }

    fn run(&self, job: QueuedRequest) {
        let QueuedRequest {
            connection,
            request,
            sink,
            permit,
        } = job;
        sink.send(self.process(&connection, request));
        drop(permit);
    }
}

/// Drives every decoded request to exactly one response.
pub struct RequestDispatcher {
    core: Arc<DispatchCore>,
    pool: ExecutionPool<QueuedRequest>,
    max_in_flight: usize,
}

impl RequestDispatcher {
    /// Builds a dispatcher backed by `threads` execution workers, letting each
    /// connection hold at most `max_in_flight` unanswered queries.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError`] when the execution pool cannot start.
    pub fn new(
        executor: Arc<dyn Executor>,
        isolator: Arc<FaultIsolator>,
        threads: usize,
        max_in_flight: usize,
    ) -> Result<Self, PoolError> {
        let core = Arc::new(DispatchCore { executor, isolator });
        let worker_core = Arc::clone(&core);
        let handler: JobHandler<QueuedRequest> =
            Arc::new(move |job: QueuedRequest| worker_core.run(job));
        let pool = ExecutionPool::new(threads, handler)?;
        Ok(Self {
            core,
            pool,
            max_in_flight: max_in_flight.max(1),
        })
    }

    /// Dispatches `request`, emitting its response on `sink`.
    ///
    /// Handshake requests and anything arriving before the connection is
    /// ready complete before this returns. Queries on a ready connection are
    /// queued and answered by a worker; when the connection already has the
    /// maximum number of unanswered queries, this blocks until one of its own
    /// responses has been produced.
    pub fn dispatch(&self, connection: &Arc<Connection>, request: Request, sink: &ResponseSink) {
        if connection.state() != HandshakeState::Ready || request.kind().is_handshake() {
            sink.send(self.core.process(connection, request));
            return;
        }

        let permit = connection.in_flight().acquire(self.max_in_flight);
        let job = QueuedRequest {
            connection: Arc::clone(connection),
            request,
            sink: sink.clone(),
            permit,
        };
        if let Err(stopped) = self.pool.submit(job) {
            let error = DispatchError::resource_exhausted("execution pool is no longer running");
            let QueuedRequest {
                connection,
                request,
                sink,
                permit,
            } = stopped.into_job();
            let stream_id = request.stream_id();
            request.release();
            sink.send(self.core.isolator.convert(&connection, stream_id, &error));
            drop(permit);
        }
    }

    /// Queries waiting for an execution worker.
    #[must_use]
    pub fn queued(&self) -> usize {
        self.pool.queued()
    }
}

impl std::fmt::Debug for RequestDispatcher {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("RequestDispatcher")
            .field("threads", &self.pool.threads())
            .field("max_in_flight", &self.max_in_flight)
            .finish_non_exhaustive()
    }
}
