//! Last pipeline stage: turns escaped faults into error responses.

use std::sync::Arc;

use mgmtwire_protocol::{Response, StreamId};
use tracing::{debug, error, warn};

use super::PIPELINE_TARGET;
use super::output::ResponseSink;
use crate::connection::Connection;
use crate::dispatch::{DispatchError, FaultClass};
use crate::health::{FaultInspector, FaultVerdict};

/// Converts faults into protocol error responses for the connection that
/// raised them.
///
/// The isolator runs on the thread that observed the fault, so the error
/// response is queued before anything that thread handles next. Every fault is
/// shown to the [`FaultInspector`]; a fatal verdict is logged but the client
/// still receives its error response.
pub struct FaultIsolator {
    inspector: Arc<dyn FaultInspector>,
}

impl FaultIsolator {
    /// Creates an isolator reporting to `inspector`.
    #[must_use]
    pub fn new(inspector: Arc<dyn FaultInspector>) -> Self {
        Self { inspector }
    }

    /// Logs and inspects `error`, returning the response answering it.
    #[must_use]
    pub fn convert(
        &self,
        connection: &Connection,
        stream_id: StreamId,
        error: &DispatchError,
    ) -> Response {
        let id = connection.id();
        match error.class() {
            FaultClass::ProtocolViolation => debug!(
                target: PIPELINE_TARGET,
                connection = %id,
                stream = %stream_id,
                %error,
                "protocol violation"
            ),
            FaultClass::Execution => warn!(
                target: PIPELINE_TARGET,
                connection = %id,
                stream = %stream_id,
                %error,
                "request execution failed"
            ),
            FaultClass::Defect => error!(
                target: PIPELINE_TARGET,
                connection = %id,
                stream = %stream_id,
                %error,
                "internal invariant violated"
            ),
            FaultClass::Exhaustion => error!(
                target: PIPELINE_TARGET,
                connection = %id,
                stream = %stream_id,
                %error,
                "resource exhaustion while serving request"
            ),
        }

        if self.inspector.inspect(id, error) == FaultVerdict::Fatal {
            error!(
                target: PIPELINE_TARGET,
                connection = %id,
                %error,
                "fault reported as process-fatal"
            );
        }

        let mut response = error.to_response(stream_id);
        response.attach(Arc::clone(connection.info()));
        response
    }

    /// Converts `error` and queues the response on `sink`.
    ///
    /// Faults raised before a stream could be identified are answered on
    /// stream zero.
    pub fn isolate(
        &self,
        connection: &Connection,
        stream_id: Option<StreamId>,
        error: &DispatchError,
        sink: &ResponseSink,
    ) {
        let stream_id = stream_id.unwrap_or(StreamId::ZERO);
        sink.send(self.convert(connection, stream_id, error));
    }
}

impl std::fmt::Debug for FaultIsolator {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.debug_struct("FaultIsolator").finish_non_exhaustive()
    }
}
