//! The sequential read loop bound to one connection.

use std::io::Read;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;

use mgmtwire_protocol::{CodecError, Request};
use tracing::{debug, error};

use super::PIPELINE_TARGET;
use super::assembler::CodecStages;
use super::fault::FaultIsolator;
use super::output::{ResponseSink, write_responses};
use crate::connection::Connection;
use crate::dispatch::{DispatchError, FaultClass, RequestDispatcher};
use crate::telemetry;
use crate::transport::ConnectionStream;

/// Stages bound to one connection.
///
/// Requests are read, decoded and dispatched in arrival order on the calling
/// thread. Responses leave through a single writer thread.
pub(crate) struct ConnectionPipeline {
    stages: Arc<CodecStages>,
    dispatcher: Arc<RequestDispatcher>,
    isolator: Arc<FaultIsolator>,
    connection: Arc<Connection>,
}

impl ConnectionPipeline {
    pub(crate) fn new(
        stages: Arc<CodecStages>,
        dispatcher: Arc<RequestDispatcher>,
        isolator: Arc<FaultIsolator>,
        connection: Arc<Connection>,
    ) -> Self {
        Self {
            stages,
            dispatcher,
            isolator,
            connection,
        }
    }

    pub(crate) fn run<S: ConnectionStream>(self, mut reader: S, writer: S::Writer) {
        let id = self.connection.id();
        let span = telemetry::connection_span(id);
        let _entered = span.clone().entered();
        let (sink, receiver) = ResponseSink::channel();
        let stages = Arc::clone(&self.stages);
        let info = Arc::clone(self.connection.info());
        let spawned = thread::Builder::new()
            .name(format!("mgmtwire-out-{}", id.get()))
            .spawn(move || {
                let _entered = span.entered();
                let mut writer = writer;
                write_responses(&stages, &info, &receiver, &mut writer);
            });
        let output = match spawned {
            Ok(handle) => handle,
            Err(error) => {
                error!(
                    target: PIPELINE_TARGET,
                    connection = %id,
                    %error,
                    "failed to start connection writer"
                );
                reader.close();
                return;
            }
        };

        self.read_loop(&mut reader, &sink);

        // Queued requests hold their own sink clones, so the writer keeps
        // running until the last of them has answered.
        drop(sink);
        if output.join().is_err() {
            error!(target: PIPELINE_TARGET, connection = %id, "connection writer panicked");
        }
        reader.close();
    }

    fn read_loop<R: Read>(&self, reader: &mut R, sink: &ResponseSink) {
        loop {
            match self.read_request(reader) {
                Ok(Some(request)) => self.dispatch(request, sink),
                Ok(None) => {
                    debug!(
                        target: PIPELINE_TARGET,
                        connection = %self.connection.id(),
                        "peer closed the connection"
                    );
                    return;
                }
                Err(error) => {
                    if self.isolate_codec_error(error, sink) {
                        return;
                    }
                }
            }
        }
    }

    fn read_request<R: Read>(&self, reader: &mut R) -> Result<Option<Request>, CodecError> {
        let info = self.connection.info();
        let Some(mut frame) = self.stages.decoder.read_frame(reader)? else {
            return Ok(None);
        };
        self.stages.decompressor.apply(&mut frame, info.compressor())?;
        self.stages.message_decoder.decode(frame, info).map(Some)
    }

    fn dispatch(&self, request: Request, sink: &ResponseSink) {
        let stream_id = request.stream_id();
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            self.dispatcher.dispatch(&self.connection, request, sink);
        }));
        if let Err(payload) = outcome {
            let error = DispatchError::from_panic(payload.as_ref());
            self.isolator
                .isolate(&self.connection, Some(stream_id), &error, sink);
        }
    }

    /// Answers a decode failure, returning whether the loop must stop.
    fn isolate_codec_error(&self, error: CodecError, sink: &ResponseSink) -> bool {
        let fatal = error.is_fatal();
        let transport = error.is_transport();
        let stream_id = error.stream_id();
        let error = DispatchError::from(error);
        if transport && error.class() != FaultClass::Exhaustion {
            debug!(
                target: PIPELINE_TARGET,
                connection = %self.connection.id(),
                %error,
                "connection input failed"
            );
        } else {
            self.isolator
                .isolate(&self.connection, stream_id, &error, sink);
        }
        fatal
    }
}
