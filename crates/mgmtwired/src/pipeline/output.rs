//! Response output: the per-connection channel and the writer loop that
//! drains it.

use std::io::Write;

use crossbeam_channel::{Receiver, Sender, unbounded};
use mgmtwire_protocol::{CodecError, ConnectionInfo, ErrorCode, Response};
use tracing::{debug, warn};

use super::PIPELINE_TARGET;
use super::assembler::CodecStages;

/// Handle through which dispatch stages emit responses for one connection.
///
/// Clones share the same connection output; responses are written in the
/// order they are sent.
#[derive(Debug, Clone)]
pub struct ResponseSink {
    sender: Sender<Response>,
}

impl ResponseSink {
    /// Creates a sink and the receiver the writer drains.
    #[must_use]
    pub fn channel() -> (Self, Receiver<Response>) {
        let (sender, receiver) = unbounded();
        (Self { sender }, receiver)
    }

    /// Queues `response` for writing.
    ///
    /// Responses sent after the writer has stopped are dropped; the peer is
    /// gone at that point.
    pub fn send(&self, response: Response) {
        if let Err(error) = self.sender.send(response) {
            let response = error.into_inner();
            debug!(
                target: PIPELINE_TARGET,
                stream = %response.stream_id(),
                kind = %response.kind(),
                "connection output closed, dropping response"
            );
        }
    }
}

/// Encodes and writes responses until every sink is dropped or the socket
/// fails.
pub(crate) fn write_responses<W: Write>(
    stages: &CodecStages,
    info: &ConnectionInfo,
    receiver: &Receiver<Response>,
    writer: &mut W,
) {
    for response in receiver {
        if let Err(error) = write_response(stages, info, &response, writer) {
            if error.is_transport() {
                debug!(
                    target: PIPELINE_TARGET,
                    connection = %info.id(),
                    %error,
                    "connection output failed"
                );
                return;
            }
            warn!(
                target: PIPELINE_TARGET,
                connection = %info.id(),
                stream = %response.stream_id(),
                %error,
                "failed to encode response"
            );
            let fallback = Response::error(ErrorCode::ServerError, error.to_string())
                .with_stream_id(response.stream_id());
            if let Err(error) = write_response(stages, info, &fallback, writer) {
                debug!(
                    target: PIPELINE_TARGET,
                    connection = %info.id(),
                    %error,
                    "failed to write fallback error response"
                );
                return;
            }
        }
    }
}

fn write_response<W: Write>(
    stages: &CodecStages,
    info: &ConnectionInfo,
    response: &Response,
    writer: &mut W,
) -> Result<(), CodecError> {
    let version = info.version().unwrap_or_else(|| stages.limit.max());
    let (mut header, body) = stages.message_encoder.encode(response, version);
    let body = stages
        .compressor
        .apply(&mut header.flags, body, header.stream_id, info.compressor())?;
    stages.frame_encoder.write_frame(writer, &header, &body)
}
