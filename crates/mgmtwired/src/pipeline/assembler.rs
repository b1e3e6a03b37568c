//! Builds the stage sequence for each accepted connection.

use std::sync::Arc;

use mgmtwire_protocol::{
    FrameCompressor, FrameDecoder, FrameDecompressor, FrameEncoder, FramePool, MessageDecoder,
    MessageEncoder, ProtocolVersionLimit,
};
use tracing::{debug, warn};

use super::PIPELINE_TARGET;
use super::connection::ConnectionPipeline;
use super::fault::FaultIsolator;
use crate::auth::Authenticator;
use crate::connection::{ClientSession, Connection, ConnectionTracker};
use crate::dispatch::RequestDispatcher;
use crate::transport::{ConnectionHandler, ConnectionStream};

/// Stateless codec stages shared by every connection.
#[derive(Debug)]
pub struct CodecStages {
    pub(crate) decoder: FrameDecoder,
    pub(crate) decompressor: FrameDecompressor,
    pub(crate) message_decoder: MessageDecoder,
    pub(crate) message_encoder: MessageEncoder,
    pub(crate) compressor: FrameCompressor,
    pub(crate) frame_encoder: FrameEncoder,
    pub(crate) limit: ProtocolVersionLimit,
}

impl CodecStages {
    /// Builds the stages for a version ceiling and frame body limit.
    #[must_use]
    pub fn new(limit: ProtocolVersionLimit, max_frame_bytes: usize, frames: FramePool) -> Self {
        Self {
            decoder: FrameDecoder::new(limit, max_frame_bytes, frames),
            decompressor: FrameDecompressor,
            message_decoder: MessageDecoder,
            message_encoder: MessageEncoder,
            compressor: FrameCompressor,
            frame_encoder: FrameEncoder::responses(),
            limit,
        }
    }

    /// Buffer pool backing decoded frame bodies.
    #[must_use]
    pub fn frame_pool(&self) -> &FramePool {
        self.decoder.pool()
    }
}

/// Assembles and runs a pipeline for every connection it is handed.
pub struct PipelineAssembler {
    stages: Arc<CodecStages>,
    dispatcher: Arc<RequestDispatcher>,
    isolator: Arc<FaultIsolator>,
    tracker: Arc<ConnectionTracker>,
    authenticator: Arc<dyn Authenticator>,
}

impl PipelineAssembler {
    /// Creates an assembler around shared stages and collaborators.
    #[must_use]
    pub fn new(
        stages: CodecStages,
        dispatcher: Arc<RequestDispatcher>,
        isolator: Arc<FaultIsolator>,
        tracker: Arc<ConnectionTracker>,
        authenticator: Arc<dyn Authenticator>,
    ) -> Self {
        Self {
            stages: Arc::new(stages),
            dispatcher,
            isolator,
            tracker,
            authenticator,
        }
    }

    /// Shared codec stages.
    #[must_use]
    pub fn stages(&self) -> &CodecStages {
        &self.stages
    }

    /// Connection accounting.
    #[must_use]
    pub fn tracker(&self) -> &ConnectionTracker {
        &self.tracker
    }

    fn assemble(&self, connection: Connection) -> ConnectionPipeline {
        ConnectionPipeline::new(
            Arc::clone(&self.stages),
            Arc::clone(&self.dispatcher),
            Arc::clone(&self.isolator),
            Arc::new(connection),
        )
    }
}

impl ConnectionHandler for PipelineAssembler {
    fn handle<S: ConnectionStream>(&self, stream: S) {
        let guard = self.tracker.open();
        let (reader, writer) = match stream.split() {
            Ok(halves) => halves,
            Err(error) => {
                warn!(
                    target: PIPELINE_TARGET,
                    connection = %guard.id(),
                    %error,
                    "failed to split connection stream"
                );
                return;
            }
        };
        let session = ClientSession::new(self.authenticator.initial_identity());
        let pipeline = self.assemble(Connection::new(guard.id(), session));
        debug!(target: PIPELINE_TARGET, connection = %guard.id(), "connection pipeline assembled");
        pipeline.run(reader, writer);
        debug!(target: PIPELINE_TARGET, connection = %guard.id(), "connection pipeline finished");
    }
}

impl std::fmt::Debug for PipelineAssembler {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("PipelineAssembler")
            .field("stages", &self.stages)
            .field("dispatcher", &self.dispatcher)
            .field("tracker", &self.tracker)
            .finish_non_exhaustive()
    }
}
