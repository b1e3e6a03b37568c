//! Per-connection processing pipeline.
//!
//! The [`PipelineAssembler`] binds a fixed stage order to every accepted
//! connection: frame decoding, decompression, message decoding, dispatch,
//! then message encoding, compression and frame encoding on the writer
//! thread, with the [`FaultIsolator`] last. Codec stages are stateless and
//! shared; the connection state machine is built fresh for each socket.

mod assembler;
mod connection;
mod fault;
mod output;

pub use self::assembler::{CodecStages, PipelineAssembler};
pub use self::fault::FaultIsolator;
pub use self::output::ResponseSink;

pub(crate) const PIPELINE_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::pipeline");
