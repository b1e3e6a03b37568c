//! Native protocol vocabulary for the management socket.
//!
//! This crate owns everything the connection core treats as an external
//! codec: frame headers, message kinds, protocol versions, compression
//! stages, body primitives, pooled body buffers and the request/response
//! envelopes that flow through a connection pipeline.
//!
//! Inbound bytes pass through [`FrameDecoder`], [`FrameDecompressor`] and
//! [`MessageDecoder`] to become a [`Request`]. Outbound [`Response`] values
//! pass through [`MessageEncoder`], [`FrameCompressor`] and [`FrameEncoder`].
//! All stages are stateless and may be shared between connections; per
//! connection facts live in [`ConnectionInfo`].

mod body;
mod buffer;
mod compression;
mod error;
mod frame;
mod kind;
mod message;
mod version;

pub use body::{BodyReader, BodyWriter};
pub use buffer::{FramePool, SourceFrame};
pub use compression::{
    CompressionCatalog, CompressionFailure, Compressor, FrameCompressor, FrameDecompressor,
};
pub use error::CodecError;
pub use frame::{Frame, FrameDecoder, FrameEncoder, FrameFlags, FrameHeader, StreamId};
pub use kind::{Direction, MessageKind};
pub use message::{
    AuthToken, COMPRESSION, CQL_VERSION, ConnectionId, ConnectionInfo, ErrorCode,
    LegacyCredentials, MessageDecoder, MessageEncoder, PROTOCOL_VERSIONS, Request, Response,
    ResponseBody, StartupOptions,
};
pub use version::{ProtocolVersion, ProtocolVersionLimit};
