//! Errors raised while decoding or encoding frames.

use std::io;

use thiserror::Error;

use crate::frame::StreamId;
use crate::kind::MessageKind;
use crate::version::ProtocolVersion;

/// Failures surfaced by the frame and message codecs.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The header names a version outside the negotiable range.
    #[error("Invalid or unsupported protocol version ({version}); supported versions are ({supported})")]
    UnsupportedVersion {
        /// Version number read from the header.
        version: u8,
        /// Human-readable list of accepted versions.
        supported: String,
        /// Stream of the offending frame.
        stream_id: StreamId,
    },
    /// The client sent a frame flagged as a server response.
    #[error("received a response-direction frame from the client")]
    ResponseDirection {
        /// Stream of the offending frame.
        stream_id: StreamId,
    },
    /// The declared body length exceeds the configured ceiling.
    #[error("request body of {length} bytes exceeds the {limit} byte frame limit")]
    FrameTooLarge {
        /// Declared body length.
        length: usize,
        /// Configured ceiling.
        limit: usize,
        /// Stream of the offending frame.
        stream_id: StreamId,
    },
    /// The opcode is outside the protocol vocabulary.
    #[error("unknown opcode 0x{opcode:02x}")]
    UnknownOpcode {
        /// Opcode read from the header.
        opcode: u8,
        /// Stream of the offending frame.
        stream_id: StreamId,
    },
    /// The opcode names a message only servers may send.
    #[error("{kind} is a server-side message and cannot be sent as a request")]
    NotARequest {
        /// Decoded kind.
        kind: MessageKind,
        /// Stream of the offending frame.
        stream_id: StreamId,
    },
    /// A frame used a different version than the one negotiated first.
    #[error("protocol version {received} does not match the negotiated version {negotiated}")]
    VersionMismatch {
        /// Version fixed by the first frame.
        negotiated: ProtocolVersion,
        /// Version carried by this frame.
        received: ProtocolVersion,
        /// Stream of the offending frame.
        stream_id: StreamId,
    },
    /// The message kind does not exist in the frame's protocol version.
    #[error("{kind} is not supported in protocol version {version}")]
    KindNotInVersion {
        /// Decoded kind.
        kind: MessageKind,
        /// Version carried by the frame.
        version: ProtocolVersion,
        /// Stream of the offending frame.
        stream_id: StreamId,
    },
    /// A compressed frame arrived before any compression was negotiated.
    #[error("received a compressed frame but no compression was negotiated")]
    CompressionNotNegotiated {
        /// Stream of the offending frame.
        stream_id: StreamId,
    },
    /// The compression algorithm rejected the body.
    #[error("{algorithm} compression failed: {message}")]
    Compression {
        /// Algorithm name.
        algorithm: &'static str,
        /// Algorithm-specific detail.
        message: String,
        /// Stream of the offending frame.
        stream_id: StreamId,
    },
    /// The body does not match the layout its kind requires.
    #[error("malformed {kind} body: {message}")]
    MalformedBody {
        /// Kind whose body failed to parse.
        kind: MessageKind,
        /// What was wrong with it.
        message: String,
    },
    /// The stream ended inside a frame.
    #[error("connection closed mid-frame after {read} of {expected} bytes")]
    Truncated {
        /// Bytes read so far.
        read: usize,
        /// Bytes the frame required.
        expected: usize,
    },
    /// The underlying transport failed.
    #[error("transport error: {0}")]
    Io(#[from] io::Error),
}

impl CodecError {
    /// Builds a malformed body error.
    pub fn malformed(kind: MessageKind, message: impl Into<String>) -> Self {
        Self::MalformedBody {
            kind,
            message: message.into(),
        }
    }

    /// Stream the failure belongs to, when the header got far enough to tell.
    #[must_use]
    pub fn stream_id(&self) -> Option<StreamId> {
        match self {
            Self::UnsupportedVersion { stream_id, .. }
            | Self::ResponseDirection { stream_id }
            | Self::FrameTooLarge { stream_id, .. }
            | Self::UnknownOpcode { stream_id, .. }
            | Self::NotARequest { stream_id, .. }
            | Self::VersionMismatch { stream_id, .. }
            | Self::KindNotInVersion { stream_id, .. }
            | Self::CompressionNotNegotiated { stream_id }
            | Self::Compression { stream_id, .. } => Some(*stream_id),
            Self::MalformedBody { .. } | Self::Truncated { .. } | Self::Io(_) => None,
        }
    }

    /// Whether the byte stream can no longer be trusted after this error.
    ///
    /// Oversized frames are skipped without buffering, so the stream stays in
    /// sync. Errors detected before the body was consumed leave the body
    /// unread and therefore desynchronise the stream.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::UnsupportedVersion { .. }
            | Self::ResponseDirection { .. }
            | Self::Truncated { .. }
            | Self::Io(_) => true,
            Self::FrameTooLarge { .. }
            | Self::UnknownOpcode { .. }
            | Self::NotARequest { .. }
            | Self::VersionMismatch { .. }
            | Self::KindNotInVersion { .. }
            | Self::CompressionNotNegotiated { .. }
            | Self::Compression { .. }
            | Self::MalformedBody { .. } => false,
        }
    }

    /// Whether the failure came from the transport rather than the peer's bytes.
    #[must_use]
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Io(_) | Self::Truncated { .. })
    }
}
