//! Request and response envelopes plus their body codecs.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, OnceLock};

use bytes::{Bytes, BytesMut};

use crate::body::{BodyReader, BodyWriter};
use crate::buffer::SourceFrame;
use crate::compression::Compressor;
use crate::error::CodecError;
use crate::frame::{Frame, FrameFlags, FrameHeader, StreamId};
use crate::kind::MessageKind;
use crate::version::ProtocolVersion;

/// Startup option naming the query language version.
pub const CQL_VERSION: &str = "CQL_VERSION";
/// Startup option naming the compression algorithm.
pub const COMPRESSION: &str = "COMPRESSION";
/// Supported option listing the negotiable protocol versions.
pub const PROTOCOL_VERSIONS: &str = "PROTOCOL_VERSIONS";

/// Stable identity of one accepted connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Wraps a raw identifier.
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Raw identifier.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "conn-{}", self.0)
    }
}

/// Codec-visible facts about a connection, fixed once negotiated.
#[derive(Debug)]
pub struct ConnectionInfo {
    id: ConnectionId,
    version: OnceLock<ProtocolVersion>,
    compressor: OnceLock<Arc<dyn Compressor>>,
}

impl ConnectionInfo {
    /// Describes a freshly accepted connection.
    #[must_use]
    pub fn new(id: ConnectionId) -> Self {
        Self {
            id,
            version: OnceLock::new(),
            compressor: OnceLock::new(),
        }
    }

    /// Connection identity.
    #[must_use]
    pub const fn id(&self) -> ConnectionId {
        self.id
    }

    /// Version fixed by the first frame, if one has arrived.
    #[must_use]
    pub fn version(&self) -> Option<ProtocolVersion> {
        self.version.get().copied()
    }

    /// Fixes the version on first use and checks it thereafter.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::VersionMismatch`] when `version` differs from
    /// the negotiated one.
    pub fn negotiate_version(
        &self,
        version: ProtocolVersion,
        stream_id: StreamId,
    ) -> Result<ProtocolVersion, CodecError> {
        let negotiated = *self.version.get_or_init(|| version);
        if negotiated != version {
            return Err(CodecError::VersionMismatch {
                negotiated,
                received: version,
                stream_id,
            });
        }
        Ok(negotiated)
    }

    /// Compression algorithm agreed during `STARTUP`.
    #[must_use]
    pub fn compressor(&self) -> Option<&Arc<dyn Compressor>> {
        self.compressor.get()
    }

    /// Records the agreed algorithm; returns `false` if one was already set.
    pub fn set_compressor(&self, algorithm: Arc<dyn Compressor>) -> bool {
        self.compressor.set(algorithm).is_ok()
    }
}

/// A decoded client request.
#[derive(Debug)]
pub struct Request {
    header: FrameHeader,
    body: SourceFrame,
    connection: Arc<ConnectionInfo>,
}

impl Request {
    /// Assembles a request from a decoded frame.
    #[must_use]
    pub fn new(header: FrameHeader, body: SourceFrame, connection: Arc<ConnectionInfo>) -> Self {
        Self {
            header,
            body,
            connection,
        }
    }

    /// Message kind.
    #[must_use]
    pub const fn kind(&self) -> MessageKind {
        self.header.kind
    }

    /// Stream the request arrived on.
    #[must_use]
    pub const fn stream_id(&self) -> StreamId {
        self.header.stream_id
    }

    /// Protocol version of the request frame.
    #[must_use]
    pub const fn version(&self) -> ProtocolVersion {
        self.header.version
    }

    /// Header flags after decompression.
    #[must_use]
    pub const fn flags(&self) -> FrameFlags {
        self.header.flags
    }

    /// Opaque body bytes.
    #[must_use]
    pub fn payload(&self) -> &[u8] {
        self.body.as_slice()
    }

    /// Connection the request arrived on.
    #[must_use]
    pub fn connection(&self) -> &Arc<ConnectionInfo> {
        &self.connection
    }

    /// Returns the body buffer to its pool.
    pub fn release(self) {
        self.body.release();
    }
}

/// Wire error codes used by this server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// Unexpected server-side failure.
    ServerError,
    /// The client broke the protocol.
    ProtocolError,
    /// Authentication failed.
    BadCredentials,
    /// The server refused work because it is saturated.
    Overloaded,
    /// The query failed to parse.
    SyntaxError,
    /// The query is syntactically valid but cannot be executed.
    Invalid,
}

impl ErrorCode {
    /// Code written at the start of an `ERROR` body.
    #[must_use]
    pub const fn code(self) -> i32 {
        match self {
            Self::ServerError => 0x0000,
            Self::ProtocolError => 0x000A,
            Self::BadCredentials => 0x0100,
            Self::Overloaded => 0x1001,
            Self::SyntaxError => 0x2000,
            Self::Invalid => 0x2200,
        }
    }

    /// Resolves a wire code.
    #[must_use]
    pub fn from_code(code: i32) -> Option<Self> {
        [
            Self::ServerError,
            Self::ProtocolError,
            Self::BadCredentials,
            Self::Overloaded,
            Self::SyntaxError,
            Self::Invalid,
        ]
        .into_iter()
        .find(|candidate| candidate.code() == code)
    }
}

/// Typed response payloads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseBody {
    /// Request failed.
    Error {
        /// Wire code.
        code: ErrorCode,
        /// Human-readable description.
        message: String,
    },
    /// Connection is ready for queries.
    Ready,
    /// Client must authenticate with the named authenticator.
    Authenticate {
        /// Fully qualified authenticator name.
        authenticator: String,
    },
    /// Startup options the server accepts.
    Supported(BTreeMap<String, Vec<String>>),
    /// Opaque result produced by the query engine.
    Result(Bytes),
    /// Further SASL round-trip required.
    AuthChallenge(Option<Vec<u8>>),
    /// SASL negotiation completed.
    AuthSuccess(Option<Vec<u8>>),
}

impl ResponseBody {
    /// Message kind written in the header.
    #[must_use]
    pub const fn kind(&self) -> MessageKind {
        match self {
            Self::Error { .. } => MessageKind::Error,
            Self::Ready => MessageKind::Ready,
            Self::Authenticate { .. } => MessageKind::Authenticate,
            Self::Supported(_) => MessageKind::Supported,
            Self::Result(_) => MessageKind::QueryResult,
            Self::AuthChallenge(_) => MessageKind::AuthChallenge,
            Self::AuthSuccess(_) => MessageKind::AuthSuccess,
        }
    }

    fn write(&self, writer: &mut BodyWriter) {
        match self {
            Self::Error { code, message } => {
                writer.int(code.code()).string(message);
            }
            Self::Ready => {}
            Self::Authenticate { authenticator } => {
                writer.string(authenticator);
            }
            Self::Supported(options) => {
                writer.string_multimap(options);
            }
            Self::Result(bytes) => {
                writer.raw(bytes);
            }
            Self::AuthChallenge(token) | Self::AuthSuccess(token) => {
                writer.bytes(token.as_deref());
            }
        }
    }
}

/// A response on its way back to the client.
#[derive(Debug, Clone)]
pub struct Response {
    stream_id: StreamId,
    body: ResponseBody,
    warnings: Vec<String>,
    connection: Option<Arc<ConnectionInfo>>,
}

impl Response {
    /// Wraps a body; the stream is stamped later.
    #[must_use]
    pub fn new(body: ResponseBody) -> Self {
        Self {
            stream_id: StreamId::ZERO,
            body,
            warnings: Vec::new(),
            connection: None,
        }
    }

    /// Builds an `ERROR` response.
    #[must_use]
    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::new(ResponseBody::Error {
            code,
            message: message.into(),
        })
    }

    /// Message kind of the body.
    #[must_use]
    pub const fn kind(&self) -> MessageKind {
        self.body.kind()
    }

    /// Typed body.
    #[must_use]
    pub const fn body(&self) -> &ResponseBody {
        &self.body
    }

    /// Stream the response answers.
    #[must_use]
    pub const fn stream_id(&self) -> StreamId {
        self.stream_id
    }

    /// Stamps the stream the response answers.
    pub fn set_stream_id(&mut self, stream_id: StreamId) {
        self.stream_id = stream_id;
    }

    /// Builder form of [`Response::set_stream_id`].
    #[must_use]
    pub fn with_stream_id(mut self, stream_id: StreamId) -> Self {
        self.stream_id = stream_id;
        self
    }

    /// Warnings captured while producing the response.
    #[must_use]
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    /// Attaches captured warnings.
    pub fn set_warnings(&mut self, warnings: Vec<String>) {
        self.warnings = warnings;
    }

    /// Connection the response belongs to.
    #[must_use]
    pub fn connection(&self) -> Option<&Arc<ConnectionInfo>> {
        self.connection.as_ref()
    }

    /// Attaches the originating connection.
    pub fn attach(&mut self, connection: Arc<ConnectionInfo>) {
        self.connection = Some(connection);
    }
}

/// Inbound stage turning frames into requests.
#[derive(Debug, Clone, Copy, Default)]
pub struct MessageDecoder;

impl MessageDecoder {
    /// Binds `frame` to `connection`, fixing the connection version on first use.
    ///
    /// # Errors
    ///
    /// Fails when the frame changes the negotiated version or sends
    /// `CREDENTIALS` outside protocol v1.
    pub fn decode(
        &self,
        frame: Frame,
        connection: &Arc<ConnectionInfo>,
    ) -> Result<Request, CodecError> {
        let Frame { header, body } = frame;
        connection.negotiate_version(header.version, header.stream_id)?;
        if header.kind == MessageKind::Credentials && !header.version.is_legacy() {
            return Err(CodecError::KindNotInVersion {
                kind: header.kind,
                version: header.version,
                stream_id: header.stream_id,
            });
        }
        Ok(Request::new(header, body, Arc::clone(connection)))
    }
}

/// Outbound stage turning responses into frame bodies.
#[derive(Debug, Clone, Copy, Default)]
pub struct MessageEncoder;

impl MessageEncoder {
    /// Encodes `response` for `version`, returning the header and body.
    ///
    /// Warnings are written only when the version supports them and some
    /// were captured.
    #[must_use]
    pub fn encode(&self, response: &Response, version: ProtocolVersion) -> (FrameHeader, BytesMut) {
        let mut flags = FrameFlags::empty();
        let mut writer = BodyWriter::new();
        if version.supports_warnings() && !response.warnings.is_empty() {
            flags.insert(FrameFlags::WARNING);
            writer.string_list(response.warnings.iter().map(String::as_str));
        }
        response.body.write(&mut writer);
        let header = FrameHeader {
            version,
            flags,
            stream_id: response.stream_id,
            kind: response.kind(),
        };
        (header, writer.finish())
    }
}

/// `STARTUP` option map.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StartupOptions(pub BTreeMap<String, String>);

impl StartupOptions {
    /// Parses a `STARTUP` body.
    ///
    /// # Errors
    ///
    /// Fails when the body is not a string map.
    pub fn decode(payload: &[u8]) -> Result<Self, CodecError> {
        BodyReader::new(MessageKind::Startup, payload)
            .string_map()
            .map(Self)
    }

    /// Encodes the options as a `STARTUP` body.
    #[must_use]
    pub fn encode(&self) -> BytesMut {
        let mut writer = BodyWriter::new();
        writer.string_map(self.0.iter().map(|(key, value)| (key.as_str(), value.as_str())));
        writer.finish()
    }

    /// Requested query language version.
    #[must_use]
    pub fn cql_version(&self) -> Option<&str> {
        self.0.get(CQL_VERSION).map(String::as_str)
    }

    /// Requested compression algorithm.
    #[must_use]
    pub fn compression(&self) -> Option<&str> {
        self.0.get(COMPRESSION).map(String::as_str)
    }
}

/// Legacy `CREDENTIALS` map.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LegacyCredentials(pub BTreeMap<String, String>);

impl LegacyCredentials {
    /// Parses a `CREDENTIALS` body.
    ///
    /// # Errors
    ///
    /// Fails when the body is not a string map.
    pub fn decode(payload: &[u8]) -> Result<Self, CodecError> {
        BodyReader::new(MessageKind::Credentials, payload)
            .string_map()
            .map(Self)
    }
}

/// SASL token carried by `AUTH_RESPONSE`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthToken(pub Option<Vec<u8>>);

impl AuthToken {
    /// Parses an `AUTH_RESPONSE` body.
    ///
    /// # Errors
    ///
    /// Fails when the body is not `[bytes]`.
    pub fn decode(payload: &[u8]) -> Result<Self, CodecError> {
        BodyReader::new(MessageKind::AuthResponse, payload)
            .bytes()
            .map(Self)
    }

    /// Encodes the token as an `AUTH_RESPONSE` body.
    #[must_use]
    pub fn encode(&self) -> BytesMut {
        let mut writer = BodyWriter::new();
        writer.bytes(self.0.as_deref());
        writer.finish()
    }
}
