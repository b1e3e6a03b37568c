//! Message kinds carried in the frame header opcode.

use std::fmt;

/// Peer allowed to originate a message kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Sent by the client.
    Request,
    /// Sent by the server.
    Response,
}

/// Message kinds defined by the native protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    /// Error report for a single request.
    Error,
    /// Opens a session and selects per-connection options.
    Startup,
    /// Acknowledges that the connection may issue queries.
    Ready,
    /// Challenges the client to authenticate, naming the authenticator.
    Authenticate,
    /// Protocol v1 username/password map.
    Credentials,
    /// Asks the server which startup options it supports.
    Options,
    /// Lists the supported startup options.
    Supported,
    /// Executes a query string.
    Query,
    /// Outcome of a query, prepare or execute request.
    QueryResult,
    /// Prepares a query for later execution.
    Prepare,
    /// Executes a prepared query.
    Execute,
    /// Subscribes to server events.
    Register,
    /// Server-pushed event.
    Event,
    /// Executes several statements together.
    Batch,
    /// Intermediate SASL challenge.
    AuthChallenge,
    /// Client SASL token.
    AuthResponse,
    /// Final SASL token signalling successful authentication.
    AuthSuccess,
}

impl MessageKind {
    /// Every kind in opcode order.
    pub const ALL: [Self; 17] = [
        Self::Error,
        Self::Startup,
        Self::Ready,
        Self::Authenticate,
        Self::Credentials,
        Self::Options,
        Self::Supported,
        Self::Query,
        Self::QueryResult,
        Self::Prepare,
        Self::Execute,
        Self::Register,
        Self::Event,
        Self::Batch,
        Self::AuthChallenge,
        Self::AuthResponse,
        Self::AuthSuccess,
    ];

    /// Opcode written in the frame header.
    #[must_use]
    pub const fn opcode(self) -> u8 {
        match self {
            Self::Error => 0x00,
            Self::Startup => 0x01,
            Self::Ready => 0x02,
            Self::Authenticate => 0x03,
            Self::Credentials => 0x04,
            Self::Options => 0x05,
            Self::Supported => 0x06,
            Self::Query => 0x07,
            Self::QueryResult => 0x08,
            Self::Prepare => 0x09,
            Self::Execute => 0x0A,
            Self::Register => 0x0B,
            Self::Event => 0x0C,
            Self::Batch => 0x0D,
            Self::AuthChallenge => 0x0E,
            Self::AuthResponse => 0x0F,
            Self::AuthSuccess => 0x10,
        }
    }

    /// Resolves an opcode, returning `None` for values outside the vocabulary.
    #[must_use]
    pub fn from_opcode(opcode: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.opcode() == opcode)
    }

    /// Which peer may send this kind.
    #[must_use]
    pub const fn direction(self) -> Direction {
        match self {
            Self::Startup
            | Self::Credentials
            | Self::Options
            | Self::Query
            | Self::Prepare
            | Self::Execute
            | Self::Register
            | Self::Batch
            | Self::AuthResponse => Direction::Request,
            Self::Error
            | Self::Ready
            | Self::Authenticate
            | Self::Supported
            | Self::QueryResult
            | Self::Event
            | Self::AuthChallenge
            | Self::AuthSuccess => Direction::Response,
        }
    }

    /// Whether clients may send this kind.
    #[must_use]
    pub const fn is_request(self) -> bool {
        matches!(self.direction(), Direction::Request)
    }

    /// Whether the kind belongs to connection setup rather than query traffic.
    #[must_use]
    pub const fn is_handshake(self) -> bool {
        matches!(
            self,
            Self::Startup | Self::Options | Self::Credentials | Self::AuthResponse
        )
    }

    /// Upper-case protocol name used in error messages.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Error => "ERROR",
            Self::Startup => "STARTUP",
            Self::Ready => "READY",
            Self::Authenticate => "AUTHENTICATE",
            Self::Credentials => "CREDENTIALS",
            Self::Options => "OPTIONS",
            Self::Supported => "SUPPORTED",
            Self::Query => "QUERY",
            Self::QueryResult => "RESULT",
            Self::Prepare => "PREPARE",
            Self::Execute => "EXECUTE",
            Self::Register => "REGISTER",
            Self::Event => "EVENT",
            Self::Batch => "BATCH",
            Self::AuthChallenge => "AUTH_CHALLENGE",
            Self::AuthResponse => "AUTH_RESPONSE",
            Self::AuthSuccess => "AUTH_SUCCESS",
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.label())
    }
}
