//! Error types for request dispatch failures.
//!
//! Every failure that can occur between decoding a request and emitting its
//! response is expressed as a [`DispatchError`]. Each variant belongs to one
//! [`FaultClass`], which decides how loudly it is logged, and maps to the wire
//! [`ErrorCode`] the client receives.

use std::any::Any;
use std::io;

use mgmtwire_protocol::{CodecError, ErrorCode, Response, StreamId};
use thiserror::Error;

use crate::auth::AuthenticationError;

/// Errors surfaced while dispatching a request.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// Message illegal in the connection's current handshake phase.
    #[error("{message}")]
    ProtocolViolation {
        /// Client-visible description.
        message: String,
    },

    /// Frame or body could not be decoded.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// The execution collaborator failed.
    #[error("{message}")]
    Execution {
        /// Wire code reported to the client.
        code: ErrorCode,
        /// Client-visible description.
        message: String,
    },

    /// Authentication was rejected.
    #[error("{0}")]
    Authentication(#[from] AuthenticationError),

    /// An unreachable state was reached inside the agent.
    #[error("internal invariant violated: {message}")]
    Invariant {
        /// What went wrong.
        message: String,
    },

    /// The host can no longer provide resources to serve requests.
    #[error("resource exhausted: {message}")]
    ResourceExhausted {
        /// What ran out.
        message: String,
    },
}

/// How a failure is logged and whether it implicates the agent itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultClass {
    /// The client sent something it should not have.
    ProtocolViolation,
    /// Executing the request failed.
    Execution,
    /// The agent broke one of its own invariants.
    Defect,
    /// The host is running out of resources.
    Exhaustion,
}

impl DispatchError {
    /// Creates a protocol violation.
    pub fn protocol_violation(message: impl Into<String>) -> Self {
        Self::ProtocolViolation {
            message: message.into(),
        }
    }

    /// Creates an execution failure with an explicit wire code.
    pub fn execution(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Execution {
            code,
            message: message.into(),
        }
    }

    /// Creates an invariant violation.
    pub fn invariant(message: impl Into<String>) -> Self {
        Self::Invariant {
            message: message.into(),
        }
    }

    /// Creates a resource exhaustion error.
    pub fn resource_exhausted(message: impl Into<String>) -> Self {
        Self::ResourceExhausted {
            message: message.into(),
        }
    }

    /// Converts a caught panic payload into an execution failure.
    #[must_use]
    pub fn from_panic(payload: &(dyn Any + Send)) -> Self {
        let detail = payload
            .downcast_ref::<&str>()
            .map(|message| (*message).to_owned())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_owned());
        Self::execution(ErrorCode::ServerError, format!("unexpected fault: {detail}"))
    }

    /// Logging and inspection class.
    #[must_use]
    pub fn class(&self) -> FaultClass {
        match self {
            Self::ProtocolViolation { .. } => FaultClass::ProtocolViolation,
            Self::Codec(error) if error.is_transport() => match error {
                CodecError::Io(source) if source.kind() == io::ErrorKind::OutOfMemory => {
                    FaultClass::Exhaustion
                }
                _ => FaultClass::Execution,
            },
            Self::Codec(_) => FaultClass::ProtocolViolation,
            Self::Execution { .. } | Self::Authentication(_) => FaultClass::Execution,
            Self::Invariant { .. } => FaultClass::Defect,
            Self::ResourceExhausted { .. } => FaultClass::Exhaustion,
        }
    }

    /// Whether this is a client protocol violation.
    #[must_use]
    pub fn is_protocol_violation(&self) -> bool {
        self.class() == FaultClass::ProtocolViolation
    }

    /// Whether this signals a bug in the agent rather than client misbehaviour.
    #[must_use]
    pub fn is_defect(&self) -> bool {
        self.class() == FaultClass::Defect
    }

    /// Wire error code for the client.
    #[must_use]
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::ProtocolViolation { .. } => ErrorCode::ProtocolError,
            Self::Codec(error) if error.is_transport() => ErrorCode::ServerError,
            Self::Codec(_) => ErrorCode::ProtocolError,
            Self::Execution { code, .. } => *code,
            Self::Authentication(_) => ErrorCode::BadCredentials,
            Self::Invariant { .. } | Self::ResourceExhausted { .. } => ErrorCode::ServerError,
        }
    }

    /// Builds the `ERROR` response answering `stream_id`.
    #[must_use]
    pub fn to_response(&self, stream_id: StreamId) -> Response {
        Response::error(self.error_code(), self.to_string()).with_stream_id(stream_id)
    }
}

#[cfg(test)]
mod tests {
    use std::panic;

    use mgmtwire_protocol::{MessageKind, ResponseBody};
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case::violation(DispatchError::protocol_violation("bad"), ErrorCode::ProtocolError, FaultClass::ProtocolViolation)]
    #[case::execution(DispatchError::execution(ErrorCode::Invalid, "no table"), ErrorCode::Invalid, FaultClass::Execution)]
    #[case::auth(DispatchError::from(AuthenticationError::new("denied")), ErrorCode::BadCredentials, FaultClass::Execution)]
    #[case::invariant(DispatchError::invariant("oops"), ErrorCode::ServerError, FaultClass::Defect)]
    #[case::exhausted(DispatchError::resource_exhausted("memory"), ErrorCode::ServerError, FaultClass::Exhaustion)]
    #[case::malformed(
        DispatchError::from(CodecError::malformed(MessageKind::Startup, "short")),
        ErrorCode::ProtocolError,
        FaultClass::ProtocolViolation
    )]
    #[case::out_of_memory(
        DispatchError::from(CodecError::Io(io::Error::from(io::ErrorKind::OutOfMemory))),
        ErrorCode::ServerError,
        FaultClass::Exhaustion
    )]
    fn errors_map_to_codes_and_classes(
        #[case] error: DispatchError,
        #[case] code: ErrorCode,
        #[case] class: FaultClass,
    ) {
        assert_eq!(error.error_code(), code);
        assert_eq!(error.class(), class);
    }

    fn explode() {
        panic!("engine blew up");
    }

    fn explode_with(code: i32) {
        panic!("engine failed with {code}");
    }

    #[test]
    fn panic_payloads_become_server_errors() {
        let payload = panic::catch_unwind(explode).expect_err("must panic");
        let error = DispatchError::from_panic(payload.as_ref());
        assert_eq!(error.error_code(), ErrorCode::ServerError);
        assert_eq!(error.to_string(), "unexpected fault: engine blew up");
    }

    #[test]
    fn formatted_panic_payloads_keep_their_message() {
        let payload = panic::catch_unwind(|| explode_with(7)).expect_err("must panic");
        let error = DispatchError::from_panic(payload.as_ref());
        assert_eq!(error.to_string(), "unexpected fault: engine failed with 7");
    }

    #[test]
    fn responses_carry_the_stream_and_message() {
        let response = DispatchError::protocol_violation("nope").to_response(StreamId::new(9));
        assert_eq!(response.stream_id(), StreamId::new(9));
        assert_eq!(
            response.body(),
            &ResponseBody::Error {
                code: ErrorCode::ProtocolError,
                message: "nope".to_owned(),
            }
        );
    }
}
