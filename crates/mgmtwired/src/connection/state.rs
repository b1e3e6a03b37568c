//! Handshake phases and the rules gating each one.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

use mgmtwire_protocol::{MessageKind, ProtocolVersion};

use crate::dispatch::DispatchError;

/// Connection-level handshake phase.
///
/// Phases are ordered; a connection only ever moves forward through them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum HandshakeState {
    /// No `STARTUP` has been accepted yet.
    Uninitialized = 0,
    /// `STARTUP` demanded authentication and negotiation is under way.
    Authenticating = 1,
    /// The connection may issue queries.
    Ready = 2,
}

impl HandshakeState {
    /// Every phase in order.
    pub const ALL: [Self; 3] = [Self::Uninitialized, Self::Authenticating, Self::Ready];

    const fn from_raw(raw: u8) -> Self {
        match raw {
            0 => Self::Uninitialized,
            1 => Self::Authenticating,
            _ => Self::Ready,
        }
    }

    /// Checks whether `kind` may arrive in this phase.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::ProtocolViolation`] naming the offending kind.
    pub fn permits(self, kind: MessageKind, version: ProtocolVersion) -> Result<(), DispatchError> {
        match self {
            Self::Uninitialized => match kind {
                MessageKind::Startup | MessageKind::Options => Ok(()),
                _ => Err(DispatchError::protocol_violation(format!(
                    "Unexpected message {kind}, expecting {} or {}",
                    MessageKind::Startup,
                    MessageKind::Options
                ))),
            },
            Self::Authenticating => {
                let legacy = version.is_legacy();
                let accepted = kind == MessageKind::AuthResponse
                    || (legacy && kind == MessageKind::Credentials);
                if accepted {
                    return Ok(());
                }
                let expected = if legacy {
                    MessageKind::Credentials
                } else {
                    MessageKind::AuthResponse
                };
                Err(DispatchError::protocol_violation(format!(
                    "Unexpected message {kind}, expecting {expected}"
                )))
            }
            Self::Ready => {
                if kind == MessageKind::Startup {
                    return Err(DispatchError::protocol_violation(format!(
                        "Unexpected message {kind}, the connection is already initialized"
                    )));
                }
                Ok(())
            }
        }
    }

    /// Phase reached after answering `request` with `response`.
    ///
    /// Returns `None` when the phase does not change.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Invariant`] for request kinds that validation
    /// should already have rejected in this phase.
    pub fn transition(
        self,
        request: MessageKind,
        response: MessageKind,
    ) -> Result<Option<Self>, DispatchError> {
        match (self, request) {
            (Self::Uninitialized, MessageKind::Startup) => Ok(match response {
                MessageKind::Authenticate => Some(Self::Authenticating),
                MessageKind::Ready => Some(Self::Ready),
                _ => None,
            }),
            (Self::Uninitialized, MessageKind::Options) | (Self::Ready, _) => Ok(None),
            (Self::Authenticating, MessageKind::AuthResponse | MessageKind::Credentials) => {
                Ok(match response {
                    MessageKind::Ready | MessageKind::AuthSuccess => Some(Self::Ready),
                    _ => None,
                })
            }
            (state, kind) => Err(DispatchError::invariant(format!(
                "{kind} reached the transition step while {state}"
            ))),
        }
    }
}

impl fmt::Display for HandshakeState {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(match self {
            Self::Uninitialized => "UNINITIALIZED",
            Self::Authenticating => "AUTHENTICATING",
            Self::Ready => "READY",
        })
    }
}

/// Atomic holder for a connection's phase that never moves backwards.
#[derive(Debug)]
pub(crate) struct HandshakeCell(AtomicU8);

impl HandshakeCell {
    pub(crate) const fn new() -> Self {
        Self(AtomicU8::new(HandshakeState::Uninitialized as u8))
    }

    pub(crate) fn load(&self) -> HandshakeState {
        HandshakeState::from_raw(self.0.load(Ordering::Acquire))
    }

    /// Moves to `next` unless the cell is already further along, returning
    /// the phase now in effect.
    pub(crate) fn advance_to(&self, next: HandshakeState) -> HandshakeState {
        let previous = HandshakeState::from_raw(self.0.fetch_max(next as u8, Ordering::AcqRel));
        previous.max(next)
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case::startup(MessageKind::Startup)]
    #[case::options(MessageKind::Options)]
    fn uninitialized_accepts_session_openers(#[case] kind: MessageKind) {
        assert!(
            HandshakeState::Uninitialized
                .permits(kind, ProtocolVersion::V4)
                .is_ok()
        );
    }

    #[test]
    fn uninitialized_names_both_expected_kinds() {
        let error = HandshakeState::Uninitialized
            .permits(MessageKind::Query, ProtocolVersion::V4)
            .expect_err("query before startup");
        assert_eq!(
            error.to_string(),
            "Unexpected message QUERY, expecting STARTUP or OPTIONS"
        );
    }

    #[rstest]
    #[case::legacy(ProtocolVersion::V1, "Unexpected message QUERY, expecting CREDENTIALS")]
    #[case::sasl(ProtocolVersion::V4, "Unexpected message QUERY, expecting AUTH_RESPONSE")]
    fn authenticating_label_depends_on_version(
        #[case] version: ProtocolVersion,
        #[case] message: &str,
    ) {
        let error = HandshakeState::Authenticating
            .permits(MessageKind::Query, version)
            .expect_err("query while authenticating");
        assert_eq!(error.to_string(), message);
    }

    #[test]
    fn ready_rejects_a_second_startup() {
        let error = HandshakeState::Ready
            .permits(MessageKind::Startup, ProtocolVersion::V5)
            .expect_err("second startup");
        assert!(error.is_protocol_violation());
        assert!(error.to_string().contains("STARTUP"));
    }

    #[rstest]
    #[case::challenge(MessageKind::Startup, MessageKind::Authenticate, Some(HandshakeState::Authenticating))]
    #[case::ready(MessageKind::Startup, MessageKind::Ready, Some(HandshakeState::Ready))]
    #[case::startup_error(MessageKind::Startup, MessageKind::Error, None)]
    #[case::options(MessageKind::Options, MessageKind::Supported, None)]
    fn uninitialized_transitions(
        #[case] request: MessageKind,
        #[case] response: MessageKind,
        #[case] expected: Option<HandshakeState>,
    ) {
        let next = HandshakeState::Uninitialized
            .transition(request, response)
            .expect("legal transition");
        assert_eq!(next, expected);
    }

    #[rstest]
    #[case::success(MessageKind::AuthResponse, MessageKind::AuthSuccess, Some(HandshakeState::Ready))]
    #[case::legacy_ready(MessageKind::Credentials, MessageKind::Ready, Some(HandshakeState::Ready))]
    #[case::challenge(MessageKind::AuthResponse, MessageKind::AuthChallenge, None)]
    fn authenticating_transitions(
        #[case] request: MessageKind,
        #[case] response: MessageKind,
        #[case] expected: Option<HandshakeState>,
    ) {
        let next = HandshakeState::Authenticating
            .transition(request, response)
            .expect("legal transition");
        assert_eq!(next, expected);
    }

    #[rstest]
    #[case::uninitialized_query(HandshakeState::Uninitialized, MessageKind::Query)]
    #[case::authenticating_startup(HandshakeState::Authenticating, MessageKind::Startup)]
    fn unreachable_pairs_are_invariant_violations(
        #[case] state: HandshakeState,
        #[case] request: MessageKind,
    ) {
        let error = state
            .transition(request, MessageKind::Ready)
            .expect_err("unreachable pair");
        assert!(error.is_defect());
    }

    #[test]
    fn cell_never_moves_backwards() {
        let cell = HandshakeCell::new();
        assert_eq!(cell.advance_to(HandshakeState::Ready), HandshakeState::Ready);
        assert_eq!(
            cell.advance_to(HandshakeState::Authenticating),
            HandshakeState::Ready
        );
        assert_eq!(cell.load(), HandshakeState::Ready);
    }
}
