//! Per-connection handshake state machine.

use std::sync::Arc;

use mgmtwire_protocol::{ConnectionId, ConnectionInfo, MessageKind, ProtocolVersion, StreamId};
use tracing::debug;

use super::CONNECTION_TARGET;
use super::in_flight::InFlightQueries;
use super::session::ClientSession;
use super::state::{HandshakeCell, HandshakeState};
use super::streams::{StreamContext, StreamContextTable};
use crate::dispatch::DispatchError;

/// One accepted connection: identity, handshake phase and stream contexts.
///
/// A connection is built fresh for every accepted socket and is never shared
/// between sockets.
#[derive(Debug)]
pub struct Connection {
    info: Arc<ConnectionInfo>,
    state: HandshakeCell,
    streams: StreamContextTable,
    session: Arc<ClientSession>,
    in_flight: Arc<InFlightQueries>,
}

impl Connection {
    /// Creates a connection in the `UNINITIALIZED` phase.
    #[must_use]
    pub fn new(id: ConnectionId, session: ClientSession) -> Self {
        Self {
            info: Arc::new(ConnectionInfo::new(id)),
            state: HandshakeCell::new(),
            streams: StreamContextTable::default(),
            session: Arc::new(session),
            in_flight: Arc::default(),
        }
    }

    /// Connection identity.
    #[must_use]
    pub fn id(&self) -> ConnectionId {
        self.info.id()
    }

    /// Codec-visible connection facts.
    #[must_use]
    pub fn info(&self) -> &Arc<ConnectionInfo> {
        &self.info
    }

    /// Current handshake phase.
    #[must_use]
    pub fn state(&self) -> HandshakeState {
        self.state.load()
    }

    /// Session shared by every stream.
    #[must_use]
    pub fn session(&self) -> &Arc<ClientSession> {
        &self.session
    }

    /// Stream contexts created so far.
    #[must_use]
    pub fn streams(&self) -> &StreamContextTable {
        &self.streams
    }

    /// Queries handed to the execution pool and not yet answered.
    #[must_use]
    pub fn in_flight(&self) -> &Arc<InFlightQueries> {
        &self.in_flight
    }

    /// Gates `kind` against the current phase and resolves the stream context.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::ProtocolViolation`] when `kind` is illegal in
    /// the current phase.
    pub fn validate(
        &self,
        kind: MessageKind,
        version: ProtocolVersion,
        stream_id: StreamId,
    ) -> Result<Arc<StreamContext>, DispatchError> {
        self.state().permits(kind, version)?;
        Ok(self.streams.get_or_create(stream_id, &self.session))
    }

    /// Applies the phase change implied by answering `request` with `response`.
    ///
    /// Returns the phase in effect afterwards.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Invariant`] when `request` could not have
    /// passed validation in the current phase.
    pub fn advance(
        &self,
        request: MessageKind,
        response: MessageKind,
    ) -> Result<HandshakeState, DispatchError> {
        let current = self.state();
        let Some(next) = current.transition(request, response)? else {
            return Ok(current);
        };
        let reached = self.state.advance_to(next);
        debug!(
            target: CONNECTION_TARGET,
            connection = %self.id(),
            from = %current,
            to = %reached,
            request = %request,
            response = %response,
            "handshake advanced"
        );
        Ok(reached)
    }
}
