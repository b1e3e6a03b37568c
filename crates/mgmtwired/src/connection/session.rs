//! Authentication state shared by every stream of a connection.

use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError, RwLock};

use crate::auth::SaslNegotiator;

/// Principal a connection acts as.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Identity {
    /// Not yet authenticated.
    Anonymous,
    /// Trusted local management access.
    Internal,
    /// Authenticated user.
    User(String),
}

impl fmt::Display for Identity {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Anonymous => formatter.write_str("anonymous"),
            Self::Internal => formatter.write_str("internal"),
            Self::User(name) => write!(formatter, "user:{name}"),
        }
    }
}

/// Session identity and in-flight SASL negotiation for one connection.
pub struct ClientSession {
    identity: RwLock<Identity>,
    negotiator: Mutex<Option<Box<dyn SaslNegotiator>>>,
}

impl ClientSession {
    /// Starts a session acting as `identity`.
    #[must_use]
    pub fn new(identity: Identity) -> Self {
        Self {
            identity: RwLock::new(identity),
            negotiator: Mutex::new(None),
        }
    }

    /// Current principal.
    #[must_use]
    pub fn identity(&self) -> Identity {
        self.identity
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Records a successful login.
    pub fn login(&self, identity: Identity) {
        *self
            .identity
            .write()
            .unwrap_or_else(PoisonError::into_inner) = identity;
    }

    /// Exclusive access to the SASL negotiator slot.
    pub(crate) fn negotiator(&self) -> MutexGuard<'_, Option<Box<dyn SaslNegotiator>>> {
        self.negotiator
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for ClientSession {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("ClientSession")
            .field("identity", &self.identity())
            .finish_non_exhaustive()
    }
}
