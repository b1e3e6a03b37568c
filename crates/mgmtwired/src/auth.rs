//! Authentication collaborator contracts.
//!
//! The agent never implements a credential backend itself. It asks an
//! [`Authenticator`] whether `STARTUP` must be followed by authentication and,
//! if so, drives the SASL exchange through per-connection negotiators.

use std::collections::BTreeMap;
use std::sync::Arc;

use thiserror::Error;

use crate::connection::Identity;

/// Authentication failure reported to the client as bad credentials.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct AuthenticationError {
    message: String,
}

impl AuthenticationError {
    /// Builds an error with a client-visible message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// One SASL exchange.
pub trait SaslNegotiator: Send {
    /// Consumes a client token, returning the next challenge if any.
    ///
    /// # Errors
    ///
    /// Returns [`AuthenticationError`] when the token is rejected.
    fn evaluate_response(&mut self, token: &[u8]) -> Result<Option<Vec<u8>>, AuthenticationError>;

    /// Whether the exchange has finished.
    fn is_complete(&self) -> bool;

    /// Principal established by a completed exchange.
    ///
    /// # Errors
    ///
    /// Returns [`AuthenticationError`] when called before completion.
    fn authenticated_identity(&self) -> Result<Identity, AuthenticationError>;
}

/// Authentication backend consulted during the handshake.
pub trait Authenticator: Send + Sync {
    /// Name announced in `AUTHENTICATE`.
    fn name(&self) -> &str;

    /// Whether `STARTUP` must be followed by authentication.
    fn requires_authentication(&self) -> bool;

    /// Principal a connection acts as before any login.
    fn initial_identity(&self) -> Identity;

    /// Starts a SASL exchange.
    fn new_negotiator(&self) -> Box<dyn SaslNegotiator>;

    /// Authenticates a protocol v1 `CREDENTIALS` map.
    ///
    /// # Errors
    ///
    /// Returns [`AuthenticationError`] when the credentials are rejected.
    fn legacy_authenticate(
        &self,
        credentials: &BTreeMap<String, String>,
    ) -> Result<Identity, AuthenticationError>;
}

impl<T> Authenticator for Arc<T>
where
    T: Authenticator + ?Sized,
{
    fn name(&self) -> &str {
        (**self).name()
    }

    fn requires_authentication(&self) -> bool {
        (**self).requires_authentication()
    }

    fn initial_identity(&self) -> Identity {
        (**self).initial_identity()
    }

    fn new_negotiator(&self) -> Box<dyn SaslNegotiator> {
        (**self).new_negotiator()
    }

    fn legacy_authenticate(
        &self,
        credentials: &BTreeMap<String, String>,
    ) -> Result<Identity, AuthenticationError> {
        (**self).legacy_authenticate(credentials)
    }
}

/// Grants every local connection internal access without a login.
#[derive(Debug, Default, Clone, Copy)]
pub struct AllowAllAuthenticator;

impl Authenticator for AllowAllAuthenticator {
    fn name(&self) -> &str {
        "AllowAllAuthenticator"
    }

    fn requires_authentication(&self) -> bool {
        false
    }

    fn initial_identity(&self) -> Identity {
        Identity::Internal
    }

    fn new_negotiator(&self) -> Box<dyn SaslNegotiator> {
        Box::new(AllowAllNegotiator)
    }

    fn legacy_authenticate(
        &self,
        _credentials: &BTreeMap<String, String>,
    ) -> Result<Identity, AuthenticationError> {
        Ok(Identity::Internal)
    }
}

#[derive(Debug)]
struct AllowAllNegotiator;

impl SaslNegotiator for AllowAllNegotiator {
    fn evaluate_response(&mut self, _token: &[u8]) -> Result<Option<Vec<u8>>, AuthenticationError> {
        Ok(None)
    }

    fn is_complete(&self) -> bool {
        true
    }

    fn authenticated_identity(&self) -> Result<Identity, AuthenticationError> {
        Ok(Identity::Internal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allow_all_completes_in_one_round() {
        let authenticator = AllowAllAuthenticator;
        assert!(!authenticator.requires_authentication());
        let mut negotiator = authenticator.new_negotiator();
        assert_eq!(negotiator.evaluate_response(b"anything"), Ok(None));
        assert!(negotiator.is_complete());
        assert_eq!(negotiator.authenticated_identity(), Ok(Identity::Internal));
    }

    #[test]
    fn arc_wrapped_authenticators_delegate() {
        let authenticator: Arc<AllowAllAuthenticator> = Arc::new(AllowAllAuthenticator);
        assert_eq!(authenticator.name(), "AllowAllAuthenticator");
        assert_eq!(
            authenticator.legacy_authenticate(&BTreeMap::new()),
            Ok(Identity::Internal)
        );
    }
}
