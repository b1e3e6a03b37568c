//! Authenticator double running one challenge round.

use std::collections::BTreeMap;

use crate::auth::{AuthenticationError, Authenticator, SaslNegotiator};
use crate::connection::Identity;

pub const USERNAME: &str = "operator";
pub const PASSWORD: &str = "secret";
pub const NONCE: &[u8] = b"nonce";

/// Requires authentication; the first token is answered with a challenge and
/// the second must be the password.
#[derive(Debug, Default, Clone, Copy)]
pub struct ChallengeAuthenticator;

impl Authenticator for ChallengeAuthenticator {
    fn name(&self) -> &str {
        "ChallengeAuthenticator"
    }

    fn requires_authentication(&self) -> bool {
        true
    }

    fn initial_identity(&self) -> Identity {
        Identity::Anonymous
    }

    fn new_negotiator(&self) -> Box<dyn SaslNegotiator> {
        Box::new(ChallengeNegotiator::default())
    }

    fn legacy_authenticate(
        &self,
        credentials: &BTreeMap<String, String>,
    ) -> Result<Identity, AuthenticationError> {
        let username = credentials.get("username").map(String::as_str);
        let password = credentials.get("password").map(String::as_str);
        if username == Some(USERNAME) && password == Some(PASSWORD) {
            Ok(Identity::User(USERNAME.to_owned()))
        } else {
            Err(AuthenticationError::new("Provided username and/or password are incorrect"))
        }
    }
}

#[derive(Debug, Default)]
struct ChallengeNegotiator {
    challenged: bool,
    complete: bool,
}

impl SaslNegotiator for ChallengeNegotiator {
    fn evaluate_response(&mut self, token: &[u8]) -> Result<Option<Vec<u8>>, AuthenticationError> {
        if !self.challenged {
            self.challenged = true;
            return Ok(Some(NONCE.to_vec()));
        }
        if token != PASSWORD.as_bytes() {
            return Err(AuthenticationError::new("Provided password is incorrect"));
        }
        self.complete = true;
        Ok(None)
    }

    fn is_complete(&self) -> bool {
        self.complete
    }

    fn authenticated_identity(&self) -> Result<Identity, AuthenticationError> {
        if self.complete {
            Ok(Identity::User(USERNAME.to_owned()))
        } else {
            Err(AuthenticationError::new("authentication has not completed"))
        }
    }
}
