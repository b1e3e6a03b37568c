//! BDD test world: loader, reporter, bootstrapped agent and a connected client.

use std::cell::RefCell;
use std::os::unix::net::UnixStream;
use std::sync::Arc;
use std::thread::JoinHandle;

use mgmtwire_protocol::{AuthToken, MessageKind, ProtocolVersion};

use crate::auth::{AllowAllAuthenticator, Authenticator};
use crate::bootstrap::{Agent, BootstrapError, Collaborators, ConfigLoader, bootstrap_with};

use super::auth::{ChallengeAuthenticator, PASSWORD};
use super::client::{ClientResponse, TestClient};
use super::config_loader::{FailingConfigLoader, InvalidConfigLoader, TestConfigLoader};
use super::engine::ScriptedEngine;
use super::reporter::RecordingHealthReporter;
use super::requests::startup_body;

/// Scenario world shared across BDD steps.
pub struct TestWorld {
    loader: Box<dyn ConfigLoader>,
    pub reporter: Arc<RecordingHealthReporter>,
    authenticator: Arc<dyn Authenticator>,
    agent: Option<Agent>,
    bootstrap_error: Option<BootstrapError>,
    client: Option<TestClient>,
    server: Option<JoinHandle<()>>,
}

impl TestWorld {
    /// Builds a world with a successful loader and no authentication.
    #[must_use]
    pub fn new() -> Self {
        Self {
            loader: Box::new(TestConfigLoader::new()),
            reporter: Arc::new(RecordingHealthReporter::default()),
            authenticator: Arc::new(AllowAllAuthenticator),
            agent: None,
            bootstrap_error: None,
            client: None,
            server: None,
        }
    }

    pub fn use_successful_loader(&mut self) {
        self.loader = Box::new(TestConfigLoader::new());
    }

    pub fn use_failing_loader(&mut self) {
        self.loader = Box::new(FailingConfigLoader::new());
    }

    pub fn use_invalid_loader(&mut self) {
        self.loader = Box::new(InvalidConfigLoader);
    }

    pub fn require_authentication(&mut self, required: bool) {
        self.authenticator = if required {
            Arc::new(ChallengeAuthenticator)
        } else {
            Arc::new(AllowAllAuthenticator)
        };
    }

    /// Runs the bootstrap sequence once.
    pub fn bootstrap(&mut self) {
        if self.agent.is_some() || self.bootstrap_error.is_some() {
            return;
        }
        let collaborators = Collaborators::default()
            .with_authenticator(Arc::clone(&self.authenticator))
            .with_query_engine(Arc::new(ScriptedEngine));
        match bootstrap_with(&*self.loader, self.reporter.clone(), collaborators) {
            Ok(agent) => self.agent = Some(agent),
            Err(error) => self.bootstrap_error = Some(error),
        }
    }

    #[must_use]
    pub fn bootstrap_error(&self) -> Option<&BootstrapError> {
        self.bootstrap_error.as_ref()
    }

    #[must_use]
    pub fn agent(&self) -> Option<&Agent> {
        self.agent.as_ref()
    }

    /// Bootstraps if needed and connects a client over a socket pair.
    pub fn connect(&mut self, version: ProtocolVersion) {
        self.bootstrap();
        let agent = self.agent.as_ref().expect("agent bootstrapped");
        let (server, client) = UnixStream::pair().expect("socket pair");
        self.server = Some(agent.serve_connection(server).expect("spawn connection thread"));
        self.client = Some(TestClient::new(client, version));
    }

    pub fn client(&mut self) -> &mut TestClient {
        self.client.as_mut().expect("client connected")
    }

    pub fn send(&mut self, stream: i16, kind: MessageKind, body: &[u8]) {
        self.client().send(stream, kind, body);
    }

    pub fn receive(&mut self) -> ClientResponse {
        self.client().receive()
    }

    /// Runs `STARTUP`, answering any authentication challenge.
    pub fn complete_handshake(&mut self) {
        self.send(1, MessageKind::Startup, &startup_body());
        let response = self.receive();
        if response.kind == MessageKind::Authenticate {
            let opening = AuthToken(Some(Vec::new())).encode();
            self.send(1, MessageKind::AuthResponse, &opening);
            let challenge = self.receive();
            assert_eq!(challenge.kind, MessageKind::AuthChallenge);
            let answer = AuthToken(Some(PASSWORD.as_bytes().to_vec())).encode();
            self.send(1, MessageKind::AuthResponse, &answer);
            let success = self.receive();
            assert_eq!(success.kind, MessageKind::AuthSuccess);
        } else {
            assert_eq!(response.kind, MessageKind::Ready);
        }
    }

    /// Closes the client and waits for the agent to finish the connection.
    pub fn disconnect(&mut self) {
        if let Some(client) = self.client.take() {
            drop(client);
        }
        if let Some(server) = self.server.take() {
            server.join().expect("connection thread finished cleanly");
        }
    }
}

impl Default for TestWorld {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for TestWorld {
    fn drop(&mut self) {
        self.client = None;
        if let Some(server) = self.server.take() {
            drop(server.join());
        }
    }
}

/// Default test world fixture.
#[must_use]
pub fn world() -> RefCell<TestWorld> {
    RefCell::new(TestWorld::new())
}
