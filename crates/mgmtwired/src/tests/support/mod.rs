//! Shared doubles and helpers for the agent test suites.

mod auth;
mod client;
mod config_loader;
mod engine;
mod reporter;
mod requests;
mod world;

pub use auth::{ChallengeAuthenticator, NONCE, PASSWORD, USERNAME};
pub use client::{ClientResponse, TestClient};
pub use engine::{GatedEngine, ScriptedEngine};
pub use reporter::{HealthEvent, RecordingHealthReporter};
pub use requests::{RequestFactory, startup_body};
pub use world::{TestWorld, world};
