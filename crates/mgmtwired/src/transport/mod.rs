//! Stream abstractions consumed by the pipeline.
//!
//! Accepting and binding sockets belongs to the host process; this module only
//! describes what an already-accepted connection must offer.

mod handler;

pub use self::handler::{ConnectionHandler, ConnectionStream};

pub(crate) const TRANSPORT_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::transport");
