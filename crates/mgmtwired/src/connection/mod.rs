//! Connection lifecycle: handshake phases, stream contexts, sessions and the
//! per-connection query cap.

mod in_flight;
mod machine;
mod session;
mod state;
mod streams;
mod tracker;

pub use self::in_flight::{InFlightPermit, InFlightQueries};
pub use self::machine::Connection;
pub use self::session::{ClientSession, Identity};
pub use self::state::HandshakeState;
pub use self::streams::{StreamContext, StreamContextTable};
pub use self::tracker::{ConnectionGuard, ConnectionTracker};

pub(crate) const CONNECTION_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::connection");
