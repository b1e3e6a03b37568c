//! Request dispatch: validation, execution and response construction.
//!
//! Every decoded [`Request`](mgmtwire_protocol::Request) passes through
//! [`RequestDispatcher::dispatch`], which guarantees one response and one
//! buffer release per request. Handshake traffic runs inline on the
//! connection thread so phase transitions apply in arrival order; query
//! traffic on a ready connection is handed to the [`ExecutionPool`], with
//! each connection capped on how many of its queries may be unanswered.

mod errors;
mod executor;
mod handler;
mod pool;
mod warnings;

pub use self::errors::{DispatchError, FaultClass};
pub use self::executor::{
    DEFAULT_CQL_VERSION, ExecutionContext, Executor, MessageExecutor, NoQueryEngine, QueryEngine,
    QueryError,
};
pub use self::handler::RequestDispatcher;
pub use self::pool::{ExecutionPool, JobHandler, PoolError, PoolStopped};
pub use self::warnings::WarningsCapture;

pub(crate) const DISPATCH_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::dispatch");
