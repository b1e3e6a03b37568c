//! Lazily created per-stream execution contexts.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use mgmtwire_protocol::StreamId;

use super::session::{ClientSession, Identity};

/// Execution state for one stream of a connection.
///
/// A context is created the first time its stream id is seen and then reused
/// by every later request on that stream.
#[derive(Debug)]
pub struct StreamContext {
    stream_id: StreamId,
    session: Arc<ClientSession>,
    executions: AtomicU64,
}

impl StreamContext {
    fn new(stream_id: StreamId, session: Arc<ClientSession>) -> Self {
        Self {
            stream_id,
            session,
            executions: AtomicU64::new(0),
        }
    }

    /// Stream this context serves.
    #[must_use]
    pub const fn stream_id(&self) -> StreamId {
        self.stream_id
    }

    /// Session inherited from the connection.
    #[must_use]
    pub fn session(&self) -> &Arc<ClientSession> {
        &self.session
    }

    /// Principal requests on this stream act as.
    #[must_use]
    pub fn identity(&self) -> Identity {
        self.session.identity()
    }

    /// Requests executed against this context so far.
    #[must_use]
    pub fn executions(&self) -> u64 {
        self.executions.load(Ordering::Acquire)
    }

    pub(crate) fn begin_execution(&self) {
        self.executions.fetch_add(1, Ordering::AcqRel);
    }
}

/// Map from stream id to its context.
///
/// Entries are never evicted; a connection holds at most one context per
/// possible stream id.
#[derive(Debug, Default)]
pub struct StreamContextTable {
    contexts: RwLock<HashMap<StreamId, Arc<StreamContext>>>,
}

impl StreamContextTable {
    /// Returns the context for `stream_id`, creating it on first use.
    ///
    /// Concurrent first uses race to insert; the context installed first wins
    /// and the other is discarded.
    pub fn get_or_create(
        &self,
        stream_id: StreamId,
        session: &Arc<ClientSession>,
    ) -> Arc<StreamContext> {
        if let Some(existing) = self.get(stream_id) {
            return existing;
        }
        let candidate = Arc::new(StreamContext::new(stream_id, Arc::clone(session)));
        let mut contexts = self
            .contexts
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        Arc::clone(contexts.entry(stream_id).or_insert(candidate))
    }

    /// Context for `stream_id`, if one exists.
    #[must_use]
    pub fn get(&self, stream_id: StreamId) -> Option<Arc<StreamContext>> {
        self.contexts
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&stream_id)
            .cloned()
    }

    /// Number of streams seen.
    #[must_use]
    pub fn len(&self) -> usize {
        self.contexts
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether no stream has been seen yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
