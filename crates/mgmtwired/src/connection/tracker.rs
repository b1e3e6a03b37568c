//! Connection identity allocation and open-connection accounting.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use mgmtwire_protocol::ConnectionId;

use crate::health::HealthReporter;

/// Hands out connection identities and reports connection lifetimes.
pub struct ConnectionTracker {
    next_id: AtomicU64,
    open: Arc<AtomicUsize>,
    reporter: Arc<dyn HealthReporter>,
}

impl ConnectionTracker {
    /// Creates a tracker reporting through `reporter`.
    #[must_use]
    pub fn new(reporter: Arc<dyn HealthReporter>) -> Self {
        Self {
            next_id: AtomicU64::new(1),
            open: Arc::new(AtomicUsize::new(0)),
            reporter,
        }
    }

    /// Registers a newly accepted connection.
    #[must_use]
    pub fn open(&self) -> ConnectionGuard {
        let id = ConnectionId::new(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.open.fetch_add(1, Ordering::AcqRel);
        self.reporter.connection_opened(id);
        ConnectionGuard {
            id,
            open: Arc::clone(&self.open),
            reporter: Arc::clone(&self.reporter),
        }
    }

    /// Connections currently open.
    #[must_use]
    pub fn open_connections(&self) -> usize {
        self.open.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for ConnectionTracker {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("ConnectionTracker")
            .field("open", &self.open_connections())
            .finish_non_exhaustive()
    }
}

/// Keeps a connection counted as open until dropped.
#[must_use]
pub struct ConnectionGuard {
    id: ConnectionId,
    open: Arc<AtomicUsize>,
    reporter: Arc<dyn HealthReporter>,
}

impl ConnectionGuard {
    /// Identity assigned to the connection.
    #[must_use]
    pub fn id(&self) -> ConnectionId {
        self.id
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.open.fetch_sub(1, Ordering::AcqRel);
        self.reporter.connection_closed(self.id);
    }
}
