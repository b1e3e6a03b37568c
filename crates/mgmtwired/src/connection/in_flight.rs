//! Per-connection cap on queries awaiting an answer.

use std::sync::{Arc, Condvar, Mutex, PoisonError};

/// Unanswered queries of one connection.
///
/// The connection's reader claims a slot before handing a query to the
/// execution pool and waits while the cap is reached. Slots are returned
/// by that connection's own responses, so a reader only ever waits on its
/// own work.
#[derive(Debug, Default)]
pub struct InFlightQueries {
    count: Mutex<usize>,
    drained: Condvar,
}

impl InFlightQueries {
    /// Queries currently awaiting an answer.
    #[must_use]
    pub fn current(&self) -> usize {
        *self.count.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Claims a slot, blocking while `limit` queries are already outstanding.
    ///
    /// A `limit` of zero is treated as one.
    pub fn acquire(self: &Arc<Self>, limit: usize) -> InFlightPermit {
        let limit = limit.max(1);
        let mut count = self.count.lock().unwrap_or_else(PoisonError::into_inner);
        while *count >= limit {
            count = self
                .drained
                .wait(count)
                .unwrap_or_else(PoisonError::into_inner);
        }
        *count = count.saturating_add(1);
        InFlightPermit {
            slots: Arc::clone(self),
        }
    }

    fn release(&self) {
        let mut count = self.count.lock().unwrap_or_else(PoisonError::into_inner);
        *count = count.saturating_sub(1);
        self.drained.notify_one();
    }
}

/// A claimed slot, returned on drop.
#[derive(Debug)]
#[must_use = "dropping the permit frees the slot immediately"]
pub struct InFlightPermit {
    slots: Arc<InFlightQueries>,
}

impl Drop for InFlightPermit {
    fn drop(&mut self) {
        self.slots.release();
    }
}
