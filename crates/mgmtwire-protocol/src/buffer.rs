//! Pooled buffers holding decoded frame bodies.
//!
//! Every decoded request owns a [`SourceFrame`] leased from a [`FramePool`].
//! The lease is returned exactly once: either through [`SourceFrame::release`]
//! or, if the frame is dropped on some other path, from its `Drop` impl.

use std::fmt;
use std::ops::Deref;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use bytes::BytesMut;

/// Shared pool of body buffers.
#[derive(Clone)]
pub struct FramePool {
    inner: Arc<PoolInner>,
}

struct PoolInner {
    free: Mutex<Vec<BytesMut>>,
    max_pooled: usize,
    leased: AtomicUsize,
    released: AtomicUsize,
}

impl FramePool {
    /// Creates a pool retaining at most `max_pooled` idle buffers.
    #[must_use]
    pub fn new(max_pooled: usize) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                free: Mutex::new(Vec::with_capacity(max_pooled)),
                max_pooled,
                leased: AtomicUsize::new(0),
                released: AtomicUsize::new(0),
            }),
        }
    }

    /// Leases a zeroed buffer of exactly `len` bytes.
    #[must_use]
    pub fn lease(&self, len: usize) -> SourceFrame {
        let recycled = self
            .inner
            .free
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop();
        let mut buffer = recycled.unwrap_or_default();
        buffer.clear();
        buffer.resize(len, 0);
        self.inner.leased.fetch_add(1, Ordering::AcqRel);
        SourceFrame {
            buffer: Some(buffer),
            pool: Some(self.clone()),
        }
    }

    /// Number of leases not yet returned.
    #[must_use]
    pub fn outstanding(&self) -> usize {
        self.leased()
            .saturating_sub(self.inner.released.load(Ordering::Acquire))
    }

    /// Total leases handed out.
    #[must_use]
    pub fn leased(&self) -> usize {
        self.inner.leased.load(Ordering::Acquire)
    }

    /// Total leases returned.
    #[must_use]
    pub fn released(&self) -> usize {
        self.inner.released.load(Ordering::Acquire)
    }

    /// Idle buffers currently held for reuse.
    #[must_use]
    pub fn idle(&self) -> usize {
        self.inner
            .free
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn restore(&self, buffer: BytesMut) {
        self.inner.released.fetch_add(1, Ordering::AcqRel);
        let mut free = self
            .inner
            .free
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if free.len() < self.inner.max_pooled {
            free.push(buffer);
        }
    }
}

impl fmt::Debug for FramePool {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("FramePool")
            .field("max_pooled", &self.inner.max_pooled)
            .field("outstanding", &self.outstanding())
            .finish()
    }
}

/// Body bytes of one decoded frame.
pub struct SourceFrame {
    buffer: Option<BytesMut>,
    pool: Option<FramePool>,
}

impl SourceFrame {
    /// Wraps bytes that do not belong to any pool.
    #[must_use]
    pub fn unpooled(bytes: &[u8]) -> Self {
        Self {
            buffer: Some(BytesMut::from(bytes)),
            pool: None,
        }
    }

    /// Body bytes.
    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        self.buffer.as_deref().unwrap_or_default()
    }

    /// Mutable body bytes, used by the decoder to fill the lease.
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        self.buffer.as_deref_mut().unwrap_or_default()
    }

    /// Replaces the body with `bytes`, reusing the leased allocation.
    pub fn replace(&mut self, bytes: &[u8]) {
        if let Some(buffer) = self.buffer.as_mut() {
            buffer.clear();
            buffer.extend_from_slice(bytes);
        }
    }

    /// Returns the buffer to its pool.
    pub fn release(mut self) {
        self.give_back();
    }

    fn give_back(&mut self) {
        let (Some(buffer), Some(pool)) = (self.buffer.take(), self.pool.take()) else {
            return;
        };
        pool.restore(buffer);
    }
}

impl Deref for SourceFrame {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        self.as_slice()
    }
}

impl Drop for SourceFrame {
    fn drop(&mut self) {
        self.give_back();
    }
}

impl fmt::Debug for SourceFrame {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("SourceFrame")
            .field("len", &self.as_slice().len())
            .field("pooled", &self.pool.is_some())
            .finish()
    }
}
