//! Builds decoded requests without going through a socket.

use std::collections::BTreeMap;
use std::sync::Arc;

use bytes::BytesMut;
use mgmtwire_protocol::{
    CQL_VERSION, FrameFlags, FrameHeader, FramePool, MessageKind, ProtocolVersion, Request,
    StartupOptions, StreamId,
};

use crate::connection::Connection;

/// `STARTUP` body asking for the default query language version.
#[must_use]
pub fn startup_body() -> BytesMut {
    let mut options = BTreeMap::new();
    options.insert(CQL_VERSION.to_owned(), "3.4.5".to_owned());
    StartupOptions(options).encode()
}

/// Leases request bodies from a pool so tests can check every release.
#[derive(Debug, Clone)]
pub struct RequestFactory {
    pool: FramePool,
    version: ProtocolVersion,
}

impl RequestFactory {
    #[must_use]
    pub fn new(version: ProtocolVersion) -> Self {
        Self {
            pool: FramePool::new(8),
            version,
        }
    }

    #[must_use]
    pub fn pool(&self) -> &FramePool {
        &self.pool
    }

    /// Builds a request on `stream` bound to `connection`.
    #[must_use]
    pub fn request(
        &self,
        connection: &Connection,
        stream: i16,
        kind: MessageKind,
        body: &[u8],
    ) -> Request {
        let mut frame = self.pool.lease(body.len());
        frame.as_mut_slice().copy_from_slice(body);
        let header = FrameHeader {
            version: self.version,
            flags: FrameFlags::empty(),
            stream_id: StreamId::new(stream),
            kind,
        };
        Request::new(header, frame, Arc::clone(connection.info()))
    }
}
