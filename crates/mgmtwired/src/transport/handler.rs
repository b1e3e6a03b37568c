//! Connection handling abstractions for accepted local sockets.

use std::io::{self, Read, Write};
use std::net::Shutdown;
use std::os::unix::net::UnixStream;

use tracing::debug;

use super::TRANSPORT_TARGET;

/// Byte stream for one accepted connection.
///
/// The pipeline reads requests on the connection thread and writes responses
/// from a dedicated writer thread, so a stream must split into independent
/// read and write halves.
pub trait ConnectionStream: Read + Send + 'static {
    /// Write half produced by [`ConnectionStream::split`].
    type Writer: Write + Send + 'static;

    /// Splits the stream into read and write halves.
    ///
    /// # Errors
    ///
    /// Returns the I/O error raised while duplicating the handle.
    fn split(self) -> io::Result<(Self, Self::Writer)>
    where
        Self: Sized;

    /// Closes both directions once the pipeline has finished with the stream.
    fn close(&self) {}
}

impl ConnectionStream for UnixStream {
    type Writer = Self;

    fn split(self) -> io::Result<(Self, Self::Writer)> {
        let writer = self.try_clone()?;
        Ok((self, writer))
    }

    fn close(&self) {
        if let Err(error) = self.shutdown(Shutdown::Both) {
            debug!(target: TRANSPORT_TARGET, %error, "peer already closed the socket");
        }
    }
}

/// Handles accepted socket connections.
pub trait ConnectionHandler: Send + Sync + 'static {
    /// Serves a single connection until either side closes it. Implementations
    /// must not panic.
    fn handle<S: ConnectionStream>(&self, stream: S);
}
