//! Pluggable body compression and the codec stages that apply it.

use std::fmt;
use std::sync::Arc;

use bytes::BytesMut;
use thiserror::Error;

use crate::error::CodecError;
use crate::frame::{Frame, FrameFlags, StreamId};

/// Failure reported by a compression algorithm.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct CompressionFailure(pub String);

/// A body compression algorithm negotiated through `STARTUP`.
pub trait Compressor: fmt::Debug + Send + Sync {
    /// Name used in the `COMPRESSION` startup option.
    fn name(&self) -> &'static str;

    /// Compresses an outbound body.
    ///
    /// # Errors
    ///
    /// Returns a [`CompressionFailure`] when the algorithm rejects the input.
    fn compress(&self, input: &[u8]) -> Result<Vec<u8>, CompressionFailure>;

    /// Decompresses an inbound body.
    ///
    /// # Errors
    ///
    /// Returns a [`CompressionFailure`] when the input is corrupt.
    fn decompress(&self, input: &[u8]) -> Result<Vec<u8>, CompressionFailure>;
}

/// Algorithms the server offers in `SUPPORTED` and accepts in `STARTUP`.
///
/// The default catalog is empty: only uncompressed traffic is accepted.
#[derive(Debug, Clone, Default)]
pub struct CompressionCatalog {
    algorithms: Vec<Arc<dyn Compressor>>,
}

impl CompressionCatalog {
    /// Catalog without any algorithms.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an algorithm.
    #[must_use]
    pub fn with(mut self, algorithm: Arc<dyn Compressor>) -> Self {
        self.algorithms.push(algorithm);
        self
    }

    /// Names of every registered algorithm.
    pub fn names(&self) -> impl ExactSizeIterator<Item = &'static str> + '_ {
        self.algorithms.iter().map(|algorithm| algorithm.name())
    }

    /// Looks up an algorithm by its case-insensitive name.
    #[must_use]
    pub fn find(&self, name: &str) -> Option<Arc<dyn Compressor>> {
        self.algorithms
            .iter()
            .find(|algorithm| algorithm.name().eq_ignore_ascii_case(name))
            .cloned()
    }
}

/// Inbound stage that inflates compressed request bodies.
#[derive(Debug, Clone, Copy, Default)]
pub struct FrameDecompressor;

impl FrameDecompressor {
    /// Decompresses `frame` in place when its compression flag is set.
    ///
    /// # Errors
    ///
    /// Fails when the flag is set without a negotiated algorithm or when the
    /// algorithm rejects the body.
    pub fn apply(
        &self,
        frame: &mut Frame,
        negotiated: Option<&Arc<dyn Compressor>>,
    ) -> Result<(), CodecError> {
        if !frame.header.flags.contains(FrameFlags::COMPRESSED) {
            return Ok(());
        }
        let stream_id = frame.header.stream_id;
        let algorithm =
            negotiated.ok_or(CodecError::CompressionNotNegotiated { stream_id })?;
        let inflated = algorithm
            .decompress(frame.body.as_slice())
            .map_err(|failure| compression_error(algorithm.as_ref(), failure, stream_id))?;
        frame.body.replace(&inflated);
        frame.header.flags.remove(FrameFlags::COMPRESSED);
        Ok(())
    }
}

/// Outbound stage that deflates response bodies once compression is agreed.
#[derive(Debug, Clone, Copy, Default)]
pub struct FrameCompressor;

impl FrameCompressor {
    /// Compresses `body` and sets the flag when an algorithm is negotiated.
    ///
    /// # Errors
    ///
    /// Fails when the algorithm rejects the body.
    pub fn apply(
        &self,
        flags: &mut FrameFlags,
        body: BytesMut,
        stream_id: StreamId,
        negotiated: Option<&Arc<dyn Compressor>>,
    ) -> Result<BytesMut, CodecError> {
        let Some(algorithm) = negotiated else {
            return Ok(body);
        };
        let deflated = algorithm
            .compress(&body)
            .map_err(|failure| compression_error(algorithm.as_ref(), failure, stream_id))?;
        flags.insert(FrameFlags::COMPRESSED);
        Ok(BytesMut::from(deflated.as_slice()))
    }
}

fn compression_error(
    algorithm: &dyn Compressor,
    failure: CompressionFailure,
    stream_id: StreamId,
) -> CodecError {
    CodecError::Compression {
        algorithm: algorithm.name(),
        message: failure.0,
        stream_id,
    }
}
