//! Decoder Pipeline: accumulate compressed frames, detect the sync-flush
//! sentinel, and inflate against a persistent zlib-stream context.

mod inflater;

use self::inflater::Inflater;
use std::{
    error::Error,
    fmt::{Display, Formatter, Result as FmtResult},
};

/// Query argument appended to the gateway URI to request zlib-stream
/// transport compression.
pub const COMPRESSION_FEATURES: &str = "&compression=zlib-stream";

/// Decompressing a frame failed.
#[derive(Debug)]
pub struct CompressionError {
    /// Type of error.
    kind: CompressionErrorType,
    /// Source error if available.
    source: Option<Box<dyn Error + Send + Sync>>,
}

impl CompressionError {
    /// Immutable reference to the type of error that occurred.
    #[must_use = "retrieving the type has no effect if left unused"]
    pub const fn kind(&self) -> &CompressionErrorType {
        &self.kind
    }

    /// Consume the error, returning the source error if there is any.
    #[must_use = "consuming the error and retrieving the source has no effect if left unused"]
    pub fn into_source(self) -> Option<Box<dyn Error + Send + Sync>> {
        self.source
    }

    /// Consume the error, returning the owned error type and the source error.
    #[must_use = "consuming the error into its parts has no effect if left unused"]
    pub fn into_parts(self) -> (CompressionErrorType, Option<Box<dyn Error + Send + Sync>>) {
        (self.kind, self.source)
    }
}

impl Display for CompressionError {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self.kind {
            CompressionErrorType::Decompressing => f.write_str("a frame could not be decompressed"),
        }
    }
}

impl Error for CompressionError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.source
            .as_ref()
            .map(|source| &**source as &(dyn Error + 'static))
    }
}

/// Type of [`CompressionError`] that occurred.
#[derive(Debug)]
#[non_exhaustive]
pub enum CompressionErrorType {
    /// Decompressing a frame failed.
    Decompressing,
}

/// Decoder Pipeline state for a single transport connection.
///
/// Owns the persistent inflate context and the accumulation buffer; both
/// live exactly as long as the transport connection they were created for.
#[derive(Debug)]
pub struct Compression {
    /// Inflater doing the actual sentinel detection and decompression.
    inner: Inflater,
}

impl Compression {
    /// Create decoder state for a new connection.
    ///
    /// `max_persistent_buffer_size` bounds how large the accumulation
    /// buffer's retained capacity may grow before it is released instead of
    /// merely truncated, per [`Config::max_persistent_buffer_size`].
    ///
    /// [`Config::max_persistent_buffer_size`]: crate::Config::max_persistent_buffer_size
    pub fn new(max_persistent_buffer_size: usize) -> Self {
        Self {
            inner: Inflater::new(max_persistent_buffer_size),
        }
    }

    /// Extend the accumulation buffer with bytes from a binary frame.
    pub fn extend(&mut self, bytes: &[u8]) {
        self.inner.extend(bytes);
    }

    /// Mutable reference to the inflated message if the accumulation buffer
    /// currently ends in the sync-flush sentinel.
    ///
    /// Returns `Ok(None)` if more frames are needed to complete the logical
    /// message.
    ///
    /// # Errors
    ///
    /// Returns [`CompressionErrorType::Decompressing`] if the compressed
    /// stream is malformed.
    pub fn message_mut(&mut self) -> Result<Option<&mut [u8]>, CompressionError> {
        self.inner.msg().map_err(|source| CompressionError {
            kind: CompressionErrorType::Decompressing,
            source: Some(Box::new(source)),
        })
    }

    /// Take the most recently inflated message, replacing it with an empty
    /// buffer.
    pub fn take(&mut self) -> Vec<u8> {
        self.inner.take()
    }
}

#[cfg(test)]
mod tests {
    use super::Compression;
    use static_assertions::assert_impl_all;
    use std::fmt::Debug;

    assert_impl_all!(Compression: Debug, Send, Sync);

    #[test]
    fn incomplete_frame_yields_none() {
        let mut compression = Compression::new(3 * 1024 * 1024);
        compression.extend(b"not a complete frame");

        assert!(compression.message_mut().unwrap().is_none());
    }
}
